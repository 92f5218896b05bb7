use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "errkb")]
#[command(version)]
#[command(about = "Error fingerprinting and a knowledge base of fixes that learns")]
struct Cli {
    /// Verbose logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a .errkb directory
    Init {
        /// Directory to initialize .errkb in
        #[arg(short, long, default_value = ".")]
        path: String,
    },

    /// Report an error: merge into a known record or store a new one
    Report {
        /// Raw error text (use - to read stdin)
        text: String,

        /// Solution to store if this creates a new record
        #[arg(short, long)]
        solution: Option<String>,

        /// Project reference id
        #[arg(short, long)]
        project: Option<i64>,

        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find records related to an error text
    Search {
        /// Error text to search for
        text: String,

        /// Maximum results
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Minimum score (0-100)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Restrict to a category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Record whether a record's solution worked
    Feedback {
        /// Record ID
        id: i64,

        /// Outcome
        #[arg(value_parser = ["worked", "failed"])]
        outcome: String,
    },

    /// Change a record's status (active, resolved, stale)
    Status {
        /// Record ID
        id: i64,

        /// New status
        status: String,
    },

    /// Show a record in full
    Show {
        /// Record ID
        id: i64,
    },

    /// List records
    List {
        /// Filter by category
        #[arg(short, long, conflicts_with_all = ["severity", "tag"])]
        category: Option<String>,

        /// Filter by severity
        #[arg(short, long, conflicts_with = "tag")]
        severity: Option<String>,

        /// Filter by tag (comma-separated, any match)
        #[arg(short, long)]
        tag: Option<String>,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// List all tags
    Tags,

    /// Show statistics
    Stats,

    /// Export records to stdout
    Export {
        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: cli::report::ExportFormat,
    },

    /// View or set configuration
    Config {
        /// Config key
        key: Option<String>,

        /// Config value
        value: Option<String>,

        /// Write to the global config instead of the project
        #[arg(short, long)]
        global: bool,

        /// List available settings
        #[arg(long)]
        list: bool,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("errkb=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init { path } => cli::report::run_init(&path),
        Commands::Report {
            text,
            solution,
            project,
            json,
        } => cli::report::run_report(&text, solution, project, json),
        Commands::Search {
            text,
            limit,
            threshold,
            category,
        } => cli::report::run_search(&text, limit, threshold, category.as_deref()),
        Commands::Feedback { id, outcome } => cli::report::run_feedback(id, outcome == "worked"),
        Commands::Status { id, status } => cli::report::run_status(id, &status),
        Commands::Show { id } => cli::report::run_show(id),
        Commands::List {
            category,
            severity,
            tag,
            limit,
        } => cli::report::run_list(category.as_deref(), severity.as_deref(), tag.as_deref(), limit),
        Commands::Tags => cli::report::run_tags(),
        Commands::Stats => cli::report::run_stats(),
        Commands::Export { format } => cli::report::run_export(format),
        Commands::Config {
            key,
            value,
            global,
            list,
        } => cli::config::run_config(key.as_deref(), value.as_deref(), global, list),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
