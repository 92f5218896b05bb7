use errkb::config::KB_DIR;
use errkb::{
    Category, ErrorRecord, ErrorReport, FeedbackOutcome, KbError, KnowledgeBase, RecordFilter,
    ReportOutcome, Result, ScoredMatch, SearchOptions, Severity, Status,
};
use std::io::{self, Read};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Md,
}

/// Run the init command
pub fn run_init(path: &str) -> Result<()> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(KbError::MissingPath(path.display().to_string()));
    }

    let kb_path = path.join(KB_DIR);
    if kb_path.exists() {
        println!("{} already exists at {}", KB_DIR, kb_path.display());
        return Ok(());
    }

    let (_, kb_path) = KnowledgeBase::init(path)?;
    println!("Initialized {} at {}", KB_DIR, kb_path.display());

    Ok(())
}

/// Run the report command
pub fn run_report(text: &str, solution: Option<String>, project: Option<i64>, json: bool) -> Result<()> {
    let kb = KnowledgeBase::open()?;

    let text = if text == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        text.to_string()
    };

    let outcome = kb.report(ErrorReport {
        text,
        solution,
        project_reference: project,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(())
}

/// Run the search command
pub fn run_search(
    text: &str,
    limit: Option<usize>,
    threshold: Option<f64>,
    category: Option<&str>,
) -> Result<()> {
    let kb = KnowledgeBase::open()?;
    let settings = kb.settings();

    let options = SearchOptions {
        category: category.map(str::parse::<Category>).transpose()?,
        limit: limit.unwrap_or(settings.related_limit),
        min_score: threshold.unwrap_or(settings.related_threshold),
    };

    let results = kb.search(text, Some(options))?;
    if results.is_empty() {
        println!("No matching records.");
        return Ok(());
    }

    for m in &results {
        print_match(m);
    }

    Ok(())
}

/// Run the feedback command
pub fn run_feedback(id: i64, worked: bool) -> Result<()> {
    let kb = KnowledgeBase::open()?;

    match kb.feedback(id, worked)? {
        FeedbackOutcome::Updated { record_id, success_rate } => {
            println!(
                "Recorded {} for [{}], success rate now {:.1}%",
                if worked { "success" } else { "failure" },
                record_id,
                success_rate
            );
        }
        FeedbackOutcome::NotFound { record_id } => {
            println!("No record [{}], feedback ignored.", record_id);
        }
    }

    Ok(())
}

/// Run the status command
pub fn run_status(id: i64, status: &str) -> Result<()> {
    let kb = KnowledgeBase::open()?;
    let status: Status = status.parse()?;

    let record = kb.set_status(id, status)?;
    println!("[{}] is now {}", record.id, record.status);

    Ok(())
}

/// Run the show command
pub fn run_show(id: i64) -> Result<()> {
    let kb = KnowledgeBase::open()?;
    let r = kb.get(id)?.ok_or(KbError::RecordNotFound(id))?;

    println!("[{}] {} / {} / {}", r.id, r.category, r.severity, r.status);
    println!("  pattern:      {}", r.pattern.replace('\n', " "));
    if !r.tags.is_empty() {
        println!("  tags:         {}", join_tags(&r));
    }
    println!("  occurrences:  {} ({} similar)", r.occurrence_count, r.similar_count);
    println!("  success rate: {:.1}%", r.success_rate);
    if let Some(project) = r.project_reference {
        println!("  project:      {}", project);
    }
    println!("  last seen:    {}", r.last_seen.format("%Y-%m-%d %H:%M"));
    println!("  created:      {}", r.created_at.format("%Y-%m-%d %H:%M"));
    println!("\nSolution:\n{}", r.solution);
    if let Some(cmd) = &r.fix_command {
        println!("\nFix command:\n  {}", cmd);
    }
    if let Some(trace) = &r.stack_trace {
        println!("\nStack trace:\n{}", trace);
    }

    Ok(())
}

/// Run the list command
pub fn run_list(
    category: Option<&str>,
    severity: Option<&str>,
    tag: Option<&str>,
    limit: usize,
) -> Result<()> {
    let kb = KnowledgeBase::open()?;

    let filter = match (category, severity, tag) {
        (Some(c), _, _) => RecordFilter::Category(c.parse()?),
        (None, Some(s), _) => RecordFilter::Severity(s.parse::<Severity>()?),
        (None, None, Some(t)) => RecordFilter::Tags(
            t.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        ),
        (None, None, None) => RecordFilter::All,
    };

    let records = kb.list(&filter, limit)?;
    if records.is_empty() {
        if filter == RecordFilter::All {
            println!("No records yet. Add one with: errkb report \"...\"");
        } else {
            println!("No matching records.");
        }
        return Ok(());
    }

    for r in &records {
        print_record(r);
    }

    Ok(())
}

/// Run the tags command
pub fn run_tags() -> Result<()> {
    let kb = KnowledgeBase::open()?;
    let tags = kb.tags()?;

    if tags.is_empty() {
        println!("No tags yet.");
        return Ok(());
    }

    println!("Tags:\n");
    for (tag, count) in tags {
        println!("  {:20} ({})", tag, count);
    }

    Ok(())
}

/// Run the stats command
pub fn run_stats() -> Result<()> {
    let kb = KnowledgeBase::open()?;
    let stats = kb.stats()?;

    println!("Knowledge Base Statistics");
    println!("=========================\n");

    println!("Total records:     {}", stats.total);
    println!("Avg success rate:  {:.1}%", stats.avg_success_rate);
    println!("Critical (active): {}", stats.critical_active);
    println!("Added last 7 days: {}", stats.last_7_days);

    if !stats.by_category.is_empty() {
        println!("\nBy category:");
        let mut categories: Vec<_> = stats.by_category.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1));
        for (category, count) in categories {
            println!("  {:12} {}", category, count);
        }
    }

    if !stats.by_severity.is_empty() {
        println!("\nBy severity:");
        for (severity, count) in &stats.by_severity {
            println!("  {:12} {}", severity, count);
        }
    }

    if !stats.by_status.is_empty() {
        println!("\nBy status:");
        for (status, count) in &stats.by_status {
            println!("  {:12} {}", status, count);
        }
    }

    Ok(())
}

/// Run the export command
pub fn run_export(format: ExportFormat) -> Result<()> {
    let kb = KnowledgeBase::open()?;
    let records = kb.export()?;

    match format {
        ExportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        ExportFormat::Md => {
            for r in records {
                println!("## [{}] {} ({})", r.id, r.category, r.severity);
                println!(
                    "*{} occurrences, {:.0}% success, {}*\n",
                    r.occurrence_count, r.success_rate, r.status
                );
                if !r.tags.is_empty() {
                    println!("*Tags: {}*\n", join_tags(&r));
                }
                println!("```\n{}\n```\n", r.pattern);
                println!("{}\n", r.solution);
                if let Some(cmd) = &r.fix_command {
                    println!("`{}`\n", cmd);
                }
                println!("---\n");
            }
        }
    }

    Ok(())
}

fn print_outcome(outcome: &ReportOutcome) {
    let r = &outcome.record;
    if outcome.exact {
        println!(
            "Known error [{}] (pattern match), seen {} times",
            r.id, r.occurrence_count
        );
    } else if outcome.merged {
        println!(
            "Known error [{}] (score {:.1}), seen {} times",
            r.id, outcome.score, r.occurrence_count
        );
    } else {
        println!("New error stored as [{}]", r.id);
    }
    println!(
        "  {} / {} / success rate {:.1}%",
        outcome.fingerprint.category, outcome.fingerprint.severity, r.success_rate
    );
    if !outcome.fingerprint.tags.is_empty() {
        let tags: Vec<&str> = outcome.fingerprint.tags.iter().map(String::as_str).collect();
        println!("  tags: {}", tags.join(", "));
    }

    println!("\nSolution:\n{}", r.solution);
    if let Some(cmd) = &r.fix_command {
        println!("\nFix command:\n  {}", cmd);
    }

    if !outcome.related.is_empty() {
        println!("\nRelated:");
        for m in &outcome.related {
            print_match(m);
        }
    }

    println!("\nTell it how it went: errkb feedback {} worked|failed", r.id);
}

fn print_match(m: &ScoredMatch) {
    let r = &m.record;
    println!(
        "[{}] score: {:.1}, {} / {}, success: {:.0}%",
        r.id, m.score, r.category, r.severity, r.success_rate
    );
    println!("    {}\n", preview(&r.pattern));
}

fn print_record(r: &ErrorRecord) {
    println!(
        "[{}] {} / {} / {}, seen {}x, success: {:.0}%",
        r.id, r.category, r.severity, r.status, r.occurrence_count, r.success_rate
    );
    if !r.tags.is_empty() {
        println!("    tags: {}", join_tags(r));
    }
    println!("    {}\n", preview(&r.pattern));
}

fn join_tags(r: &ErrorRecord) -> String {
    r.tags.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(200).collect();
    let head = if text.chars().count() > 200 {
        format!("{}...", head)
    } else {
        head
    };
    head.replace('\n', " ")
}
