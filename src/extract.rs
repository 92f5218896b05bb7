//! Feature extraction: raw error text -> [`Fingerprint`].
//!
//! Every detector is an ordered rule table scanned top to bottom; the first
//! rule that fires wins, so the order of the tables is part of the behaviour.

use crate::types::{Category, Fingerprint, Severity, MAX_TAGS};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Rule tables
// ---------------------------------------------------------------------------

/// A keyword group mapping to a fixed result
pub struct KeywordRule<T: 'static> {
    pub result: T,
    pub keywords: &'static [&'static str],
}

impl<T> KeywordRule<T> {
    fn matches(&self, lower: &str) -> bool {
        self.keywords.iter().any(|k| lower.contains(k))
    }
}

pub static CATEGORY_RULES: &[KeywordRule<Category>] = &[
    KeywordRule {
        result: Category::Python,
        keywords: &[
            "modulenotfounderror",
            "importerror",
            "syntaxerror",
            "nameerror",
            "typeerror",
            "valueerror",
            "attributeerror",
            "keyerror",
            "indexerror",
            "zerodivisionerror",
            "traceback (most recent call last)",
            "python",
            ".py",
            "pip install",
            "pip3",
        ],
    },
    KeywordRule {
        result: Category::Npm,
        keywords: &[
            "npm err",
            "npm warn",
            "node_modules",
            "package.json",
            "enoent",
            "npm install",
            "yarn",
            "node ",
            "javascript",
            "cannot find module",
            "require(",
            "export default",
        ],
    },
    KeywordRule {
        result: Category::Permission,
        keywords: &[
            "permission denied",
            "eacces",
            "access denied",
            "sudo",
            "root",
            "chmod",
            "chown",
            "forbidden",
            "not permitted",
            "operation not permitted",
        ],
    },
    KeywordRule {
        result: Category::Database,
        keywords: &[
            "sqlite",
            "mysql",
            "postgresql",
            "postgres",
            "mongodb",
            "database",
            "sql error",
            "query failed",
            "connection refused",
            "no such table",
            "syntax error in sql",
            "duplicate entry",
            "foreign key constraint",
            "unique constraint",
        ],
    },
    KeywordRule {
        result: Category::Network,
        keywords: &[
            "connection",
            "timeout",
            "etimedout",
            "econnrefused",
            "network",
            "socket",
            "http error",
            "api",
            "fetch failed",
            "dns",
            "ssl",
            "certificate",
            "handshake",
            "unreachable",
        ],
    },
    KeywordRule {
        result: Category::Git,
        keywords: &[
            "git ",
            "fatal:",
            "merge conflict",
            "rebase",
            "branch",
            "commit",
            "push rejected",
            "pull failed",
            "detached head",
            "checkout",
        ],
    },
    KeywordRule {
        result: Category::Docker,
        keywords: &[
            "docker",
            "container",
            "image",
            "dockerfile",
            "docker-compose",
            "kubernetes",
            "k8s",
            "pod",
        ],
    },
    KeywordRule {
        result: Category::Dependency,
        keywords: &[
            "not found",
            "command not found",
            "missing",
            "no such file",
            "dependency",
            "unresolved",
            "could not find",
            "unable to locate",
        ],
    },
    KeywordRule {
        result: Category::Config,
        keywords: &[
            "config",
            "settings",
            "environment",
            "env",
            ".env",
            "configuration",
            "invalid option",
            "unknown option",
            "missing required",
        ],
    },
];

/// Severity rule: fires on any keyword, or when the category is listed
pub struct SeverityRule {
    pub severity: Severity,
    pub categories: &'static [Category],
    pub keywords: &'static [&'static str],
}

pub static SEVERITY_RULES: &[SeverityRule] = &[
    SeverityRule {
        severity: Severity::Critical,
        categories: &[],
        keywords: &[
            "fatal",
            "crashed",
            "stopped",
            "killed",
            "panic",
            "system failure",
            "critical error",
            "abort",
            "segmentation fault",
            "core dumped",
            "out of memory",
            "disk full",
            "no space left",
        ],
    },
    SeverityRule {
        severity: Severity::High,
        categories: &[Category::Database, Category::Network, Category::Permission],
        keywords: &[
            "error",
            "failed",
            "exception",
            "cannot",
            "unable",
            "refused",
            "denied",
            "forbidden",
            "unauthorized",
        ],
    },
    SeverityRule {
        severity: Severity::Medium,
        categories: &[Category::Dependency, Category::Config],
        keywords: &[
            "warning",
            "warn",
            "deprecated",
            "missing",
            "not found",
            "invalid",
            "unknown",
        ],
    },
    SeverityRule {
        severity: Severity::Low,
        categories: &[],
        keywords: &["info", "notice", "hint", "suggestion", "consider", "recommend"],
    },
];

pub static TECH_TAGS: &[KeywordRule<&str>] = &[
    KeywordRule { result: "python", keywords: &["python", ".py", "pip"] },
    KeywordRule { result: "javascript", keywords: &["javascript", ".js", "node"] },
    KeywordRule { result: "typescript", keywords: &["typescript", ".ts"] },
    KeywordRule { result: "flask", keywords: &["flask", "werkzeug"] },
    KeywordRule { result: "django", keywords: &["django"] },
    KeywordRule { result: "react", keywords: &["react", "jsx"] },
    KeywordRule { result: "vue", keywords: &["vue"] },
    KeywordRule { result: "sqlite", keywords: &["sqlite", "sqlite3"] },
    KeywordRule { result: "postgresql", keywords: &["postgresql", "postgres", "psql"] },
    KeywordRule { result: "mysql", keywords: &["mysql"] },
    KeywordRule { result: "mongodb", keywords: &["mongodb", "mongo"] },
    KeywordRule { result: "redis", keywords: &["redis"] },
    KeywordRule { result: "docker", keywords: &["docker", "dockerfile"] },
    KeywordRule { result: "git", keywords: &["git ", "github", "gitlab"] },
    KeywordRule { result: "npm", keywords: &["npm", "yarn", "package.json"] },
    KeywordRule { result: "pip", keywords: &["pip install", "requirements.txt"] },
    KeywordRule { result: "api", keywords: &["api", "rest", "graphql"] },
    KeywordRule { result: "http", keywords: &["http", "https", "request"] },
    KeywordRule { result: "ssl", keywords: &["ssl", "certificate", "tls"] },
    KeywordRule { result: "auth", keywords: &["auth", "token", "jwt", "oauth"] },
    KeywordRule { result: "file", keywords: &["file", "directory", "path"] },
    KeywordRule { result: "memory", keywords: &["memory", "ram", "heap"] },
    KeywordRule { result: "cpu", keywords: &["cpu", "processor"] },
    KeywordRule { result: "disk", keywords: &["disk", "storage", "space"] },
];

/// Exception type names recognised as `<type>-error` tags
pub static EXCEPTION_TYPES: &[&str] = &[
    "modulenotfounderror",
    "importerror",
    "syntaxerror",
    "nameerror",
    "typeerror",
    "valueerror",
    "attributeerror",
    "keyerror",
    "indexerror",
    "filenotfounderror",
    "oserror",
    "connectionerror",
    "timeouterror",
];

/// Targeted fix-command extractors, tried in order against lower-cased text
pub static FIX_EXTRACTORS: &[fn(&str) -> Option<String>] = &[
    fix_missing_python_module,
    fix_missing_node_module,
    fix_permission_denied,
    fix_push_rejected,
    fix_disk_full,
];

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

/// Build the full fingerprint for a piece of error text
pub fn extract(text: &str) -> Fingerprint {
    let lower = text.to_lowercase();
    let category = detect_category(&lower);
    let severity = detect_severity(&lower, category);
    let tags = extract_tags(text, &lower, category);
    let fix_command = detect_fix_command(&lower);

    tracing::debug!(%category, %severity, tags = tags.len(), has_fix = fix_command.is_some(), "extracted fingerprint");

    Fingerprint {
        category,
        severity,
        tags,
        fix_command,
    }
}

fn detect_category(lower: &str) -> Category {
    CATEGORY_RULES
        .iter()
        .find(|rule| rule.matches(lower))
        .map(|rule| rule.result)
        .unwrap_or(Category::Other)
}

fn detect_severity(lower: &str, category: Category) -> Severity {
    SEVERITY_RULES
        .iter()
        .find(|rule| {
            rule.categories.contains(&category) || rule.keywords.iter().any(|k| lower.contains(k))
        })
        .map(|rule| rule.severity)
        .unwrap_or(Severity::Medium)
}

fn http_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(4\d{2}|5\d{2})\b").unwrap())
}

fn extract_tags(text: &str, lower: &str, category: Category) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();

    if category != Category::Other {
        tags.insert(category.as_str().to_string());
    }

    for rule in TECH_TAGS.iter().filter(|r| r.matches(lower)) {
        tags.insert(rule.result.to_string());
    }

    for name in EXCEPTION_TYPES.iter().filter(|n| lower.contains(*n)) {
        let readable = name.replace("error", "").replace("exception", "");
        if !readable.is_empty() {
            tags.insert(format!("{}-error", readable));
        }
    }

    for caps in http_code_re().captures_iter(text) {
        tags.insert(format!("http-{}", &caps[1]));
    }

    tags.into_iter().take(MAX_TAGS).collect()
}

fn detect_fix_command(lower: &str) -> Option<String> {
    FIX_EXTRACTORS.iter().find_map(|extract| extract(lower))
}

fn fix_missing_python_module(lower: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"modulenotfounderror: no module named ['"]?(\w+)['"]?"#).unwrap()
    });
    re.captures(lower).map(|c| format!("pip install {}", &c[1]))
}

fn fix_missing_node_module(lower: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r#"cannot find module ['"]?([^'"]+)['"]?"#).unwrap());
    let module = re.captures(lower)?.get(1)?.as_str().trim();
    if module.is_empty() || module.starts_with('.') || module.starts_with('/') {
        return None;
    }
    Some(format!("npm install {}", module))
}

fn fix_permission_denied(lower: &str) -> Option<String> {
    lower
        .contains("permission denied")
        .then(|| "sudo chmod +x <file>  # or rerun the command with sudo".to_string())
}

fn fix_push_rejected(lower: &str) -> Option<String> {
    (lower.contains("push rejected") || lower.contains("non-fast-forward"))
        .then(|| "git pull origin main --rebase && git push".to_string())
}

fn fix_disk_full(lower: &str) -> Option<String> {
    lower
        .contains("no space left")
        .then(|| "df -h && sudo apt autoremove && sudo apt clean".to_string())
}

/// Generic remediation checklist used when no solution text is supplied
pub fn fallback_solution(category: Category) -> &'static str {
    match category {
        Category::Python => {
            "1. Check the Python version (python --version)\n2. Install missing modules (pip install <module>)\n3. Check imports and paths"
        }
        Category::Npm => {
            "1. Delete node_modules and package-lock.json\n2. Run npm install\n3. Check the Node.js version (node --version)"
        }
        Category::Permission => {
            "1. Check file permissions (ls -la)\n2. Use sudo if required\n3. Check the owning user and group"
        }
        Category::Database => {
            "1. Check the database connection\n2. Check the SQL syntax\n3. Check that the tables exist"
        }
        Category::Network => {
            "1. Check the network connection\n2. Check firewall settings\n3. Check that the service is running"
        }
        Category::Dependency => {
            "1. Install the missing dependency\n2. Check the dependency version\n3. Check compatibility"
        }
        Category::Config => {
            "1. Check the .env file\n2. Check environment variables\n3. Check configuration files"
        }
        Category::Git => {
            "1. Run git status\n2. Resolve conflicts if any\n3. Check the remote URL"
        }
        Category::Docker => {
            "1. Check Docker status (docker ps)\n2. Check logs (docker logs <container>)\n3. Check the Dockerfile"
        }
        Category::Other => {
            "1. Analyse the error in more detail\n2. Search for the error message\n3. Check the documentation"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_not_found() {
        let fp = extract("ModuleNotFoundError: No module named 'flask'");
        assert_eq!(fp.category, Category::Python);
        assert_eq!(fp.severity, Severity::High);
        assert_eq!(fp.fix_command.as_deref(), Some("pip install flask"));
        assert!(fp.tags.contains("python"));
        assert!(fp.tags.contains("flask"));
        assert!(fp.tags.contains("modulenotfound-error"));
    }

    #[test]
    fn test_first_matching_group_wins() {
        // "python" is checked before "database"
        let fp = extract("sqlite3.OperationalError in app.py: no such table: users");
        assert_eq!(fp.category, Category::Python);

        let fp = extract("sqlite3.OperationalError: no such table: users");
        assert_eq!(fp.category, Category::Database);
        assert_eq!(fp.severity, Severity::High);
        assert!(fp.tags.contains("sqlite"));
    }

    #[test]
    fn test_npm_module() {
        let fp = extract("Error: Cannot find module 'express'");
        assert_eq!(fp.category, Category::Npm);
        assert_eq!(fp.fix_command.as_deref(), Some("npm install express"));

        let fp = extract("Error: Cannot find module './local'");
        assert_eq!(fp.fix_command, None);
    }

    #[test]
    fn test_fix_commands() {
        let fp = extract("bash: ./deploy.sh: Permission denied");
        assert_eq!(fp.category, Category::Permission);
        assert!(fp.fix_command.unwrap().starts_with("sudo chmod"));

        let fp = extract("! [rejected] main -> main (non-fast-forward)");
        assert_eq!(
            fp.fix_command.as_deref(),
            Some("git pull origin main --rebase && git push")
        );

        let fp = extract("write failed: No space left on device");
        assert_eq!(fp.severity, Severity::Critical);
        assert!(fp.fix_command.unwrap().starts_with("df -h"));
    }

    #[test]
    fn test_severity_order() {
        assert_eq!(extract("Segmentation fault (core dumped)").severity, Severity::Critical);
        assert_eq!(extract("DeprecationWarning: something").severity, Severity::Medium);
        assert_eq!(extract("hint: consider upgrading").severity, Severity::Low);
        // dependency category is medium unless an explicit error marker is present
        assert_eq!(extract("ripgrep: command not found").severity, Severity::Medium);
        assert_eq!(extract("ripgrep: command not found, build failed").severity, Severity::High);
    }

    #[test]
    fn test_http_codes_and_word_boundaries() {
        let fp = extract("Request failed with status 503, retried after 404");
        assert!(fp.tags.contains("http-503"));
        assert!(fp.tags.contains("http-404"));

        let fp = extract("processed 4040 items, 12500 pending");
        assert!(fp.tags.iter().all(|t| !t.starts_with("http-")));
    }

    #[test]
    fn test_unmatched_input_degrades_to_defaults() {
        let fp = extract("zzz qqq");
        assert_eq!(fp.category, Category::Other);
        assert_eq!(fp.severity, Severity::Medium);
        assert!(fp.tags.is_empty());
        assert_eq!(fp.fix_command, None);
    }

    #[test]
    fn test_tags_capped_and_sorted() {
        let text = "python flask django react vue sqlite mysql redis docker npm api http ssl auth file memory cpu disk";
        let fp = extract(text);
        assert_eq!(fp.tags.len(), MAX_TAGS);
        let v: Vec<_> = fp.tags.iter().cloned().collect();
        let mut sorted = v.clone();
        sorted.sort();
        assert_eq!(v, sorted);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let samples = [
            "ModuleNotFoundError: No module named 'flask'",
            "fatal: refusing to merge unrelated histories",
            "docker: Error response from daemon: pull access denied",
            "",
            "ECONNREFUSED 127.0.0.1:5432",
        ];
        for s in samples {
            assert_eq!(extract(s), extract(s));
            let fp = extract(s);
            assert!(Category::ALL.contains(&fp.category));
            assert!(Severity::ALL.contains(&fp.severity));
        }
    }

    #[test]
    fn test_fallback_solution_per_category() {
        for c in Category::ALL {
            assert!(fallback_solution(c).starts_with("1."));
        }
    }
}
