use crate::decision::{
    DecisionPolicy, DEFAULT_INITIAL_SUCCESS_RATE, DEFAULT_MERGE_THRESHOLD, DEFAULT_PATTERN_MAX_CHARS,
    DEFAULT_STACK_TRACE_MIN_CHARS,
};
use crate::error::{KbError, Result};
use crate::matcher::{BEST_MATCH_MIN_SCORE, DEFAULT_LIMIT, DEFAULT_MIN_SCORE};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the per-project directory
pub const KB_DIR: &str = ".errkb";
/// Database file inside the project directory
pub const DB_FILE: &str = "records.db";
/// Environment variable pointing at a knowledge base directory
pub const KB_PATH_ENV: &str = "ERRKB_PATH";

/// Setting description
#[derive(Debug, Clone)]
pub struct SettingInfo {
    pub key: &'static str,
    pub default: f64,
    pub kind: SettingKind,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    /// A score or rate in 0..=100
    Percent,
    /// A positive count
    Count,
}

/// Every recognised setting
pub static SETTINGS: &[SettingInfo] = &[
    SettingInfo {
        key: "related_threshold",
        default: DEFAULT_MIN_SCORE,
        kind: SettingKind::Percent,
        description: "Minimum score for a record to be shown as related",
    },
    SettingInfo {
        key: "related_limit",
        default: DEFAULT_LIMIT as f64,
        kind: SettingKind::Count,
        description: "How many related records a search returns",
    },
    SettingInfo {
        key: "best_match_threshold",
        default: BEST_MATCH_MIN_SCORE,
        kind: SettingKind::Percent,
        description: "Minimum score for the best-match lookup",
    },
    SettingInfo {
        key: "merge_threshold",
        default: DEFAULT_MERGE_THRESHOLD,
        kind: SettingKind::Percent,
        description: "Score at which a report merges into an existing record",
    },
    SettingInfo {
        key: "initial_success_rate",
        default: DEFAULT_INITIAL_SUCCESS_RATE,
        kind: SettingKind::Percent,
        description: "Success rate given to a newly created record",
    },
    SettingInfo {
        key: "pattern_max_chars",
        default: DEFAULT_PATTERN_MAX_CHARS as f64,
        kind: SettingKind::Count,
        description: "Characters of the report kept as a new record's pattern",
    },
    SettingInfo {
        key: "stack_trace_min_chars",
        default: DEFAULT_STACK_TRACE_MIN_CHARS as f64,
        kind: SettingKind::Count,
        description: "Reports longer than this are kept as the record's stack trace",
    },
];

pub fn setting_info(key: &str) -> Option<&'static SettingInfo> {
    SETTINGS.iter().find(|s| s.key == key)
}

/// Parse and range-check a raw setting value
pub fn validate_setting(key: &str, raw: &str) -> Result<f64> {
    let info = setting_info(key).ok_or_else(|| KbError::InvalidSetting {
        key: key.to_string(),
        reason: "unknown setting".to_string(),
    })?;

    let value: f64 = raw.trim().parse().map_err(|_| KbError::InvalidSetting {
        key: key.to_string(),
        reason: format!("'{}' is not a number", raw),
    })?;

    let ok = match info.kind {
        SettingKind::Percent => (0.0..=100.0).contains(&value),
        SettingKind::Count => value >= 1.0 && value.fract() == 0.0,
    };

    if !ok {
        let reason = match info.kind {
            SettingKind::Percent => "must be between 0 and 100",
            SettingKind::Count => "must be a whole number of at least 1",
        };
        return Err(KbError::InvalidSetting {
            key: key.to_string(),
            reason: reason.to_string(),
        });
    }

    Ok(value)
}

/// Resolved, typed settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settings {
    pub related_threshold: f64,
    pub related_limit: usize,
    pub best_match_threshold: f64,
    pub policy: DecisionPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            related_threshold: DEFAULT_MIN_SCORE,
            related_limit: DEFAULT_LIMIT,
            best_match_threshold: BEST_MATCH_MIN_SCORE,
            policy: DecisionPolicy::default(),
        }
    }
}

impl Settings {
    /// Build from a key/value map; unknown keys are ignored, bad values are errors
    pub fn from_map(values: &BTreeMap<String, String>) -> Result<Self> {
        let mut settings = Settings::default();

        for (key, raw) in values {
            if setting_info(key).is_none() {
                tracing::warn!(key = %key, "ignoring unknown setting");
                continue;
            }
            let v = validate_setting(key, raw)?;
            match key.as_str() {
                "related_threshold" => settings.related_threshold = v,
                "related_limit" => settings.related_limit = v as usize,
                "best_match_threshold" => settings.best_match_threshold = v,
                "merge_threshold" => settings.policy.merge_threshold = v,
                "initial_success_rate" => settings.policy.initial_success_rate = v,
                "pattern_max_chars" => settings.policy.pattern_max_chars = v as usize,
                "stack_trace_min_chars" => settings.policy.stack_trace_min_chars = v as usize,
                _ => {}
            }
        }

        Ok(settings)
    }
}

// -----------------------------------------------------------------------------
// Config files
// -----------------------------------------------------------------------------

/// A flat YAML key/value file
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    values: BTreeMap<String, serde_yaml::Value>,
}

impl ConfigFile {
    pub fn load(path: PathBuf) -> Result<Self> {
        let values = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_yaml::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(|v| match v {
            serde_yaml::Value::String(s) => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    /// Validate and persist a setting
    pub fn set(&mut self, key: &str, raw: &str) -> Result<()> {
        let value = validate_setting(key, raw)?;
        let number = if value.fract() == 0.0 {
            serde_yaml::Number::from(value as i64)
        } else {
            serde_yaml::Number::from(value)
        };
        self.values
            .insert(key.to_string(), serde_yaml::Value::Number(number));
        self.save()
    }

    pub fn unset(&mut self, key: &str) -> Result<bool> {
        let removed = self.values.remove(key).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn entries(&self) -> BTreeMap<String, String> {
        self.values
            .keys()
            .filter_map(|k| self.get(k).map(|v| (k.clone(), v)))
            .collect()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(&self.values)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

fn global_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("errkb")
}

pub fn global_config_file() -> PathBuf {
    global_config_dir().join("config.yaml")
}

pub fn project_config_file(kb_path: &Path) -> PathBuf {
    kb_path.join("_config.yaml")
}

/// Layered configuration: defaults < global file < project file.
/// Outside a project only the global layer exists.
pub struct KbConfig {
    global: ConfigFile,
    project: Option<ConfigFile>,
}

impl KbConfig {
    pub fn load(kb_path: &Path) -> Result<Self> {
        Self::load_from(global_config_file(), project_config_file(kb_path))
    }

    pub fn load_from(global: PathBuf, project: PathBuf) -> Result<Self> {
        Ok(Self {
            global: ConfigFile::load(global)?,
            project: Some(ConfigFile::load(project)?),
        })
    }

    /// Global layer only, for use outside any project
    pub fn load_global(global: PathBuf) -> Result<Self> {
        Ok(Self {
            global: ConfigFile::load(global)?,
            project: None,
        })
    }

    /// Effective raw values after layering
    pub fn merged(&self) -> BTreeMap<String, String> {
        let mut values = self.global.entries();
        if let Some(project) = &self.project {
            values.extend(project.entries());
        }
        values
    }

    pub fn settings(&self) -> Result<Settings> {
        Settings::from_map(&self.merged())
    }

    /// Effective value and where it came from
    pub fn resolve(&self, key: &str) -> Option<(String, &'static str)> {
        if let Some(v) = self.project.as_ref().and_then(|p| p.get(key)) {
            return Some((v, "project"));
        }
        if let Some(v) = self.global.get(key) {
            return Some((v, "global"));
        }
        setting_info(key).map(|info| (info.default.to_string(), "default"))
    }

    pub fn project_mut(&mut self) -> Option<&mut ConfigFile> {
        self.project.as_mut()
    }

    pub fn global_mut(&mut self) -> &mut ConfigFile {
        &mut self.global
    }
}

/// Find the .errkb directory, searching upward from current directory
pub fn find_kb_path() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let kb = current.join(KB_DIR);
        if kb.is_dir() {
            return Some(kb);
        }

        if !current.pop() {
            break;
        }
    }

    if let Ok(path) = std::env::var(KB_PATH_ENV) {
        let kb = PathBuf::from(path);
        if kb.is_dir() {
            return Some(kb);
        }
    }

    None
}
