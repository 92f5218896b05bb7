use thiserror::Error;

#[derive(Debug, Error)]
pub enum KbError {
    #[error("no .errkb directory found: run 'errkb init' first")]
    NotInitialized,

    #[error("path does not exist: {0}")]
    MissingPath(String),

    #[error("error report is empty")]
    EmptyReport,

    #[error("record not found: {0}")]
    RecordNotFound(i64),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid category '{0}'")]
    InvalidCategory(String),

    #[error("invalid severity '{0}'")]
    InvalidSeverity(String),

    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    #[error("invalid setting '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, KbError>;
