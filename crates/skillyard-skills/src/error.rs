//! Error types for the skills subsystem.

use std::path::PathBuf;

/// Skill-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("skill not found: `{0}`")]
    NotFound(String),

    #[error("invalid skill id `{id}`: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("invalid skill source `{source_str}`: {reason}")]
    InvalidSource { source_str: String, reason: String },

    #[error("path `{child}` escapes root `{root}`")]
    PathEscape { root: PathBuf, child: String },

    #[error("skill `{0}` is built in and cannot be deleted")]
    BuiltIn(String),

    #[error("skill `{id}` lives in a read-only root ({root})")]
    ReadOnly { id: String, root: String },

    #[error("no skills found in `{0}`")]
    NoSkillsFound(String),

    #[error("failed to acquire `{repo}`: git clone failed ({clone}); archive download failed ({archive})")]
    Acquisition {
        repo: String,
        clone: String,
        archive: String,
    },

    #[error("git clone failed: {0}")]
    Clone(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("archive error in `{path}`: {reason}")]
    Archive { path: PathBuf, reason: String },

    #[error("requested subpath `{0}` does not exist")]
    MissingSubpath(String),

    #[error("invalid config entry: {0}")]
    InvalidConfig(String),

    #[error("unknown connectivity test `{0}`")]
    UnknownTest(String),

    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state store error: {0}")]
    Store(#[from] skillyard_store::StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for SkillError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("background task failed: {err}"))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SkillError>;
