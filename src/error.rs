//! Error types shared by every component

use thiserror::Error;

/// Errors surfaced by store, acquisition, supervisor and proxy operations
#[derive(Debug, Error)]
pub enum GgufError {
    /// Malformed user input (identifier format, token list, missing argument)
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Hub or inference server answered with a non-success status
    #[error("API returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Artifact fetch failed
    #[error("downloading model: {0}")]
    Download(String),

    /// Spawn or signal failure
    #[error("process error: {0}")]
    Process(String),

    /// Signal target does not exist (ESRCH)
    #[error("no such process: {0}")]
    NoSuchProcess(u32),

    #[error("server failed to become ready within {secs} seconds")]
    Timeout { secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GgufError {
    pub fn not_found_slug(slug: &str) -> Self {
        GgufError::NotFound(format!("model with slug '{}' not found", slug))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, GgufError::NotFound(_))
    }
}

pub type GgufResult<T> = Result<T, GgufError>;
