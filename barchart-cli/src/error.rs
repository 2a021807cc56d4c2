//! Error types for the barchart host

use thiserror::Error;

/// Host-level failures; per-event chart errors are logged, not returned
#[derive(Debug, Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Chart(#[from] barchart::ChartError),

    #[error("state file {path} is not a JSON object")]
    InvalidState { path: String },
}

pub type Result<T> = std::result::Result<T, CliError>;
