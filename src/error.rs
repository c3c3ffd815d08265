use thiserror::Error;

/// Errors surfaced by the switchboard components.
#[derive(Debug, Error)]
pub enum SwitchboardError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream returned a non-2xx status; `message` carries the body text.
    #[error("{message} (status {status})")]
    Api { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty completion from AI gateway")]
    EmptyCompletion,

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool {0} is not enabled")]
    ToolDisabled(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Cannot move ticket from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Need at least 3 feedback entries to generate improvements (have {0})")]
    ImprovementNotReady(usize),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SwitchboardError>;
