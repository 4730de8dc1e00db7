use thiserror::Error;

/// Errors surfaced by the harvest control API.
///
/// Failures inside a running job never reach the caller; they are retried,
/// recorded in the failure ledger, or reported as a terminal status.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[from] gleaner_db::DatabaseError),

    #[error("Browser error: {0}")]
    Browser(#[from] gleaner_browser::BrowserError),

    #[error("Stored state is unreadable: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Document link not found on {0}")]
    DocumentLinkNotFound(String),
}

pub type Result<T> = std::result::Result<T, HarvestError>;

/// Early exit from a running job.
///
/// Cancellation is a terminal path rather than an error, so it travels on
/// its own type and is propagated with `?` through every phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled,
}
