use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("failed to open execution context: {0}")]
    ContextCreation(String),

    #[error("execution context not found: {0}")]
    ContextNotFound(String),

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("extraction failed: {0}")]
    ExtractionError(String),
}
