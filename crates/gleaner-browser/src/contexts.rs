use crate::error::{BrowserError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one open execution context (a browser tab).
///
/// Handles are persisted with the job state so a restarted process can
/// check whether the listing context it owned is still alive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextHandle(String);

impl ContextHandle {
    /// Wrap a raw target identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Work performed inside an open context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Serialize the current DOM
    PageContent,
    /// Scroll to the bottom of the document to trigger lazy loading
    ScrollToEnd,
    /// Evaluate a script and return its JSON result
    Script(String),
}

impl Extraction {
    /// Script that sends the context to `url`, letting the platform's own
    /// download handling take over.
    pub fn follow_link(url: &str) -> Self {
        // serde_json yields a valid JS string literal for any input.
        let literal = serde_json::to_string(url).unwrap_or_else(|_| "\"\"".to_string());
        Self::Script(format!("window.location.href = {literal}; true"))
    }
}

/// Result of an [`Extraction`].
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutput {
    /// Serialized DOM from [`Extraction::PageContent`]
    Html(String),
    /// JSON value from [`Extraction::Script`]
    Value(serde_json::Value),
    /// Completion of an action with no payload
    Done,
}

impl ExtractionOutput {
    /// Unwrap HTML output.
    pub fn into_html(self) -> Result<String> {
        match self {
            Self::Html(html) => Ok(html),
            other => Err(BrowserError::ExtractionError(format!(
                "expected page content, got {other:?}"
            ))),
        }
    }
}

/// Isolated, closable sessions used to load and read pages.
///
/// Every operation may be slow; callers must not assume bounded latency.
#[async_trait::async_trait]
pub trait ExecutionContexts: Send + Sync {
    /// Open a new context showing `url`.
    async fn open_context(&self, url: &str) -> Result<ContextHandle>;

    /// Close a context. Unknown or already closed handles are ignored.
    async fn close_context(&self, handle: &ContextHandle);

    /// Load `url` in an existing context.
    async fn navigate(&self, handle: &ContextHandle, url: &str) -> Result<()>;

    /// Run an extraction inside an existing context.
    async fn run_extraction(
        &self,
        handle: &ContextHandle,
        extraction: &Extraction,
    ) -> Result<ExtractionOutput>;

    /// Whether `handle` still refers to a live context.
    async fn context_exists(&self, handle: &ContextHandle) -> bool;
}
