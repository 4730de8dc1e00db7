//! Execution contexts for commands that never touch a browser.

use async_trait::async_trait;
use gleaner_browser::{BrowserError, ContextHandle, ExecutionContexts, Extraction, ExtractionOutput};

/// Refuses every browser operation.
///
/// Used by the read-only and bookkeeping commands so they work without
/// Chromium installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

fn unavailable() -> BrowserError {
    BrowserError::ChromiumError("no browser attached to this command".to_string())
}

#[async_trait]
impl ExecutionContexts for Detached {
    async fn open_context(&self, _url: &str) -> gleaner_browser::Result<ContextHandle> {
        Err(unavailable())
    }

    async fn close_context(&self, _handle: &ContextHandle) {}

    async fn navigate(&self, _handle: &ContextHandle, _url: &str) -> gleaner_browser::Result<()> {
        Err(unavailable())
    }

    async fn run_extraction(
        &self,
        _handle: &ContextHandle,
        _extraction: &Extraction,
    ) -> gleaner_browser::Result<ExtractionOutput> {
        Err(unavailable())
    }

    async fn context_exists(&self, _handle: &ContextHandle) -> bool {
        false
    }
}
