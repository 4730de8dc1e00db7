//! Scripted in-memory execution contexts.
//!
//! Serves canned HTML per URL and records every operation, so the harvest
//! engine can be exercised without a browser.

use crate::contexts::{ContextHandle, ExecutionContexts, Extraction, ExtractionOutput};
use crate::error::{BrowserError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// One recorded call against [`ScriptedContexts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Open(String),
    Close(ContextHandle),
    Navigate(ContextHandle, String),
    Content(String),
    Scroll(String),
    Script(String, String),
}

#[derive(Debug, Default)]
struct Inner {
    /// Successive contents served for a URL; the last entry repeats.
    pages: HashMap<String, Vec<String>>,
    served: HashMap<String, usize>,
    /// Remaining forced failures per URL (`None` means always).
    open_failures: HashMap<String, Option<u32>>,
    navigate_failures: HashMap<String, Option<u32>>,
    live: HashMap<ContextHandle, String>,
    closed: HashSet<ContextHandle>,
    next_id: u64,
    max_live: usize,
    operations: Vec<Operation>,
}

/// In-memory [`ExecutionContexts`] with canned pages and failure injection.
#[derive(Debug, Clone, Default)]
pub struct ScriptedContexts {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedContexts {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Serve `html` for every content request on `url`.
    pub fn set_page(&self, url: impl Into<String>, html: impl Into<String>) {
        self.lock().pages.insert(url.into(), vec![html.into()]);
    }

    /// Serve each entry of `htmls` in turn for `url`, repeating the last one.
    pub fn set_page_sequence(&self, url: impl Into<String>, htmls: Vec<String>) {
        self.lock().pages.insert(url.into(), htmls);
    }

    /// Make the next `times` opens of `url` fail.
    pub fn fail_open(&self, url: impl Into<String>, times: u32) {
        self.lock().open_failures.insert(url.into(), Some(times));
    }

    /// Make every open of `url` fail.
    pub fn fail_open_always(&self, url: impl Into<String>) {
        self.lock().open_failures.insert(url.into(), None);
    }

    /// Make every navigation to `url` fail.
    pub fn fail_navigate_always(&self, url: impl Into<String>) {
        self.lock().navigate_failures.insert(url.into(), None);
    }

    /// Drop every live context, as a browser restart would.
    pub fn forget_all(&self) {
        let mut inner = self.lock();
        let handles: Vec<_> = inner.live.keys().cloned().collect();
        inner.live.clear();
        inner.closed.extend(handles);
    }

    /// Register a live context without going through `open_context`.
    pub fn insert_live(&self, handle: &ContextHandle, url: impl Into<String>) {
        self.lock().live.insert(handle.clone(), url.into());
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    /// URLs passed to `open_context`, in call order.
    pub fn opened_urls(&self) -> Vec<String> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Open(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    /// Scripts run, with the URL of the context they ran in.
    pub fn scripts(&self) -> Vec<(String, String)> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                Operation::Script(url, script) => Some((url.clone(), script.clone())),
                _ => None,
            })
            .collect()
    }

    /// Content requests made against `url`.
    pub fn content_requests(&self, url: &str) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|op| matches!(op, Operation::Content(u) if u == url))
            .count()
    }

    /// Whether `handle` was open at some point and has since gone away.
    pub fn was_closed(&self, handle: &ContextHandle) -> bool {
        self.lock().closed.contains(handle)
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Highest number of simultaneously open contexts seen so far.
    pub fn max_live(&self) -> usize {
        self.lock().max_live
    }

    fn take_failure(map: &mut HashMap<String, Option<u32>>, url: &str) -> bool {
        match map.get_mut(url) {
            None => false,
            Some(None) => true,
            Some(Some(0)) => false,
            Some(Some(remaining)) => {
                *remaining -= 1;
                true
            }
        }
    }
}

#[async_trait]
impl ExecutionContexts for ScriptedContexts {
    async fn open_context(&self, url: &str) -> Result<ContextHandle> {
        let mut inner = self.lock();
        inner.operations.push(Operation::Open(url.to_string()));
        if Self::take_failure(&mut inner.open_failures, url) {
            return Err(BrowserError::ContextCreation(format!("scripted failure for {url}")));
        }
        inner.next_id += 1;
        let handle = ContextHandle::new(format!("ctx-{}", inner.next_id));
        inner.live.insert(handle.clone(), url.to_string());
        inner.max_live = inner.max_live.max(inner.live.len());
        Ok(handle)
    }

    async fn close_context(&self, handle: &ContextHandle) {
        let mut inner = self.lock();
        inner.operations.push(Operation::Close(handle.clone()));
        if inner.live.remove(handle).is_some() {
            inner.closed.insert(handle.clone());
        }
    }

    async fn navigate(&self, handle: &ContextHandle, url: &str) -> Result<()> {
        let mut inner = self.lock();
        inner
            .operations
            .push(Operation::Navigate(handle.clone(), url.to_string()));
        if !inner.live.contains_key(handle) {
            return Err(BrowserError::ContextNotFound(handle.to_string()));
        }
        if Self::take_failure(&mut inner.navigate_failures, url) {
            return Err(BrowserError::NavigationError(format!(
                "scripted failure for {url}"
            )));
        }
        inner.live.insert(handle.clone(), url.to_string());
        Ok(())
    }

    async fn run_extraction(
        &self,
        handle: &ContextHandle,
        extraction: &Extraction,
    ) -> Result<ExtractionOutput> {
        let mut inner = self.lock();
        let url = inner
            .live
            .get(handle)
            .cloned()
            .ok_or_else(|| BrowserError::ContextNotFound(handle.to_string()))?;

        match extraction {
            Extraction::PageContent => {
                inner.operations.push(Operation::Content(url.clone()));
                let index = {
                    let served = inner.served.entry(url.clone()).or_insert(0);
                    let index = *served;
                    *served += 1;
                    index
                };
                let html = inner
                    .pages
                    .get(&url)
                    .and_then(|seq| seq.get(index).or_else(|| seq.last()))
                    .cloned()
                    .unwrap_or_else(|| "<html><body></body></html>".to_string());
                Ok(ExtractionOutput::Html(html))
            }
            Extraction::ScrollToEnd => {
                inner.operations.push(Operation::Scroll(url));
                Ok(ExtractionOutput::Done)
            }
            Extraction::Script(script) => {
                inner
                    .operations
                    .push(Operation::Script(url, script.clone()));
                Ok(ExtractionOutput::Value(serde_json::Value::Bool(true)))
            }
        }
    }

    async fn context_exists(&self, handle: &ContextHandle) -> bool {
        self.lock().live.contains_key(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_page_sequence() {
        let contexts = ScriptedContexts::new();
        contexts.set_page_sequence("https://a", vec!["one".to_string(), "two".to_string()]);

        let handle = contexts.open_context("https://a").await.unwrap();
        let first = contexts
            .run_extraction(&handle, &Extraction::PageContent)
            .await
            .unwrap();
        let second = contexts
            .run_extraction(&handle, &Extraction::PageContent)
            .await
            .unwrap();
        let third = contexts
            .run_extraction(&handle, &Extraction::PageContent)
            .await
            .unwrap();

        assert_eq!(first, ExtractionOutput::Html("one".to_string()));
        assert_eq!(second, ExtractionOutput::Html("two".to_string()));
        assert_eq!(third, ExtractionOutput::Html("two".to_string()));
    }

    #[tokio::test]
    async fn test_open_failures_are_consumed() {
        let contexts = ScriptedContexts::new();
        contexts.fail_open("https://a", 1);

        assert!(contexts.open_context("https://a").await.is_err());
        assert!(contexts.open_context("https://a").await.is_ok());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let contexts = ScriptedContexts::new();
        let handle = contexts.open_context("https://a").await.unwrap();

        contexts.close_context(&handle).await;
        contexts.close_context(&handle).await;

        assert!(!contexts.context_exists(&handle).await);
        assert!(contexts.was_closed(&handle));
        assert_eq!(contexts.live_count(), 0);
        assert_eq!(contexts.max_live(), 1);
    }

    #[tokio::test]
    async fn test_forget_all_drops_live_contexts() {
        let contexts = ScriptedContexts::new();
        let handle = contexts.open_context("https://a").await.unwrap();
        contexts.forget_all();
        assert!(!contexts.context_exists(&handle).await);
    }
}
