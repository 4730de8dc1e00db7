use crate::contexts::{ContextHandle, ExecutionContexts, Extraction, ExtractionOutput};
use crate::error::{BrowserError, Result};
use crate::fingerprint::FingerprintConfig;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::Page;
use futures::stream::StreamExt;
use gleaner_core::BrowserConfig;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const SCROLL_TO_END: &str = "window.scrollTo(0, document.body.scrollHeight); true";

/// Browser automation engine backed by Chromium over the DevTools protocol.
///
/// Each execution context is one tab. Tabs opened by another process are
/// adopted on demand when the engine is attached to a running browser.
pub struct BrowserEngine {
    browser: Browser,
    fingerprint: FingerprintConfig,
    pages: Mutex<HashMap<ContextHandle, Page>>,
    handler: JoinHandle<()>,
}

impl BrowserEngine {
    /// Launch or attach to a browser according to `config`.
    pub async fn from_config(config: &BrowserConfig) -> Result<Self> {
        let fingerprint = FingerprintConfig::from_config(config);
        match &config.connect_url {
            Some(url) => Self::connect(url, fingerprint).await,
            None => Self::launch(config, fingerprint).await,
        }
    }

    /// Launch a new browser process.
    pub async fn launch(config: &BrowserConfig, fingerprint: FingerprintConfig) -> Result<Self> {
        let mut builder = LaunchConfig::builder()
            .no_sandbox()
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height);
        if !config.headless {
            builder = builder.with_head();
        }
        let launch_config = builder.build().map_err(BrowserError::ChromiumError)?;

        let (browser, handler) = Browser::launch(launch_config)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        tracing::info!(headless = config.headless, "Launched browser");
        Ok(Self::with_browser(browser, handler, fingerprint))
    }

    /// Attach to a browser that is already running, so its tabs can outlive
    /// this process.
    pub async fn connect(ws_url: &str, fingerprint: FingerprintConfig) -> Result<Self> {
        let (browser, handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))?;

        tracing::info!("Attached to running browser");
        Ok(Self::with_browser(browser, handler, fingerprint))
    }

    fn with_browser(
        browser: Browser,
        mut handler: chromiumoxide::Handler,
        fingerprint: FingerprintConfig,
    ) -> Self {
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler event error: {}", e);
                }
            }
        });

        Self {
            browser,
            fingerprint,
            pages: Mutex::new(HashMap::new()),
            handler,
        }
    }

    /// Address of the browser's DevTools websocket, for attaching another
    /// engine to the same browser.
    pub fn websocket_address(&self) -> &str {
        self.browser.websocket_address()
    }

    async fn page(&self, handle: &ContextHandle) -> Result<Page> {
        if let Some(page) = self.pages.lock().await.get(handle) {
            return Ok(page.clone());
        }
        let page = self
            .find_tab(handle)
            .await
            .ok_or_else(|| BrowserError::ContextNotFound(handle.to_string()))?;
        self.pages.lock().await.insert(handle.clone(), page.clone());
        tracing::debug!(context = %handle, "Adopted existing tab");
        Ok(page)
    }

    /// Look for a tab with this target id among all tabs of the browser.
    async fn find_tab(&self, handle: &ContextHandle) -> Option<Page> {
        let pages = match self.browser.pages().await {
            Ok(pages) => pages,
            Err(e) => {
                tracing::warn!("Failed to list browser tabs: {}", e);
                return None;
            }
        };
        pages
            .into_iter()
            .find(|page| page.target_id().inner() == handle.as_str())
    }
}

#[async_trait]
impl ExecutionContexts for BrowserEngine {
    async fn open_context(&self, url: &str) -> Result<ContextHandle> {
        let page = self
            .browser
            .new_page(url)
            .await
            .map_err(|e| BrowserError::ContextCreation(e.to_string()))?;

        if let Some(user_agent) = &self.fingerprint.user_agent {
            if let Err(e) = page
                .set_user_agent(SetUserAgentOverrideParams::new(user_agent.clone()))
                .await
            {
                tracing::warn!("Failed to override user agent: {}", e);
            }
        }

        let handle = ContextHandle::new(page.target_id().inner().clone());
        self.pages.lock().await.insert(handle.clone(), page);
        tracing::debug!(context = %handle, url, "Opened context");
        Ok(handle)
    }

    async fn close_context(&self, handle: &ContextHandle) {
        let cached = self.pages.lock().await.remove(handle);
        let page = match cached {
            Some(page) => Some(page),
            None => self.find_tab(handle).await,
        };
        let Some(page) = page else {
            tracing::debug!(context = %handle, "Close requested for unknown context");
            return;
        };
        if let Err(e) = page.close().await {
            tracing::debug!(context = %handle, "Ignoring close error: {}", e);
        }
    }

    async fn navigate(&self, handle: &ContextHandle, url: &str) -> Result<()> {
        let page = self.page(handle).await?;
        page.goto(url)
            .await
            .map_err(|e| BrowserError::NavigationError(format!("{url}: {e}")))?;
        Ok(())
    }

    async fn run_extraction(
        &self,
        handle: &ContextHandle,
        extraction: &Extraction,
    ) -> Result<ExtractionOutput> {
        let page = self.page(handle).await?;
        match extraction {
            Extraction::PageContent => page
                .content()
                .await
                .map(ExtractionOutput::Html)
                .map_err(|e| BrowserError::ExtractionError(e.to_string())),
            Extraction::ScrollToEnd => page
                .evaluate(SCROLL_TO_END)
                .await
                .map(|_| ExtractionOutput::Done)
                .map_err(|e| BrowserError::ExtractionError(e.to_string())),
            Extraction::Script(script) => {
                let result = page
                    .evaluate(script.as_str())
                    .await
                    .map_err(|e| BrowserError::ExtractionError(e.to_string()))?;
                Ok(ExtractionOutput::Value(
                    result.value().cloned().unwrap_or(serde_json::Value::Null),
                ))
            }
        }
    }

    /// Asks the browser rather than the cache, so a tab closed behind the
    /// engine's back reports as gone.
    async fn context_exists(&self, handle: &ContextHandle) -> bool {
        match self.find_tab(handle).await {
            Some(page) => {
                self.pages.lock().await.insert(handle.clone(), page);
                true
            }
            None => {
                if self.pages.lock().await.remove(handle).is_some() {
                    tracing::debug!(context = %handle, "Evicted closed tab");
                }
                false
            }
        }
    }
}

impl Drop for BrowserEngine {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
