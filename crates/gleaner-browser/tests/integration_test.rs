use gleaner_browser::fingerprint::FingerprintConfig;
use gleaner_browser::{BrowserEngine, ExecutionContexts, Extraction};
use gleaner_core::BrowserConfig;

fn headless() -> BrowserConfig {
    BrowserConfig {
        headless: true,
        ..BrowserConfig::default()
    }
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_browser_engine_creation() {
    let engine = BrowserEngine::from_config(&headless()).await;
    assert!(engine.is_ok(), "Failed to create browser engine");
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_open_read_close_context() {
    let engine = BrowserEngine::from_config(&headless()).await.unwrap();

    let handle = engine.open_context("https://example.com").await.unwrap();
    assert!(engine.context_exists(&handle).await);

    let html = engine
        .run_extraction(&handle, &Extraction::PageContent)
        .await
        .unwrap()
        .into_html()
        .unwrap();
    assert!(html.contains("Example Domain"));

    engine.close_context(&handle).await;
    engine.close_context(&handle).await;
    assert!(!engine.context_exists(&handle).await);
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_navigate_existing_context() {
    let engine = BrowserEngine::from_config(&headless()).await.unwrap();

    let handle = engine.open_context("about:blank").await.unwrap();
    assert!(engine.navigate(&handle, "https://example.com").await.is_ok());
    engine.close_context(&handle).await;
}

#[tokio::test]
#[ignore] // Requires Chrome/Chromium installed
async fn test_tab_closed_elsewhere_is_gone() {
    let engine = BrowserEngine::from_config(&headless()).await.unwrap();
    let handle = engine.open_context("about:blank").await.unwrap();
    assert!(engine.context_exists(&handle).await);

    // A second engine attached to the same browser closes the tab.
    let other = BrowserEngine::connect(engine.websocket_address(), FingerprintConfig::randomized())
        .await
        .unwrap();
    other.close_context(&handle).await;
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    assert!(!engine.context_exists(&handle).await);
    assert!(engine.navigate(&handle, "https://example.com").await.is_err());
}
