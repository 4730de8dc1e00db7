//! Configuration management for Gleaner.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/gleaner/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// General application settings
    pub general: GeneralConfig,
    /// Harvest timing, paging and retry settings
    pub harvest: HarvestConfig,
    /// Structural selectors used to read listing and profile pages
    pub selectors: SelectorConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Persistence settings
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from an explicit path, falling back to defaults if
    /// the file does not exist.
    pub fn load_from_path(config_path: &Path) -> ConfigResult<Self> {
        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(config_path)?;
            let config: Self = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `GLEANER_HEADLESS`: Override browser headless mode (true/false)
    /// - `GLEANER_CONNECT_URL`: Attach to a running browser instead of launching one
    /// - `GLEANER_DB_PATH`: Override the state database location
    /// - `GLEANER_PAGE_SETTLE_MS`: Override the listing page settle delay
    pub fn load_with_env(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::load()?,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GLEANER_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Ok(val) = std::env::var("GLEANER_CONNECT_URL") {
            if !val.trim().is_empty() {
                tracing::debug!("Override browser.connect_url from env");
                self.browser.connect_url = Some(val);
            }
        }

        if let Ok(val) = std::env::var("GLEANER_DB_PATH") {
            if !val.trim().is_empty() {
                tracing::debug!("Override storage.database_path from env: {}", val);
                self.storage.database_path = Some(PathBuf::from(val));
            }
        }

        if let Ok(val) = std::env::var("GLEANER_PAGE_SETTLE_MS") {
            if let Ok(ms) = val.parse() {
                self.harvest.page_settle_ms = ms;
                tracing::debug!("Override harvest.page_settle_ms from env: {}", ms);
            }
        }
    }

    /// Reject values the harvest engine cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.harvest.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "harvest.page_size".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.harvest.retry_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "harvest.retry_attempts".to_string(),
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.selectors.listing.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "selectors.listing".to_string(),
                reason: "at least one listing strategy is required".to_string(),
            });
        }
        if self.selectors.document_link.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "selectors.document_link".to_string(),
                reason: "at least one document link selector is required".to_string(),
            });
        }
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/gleaner/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "gleaner", "gleaner").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/gleaner`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "gleaner", "gleaner").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Resolve the state database path, defaulting to the data directory.
    pub fn database_path(&self) -> ConfigResult<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::data_dir()?.join("gleaner.db")),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Tracing filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_filter: "info,gleaner=debug".to_string(),
        }
    }
}

/// Harvest timing, paging and retry settings.
///
/// Delays are stored in milliseconds so the TOML stays readable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Items per listing page on the remote platform
    pub page_size: u32,
    /// Query parameter carrying the listing offset
    pub page_query_param: String,
    /// Item count below which discovery escalates with scroll-and-rescan
    pub expected_page_size: usize,
    /// Maximum scroll-and-rescan rounds per discovery
    pub max_escalation_rounds: u32,
    /// Wait after navigating the listing context
    pub page_settle_ms: u64,
    /// Wait after a synthetic scroll before rescanning
    pub escalation_settle_ms: u64,
    /// Wait after opening an item in the visit pass
    pub visit_settle_ms: u64,
    /// Wait after opening an item, and again after triggering retrieval, in the download pass
    pub download_settle_ms: u64,
    /// Wait after opening an item during replay
    pub replay_settle_ms: u64,
    /// Wait between items during replay
    pub replay_item_delay_ms: u64,
    /// Attempts per wrapped operation
    pub retry_attempts: u32,
    /// Job-wide consecutive failure budget
    pub retry_failure_budget: u32,
    /// Backoff unit; attempt `n` waits `n` times this
    pub retry_base_delay_ms: u64,
    /// Time allowed for the worker to observe a stop before it is forced
    pub stop_grace_ms: u64,
    /// Required host suffix for target URLs (`None` accepts any host)
    pub required_host: Option<String>,
    /// Buffered snapshots per status subscriber
    pub status_channel_capacity: usize,
}

impl HarvestConfig {
    /// Listing page settle delay.
    #[must_use]
    pub fn page_settle(&self) -> Duration {
        Duration::from_millis(self.page_settle_ms)
    }

    /// Discovery escalation settle delay.
    #[must_use]
    pub fn escalation_settle(&self) -> Duration {
        Duration::from_millis(self.escalation_settle_ms)
    }

    /// Visit pass settle delay.
    #[must_use]
    pub fn visit_settle(&self) -> Duration {
        Duration::from_millis(self.visit_settle_ms)
    }

    /// Download pass settle delay.
    #[must_use]
    pub fn download_settle(&self) -> Duration {
        Duration::from_millis(self.download_settle_ms)
    }

    /// Replay navigate settle delay.
    #[must_use]
    pub fn replay_settle(&self) -> Duration {
        Duration::from_millis(self.replay_settle_ms)
    }

    /// Replay inter-item delay.
    #[must_use]
    pub fn replay_item_delay(&self) -> Duration {
        Duration::from_millis(self.replay_item_delay_ms)
    }

    /// Retry backoff unit.
    #[must_use]
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Stop grace period.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_size: 25,
            page_query_param: "start".to_string(),
            expected_page_size: 25,
            max_escalation_rounds: 3,
            page_settle_ms: 5000,
            escalation_settle_ms: 2000,
            visit_settle_ms: 2000,
            download_settle_ms: 3000,
            replay_settle_ms: 3000,
            replay_item_delay_ms: 2000,
            retry_attempts: 3,
            retry_failure_budget: 3,
            retry_base_delay_ms: 1000,
            stop_grace_ms: 1000,
            required_host: Some("linkedin.com".to_string()),
            status_channel_capacity: 256,
        }
    }
}

/// One ranked way of finding items on a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingSelector {
    /// Selector matching one element per item
    pub item: String,
    /// Selector, relative to the item, of the anchor leading to the item page
    pub link: String,
}

impl ListingSelector {
    /// Convenience constructor.
    #[must_use]
    pub fn new(item: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            link: link.into(),
        }
    }
}

/// Structural selectors, in rank order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Listing strategies; the one yielding the most distinct items wins
    pub listing: Vec<ListingSelector>,
    /// Name sub-selectors tried in order inside each item
    pub name: Vec<String>,
    /// Document link selectors tried in order on an item page
    pub document_link: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            listing: vec![
                ListingSelector::new(".hiring-applicants__list-item", "a"),
                ListingSelector::new(
                    "li.artdeco-list__item",
                    "a[href*='/hiring/applicants/']",
                ),
                ListingSelector::new("[data-view-name='job-applicant-list-item']", "a[href]"),
                ListingSelector::new("ul.hiring-applicants__list > li", "a[href]"),
            ],
            name: vec![
                ".artdeco-entity-lockup__title".to_string(),
                ".hiring-people-card__title".to_string(),
                "[data-test-applicant-name]".to_string(),
                "a span[aria-hidden='true']".to_string(),
            ],
            document_link: vec![
                ".hiring-resume-viewer__resume-wrapper--collapsed a".to_string(),
                ".hiring-resume-viewer__resume-wrapper a".to_string(),
                "a[href*='/ambry/']".to_string(),
                "a[download]".to_string(),
            ],
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// DevTools websocket URL of an already running browser to attach to
    pub connect_url: Option<String>,
    /// Randomize user agent and viewport for launched browsers
    pub randomize_fingerprint: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: 1920,
            window_height: 1080,
            connect_url: None,
            randomize_fingerprint: false,
        }
    }
}

/// Persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// State database file; defaults to `<data_dir>/gleaner.db`
    pub database_path: Option<PathBuf>,
}
