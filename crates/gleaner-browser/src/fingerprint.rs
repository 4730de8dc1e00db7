use gleaner_core::BrowserConfig;
use rand::seq::SliceRandom;

/// User agent and viewport presented by launched browsers.
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    pub user_agent: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

const VIEWPORTS: [(u32, u32); 4] = [(1920, 1080), (1680, 1050), (1536, 864), (1440, 900)];

impl FingerprintConfig {
    /// Pick a desktop user agent and viewport at random.
    pub fn randomized() -> Self {
        let mut rng = rand::thread_rng();
        let user_agent = USER_AGENTS.choose(&mut rng).copied().map(str::to_string);
        let (width, height) = VIEWPORTS.choose(&mut rng).copied().unwrap_or(VIEWPORTS[0]);

        Self {
            user_agent,
            viewport_width: width,
            viewport_height: height,
        }
    }

    /// Fingerprint for the configured window, randomized when requested.
    pub fn from_config(config: &BrowserConfig) -> Self {
        if config.randomize_fingerprint {
            return Self::randomized();
        }
        Self {
            user_agent: None,
            viewport_width: config.window_width,
            viewport_height: config.window_height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_randomized_fingerprint() {
        let config = FingerprintConfig::randomized();
        assert!(config.user_agent.as_deref().is_some_and(|ua| !ua.is_empty()));
        assert!(config.viewport_width > 0);
        assert!(config.viewport_height > 0);
    }

    #[test]
    fn test_from_config_keeps_window_size() {
        let browser = BrowserConfig {
            window_width: 1280,
            window_height: 720,
            ..BrowserConfig::default()
        };
        let config = FingerprintConfig::from_config(&browser);
        assert_eq!(config.viewport_width, 1280);
        assert_eq!(config.viewport_height, 720);
        assert!(config.user_agent.is_none());
    }

    #[test]
    fn test_from_config_randomizes_when_asked() {
        let browser = BrowserConfig {
            randomize_fingerprint: true,
            ..BrowserConfig::default()
        };
        assert!(FingerprintConfig::from_config(&browser).user_agent.is_some());
    }
}
