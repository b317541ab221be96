//! Fetch strategies: interchangeable ways of turning a URL into rendered HTML.
//!
//! - [`http::HttpFetch`]: a single browser-like GET via reqwest
//! - [`chrome::ChromeFetch`]: headless Chrome over the DevTools protocol
//! - [`webdriver::WebDriverFetch`]: a W3C WebDriver session (chromedriver)
//!
//! Browser strategies launch one isolated browser per call and tear it down on
//! every exit path; nothing is pooled or shared between calls.

pub mod chrome;
pub mod http;
pub mod webdriver;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::config::ServiceConfig;
use crate::error::{FetchError, ScrapeError};
use crate::options::{non_empty, ScrapeOptions, UserInteraction};
use crate::proxy::ProxySpec;
use crate::stealth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Http,
    Chrome,
    WebDriver,
}

impl StrategyKind {
    /// Run order used by the method comparator.
    pub const ALL: [StrategyKind; 3] = [StrategyKind::Http, StrategyKind::Chrome, StrategyKind::WebDriver];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Http => "http",
            StrategyKind::Chrome => "chrome",
            StrategyKind::WebDriver => "webdriver",
        }
    }

    pub fn is_browser(self) -> bool {
        !matches!(self, StrategyKind::Http)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy choice is a pure function of the two browser flags.
pub fn select_strategy(use_browser: bool, use_selenium: bool) -> StrategyKind {
    match (use_browser, use_selenium) {
        (false, _) => StrategyKind::Http,
        (true, true) => StrategyKind::WebDriver,
        (true, false) => StrategyKind::Chrome,
    }
}

/// Everything a strategy needs for one fetch. Built once per call.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub url: Url,
    pub timeout: Duration,
    pub follow_redirects: bool,
    pub user_agent: String,
    pub referer: Option<String>,
    pub cookies: Option<String>,
    pub proxy: Option<ProxySpec>,
    pub random_delay: bool,
    pub stealth: bool,
    pub mobile: bool,
    pub wait_for_selector: Option<String>,
    pub wait_for_timeout: Option<Duration>,
    pub scroll_to_bottom: bool,
    pub interactions: Vec<UserInteraction>,
}

impl FetchConfig {
    pub fn from_options(url: Url, options: &ScrapeOptions) -> Result<Self, ScrapeError> {
        let user_agent = match non_empty(&options.user_agent) {
            Some(ua) => ua.to_string(),
            None if options.mobile => stealth::MOBILE_USER_AGENT.to_string(),
            None if options.stealth => stealth::rotate_user_agent().to_string(),
            None => stealth::DEFAULT_USER_AGENT.to_string(),
        };

        let referer = non_empty(&options.referer)
            .map(str::to_string)
            .or_else(|| options.stealth.then(|| stealth::DEFAULT_REFERER.to_string()));

        let proxy = non_empty(&options.proxy)
            .map(ProxySpec::parse)
            .transpose()
            .map_err(ScrapeError::InvalidOptions)?;

        Ok(Self {
            url,
            timeout: Duration::from_millis(options.timeout),
            follow_redirects: options.follow_redirects,
            user_agent,
            referer,
            cookies: non_empty(&options.cookies).map(str::to_string),
            proxy,
            random_delay: options.random_delay || options.stealth,
            stealth: options.stealth,
            mobile: options.mobile,
            wait_for_selector: non_empty(&options.wait_for_selector).map(str::to_string),
            wait_for_timeout: options
                .wait_for_timeout
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            scroll_to_bottom: options.scroll_to_bottom,
            interactions: options.user_interactions.clone(),
        })
    }
}

/// HTML as retrieved by one strategy. Consumed by extraction.
#[derive(Debug, Clone)]
pub struct RawPage {
    pub html: String,
    pub byte_len: usize,
    pub last_modified: Option<String>,
    /// URL after redirects; relative links resolve against this.
    pub final_url: Url,
    pub strategy: StrategyKind,
    pub elapsed: Duration,
}

impl RawPage {
    pub fn new(
        html: String,
        final_url: Url,
        last_modified: Option<String>,
        strategy: StrategyKind,
        elapsed: Duration,
    ) -> Self {
        Self {
            byte_len: html.len(),
            html,
            last_modified,
            final_url,
            strategy,
            elapsed,
        }
    }
}

#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn fetch(&self, config: &FetchConfig) -> Result<RawPage, FetchError>;
}

/// Bounds applied to every browser session.
#[derive(Debug, Clone)]
pub struct BrowserLimits {
    pub navigation_timeout: Duration,
    pub max_settle: Duration,
    pub selector_timeout: Duration,
    pub scroll_settle: Duration,
    pub max_interactions: usize,
    pub interaction_pause: Duration,
}

impl Default for BrowserLimits {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(15),
            max_settle: Duration::from_secs(5),
            selector_timeout: Duration::from_secs(5),
            scroll_settle: Duration::from_secs(1),
            max_interactions: 2,
            interaction_pause: Duration::from_millis(300),
        }
    }
}

impl BrowserLimits {
    pub fn navigation_timeout(&self, config: &FetchConfig) -> Duration {
        config.timeout.min(self.navigation_timeout)
    }

    pub fn settle_time(&self, config: &FetchConfig) -> Option<Duration> {
        config.wait_for_timeout.map(|wait| wait.min(self.max_settle))
    }

    pub fn interactions<'a>(&self, config: &'a FetchConfig) -> &'a [UserInteraction] {
        let n = config.interactions.len().min(self.max_interactions);
        if n < config.interactions.len() {
            tracing::debug!(
                "Capping user interactions at {} (requested {})",
                n,
                config.interactions.len()
            );
        }
        &config.interactions[..n]
    }

    /// Worst-case wall time of one session, used as an outer guard.
    pub fn session_budget(&self, config: &FetchConfig) -> Duration {
        let interactions = self.interactions(config).len() as u32;
        self.navigation_timeout(config)
            + self.settle_time(config).unwrap_or_default()
            + self.selector_timeout
            + self.scroll_settle
            + (self.selector_timeout + self.interaction_pause) * interactions
            + Duration::from_secs(10)
    }
}

/// One strategy instance per kind, shared by every request.
#[derive(Clone)]
pub struct FetchStrategies {
    pub http: Arc<dyn FetchStrategy>,
    pub chrome: Arc<dyn FetchStrategy>,
    pub webdriver: Arc<dyn FetchStrategy>,
}

impl FetchStrategies {
    pub fn live(config: &ServiceConfig) -> Self {
        Self {
            http: Arc::new(http::HttpFetch::new()),
            chrome: Arc::new(chrome::ChromeFetch::new(
                config.chrome_path.clone(),
                config.browser_limits.clone(),
            )),
            webdriver: Arc::new(webdriver::WebDriverFetch::new(
                config.webdriver_url.clone(),
                config.browser_limits.clone(),
            )),
        }
    }

    pub fn get(&self, kind: StrategyKind) -> &Arc<dyn FetchStrategy> {
        match kind {
            StrategyKind::Http => &self.http,
            StrategyKind::Chrome => &self.chrome,
            StrategyKind::WebDriver => &self.webdriver,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn url() -> Url {
        Url::parse("https://shop.example.com/item/1").unwrap()
    }

    #[test]
    fn test_select_strategy() {
        assert_eq!(select_strategy(false, false), StrategyKind::Http);
        assert_eq!(select_strategy(false, true), StrategyKind::Http);
        assert_eq!(select_strategy(true, false), StrategyKind::Chrome);
        assert_eq!(select_strategy(true, true), StrategyKind::WebDriver);
    }

    #[test]
    fn test_fetch_config_defaults() {
        let config = FetchConfig::from_options(url(), &ScrapeOptions::default()).unwrap();
        assert_eq!(config.user_agent, stealth::DEFAULT_USER_AGENT);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.referer.is_none());
        assert!(!config.random_delay);
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_fetch_config_stealth_and_mobile() {
        let options = ScrapeOptions {
            stealth: true,
            mobile: true,
            cookies: Some("".to_string()),
            ..ScrapeOptions::default()
        };
        let config = FetchConfig::from_options(url(), &options).unwrap();
        assert_eq!(config.user_agent, stealth::MOBILE_USER_AGENT);
        assert_eq!(config.referer.as_deref(), Some(stealth::DEFAULT_REFERER));
        assert!(config.random_delay);
        assert!(config.cookies.is_none());
    }

    #[test]
    fn test_explicit_user_agent_wins() {
        let options = ScrapeOptions {
            user_agent: Some("custom-agent/1.0".to_string()),
            mobile: true,
            ..ScrapeOptions::default()
        };
        let config = FetchConfig::from_options(url(), &options).unwrap();
        assert_eq!(config.user_agent, "custom-agent/1.0");
    }

    #[test]
    fn test_browser_limits_caps() {
        let limits = BrowserLimits::default();
        let options = ScrapeOptions {
            wait_for_timeout: Some(20_000),
            user_interactions: vec![
                UserInteraction::Wait { value: None },
                UserInteraction::Wait { value: None },
                UserInteraction::Wait { value: None },
            ],
            ..ScrapeOptions::default()
        };
        let config = FetchConfig::from_options(url(), &options).unwrap();
        assert_eq!(limits.navigation_timeout(&config), Duration::from_secs(15));
        assert_eq!(limits.settle_time(&config), Some(Duration::from_secs(5)));
        assert_eq!(limits.interactions(&config).len(), 2);
    }
}
