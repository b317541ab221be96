//! W3C WebDriver backend (chromedriver by default).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};
use tokio::time::{sleep, timeout};

use super::{BrowserLimits, FetchConfig, FetchStrategy, RawPage, StrategyKind};
use crate::error::FetchError;
use crate::options::UserInteraction;
use crate::stealth;

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

#[derive(Debug, Clone)]
pub struct WebDriverFetch {
    webdriver_url: String,
    limits: BrowserLimits,
}

impl WebDriverFetch {
    pub fn new(webdriver_url: impl Into<String>, limits: BrowserLimits) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            limits,
        }
    }

    fn capabilities(config: &FetchConfig) -> Map<String, Value> {
        let mut args = stealth::chrome_args(config);
        args.push("--headless=new".to_string());

        let mut caps = Map::new();
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({
                "args": args,
                "excludeSwitches": ["enable-automation"],
            }),
        );
        caps
    }
}

impl Default for WebDriverFetch {
    fn default() -> Self {
        Self::new(DEFAULT_WEBDRIVER_URL, BrowserLimits::default())
    }
}

/// Owns the WebDriver session for one call.
///
/// `close` ends it on the normal path. If the future is dropped first
/// (deadline, client disconnect) `Drop` hands the close to the runtime.
struct WebDriverSession {
    client: Client,
    closed: bool,
}

impl WebDriverSession {
    async fn connect(webdriver_url: &str, config: &FetchConfig) -> Result<Self, FetchError> {
        let client = ClientBuilder::native()
            .capabilities(WebDriverFetch::capabilities(config))
            .connect(webdriver_url)
            .await
            .map_err(|e| {
                automation(format!("failed to start WebDriver session at {}: {}", webdriver_url, e))
            })?;
        Ok(Self { client, closed: false })
    }

    /// Marks the session closed only once the driver has answered, so a
    /// close cancelled mid-request is retried from `Drop`.
    async fn close(&mut self) {
        if let Err(e) = self.client.clone().close().await {
            tracing::debug!("WebDriver session close failed: {}", e);
        }
        self.closed = true;
        tracing::debug!("🧹 WebDriver session closed");
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let client = self.client.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = client.close().await {
                        tracing::debug!("Deferred WebDriver close failed: {}", e);
                    }
                });
            }
            Err(_) => tracing::warn!("⚠️ No runtime to close abandoned WebDriver session"),
        }
    }
}

fn automation(message: impl Into<String>) -> FetchError {
    FetchError::automation(StrategyKind::WebDriver, message)
}

fn map_cmd_error(err: CmdError) -> FetchError {
    let message = err.to_string();
    if message.contains("net::ERR") {
        FetchError::network(StrategyKind::WebDriver, message)
    } else if message.contains("timeout") {
        FetchError::timeout(StrategyKind::WebDriver, message)
    } else {
        automation(message)
    }
}

async fn find(client: &Client, selector: &str, limits: &BrowserLimits) -> Result<Element, CmdError> {
    client
        .wait()
        .at_most(limits.selector_timeout)
        .for_element(Locator::Css(selector))
        .await
}

async fn run_interaction(
    client: &Client,
    step: &UserInteraction,
    limits: &BrowserLimits,
) -> Result<(), CmdError> {
    match step {
        UserInteraction::Click { selector } => {
            find(client, selector, limits).await?.click().await?;
        }
        UserInteraction::Type { selector, value } => {
            let element = find(client, selector, limits).await?;
            element.clear().await?;
            element.send_keys(value).await?;
        }
        UserInteraction::Scroll { selector } => {
            find(client, selector, limits).await?;
            client
                .execute(
                    "document.querySelector(arguments[0]).scrollIntoView({ block: 'center' });",
                    vec![json!(selector)],
                )
                .await?;
        }
        UserInteraction::Wait { value } => {
            let wait = Duration::from_millis(UserInteraction::wait_millis(value.as_deref()));
            sleep(wait.min(limits.max_settle)).await;
        }
    }
    Ok(())
}

async fn drive(
    client: &Client,
    config: &FetchConfig,
    limits: &BrowserLimits,
) -> Result<(String, String), FetchError> {
    let nav_timeout = limits.navigation_timeout(config);
    tracing::info!("🧭 WebDriver navigating to {}", config.url);
    match timeout(nav_timeout, client.goto(config.url.as_str())).await {
        Ok(result) => result.map_err(map_cmd_error)?,
        Err(_) => {
            return Err(FetchError::timeout(
                StrategyKind::WebDriver,
                format!("navigation exceeded {:?}", nav_timeout),
            ))
        }
    }

    // No pre-document hook over plain WebDriver; patch the loaded page instead.
    if let Err(e) = client.execute(&stealth::stealth_script(config.mobile), vec![]).await {
        tracing::debug!("Stealth script failed after load: {}", e);
    }

    if let Some(settle) = limits.settle_time(config) {
        sleep(settle).await;
    }

    if let Some(selector) = &config.wait_for_selector {
        if let Err(e) = find(client, selector, limits).await {
            tracing::warn!("⚠️ Selector {} not found: {}. Continuing anyway...", selector, e);
        }
    }

    if config.scroll_to_bottom {
        if let Err(e) = client
            .execute("window.scrollTo(0, document.body.scrollHeight);", vec![])
            .await
        {
            tracing::warn!("⚠️ Scroll to bottom failed: {}", e);
        }
        sleep(limits.scroll_settle).await;
    }

    for step in limits.interactions(config) {
        if let Err(e) = run_interaction(client, step, limits).await {
            tracing::warn!("⚠️ {} interaction failed: {}", step.label(), e);
        }
        sleep(limits.interaction_pause).await;
    }

    let html = client.source().await.map_err(map_cmd_error)?;
    let current = client
        .current_url()
        .await
        .map(|u| u.to_string())
        .unwrap_or_else(|_| config.url.to_string());
    Ok((html, current))
}

#[async_trait]
impl FetchStrategy for WebDriverFetch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::WebDriver
    }

    async fn fetch(&self, config: &FetchConfig) -> Result<RawPage, FetchError> {
        if config.referer.is_some() || config.cookies.is_some() {
            tracing::info!("WebDriver backend cannot set request headers; referer/cookies ignored");
        }
        if config.random_delay {
            stealth::random_delay().await;
        }

        let started = Instant::now();
        let mut session = WebDriverSession::connect(&self.webdriver_url, config).await?;
        let outcome = drive(&session.client, config, &self.limits).await;
        session.close().await;

        let (html, current) = outcome?;
        if let Some(marker) = stealth::detect_block(&html, &current) {
            tracing::warn!("🛑 Block page detected on {} ({})", current, marker);
            return Err(FetchError::blocked(
                StrategyKind::WebDriver,
                format!("block marker {:?} found at {}", marker, current),
            ));
        }

        let final_url = url::Url::parse(&current).unwrap_or_else(|_| config.url.clone());
        Ok(RawPage::new(html, final_url, None, StrategyKind::WebDriver, started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ScrapeOptions;

    #[test]
    fn test_capabilities_carry_stealth_args() {
        let options = ScrapeOptions {
            mobile: true,
            ..ScrapeOptions::default()
        };
        let config =
            FetchConfig::from_options(url::Url::parse("https://example.com").unwrap(), &options).unwrap();
        let caps = WebDriverFetch::capabilities(&config);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.iter().any(|a| a == "--headless=new"));
        assert!(args.iter().any(|a| a == "--window-size=390,844"));
        assert!(args
            .iter()
            .any(|a| a.as_str().unwrap_or_default().starts_with("--user-agent=Mozilla/5.0 (iPhone")));
    }

    #[tokio::test]
    async fn test_unreachable_driver_is_automation_error() {
        let fetch = WebDriverFetch::new("http://127.0.0.1:9", BrowserLimits::default());
        let config = FetchConfig::from_options(
            url::Url::parse("https://example.com").unwrap(),
            &ScrapeOptions::default(),
        )
        .unwrap();
        let err = fetch.fetch(&config).await.unwrap_err();
        assert_eq!(err.kind, crate::error::FetchErrorKind::Automation);
        assert_eq!(err.strategy, StrategyKind::WebDriver);
    }

    #[tokio::test]
    async fn test_cancelled_close_leaves_session_open_for_drop() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let driver = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/session"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": { "sessionId": "s-1", "capabilities": {} }
            })))
            .mount(&driver)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/session/s-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "value": null }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&driver)
            .await;

        let config = FetchConfig::from_options(
            url::Url::parse("https://example.com").unwrap(),
            &ScrapeOptions::default(),
        )
        .unwrap();
        let mut session = WebDriverSession::connect(&driver.uri(), &config).await.unwrap();

        let cancelled = tokio::time::timeout(Duration::from_millis(200), session.close()).await;
        assert!(cancelled.is_err());
        assert!(!session.closed);
    }
}
