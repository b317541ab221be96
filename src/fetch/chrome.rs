//! Headless Chrome over the DevTools protocol.
//!
//! `headless_chrome` is synchronous, so the whole session runs on the blocking
//! pool. The browser lives inside [`ChromeSession`]; dropping it closes the tab
//! and kills the Chrome process, which covers early returns and panics alike.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::sleep;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions, Tab};
use url::Url;

use super::{BrowserLimits, FetchConfig, FetchStrategy, RawPage, StrategyKind};
use crate::error::FetchError;
use crate::options::UserInteraction;
use crate::stealth;

#[derive(Debug, Clone, Default)]
pub struct ChromeFetch {
    chrome_path: Option<PathBuf>,
    limits: BrowserLimits,
}

impl ChromeFetch {
    pub fn new(chrome_path: Option<PathBuf>, limits: BrowserLimits) -> Self {
        Self { chrome_path, limits }
    }
}

/// One browser, one tab, one call.
struct ChromeSession {
    tab: Arc<Tab>,
    _browser: Browser,
}

impl ChromeSession {
    fn launch(chrome_path: Option<PathBuf>, config: &FetchConfig) -> Result<Self, FetchError> {
        let mut args = stealth::chrome_args(config);
        args.push("--headless=new".to_string());
        let os_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();

        let browser = Browser::new(LaunchOptions {
            // new headless mode comes from the flag above
            headless: false,
            window_size: Some(stealth::viewport(config.mobile)),
            path: chrome_path,
            args: os_args,
            ..Default::default()
        })
        .map_err(|e| automation(format!("failed to launch Chrome: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| automation(format!("failed to open tab: {}", e)))?;

        Ok(Self { tab, _browser: browser })
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(false) {
            tracing::debug!("Chrome tab close failed during teardown: {}", e);
        }
        tracing::debug!("🧹 Chrome session torn down");
    }
}

fn automation(message: impl Into<String>) -> FetchError {
    FetchError::automation(StrategyKind::Chrome, message)
}

fn map_navigation_error(err: anyhow::Error) -> FetchError {
    if err.downcast_ref::<headless_chrome::util::Timeout>().is_some() {
        return FetchError::timeout(StrategyKind::Chrome, "navigation timed out");
    }
    let message = err.to_string();
    if message.contains("net::ERR") {
        FetchError::network(StrategyKind::Chrome, message)
    } else {
        automation(message)
    }
}

fn prepare_tab(tab: &Tab, config: &FetchConfig) -> Result<(), FetchError> {
    let platform = if config.mobile { "iPhone" } else { "Win32" };
    tab.set_user_agent(&config.user_agent, Some("en-US,en;q=0.9"), Some(platform))
        .map_err(|e| automation(format!("set_user_agent failed: {}", e)))?;

    let mut extra: HashMap<&str, &str> = HashMap::new();
    if let Some(referer) = &config.referer {
        extra.insert("Referer", referer.as_str());
    }
    if let Some(cookies) = &config.cookies {
        extra.insert("Cookie", cookies.as_str());
    }
    if !extra.is_empty() {
        tab.set_extra_http_headers(extra)
            .map_err(|e| automation(format!("set_extra_http_headers failed: {}", e)))?;
    }

    tab.enable_debugger()
        .map_err(|e| automation(format!("enable_debugger failed: {}", e)))?;
    tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
        source: stealth::stealth_script(config.mobile),
        world_name: None,
        include_command_line_api: None,
        run_immediately: None,
    })
    .map_err(|e| automation(format!("stealth script injection failed: {}", e)))?;
    Ok(())
}

fn run_interaction(tab: &Tab, step: &UserInteraction, limits: &BrowserLimits) -> anyhow::Result<()> {
    match step {
        UserInteraction::Click { selector } => {
            tab.wait_for_element_with_custom_timeout(selector, limits.selector_timeout)?
                .click()?;
        }
        UserInteraction::Type { selector, value } => {
            let element = tab.wait_for_element_with_custom_timeout(selector, limits.selector_timeout)?;
            element.click()?;
            element.type_into(value)?;
        }
        UserInteraction::Scroll { selector } => {
            tab.wait_for_element_with_custom_timeout(selector, limits.selector_timeout)?
                .scroll_into_view()?;
        }
        UserInteraction::Wait { value } => {
            let wait = Duration::from_millis(UserInteraction::wait_millis(value.as_deref()));
            sleep(wait.min(limits.max_settle));
        }
    }
    Ok(())
}

/// Runs on a blocking thread. Every step after navigation is best-effort
/// except block detection and the final DOM read.
fn run_session(
    chrome_path: Option<PathBuf>,
    limits: BrowserLimits,
    config: FetchConfig,
) -> Result<RawPage, FetchError> {
    let started = Instant::now();
    let session = ChromeSession::launch(chrome_path, &config)?;
    let tab = &session.tab;

    prepare_tab(tab, &config)?;

    tab.set_default_timeout(limits.navigation_timeout(&config));
    tracing::info!("🧭 Chrome navigating to {}", config.url);
    tab.navigate_to(config.url.as_str())
        .and_then(|t| t.wait_until_navigated())
        .map_err(map_navigation_error)?;

    if let Some(settle) = limits.settle_time(&config) {
        sleep(settle);
    }

    if let Some(selector) = &config.wait_for_selector {
        if let Err(e) = tab.wait_for_element_with_custom_timeout(selector, limits.selector_timeout) {
            tracing::warn!("⚠️ Selector {} not found: {}. Continuing anyway...", selector, e);
        }
    }

    if config.scroll_to_bottom {
        if let Err(e) = tab.evaluate("window.scrollTo(0, document.body.scrollHeight);", false) {
            tracing::warn!("⚠️ Scroll to bottom failed: {}", e);
        }
        sleep(limits.scroll_settle);
    }

    for step in limits.interactions(&config) {
        if let Err(e) = run_interaction(tab, step, &limits) {
            tracing::warn!("⚠️ {} interaction failed: {}", step.label(), e);
        }
        sleep(limits.interaction_pause);
    }

    let html = tab
        .get_content()
        .map_err(|e| automation(format!("failed to read page content: {}", e)))?;
    let current = tab.get_url();

    if let Some(marker) = stealth::detect_block(&html, &current) {
        tracing::warn!("🛑 Block page detected on {} ({})", current, marker);
        return Err(FetchError::blocked(
            StrategyKind::Chrome,
            format!("block marker {:?} found at {}", marker, current),
        ));
    }

    let final_url = Url::parse(&current).unwrap_or_else(|_| config.url.clone());
    Ok(RawPage::new(html, final_url, None, StrategyKind::Chrome, started.elapsed()))
}

#[async_trait]
impl FetchStrategy for ChromeFetch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Chrome
    }

    async fn fetch(&self, config: &FetchConfig) -> Result<RawPage, FetchError> {
        if config.random_delay {
            stealth::random_delay().await;
        }

        let budget = self.limits.session_budget(config);
        let worker = tokio::task::spawn_blocking({
            let chrome_path = self.chrome_path.clone();
            let limits = self.limits.clone();
            let config = config.clone();
            move || run_session(chrome_path, limits, config)
        });

        // On expiry the worker keeps running its bounded steps and then drops
        // the session, so the browser is still reaped.
        match tokio::time::timeout(budget, worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(automation(format!("Chrome worker failed: {}", join_err))),
            Err(_) => Err(FetchError::timeout(
                StrategyKind::Chrome,
                format!("browser session exceeded {:?}", budget),
            )),
        }
    }
}
