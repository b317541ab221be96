//! Fetch → extract → record, with one browser-to-HTTP fallback.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::Instrument;
use url::Url;
use uuid::Uuid;
use utoipa::ToSchema;

use crate::error::{FetchError, ScrapeError};
use crate::extract::{self, ExtractedDocument};
use crate::fetch::{select_strategy, FetchConfig, FetchStrategies, RawPage, StrategyKind};
use crate::history::{PriceHistoryEntry, PriceHistoryStore};
use crate::options::ScrapeOptions;
use crate::retry::RetryPolicy;

/// Which path produced a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum MethodUsed {
    #[serde(rename = "http")]
    Http,
    #[serde(rename = "chrome")]
    Chrome,
    #[serde(rename = "webdriver")]
    WebDriver,
    /// A browser strategy failed and plain HTTP served the page instead.
    #[serde(rename = "http-fallback")]
    HttpFallback,
}

impl From<StrategyKind> for MethodUsed {
    fn from(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Http => MethodUsed::Http,
            StrategyKind::Chrome => MethodUsed::Chrome,
            StrategyKind::WebDriver => MethodUsed::WebDriver,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub document: ExtractedDocument,
    pub method_used: MethodUsed,
}

/// Accepts absolute http(s) URLs only.
pub fn parse_target(raw: &str) -> Result<Url, ScrapeError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ScrapeError::InvalidUrl("URL is required".to_string()));
    }
    let url = Url::parse(raw).map_err(|e| ScrapeError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(ScrapeError::InvalidUrl(format!("{}: only http(s) URLs can be scraped", raw))),
    }
}

pub struct ScrapeOrchestrator {
    strategies: FetchStrategies,
    history: Arc<PriceHistoryStore>,
    retry: RetryPolicy,
}

impl ScrapeOrchestrator {
    pub fn new(strategies: FetchStrategies, history: Arc<PriceHistoryStore>, retry: RetryPolicy) -> Self {
        Self {
            strategies,
            history,
            retry,
        }
    }

    pub async fn scrape(&self, url: &str, options: &ScrapeOptions) -> Result<ScrapeOutcome, ScrapeError> {
        options.validate()?;
        let config = FetchConfig::from_options(parse_target(url)?, options)?;
        let kind = select_strategy(options.use_browser, options.use_selenium);
        let span = tracing::info_span!(
            "scrape",
            request_id = %Uuid::new_v4(),
            url = %config.url,
            strategy = %kind
        );

        async {
            let started = Instant::now();
            match self.fetch_with(kind, &config, &self.retry).await {
                Ok(page) => self.finish(page, &config, options, kind.into(), started).await,
                Err(err) if kind.is_browser() => {
                    tracing::warn!("⚠️ {} failed ({}); falling back to plain HTTP", kind, err);
                    let page = self.fetch_with(StrategyKind::Http, &config, &self.retry).await?;
                    self.finish(page, &config, options, MethodUsed::HttpFallback, started)
                        .await
                }
                Err(err) => Err(err.into()),
            }
        }
        .instrument(span)
        .await
    }

    /// One named strategy, no fallback. Used by the method comparator.
    pub async fn scrape_with(
        &self,
        kind: StrategyKind,
        url: &str,
        options: &ScrapeOptions,
        policy: &RetryPolicy,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        options.validate()?;
        let config = FetchConfig::from_options(parse_target(url)?, options)?;
        let span = tracing::info_span!("scrape_with", url = %config.url, strategy = %kind);

        async {
            let started = Instant::now();
            let page = self.fetch_with(kind, &config, policy).await?;
            self.finish(page, &config, options, kind.into(), started).await
        }
        .instrument(span)
        .await
    }

    /// History is keyed by the normalized request URL.
    pub fn price_history(&self, url: &str) -> Vec<PriceHistoryEntry> {
        match parse_target(url) {
            Ok(parsed) => self.history.get(parsed.as_str()),
            Err(_) => self.history.get(url.trim()),
        }
    }

    async fn fetch_with(
        &self,
        kind: StrategyKind,
        config: &FetchConfig,
        policy: &RetryPolicy,
    ) -> Result<RawPage, FetchError> {
        let strategy = self.strategies.get(kind).as_ref();
        let label = format!("{} {}", kind, config.url);
        policy.run(&label, move |_| strategy.fetch(config)).await
    }

    async fn finish(
        &self,
        page: RawPage,
        config: &FetchConfig,
        options: &ScrapeOptions,
        method_used: MethodUsed,
        started: Instant,
    ) -> Result<ScrapeOutcome, ScrapeError> {
        let RawPage {
            html,
            byte_len,
            last_modified,
            final_url,
            elapsed,
            ..
        } = page;
        let mask = options.field_mask();
        let max_results = options.max_results;

        let mut document = tokio::task::spawn_blocking(move || {
            extract::extract(&html, &final_url, &mask, max_results)
        })
        .await
        .map_err(|e| ScrapeError::Extraction(e.to_string()))?;

        document.last_modified = last_modified;
        document.stats.page_size = byte_len;
        document.stats.fetch_time_ms = elapsed.as_millis() as u64;
        document.stats.processing_time_ms = started.elapsed().as_millis() as u64;

        self.history.record(config.url.as_str(), &document.prices);

        tracing::info!(
            "✅ Scraped {} via {:?}: {} elements, {} prices in {}ms",
            config.url,
            method_used,
            document.stats.total_elements,
            document.prices.len(),
            document.stats.processing_time_ms
        );
        Ok(ScrapeOutcome {
            document,
            method_used,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;
    use crate::fetch::testing::{strategies, Script, ScriptedFetch};

    const DENIED: &str = "<html><head><title>Shop</title></head><body><h1>Access Denied</h1>\
                          <p>Reference #18.2f</p></body></html>";
    const PRODUCT: &str = "<html><head><title>Widget</title></head><body><h1>Widget</h1>\
                           <p>Now $19.99, was $24.99</p></body></html>";

    fn orchestrator(
        http: Arc<ScriptedFetch>,
        chrome: Arc<ScriptedFetch>,
        webdriver: Arc<ScriptedFetch>,
    ) -> (ScrapeOrchestrator, Arc<PriceHistoryStore>) {
        let history = Arc::new(PriceHistoryStore::default());
        let orch = ScrapeOrchestrator::new(
            strategies(http, chrome, webdriver),
            Arc::clone(&history),
            RetryPolicy::default(),
        );
        (orch, history)
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_browser_falls_back_to_http() {
        let http = ScriptedFetch::new(StrategyKind::Http, Script::Html(DENIED));
        let chrome = ScriptedFetch::new(StrategyKind::Chrome, Script::BrowserPage(DENIED));
        let webdriver = ScriptedFetch::new(StrategyKind::WebDriver, Script::Hang);
        let (orch, _) = orchestrator(http.clone(), chrome.clone(), webdriver.clone());

        let options = ScrapeOptions {
            use_browser: true,
            ..ScrapeOptions::default()
        };
        let outcome = orch.scrape("https://shop.example.com/", &options).await.unwrap();

        assert_eq!(outcome.method_used, MethodUsed::HttpFallback);
        assert_eq!(outcome.document.title, "Shop");
        // a block page is not retried
        assert_eq!(chrome.calls(), 1);
        assert_eq!(http.calls(), 1);
        assert_eq!(webdriver.calls(), 0);
        assert_eq!(serde_json::to_value(outcome.method_used).unwrap(), "http-fallback");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_failure_propagates() {
        let http = ScriptedFetch::new(StrategyKind::Http, Script::Fail(FetchErrorKind::Network));
        let chrome = ScriptedFetch::new(StrategyKind::Chrome, Script::Hang);
        let webdriver = ScriptedFetch::new(StrategyKind::WebDriver, Script::Fail(FetchErrorKind::Automation));
        let (orch, history) = orchestrator(http.clone(), chrome.clone(), webdriver.clone());

        let options = ScrapeOptions {
            use_browser: true,
            use_selenium: true,
            ..ScrapeOptions::default()
        };
        let err = orch.scrape("https://shop.example.com/", &options).await.unwrap_err();

        match err {
            ScrapeError::Fetch(e) => {
                assert_eq!(e.kind, FetchErrorKind::Network);
                assert_eq!(e.strategy, StrategyKind::Http);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(webdriver.calls(), 3);
        assert_eq!(http.calls(), 3);
        assert_eq!(chrome.calls(), 0);
        assert_eq!(history.tracked_urls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_failure_has_no_fallback() {
        let http = ScriptedFetch::new(StrategyKind::Http, Script::Fail(FetchErrorKind::Timeout));
        let chrome = ScriptedFetch::new(StrategyKind::Chrome, Script::Html(PRODUCT));
        let webdriver = ScriptedFetch::new(StrategyKind::WebDriver, Script::Html(PRODUCT));
        let (orch, _) = orchestrator(http.clone(), chrome.clone(), webdriver.clone());

        let err = orch
            .scrape("https://shop.example.com/", &ScrapeOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "timeout_error");
        assert_eq!(http.calls(), 3);
        assert_eq!(chrome.calls() + webdriver.calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_scrape_records_prices() {
        let http = ScriptedFetch::new(StrategyKind::Http, Script::Html(PRODUCT));
        let chrome = ScriptedFetch::new(StrategyKind::Chrome, Script::Hang);
        let webdriver = ScriptedFetch::new(StrategyKind::WebDriver, Script::Hang);
        let (orch, _) = orchestrator(http, chrome, webdriver);

        for _ in 0..2 {
            let outcome = orch
                .scrape("https://shop.example.com", &ScrapeOptions::default())
                .await
                .unwrap();
            assert_eq!(outcome.method_used, MethodUsed::Http);
            assert_eq!(outcome.document.prices, vec!["$19.99", "$24.99"]);
            assert_eq!(outcome.document.stats.page_size, PRODUCT.len());
        }

        // lookups normalize the same way records do
        let history = orch.price_history("https://shop.example.com/");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].prices, vec!["$19.99", "$24.99"]);
    }

    #[tokio::test]
    async fn test_invalid_input_rejected_before_fetch() {
        let http = ScriptedFetch::new(StrategyKind::Http, Script::Html(PRODUCT));
        let chrome = ScriptedFetch::new(StrategyKind::Chrome, Script::Hang);
        let webdriver = ScriptedFetch::new(StrategyKind::WebDriver, Script::Hang);
        let (orch, _) = orchestrator(http.clone(), chrome, webdriver);

        let err = orch
            .scrape("ftp://files.example.com/", &ScrapeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidUrl(_)));

        let err = orch
            .scrape("", &ScrapeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidUrl(_)));

        let options = ScrapeOptions {
            max_results: 500,
            ..ScrapeOptions::default()
        };
        let err = orch.scrape("https://shop.example.com/", &options).await.unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidOptions(_)));
        assert_eq!(http.calls(), 0);
    }

    #[test]
    fn test_method_used_tags() {
        let tags: Vec<_> = [
            MethodUsed::Http,
            MethodUsed::Chrome,
            MethodUsed::WebDriver,
            MethodUsed::HttpFallback,
        ]
        .iter()
        .map(|m| serde_json::to_value(m).unwrap())
        .collect();
        assert_eq!(tags, vec!["http", "chrome", "webdriver", "http-fallback"]);
    }
}
