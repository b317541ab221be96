//! Benchmark every fetch strategy against one URL.
//!
//! Strategies run one after another (never concurrently, so browser launches
//! don't compete), each with a single attempt and no fallback. The whole run
//! sits under one deadline; when it expires the in-flight strategy future is
//! dropped and the caller gets [`ScrapeError::ComparisonTimeout`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{timeout, Instant};
use utoipa::ToSchema;

use crate::error::ScrapeError;
use crate::extract::ExtractedDocument;
use crate::fetch::StrategyKind;
use crate::options::ScrapeOptions;
use crate::orchestrator::{parse_target, ScrapeOrchestrator};
use crate::retry::RetryPolicy;

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MethodOutcome {
    pub strategy: StrategyKind,
    pub success: bool,
    pub document: Option<ExtractedDocument>,
    pub error: Option<String>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StrategyTiming {
    pub strategy: StrategyKind,
    pub ms: u64,
}

/// Zero for strategies that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ElementCounts {
    pub strategy: StrategyKind,
    pub headlines: usize,
    pub links: usize,
    pub images: usize,
    pub paragraphs: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub fastest: StrategyKind,
    pub most_reliable: StrategyKind,
    pub best_for_dynamic: StrategyKind,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonSummary {
    pub speed: Vec<StrategyTiming>,
    pub fastest: StrategyKind,
    pub element_counts: Vec<ElementCounts>,
    pub recommendations: Recommendations,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub url: String,
    pub results: Vec<MethodOutcome>,
    /// Absent when no strategy succeeded.
    pub summary: Option<ComparisonSummary>,
}

impl ComparisonResult {
    pub fn successes(&self) -> impl Iterator<Item = &MethodOutcome> {
        self.results.iter().filter(|r| r.success)
    }
}

pub struct MethodComparator {
    orchestrator: Arc<ScrapeOrchestrator>,
    deadline: Duration,
}

impl MethodComparator {
    pub fn new(orchestrator: Arc<ScrapeOrchestrator>, deadline: Duration) -> Self {
        Self {
            orchestrator,
            deadline,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub async fn compare(&self, url: &str) -> Result<ComparisonResult, ScrapeError> {
        let target = parse_target(url)?;
        tracing::info!("⚖️ Comparing scraping methods for {} ({:?} deadline)", target, self.deadline);

        match timeout(self.deadline, self.run_all(target.as_str())).await {
            Ok(result) => Ok(result),
            Err(_) => {
                tracing::warn!("⏱️ Method comparison for {} hit its deadline", target);
                Err(ScrapeError::ComparisonTimeout(self.deadline))
            }
        }
    }

    async fn run_all(&self, url: &str) -> ComparisonResult {
        let options = ScrapeOptions::comparison();
        let policy = RetryPolicy::single_attempt();

        let mut results = Vec::with_capacity(StrategyKind::ALL.len());
        for kind in StrategyKind::ALL {
            let started = Instant::now();
            let outcome = self.orchestrator.scrape_with(kind, url, &options, &policy).await;
            let processing_time_ms = started.elapsed().as_millis() as u64;

            results.push(match outcome {
                Ok(outcome) => {
                    tracing::info!("[{}] completed in {}ms", kind, processing_time_ms);
                    MethodOutcome {
                        strategy: kind,
                        success: true,
                        document: Some(outcome.document),
                        error: None,
                        processing_time_ms,
                    }
                }
                Err(err) => {
                    tracing::warn!("[{}] failed: {}", kind, err);
                    MethodOutcome {
                        strategy: kind,
                        success: false,
                        document: None,
                        error: Some(err.to_string()),
                        processing_time_ms,
                    }
                }
            });
        }

        let summary = summarize(&results);
        ComparisonResult {
            url: url.to_string(),
            results,
            summary,
        }
    }
}

/// Aggregates outcomes. `None` when nothing succeeded.
///
/// `most_reliable` keeps the historical rule: HTTP whenever more than one
/// strategy succeeded, otherwise the lone success. It is a policy choice, not
/// a measurement.
pub fn summarize(results: &[MethodOutcome]) -> Option<ComparisonSummary> {
    let successes: Vec<&MethodOutcome> = results.iter().filter(|r| r.success).collect();

    // min_by_key keeps the first of equal times, i.e. run order
    let fastest = successes.iter().min_by_key(|r| r.processing_time_ms)?.strategy;

    let most_reliable = if successes.len() > 1 {
        StrategyKind::Http
    } else {
        successes[0].strategy
    };

    let succeeded = |kind| successes.iter().any(|r| r.strategy == kind);
    let best_for_dynamic = [StrategyKind::Chrome, StrategyKind::WebDriver]
        .into_iter()
        .find(|kind| succeeded(*kind))
        .unwrap_or(StrategyKind::Http);

    let speed = results
        .iter()
        .map(|r| StrategyTiming {
            strategy: r.strategy,
            ms: r.processing_time_ms,
        })
        .collect();

    let element_counts = results
        .iter()
        .map(|r| {
            let doc = r.document.as_ref();
            ElementCounts {
                strategy: r.strategy,
                headlines: doc.map_or(0, |d| d.headlines.len()),
                links: doc.map_or(0, |d| d.links.len()),
                images: doc.map_or(0, |d| d.images.len()),
                paragraphs: doc.map_or(0, |d| d.paragraphs.len()),
            }
        })
        .collect();

    Some(ComparisonSummary {
        speed,
        fastest,
        element_counts,
        recommendations: Recommendations {
            fastest,
            most_reliable,
            best_for_dynamic,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchErrorKind;
    use crate::fetch::testing::{strategies, Script, ScriptedFetch};
    use crate::history::PriceHistoryStore;

    const PAGE: &str = "<html><head><title>Deals</title></head><body><h1>Deals</h1><h2>Today</h2>\
                        <a href=\"/a\">A</a><p>Only $5.00</p></body></html>";

    fn comparator(
        http: Arc<ScriptedFetch>,
        chrome: Arc<ScriptedFetch>,
        webdriver: Arc<ScriptedFetch>,
    ) -> MethodComparator {
        let orchestrator = ScrapeOrchestrator::new(
            strategies(http, chrome, webdriver),
            Arc::new(PriceHistoryStore::default()),
            RetryPolicy::default(),
        );
        MethodComparator::new(Arc::new(orchestrator), DEFAULT_DEADLINE)
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_success_is_most_reliable() {
        let http = ScriptedFetch::new(StrategyKind::Http, Script::Fail(FetchErrorKind::Network));
        let chrome = ScriptedFetch::new(StrategyKind::Chrome, Script::Html(PAGE));
        let webdriver = ScriptedFetch::new(StrategyKind::WebDriver, Script::Fail(FetchErrorKind::Automation));
        let cmp = comparator(http.clone(), chrome.clone(), webdriver.clone());

        let result = cmp.compare("https://deals.example.com/").await.unwrap();

        let order: Vec<_> = result.results.iter().map(|r| r.strategy).collect();
        assert_eq!(order, StrategyKind::ALL.to_vec());
        assert_eq!(result.successes().count(), 1);
        assert!(result.results[0].error.as_deref().unwrap().contains("network"));

        let summary = result.summary.unwrap();
        assert_eq!(summary.recommendations.most_reliable, StrategyKind::Chrome);
        assert_eq!(summary.recommendations.fastest, StrategyKind::Chrome);
        assert_eq!(summary.recommendations.best_for_dynamic, StrategyKind::Chrome);
        assert_eq!(
            summary.element_counts[1],
            ElementCounts {
                strategy: StrategyKind::Chrome,
                headlines: 2,
                links: 1,
                images: 0,
                paragraphs: 1,
            }
        );
        assert_eq!(summary.element_counts[0].headlines, 0);

        // single attempt each, no fallback
        assert_eq!((http.calls(), chrome.calls(), webdriver.calls()), (1, 1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recommendations_with_several_successes() {
        let http = ScriptedFetch::new(StrategyKind::Http, Script::Delay(Duration::from_millis(900), PAGE));
        let chrome = ScriptedFetch::new(StrategyKind::Chrome, Script::Fail(FetchErrorKind::Blocked));
        let webdriver = ScriptedFetch::new(StrategyKind::WebDriver, Script::Delay(Duration::from_millis(300), PAGE));
        let cmp = comparator(http, chrome, webdriver);

        let result = cmp.compare("https://deals.example.com/").await.unwrap();
        let summary = result.summary.unwrap();

        assert_eq!(summary.fastest, StrategyKind::WebDriver);
        assert_eq!(summary.recommendations.most_reliable, StrategyKind::Http);
        assert_eq!(summary.recommendations.best_for_dynamic, StrategyKind::WebDriver);
        assert_eq!(summary.speed[0].ms, 900);
        assert_eq!(summary.speed[2].ms, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_successes_has_no_summary() {
        let http = ScriptedFetch::new(StrategyKind::Http, Script::Fail(FetchErrorKind::Timeout));
        let chrome = ScriptedFetch::new(StrategyKind::Chrome, Script::Fail(FetchErrorKind::Automation));
        let webdriver = ScriptedFetch::new(StrategyKind::WebDriver, Script::Fail(FetchErrorKind::Automation));
        let cmp = comparator(http, chrome, webdriver);

        let result = cmp.compare("https://deals.example.com/").await.unwrap();
        assert!(result.summary.is_none());
        assert!(result.results.iter().all(|r| !r.success && r.error.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires_at_45_seconds() {
        let http = ScriptedFetch::new(StrategyKind::Http, Script::Hang);
        let chrome = ScriptedFetch::new(StrategyKind::Chrome, Script::Html(PAGE));
        let webdriver = ScriptedFetch::new(StrategyKind::WebDriver, Script::Html(PAGE));
        let cmp = comparator(http, chrome.clone(), webdriver);

        let start = Instant::now();
        let err = cmp.compare("https://never.example.com/").await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, ScrapeError::ComparisonTimeout(d) if d == Duration::from_secs(45)));
        assert!(elapsed >= Duration::from_secs(45));
        assert!(elapsed < Duration::from_secs(46));
        // later strategies never started
        assert_eq!(chrome.calls(), 0);
    }

    #[test]
    fn test_equal_times_keep_run_order() {
        let outcome = |strategy, ms| MethodOutcome {
            strategy,
            success: true,
            document: Some(ExtractedDocument::default()),
            error: None,
            processing_time_ms: ms,
        };
        let results = vec![
            outcome(StrategyKind::Http, 400),
            outcome(StrategyKind::Chrome, 250),
            outcome(StrategyKind::WebDriver, 250),
        ];
        let summary = summarize(&results).unwrap();
        assert_eq!(summary.fastest, StrategyKind::Chrome);
        assert_eq!(summary.recommendations.fastest, StrategyKind::Chrome);
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let http = ScriptedFetch::new(StrategyKind::Http, Script::Html(PAGE));
        let chrome = ScriptedFetch::new(StrategyKind::Chrome, Script::Html(PAGE));
        let webdriver = ScriptedFetch::new(StrategyKind::WebDriver, Script::Html(PAGE));
        let cmp = comparator(http.clone(), chrome, webdriver);

        let err = cmp.compare("not a url").await.unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidUrl(_)));
        assert_eq!(http.calls(), 0);
    }
}
