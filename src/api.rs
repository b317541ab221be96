//! HTTP surface: axum handlers, error mapping and the OpenAPI document.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::compare::{
    ComparisonResult, ComparisonSummary, ElementCounts, MethodComparator, MethodOutcome, Recommendations,
    StrategyTiming,
};
use crate::config::ServiceConfig;
use crate::error::{FetchErrorKind, ScrapeError};
use crate::extract::{
    ContactInfo, ExtractedDocument, Form, FormInput, Headline, Image, Language, Link, Metadata, ScrapeStats,
    Script, SocialLink, Style, Table,
};
use crate::fetch::{FetchStrategies, StrategyKind};
use crate::history::{PriceHistoryEntry, PriceHistoryStore};
use crate::options::{ScrapeOptions, Technique, UserInteraction};
use crate::orchestrator::{MethodUsed, ScrapeOrchestrator};
use crate::stealth::{self, BlockerAdvice, EvasionCatalog, EvasionTechnique};

pub struct AppState {
    pub orchestrator: Arc<ScrapeOrchestrator>,
    pub comparator: MethodComparator,
    pub started: Instant,
}

impl AppState {
    pub fn new(strategies: FetchStrategies, config: &ServiceConfig) -> Self {
        let history = Arc::new(PriceHistoryStore::new(config.price_history_capacity));
        let orchestrator = Arc::new(ScrapeOrchestrator::new(strategies, history, config.retry.clone()));
        Self {
            comparator: MethodComparator::new(Arc::clone(&orchestrator), config.comparison_timeout),
            orchestrator,
            started: Instant::now(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ScrapeRequest {
    #[schema(example = "https://example.com")]
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub options: ScrapeOptions,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScrapeResponse {
    pub success: bool,
    pub data: ExtractedDocument,
    pub stats: ScrapeStats,
    pub method: MethodUsed,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UrlQuery {
    /// Absolute http(s) URL.
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CompareResponse {
    pub success: bool,
    pub results: ComparisonResult,
    pub message: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TestScrapingRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub technique: Technique,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TestScrapingResponse {
    pub success: bool,
    pub data: ExtractedDocument,
    pub technique: Technique,
    pub stats: ScrapeStats,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TechniquesResponse {
    pub success: bool,
    pub data: EvasionCatalog,
    /// Preset names accepted by `/api/test-scraping`.
    pub presets: Vec<Technique>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    /// What the endpoint was trying to do.
    pub error: String,
    /// The underlying failure.
    pub message: String,
    pub code: String,
}

/// A [`ScrapeError`] tagged with the operation that failed.
#[derive(Debug)]
pub struct ApiError {
    pub context: &'static str,
    pub source: ScrapeError,
}

impl ApiError {
    fn new(context: &'static str) -> impl FnOnce(ScrapeError) -> Self {
        move |source| Self { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match &self.source {
            ScrapeError::InvalidUrl(_) | ScrapeError::InvalidOptions(_) => StatusCode::BAD_REQUEST,
            ScrapeError::ComparisonTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ScrapeError::Fetch(e) => match e.kind {
                FetchErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                FetchErrorKind::Blocked => StatusCode::BAD_GATEWAY,
                FetchErrorKind::Network | FetchErrorKind::Automation => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ScrapeError::Extraction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ {}: {}", self.context, self.source);
        } else {
            tracing::warn!("⚠️ {}: {}", self.context, self.source);
        }
        let body = ErrorBody {
            success: false,
            error: self.context.to_string(),
            message: self.source.to_string(),
            code: self.source.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[utoipa::path(
    post,
    path = "/api/scrape",
    request_body = ScrapeRequest,
    responses(
        (status = 200, description = "Page scraped", body = ScrapeResponse),
        (status = 400, description = "Invalid URL or options", body = ErrorBody),
        (status = 502, description = "Target served a block page", body = ErrorBody),
        (status = 504, description = "Target timed out", body = ErrorBody)
    ),
    tag = "scraper"
)]
pub async fn scrape(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ScrapeRequest>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    tracing::info!("🕷️ Scrape requested for {}", payload.url);
    let outcome = state
        .orchestrator
        .scrape(&payload.url, &payload.options)
        .await
        .map_err(ApiError::new("Failed to scrape website"))?;

    Ok(Json(ScrapeResponse {
        success: true,
        stats: outcome.document.stats.clone(),
        data: outcome.document,
        method: outcome.method_used,
    }))
}

#[utoipa::path(
    get,
    path = "/api/price-history",
    params(UrlQuery),
    responses(
        (status = 200, description = "Recorded prices, oldest first", body = [PriceHistoryEntry]),
        (status = 400, description = "Missing URL", body = ErrorBody)
    ),
    tag = "scraper"
)]
pub async fn price_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<Vec<PriceHistoryEntry>>, ApiError> {
    if query.url.trim().is_empty() {
        return Err(ApiError::new("Failed to get price history")(ScrapeError::InvalidUrl(
            "URL is required".to_string(),
        )));
    }
    Ok(Json(state.orchestrator.price_history(&query.url)))
}

#[utoipa::path(
    get,
    path = "/api/compare-scraping-methods",
    params(UrlQuery),
    responses(
        (status = 200, description = "Every strategy's outcome plus a summary", body = CompareResponse),
        (status = 400, description = "Invalid URL", body = ErrorBody),
        (status = 504, description = "Comparison deadline exceeded", body = ErrorBody)
    ),
    tag = "scraper"
)]
pub async fn compare_methods(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UrlQuery>,
) -> Result<Json<CompareResponse>, ApiError> {
    let results = state
        .comparator
        .compare(&query.url)
        .await
        .map_err(ApiError::new("Failed to compare scraping methods"))?;

    Ok(Json(CompareResponse {
        success: true,
        results,
        message: "Method comparison completed".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/test-scraping",
    request_body = TestScrapingRequest,
    responses(
        (status = 200, description = "Page scraped with a canned technique", body = TestScrapingResponse),
        (status = 400, description = "Invalid URL", body = ErrorBody)
    ),
    tag = "scraper"
)]
pub async fn test_scraping(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TestScrapingRequest>,
) -> Result<Json<TestScrapingResponse>, ApiError> {
    tracing::info!("🧪 Testing {:?} technique on {}", payload.technique, payload.url);
    let options = ScrapeOptions::for_technique(payload.technique);
    let outcome = state
        .orchestrator
        .scrape(&payload.url, &options)
        .await
        .map_err(ApiError::new("Failed to test scraping technique"))?;

    Ok(Json(TestScrapingResponse {
        success: true,
        stats: outcome.document.stats.clone(),
        data: outcome.document,
        technique: payload.technique,
    }))
}

#[utoipa::path(
    get,
    path = "/api/anti-scraping-techniques",
    responses((status = 200, description = "Evasion measures and the options that enable them", body = TechniquesResponse)),
    tag = "scraper"
)]
pub async fn anti_scraping_techniques() -> Json<TechniquesResponse> {
    Json(TechniquesResponse {
        success: true,
        data: stealth::evasion_catalog(),
        presets: vec![Technique::Stealth, Technique::Mobile, Technique::Slow, Technique::Default],
    })
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "health"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

#[derive(OpenApi)]
#[openapi(
    paths(scrape, price_history, compare_methods, test_scraping, anti_scraping_techniques, health),
    components(
        schemas(
            ScrapeRequest,
            ScrapeResponse,
            CompareResponse,
            TestScrapingRequest,
            TestScrapingResponse,
            HealthResponse,
            TechniquesResponse,
            EvasionCatalog,
            EvasionTechnique,
            BlockerAdvice,
            ErrorBody,
            ScrapeOptions,
            UserInteraction,
            Technique,
            ExtractedDocument,
            ScrapeStats,
            Headline,
            Link,
            Image,
            Metadata,
            SocialLink,
            Form,
            FormInput,
            Table,
            Script,
            Style,
            ContactInfo,
            Language,
            PriceHistoryEntry,
            ComparisonResult,
            ComparisonSummary,
            MethodOutcome,
            StrategyTiming,
            ElementCounts,
            Recommendations,
            StrategyKind,
            MethodUsed,
            FetchErrorKind
        )
    ),
    tags(
        (name = "scraper", description = "Scraping, comparison and price history"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/scraper-swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/scrape", post(scrape))
        .route("/api/price-history", get(price_history))
        .route("/api/compare-scraping-methods", get(compare_methods))
        .route("/api/test-scraping", post(test_scraping))
        .route("/api/anti-scraping-techniques", get(anti_scraping_techniques))
        .route("/api/health", get(health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::FetchError;
    use crate::fetch::testing::{strategies, Script, ScriptedFetch};

    const PRODUCT: &str = "<html><head><title>Widget</title></head><body><h1>Widget</h1>\
                           <p>Now $19.99</p><a href=\"/cart\">Cart</a></body></html>";

    fn state(http: Script, chrome: Script) -> Arc<AppState> {
        let strategies = strategies(
            ScriptedFetch::new(StrategyKind::Http, http),
            ScriptedFetch::new(StrategyKind::Chrome, chrome),
            ScriptedFetch::new(StrategyKind::WebDriver, Script::Fail(FetchErrorKind::Automation)),
        );
        Arc::new(AppState::new(strategies, &ServiceConfig::default()))
    }

    async fn error_body(err: ApiError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_scrape_handler_returns_document_and_stats() {
        let state = state(Script::Html(PRODUCT), Script::Hang);
        let request: ScrapeRequest = serde_json::from_value(serde_json::json!({
            "url": "https://shop.example.com/widget",
            "options": { "maxResults": 5 }
        }))
        .unwrap();

        let Json(response) = scrape(State(Arc::clone(&state)), Json(request)).await.unwrap();
        assert!(response.success);
        assert_eq!(response.method, MethodUsed::Http);
        assert_eq!(response.data.title, "Widget");
        assert_eq!(response.data.links[0].href, "https://shop.example.com/cart");
        assert_eq!(response.stats, response.data.stats);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["method"], "http");
        assert!(value["stats"]["processingTimeMs"].is_u64());

        let Json(history) = price_history(
            State(state),
            Query(UrlQuery {
                url: "https://shop.example.com/widget".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].prices, vec!["$19.99"]);
    }

    #[tokio::test]
    async fn test_scrape_handler_rejects_missing_url() {
        let state = state(Script::Html(PRODUCT), Script::Hang);
        let request: ScrapeRequest = serde_json::from_value(serde_json::json!({})).unwrap();

        let err = scrape(State(state), Json(request)).await.unwrap_err();
        let (status, body) = error_body(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.success);
        assert_eq!(body.error, "Failed to scrape website");
        assert_eq!(body.message, "invalid URL: URL is required");
        assert_eq!(body.code, "invalid_url");
    }

    #[tokio::test]
    async fn test_price_history_requires_url() {
        let state = state(Script::Html(PRODUCT), Script::Hang);
        let err = price_history(State(state), Query(UrlQuery { url: " ".to_string() }))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_test_scraping_echoes_technique() {
        let state = state(Script::Html(PRODUCT), Script::Hang);
        let request: TestScrapingRequest = serde_json::from_value(serde_json::json!({
            "url": "https://shop.example.com/widget",
            "technique": "slow"
        }))
        .unwrap();

        let Json(response) = test_scraping(State(state), Json(request)).await.unwrap();
        assert_eq!(response.technique, Technique::Slow);
        assert_eq!(response.data.title, "Widget");
    }

    #[test]
    fn test_status_mapping() {
        let status = |source: ScrapeError| ApiError { context: "x", source }.status();

        assert_eq!(
            status(ScrapeError::InvalidOptions("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ScrapeError::ComparisonTimeout(Duration::from_secs(45))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(FetchError::timeout(StrategyKind::Http, "slow").into()),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status(FetchError::blocked(StrategyKind::Chrome, "denied").into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status(FetchError::network(StrategyKind::Http, "refused").into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(ScrapeError::Extraction("panic".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_health() {
        let state = state(Script::Html(PRODUCT), Script::Hang);
        let Json(health) = health(State(state)).await;
        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["status"], "ok");
        assert!(value["uptimeSecs"].is_u64());
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_anti_scraping_techniques() {
        let Json(response) = anti_scraping_techniques().await;
        assert!(response.success);
        assert_eq!(response.data.user_agents, stealth::user_agents());
        assert_eq!(response.presets.len(), 4);

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["presets"][0], "stealth");
        assert!(value["data"]["userAgents"].is_array());
    }

    #[test]
    fn test_openapi_lists_routes() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        for path in [
            "/api/scrape",
            "/api/price-history",
            "/api/compare-scraping-methods",
            "/api/test-scraping",
            "/api/anti-scraping-techniques",
            "/api/health",
        ] {
            assert!(doc["paths"].get(path).is_some(), "missing {}", path);
        }
    }
}
