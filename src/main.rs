use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use dotenv::dotenv;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use rust_scraper::api::{self, AppState};
use rust_scraper::config::ServiceConfig;
use rust_scraper::fetch::FetchStrategies;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env();
    let state = Arc::new(AppState::new(FetchStrategies::live(&config), &config));

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("⚠️ Skipping invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = api::router(state).layer(cors).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.socket_addr()).await?;
    tracing::info!("🚀 Scraper API listening on {}", listener.local_addr()?);
    tracing::info!("📖 Swagger UI at http://{}/scraper-swagger", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
