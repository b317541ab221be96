use std::net::{IpAddr, Ipv4Addr};
use std::time::Instant;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;

use super::{FetchConfig, FetchStrategy, RawPage, StrategyKind};
use crate::error::FetchError;
use crate::stealth;

const MAX_REDIRECTS: usize = 5;

/// Plain GET with a browser-like header set.
#[derive(Debug, Default, Clone)]
pub struct HttpFetch;

impl HttpFetch {
    pub fn new() -> Self {
        Self
    }

    fn headers(config: &FetchConfig) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let static_headers: [(HeaderName, &'static str); 10] = [
            (
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8",
            ),
            (header::ACCEPT_LANGUAGE, "en-US,en;q=0.9"),
            (header::DNT, "1"),
            (header::CONNECTION, "keep-alive"),
            (header::UPGRADE_INSECURE_REQUESTS, "1"),
            (HeaderName::from_static("sec-fetch-dest"), "document"),
            (HeaderName::from_static("sec-fetch-mode"), "navigate"),
            (HeaderName::from_static("sec-fetch-site"), "none"),
            (HeaderName::from_static("sec-fetch-user"), "?1"),
            (header::CACHE_CONTROL, "max-age=0"),
        ];
        for (name, value) in static_headers {
            headers.insert(name, HeaderValue::from_static(value));
        }

        // Caller-supplied values can hold bytes a header can't; drop those.
        if let Some(referer) = &config.referer {
            match HeaderValue::from_str(referer) {
                Ok(value) => {
                    headers.insert(header::REFERER, value);
                }
                Err(_) => tracing::warn!("⚠️ Ignoring referer with invalid header bytes"),
            }
        }
        if let Some(cookies) = &config.cookies {
            match HeaderValue::from_str(cookies) {
                Ok(value) => {
                    headers.insert(header::COOKIE, value);
                }
                Err(_) => tracing::warn!("⚠️ Ignoring cookie string with invalid header bytes"),
            }
        }
        headers
    }

    fn client(&self, config: &FetchConfig) -> Result<reqwest::Client, FetchError> {
        let redirect = if config.follow_redirects {
            Policy::limited(MAX_REDIRECTS)
        } else {
            Policy::none()
        };

        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(Self::headers(config))
            .redirect(redirect)
            .timeout(config.timeout)
            // Binding to 0.0.0.0 keeps connections on IPv4.
            .local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        if let Some(proxy) = &config.proxy {
            let proxy = proxy
                .to_reqwest()
                .map_err(|e| FetchError::network(StrategyKind::Http, format!("invalid proxy: {}", e)))?;
            builder = builder.proxy(proxy);
        }

        builder
            .build()
            .map_err(|e| FetchError::network(StrategyKind::Http, format!("client build failed: {}", e)))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::timeout(StrategyKind::Http, err.to_string())
    } else {
        FetchError::network(StrategyKind::Http, err.to_string())
    }
}

#[async_trait]
impl FetchStrategy for HttpFetch {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Http
    }

    async fn fetch(&self, config: &FetchConfig) -> Result<RawPage, FetchError> {
        let client = self.client(config)?;

        if config.random_delay {
            stealth::random_delay().await;
        }

        let started = Instant::now();
        tracing::info!("🌐 GET {}", config.url);

        let response = client
            .get(config.url.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("⚠️ {} answered {}; extracting body anyway", config.url, status);
        }

        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let final_url = response.url().clone();

        let html = response.text().await.map_err(map_reqwest_error)?;
        let elapsed = started.elapsed();
        tracing::debug!("Fetched {} bytes from {} in {:?}", html.len(), final_url, elapsed);

        Ok(RawPage::new(html, final_url, last_modified, StrategyKind::Http, elapsed))
    }
}
