//! Service configuration, read once from the environment at startup.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::compare::DEFAULT_DEADLINE;
use crate::fetch::webdriver::DEFAULT_WEBDRIVER_URL;
use crate::fetch::BrowserLimits;
use crate::history;
use crate::retry::RetryPolicy;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://127.0.0.1:5173"];

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub bind_addr: IpAddr,
    pub allowed_origins: Vec<String>,
    pub comparison_timeout: Duration,
    pub retry: RetryPolicy,
    pub price_history_capacity: usize,
    pub webdriver_url: String,
    /// `None` lets headless_chrome locate a Chrome install on its own.
    pub chrome_path: Option<PathBuf>,
    pub browser_limits: BrowserLimits,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            allowed_origins: DEFAULT_ORIGINS.iter().map(|o| o.to_string()).collect(),
            comparison_timeout: DEFAULT_DEADLINE,
            retry: RetryPolicy::default(),
            price_history_capacity: history::DEFAULT_CAPACITY,
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            chrome_path: None,
            browser_limits: BrowserLimits::default(),
        }
    }
}

impl ServiceConfig {
    /// Reads the process environment. Call `dotenv()` first to pick up `.env`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Unset, empty or unparsable values
    /// fall back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or(defaults.allowed_origins);

        let retry = RetryPolicy::new(
            parsed(&get, "RETRY_MAX_ATTEMPTS", defaults.retry.max_attempts),
            Duration::from_millis(parsed(
                &get,
                "RETRY_BASE_DELAY_MS",
                defaults.retry.base_delay.as_millis() as u64,
            )),
        );

        let browser_limits = BrowserLimits {
            navigation_timeout: Duration::from_secs(parsed(
                &get,
                "BROWSER_NAV_TIMEOUT_SECS",
                defaults.browser_limits.navigation_timeout.as_secs(),
            )),
            max_interactions: parsed(
                &get,
                "BROWSER_MAX_INTERACTIONS",
                defaults.browser_limits.max_interactions,
            ),
            ..defaults.browser_limits
        };

        Self {
            port: parsed(&get, "PORT", defaults.port),
            bind_addr: parsed(&get, "BIND_ADDR", defaults.bind_addr),
            allowed_origins,
            comparison_timeout: Duration::from_secs(parsed(
                &get,
                "COMPARISON_TIMEOUT_SECS",
                defaults.comparison_timeout.as_secs(),
            )),
            retry,
            price_history_capacity: parsed(&get, "PRICE_HISTORY_CAPACITY", defaults.price_history_capacity)
                .max(1),
            webdriver_url: get("WEBDRIVER_URL").unwrap_or(defaults.webdriver_url),
            chrome_path: get("CHROME_PATH").map(PathBuf::from),
            browser_limits,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

fn parsed<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!("⚠️ Ignoring unparsable {}={:?}, using default", key, raw);
            default
        }),
        None => default,
    }
}
