//! Anti-detection policy shared by every fetch strategy.
//!
//! This module provides:
//! - User-agent pools and viewport profiles
//! - The navigator fingerprint override script injected into browser pages
//! - Chrome launch flags that hide automation switches
//! - Randomized pre-request delay
//! - Block / challenge page detection
//! - A catalog of the above for API clients

use std::time::Duration;

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use utoipa::ToSchema;
use tokio::time::sleep;

use crate::fetch::FetchConfig;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const MOBILE_USER_AGENT: &str =
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";

pub const DEFAULT_REFERER: &str = "https://www.google.com/";

pub const DESKTOP_VIEWPORT: (u32, u32) = (1280, 720);
pub const MOBILE_VIEWPORT: (u32, u32) = (390, 844);

static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        DEFAULT_USER_AGENT,
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ]
});

pub const REFERERS: [&str; 5] = [
    DEFAULT_REFERER,
    "https://www.bing.com/",
    "https://www.facebook.com/",
    "https://twitter.com/",
    "https://www.linkedin.com/",
];

pub fn user_agents() -> &'static [&'static str] {
    &USER_AGENTS
}

/// Pick a desktop user agent from the rotation pool.
pub fn rotate_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(DEFAULT_USER_AGENT)
}

pub fn viewport(mobile: bool) -> (u32, u32) {
    if mobile {
        MOBILE_VIEWPORT
    } else {
        DESKTOP_VIEWPORT
    }
}

/// Uniform 1–3s pause before a request.
pub async fn random_delay() {
    let millis: u64 = rand::thread_rng().gen_range(1_000..=3_000);
    tracing::debug!("🛡️ Anti-detection delay: {}ms", millis);
    sleep(Duration::from_millis(millis)).await;
}

/// Chrome switches for both browser backends. Headless mode is added by the
/// caller because CDP and WebDriver spell it differently.
pub fn chrome_args(config: &FetchConfig) -> Vec<String> {
    let (width, height) = viewport(config.mobile);
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-infobars".to_string(),
        "--disable-gpu".to_string(),
        "--disable-extensions".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--lang=en-US".to_string(),
        format!("--window-size={},{}", width, height),
        format!("--user-agent={}", config.user_agent),
    ];
    if let Some(proxy) = &config.proxy {
        if proxy.requires_auth() {
            tracing::warn!(
                "Browser proxy {} needs credentials; Chrome will prompt and the request may fail",
                proxy.host
            );
        }
        args.push(format!("--proxy-server={}", proxy.to_chrome_arg()));
    }
    args
}

/// Script evaluated before page scripts run. Hides the usual headless tells.
pub fn stealth_script(mobile: bool) -> String {
    let platform = if mobile { "iPhone" } else { "Win32" };
    let touch_points = if mobile { 5 } else { 0 };

    format!(
        r#"
        (() => {{
            Object.defineProperty(navigator, 'webdriver', {{ get: () => undefined }});

            Object.defineProperty(navigator, 'languages', {{ get: () => ['en-US', 'en'] }});
            Object.defineProperty(navigator, 'platform', {{ get: () => '{platform}' }});
            Object.defineProperty(navigator, 'maxTouchPoints', {{ get: () => {touch_points} }});
            Object.defineProperty(navigator, 'hardwareConcurrency', {{ get: () => 8 }});
            Object.defineProperty(navigator, 'deviceMemory', {{ get: () => 8 }});

            Object.defineProperty(navigator, 'plugins', {{
                get: () => {{
                    const pdf = {{
                        name: 'Chrome PDF Plugin',
                        filename: 'internal-pdf-viewer',
                        description: 'Portable Document Format',
                        length: 1,
                    }};
                    const list = [pdf, pdf, pdf];
                    Object.setPrototypeOf(list, PluginArray.prototype);
                    return list;
                }},
            }});

            if (!window.chrome) {{
                window.chrome = {{ runtime: {{}}, app: {{ isInstalled: false }}, csi: () => {{}}, loadTimes: () => ({{}}) }};
            }}

            const query = window.navigator.permissions && window.navigator.permissions.query;
            if (query) {{
                window.navigator.permissions.query = (parameters) =>
                    parameters.name === 'notifications'
                        ? Promise.resolve({{ state: Notification.permission }})
                        : query(parameters);
            }}

            if (window.WebGLRenderingContext) {{
                const getParameter = WebGLRenderingContext.prototype.getParameter;
                WebGLRenderingContext.prototype.getParameter = function (parameter) {{
                    if (parameter === 37445) return 'Intel Inc.';
                    if (parameter === 37446) return 'Intel Iris OpenGL Engine';
                    return getParameter.apply(this, [parameter]);
                }};
            }}
        }})();
        "#,
        platform = platform,
        touch_points = touch_points,
    )
}

/// Markers of access-denied, captcha and checkpoint pages, lower-cased.
const BLOCK_CONTENT_MARKERS: &[&str] = &[
    "access denied",
    "attention required! | cloudflare",
    "checking your browser before accessing",
    "verify you are human",
    "unusual traffic from your computer network",
    "captcha-form",
    "verify it's you",
    "temporarily locked",
    "request unsuccessful. incapsula",
];

const BLOCK_URL_MARKERS: &[&str] = &["/checkpoint", "/captcha", "cdn-cgi/challenge-platform"];

/// Returns the first block marker found in the page or its final URL.
pub fn detect_block(html: &str, url: &str) -> Option<&'static str> {
    let url = url.to_lowercase();
    if let Some(marker) = BLOCK_URL_MARKERS.iter().find(|m| url.contains(*m)) {
        return Some(*marker);
    }

    let html = html.to_lowercase();
    BLOCK_CONTENT_MARKERS
        .iter()
        .find(|m| html.contains(*m))
        .copied()
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EvasionTechnique {
    pub name: &'static str,
    pub description: &'static str,
    /// The `ScrapeOptions` field that switches it on.
    pub option: &'static str,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BlockerAdvice {
    pub blocker: &'static str,
    pub methods: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvasionCatalog {
    pub user_agents: Vec<&'static str>,
    pub referers: Vec<&'static str>,
    pub techniques: Vec<EvasionTechnique>,
    pub common_blockers: Vec<&'static str>,
    pub bypass_methods: Vec<BlockerAdvice>,
}

/// What the fetchers can do to look like a browser, keyed to the options
/// that enable each measure.
pub fn evasion_catalog() -> EvasionCatalog {
    let technique = |name, description, option| EvasionTechnique {
        name,
        description,
        option,
    };
    EvasionCatalog {
        user_agents: user_agents().to_vec(),
        referers: REFERERS.to_vec(),
        techniques: vec![
            technique("Rotate User Agents", "Pick a desktop browser UA per request", "stealth"),
            technique("Mobile Profile", "iPhone UA and viewport", "mobile"),
            technique("Custom User Agent", "Send a caller-chosen UA", "userAgent"),
            technique("Referer", "Send a search-engine or social referer", "referer"),
            technique("Session Cookies", "Replay a caller-supplied cookie header", "cookies"),
            technique("Random Delay", "Wait 1-3 seconds before the request", "randomDelay"),
            technique("Proxy", "Route through an http(s) or socks5 proxy", "proxy"),
            technique("Headless Chrome", "Render with Chrome and hide automation flags", "useBrowser"),
            technique("WebDriver", "Render through a WebDriver session", "useSelenium"),
        ],
        common_blockers: vec!["Cloudflare", "Akamai", "Imperva", "F5 Networks", "AWS WAF", "Google reCAPTCHA"],
        bypass_methods: vec![
            BlockerAdvice {
                blocker: "Cloudflare",
                methods: vec!["Use residential proxies", "Rotate user agents", "Use browser automation"],
            },
            BlockerAdvice {
                blocker: "Rate Limiting",
                methods: vec!["Add random delays", "Rotate proxies"],
            },
            BlockerAdvice {
                blocker: "IP Blocking",
                methods: vec!["Use proxy services", "Use residential proxies"],
            },
        ],
    }
}
