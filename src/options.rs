//! Caller-facing scrape options.
//!
//! `ScrapeOptions` is the closed set of knobs the API accepts. Every field has a
//! default so partial JSON bodies deserialize, and `validate` runs at the
//! boundary before anything reaches a fetch strategy.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ScrapeError;
use crate::proxy::ProxySpec;

pub const MIN_RESULTS: usize = 1;
pub const MAX_RESULTS: usize = 200;
pub const MIN_TIMEOUT_MS: u64 = 1_000;
pub const MAX_TIMEOUT_MS: u64 = 120_000;

/// One scripted browser step, executed in order after the page settles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum UserInteraction {
    Click {
        selector: String,
    },
    Type {
        selector: String,
        #[serde(default)]
        value: String,
    },
    /// Scroll the matched element into view.
    Scroll {
        selector: String,
    },
    /// Pause; `value` is milliseconds as a string, 1000 when absent.
    Wait {
        #[serde(default)]
        value: Option<String>,
    },
}

impl UserInteraction {
    pub fn wait_millis(value: Option<&str>) -> u64 {
        value
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(1_000)
    }

    pub fn label(&self) -> &'static str {
        match self {
            UserInteraction::Click { .. } => "click",
            UserInteraction::Type { .. } => "type",
            UserInteraction::Scroll { .. } => "scroll",
            UserInteraction::Wait { .. } => "wait",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ScrapeOptions {
    pub include_headlines: bool,
    pub include_links: bool,
    pub include_images: bool,
    pub include_paragraphs: bool,
    pub include_prices: bool,
    pub include_metadata: bool,
    pub include_social_media: bool,
    pub include_forms: bool,
    pub include_tables: bool,
    pub include_scripts: bool,
    pub include_styles: bool,

    pub extract_emails: bool,
    pub extract_phones: bool,
    pub extract_addresses: bool,

    #[schema(example = 10)]
    pub max_results: usize,
    /// Per-request timeout in milliseconds.
    #[schema(example = 30000)]
    pub timeout: u64,
    pub follow_redirects: bool,
    pub user_agent: Option<String>,

    // Anti-detection
    pub referer: Option<String>,
    pub cookies: Option<String>,
    pub proxy: Option<String>,
    pub random_delay: bool,
    pub stealth: bool,
    pub mobile: bool,

    // Browser automation
    pub use_browser: bool,
    pub use_selenium: bool,
    pub wait_for_selector: Option<String>,
    /// Fixed settle time in milliseconds after navigation.
    pub wait_for_timeout: Option<u64>,
    pub scroll_to_bottom: bool,
    pub user_interactions: Vec<UserInteraction>,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            include_headlines: true,
            include_links: true,
            include_images: true,
            include_paragraphs: true,
            include_prices: true,
            include_metadata: true,
            include_social_media: false,
            include_forms: false,
            include_tables: false,
            include_scripts: false,
            include_styles: false,
            extract_emails: false,
            extract_phones: false,
            extract_addresses: false,
            max_results: 10,
            timeout: 30_000,
            follow_redirects: true,
            user_agent: None,
            referer: None,
            cookies: None,
            proxy: None,
            random_delay: false,
            stealth: false,
            mobile: false,
            use_browser: false,
            use_selenium: false,
            wait_for_selector: None,
            wait_for_timeout: None,
            scroll_to_bottom: false,
            user_interactions: Vec::new(),
        }
    }
}

/// Which optional output fields the extraction pipeline should fill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldMask {
    pub headlines: bool,
    pub links: bool,
    pub images: bool,
    pub paragraphs: bool,
    pub prices: bool,
    pub metadata: bool,
    pub social_media: bool,
    pub forms: bool,
    pub tables: bool,
    pub scripts: bool,
    pub styles: bool,
    pub emails: bool,
    pub phones: bool,
    pub addresses: bool,
}

impl FieldMask {
    pub fn all() -> Self {
        Self {
            headlines: true,
            links: true,
            images: true,
            paragraphs: true,
            prices: true,
            metadata: true,
            social_media: true,
            forms: true,
            tables: true,
            scripts: true,
            styles: true,
            emails: true,
            phones: true,
            addresses: true,
        }
    }
}

/// Canned option sets the technique test endpoint exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Technique {
    Stealth,
    Mobile,
    Slow,
    #[default]
    Default,
}

impl ScrapeOptions {
    pub fn field_mask(&self) -> FieldMask {
        FieldMask {
            headlines: self.include_headlines,
            links: self.include_links,
            images: self.include_images,
            paragraphs: self.include_paragraphs,
            prices: self.include_prices,
            metadata: self.include_metadata,
            social_media: self.include_social_media,
            forms: self.include_forms,
            tables: self.include_tables,
            scripts: self.include_scripts,
            styles: self.include_styles,
            emails: self.extract_emails,
            phones: self.extract_phones,
            addresses: self.extract_addresses,
        }
    }

    /// Option set used when benchmarking strategies against each other:
    /// every field on, ten results, no artificial delay.
    pub fn comparison() -> Self {
        Self {
            include_social_media: true,
            include_forms: true,
            include_tables: true,
            include_scripts: true,
            include_styles: true,
            user_agent: Some(crate::stealth::DEFAULT_USER_AGENT.to_string()),
            wait_for_timeout: Some(5_000),
            ..Self::default()
        }
    }

    pub fn for_technique(technique: Technique) -> Self {
        let base = Self {
            include_social_media: true,
            extract_emails: true,
            extract_phones: true,
            extract_addresses: true,
            random_delay: true,
            ..Self::default()
        };

        match technique {
            Technique::Stealth => Self {
                user_agent: Some(crate::stealth::DEFAULT_USER_AGENT.to_string()),
                referer: Some(crate::stealth::DEFAULT_REFERER.to_string()),
                stealth: true,
                ..base
            },
            Technique::Mobile => Self {
                user_agent: Some(crate::stealth::MOBILE_USER_AGENT.to_string()),
                mobile: true,
                ..base
            },
            Technique::Slow => Self {
                timeout: 60_000,
                ..base
            },
            Technique::Default => base,
        }
    }

    pub fn validate(&self) -> Result<(), ScrapeError> {
        if !(MIN_RESULTS..=MAX_RESULTS).contains(&self.max_results) {
            return Err(ScrapeError::InvalidOptions(format!(
                "maxResults must be between {} and {}, got {}",
                MIN_RESULTS, MAX_RESULTS, self.max_results
            )));
        }
        if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&self.timeout) {
            return Err(ScrapeError::InvalidOptions(format!(
                "timeout must be between {}ms and {}ms, got {}ms",
                MIN_TIMEOUT_MS, MAX_TIMEOUT_MS, self.timeout
            )));
        }
        if let Some(proxy) = non_empty(&self.proxy) {
            let spec = ProxySpec::parse(proxy).map_err(ScrapeError::InvalidOptions)?;
            spec.to_reqwest()
                .map_err(|e| ScrapeError::InvalidOptions(format!("unusable proxy {}: {}", proxy, e)))?;
        }
        for step in &self.user_interactions {
            let selector = match step {
                UserInteraction::Click { selector }
                | UserInteraction::Type { selector, .. }
                | UserInteraction::Scroll { selector } => selector,
                UserInteraction::Wait { .. } => continue,
            };
            if selector.trim().is_empty() {
                return Err(ScrapeError::InvalidOptions(format!(
                    "{} interaction requires a selector",
                    step.label()
                )));
            }
        }
        Ok(())
    }
}

/// The UI sends empty strings for unset text fields.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
