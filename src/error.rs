//! Error taxonomy for the fetch-and-extract pipeline.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::fetch::StrategyKind;

/// What went wrong while retrieving a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FetchErrorKind {
    /// Connection, DNS or protocol failure.
    Network,
    /// The configured deadline was exceeded.
    Timeout,
    /// The target served an anti-bot / access-denied page.
    Blocked,
    /// The browser driver failed for reasons unrelated to the target site.
    Automation,
}

impl FetchErrorKind {
    /// Transient kinds are worth another attempt; a block page is not.
    pub fn is_transient(self) -> bool {
        !matches!(self, FetchErrorKind::Blocked)
    }
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::Timeout => "timeout",
            FetchErrorKind::Blocked => "blocked",
            FetchErrorKind::Automation => "automation",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} error ({strategy}): {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub strategy: StrategyKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, strategy: StrategyKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            strategy,
            message: message.into(),
        }
    }

    pub fn network(strategy: StrategyKind, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, strategy, message)
    }

    pub fn timeout(strategy: StrategyKind, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, strategy, message)
    }

    pub fn blocked(strategy: StrategyKind, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Blocked, strategy, message)
    }

    pub fn automation(strategy: StrategyKind, message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Automation, strategy, message)
    }
}

/// Everything a caller of the scraper can get back instead of a document.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Extraction is pure over well-formed HTML; reaching this is a defect.
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("method comparison exceeded its {}s deadline", .0.as_secs())]
    ComparisonTimeout(Duration),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

impl ScrapeError {
    /// Short machine-friendly label used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ScrapeError::Fetch(e) => match e.kind {
                FetchErrorKind::Network => "network_error",
                FetchErrorKind::Timeout => "timeout_error",
                FetchErrorKind::Blocked => "blocked_error",
                FetchErrorKind::Automation => "automation_error",
            },
            ScrapeError::Extraction(_) => "extraction_error",
            ScrapeError::ComparisonTimeout(_) => "comparison_timeout",
            ScrapeError::InvalidUrl(_) => "invalid_url",
            ScrapeError::InvalidOptions(_) => "invalid_options",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_is_not_transient() {
        assert!(FetchErrorKind::Network.is_transient());
        assert!(FetchErrorKind::Timeout.is_transient());
        assert!(FetchErrorKind::Automation.is_transient());
        assert!(!FetchErrorKind::Blocked.is_transient());
    }

    #[test]
    fn test_fetch_error_message() {
        let err = FetchError::blocked(StrategyKind::Chrome, "Access Denied marker found");
        assert_eq!(err.to_string(), "blocked error (chrome): Access Denied marker found");

        let wrapped: ScrapeError = err.into();
        assert_eq!(wrapped.code(), "blocked_error");
    }

    #[test]
    fn test_comparison_timeout_message() {
        let err = ScrapeError::ComparisonTimeout(Duration::from_secs(45));
        assert_eq!(err.to_string(), "method comparison exceeded its 45s deadline");
    }
}
