//! Multi-strategy web scraper.
//!
//! A URL is fetched by one of three strategies (plain HTTP, headless Chrome,
//! WebDriver), the HTML is turned into an [`extract::ExtractedDocument`], and
//! any prices found are appended to a bounded per-URL history.

pub mod api;
pub mod compare;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod history;
pub mod options;
pub mod orchestrator;
pub mod proxy;
pub mod retry;
pub mod stealth;

pub use error::{FetchError, FetchErrorKind, ScrapeError};
pub use orchestrator::{MethodUsed, ScrapeOrchestrator, ScrapeOutcome};
