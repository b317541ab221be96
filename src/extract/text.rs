use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Node};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{dedup_capped, selector};
use crate::options::FieldMask;

static BODY: Lazy<scraper::Selector> = Lazy::new(|| selector("body"));

static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$?\d+(?:,\d{3})*(?:\.\d{2})?").expect("price regex"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("email regex"));
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\+?1[-.]?)?\(?([0-9]{3})\)?[-.\s]?([0-9]{3})[-.]?([0-9]{4})").expect("phone regex")
});
static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\d+\s+[a-z\s]+(?:Street|St|Avenue|Ave|Road|Rd|Boulevard|Blvd|Lane|Ln|Drive|Dr|Court|Ct|Place|Pl|Way|Terrace|Ter|Circle|Cir|Square|Sq)\b",
    )
    .expect("address regex")
});

const HIDDEN_TEXT_PARENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Visible text of `<body>`: text nodes outside script-like elements, joined
/// with single spaces.
pub(super) fn body_text(document: &Html) -> String {
    let root = document
        .select(&BODY)
        .next()
        .unwrap_or_else(|| document.root_element());

    let mut parts = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_TEXT_PARENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed);
        }
    }
    parts.join(" ")
}

pub(super) fn prices(body_text: &str, cap: usize) -> Vec<String> {
    dedup_capped(
        PRICE_RE.find_iter(body_text).map(|m| m.as_str().to_string()),
        cap,
    )
}

pub(super) fn word_count(body_text: &str) -> usize {
    body_text.split_whitespace().count()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Language {
    English,
    Spanish,
    French,
    #[default]
    Unknown,
}

const STOP_WORDS: &[(Language, &[&str])] = &[
    (
        Language::English,
        &["the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by"],
    ),
    (
        Language::Spanish,
        &["el", "la", "de", "que", "y", "a", "en", "un", "es", "se", "no", "te"],
    ),
    (
        Language::French,
        &["le", "la", "de", "et", "en", "un", "est", "que", "pour", "dans", "sur", "avec"],
    ),
];

/// Stop-word vote. Highest count wins, ties go to the language listed first,
/// and no hits at all means `Unknown`.
pub(super) fn detect_language(body_text: &str) -> Language {
    let lowered = body_text.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();

    let mut best = (Language::Unknown, 0usize);
    for (language, words) in STOP_WORDS {
        let count = tokens.iter().filter(|t| words.contains(*t)).count();
        if count > best.1 {
            best = (*language, count);
        }
    }
    best.0
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ContactInfo {
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub addresses: Vec<String>,
}

pub(super) fn contacts(body_text: &str, mask: &FieldMask, cap: usize) -> ContactInfo {
    let grab = |enabled: bool, re: &Regex| {
        if !enabled {
            return Vec::new();
        }
        dedup_capped(
            re.find_iter(body_text).map(|m| m.as_str().trim().to_string()),
            cap,
        )
    };

    ContactInfo {
        emails: grab(mask.emails, &*EMAIL_RE),
        phones: grab(mask.phones, &*PHONE_RE),
        addresses: grab(mask.addresses, &*ADDRESS_RE),
    }
}
