//! HTML → [`ExtractedDocument`].
//!
//! Extraction is a pure function of `(html, base_url, mask, max_results)`.
//! Every list is capped per field at `max_results`, and relative `href`/`src`
//! values on links and images are resolved against the page URL. Values that
//! fail to resolve are dropped.

mod metadata;
mod structure;
mod text;

use std::collections::HashSet;
use std::hash::Hash;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use crate::options::FieldMask;

pub use metadata::{Metadata, SocialLink};
pub use structure::{Form, FormInput, Script, Style, Table};
pub use text::{ContactInfo, Language};

pub const NO_TITLE: &str = "No title found";

pub(crate) fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static HEADLINES: Lazy<Selector> = Lazy::new(|| selector("h1, h2, h3"));
static ANCHORS: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static IMAGES: Lazy<Selector> = Lazy::new(|| selector("img[src]"));
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| selector("p"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Headline {
    /// Source element name: `h1`, `h2` or `h3`.
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Link {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Image {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeStats {
    pub total_elements: usize,
    /// Fetch plus extraction, end to end.
    pub processing_time_ms: u64,
    pub fetch_time_ms: u64,
    pub page_size: usize,
    pub word_count: usize,
    pub link_count: usize,
    pub image_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    pub url: String,
    pub title: String,
    pub headlines: Vec<Headline>,
    pub links: Vec<Link>,
    pub images: Vec<Image>,
    pub paragraphs: Vec<String>,
    pub prices: Vec<String>,
    pub metadata: Metadata,
    pub social_media: Vec<SocialLink>,
    pub forms: Vec<Form>,
    pub tables: Vec<Table>,
    pub scripts: Vec<Script>,
    pub styles: Vec<Style>,
    pub contacts: ContactInfo,
    pub word_count: usize,
    pub language: Language,
    pub last_modified: Option<String>,
    pub stats: ScrapeStats,
}

impl ExtractedDocument {
    /// Element tally used in stats; styles, metadata and contacts are not counted.
    pub fn total_elements(&self) -> usize {
        self.headlines.len()
            + self.links.len()
            + self.images.len()
            + self.paragraphs.len()
            + self.prices.len()
            + self.forms.len()
            + self.tables.len()
            + self.scripts.len()
    }
}

/// Whitespace-normalized text content of an element.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn attr<'a>(el: ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value().attr(name).map(str::trim).filter(|v| !v.is_empty())
}

pub(crate) fn resolve(base: &Url, raw: &str) -> Option<String> {
    match base.join(raw.trim()) {
        Ok(url) => Some(url.to_string()),
        Err(e) => {
            tracing::warn!("Skipping unresolvable URL {:?}: {}", raw, e);
            None
        }
    }
}

/// Order-preserving dedup, truncated to `cap`.
pub(crate) fn dedup_capped<T, I>(items: I, cap: usize) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .take(cap)
        .collect()
}

pub fn extract(html: &str, base_url: &Url, mask: &FieldMask, max_results: usize) -> ExtractedDocument {
    let document = Html::parse_document(html);
    let body_text = text::body_text(&document);

    let title = document
        .select(&TITLE)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| NO_TITLE.to_string());

    let mut doc = ExtractedDocument {
        url: base_url.to_string(),
        title,
        ..ExtractedDocument::default()
    };

    if mask.headlines {
        doc.headlines = document
            .select(&HEADLINES)
            .filter_map(|el| {
                let text = element_text(el);
                (!text.is_empty()).then(|| Headline {
                    kind: el.value().name().to_string(),
                    text,
                })
            })
            .take(max_results)
            .collect();
    }

    if mask.links {
        doc.links = document
            .select(&ANCHORS)
            .filter_map(|el| {
                let href = attr(el, "href")?;
                let text = element_text(el);
                if text.is_empty() || href.starts_with('#') {
                    return None;
                }
                Some(Link {
                    href: resolve(base_url, href)?,
                    text,
                })
            })
            .take(max_results)
            .collect();
    }

    if mask.images {
        doc.images = document
            .select(&IMAGES)
            .filter_map(|el| {
                let src = attr(el, "src")?;
                Some(Image {
                    src: resolve(base_url, src)?,
                    alt: el.value().attr("alt").unwrap_or_default().trim().to_string(),
                })
            })
            .take(max_results)
            .collect();
    }

    if mask.paragraphs {
        doc.paragraphs = document
            .select(&PARAGRAPHS)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .take(max_results)
            .collect();
    }

    if mask.prices {
        doc.prices = text::prices(&body_text, max_results);
    }
    if mask.metadata {
        doc.metadata = metadata::extract_metadata(&document, base_url);
    }
    if mask.social_media {
        doc.social_media = metadata::social_links(&document, base_url, max_results);
    }
    if mask.forms {
        doc.forms = structure::forms(&document, max_results);
    }
    if mask.tables {
        doc.tables = structure::tables(&document, max_results);
    }
    if mask.scripts {
        doc.scripts = structure::scripts(&document, max_results);
    }
    if mask.styles {
        doc.styles = structure::styles(&document, max_results);
    }
    doc.contacts = text::contacts(&body_text, mask, max_results);

    doc.word_count = text::word_count(&body_text);
    doc.language = text::detect_language(&body_text);
    doc.stats = ScrapeStats {
        total_elements: doc.total_elements(),
        page_size: html.len(),
        word_count: doc.word_count,
        link_count: doc.links.len(),
        image_count: doc.images.len(),
        ..ScrapeStats::default()
    };
    doc
}
