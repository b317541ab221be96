use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::ToSchema;

use super::{attr, element_text, resolve, selector};

static CANONICAL: Lazy<Selector> = Lazy::new(|| selector("link[rel=\"canonical\"]"));
static SOCIAL_ANCHORS: Lazy<Selector> = Lazy::new(|| {
    selector(
        "a[href*=\"facebook.com\"], a[href*=\"twitter.com\"], a[href*=\"instagram.com\"], \
         a[href*=\"linkedin.com\"], a[href*=\"youtube.com\"]",
    )
});

/// Platform tag and the domain fragment that identifies it.
const SOCIAL_PLATFORMS: &[(&str, &str)] = &[
    ("facebook", "facebook.com"),
    ("twitter", "twitter.com"),
    ("instagram", "instagram.com"),
    ("linkedin", "linkedin.com"),
    ("youtube", "youtube.com"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub author: Option<String>,
    pub viewport: Option<String>,
    pub robots: Option<String>,
    pub og_title: Option<String>,
    pub og_description: Option<String>,
    pub og_image: Option<String>,
    pub og_type: Option<String>,
    pub og_url: Option<String>,
    pub twitter_card: Option<String>,
    pub twitter_title: Option<String>,
    pub twitter_description: Option<String>,
    pub twitter_image: Option<String>,
    pub canonical: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SocialLink {
    pub platform: String,
    pub url: String,
    pub text: String,
}

/// First `content` of `meta[attr_name="key"]`.
fn meta_content(document: &Html, attr_name: &str, key: &str) -> Option<String> {
    let css = format!("meta[{}=\"{}\"]", attr_name, key);
    let sel = Selector::parse(&css).ok()?;
    document
        .select(&sel)
        .find_map(|el| attr(el, "content"))
        .map(str::to_string)
}

fn named(document: &Html, key: &str) -> Option<String> {
    meta_content(document, "name", key)
}

fn property(document: &Html, key: &str) -> Option<String> {
    meta_content(document, "property", key)
}

/// Twitter cards show up under either `name` or `property` in the wild.
fn twitter(document: &Html, key: &str) -> Option<String> {
    named(document, key).or_else(|| property(document, key))
}

pub(super) fn extract_metadata(document: &Html, base: &Url) -> Metadata {
    let keywords = named(document, "keywords")
        .map(|k| {
            k.split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let canonical = document
        .select(&CANONICAL)
        .find_map(|el| attr(el, "href"))
        .and_then(|href| resolve(base, href));

    Metadata {
        description: named(document, "description"),
        keywords,
        author: named(document, "author"),
        viewport: named(document, "viewport"),
        robots: named(document, "robots"),
        og_title: property(document, "og:title"),
        og_description: property(document, "og:description"),
        og_image: property(document, "og:image"),
        og_type: property(document, "og:type"),
        og_url: property(document, "og:url"),
        twitter_card: twitter(document, "twitter:card"),
        twitter_title: twitter(document, "twitter:title"),
        twitter_description: twitter(document, "twitter:description"),
        twitter_image: twitter(document, "twitter:image"),
        canonical,
    }
}

pub(super) fn social_links(document: &Html, base: &Url, cap: usize) -> Vec<SocialLink> {
    document
        .select(&SOCIAL_ANCHORS)
        .filter_map(|el| {
            let href = attr(el, "href")?;
            let platform = SOCIAL_PLATFORMS
                .iter()
                .find(|(_, domain)| href.contains(domain))
                .map(|(name, _)| *name)
                .unwrap_or("other");
            Some(SocialLink {
                platform: platform.to_string(),
                url: resolve(base, href)?,
                text: element_text(el),
            })
        })
        .take(cap)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://news.example.com/story").unwrap()
    }

    #[test]
    fn test_metadata_fields() {
        let html = Html::parse_document(
            r#"<html><head>
                <meta name="description" content="A story">
                <meta name="keywords" content=" rust, scraping ,, web ">
                <meta name="author" content="Desk">
                <meta name="robots" content="index,follow">
                <meta property="og:title" content="OG Story">
                <meta property="og:type" content="article">
                <meta property="twitter:card" content="summary_large_image">
                <meta name="twitter:title" content="TW Story">
                <link rel="canonical" href="/story?id=1">
            </head><body></body></html>"#,
        );
        let meta = extract_metadata(&html, &base());
        assert_eq!(meta.description.as_deref(), Some("A story"));
        assert_eq!(meta.keywords, vec!["rust", "scraping", "web"]);
        assert_eq!(meta.author.as_deref(), Some("Desk"));
        assert_eq!(meta.robots.as_deref(), Some("index,follow"));
        assert_eq!(meta.og_title.as_deref(), Some("OG Story"));
        assert_eq!(meta.og_type.as_deref(), Some("article"));
        assert_eq!(meta.twitter_card.as_deref(), Some("summary_large_image"));
        assert_eq!(meta.twitter_title.as_deref(), Some("TW Story"));
        assert_eq!(meta.canonical.as_deref(), Some("https://news.example.com/story?id=1"));
        assert!(meta.viewport.is_none());
        assert!(meta.og_image.is_none());
    }

    #[test]
    fn test_social_links_tagged_by_platform() {
        let html = Html::parse_document(
            r#"<html><body>
                <a href="https://www.facebook.com/acme">Facebook</a>
                <a href="https://example.com/about">About</a>
                <a href="https://youtube.com/@acme"> Watch  us </a>
                <a href="https://uk.linkedin.com/company/acme"></a>
            </body></html>"#,
        );
        let links = social_links(&html, &base(), 10);
        let platforms: Vec<_> = links.iter().map(|l| l.platform.as_str()).collect();
        assert_eq!(platforms, vec!["facebook", "youtube", "linkedin"]);
        assert_eq!(links[1].text, "Watch us");
        assert_eq!(links[2].url, "https://uk.linkedin.com/company/acme");
    }
}
