use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{attr, element_text, selector};

static FORMS: Lazy<Selector> = Lazy::new(|| selector("form"));
static FORM_FIELDS: Lazy<Selector> = Lazy::new(|| selector("input, textarea, select"));
static TABLES: Lazy<Selector> = Lazy::new(|| selector("table"));
static ROWS: Lazy<Selector> = Lazy::new(|| selector("tr"));
static HEADER_CELLS: Lazy<Selector> = Lazy::new(|| selector("th, td"));
static DATA_CELLS: Lazy<Selector> = Lazy::new(|| selector("td"));
static SCRIPTS: Lazy<Selector> = Lazy::new(|| selector("script"));
static STYLES: Lazy<Selector> = Lazy::new(|| selector("link[rel=\"stylesheet\"], style"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FormInput {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub placeholder: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Form {
    pub action: String,
    pub method: String,
    pub inputs: Vec<FormInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Script {
    pub src: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Option<String>,
}

/// A stylesheet link or an inline `<style>` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Style {
    pub href: Option<String>,
    pub media: Option<String>,
    pub content: Option<String>,
}

/// Forms with at least one named field.
pub(super) fn forms(document: &Html, cap: usize) -> Vec<Form> {
    document
        .select(&FORMS)
        .filter_map(|form| {
            let inputs: Vec<FormInput> = form
                .select(&FORM_FIELDS)
                .filter_map(|field| {
                    let name = attr(field, "name")?;
                    Some(FormInput {
                        name: name.to_string(),
                        kind: attr(field, "type").unwrap_or("text").to_string(),
                        placeholder: attr(field, "placeholder").unwrap_or_default().to_string(),
                        required: field.value().attr("required").is_some(),
                    })
                })
                .collect();
            if inputs.is_empty() {
                return None;
            }
            Some(Form {
                action: attr(form, "action").unwrap_or_default().to_string(),
                method: attr(form, "method").unwrap_or("GET").to_string(),
                inputs,
            })
        })
        .take(cap)
        .collect()
}

/// First row is the header; later rows keep only their `td` cells.
pub(super) fn tables(document: &Html, cap: usize) -> Vec<Table> {
    document
        .select(&TABLES)
        .filter_map(|table| {
            let mut rows = table.select(&ROWS);
            let headers: Vec<String> = rows.next()?.select(&HEADER_CELLS).map(element_text).collect();
            if headers.is_empty() {
                return None;
            }
            let rows = rows
                .map(|row| row.select(&DATA_CELLS).map(element_text).collect::<Vec<_>>())
                .filter(|cells| !cells.is_empty())
                .collect();
            Some(Table { headers, rows })
        })
        .take(cap)
        .collect()
}

pub(super) fn scripts(document: &Html, cap: usize) -> Vec<Script> {
    document
        .select(&SCRIPTS)
        .map(|el| {
            let inline = el.inner_html();
            Script {
                src: attr(el, "src").map(str::to_string),
                kind: attr(el, "type").unwrap_or("text/javascript").to_string(),
                content: (!inline.trim().is_empty()).then_some(inline),
            }
        })
        .take(cap)
        .collect()
}

pub(super) fn styles(document: &Html, cap: usize) -> Vec<Style> {
    document
        .select(&STYLES)
        .filter_map(|el| {
            let media = attr(el, "media").map(str::to_string);
            if el.value().name() == "style" {
                let css = el.inner_html();
                return (!css.trim().is_empty()).then(|| Style {
                    href: None,
                    media,
                    content: Some(css),
                });
            }
            Some(Style {
                href: Some(attr(el, "href")?.to_string()),
                media,
                content: None,
            })
        })
        .take(cap)
        .collect()
}
