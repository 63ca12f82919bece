//! HTML parser for registry listing and detail pages
//!
//! This module handles parsing HTML content to extract:
//! - The search state token and record links from a listing page
//! - The property table, drug forms and document links from a detail page

use crate::record::Property;
use crate::state::FileLink;
use crate::url::{last_path_segment, resolve_link};
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use url::Url;

/// Number of leading table columns that are record properties
pub const PROPERTY_COLUMNS: usize = 9;

/// Maximum number of properties kept per drug form
pub const MAX_FORM_PROPERTIES: usize = 15;

/// Property name given to a drug form's heading
pub const FORM_NAME_PROPERTY: &str = "Наименование формы";

/// A record row on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLink {
    pub id: String,

    /// Absolute detail page URL
    pub url: String,
}

/// Extracted contents of a listing page
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    /// Base64 search state token, if the page carries one
    pub state_token: Option<String>,
    pub records: Vec<RecordLink>,
}

/// Extracted contents of a record detail page
#[derive(Debug, Clone, Default)]
pub struct DetailPage {
    pub props: Vec<Property>,
    pub drug_forms: BTreeMap<usize, Vec<Property>>,
    pub files: Vec<FileLink>,
}

fn selector(css: &str) -> Result<Selector, String> {
    Selector::parse(css).map_err(|e| format!("invalid selector {}: {:?}", css, e))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Parses a search results page
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The base URL for resolving relative links
///
/// # Returns
///
/// * `Ok(ListingPage)` - Token (if present) and record links
/// * `Err(String)` - A selector could not be built
///
/// # Example
///
/// ```no_run
/// use rceth_harvest::crawler::parse_listing;
/// use url::Url;
///
/// let html = r#"<form id="main"><input id="QueryStringFind" value="dG9r"></form>"#;
/// let base_url = Url::parse("https://rceth.by/").unwrap();
/// let listing = parse_listing(html, &base_url).unwrap();
/// assert_eq!(listing.state_token.as_deref(), Some("dG9r"));
/// ```
pub fn parse_listing(html: &str, base_url: &Url) -> Result<ListingPage, String> {
    let document = Html::parse_document(html);

    let token_selector = selector("form#main > input#QueryStringFind")?;
    let state_token = document
        .select(&token_selector)
        .next()
        .and_then(|input| input.value().attr("value"))
        .map(|value| value.trim().to_string());

    let row_selector =
        selector("div.table-view > table > tbody > tr > td:nth-of-type(2) > a[href]")?;
    let mut records = Vec::new();
    for anchor in document.select(&row_selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(url) = resolve_link(href, base_url) else {
            tracing::debug!("Skipping unusable record link {:?}", href);
            continue;
        };
        let Some(id) = last_path_segment(&url) else {
            tracing::debug!("Record link {} has no id segment", url);
            continue;
        };
        records.push(RecordLink {
            id,
            url: url.to_string(),
        });
    }

    Ok(ListingPage {
        state_token,
        records,
    })
}

/// Parses a record detail page
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The base URL for resolving relative links
///
/// # Returns
///
/// * `Ok(DetailPage)` - Properties, drug forms and document links
/// * `Err(String)` - The page has no results block or property table
pub fn parse_detail(html: &str, base_url: &Url) -> Result<DetailPage, String> {
    let document = Html::parse_document(html);

    let results = document
        .select(&selector("div.results")?)
        .next()
        .ok_or_else(|| "no div.results block".to_string())?;
    let table = results
        .select(&selector("div.table-view > table")?)
        .next()
        .ok_or_else(|| "no property table".to_string())?;

    let names: Vec<String> = table
        .select(&selector("thead > tr:first-child > th")?)
        .map(element_text)
        .collect();
    let cells: Vec<ElementRef<'_>> = table
        .select(&selector("tbody > tr:first-child > td")?)
        .collect();

    let props = names
        .iter()
        .zip(cells.iter())
        .take(PROPERTY_COLUMNS)
        .map(|(name, cell)| (name.clone(), element_text(*cell)))
        .collect();

    let files = match cells.get(PROPERTY_COLUMNS) {
        Some(cell) => extract_file_links(*cell, base_url)?,
        None => Vec::new(),
    };

    let drug_forms = extract_drug_forms(results)?;

    Ok(DetailPage {
        props,
        drug_forms,
        files,
    })
}

/// Document links of the files column
fn extract_file_links(cell: ElementRef<'_>, base_url: &Url) -> Result<Vec<FileLink>, String> {
    let anchor_selector = selector("a[href]")?;
    let mut files = Vec::new();

    for anchor in cell.select(&anchor_selector) {
        let Some(url) = anchor
            .value()
            .attr("href")
            .and_then(|href| resolve_link(href, base_url))
        else {
            continue;
        };
        let Some(file_id) = last_path_segment(&url) else {
            continue;
        };
        files.push(FileLink {
            file_id,
            url: url.to_string(),
            used_for: element_text(anchor),
        });
    }

    Ok(files)
}

/// Drug form blocks, keyed by their position on the page
fn extract_drug_forms(results: ElementRef<'_>) -> Result<BTreeMap<usize, Vec<Property>>, String> {
    let form_selector = selector("div.row-view")?;
    let heading_selector = selector("h4")?;
    let row_selector = selector("table > tbody > tr")?;
    let name_selector = selector("td:nth-of-type(1) span")?;
    let value_selector = selector("td:nth-of-type(2)")?;

    let mut forms = BTreeMap::new();
    for (index, block) in results.select(&form_selector).enumerate() {
        let mut props = Vec::new();

        if let Some(heading) = block.select(&heading_selector).next() {
            let name = element_text(heading);
            if !name.is_empty() {
                props.push((FORM_NAME_PROPERTY.to_string(), name));
            }
        }

        let rows = block.select(&row_selector).filter_map(|row| {
            let name = row.select(&name_selector).next().map(element_text)?;
            let value = row
                .select(&value_selector)
                .next()
                .map(element_text)
                .unwrap_or_default();
            Some((name, value))
        });
        props.extend(rows.take(MAX_FORM_PROPERTIES));

        forms.insert(index, props);
    }

    Ok(forms)
}
