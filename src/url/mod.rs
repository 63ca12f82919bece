//! URL helpers for registry links
//!
//! Listing and detail pages use relative links; records and documents are
//! identified by the last path segment of their URL.

use url::Url;

/// Resolves a link href to an absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel:, data: schemes
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

/// Last non-empty path segment of a URL
///
/// A trailing slash is ignored, so `/records/123/` yields `123`.
///
/// # Examples
///
/// ```
/// use rceth_harvest::url::last_path_segment;
/// use url::Url;
///
/// let url = Url::parse("https://rceth.by/Refbank/reestr_lekarstvennih_sredstv/details/1234").unwrap();
/// assert_eq!(last_path_segment(&url), Some("1234".to_string()));
/// ```
pub fn last_path_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
