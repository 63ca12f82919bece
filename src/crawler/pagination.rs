//! Pagination state carried in the search page's hidden state token
//!
//! The registry keeps the search state in a base64 form field
//! (`QueryStringFind`). Decoded, it is a sequence of `Name[=]Value[;]`
//! segments. Two of them tell how big the search is (`FOpt.CPage` pages,
//! `FOpt.CRec` records). The `FProps[1..9]` segments carry per-session filter
//! state that makes replayed tokens drift, so they are dropped before the
//! token is replayed for follow-up pages.

use crate::{CrawlError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::bytes::Regex;
use std::sync::OnceLock;

/// Terminator of a state token segment
const SEGMENT_END: &[u8] = b"[;]";

/// Separator between a segment's name and value
const NAME_SEP: &[u8] = b"[=]";

/// Field holding the number of result pages
pub const PAGES_FIELD: &str = "FOpt.CPage";

/// Field holding the number of matched records
pub const ITEMS_FIELD: &str = "FOpt.CRec";

/// Form field carrying the state token
pub const TOKEN_FIELD: &str = "QueryStringFind";

fn volatile_segment() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^FProps\[[1-9]\]").expect("valid volatile segment regex"))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// One `Name[=]Value[;]` segment of a decoded state token
///
/// Values are raw bytes; the server does not promise any text encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// Raw bytes including the terminator, if present
    pub raw: &'a [u8],
    pub name: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> Segment<'a> {
    fn parse(raw: &'a [u8]) -> Self {
        let body = raw.strip_suffix(SEGMENT_END).unwrap_or(raw);
        let (name, value) = match find(body, NAME_SEP) {
            Some(at) => (&body[..at], &body[at + NAME_SEP.len()..]),
            None => (body, &body[body.len()..]),
        };
        Self {
            raw,
            name: name.trim_ascii(),
            value,
        }
    }
}

/// Iterator over the segments of a decoded token
struct Segments<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let end = find(self.rest, SEGMENT_END)
            .map(|at| at + SEGMENT_END.len())
            .unwrap_or(self.rest.len());
        let (raw, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(Segment::parse(raw))
    }
}

/// Decoded state token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateBlob {
    bytes: Vec<u8>,
}

impl StateBlob {
    /// Decodes a base64 token as found in the search form
    pub fn decode(token: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(token.trim())
            .map_err(|e| CrawlError::MalformedStateBlob(format!("invalid base64: {}", e)))?;
        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Splits the token into segments, keeping every byte
    pub fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        Segments { rest: &self.bytes }
    }

    /// Reads the leading decimal digits of a named field
    pub fn numeric_field(&self, name: &str) -> Result<u64> {
        let segment = self
            .segments()
            .find(|segment| segment.name == name.as_bytes())
            .ok_or_else(|| CrawlError::MalformedStateBlob(format!("missing field {}", name)))?;

        let value = segment.value.trim_ascii_start();
        let digits = value.iter().take_while(|b| b.is_ascii_digit()).count();

        std::str::from_utf8(&value[..digits])
            .ok()
            .and_then(|digits| digits.parse().ok())
            .ok_or_else(|| {
                CrawlError::MalformedStateBlob(format!(
                    "field {} has no numeric value: {:?}",
                    name,
                    String::from_utf8_lossy(segment.value)
                ))
            })
    }

    /// Drops the session-specific `FProps[1..9]` segments
    ///
    /// Remaining segments are kept byte for byte, so cleaning a cleaned token
    /// is a no-op.
    pub fn cleaned(&self) -> Self {
        let pattern = volatile_segment();
        let bytes = self
            .segments()
            .filter(|segment| !pattern.is_match(segment.name))
            .flat_map(|segment| segment.raw.iter().copied())
            .collect();
        Self { bytes }
    }

    pub fn encode(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Size of one lineage, discovered from its first page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationState {
    pub pages_count: u32,
    pub items_count: u64,

    /// Cleaned token, base64-encoded for replay
    pub token: String,
}

impl PaginationState {
    /// Reads page and item counts from a first-page token and cleans it
    pub fn discover(token: &str) -> Result<Self> {
        let blob = StateBlob::decode(token)?;
        let pages = blob.numeric_field(PAGES_FIELD)?;
        let items_count = blob.numeric_field(ITEMS_FIELD)?;
        let pages_count = u32::try_from(pages).map_err(|_| {
            CrawlError::MalformedStateBlob(format!("page count out of range: {}", pages))
        })?;

        Ok(Self {
            pages_count,
            items_count,
            token: blob.cleaned().encode(),
        })
    }

    /// Pages that still have to be fetched after the first one
    pub fn follow_up_pages(&self) -> impl Iterator<Item = u32> {
        2..=self.pages_count
    }
}

/// Turns a first-page search form into the form of a follow-up page
pub fn apply_page_fields(form: &mut Vec<(String, String)>, token: &str, page: u32) {
    set_field(form, TOKEN_FIELD, token.to_string());
    set_field(form, "IsPostBack", "true".to_string());
    set_field(form, "ValueSubmit", page.to_string());
}

fn set_field(form: &mut Vec<(String, String)>, name: &str, value: String) {
    match form.iter_mut().find(|(key, _)| key == name) {
        Some((_, existing)) => *existing = value,
        None => form.push((name.to_string(), value)),
    }
}
