//! Byte-window sampling plans
//!
//! Small files are fetched whole. Larger ones are sampled with three
//! fixed-size windows: head, middle and tail. The part index of every
//! window is fixed so checksums stay reproducible between runs.

use crate::config::FingerprintConfig;
use crate::crawler::FetchRequest;
use crate::CrawlError;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, RANGE};

/// Part index used when the whole file is one sample
pub const WHOLE_FILE_PART: u8 = 0;

/// One byte range of a file to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteWindow {
    pub part_index: u8,

    /// First byte offset (inclusive)
    pub start: u64,

    /// Last byte offset (inclusive)
    pub end: u64,

    /// Whether the window is requested relative to the end of the file
    pub from_end: bool,
}

impl ByteWindow {
    /// Number of bytes covered
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Range` header value for this window
    pub fn range_header(&self) -> String {
        if self.from_end {
            format!("bytes=-{}", self.size())
        } else {
            format!("bytes={}-{}", self.start, self.end)
        }
    }
}

/// How a file will be sampled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SamplingPlan {
    /// Fetch the whole file as part 0
    WholeFile { length: u64 },

    /// Fetch head, middle and tail as parts 1, 2 and 3
    Windows([ByteWindow; 3]),
}

impl SamplingPlan {
    /// Part indices the plan will produce, in request order
    pub fn part_indices(&self) -> Vec<u8> {
        match self {
            Self::WholeFile { .. } => vec![WHOLE_FILE_PART],
            Self::Windows(windows) => windows.iter().map(|w| w.part_index).collect(),
        }
    }
}

/// Decides sampling windows and builds the matching requests
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    window_size: u64,
    sample_count: u64,
    accept_encoding: String,
}

impl Fingerprinter {
    pub fn new(config: &FingerprintConfig) -> Self {
        Self {
            window_size: config.window_size,
            sample_count: config.sample_count,
            accept_encoding: config.accept_encoding.clone(),
        }
    }

    /// Largest file size that is fetched whole
    pub fn whole_file_limit(&self) -> u64 {
        self.sample_count.saturating_mul(self.window_size)
    }

    /// Chooses a sampling plan from the declared length of a file
    ///
    /// A missing, unparsable or non-positive length is an error rather than
    /// a plan: there is nothing meaningful to sample.
    pub fn plan(&self, url: &str, declared_length: Option<i64>) -> Result<SamplingPlan, CrawlError> {
        let length = match declared_length {
            Some(length) if length > 0 => length as u64,
            _ => {
                return Err(CrawlError::MissingContentLength {
                    url: url.to_string(),
                })
            }
        };

        if length <= self.whole_file_limit() {
            return Ok(SamplingPlan::WholeFile { length });
        }

        let w = self.window_size;
        let middle_start = (length - w) / 2;
        Ok(SamplingPlan::Windows([
            ByteWindow {
                part_index: 1,
                start: 0,
                end: w - 1,
                from_end: false,
            },
            ByteWindow {
                part_index: 2,
                start: middle_start,
                end: middle_start + w - 1,
                from_end: false,
            },
            ByteWindow {
                part_index: 3,
                start: length - w,
                end: length - 1,
                from_end: true,
            },
        ]))
    }

    /// Builds one fetch request per planned part
    ///
    /// `content_type` is the type reported by the probe and is echoed back
    /// in `Accept`.
    pub fn requests(
        &self,
        url: &str,
        content_type: Option<&str>,
        plan: &SamplingPlan,
    ) -> Vec<(u8, FetchRequest)> {
        let base = || {
            let mut request =
                FetchRequest::get(url).header(ACCEPT_ENCODING, self.accept_encoding.as_str());
            if let Some(content_type) = content_type {
                request = request.header(ACCEPT, content_type);
            }
            request
        };

        match plan {
            SamplingPlan::WholeFile { .. } => vec![(WHOLE_FILE_PART, base())],
            SamplingPlan::Windows(windows) => windows
                .iter()
                .map(|window| {
                    (
                        window.part_index,
                        base().header(RANGE, window.range_header()),
                    )
                })
                .collect(),
        }
    }
}
