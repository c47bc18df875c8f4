//! Usable origin responses and range header parsing

use futures::Stream;
use reqwest::header::CONTENT_RANGE;
use reqwest::{Response, StatusCode};

/// How the origin answered a (possibly ranged) request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// 200: the whole object, starting at byte zero
    Full,
    /// 206: the object from `offset` onward
    Partial,
    /// 416: the requested offset is at or past the end of the object
    RangeNotSatisfiable,
}

/// Parsed `Content-Range` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// First byte of the body, `None` for the `bytes */total` form
    pub start: Option<u64>,
    /// Complete object size, `None` when the origin sent `*`
    pub total: Option<u64>,
}

/// Parse `bytes 100-199/1000`, `bytes 100-199/*` or `bytes */1000`
pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;

    let total = match total.trim() {
        "*" => None,
        t => Some(t.parse::<u64>().ok()?),
    };

    let start = match range.trim() {
        "*" => None,
        r => {
            let (first, last) = r.split_once('-')?;
            let first = first.trim().parse::<u64>().ok()?;
            let last = last.trim().parse::<u64>().ok()?;
            if last < first {
                return None;
            }
            Some(first)
        }
    };

    Some(ContentRange { start, total })
}

/// A response the transfer manager can act on
#[derive(Debug)]
pub struct FetchResponse {
    kind: FetchKind,
    offset: u64,
    total_bytes: Option<u64>,
    response: Response,
}

impl FetchResponse {
    /// Classify a 200, 206 or 416 response
    ///
    /// Returns `None` for any other status.
    pub(crate) fn from_response(response: Response) -> Option<Self> {
        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        let (kind, offset, total_bytes) = match response.status() {
            StatusCode::OK => (FetchKind::Full, 0, response.content_length()),
            StatusCode::PARTIAL_CONTENT => {
                let start = content_range.and_then(|r| r.start).unwrap_or(0);
                let total = content_range.and_then(|r| r.total).or_else(|| {
                    response.content_length().map(|len| start + len)
                });
                (FetchKind::Partial, start, total)
            }
            StatusCode::RANGE_NOT_SATISFIABLE => (
                FetchKind::RangeNotSatisfiable,
                0,
                content_range.and_then(|r| r.total),
            ),
            _ => return None,
        };

        Some(Self {
            kind,
            offset,
            total_bytes,
            response,
        })
    }

    pub fn kind(&self) -> FetchKind {
        self.kind
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Byte offset the body starts at
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Complete object size as reported by the origin
    pub fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    /// Consume the response as a chunk stream
    pub fn bytes_stream(self) -> impl Stream<Item = reqwest::Result<impl AsRef<[u8]>>> {
        self.response.bytes_stream()
    }

    pub fn into_response(self) -> Response {
        self.response
    }
}
