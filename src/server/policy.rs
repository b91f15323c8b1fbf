//! HTTP cache headers and conditional GET.
//!
//! Every image response carries caching headers derived from one
//! [`CachePolicy`]:
//!
//! | max-age | Cache-Control            | Last-Modified | ETag |
//! |---------|--------------------------|---------------|------|
//! | 0       | `no-cache`               | -             | -    |
//! | n > 0   | `public, max-age=n`      | yes           | yes  |
//!
//! The ETag is the MD5 of the cache key followed by the artifact's unix
//! timestamp, so it changes whenever the cached derivative is rewritten.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use http::header::{
    HeaderName, ALLOW, CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_LENGTH,
    CONTENT_TYPE, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED,
};
use http::{HeaderMap, HeaderValue, Method};
use md5::{Digest, Md5};

use crate::error::ConfigError;

/// Default max-age: 31 days.
pub const DEFAULT_MAX_AGE: u64 = 2_678_400;

/// Format of `Last-Modified` (RFC 1123, always GMT).
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Headers that describe a body and must not appear on a 304.
const CONTENT_HEADERS: [HeaderName; 6] = [
    ALLOW,
    CONTENT_ENCODING,
    CONTENT_LANGUAGE,
    CONTENT_LENGTH,
    CONTENT_TYPE,
    LAST_MODIFIED,
];

// =============================================================================
// Max Age
// =============================================================================

/// Cache lifetime in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MaxAge(u64);

impl MaxAge {
    /// Caching disabled (`Cache-Control: no-cache`).
    pub const ZERO: MaxAge = MaxAge(0);

    /// Build from a signed integer; negative values are rejected.
    pub fn new(seconds: i64) -> Result<Self, ConfigError> {
        u64::try_from(seconds)
            .map(MaxAge)
            .map_err(|_| ConfigError::InvalidMaxAge(seconds.to_string()))
    }

    pub fn seconds(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Default for MaxAge {
    fn default() -> Self {
        MaxAge(DEFAULT_MAX_AGE)
    }
}

impl FromStr for MaxAge {
    type Err = ConfigError;

    /// Only integers are accepted: no fractions, no surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let seconds: i64 = s
            .parse()
            .map_err(|_| ConfigError::InvalidMaxAge(s.to_string()))?;
        MaxAge::new(seconds).map_err(|_| ConfigError::InvalidMaxAge(s.to_string()))
    }
}

impl fmt::Display for MaxAge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Cache Policy
// =============================================================================

/// Produces the caching headers for image responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    max_age: MaxAge,
}

impl CachePolicy {
    pub fn new(max_age: MaxAge) -> Self {
        Self { max_age }
    }

    pub fn max_age(&self) -> MaxAge {
        self.max_age
    }

    pub fn set_max_age(&mut self, max_age: MaxAge) {
        self.max_age = max_age;
    }

    /// Caching headers for an artifact last modified at `last_modified`.
    ///
    /// `cache_key` seeds the ETag together with the timestamp.
    pub fn headers_for(&self, last_modified: DateTime<Utc>, cache_key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if self.max_age.is_zero() {
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
            return headers;
        }

        insert(
            &mut headers,
            CACHE_CONTROL,
            format!("public, max-age={}", self.max_age),
        );
        insert(&mut headers, LAST_MODIFIED, http_date(last_modified));
        insert(
            &mut headers,
            ETAG,
            etag_for(cache_key, last_modified.timestamp()),
        );

        headers
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: String) {
    if let Ok(value) = HeaderValue::try_from(value) {
        headers.insert(name, value);
    }
}

/// Quoted ETag for a cache key at a unix timestamp.
pub fn etag_for(cache_key: &str, timestamp: i64) -> String {
    let digest = Md5::digest(format!("{}{}", cache_key, timestamp).as_bytes());
    format!("\"{}\"", hex::encode(digest))
}

/// Format a timestamp as an HTTP date.
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

/// Parse an HTTP date (RFC 1123 / RFC 2822 form).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

// =============================================================================
// Conditional GET
// =============================================================================

/// Whether a response with `response_headers` can be answered with 304.
///
/// Only GET and HEAD qualify. `If-None-Match` matches the response ETag
/// (weak comparison) or `*`. `If-Modified-Since` matches when it is at or
/// after `Last-Modified`. When the request carries both, both must match.
pub fn is_not_modified(
    method: &Method,
    request_headers: &HeaderMap,
    response_headers: &HeaderMap,
) -> bool {
    if *method != Method::GET && *method != Method::HEAD {
        return false;
    }

    let etag_match = if_none_match(request_headers).map(|candidates| {
        let etag = header_str(response_headers, &ETAG).map(strip_weak);
        candidates
            .iter()
            .any(|c| *c == "*" || Some(strip_weak(c)) == etag)
    });

    let modified_since = header_str(request_headers, &IF_MODIFIED_SINCE).and_then(parse_http_date);
    let last_modified = header_str(response_headers, &LAST_MODIFIED).and_then(parse_http_date);
    let date_match = match (modified_since, last_modified) {
        (Some(since), Some(modified)) => Some(since >= modified),
        _ => None,
    };

    match (etag_match, date_match) {
        (Some(etag), Some(date)) => etag && date,
        (Some(etag), None) => etag,
        (None, Some(date)) => date,
        (None, None) => false,
    }
}

/// Turn response headers into those of a 304: body headers are dropped,
/// caching headers (`Cache-Control`, `ETag`) are kept.
pub fn not_modified(mut headers: HeaderMap) -> HeaderMap {
    for name in CONTENT_HEADERS.iter() {
        headers.remove(name);
    }
    headers
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn if_none_match(headers: &HeaderMap) -> Option<Vec<&str>> {
    let candidates: Vec<&str> = headers
        .get_all(IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect();

    (!candidates.is_empty()).then_some(candidates)
}

fn strip_weak(etag: &str) -> &str {
    etag.strip_prefix("W/").unwrap_or(etag)
}
