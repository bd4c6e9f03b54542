//! Handle rate limiting headers.
//!
//! The API reports its per-route state through `X-RateLimit-*` headers and,
//! on 429 responses, through `Retry-After` plus a JSON body.
//! [`http::HeaderMap`] lookups are case-insensitive.

use http::{HeaderMap, HeaderValue};
use std::time::{Duration, SystemTime};
use thiserror::Error;

pub(crate) const RETRY_AFTER: &str = "retry-after";
pub(crate) const REMAINING: &str = "x-ratelimit-remaining";
pub(crate) const RESET_AFTER: &str = "x-ratelimit-reset-after";
pub(crate) const BUCKET: &str = "x-ratelimit-bucket";
pub(crate) const GLOBAL: &str = "x-ratelimit-global";

#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum RetryAfterParseError {
    #[error("Unable to parse value '{0}'")]
    ValueError(String),

    #[error("Header value contains invalid chars")]
    HeaderValueError,
}

/// Convert a number of seconds into a [`Duration`], keeping sub-second
/// precision. Negative values and NaN clamp to zero, values too large for
/// a `Duration` are rejected.
pub(crate) fn seconds(value: f64) -> Option<Duration> {
    if value.is_nan() || value <= 0.0 {
        return Some(Duration::ZERO);
    }
    Duration::try_from_secs_f64(value).ok()
}

/// Parse the "Retry-After" header.
///
/// The API sends fractional delay-seconds (`"0.25"`), but an
/// [RFC 7231 section 7.1.3](https://www.rfc-editor.org/rfc/rfc7231#section-7.1.3)
/// HTTP-date is accepted as well.
pub(crate) fn parse_retry_after(value: &HeaderValue) -> Result<Duration, RetryAfterParseError> {
    let value = value
        .to_str()
        .map_err(|_| RetryAfterParseError::HeaderValueError)?
        .trim();

    // RFC 7231: Retry-After = HTTP-date / delay-seconds
    match value.parse::<f64>() {
        Ok(secs) if secs >= 0.0 => {
            seconds(secs).ok_or_else(|| RetryAfterParseError::ValueError(value.into()))
        }
        Ok(_) => Err(RetryAfterParseError::ValueError(value.into())),
        Err(_) => httpdate::parse_http_date(value)
            .map(|s| {
                s.duration_since(SystemTime::now())
                    // if date is in the past, we can use ZERO
                    .unwrap_or(Duration::ZERO)
            })
            .map_err(|_| RetryAfterParseError::ValueError(value.into())),
    }
}

/// Rate-limit metadata of a single response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// `Retry-After`
    pub retry_after: Option<Duration>,
    /// `X-RateLimit-Remaining`
    pub remaining: Option<u64>,
    /// `X-RateLimit-Reset-After`
    pub reset_after: Option<Duration>,
    /// `X-RateLimit-Bucket`
    pub bucket: Option<String>,
    /// `X-RateLimit-Global`
    pub global: bool,
}

impl RateLimitHeaders {
    /// Extract the rate-limit headers from a header map.
    ///
    /// Values which cannot be parsed are logged and treated as absent.
    #[must_use]
    pub fn parse(headers: &HeaderMap) -> Self {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|value| match parse_retry_after(value) {
                Ok(duration) => Some(duration),
                Err(e) => {
                    log::warn!("Ignoring Retry-After header: {e}");
                    None
                }
            });

        let remaining = header_str(headers, REMAINING).and_then(|value| {
            value
                .parse::<u64>()
                .map_err(|_| log::warn!("Ignoring {REMAINING} header '{value}'"))
                .ok()
        });

        let reset_after = header_str(headers, RESET_AFTER).and_then(|value| {
            value
                .parse::<f64>()
                .ok()
                .and_then(seconds)
                .or_else(|| {
                    log::warn!("Ignoring {RESET_AFTER} header '{value}'");
                    None
                })
        });

        let bucket = header_str(headers, BUCKET)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        let global =
            header_str(headers, GLOBAL).is_some_and(|value| value.eq_ignore_ascii_case("true"));

        Self {
            retry_after,
            remaining,
            reset_after,
            bucket,
            global,
        }
    }

    /// Whether the current window has no calls left
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self.remaining, Some(0))
    }
}

/// Helper to read a header as a trimmed string slice
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{HeaderMap, HeaderValue};
    use pretty_assertions::assert_eq;

    use crate::ratelimit::headers::{
        RateLimitHeaders, RetryAfterParseError, parse_retry_after, seconds,
    };

    #[test]
    fn test_retry_after() {
        assert_eq!(parse_retry_after(&value("1")), Ok(Duration::from_secs(1)));
        assert_eq!(
            parse_retry_after(&value("0.5")),
            Ok(Duration::from_millis(500))
        );
        assert_eq!(
            parse_retry_after(&value("2.0")),
            Ok(Duration::from_secs(2))
        );
        assert_eq!(
            parse_retry_after(&value("-1")),
            Err(RetryAfterParseError::ValueError("-1".into()))
        );
        assert_eq!(
            parse_retry_after(&value("soon")),
            Err(RetryAfterParseError::ValueError("soon".into()))
        );

        assert_eq!(
            parse_retry_after(&value("Fri, 15 May 2015 15:34:21 GMT")),
            Ok(Duration::ZERO)
        );

        let result = parse_retry_after(&value("Fri, 15 May 4099 15:34:21 GMT"));
        let is_in_future = matches!(result, Ok(d) if d.as_secs() > 0);
        assert!(is_in_future);
    }

    #[test]
    fn test_seconds_clamping() {
        assert_eq!(seconds(1.5), Some(Duration::from_millis(1500)));
        assert_eq!(seconds(-3.0), Some(Duration::ZERO));
        assert_eq!(seconds(f64::NAN), Some(Duration::ZERO));
        assert_eq!(seconds(f64::INFINITY), None);
    }

    #[test]
    fn test_parse_rate_limit_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", value("0"));
        headers.insert("X-RateLimit-Reset-After", value("1.5"));
        headers.insert("X-RateLimit-Bucket", value("xyz"));

        let parsed = RateLimitHeaders::parse(&headers);
        assert_eq!(
            parsed,
            RateLimitHeaders {
                retry_after: None,
                remaining: Some(0),
                reset_after: Some(Duration::from_millis(1500)),
                bucket: Some("xyz".into()),
                global: false,
            }
        );
        assert!(parsed.is_exhausted());
    }

    #[test]
    fn test_parse_case_insensitive_and_global() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", value("2.0"));
        headers.insert("x-ratelimit-global", value("True"));
        headers.insert("x-ratelimit-remaining", value("4"));

        let parsed = RateLimitHeaders::parse(&headers);
        assert_eq!(parsed.retry_after, Some(Duration::from_secs(2)));
        assert!(parsed.global);
        assert!(!parsed.is_exhausted());
    }

    #[test]
    fn test_garbage_headers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("X-RateLimit-Remaining", value("many"));
        headers.insert("X-RateLimit-Reset-After", value("later"));
        headers.insert("Retry-After", value("-4"));
        headers.insert("X-RateLimit-Bucket", value(""));

        assert_eq!(RateLimitHeaders::parse(&headers), RateLimitHeaders::default());
    }

    fn value(v: &str) -> HeaderValue {
        HeaderValue::from_str(v).unwrap()
    }
}
