use http::{HeaderMap, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;

use crate::ratelimit::RouteKey;

/// A response body.
///
/// The API answers with JSON almost everywhere, but proxies and outages
/// produce plain text or HTML error pages. Those are kept as text instead
/// of failing the request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Body {
    /// A body that parsed as JSON
    Json(Value),
    /// Anything else, decoded lossily as UTF-8
    Text(String),
}

impl Body {
    /// Parse raw bytes, falling back to text if they are not valid JSON
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    /// The JSON value, if the body was JSON
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// The raw text, if the body was not JSON
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Json(_) => None,
            Self::Text(text) => Some(text),
        }
    }

    /// A top-level field of a JSON object body
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_json().and_then(|value| value.get(name))
    }
}

/// Response returned by the dispatcher after a request completed
#[derive(Debug, Clone)]
pub struct Response {
    route: RouteKey,
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    attempts: u32,
}

impl Response {
    #[inline]
    #[must_use]
    /// Create new response
    pub const fn new(
        route: RouteKey,
        status: StatusCode,
        headers: HeaderMap,
        body: Body,
        attempts: u32,
    ) -> Self {
        Self {
            route,
            status,
            headers,
            body,
            attempts,
        }
    }

    /// The route the request was dispatched under
    #[must_use]
    pub const fn route(&self) -> &RouteKey {
        &self.route
    }

    /// HTTP status code
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response body
    #[must_use]
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// Consume the response, returning its body
    #[must_use]
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Number of transport calls it took to get this response
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.route)
    }
}
