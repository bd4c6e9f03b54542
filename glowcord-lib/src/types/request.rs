use http::Method;
use serde_json::Value;
use std::fmt::Display;

use crate::ratelimit::{RouteKey, normalize_endpoint};

/// A single logical API call.
///
/// Requests are plain values: the dispatcher never mutates them, retries
/// reuse the same request with an attempt counter kept internally.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Endpoint relative to the API root, without leading or trailing slash
    pub endpoint: String,
    /// Optional JSON payload
    pub body: Option<Value>,
    /// Guild the endpoint belongs to, if it is scoped to one
    pub guild_id: Option<String>,
    /// Channel the endpoint belongs to, if it is scoped to one
    pub channel_id: Option<String>,
}

impl Request {
    /// Create a request for `endpoint`.
    ///
    /// The endpoint is normalized: `"/guilds/1/"` and `"guilds/1"` are the
    /// same request.
    #[must_use]
    pub fn new(method: Method, endpoint: &str) -> Self {
        Self {
            method,
            endpoint: normalize_endpoint(endpoint),
            body: None,
            guild_id: None,
            channel_id: None,
        }
    }

    /// `GET` request
    #[must_use]
    pub fn get(endpoint: &str) -> Self {
        Self::new(Method::GET, endpoint)
    }

    /// `POST` request
    #[must_use]
    pub fn post(endpoint: &str) -> Self {
        Self::new(Method::POST, endpoint)
    }

    /// `PATCH` request
    #[must_use]
    pub fn patch(endpoint: &str) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    /// `DELETE` request
    #[must_use]
    pub fn delete(endpoint: &str) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    /// Attach a JSON payload
    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Scope the request to a guild
    #[must_use]
    pub fn guild(mut self, guild_id: impl Display) -> Self {
        self.guild_id = Some(guild_id.to_string());
        self
    }

    /// Scope the request to a channel
    #[must_use]
    pub fn channel(mut self, channel_id: impl Display) -> Self {
        self.channel_id = Some(channel_id.to_string());
        self
    }

    /// The route this request is rate limited under
    #[must_use]
    pub fn route_key(&self) -> RouteKey {
        RouteKey::new(
            &self.endpoint,
            self.guild_id.as_deref(),
            self.channel_id.as_deref(),
        )
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} /{}", self.method, self.endpoint)
    }
}
