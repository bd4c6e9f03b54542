use serde::{Serialize, Serializer};
use std::hash::Hash;
use std::time::Duration;
use thiserror::Error;

use crate::ratelimit::RouteKey;

/// Possible Errors when interacting with `glowcord_lib`
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The underlying HTTP call could not be completed (connection refused,
    /// DNS failure, TLS error, body read failure, ...).
    /// Never retried by the dispatcher.
    #[error("Network error while sending request to {route}: {source}")]
    Transport {
        /// The route the request was dispatched under
        route: RouteKey,
        /// The underlying `reqwest` error
        #[source]
        source: reqwest::Error,
    },

    /// A [`crate::Transport`] implementation failed without a `reqwest` error
    #[error("Transport failure for {route}: {message}")]
    TransportMessage {
        /// The route the request was dispatched under
        route: RouteKey,
        /// Description of the failure
        message: String,
    },

    /// The server kept answering with HTTP 429 until the attempt ceiling
    /// was reached
    #[error("Route {route} still rate limited after {attempts} attempts")]
    RateLimitExceeded {
        /// The route that exceeded its limit
        route: RouteKey,
        /// Number of transport calls made
        attempts: u32,
    },

    /// The caller-supplied timeout elapsed before the request finished
    #[error("Request to {route} timed out after {}ms", timeout.as_millis())]
    Timeout {
        /// The route the request was dispatched under
        route: RouteKey,
        /// The timeout that elapsed
        timeout: Duration,
    },

    /// The given header could not be parsed.
    /// A possible error when converting a `HeaderValue` from a string or byte
    /// slice.
    #[error("Header could not be parsed.")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The request client cannot be built
    #[error("Error creating request client: {0}")]
    BuildRequestClient(#[source] reqwest::Error),

    /// The endpoint could not be joined onto the API root
    #[error("Cannot build URL for endpoint `{0}`: {1}")]
    InvalidUrl(String, #[source] url::ParseError),

    /// The rate limit configuration could not be loaded
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),

    /// A response body did not have the shape a helper expected
    #[error("Unexpected response body from {route}: {reason}")]
    UnexpectedBody {
        /// The route that returned the body
        route: RouteKey,
        /// What was missing or malformed
        reason: String,
    },
}

impl ErrorKind {
    /// The route a dispatch error belongs to, if any
    #[must_use]
    pub const fn route(&self) -> Option<&RouteKey> {
        match self {
            Self::Transport { route, .. }
            | Self::TransportMessage { route, .. }
            | Self::RateLimitExceeded { route, .. }
            | Self::Timeout { route, .. }
            | Self::UnexpectedBody { route, .. } => Some(route),
            Self::InvalidHeader(_)
            | Self::BuildRequestClient(_)
            | Self::InvalidUrl(..)
            | Self::InvalidConfig(_) => None,
        }
    }

    /// Return `true` if the request failed because the server kept
    /// rate limiting it
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    /// Return `true` if the request could not reach the server
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::TransportMessage { .. }
        )
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Transport {
                    route: r1,
                    source: e1,
                },
                Self::Transport {
                    route: r2,
                    source: e2,
                },
            ) => r1 == r2 && e1.to_string() == e2.to_string(),
            (
                Self::TransportMessage {
                    route: r1,
                    message: m1,
                },
                Self::TransportMessage {
                    route: r2,
                    message: m2,
                },
            ) => r1 == r2 && m1 == m2,
            (
                Self::RateLimitExceeded {
                    route: r1,
                    attempts: a1,
                },
                Self::RateLimitExceeded {
                    route: r2,
                    attempts: a2,
                },
            ) => r1 == r2 && a1 == a2,
            (
                Self::Timeout {
                    route: r1,
                    timeout: t1,
                },
                Self::Timeout {
                    route: r2,
                    timeout: t2,
                },
            ) => r1 == r2 && t1 == t2,
            (Self::BuildRequestClient(e1), Self::BuildRequestClient(e2)) => {
                e1.to_string() == e2.to_string()
            }
            (Self::InvalidUrl(s1, e1), Self::InvalidUrl(s2, e2)) => s1 == s2 && e1 == e2,
            (Self::InvalidConfig(c1), Self::InvalidConfig(c2)) => c1 == c2,
            (
                Self::UnexpectedBody {
                    route: r1,
                    reason: m1,
                },
                Self::UnexpectedBody {
                    route: r2,
                    reason: m2,
                },
            ) => r1 == r2 && m1 == m2,
            (Self::InvalidHeader(_), Self::InvalidHeader(_)) => true,
            _ => false,
        }
    }
}

impl Eq for ErrorKind {}

impl Hash for ErrorKind {
    fn hash<H>(&self, state: &mut H)
    where
        H: std::hash::Hasher,
    {
        match self {
            Self::Transport { route, source } => (route, source.to_string()).hash(state),
            Self::TransportMessage { route, message } => (route, message).hash(state),
            Self::RateLimitExceeded { route, attempts } => (route, attempts).hash(state),
            Self::Timeout { route, timeout } => (route, timeout).hash(state),
            Self::UnexpectedBody { route, reason } => (route, reason).hash(state),
            Self::InvalidHeader(e) => e.to_string().hash(state),
            Self::BuildRequestClient(e) => e.to_string().hash(state),
            Self::InvalidUrl(s, e) => (s, e.to_string()).hash(state),
            Self::InvalidConfig(c) => c.hash(state),
        }
    }
}

impl Serialize for ErrorKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<toml::de::Error> for ErrorKind {
    fn from(e: toml::de::Error) -> Self {
        Self::InvalidConfig(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_exceeded_display() {
        let err = ErrorKind::RateLimitExceeded {
            route: RouteKey::new("channels/42/messages", None, Some("42")),
            attempts: 3,
        };
        assert!(err.is_rate_limited());
        assert!(!err.is_transport());
        assert_eq!(
            err.to_string(),
            "Route channels/42/messages [channel 42] still rate limited after 3 attempts"
        );
    }

    #[test]
    fn test_route_accessor() {
        let route = RouteKey::new("gateway", None, None);
        let err = ErrorKind::TransportMessage {
            route: route.clone(),
            message: "connection reset".into(),
        };
        assert!(err.is_transport());
        assert_eq!(err.route(), Some(&route));
        assert_eq!(ErrorKind::InvalidConfig("x".into()).route(), None);
    }

    #[test]
    fn test_config_error_from_toml() {
        let err: ErrorKind = toml::from_str::<toml::Table>("max_attempts = ")
            .unwrap_err()
            .into();
        assert!(matches!(err, ErrorKind::InvalidConfig(_)));
    }
}
