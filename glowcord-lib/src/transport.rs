//! The HTTP boundary of the dispatcher.
//!
//! [`Transport`] is the only place where a request leaves the process. The
//! dispatcher hands it a fully resolved URL and gets back the status, the
//! headers and the raw body bytes; everything rate-limit related happens
//! on either side of this call.

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use serde_json::Value;
use url::Url;

use crate::ratelimit::RouteKey;
use crate::{ErrorKind, Result};

/// A request as it goes over the wire
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL (API root joined with the endpoint)
    pub url: Url,
    /// Optional JSON payload
    pub body: Option<Value>,
    /// Route the request is dispatched under, for error reporting
    pub route: RouteKey,
}

/// A response as it comes back over the wire
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Undecoded body
    pub body: Vec<u8>,
}

/// Performs HTTP calls on behalf of the dispatcher.
///
/// Implementations must not retry or wait on their own; returning an error
/// means the call could not be completed at all.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Execute a single HTTP call
    async fn execute(&self, request: TransportRequest) -> Result<RawResponse>;
}

/// [`Transport`] backed by a [`reqwest::Client`]
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wrap an already configured client. Default headers (authorization,
    /// user agent) are expected to be set on it.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<RawResponse> {
        let TransportRequest {
            method,
            url,
            body,
            route,
        } = request;

        let mut builder = self.client.request(method, url);
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| ErrorKind::Transport {
                route: route.clone(),
                source,
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|source| ErrorKind::Transport { route, source })?;

        Ok(RawResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
