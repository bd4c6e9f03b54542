//! Handler of API requests.
//!
//! This module defines two structs, [`Client`] and [`ClientBuilder`].
//! `Client` sends requests through a rate limiting [`Dispatcher`].
//! `ClientBuilder` exposes a finer level of granularity for building
//! a `Client`.
//!
//! For convenience, a free function [`send`] is provided for ad-hoc
//! requests.
#![allow(clippy::module_name_repetitions)]
use std::sync::Arc;
use std::time::Duration;

use http::header::{self, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use typed_builder::TypedBuilder;
use url::Url;

use crate::{
    Dispatcher, ErrorKind, Request, Response, Result,
    ratelimit::{BucketStatsMap, RateLimitConfig},
    transport::ReqwestTransport,
};

/// Default API root, version 10 of the Discord REST API.
pub const DEFAULT_API_ROOT: &str = "https://discord.com/api/v10/";
/// Default user agent, in the format the API asks bots to identify with.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "DiscordBot(https://github.com/TheUntraceable/GlowCord, ",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// Builder for [`Client`].
///
/// See crate-level documentation for usage example.
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
#[builder(builder_method(doc = "
Create a builder for building `ClientBuilder`.

On the builder call, call methods with same name as its fields to set their values.

Finally, call `.build()` to create the instance of `ClientBuilder`.
"))]
pub struct ClientBuilder {
    /// Bot token, sent as `Authorization: Bot <token>`.
    ///
    /// Requests are sent unauthenticated without it, which only a handful
    /// of endpoints (such as `gateway`) accept.
    token: Option<SecretString>,

    /// Root every endpoint is resolved against.
    ///
    /// Defaults to [`DEFAULT_API_ROOT`].
    api_root: Option<Url>,

    /// User-agent used for all requests.
    ///
    /// *NOTE:* The API rejects requests without a bot-style user agent,
    /// so changing this is rarely useful outside of tests.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,

    /// Sets the default [headers] for every request. See also [here].
    ///
    /// [headers]: https://docs.rs/http/latest/http/header/struct.HeaderName.html
    /// [here]: https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#method.default_headers
    custom_headers: HeaderMap,

    /// Response timeout per transport call.
    timeout: Option<Duration>,

    /// Retry ceiling and wait bounds of the dispatcher.
    rate_limit: RateLimitConfig,
}

impl Default for ClientBuilder {
    #[must_use]
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClientBuilder {
    /// Instantiates a [`Client`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The token or user-agent is not a valid header value.
    /// - The API root is not a valid URL.
    /// - The request client cannot be created.
    ///   See [here](https://docs.rs/reqwest/latest/reqwest/struct.ClientBuilder.html#errors).
    pub fn client(self) -> Result<Client> {
        let Self {
            token,
            api_root,
            user_agent,
            custom_headers: mut headers,
            timeout,
            rate_limit,
        } = self;

        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(&user_agent).map_err(ErrorKind::InvalidHeader)?,
        );

        match token.as_ref().map(ExposeSecret::expose_secret) {
            Some(token) if !token.is_empty() => {
                let mut value = HeaderValue::from_str(&format!("Bot {token}"))
                    .map_err(ErrorKind::InvalidHeader)?;
                value.set_sensitive(true);
                headers.insert(header::AUTHORIZATION, value);
            }
            _ => log::debug!("No bot token configured, sending unauthenticated requests"),
        }

        let builder = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers);

        let reqwest_client = (match timeout {
            Some(t) => builder.timeout(t),
            None => builder,
        })
        .build()
        .map_err(ErrorKind::BuildRequestClient)?;

        let api_root = match api_root {
            Some(url) => url,
            None => Url::parse(DEFAULT_API_ROOT)
                .map_err(|e| ErrorKind::InvalidUrl(DEFAULT_API_ROOT.to_string(), e))?,
        };

        let dispatcher = Dispatcher::new(
            Arc::new(ReqwestTransport::new(reqwest_client)),
            api_root,
            rate_limit,
        );

        Ok(Client { dispatcher })
    }
}

/// Sends requests to the API, honouring its rate limits.
///
/// Cloning a client is cheap and the clones share their rate limit state.
#[derive(Debug, Clone)]
pub struct Client {
    dispatcher: Dispatcher,
}

impl Client {
    /// Send a request. See [`Dispatcher::send`].
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be delivered or stays rate limited.
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.dispatcher.send(request).await
    }

    /// Send a request, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Fails with [`ErrorKind::Timeout`] if the timeout elapsed, otherwise
    /// like [`Client::send`].
    pub async fn send_with_timeout(&self, request: Request, timeout: Duration) -> Result<Response> {
        self.dispatcher.send_with_timeout(request, timeout).await
    }

    /// `GET` an endpoint
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub async fn get(&self, endpoint: &str) -> Result<Response> {
        self.send(Request::get(endpoint)).await
    }

    /// `POST` a JSON body to an endpoint
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub async fn post(&self, endpoint: &str, body: Value) -> Result<Response> {
        self.send(Request::post(endpoint).json(body)).await
    }

    /// `PATCH` an endpoint with a JSON body
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub async fn patch(&self, endpoint: &str, body: Value) -> Result<Response> {
        self.send(Request::patch(endpoint).json(body)).await
    }

    /// `DELETE` an endpoint
    ///
    /// # Errors
    ///
    /// See [`Client::send`].
    pub async fn delete(&self, endpoint: &str) -> Result<Response> {
        self.send(Request::delete(endpoint)).await
    }

    /// Fetch the URL to open a gateway connection to.
    ///
    /// # Errors
    ///
    /// Fails like [`Client::send`], or with [`ErrorKind::UnexpectedBody`]
    /// if the response has no `url` string.
    pub async fn gateway_url(&self) -> Result<Url> {
        let response = self.get("gateway").await?;
        let url = response
            .body()
            .field("url")
            .and_then(Value::as_str)
            .ok_or_else(|| ErrorKind::UnexpectedBody {
                route: response.route().clone(),
                reason: format!("[{}] no `url` field in gateway response", response.status()),
            })?;

        Url::parse(url).map_err(|e| ErrorKind::InvalidUrl(url.to_string(), e))
    }

    /// Statistics of every bucket seen so far
    #[must_use]
    pub fn bucket_stats(&self) -> BucketStatsMap {
        self.dispatcher.bucket_stats()
    }

    /// The dispatcher requests go through
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}

/// A shorthand function to send a single request with a default client
/// built from `token`.
///
/// For more complex scenarios, see documentation of [`ClientBuilder`] instead.
///
/// # Errors
///
/// Returns an `Err` if:
/// - The request client cannot be built (see [`ClientBuilder::client`] for failure cases).
/// - The request cannot be sent (see [`Client::send`] for failure cases).
pub async fn send(token: SecretString, request: Request) -> Result<Response> {
    let client = ClientBuilder::builder().token(token).build().client()?;
    client.send(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use serde_json::json;
    use wiremock::matchers::{header, headers, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, token: Option<&str>) -> Client {
        ClientBuilder::builder()
            .token(token.map(|t| SecretString::from(t.to_string())))
            .api_root(Url::parse(&format!("{}/api/v10/", server.uri())).unwrap())
            .build()
            .client()
            .unwrap()
    }

    #[test]
    fn test_default_user_agent() {
        assert!(DEFAULT_USER_AGENT.starts_with("DiscordBot(https://github.com/TheUntraceable/GlowCord, "));
        assert!(DEFAULT_USER_AGENT.ends_with(')'));
    }

    #[test]
    fn test_invalid_user_agent() {
        let err = ClientBuilder::builder()
            .user_agent("bad\nagent")
            .build()
            .client()
            .unwrap_err();
        assert!(matches!(err, ErrorKind::InvalidHeader(_)));
    }

    #[tokio::test]
    async fn test_default_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v10/users/@me"))
            .and(header("authorization", "Bot s3cret"))
            .and(headers(
                "user-agent",
                DEFAULT_USER_AGENT.split(", ").collect(),
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("s3cret"));
        let response = client.get("/users/@me/").await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().field("id"), Some(&json!("1")));
    }

    #[tokio::test]
    async fn test_custom_headers() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/v10/channels/1/messages/2"))
            .and(header("x-audit-log-reason", "cleanup"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut custom = HeaderMap::new();
        custom.insert("x-audit-log-reason", "cleanup".parse().unwrap());
        let client = ClientBuilder::builder()
            .custom_headers(custom)
            .api_root(Url::parse(&format!("{}/api/v10/", server.uri())).unwrap())
            .build()
            .client()
            .unwrap();

        let response = client.delete("channels/1/messages/2").await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_post_sends_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v10/channels/3/messages"))
            .and(wiremock::matchers::body_json(json!({"content": "hi"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": "hi"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("token"));
        let response = client
            .post("channels/3/messages", json!({"content": "hi"}))
            .await
            .unwrap();
        assert_eq!(response.body().field("content"), Some(&json!("hi")));
    }

    #[tokio::test]
    async fn test_gateway_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v10/gateway"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"url": "wss://gateway.discord.gg"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        assert_eq!(
            client.gateway_url().await.unwrap(),
            Url::parse("wss://gateway.discord.gg").unwrap()
        );
    }

    #[tokio::test]
    async fn test_gateway_url_without_url_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v10/gateway"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.gateway_url().await.unwrap_err();
        assert!(matches!(err, ErrorKind::UnexpectedBody { .. }));
    }
}
