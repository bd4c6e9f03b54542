//! `test-utils` is used for testing in `glowcord-lib`.
//! This crate does not depend on `glowcord-lib`, else we would get dependency cycles.
//! Macros are used instead, so that the importer is responsible for providing the dependencies.

/// Create a mock API server, which responds to any request with a
/// predefined status
#[macro_export]
macro_rules! mock_server {
    ($status:expr $(, $func:tt ($($arg:expr),*))*) => {{
        let mock_server = wiremock::MockServer::start().await;
        let response_template = wiremock::ResponseTemplate::new(http::StatusCode::from($status));
        let template = response_template$(.$func($($arg),*))*;
        wiremock::Mock::given(wiremock::matchers::any()).respond_with(template).mount(&mock_server).await;
        mock_server
    }};
}

/// Mount a response for `$method $path` on an existing mock server, to be
/// served at most `$times` times.
///
/// Mocks mounted earlier take precedence, so a limited response followed by
/// an unlimited one models "fail first, then succeed".
#[macro_export]
macro_rules! mount_route {
    ($server:expr, $method:expr, $path:expr, $template:expr $(, $times:expr)?) => {{
        let mock = wiremock::Mock::given(wiremock::matchers::method($method))
            .and(wiremock::matchers::path($path))
            .respond_with($template);
        $(let mock = mock.up_to_n_times($times);)?
        mock.mount(&$server).await;
    }};
}

/// A 429 response with the given `retry_after` body, optionally global
#[macro_export]
macro_rules! rate_limited {
    ($retry_after:expr) => {
        $crate::rate_limited!($retry_after, false)
    };
    ($retry_after:expr, $global:expr) => {
        wiremock::ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "message": "You are being rate limited.",
            "retry_after": $retry_after,
            "global": $global,
        }))
    };
}

/// Build a client talking to a mock server's `/api/v10/` root
#[macro_export]
macro_rules! mock_client {
    ($server:expr $(, $func:tt ($($arg:expr),*))* $(,)?) => {{
        ClientBuilder::builder()
            .api_root(url::Url::parse(&format!("{}/api/v10/", $server.uri())).unwrap())
            $(.$func($($arg),*))*
            .build()
            .client()
            .unwrap()
    }};
}

/// Absolute path of an endpoint below the mock API root
#[macro_export]
macro_rules! api_path {
    ($endpoint:expr) => {
        format!("/api/v10/{}", $endpoint)
    };
}
