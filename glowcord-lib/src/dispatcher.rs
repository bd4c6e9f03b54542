//! Runs logical requests end to end against the rate limits.
//!
//! For every attempt the [`Dispatcher`] resolves the request's bucket,
//! waits for the bucket and then for the global gate, performs the
//! transport call and feeds what the server reported back into the
//! buckets. Requests rejected with HTTP 429 are retried in a bounded loop.

use http::StatusCode;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

use crate::ratelimit::{
    Bucket, BucketRegistry, BucketStatsMap, Gate, RateLimitConfig, RateLimitHeaders, RouteKey,
    normalize_endpoint,
};
use crate::transport::{RawResponse, Transport, TransportRequest};
use crate::{Body, ErrorKind, Request, Response, Result};

/// The rate limit hints in the JSON body of a 429 response
#[derive(Debug, Default)]
struct RateLimitBody {
    retry_after: Option<f64>,
    global: bool,
}

impl RateLimitBody {
    /// Read both fields independently, so a malformed one does not hide
    /// the other. `retry_after` may also arrive as a numeric string.
    fn from_body(body: &Body) -> Self {
        let retry_after = body.field("retry_after").and_then(|value| {
            value
                .as_f64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        });
        let global = body
            .field("global")
            .and_then(Value::as_bool)
            .unwrap_or_default();

        Self {
            retry_after,
            global,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        let secs = self.retry_after?;
        if secs.is_nan() || secs <= 0.0 {
            return Some(Duration::ZERO);
        }
        Duration::try_from_secs_f64(secs).ok()
    }
}

/// Sends [`Request`]s through a [`Transport`] while honouring per-route and
/// global rate limits.
///
/// Cloning is cheap, all clones share the same buckets and global gate.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    api_root: Url,
    registry: Arc<BucketRegistry>,
    global: Arc<Gate>,
    config: RateLimitConfig,
}

impl Dispatcher {
    /// Create a dispatcher sending to endpoints below `api_root`
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, mut api_root: Url, config: RateLimitConfig) -> Self {
        // `Url::join` replaces the last segment unless the base ends in `/`
        if !api_root.path().ends_with('/') {
            let path = format!("{}/", api_root.path());
            api_root.set_path(&path);
        }

        Self {
            transport,
            api_root,
            registry: Arc::new(BucketRegistry::with_concurrency(config.bucket_concurrency)),
            global: Arc::new(Gate::new()),
            config,
        }
    }

    /// The absolute URL of `endpoint`
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidUrl`] if the endpoint cannot be joined
    /// onto the API root.
    pub fn url_for(&self, endpoint: &str) -> Result<Url> {
        self.api_root
            .join(&normalize_endpoint(endpoint))
            .map_err(|e| ErrorKind::InvalidUrl(endpoint.to_string(), e))
    }

    /// Send `request`, waiting for and retrying on rate limits.
    ///
    /// Non-2xx responses other than 429 are returned as they are.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::RateLimitExceeded`] if every attempt was answered
    ///   with 429
    /// - [`ErrorKind::Transport`] or [`ErrorKind::TransportMessage`] if a
    ///   call could not be completed; those are not retried
    /// - [`ErrorKind::InvalidUrl`] if the endpoint is not a valid path
    pub async fn send(&self, request: Request) -> Result<Response> {
        let route = request.route_key();
        let url = self.url_for(&request.endpoint)?;

        let mut attempt = 0;
        loop {
            let bucket = self.registry.resolve(&route);

            // Held until the response has been applied to the bucket
            let _permit = bucket.acquire().await;
            self.wait_until_eligible(&bucket).await;

            if !Arc::ptr_eq(&bucket, &self.registry.resolve(&route)) {
                log::debug!("Route {route} was moved to a shared bucket while waiting, queueing there");
                continue;
            }
            attempt += 1;

            log::trace!("Dispatching {request} (attempt {attempt})");
            let started = Instant::now();
            let raw = match self
                .transport
                .execute(TransportRequest {
                    method: request.method.clone(),
                    url: url.clone(),
                    body: request.body.clone(),
                    route: route.clone(),
                })
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    self.registry
                        .resolve(&route)
                        .record(|stats| stats.record_transport_error());
                    return Err(e);
                }
            };
            let elapsed = started.elapsed();

            let RawResponse {
                status,
                headers,
                body,
            } = raw;
            let limits = RateLimitHeaders::parse(&headers);
            let body = Body::from_bytes(&body);

            // The route may have been moved to a shared bucket while this
            // call was in flight
            let current = self.registry.resolve(&route);
            current.record(|stats| {
                stats.record_response(status.as_u16(), elapsed);
                if limits.remaining.is_some() {
                    stats.last_remaining = limits.remaining;
                }
            });

            if status == StatusCode::TOO_MANY_REQUESTS {
                self.handle_rate_limited(&bucket, &current, &route, &limits, &body);
                if attempt >= self.config.max_attempts {
                    return Err(ErrorKind::RateLimitExceeded {
                        route,
                        attempts: attempt,
                    });
                }
                continue;
            }

            if limits.is_exhausted() {
                match limits.reset_after {
                    Some(reset_after) => {
                        Self::arm(&bucket, &current, self.config.clamp(reset_after));
                    }
                    None => log::warn!(
                        "Route {route} reports no remaining calls but no reset time, not throttling"
                    ),
                }
            }

            if !current.is_rekeyed()
                && let Some(server_id) = &limits.bucket
            {
                self.registry.rekey(&route, server_id);
            }

            return Ok(Response::new(route, status, headers, body, attempt));
        }
    }

    /// Like [`Dispatcher::send`], but give up after `timeout`.
    ///
    /// Giving up drops the in-flight attempt; deadlines it already armed
    /// stay in place.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Timeout`] if the timeout elapsed, otherwise the
    /// same errors as [`Dispatcher::send`].
    pub async fn send_with_timeout(&self, request: Request, timeout: Duration) -> Result<Response> {
        let route = request.route_key();
        tokio::time::timeout(timeout, self.send(request))
            .await
            .map_err(|_| ErrorKind::Timeout { route, timeout })?
    }

    async fn wait_until_eligible(&self, bucket: &Bucket) {
        loop {
            bucket.wait().await;
            if !self.global.is_eligible() {
                log::debug!("Global rate limit active, holding {}", bucket.name());
                self.global.wait().await;
            }
            // The bucket may have been armed again while we were held
            // by the global gate
            if bucket.is_eligible() {
                return;
            }
        }
    }

    /// Arm the bucket a call went out on and, if its route has since been
    /// moved elsewhere, the bucket the route resolves to now
    fn arm(bucket: &Arc<Bucket>, current: &Arc<Bucket>, wait: Duration) -> Instant {
        let deadline = bucket.arm_for(wait);
        if !Arc::ptr_eq(bucket, current) {
            log::debug!(
                "Route {} moved to bucket {} mid-call, arming it as well",
                bucket.key,
                current.name()
            );
            current.extend(deadline);
        }
        deadline
    }

    fn handle_rate_limited(
        &self,
        bucket: &Arc<Bucket>,
        current: &Arc<Bucket>,
        route: &RouteKey,
        limits: &RateLimitHeaders,
        body: &Body,
    ) {
        let hint = RateLimitBody::from_body(body);
        let wait = self.config.clamp(self.retry_after(limits, &hint));
        let deadline = Self::arm(bucket, current, wait);

        if limits.global || hint.global {
            log::warn!(
                "Global rate limit hit on {route}, pausing all routes for {}ms",
                wait.as_millis()
            );
            self.global.arm(deadline);
            current.record(|stats| stats.global_rate_limited += 1);
        } else {
            log::warn!(
                "Rate limited on {route}, retrying in {}ms",
                wait.as_millis()
            );
        }
    }

    /// The larger of the header and body hints, then the reset time, then
    /// the configured default
    fn retry_after(&self, limits: &RateLimitHeaders, hint: &RateLimitBody) -> Duration {
        [limits.retry_after, hint.retry_after()]
            .into_iter()
            .flatten()
            .max()
            .or(limits.reset_after)
            .unwrap_or(self.config.default_retry_after)
    }

    /// The registry holding this dispatcher's buckets
    #[must_use]
    pub fn registry(&self) -> &BucketRegistry {
        &self.registry
    }

    /// The gate every request passes after its bucket
    #[must_use]
    pub fn global_gate(&self) -> &Gate {
        &self.global
    }

    /// Whether a global rate limit is currently in effect
    #[must_use]
    pub fn is_globally_limited(&self) -> bool {
        !self.global.is_eligible()
    }

    /// The rate limiting configuration
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Statistics of every bucket seen so far
    #[must_use]
    pub fn bucket_stats(&self) -> BucketStatsMap {
        self.registry.stats()
    }
}
