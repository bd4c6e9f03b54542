//! Per-route rate limiting.
//!
//! The API limits each route separately and the whole account globally.
//! Limits are never predicted: they are learned from the headers of the
//! responses, one bucket at a time.
//!
//! # Architecture
//!
//! - [`RouteKey`]: Endpoint path plus major parameters, selects a bucket
//! - [`Gate`]: A "not eligible until" deadline that many tasks can wait on
//! - [`Bucket`]: A gate for one route (or one server-side bucket)
//! - [`BucketRegistry`]: Creates buckets lazily and unifies routes the
//!   server reports as sharing a bucket
//! - [`RateLimitConfig`]: Attempt ceiling and wait bounds
//! - [`RateLimitHeaders`]: The `X-RateLimit-*` and `Retry-After` metadata

mod bucket;
mod config;
mod gate;
mod headers;
mod registry;

pub use bucket::{Bucket, BucketStats, BucketStatsMap, Latencies, RouteKey, normalize_endpoint};
pub use config::RateLimitConfig;
pub use gate::Gate;
pub use headers::RateLimitHeaders;
pub use registry::BucketRegistry;
