#![allow(clippy::module_inception)]

mod bucket;
mod key;
mod stats;

pub use bucket::Bucket;
pub use key::{RouteKey, normalize_endpoint};
pub use stats::{BucketStats, BucketStatsMap, Latencies};
