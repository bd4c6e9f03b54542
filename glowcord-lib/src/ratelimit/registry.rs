use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

use crate::ratelimit::{Bucket, BucketStatsMap, RouteKey};

/// Maps routes to their [`Bucket`]s.
///
/// Buckets are created lazily on first use and live as long as the
/// registry. Once the server reveals its own bucket id for a route (through
/// `X-RateLimit-Bucket`), the bucket is also registered under that id, so
/// that other routes the server groups into the same bucket end up sharing
/// one instance.
///
/// # Architecture
///
/// - Each unique [`RouteKey`] resolves to exactly one bucket at any time
/// - Buckets are inserted through `DashMap::entry`, so concurrent first
///   calls for one route never create two buckets
/// - Several routes may point at the same bucket after re-keying
#[derive(Debug)]
pub struct BucketRegistry {
    /// Route to bucket, created on demand
    routes: DashMap<RouteKey, Arc<Bucket>>,

    /// Server bucket id to bucket, filled by [`BucketRegistry::rekey`]
    server_buckets: DashMap<String, Arc<Bucket>>,

    /// In-flight slots given to each new bucket
    bucket_concurrency: usize,
}

impl Default for BucketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BucketRegistry {
    /// Create an empty registry whose buckets allow one call in flight
    #[must_use]
    pub fn new() -> Self {
        Self::with_concurrency(1)
    }

    /// Create an empty registry whose buckets allow `bucket_concurrency`
    /// calls in flight
    #[must_use]
    pub fn with_concurrency(bucket_concurrency: usize) -> Self {
        Self {
            routes: DashMap::new(),
            server_buckets: DashMap::new(),
            bucket_concurrency,
        }
    }

    /// Get the bucket for `key`, creating an eligible one if none exists
    pub fn resolve(&self, key: &RouteKey) -> Arc<Bucket> {
        if let Some(bucket) = self.routes.get(key) {
            return Arc::clone(bucket.value());
        }

        match self.routes.entry(key.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                log::debug!("Creating bucket for route {key}");
                let bucket = Arc::new(Bucket::new(key.clone(), self.bucket_concurrency));
                Arc::clone(entry.insert(bucket).value())
            }
        }
    }

    /// Look up the bucket for `key` without creating one
    #[must_use]
    pub fn get(&self, key: &RouteKey) -> Option<Arc<Bucket>> {
        self.routes.get(key).map(|bucket| Arc::clone(bucket.value()))
    }

    /// Look up the bucket registered under a server bucket id
    #[must_use]
    pub fn get_by_server_id(&self, server_id: &str) -> Option<Arc<Bucket>> {
        self.server_buckets
            .get(server_id)
            .map(|bucket| Arc::clone(bucket.value()))
    }

    /// Associate `key` with the server's bucket id.
    ///
    /// If nothing is registered under `server_id` yet, the route's bucket
    /// is installed under it. If another bucket already owns the id, the
    /// route is pointed at that bucket instead; a deadline pending on the
    /// route's old bucket carries over so the shared bucket never becomes
    /// eligible earlier than either of them, and so do its statistics. Calling this again with the
    /// same arguments is a no-op.
    ///
    /// Returns the bucket `key` resolves to afterwards.
    pub fn rekey(&self, key: &RouteKey, server_id: &str) -> Arc<Bucket> {
        let bucket = self.resolve(key);

        let shared = match self.server_buckets.entry(server_id.to_string()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                if bucket.set_server_id(server_id) {
                    log::debug!("Route {key} belongs to server bucket {server_id}");
                } else {
                    log::debug!(
                        "Route {key} reports server bucket {server_id}, but its bucket is already {}",
                        bucket.name()
                    );
                }
                Arc::clone(entry.insert(Arc::clone(&bucket)).value())
            }
        };

        if Arc::ptr_eq(&bucket, &shared) {
            return bucket;
        }

        log::debug!("Route {key} now shares server bucket {server_id}");
        if let Some(deadline) = bucket.deadline() {
            shared.extend(deadline);
        }
        // A bucket without a server id is only reachable through `key`, so
        // its history moves along with the route
        if !bucket.is_rekeyed() {
            let moved = bucket.take_stats();
            shared.record(|stats| stats.merge(moved));
        }
        self.routes.insert(key.clone(), Arc::clone(&shared));
        shared
    }

    /// Number of routes that have been resolved
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Number of distinct server buckets discovered so far
    #[must_use]
    pub fn server_bucket_count(&self) -> usize {
        self.server_buckets.len()
    }

    /// Statistics for every distinct bucket, keyed by bucket name
    #[must_use]
    pub fn stats(&self) -> BucketStatsMap {
        let mut stats = BucketStatsMap::new();
        for entry in &self.routes {
            let bucket = entry.value();
            stats
                .entry(bucket.name())
                .or_insert_with(|| bucket.stats());
        }
        stats
    }
}
