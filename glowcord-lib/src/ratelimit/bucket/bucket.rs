use std::sync::{Mutex, OnceLock};
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::Instant;

use super::key::RouteKey;
use super::stats::BucketStats;
use crate::ratelimit::Gate;

/// The server's rate-limit state for one route, or for one server-side
/// bucket shared by several routes once it has been discovered.
///
/// Each bucket maintains:
/// - A [`Gate`] holding the "not eligible until" deadline
/// - A semaphore bounding the calls in flight (one by default)
/// - The route it was first created for (its synthetic identity)
/// - The server's bucket id, learned from `X-RateLimit-Bucket`
/// - Statistics about the calls made through it
#[derive(Debug)]
pub struct Bucket {
    /// The route this bucket was created for
    pub key: RouteKey,

    /// Deadline gate for this bucket
    gate: Gate,

    /// Controls how many calls may be in flight through this bucket
    in_flight: Semaphore,

    /// Authoritative id from the server, set at most once
    server_id: OnceLock<String>,

    /// Request statistics
    stats: Mutex<BucketStats>,
}

impl Bucket {
    /// Create a bucket for `key` which is eligible immediately and allows
    /// `concurrency` calls in flight (at least one)
    #[must_use]
    pub fn new(key: RouteKey, concurrency: usize) -> Self {
        Self {
            key,
            gate: Gate::new(),
            in_flight: Semaphore::new(concurrency.max(1)),
            server_id: OnceLock::new(),
            stats: Mutex::new(BucketStats::default()),
        }
    }

    /// Reserve an in-flight slot. The slot is released when the permit is
    /// dropped, which also happens when the caller is cancelled.
    ///
    /// Returns `None` only if the semaphore was closed, which never happens
    /// while the bucket is alive.
    pub async fn acquire(&self) -> Option<SemaphorePermit<'_>> {
        self.in_flight.acquire().await.ok()
    }

    /// Number of free in-flight slots
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.in_flight.available_permits()
    }

    /// Suspend until this bucket may send again
    pub async fn wait(&self) {
        if let Some(deadline) = self.gate.deadline() {
            log::debug!(
                "Bucket {} is throttled, waiting {}ms",
                self.name(),
                deadline.saturating_duration_since(Instant::now()).as_millis()
            );
        }
        self.gate.wait().await;
    }

    /// Make this bucket ineligible until `deadline` (last writer wins)
    pub fn arm(&self, deadline: Instant) {
        log::debug!(
            "Arming bucket {} for {}ms",
            self.name(),
            deadline.saturating_duration_since(Instant::now()).as_millis()
        );
        self.gate.arm(deadline);
    }

    /// Make this bucket ineligible for `duration` from now
    pub fn arm_for(&self, duration: Duration) -> Instant {
        let deadline = Instant::now() + duration;
        self.arm(deadline);
        deadline
    }

    /// Carry a pending deadline over without shortening our own
    pub(crate) fn extend(&self, deadline: Instant) {
        self.gate.extend(deadline);
    }

    /// The pending deadline, if the bucket is currently throttled
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.gate.deadline()
    }

    /// Whether a call may go out through this bucket right now
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.gate.is_eligible()
    }

    /// The server's bucket id, once known
    #[must_use]
    pub fn server_id(&self) -> Option<&str> {
        self.server_id.get().map(String::as_str)
    }

    /// Whether the server's bucket id has been recorded
    #[must_use]
    pub fn is_rekeyed(&self) -> bool {
        self.server_id.get().is_some()
    }

    /// Record the server's bucket id. Returns `false` if an id was
    /// already set; the first id sticks.
    pub(crate) fn set_server_id(&self, id: &str) -> bool {
        self.server_id.set(id.to_string()).is_ok()
    }

    /// Server id if known, the route otherwise
    #[must_use]
    pub fn name(&self) -> String {
        self.server_id()
            .map_or_else(|| self.key.to_string(), str::to_string)
    }

    /// Apply `f` to this bucket's statistics
    ///
    /// # Panics
    ///
    /// Panics if the statistics mutex is poisoned
    pub(crate) fn record<F: FnOnce(&mut BucketStats)>(&self, f: F) {
        f(&mut self.stats.lock().unwrap());
    }

    /// Move the statistics out, leaving empty ones behind
    ///
    /// # Panics
    ///
    /// Panics if the statistics mutex is poisoned
    pub(crate) fn take_stats(&self) -> BucketStats {
        std::mem::take(&mut *self.stats.lock().unwrap())
    }

    /// Get bucket statistics
    ///
    /// # Panics
    ///
    /// Panics if the statistics mutex is poisoned
    #[must_use]
    pub fn stats(&self) -> BucketStats {
        self.stats.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bucket_creation() {
        let key = RouteKey::new("channels/42/messages", None, Some("42"));
        let bucket = Bucket::new(key.clone(), 1);

        assert_eq!(bucket.key, key);
        assert!(bucket.is_eligible());
        assert!(!bucket.is_rekeyed());
        assert_eq!(bucket.name(), "channels/42/messages [channel 42]");
        assert_eq!(bucket.stats().total_requests, 0);
        assert_eq!(bucket.available_permits(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_id_is_set_once() {
        let bucket = Bucket::new(RouteKey::new("gateway", None, None), 1);

        assert!(bucket.set_server_id("abc"));
        assert!(!bucket.set_server_id("def"));
        assert_eq!(bucket.server_id(), Some("abc"));
        assert_eq!(bucket.name(), "abc");
    }

    #[tokio::test(start_paused = true)]
    async fn test_arm_and_wait() {
        let bucket = Bucket::new(RouteKey::new("guilds/1", Some("1"), None), 1);
        bucket.arm_for(Duration::from_millis(1500));
        assert!(!bucket.is_eligible());

        let start = Instant::now();
        bucket.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_in_flight_slots() {
        let bucket = Bucket::new(RouteKey::new("guilds/1", Some("1"), None), 2);

        let first = bucket.acquire().await.unwrap();
        let second = bucket.acquire().await.unwrap();
        assert_eq!(bucket.available_permits(), 0);

        drop(first);
        assert_eq!(bucket.available_permits(), 1);
        drop(second);
        assert_eq!(bucket.available_permits(), 2);
    }

    #[test]
    fn test_zero_concurrency_still_allows_one_call() {
        let bucket = Bucket::new(RouteKey::new("gateway", None, None), 0);
        assert_eq!(bucket.available_permits(), 1);
    }
}
