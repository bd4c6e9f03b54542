use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::Serialize;
use serde::ser::SerializeStruct;

/// Number of latency samples kept per bucket
const LATENCY_SAMPLES: usize = 64;

/// The latencies of the most recent transport calls of a bucket.
///
/// At most `capacity` samples are kept, the oldest is dropped first.
#[derive(Debug, Clone)]
pub struct Latencies {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl Default for Latencies {
    fn default() -> Self {
        Self::with_capacity(LATENCY_SAMPLES)
    }
}

impl Latencies {
    /// Keep up to `capacity` samples
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a sample, evicting the oldest one when full
    pub fn record(&mut self, latency: Duration) {
        if self.capacity == 0 {
            return;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    /// Number of samples kept
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether no call has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &Duration> {
        self.samples.iter()
    }

    /// Mean of the kept samples
    #[must_use]
    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let total: Duration = self.samples.iter().sum();
        #[allow(clippy::cast_possible_truncation)]
        Some(total / (self.samples.len() as u32))
    }

    /// Nearest-rank percentile of the kept samples, `p` in `0.0..=1.0`
    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<_> = self.samples.iter().copied().collect();
        sorted.sort_unstable();

        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let rank = (p.clamp(0.0, 1.0) * sorted.len() as f64).ceil() as usize;
        sorted.get(rank.saturating_sub(1)).copied()
    }
}

/// Record and report statistics for a [`crate::ratelimit::Bucket`]
#[derive(Debug, Clone, Default)]
pub struct BucketStats {
    /// Total number of transport calls made through this bucket
    pub total_requests: u64,
    /// Number of successful responses (2xx status)
    pub successful_requests: u64,
    /// Number of rate limited responses (429)
    pub rate_limited: u64,
    /// Number of those 429s that were flagged as global
    pub global_rate_limited: u64,
    /// Number of client error responses (4xx, excluding 429)
    pub client_errors: u64,
    /// Number of server error responses (5xx)
    pub server_errors: u64,
    /// Number of transport failures
    pub transport_errors: u64,
    /// Last value of `X-RateLimit-Remaining` seen on this bucket
    pub last_remaining: Option<u64>,
    /// Latencies of the most recent transport calls
    pub request_times: Latencies,
}

impl BucketStats {
    /// Record a response with status code and request duration
    pub fn record_response(&mut self, status_code: u16, request_time: Duration) {
        self.total_requests += 1;

        match status_code {
            200..=299 => self.successful_requests += 1,
            429 => self.rate_limited += 1,
            400..=499 => self.client_errors += 1,
            500..=599 => self.server_errors += 1,
            _ => {}
        }

        self.request_times.record(request_time);
    }

    /// Record a transport call that never produced a response
    pub fn record_transport_error(&mut self) {
        self.total_requests += 1;
        self.transport_errors += 1;
    }

    /// Fold the statistics of a bucket that was merged into this one.
    ///
    /// Our own `last_remaining` wins since it belongs to the bucket that
    /// stays; `other`'s latencies are replayed before ours.
    pub fn merge(&mut self, other: Self) {
        self.total_requests += other.total_requests;
        self.successful_requests += other.successful_requests;
        self.rate_limited += other.rate_limited;
        self.global_rate_limited += other.global_rate_limited;
        self.client_errors += other.client_errors;
        self.server_errors += other.server_errors;
        self.transport_errors += other.transport_errors;
        self.last_remaining = self.last_remaining.or(other.last_remaining);

        let ours = std::mem::take(&mut self.request_times.samples);
        for latency in other.request_times.samples.into_iter().chain(ours) {
            self.request_times.record(latency);
        }
    }

    /// Get the current success rate (0.0 to 1.0)
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let success_rate = self.successful_requests as f64 / self.total_requests as f64;
            success_rate
        }
    }

    /// Get average request time over the recorded samples
    #[must_use]
    pub fn average_request_time(&self) -> Option<Duration> {
        self.request_times.average()
    }

    /// 95th percentile request time over the recorded samples
    #[must_use]
    pub fn p95_request_time(&self) -> Option<Duration> {
        self.request_times.percentile(0.95)
    }

    /// Get human-readable summary of the stats
    #[must_use]
    pub fn summary(&self) -> String {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let success_pct = (self.success_rate() * 100.0) as u64;

        let millis = |d: Option<Duration>| {
            d.map_or_else(|| "N/A".to_string(), |d| format!("{}ms", d.as_millis()))
        };

        format!(
            "{} requests ({}% success, {} rate limited), avg: {}, p95: {}",
            self.total_requests,
            success_pct,
            self.rate_limited,
            millis(self.average_request_time()),
            millis(self.p95_request_time())
        )
    }
}

/// A [`HashMap`] of bucket names to their [`BucketStats`]
pub type BucketStatsMap = HashMap<String, BucketStats>;

impl Serialize for BucketStats {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let average_request_time_ms = self.average_request_time().map(|d| d.as_millis());
        let p95_request_time_ms = self.p95_request_time().map(|d| d.as_millis());

        let mut s = serializer.serialize_struct("BucketStats", 11)?;
        s.serialize_field("total_requests", &self.total_requests)?;
        s.serialize_field("successful_requests", &self.successful_requests)?;
        s.serialize_field("success_rate", &self.success_rate())?;
        s.serialize_field("rate_limited", &self.rate_limited)?;
        s.serialize_field("global_rate_limited", &self.global_rate_limited)?;
        s.serialize_field("client_errors", &self.client_errors)?;
        s.serialize_field("server_errors", &self.server_errors)?;
        s.serialize_field("transport_errors", &self.transport_errors)?;
        s.serialize_field("last_remaining", &self.last_remaining)?;
        s.serialize_field("average_request_time_ms", &average_request_time_ms)?;
        s.serialize_field("p95_request_time_ms", &p95_request_time_ms)?;
        s.end()
    }
}
