//! Deadline-backed eligibility gates.
//!
//! A [`Gate`] is either eligible now or ineligible until a deadline. It is
//! not a lock: any number of tasks may [`Gate::wait`] on it and all of them
//! resolve together once the deadline elapses.
//!
//! # Implementation Details
//!
//! The deadline lives in a [`tokio::sync::watch`] channel. Waiters sleep
//! until the deadline they last observed, but also wake up whenever the
//! deadline is replaced. Re-arming therefore hands off atomically to every
//! suspended waiter: a later deadline keeps them waiting, an earlier one
//! releases them earlier.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

/// A single "not eligible until T" slot
#[derive(Debug)]
pub struct Gate {
    deadline: watch::Sender<Option<Instant>>,
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Gate {
    /// Create a gate that is eligible immediately
    #[must_use]
    pub fn new() -> Self {
        let (deadline, _) = watch::channel(None);
        Self { deadline }
    }

    /// Suspend until the gate is eligible.
    ///
    /// Resolves immediately when no deadline is armed or the armed deadline
    /// has already elapsed.
    pub async fn wait(&self) {
        let mut receiver = self.deadline.subscribe();
        loop {
            let deadline = *receiver.borrow_and_update();
            let Some(deadline) = deadline else {
                return;
            };
            if deadline <= Instant::now() {
                return;
            }

            tokio::select! {
                () = sleep_until(deadline) => {}
                changed = receiver.changed() => {
                    // The sender lives as long as `self`, so this cannot
                    // fail while we hold a reference
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Make the gate ineligible until `deadline`.
    ///
    /// The last writer wins: arming while already armed replaces the
    /// previous deadline, even with an earlier one.
    pub fn arm(&self, deadline: Instant) {
        self.deadline.send_replace(Some(deadline));
    }

    /// Arm the gate for `duration` from now
    pub fn arm_for(&self, duration: Duration) -> Instant {
        let deadline = Instant::now() + duration;
        self.arm(deadline);
        deadline
    }

    /// Arm the gate only if `deadline` is later than the current one
    pub fn extend(&self, deadline: Instant) {
        self.deadline.send_if_modified(|current| match current {
            Some(existing) if *existing >= deadline => false,
            _ => {
                *current = Some(deadline);
                true
            }
        });
    }

    /// The armed deadline, if it has not elapsed yet
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        let now = Instant::now();
        (*self.deadline.borrow()).filter(|deadline| *deadline > now)
    }

    /// Whether a call may proceed right now
    #[must_use]
    pub fn is_eligible(&self) -> bool {
        self.deadline().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_new_gate_is_eligible() {
        let gate = Gate::new();
        assert!(gate.is_eligible());
        assert_eq!(gate.deadline(), None);

        let start = Instant::now();
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_deadline() {
        let gate = Gate::new();
        gate.arm_for(Duration::from_millis(1500));
        assert!(!gate.is_eligible());

        let start = Instant::now();
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
        assert!(gate.is_eligible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fractional_seconds_are_honoured() {
        let gate = Gate::new();
        gate.arm_for(Duration::from_secs_f64(0.25));

        let start = Instant::now();
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_waiters_resolve_together() {
        let gate = Arc::new(Gate::new());
        gate.arm_for(Duration::from_secs(2));
        let start = Instant::now();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let gate = Arc::clone(&gate);
                tokio::spawn(async move {
                    gate.wait().await;
                    start.elapsed()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Duration::from_secs(2));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_later_extends_suspended_waiters() {
        let gate = Arc::new(Gate::new());
        gate.arm_for(Duration::from_secs(1));
        let start = Instant::now();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                gate.wait().await;
                start.elapsed()
            })
        };

        tokio::time::sleep(Duration::from_millis(500)).await;
        gate.arm(start + Duration::from_secs(3));

        assert_eq!(waiter.await.unwrap(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_earlier_releases_suspended_waiters() {
        let gate = Arc::new(Gate::new());
        gate.arm_for(Duration::from_secs(5));
        let start = Instant::now();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                gate.wait().await;
                start.elapsed()
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        // last writer wins, even when it shortens the window
        gate.arm(start + Duration::from_secs(1));

        assert_eq!(waiter.await.unwrap(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_never_shortens() {
        let gate = Gate::new();
        let start = Instant::now();
        gate.arm(start + Duration::from_secs(4));

        gate.extend(start + Duration::from_secs(1));
        assert_eq!(gate.deadline(), Some(start + Duration::from_secs(4)));

        gate.extend(start + Duration::from_secs(6));
        assert_eq!(gate.deadline(), Some(start + Duration::from_secs(6)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_deadline_is_eligible() {
        let gate = Gate::new();
        gate.arm_for(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(gate.is_eligible());
        let start = Instant::now();
        gate.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
