//! Burst protection: a sliding-window limiter keyed by caller address and
//! endpoint, applied before any identity handling.

use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::endpoints::Endpoint;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

/// Seam for the gateway; swap in [`NoopRateLimiter`] to disable limiting in
/// tests or deployments fronted by an external limiter.
pub trait RateLimiter: Send + Sync {
    fn check(&self, caller: &str, endpoint: Endpoint) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check(&self, _caller: &str, _endpoint: Endpoint) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

type WindowKey = (String, Endpoint);

/// Per-key sliding window over recent request instants.
///
/// Each key owns its own lock, so concurrent requests for the same caller
/// contend only with each other. Stale keys are dropped by a background
/// sweeper; without it decisions stay correct, memory just grows with the
/// number of distinct callers.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    windows: Arc<DashMap<WindowKey, Mutex<Vec<Instant>>>>,
    window: Duration,
    ceiling: usize,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new(window: Duration, ceiling: usize) -> Self {
        Self {
            windows: Arc::new(DashMap::new()),
            window,
            ceiling,
        }
    }

    /// Drop every key whose window no longer holds any recent instant.
    fn sweep(&self) {
        let cutoff = Instant::now() - self.window;
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            let mut timestamps = timestamps.lock().unwrap_or_else(PoisonError::into_inner);
            timestamps.retain(|at| *at > cutoff);
            !timestamps.is_empty()
        });
        let dropped = before.saturating_sub(self.windows.len());
        if dropped > 0 {
            debug!(dropped, "swept stale rate-limit windows");
        }
    }

    /// Spawn the periodic sweep task. The returned handle stops the task and
    /// waits for it to finish.
    #[must_use]
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let limiter = self.clone();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    () = tokio::time::sleep(interval) => limiter.sweep(),
                }
            }
        });
        SweeperHandle { shutdown_tx, task }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

impl RateLimiter for SlidingWindowLimiter {
    fn check(&self, caller: &str, endpoint: Endpoint) -> RateLimitDecision {
        let now = Instant::now();
        let cutoff = now - self.window;
        let entry = self
            .windows
            .entry((caller.to_string(), endpoint))
            .or_insert_with(|| Mutex::new(Vec::new()));
        let mut timestamps = entry.lock().unwrap_or_else(PoisonError::into_inner);

        timestamps.retain(|at| *at > cutoff);
        if timestamps.len() >= self.ceiling {
            return RateLimitDecision::Limited;
        }
        timestamps.push(now);
        RateLimitDecision::Allowed
    }
}

/// Cancellation handle for the sweep task.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::{NoopRateLimiter, RateLimitDecision, RateLimiter, SlidingWindowLimiter};
    use crate::auth::endpoints::Endpoint;
    use std::time::Duration;

    #[test]
    fn noop_always_allows() {
        let limiter = NoopRateLimiter;
        for _ in 0..100 {
            assert_eq!(
                limiter.check("10.0.0.1", Endpoint::Simplify),
                RateLimitDecision::Allowed
            );
        }
    }

    #[test]
    fn ceiling_applies_within_the_window() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 3);
        for _ in 0..3 {
            assert_eq!(
                limiter.check("10.0.0.1", Endpoint::Simplify),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.check("10.0.0.1", Endpoint::Simplify),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn keys_do_not_interfere() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60), 1);
        assert_eq!(
            limiter.check("10.0.0.1", Endpoint::Simplify),
            RateLimitDecision::Allowed
        );
        // Same caller, different endpoint; different caller, same endpoint.
        assert_eq!(
            limiter.check("10.0.0.1", Endpoint::Translate),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check("10.0.0.2", Endpoint::Simplify),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check("10.0.0.1", Endpoint::Simplify),
            RateLimitDecision::Limited
        );
    }

    #[test]
    fn window_expiry_readmits() {
        let limiter = SlidingWindowLimiter::new(Duration::from_millis(50), 1);
        assert_eq!(
            limiter.check("10.0.0.1", Endpoint::Simplify),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.check("10.0.0.1", Endpoint::Simplify),
            RateLimitDecision::Limited
        );
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(
            limiter.check("10.0.0.1", Endpoint::Simplify),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn sweep_drops_only_stale_keys() {
        let limiter = SlidingWindowLimiter::new(Duration::from_millis(50), 10);
        limiter.check("stale", Endpoint::Simplify);
        std::thread::sleep(Duration::from_millis(60));
        limiter.check("fresh", Endpoint::Simplify);

        limiter.sweep();
        assert_eq!(limiter.tracked_keys(), 1);
        // The surviving key still counts its requests.
        assert_eq!(
            limiter.check("fresh", Endpoint::Simplify),
            RateLimitDecision::Allowed
        );
    }

    #[tokio::test]
    async fn sweeper_task_stops_on_request() {
        let limiter = SlidingWindowLimiter::new(Duration::from_millis(10), 1);
        let handle = limiter.spawn_sweeper(Duration::from_millis(5));
        limiter.check("10.0.0.1", Endpoint::Simplify);
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop().await;
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
