// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-origin sliding-window rate limiting.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;
use vimg_config::model::GuardConfig;
use vimg_core::OriginId;

/// Admitted call timestamps for one origin.
#[derive(Debug)]
struct RateWindow {
    timestamps: VecDeque<Instant>,
    window: Duration,
    ceiling: usize,
}

impl RateWindow {
    fn new(window: Duration, ceiling: usize) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(ceiling),
            window,
            ceiling,
        }
    }

    /// Drops timestamps at least one window old.
    fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window) else {
            return;
        };
        while self.timestamps.front().is_some_and(|&t| t <= cutoff) {
            self.timestamps.pop_front();
        }
    }

    fn is_full(&self) -> bool {
        self.timestamps.len() >= self.ceiling
    }
}

/// Sliding-window limiter keyed by origin.
///
/// Each origin's window lives in its own map shard entry; the entry guard is
/// held across prune, check and append, so admissions for one origin are
/// linearized while different origins proceed independently.
#[derive(Debug)]
pub struct RateLimiter {
    windows: DashMap<String, RateWindow>,
    ceiling: usize,
    window: Duration,
}

impl RateLimiter {
    /// `ceiling` calls per `window`; a ceiling of 0 disables limiting.
    pub fn new(ceiling: usize, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            ceiling,
            window,
        }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(
            config.rate_limit_max_calls_per_group as usize,
            Duration::from_secs(config.rate_limit_period_seconds),
        )
    }

    pub fn is_enabled(&self) -> bool {
        self.ceiling > 0
    }

    /// Admits one call for `origin` at `now`, or rejects it without recording.
    pub fn admit(&self, origin: &OriginId, now: Instant) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let mut window = self
            .windows
            .entry(origin.as_str().to_string())
            .or_insert_with(|| RateWindow::new(self.window, self.ceiling));
        window.prune(now);

        if window.is_full() {
            debug!(origin = %origin, calls = window.timestamps.len(), "rate limit reached");
            return false;
        }
        window.timestamps.push_back(now);
        true
    }

    /// Time until `origin` can be admitted again, `None` if it can be now.
    pub fn retry_after(&self, origin: &OriginId, now: Instant) -> Option<Duration> {
        if !self.is_enabled() {
            return None;
        }
        let mut window = self.windows.get_mut(origin.as_str())?;
        window.prune(now);
        if !window.is_full() {
            return None;
        }
        let oldest = *window.timestamps.front()?;
        Some((oldest + window.window).saturating_duration_since(now))
    }

    /// Number of origins seen so far.
    pub fn tracked_origins(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use proptest::prelude::*;

    fn origin(id: &str) -> OriginId {
        OriginId::from(id)
    }

    #[test]
    fn nth_plus_one_call_is_rejected_until_window_passes() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let group = origin("g1");
        let t0 = Instant::now();

        for i in 0..3 {
            assert!(limiter.admit(&group, t0 + Duration::from_secs(i)));
        }
        assert!(!limiter.admit(&group, t0 + Duration::from_secs(30)));
        assert!(!limiter.admit(&group, t0 + Duration::from_secs(59)));

        // The first call ages out; exactly one slot reopens.
        assert!(limiter.admit(&group, t0 + Duration::from_secs(60)));
        assert!(!limiter.admit(&group, t0 + Duration::from_secs(60)));
    }

    #[test]
    fn rejections_do_not_consume_slots() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let group = origin("g1");
        let t0 = Instant::now();

        assert!(limiter.admit(&group, t0));
        for s in 1..10 {
            assert!(!limiter.admit(&group, t0 + Duration::from_secs(s)));
        }
        assert!(limiter.admit(&group, t0 + Duration::from_secs(10)));
    }

    #[test]
    fn zero_ceiling_disables_limiting() {
        let limiter = RateLimiter::new(0, Duration::from_secs(60));
        let now = Instant::now();
        for _ in 0..100 {
            assert!(limiter.admit(&origin("g1"), now));
        }
        assert_eq!(limiter.tracked_origins(), 0);
        assert_eq!(limiter.retry_after(&origin("g1"), now), None);
    }

    #[test]
    fn origins_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.admit(&origin("a"), now));
        assert!(!limiter.admit(&origin("a"), now));
        assert!(limiter.admit(&origin("b"), now));
        assert_eq!(limiter.tracked_origins(), 2);
    }

    #[test]
    fn retry_after_counts_down_to_oldest_expiry() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let group = origin("g1");
        let t0 = Instant::now();

        assert_eq!(limiter.retry_after(&group, t0), None);
        limiter.admit(&group, t0);
        limiter.admit(&group, t0 + Duration::from_secs(20));
        assert_eq!(
            limiter.retry_after(&group, t0 + Duration::from_secs(45)),
            Some(Duration::from_secs(15))
        );
        assert_eq!(limiter.retry_after(&group, t0 + Duration::from_secs(60)), None);
    }

    #[test]
    fn from_config_reads_guard_section() {
        let config = GuardConfig {
            rate_limit_max_calls_per_group: 4,
            rate_limit_period_seconds: 30,
            ..GuardConfig::default()
        };
        let limiter = RateLimiter::from_config(&config);
        assert!(limiter.is_enabled());
        assert_eq!(limiter.ceiling, 4);
        assert_eq!(limiter.window, Duration::from_secs(30));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_admissions_never_exceed_ceiling() {
        let limiter = Arc::new(RateLimiter::new(5, Duration::from_secs(60)));
        let now = Instant::now();

        let mut handles = Vec::new();
        for i in 0..64 {
            let limiter = limiter.clone();
            let id = if i % 2 == 0 { "even" } else { "odd" };
            handles.push(tokio::spawn(async move { (id, limiter.admit(&origin(id), now)) }));
        }

        let mut even = 0;
        let mut odd = 0;
        for handle in handles {
            let (id, admitted) = handle.await.unwrap();
            if admitted {
                if id == "even" {
                    even += 1;
                } else {
                    odd += 1;
                }
            }
        }
        assert_eq!(even, 5);
        assert_eq!(odd, 5);
    }

    proptest! {
        #[test]
        fn n_calls_admitted_then_rejected_then_recovered(n in 1usize..20, period in 1u64..3600) {
            let window = Duration::from_secs(period);
            let limiter = RateLimiter::new(n, window);
            let group = origin("g");
            let t0 = Instant::now();

            for _ in 0..n {
                prop_assert!(limiter.admit(&group, t0));
            }
            prop_assert!(!limiter.admit(&group, t0 + window - Duration::from_millis(1)));
            prop_assert!(limiter.admit(&group, t0 + window));
        }
    }
}
