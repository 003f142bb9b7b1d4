// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request retry bookkeeping and backoff.

use std::time::Duration;

use vimg_core::{FailureKind, GenerationFailure};

/// Decode failures get this many retries, independent of the attempt ceiling.
const MAX_DECODE_RETRIES: u32 = 1;

/// Capped exponential backoff: `base * 2^(n-1)` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay to wait after `failed_attempts` attempts have failed.
    pub fn delay(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Attempt counter for one generation request.
///
/// Created when the request starts and consumed when it resolves.
#[derive(Debug)]
pub struct RetryState {
    attempts: u32,
    max_attempts: u32,
    decode_failures: u32,
    last_failure: Option<GenerationFailure>,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            max_attempts: max_attempts.max(1),
            decode_failures: 0,
            last_failure: None,
        }
    }

    /// Marks the start of an attempt and returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Records a failed attempt. Returns whether another attempt is allowed.
    pub fn record_failure(&mut self, failure: GenerationFailure) -> bool {
        let kind = failure.kind;
        self.last_failure = Some(failure);

        if !kind.is_retryable() {
            return false;
        }
        if kind == FailureKind::DecodeError {
            self.decode_failures += 1;
            if self.decode_failures > MAX_DECODE_RETRIES {
                return false;
            }
        }
        self.attempts < self.max_attempts
    }

    /// The final failure, stamped with the number of attempts made.
    pub fn into_failure(self) -> GenerationFailure {
        let attempts = self.attempts;
        self.last_failure
            .unwrap_or_else(|| {
                GenerationFailure::new(FailureKind::ApiError, "request failed without an attempt")
            })
            .with_attempts(attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(kind: FailureKind) -> GenerationFailure {
        GenerationFailure::new(kind, "boom")
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(4));
        assert_eq!(backoff.delay(5), Duration::from_secs(10));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn api_errors_retry_until_ceiling() {
        let mut state = RetryState::new(3);
        state.begin_attempt();
        assert!(state.record_failure(failure(FailureKind::ApiError)));
        state.begin_attempt();
        assert!(state.record_failure(failure(FailureKind::Timeout)));
        state.begin_attempt();
        assert!(!state.record_failure(failure(FailureKind::ApiError)));

        let last = state.into_failure();
        assert_eq!(last.kind, FailureKind::ApiError);
        assert_eq!(last.attempts, 3);
    }

    #[test]
    fn safety_block_never_retries() {
        let mut state = RetryState::new(5);
        state.begin_attempt();
        assert!(!state.record_failure(failure(FailureKind::SafetyBlocked)));
        assert_eq!(state.into_failure().attempts, 1);
    }

    #[test]
    fn decode_error_retries_once() {
        let mut state = RetryState::new(5);
        state.begin_attempt();
        assert!(state.record_failure(failure(FailureKind::DecodeError)));
        state.begin_attempt();
        assert!(!state.record_failure(failure(FailureKind::DecodeError)));
        assert_eq!(state.into_failure().kind, FailureKind::DecodeError);
    }

    #[test]
    fn decode_retry_still_bounded_by_ceiling() {
        let mut state = RetryState::new(1);
        state.begin_attempt();
        assert!(!state.record_failure(failure(FailureKind::DecodeError)));
    }

    #[test]
    fn zero_ceiling_still_allows_one_attempt() {
        let mut state = RetryState::new(0);
        assert_eq!(state.begin_attempt(), 1);
        assert!(!state.record_failure(failure(FailureKind::ApiError)));
    }
}
