//! Exponential backoff with symmetric jitter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Delay before the first retry.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
/// Growth factor applied per attempt.
pub const DEFAULT_MULTIPLIER: u32 = 2;
/// Upper bound for any computed delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

const SPLITMIX_GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

/// Source of random bits for jitter.
pub trait JitterSource: Send + Sync {
    /// Returns the next pseudo-random value.
    fn next_u64(&self) -> u64;
}

/// `SplitMix64` generator; deterministic for a given seed.
#[derive(Debug)]
pub struct SeededJitter {
    state: AtomicU64,
}

impl SeededJitter {
    /// Creates a generator from an explicit seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: AtomicU64::new(seed),
        }
    }

    /// Seeds a generator from the wall clock and process id.
    #[must_use]
    pub fn from_entropy() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let seed = now.as_secs().rotate_left(32)
            ^ u64::from(now.subsec_nanos())
            ^ u64::from(std::process::id()).wrapping_mul(SPLITMIX_GAMMA);
        Self::new(seed)
    }
}

impl JitterSource for SeededJitter {
    fn next_u64(&self) -> u64 {
        let mut z = self
            .state
            .fetch_add(SPLITMIX_GAMMA, Ordering::Relaxed)
            .wrapping_add(SPLITMIX_GAMMA);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

/// Jitter source that always yields zero, leaving delays untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoJitter;

impl JitterSource for NoJitter {
    fn next_u64(&self) -> u64 {
        0
    }
}

/// Exponential backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    multiplier: u32,
    cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MULTIPLIER, DEFAULT_MAX_DELAY)
    }
}

impl BackoffPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(base: Duration, multiplier: u32, cap: Duration) -> Self {
        Self {
            base,
            multiplier,
            cap,
        }
    }

    /// A policy that never waits; useful for tests against local servers.
    #[must_use]
    pub const fn immediate() -> Self {
        Self::new(Duration::ZERO, DEFAULT_MULTIPLIER, Duration::ZERO)
    }

    /// Delay before the first retry.
    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Upper bound for every delay.
    #[must_use]
    pub const fn cap(&self) -> Duration {
        self.cap
    }

    /// Returns `base * multiplier^attempt` clamped to the cap.
    ///
    /// `attempt` is zero for the wait after the first failure. Overflow
    /// saturates at the cap.
    #[must_use]
    pub fn delay_without_jitter(&self, attempt: u32) -> Duration {
        if self.base.is_zero() {
            return Duration::ZERO;
        }
        self.multiplier
            .checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Returns the jittered delay for `attempt`.
    ///
    /// An offset drawn from `[0, delay/2)` is added or subtracted with equal
    /// probability and the result is clamped into `[0, cap]`.
    #[must_use]
    pub fn next(&self, attempt: u32, jitter: &dyn JitterSource) -> Duration {
        let delay = self.delay_without_jitter(attempt);
        let Some(offset) = jitter_offset(delay, jitter) else {
            return delay;
        };
        let jittered = if jitter.next_u64() & 1 == 0 {
            delay.saturating_add(offset)
        } else {
            delay.saturating_sub(offset)
        };
        jittered.min(self.cap)
    }
}

/// Adds an offset drawn from `[0, delay/2)` to a server-provided delay.
#[must_use]
pub fn additive_jitter(delay: Duration, jitter: &dyn JitterSource) -> Duration {
    jitter_offset(delay, jitter).map_or(delay, |offset| delay.saturating_add(offset))
}

fn jitter_offset(delay: Duration, jitter: &dyn JitterSource) -> Option<Duration> {
    let half = u64::try_from(delay.as_nanos() >> 1).unwrap_or(u64::MAX);
    jitter
        .next_u64()
        .checked_rem(half)
        .map(Duration::from_nanos)
}
