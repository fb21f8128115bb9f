//! Retry strategies for acquisition loops.

use std::time::Duration;

use rand::Rng;

/// Produces successive wait intervals between acquisition attempts.
///
/// Strategies are stateful: a fresh instance is needed for every independent
/// acquisition call.
pub trait RetryStrategy {
    /// Returns the wait before the next attempt, or `None` once retries are
    /// exhausted.
    fn next(&mut self) -> Option<Duration>;
}

impl<R: RetryStrategy + ?Sized> RetryStrategy for Box<R> {
    fn next(&mut self) -> Option<Duration> {
        (**self).next()
    }
}

/// Waits a constant interval, at most `max` times.
///
/// The counter is bumped before each decision, so an acquisition loop makes
/// the initial attempt plus up to `max` retries.
#[derive(Debug, Clone)]
pub struct FixedIntervalRetry {
    interval: Duration,
    max: u32,
    count: u32,
}

impl FixedIntervalRetry {
    pub fn new(interval: Duration, max: u32) -> Self {
        Self {
            interval,
            max,
            count: 0,
        }
    }
}

impl RetryStrategy for FixedIntervalRetry {
    fn next(&mut self) -> Option<Duration> {
        self.count = self.count.saturating_add(1);
        (self.count <= self.max).then_some(self.interval)
    }
}

/// Exponential backoff with an optional full jitter.
///
/// The n-th interval is `initial * multiplier^(n-1)`, capped at
/// `max_interval`. With jitter enabled the wait is drawn uniformly from
/// `[0, interval]`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoffRetry {
    initial: Duration,
    max_interval: Duration,
    multiplier: f64,
    max: u32,
    jitter: bool,
    count: u32,
}

impl ExponentialBackoffRetry {
    /// Doubling backoff from `initial`, capped at `max_interval`, `max` retries.
    pub fn new(initial: Duration, max_interval: Duration, max: u32) -> Self {
        Self {
            initial,
            max_interval,
            multiplier: 2.0,
            max,
            jitter: false,
            count: 0,
        }
    }

    /// Sets the growth factor (values below 1.0 are clamped to 1.0).
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Enables full jitter.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    fn base_interval(&self) -> Duration {
        let exp = self.count.saturating_sub(1) as i32;
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exp);
        let cap = self.max_interval.as_secs_f64();
        if !secs.is_finite() || secs >= cap {
            self.max_interval
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl RetryStrategy for ExponentialBackoffRetry {
    fn next(&mut self) -> Option<Duration> {
        self.count = self.count.saturating_add(1);
        if self.count > self.max {
            return None;
        }
        let interval = self.base_interval();
        if self.jitter && !interval.is_zero() {
            let secs = rand::thread_rng().gen_range(0.0..=interval.as_secs_f64());
            return Some(Duration::from_secs_f64(secs));
        }
        Some(interval)
    }
}
