//! Retry pacing after repeated failures.

use std::time::{Duration, Instant};

/// Wait used when a strategy's interval does not fit the clock.
const FALLBACK_MAX_WAIT: Duration = Duration::from_secs(1800);

/// How the wait grows with consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    Exponential,
    /// Called with the failure count, the base interval and the cap.
    Custom(fn(u32, Duration, Duration) -> Duration),
}

impl BackoffStrategy {
    pub fn interval(&self, failures: u32, base: Duration, max: Duration) -> Duration {
        match self {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base.saturating_mul(failures).min(max),
            BackoffStrategy::Exponential => {
                let exponent = failures.saturating_sub(1).min(31);
                base.saturating_mul(1 << exponent).min(max)
            }
            BackoffStrategy::Custom(f) => f(failures, base, max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub base_interval: Duration,
    pub max_interval: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(1800),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

/// Tracks consecutive failures of one operation and when it may run again.
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
    failures: u32,
    next_retry: Option<Instant>,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: 0,
            next_retry: None,
        }
    }

    pub fn should_retry(&self, now: Instant) -> bool {
        self.next_retry.is_none_or(|at| now >= at)
    }

    /// Returns the wait before the next attempt.
    pub fn record_failure(&mut self, now: Instant) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let wait = self.config.strategy.interval(
            self.failures,
            self.config.base_interval,
            self.config.max_interval,
        );
        let wait = match now.checked_add(wait) {
            Some(at) => {
                self.next_retry = Some(at);
                wait
            }
            None => {
                let capped = self.config.max_interval.min(FALLBACK_MAX_WAIT);
                self.next_retry = Some(now.checked_add(capped).unwrap_or(now));
                capped
            }
        };
        log::info!(
            "operation failed {} time(s), next retry in {:?}",
            self.failures,
            wait
        );
        wait
    }

    pub fn reset(&mut self) {
        if self.failures > 0 {
            log::info!("failure state reset after {} failure(s)", self.failures);
        }
        self.failures = 0;
        self.next_retry = None;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}
