// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;

/// How many times a failed request is re-sent and how long to wait between
/// attempts. Timeouts are never retried regardless of policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay added or removed at random.
    pub jitter: f64,
    pub retryable: fn(StatusCode) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: 0.1,
            retryable: |status| status.is_server_error(),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, used for uploads.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn should_retry_status(&self, status: StatusCode, attempt: u32) -> bool {
        attempt < self.max_retries && (self.retryable)(status)
    }

    pub fn should_retry_transport(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay before retry number `attempt + 1`. `unit` in `[-1, 1]` scales
    /// the jitter band; the result never exceeds `max_delay`.
    pub fn delay_for(&self, attempt: u32, unit: f64) -> Duration {
        let exponential = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(31) as i32);
        let jittered = exponential * (1.0 + self.jitter * unit.clamp(-1.0, 1.0));
        let capped = jittered.clamp(0.0, self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        let unit = rand::thread_rng().gen_range(-1.0..=1.0);
        self.delay_for(attempt, unit)
    }
}
