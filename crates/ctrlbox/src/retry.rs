// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Retry timing policies for connection attempts.
//!
//! A strategy answers one question: how long until the next attempt is
//! allowed? [`Duration::ZERO`] means "now", and a strategy that says "now"
//! records `now` as the time of the last attempt.
//!
//! Strategies are not thread-safe on their own. Each maintained connection
//! owns its strategy exclusively.

use std::time::{Duration, Instant};

/// Policy deciding when the next connection attempt is permitted.
pub trait RetryStrategy: Send {
    /// Delay until the next attempt. `Duration::ZERO` permits an attempt now
    /// and restarts the policy's clock at `now`.
    fn evaluate(&mut self, now: Instant) -> Duration;

    /// Called after a successful connect.
    fn reset(&mut self) {}
}

/// Fixed minimum spacing between attempts.
#[derive(Debug, Clone)]
pub struct PeriodRetryStrategy {
    period: Duration,
    last_attempt: Option<Instant>,
}

impl PeriodRetryStrategy {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_attempt: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl RetryStrategy for PeriodRetryStrategy {
    fn evaluate(&mut self, now: Instant) -> Duration {
        let delay = remaining(self.last_attempt, self.period, now);
        if delay.is_zero() {
            self.last_attempt = Some(now);
        }
        delay
    }
}

/// Period that grows by `multiplier` after every permitted attempt, up to
/// `max`, and drops back to `initial` once a connection succeeds.
///
/// Multipliers below 1 (or NaN) are treated as 1. A growth step that
/// overflows, including an infinite multiplier, lands on `max`.
#[derive(Debug, Clone)]
pub struct BackoffRetryStrategy {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
    last_attempt: Option<Instant>,
}

impl BackoffRetryStrategy {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            // f64::max drops NaN
            multiplier: multiplier.max(1.0),
            current: initial,
            last_attempt: None,
        }
    }

    /// Period that applies to the next attempt.
    pub fn current_period(&self) -> Duration {
        self.current
    }

    fn next_period(&self) -> Duration {
        Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |d| d.min(self.max))
    }
}

impl RetryStrategy for BackoffRetryStrategy {
    fn evaluate(&mut self, now: Instant) -> Duration {
        let delay = remaining(self.last_attempt, self.current, now);
        if delay.is_zero() {
            // The first attempt runs at the initial period; later ones grow.
            if self.last_attempt.is_some() {
                self.current = self.next_period();
            }
            self.last_attempt = Some(now);
        }
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

fn remaining(last_attempt: Option<Instant>, period: Duration, now: Instant) -> Duration {
    match last_attempt {
        None => Duration::ZERO,
        Some(last) => period.saturating_sub(now.saturating_duration_since(last)),
    }
}
