/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Token-bucket admission control.

use std::time::Instant;

use crate::config::RateLimiterConfig;

/// A lazily-refilling token bucket.
pub struct RateLimiter {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Builds a limiter from its configuration, starting with a full bucket.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        let max_tokens = f64::from(config.max_requests);
        let refill_rate = max_tokens / f64::from(config.window_seconds.max(1));
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        self.last_refill = now;
    }

    /// Attempts to admit one request, refilling the bucket first. Returns
    /// `true` if admitted (and consumes one token), `false` if denied.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn admits_up_to_capacity_then_denies() {
        let mut limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 2,
            window_seconds: 10,
        });
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
    }

    #[test]
    fn refills_over_time() {
        let mut limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 1,
            window_seconds: 1,
        });
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        // Simulate elapsed time by rewinding last_refill instead of sleeping,
        // so the test stays fast and deterministic.
        limiter.last_refill = Instant::now() - Duration::from_secs(2);
        assert!(limiter.try_acquire());
    }

    #[test]
    fn never_exceeds_max_tokens() {
        let mut limiter = RateLimiter::new(RateLimiterConfig {
            max_requests: 3,
            window_seconds: 1,
        });
        limiter.last_refill = Instant::now() - Duration::from_secs(100);
        limiter.refill();
        assert!((limiter.tokens - 3.0).abs() < f64::EPSILON);
    }
}
