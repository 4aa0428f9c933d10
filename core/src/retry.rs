/*
 * retry.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Burl, an HTTP(S) command-line transfer agent.
 *
 * Burl is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Burl is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Burl.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Retry driver state: transient-failure classification, backoff schedule,
//! attempt budget. A small struct threaded through the executor's attempt
//! loop; the actual sleeping happens at the call site.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::RetryConfig;
use crate::error::Error;

/// HTTP statuses worth retrying.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(600);

/// Per-transfer retry state. Created when the driver starts so the wallclock
/// deadline covers all attempts.
pub struct RetryState {
    remaining: u32,
    deadline: Option<Instant>,
    fixed_delay: Option<Duration>,
    /// Next exponential interval; grown lazily so a first-try accept pays
    /// nothing.
    backoff: Option<Duration>,
    all_errors: bool,
    connrefused: bool,
}

impl RetryState {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            remaining: config.retries,
            deadline: config.max_time.map(|t| Instant::now() + t),
            fixed_delay: config.delay,
            backoff: None,
            all_errors: config.all_errors,
            connrefused: config.connrefused,
        }
    }

    pub fn attempts_left(&self) -> u32 {
        self.remaining
    }

    fn retryable(&self, outcome: &Result<u16, Error>) -> bool {
        match outcome {
            Ok(status) => is_transient_status(*status),
            Err(e) => {
                self.all_errors || e.is_cancel() || (self.connrefused && e.is_connection_refused())
            }
        }
    }

    /// Consider one attempt's outcome. Returns the delay to sleep before the
    /// next attempt, or None when the driver must stop and surface the
    /// outcome.
    pub fn consider(&mut self, outcome: &Result<u16, Error>) -> Option<Duration> {
        if self.remaining == 0 || !self.retryable(outcome) {
            return None;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return None;
            }
        }
        self.remaining -= 1;
        Some(self.next_delay())
    }

    fn next_delay(&mut self) -> Duration {
        if let Some(delay) = self.fixed_delay {
            return delay;
        }
        let current = self.backoff.unwrap_or(BACKOFF_START);
        self.backoff = Some((current * 2).min(BACKOFF_CAP));
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(status: u16) -> Result<u16, Error> {
        Ok(status)
    }

    fn refused() -> Result<u16, Error> {
        Err(Error::Connect {
            message: "connection refused".into(),
            refused: true,
        })
    }

    #[test]
    fn transient_status_set() {
        for s in [408, 429, 500, 502, 503, 504] {
            assert!(is_transient_status(s), "{}", s);
        }
        for s in [200, 301, 400, 403, 404, 501] {
            assert!(!is_transient_status(s), "{}", s);
        }
    }

    #[test]
    fn non_transient_status_stops() {
        let mut state = RetryState::new(&RetryConfig {
            retries: 3,
            ..RetryConfig::default()
        });
        assert!(state.consider(&ok(404)).is_none());
        assert_eq!(state.attempts_left(), 3);
    }

    #[test]
    fn exponential_backoff_doubles() {
        let mut state = RetryState::new(&RetryConfig {
            retries: 4,
            all_errors: true,
            ..RetryConfig::default()
        });
        let outcome = ok(503);
        assert_eq!(state.consider(&outcome), Some(Duration::from_secs(1)));
        assert_eq!(state.consider(&outcome), Some(Duration::from_secs(2)));
        assert_eq!(state.consider(&outcome), Some(Duration::from_secs(4)));
        assert_eq!(state.consider(&outcome), Some(Duration::from_secs(8)));
        assert!(state.consider(&outcome).is_none()); // budget spent
    }

    #[test]
    fn fixed_delay_is_constant() {
        let mut state = RetryState::new(&RetryConfig {
            retries: 2,
            delay: Some(Duration::from_secs(5)),
            all_errors: true,
            ..RetryConfig::default()
        });
        assert_eq!(state.consider(&ok(500)), Some(Duration::from_secs(5)));
        assert_eq!(state.consider(&ok(500)), Some(Duration::from_secs(5)));
    }

    #[test]
    fn connrefused_gate() {
        let mut no_flag = RetryState::new(&RetryConfig {
            retries: 2,
            ..RetryConfig::default()
        });
        assert!(no_flag.consider(&refused()).is_none());

        let mut with_flag = RetryState::new(&RetryConfig {
            retries: 2,
            connrefused: true,
            ..RetryConfig::default()
        });
        assert!(with_flag.consider(&refused()).is_some());
    }

    #[test]
    fn cancel_errors_are_retryable() {
        let mut state = RetryState::new(&RetryConfig {
            retries: 1,
            ..RetryConfig::default()
        });
        let outcome: Result<u16, Error> = Err(Error::cancel("timed out"));
        assert!(state.consider(&outcome).is_some());
    }

    #[test]
    fn deadline_stops_retries() {
        let mut state = RetryState::new(&RetryConfig {
            retries: 5,
            all_errors: true,
            max_time: Some(Duration::ZERO),
            ..RetryConfig::default()
        });
        assert!(state.consider(&ok(503)).is_none());
    }

    #[test]
    fn backoff_caps_at_ten_minutes() {
        let mut state = RetryState::new(&RetryConfig {
            retries: 20,
            all_errors: true,
            ..RetryConfig::default()
        });
        let mut last = Duration::ZERO;
        for _ in 0..15 {
            last = state.consider(&ok(503)).unwrap();
        }
        assert!(last <= Duration::from_secs(600));
    }
}
