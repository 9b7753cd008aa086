// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Backoff state for the transmitter and `Retry-After` parsing.
//!
//! The transmitter owns one [`BackoffState`] and feeds every send outcome into
//! it: successes snap the interval back to the configured minimum, failures
//! widen it exponentially up to a ceiling, and throttling responses
//! additionally pin a deadline before which no send attempt may happen at all.
//! Ticks that found nothing to send leave the state untouched.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Ceiling for the widened interval.
pub const MAX_BACKOFF_INTERVAL: Duration = Duration::from_secs(600);

const BACKOFF_GROWTH_FACTOR: u32 = 2;

/// A parsed `Retry-After` header, either delta-seconds or an HTTP-date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAfter {
    Delay(Duration),
    At(DateTime<Utc>),
}

impl RetryAfter {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(seconds) = value.parse::<u64>() {
            return Some(RetryAfter::Delay(Duration::from_secs(seconds)));
        }
        DateTime::parse_from_rfc2822(value)
            .ok()
            .map(|at| RetryAfter::At(at.with_timezone(&Utc)))
    }

    /// The absolute instant the hint resolves to, given `now`.
    pub fn deadline(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            RetryAfter::Delay(delay) => {
                now + chrono::Duration::from_std(*delay)
                    .unwrap_or_else(|_| chrono::Duration::zero())
            }
            RetryAfter::At(at) => *at,
        }
    }
}

/// Scheduler-owned adaptive interval state.
///
/// Invariant: `min <= current <= max` at all times; once `throttled_until` is
/// set, [`can_send`](Self::can_send) stays false until that instant passes.
#[derive(Debug)]
pub struct BackoffState {
    current: Duration,
    min: Duration,
    max: Duration,
    throttled_until: Option<DateTime<Utc>>,
    last_tick_sent: bool,
}

impl BackoffState {
    pub fn new(sending_interval: Duration) -> Self {
        let min = sending_interval.max(Duration::from_millis(1));
        BackoffState {
            current: min,
            min,
            max: MAX_BACKOFF_INTERVAL.max(min),
            throttled_until: None,
            last_tick_sent: false,
        }
    }

    pub fn current_interval(&self) -> Duration {
        self.current
    }

    pub fn throttled_until(&self) -> Option<DateTime<Utc>> {
        self.throttled_until
    }

    /// Whether the last tick actually shipped data (as opposed to finding the
    /// buffer empty).
    pub fn last_tick_sent(&self) -> bool {
        self.last_tick_sent
    }

    /// False while a throttle deadline is pending.
    pub fn can_send(&self, now: DateTime<Utc>) -> bool {
        self.throttled_until.map_or(true, |until| now >= until)
    }

    /// The batch was accepted: snap back to the configured interval.
    pub fn record_success(&mut self) {
        self.current = self.min;
        self.throttled_until = None;
        self.last_tick_sent = true;
    }

    /// Transport or protocol failure: widen the interval.
    pub fn record_failure(&mut self) {
        self.current = self.widened();
        self.last_tick_sent = true;
    }

    /// The collector asked us to slow down: widen and pin a deadline. With no
    /// usable hint the widened interval doubles as the deadline.
    pub fn record_throttle(&mut self, hint: Option<&RetryAfter>, now: DateTime<Utc>) {
        self.current = self.widened();
        let until = match hint {
            Some(hint) => hint.deadline(now),
            None => RetryAfter::Delay(self.current).deadline(now),
        };
        self.throttled_until = Some(until);
        self.last_tick_sent = true;
    }

    /// Nothing to send this tick: no adaptation.
    pub fn record_empty(&mut self) {
        self.last_tick_sent = false;
    }

    fn widened(&self) -> Duration {
        self.current
            .saturating_mul(BACKOFF_GROWTH_FACTOR)
            .clamp(self.min, self.max)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_retry_after_parses_delta_seconds() {
        assert_eq!(
            RetryAfter::parse("120"),
            Some(RetryAfter::Delay(Duration::from_secs(120)))
        );
        assert_eq!(
            RetryAfter::parse(" 30 "),
            Some(RetryAfter::Delay(Duration::from_secs(30)))
        );
    }

    #[test]
    fn test_retry_after_parses_http_date() {
        let parsed = RetryAfter::parse("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        let expected = Utc.with_ymd_and_hms(2015, 10, 21, 7, 28, 0).unwrap();
        assert_eq!(parsed, RetryAfter::At(expected));
    }

    #[test]
    fn test_retry_after_rejects_garbage() {
        assert_eq!(RetryAfter::parse("soon"), None);
        assert_eq!(RetryAfter::parse(""), None);
    }

    #[test]
    fn test_deadline_resolution() {
        let now = at_epoch();
        let delta = RetryAfter::Delay(Duration::from_secs(60));
        assert_eq!(delta.deadline(now), now + chrono::Duration::seconds(60));

        let absolute = RetryAfter::At(now + chrono::Duration::seconds(90));
        assert_eq!(absolute.deadline(now), now + chrono::Duration::seconds(90));
    }

    #[test]
    fn test_failure_widens_exponentially_with_ceiling() {
        let mut backoff = BackoffState::new(Duration::from_secs(5));
        assert_eq!(backoff.current_interval(), Duration::from_secs(5));

        let mut previous = backoff.current_interval();
        for _ in 0..16 {
            backoff.record_failure();
            let current = backoff.current_interval();
            assert!(current >= previous);
            assert!(current <= MAX_BACKOFF_INTERVAL);
            previous = current;
        }
        assert_eq!(backoff.current_interval(), MAX_BACKOFF_INTERVAL);
    }

    #[test]
    fn test_success_resets_to_minimum() {
        let mut backoff = BackoffState::new(Duration::from_secs(5));
        backoff.record_failure();
        backoff.record_failure();
        assert_eq!(backoff.current_interval(), Duration::from_secs(20));

        backoff.record_success();
        assert_eq!(backoff.current_interval(), Duration::from_secs(5));
        assert!(backoff.throttled_until().is_none());
    }

    #[test]
    fn test_throttle_pins_deadline() {
        let now = at_epoch();
        let mut backoff = BackoffState::new(Duration::from_secs(5));
        let hint = RetryAfter::Delay(Duration::from_secs(120));

        backoff.record_throttle(Some(&hint), now);
        assert!(!backoff.can_send(now));
        assert!(!backoff.can_send(now + chrono::Duration::seconds(119)));
        assert!(backoff.can_send(now + chrono::Duration::seconds(120)));

        // Success clears the deadline.
        backoff.record_success();
        assert!(backoff.can_send(now));
    }

    #[test]
    fn test_throttle_without_hint_uses_widened_interval() {
        let now = at_epoch();
        let mut backoff = BackoffState::new(Duration::from_secs(5));
        backoff.record_throttle(None, now);

        assert_eq!(backoff.current_interval(), Duration::from_secs(10));
        assert_eq!(
            backoff.throttled_until().unwrap(),
            now + chrono::Duration::seconds(10)
        );
    }

    #[test]
    fn test_empty_tick_leaves_interval_untouched() {
        let mut backoff = BackoffState::new(Duration::from_secs(5));
        backoff.record_failure();
        let widened = backoff.current_interval();

        backoff.record_empty();
        assert_eq!(backoff.current_interval(), widened);
        assert!(!backoff.last_tick_sent());

        backoff.record_success();
        assert!(backoff.last_tick_sent());
    }
}
