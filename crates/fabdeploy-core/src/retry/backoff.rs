//! Exponential backoff with jitter and retryable-failure classification.
//!
//! Classification is structural first (connection failures, timeouts, and a
//! fixed set of HTTP status codes) and falls back to matching well-known
//! transient phrases in the error message. 401 is retryable so an expired
//! bearer token can be replaced transparently on the next attempt.

use std::time::Duration;

use rand::Rng;

use crate::http::ClientError;

/// Status codes that are always worth another attempt.
pub const RETRYABLE_STATUS_CODES: [u16; 5] = [401, 429, 502, 503, 504];

const TRANSIENT_PHRASES: [&str; 12] = [
    "rate limit",
    "429",
    "503",
    "service unavailable",
    "temporarily unavailable",
    "connection reset",
    "connection refused",
    "timeout",
    "timed out",
    "throttl",
    "too many requests",
    "server busy",
];

/// Retry timing for a [`ResilientClient`](crate::http::ResilientClient).
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry (attempt 0).
    pub base: Duration,
    /// Upper bound on the un-jittered delay.
    pub max: Duration,
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Symmetric jitter as a fraction of the computed delay.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_retries: 3,
            jitter: 0.25,
        }
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration, max_retries: u32) -> Self {
        Self {
            base,
            max,
            max_retries,
            ..Self::default()
        }
    }

    /// Policy that never waits; useful when the caller supplies its own pacing.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            max_retries,
            jitter: 0.0,
        }
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    pub fn is_retryable(&self, err: &ClientError) -> bool {
        is_retryable(err)
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        jittered(backoff_center(attempt, self.base, self.max), self.jitter)
    }
}

/// Whether a failure is transient and worth retrying.
pub fn is_retryable(err: &ClientError) -> bool {
    match err {
        ClientError::Connect(_) | ClientError::Timeout(_) => true,
        ClientError::Status { status, .. } if RETRYABLE_STATUS_CODES.contains(status) => true,
        other => is_retryable_message(&other.to_string()),
    }
}

/// Case-insensitive match against the fixed list of transient-failure phrases.
pub fn is_retryable_message(message: &str) -> bool {
    if message.trim().is_empty() {
        return false;
    }
    let lowered = message.to_lowercase();
    TRANSIENT_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

/// `min(base * 2^attempt, max)` without jitter.
pub fn backoff_center(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

/// `min(base * 2^attempt, max)` with ±25% jitter, floored at zero.
pub fn delay_for(attempt: u32, base: Duration, max: Duration) -> Duration {
    jittered(backoff_center(attempt, base, max), 0.25)
}

fn jittered(center: Duration, jitter: f64) -> Duration {
    let center_secs = center.as_secs_f64();
    let spread = center_secs * jitter;
    if spread <= 0.0 {
        return center;
    }
    let offset = rand::rng().random_range(-spread..=spread);
    Duration::from_secs_f64((center_secs + offset).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ClientError {
        ClientError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn retryable_status_codes() {
        for code in [401, 429, 502, 503, 504] {
            assert!(is_retryable(&status(code)), "{code} should be retryable");
        }
        for code in [400, 403, 404, 409, 500] {
            assert!(!is_retryable(&status(code)), "{code} should not be retryable");
        }
    }

    #[test]
    fn connection_failures_are_retryable() {
        assert!(is_retryable(&ClientError::Connect("dns".into())));
        assert!(is_retryable(&ClientError::Timeout("read".into())));
    }

    #[test]
    fn transient_phrases_match_case_insensitively() {
        for message in [
            "Rate limit exceeded",
            "HTTP 429 returned",
            "Service Unavailable",
            "The service is TEMPORARILY UNAVAILABLE",
            "Connection reset by peer",
            "connection refused",
            "operation timed out",
            "Gateway Timeout",
            "Request was throttled",
            "Too Many Requests",
            "Server busy, try later",
        ] {
            assert!(is_retryable_message(message), "{message}");
        }
    }

    #[test]
    fn permanent_messages_are_not_retryable() {
        assert!(!is_retryable_message("Permission denied"));
        assert!(!is_retryable_message("Resource not found"));
        assert!(!is_retryable_message(""));
        assert!(!is_retryable_message("   "));
    }

    #[test]
    fn status_body_falls_back_to_phrase_match() {
        let err = ClientError::Status {
            status: 500,
            body: "server busy".into(),
        };
        assert!(is_retryable(&err));
        assert!(!is_retryable(&ClientError::Other("Permission denied".into())));
    }

    #[test]
    fn delay_stays_within_jitter_bounds() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(5);
        for attempt in 0..12 {
            let center = backoff_center(attempt, base, max);
            for _ in 0..50 {
                let delay = delay_for(attempt, base, max);
                assert!(delay <= center.mul_f64(1.25) + Duration::from_nanos(1));
                assert!(delay >= center.mul_f64(0.75).saturating_sub(Duration::from_nanos(1)));
            }
        }
    }

    #[test]
    fn center_grows_until_capped() {
        let base = Duration::from_millis(250);
        let max = Duration::from_secs(4);
        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let center = backoff_center(attempt, base, max);
            assert!(center >= previous);
            assert!(center <= max);
            previous = center;
        }
        assert_eq!(backoff_center(0, base, max), base);
        assert_eq!(backoff_center(2, base, max), Duration::from_secs(1));
        assert_eq!(backoff_center(31, base, max), max);
        assert_eq!(backoff_center(u32::MAX, base, max), max);
    }

    #[test]
    fn immediate_policy_never_waits() {
        let policy = BackoffPolicy::immediate(5);
        assert_eq!(policy.delay(0), Duration::ZERO);
        assert_eq!(policy.delay(10), Duration::ZERO);
    }
}
