//! Retry backoff and retention-eligibility math, kept pure and separate
//! from the repository so it can be unit-tested without a database.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

/// Exponential backoff with a 2^attempt second base, capped at 15 minutes,
/// so a flaky downstream dependency doesn't get hammered on every retry.
pub fn backoff_delay(attempt: u32) -> ChronoDuration {
    let capped_attempt = attempt.min(10);
    let seconds = 2i64.saturating_pow(capped_attempt).min(900);
    ChronoDuration::seconds(seconds)
}

pub fn next_run_at(now: DateTime<Utc>, attempt: u32) -> DateTime<Utc> {
    now + backoff_delay(attempt)
}

pub fn should_retry(attempts: u32, max_attempts: u32) -> bool {
    attempts < max_attempts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        assert_eq!(backoff_delay(0), ChronoDuration::seconds(1));
        assert_eq!(backoff_delay(1), ChronoDuration::seconds(2));
        assert_eq!(backoff_delay(4), ChronoDuration::seconds(16));
        assert_eq!(backoff_delay(20), ChronoDuration::seconds(900));
    }

    #[test]
    fn retry_respects_max_attempts() {
        assert!(should_retry(0, 3));
        assert!(should_retry(2, 3));
        assert!(!should_retry(3, 3));
    }
}
