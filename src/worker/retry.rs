use std::time::Duration;

use rand::Rng;

use crate::config::Config;
use crate::error::PipelineError;

/// Outcome of a failed task processing attempt, as the worker loop should
/// act on it (§4.C ack/retry policy).
pub enum RetryDecision {
    /// Sleep for this long, then return the task to the queue for redelivery.
    RetryAfter(Duration),
    /// Retries exhausted or the error is permanent: append to DLQ, ack.
    DeadLetter,
}

/// `delay_n = base * 2^(n-1)` with uniform jitter ±20% (§4.C). `attempt` is
/// 1-based (the attempt that just failed).
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.as_secs_f64() * 2f64.powi((attempt.saturating_sub(1)) as i32);
    let jitter_frac = rand::thread_rng().gen_range(-0.2..=0.2);
    let jittered = (exp * (1.0 + jitter_frac)).max(0.0);
    Duration::from_secs_f64(jittered)
}

/// Decide what to do with a failed attempt given the error kind and how many
/// attempts have been made so far.
pub fn decide(error: &PipelineError, attempt: u32, config: &Config) -> RetryDecision {
    if !error.is_retryable() {
        return RetryDecision::DeadLetter;
    }
    if attempt >= config.retry_max_attempts {
        return RetryDecision::DeadLetter;
    }
    RetryDecision::RetryAfter(backoff_delay(config.retry_base, attempt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_within_jitter_band() {
        let base = Duration::from_secs(5);
        for attempt in 1..=3u32 {
            let expected = base.as_secs_f64() * 2f64.powi((attempt - 1) as i32);
            let delay = backoff_delay(base, attempt).as_secs_f64();
            assert!(delay >= expected * 0.8 - 0.001);
            assert!(delay <= expected * 1.2 + 0.001);
        }
    }

    #[test]
    fn permanent_errors_go_straight_to_dlq() {
        let config = Config::default();
        let err = PipelineError::InvariantViolation("bad chain".into());
        assert!(matches!(decide(&err, 1, &config), RetryDecision::DeadLetter));
    }

    #[test]
    fn transient_errors_retry_until_max_attempts() {
        let config = Config::default();
        let err = PipelineError::TransientBackend("timeout".into());
        assert!(matches!(
            decide(&err, 1, &config),
            RetryDecision::RetryAfter(_)
        ));
        assert!(matches!(
            decide(&err, config.retry_max_attempts, &config),
            RetryDecision::DeadLetter
        ));
    }
}
