//! Shared backoff math for both upstream service reconnection (component B)
//! and downstream endpoint reconnection (component E).
//!
//! The endpoint manager adds jitter on top of the service reconnector's plain
//! exponential curve, since many endpoints reconnecting in lockstep after a
//! shared network blip would otherwise thunder against the same broker.

use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{RelayError, RelayResult};

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// delay = min(base_delay * 2^(attempt-1), max_delay)
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 2u64.saturating_pow(exponent);
        let delay = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay.as_millis() as u64))
    }

    /// Same as `calculate_backoff` but with up to ±10% jitter, used by the
    /// endpoint manager so sibling endpoints don't retry in lockstep.
    pub fn calculate_backoff_jittered(&self, attempt: u32, jitter_unit: f64) -> Duration {
        let base = self.calculate_backoff(attempt);
        if base.is_zero() {
            return base;
        }
        let jitter = (jitter_unit.clamp(0.0, 1.0) - 0.5) * 0.2; // +/-10%
        let scaled = (base.as_millis() as f64) * (1.0 + jitter);
        Duration::from_millis(scaled.max(0.0) as u64)
    }

    pub async fn reconnect<F, Fut, T>(&self, label: &str, mut connect_fn: F) -> RelayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = RelayResult<T>>,
    {
        for attempt in 1..=self.max_retries {
            match connect_fn().await {
                Ok(val) => {
                    info!(label, attempt, "reconnected");
                    return Ok(val);
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        error!(label, attempt, error = %e, "giving up on reconnect");
                        return Err(e);
                    }
                    let delay = self.calculate_backoff(attempt);
                    warn!(label, attempt, error = %e, ?delay, "reconnect attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
        Err(RelayError::ConnectionFailed(format!(
            "max retries reached for {label}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_matches_reference_sequence() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(500));
        assert_eq!(policy.calculate_backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.calculate_backoff(5), Duration::from_millis(8000));
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.calculate_backoff(20), policy.max_delay);
    }

    #[test]
    fn jittered_backoff_stays_within_ten_percent() {
        let policy = BackoffPolicy::default();
        let base = policy.calculate_backoff(3).as_millis() as f64;
        for unit in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let jittered = policy.calculate_backoff_jittered(3, unit).as_millis() as f64;
            assert!((jittered - base).abs() <= base * 0.1 + 1.0);
        }
    }

    #[test]
    fn zero_attempt_has_no_delay() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.calculate_backoff(0), Duration::ZERO);
        assert_eq!(policy.calculate_backoff_jittered(0, 0.5), Duration::ZERO);
    }
}
