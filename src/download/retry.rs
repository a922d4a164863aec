use crate::artifact::ExtractionResult;
use crate::dom::Clock;
use crate::error::Result;
use std::time::Duration;

/// Results that can report failure without being an `Err`.
///
/// A value with a failure is retried exactly like an error.
pub trait Outcome {
    fn failure(&self) -> Option<String> {
        None
    }
}

impl Outcome for () {}

impl Outcome for ExtractionResult {
    fn failure(&self) -> Option<String> {
        match self {
            ExtractionResult::Failure { reason } => Some(reason.clone()),
            _ => None,
        }
    }
}

/// Exponential backoff: `base * 2^(attempt-1)`, capped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }

    /// Builder method: set the backoff base and cap
    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Pause after failed attempt `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds or the attempts are used up.
    ///
    /// The operation receives the 1-based attempt number. After the last
    /// attempt the final error, or the final failed value, is returned.
    pub fn run<T: Outcome>(
        &self,
        clock: &dyn Clock,
        what: &str,
        mut operation: impl FnMut(u32) -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 1;
        loop {
            let result = operation(attempt);
            let failure = match &result {
                Ok(value) => match value.failure() {
                    None => return result,
                    Some(reason) => reason,
                },
                Err(e) => e.to_string(),
            };

            if attempt >= self.max_attempts {
                log::warn!("{} failed after {} attempts: {}", what, attempt, failure);
                return result;
            }

            let delay = self.delay_for(attempt);
            log::warn!(
                "{} attempt {}/{} failed: {}; retrying in {}ms",
                what,
                attempt,
                self.max_attempts,
                failure,
                delay.as_millis()
            );
            clock.sleep(delay);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ManualClock;
    use crate::error::TakeoutError;

    #[test]
    fn test_delays_double_and_cap() {
        let policy = RetryPolicy::new(5);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_fails_twice_then_succeeds() {
        let clock = ManualClock::new();
        let mut calls = 0;
        let result = RetryPolicy::new(3).run(&clock, "download", |_| {
            calls += 1;
            if calls < 3 {
                Err(TakeoutError::Fetch("flaky".to_string()))
            } else {
                Ok(())
            }
        });

        assert!(result.is_ok());
        assert_eq!(calls, 3);
        let sleeps = clock.sleeps();
        assert_eq!(sleeps, vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert!(sleeps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_failure_value_is_retried() {
        let clock = ManualClock::new();
        let mut attempts = Vec::new();
        let result = RetryPolicy::new(2).run(&clock, "extract", |attempt| {
            attempts.push(attempt);
            Ok(ExtractionResult::Failure {
                reason: "viewer empty".to_string(),
            })
        });

        assert!(result.unwrap().is_failure());
        assert_eq!(attempts, vec![1, 2]);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1)]);
    }

    #[test]
    fn test_last_error_is_returned() {
        let clock = ManualClock::new();
        let err = RetryPolicy::new(2)
            .run::<()>(&clock, "download", |attempt| Err(TakeoutError::NotFound(format!("attempt {}", attempt))))
            .unwrap_err();
        assert_eq!(err.to_string(), "Not found: attempt 2");
    }
}
