use super::{LlmError, SqlGenerator};
use crate::config::LlmConfig;
use crate::error::{Error, Result};
use std::time::Duration;

/// Bounded retries with exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the given failed attempt (1-based): `initial * 2^(n-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    pub fn call(
        &self,
        generator: &dyn SqlGenerator,
        system_prompt: &str,
        question: &str,
    ) -> Result<String> {
        let mut attempt = 1;
        loop {
            match generator.generate(system_prompt, question) {
                Ok(completion) => return Ok(completion),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    log::warn!(
                        "language model attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        err,
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(LlmError::Timeout) => return Err(Error::LlmTimeout { attempts: attempt }),
                Err(err) => return Err(Error::Llm(err)),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(2000), Duration::from_millis(10000));
        assert_eq!(policy.backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff(2), Duration::from_millis(4000));
        assert_eq!(policy.backoff(3), Duration::from_millis(8000));
        assert_eq!(policy.backoff(4), Duration::from_millis(10000));
        assert_eq!(policy.backoff(40), Duration::from_millis(10000));
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let generator = |_: &str, _: &str| -> std::result::Result<String, LlmError> {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(LlmError::Timeout)
            } else {
                Ok("SELECT 1".to_string())
            }
        };
        assert_eq!(fast(3).call(&generator, "", "q").unwrap(), "SELECT 1");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_exhausted_timeouts() {
        let calls = Cell::new(0);
        let generator = |_: &str, _: &str| -> std::result::Result<String, LlmError> {
            calls.set(calls.get() + 1);
            Err(LlmError::Timeout)
        };
        let err = fast(2).call(&generator, "", "q").unwrap_err();
        assert!(matches!(err, Error::LlmTimeout { attempts: 2 }));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_rejection_is_not_retried() {
        let calls = Cell::new(0);
        let generator = |_: &str, _: &str| -> std::result::Result<String, LlmError> {
            calls.set(calls.get() + 1);
            Err(LlmError::Rejected("HTTP 401".to_string()))
        };
        let err = fast(3).call(&generator, "", "q").unwrap_err();
        assert!(matches!(err, Error::Llm(LlmError::Rejected(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_zero_attempts_still_calls_once() {
        let policy = fast(0);
        assert_eq!(policy.max_attempts(), 1);
        let generator = |_: &str, _: &str| -> std::result::Result<String, LlmError> {
            Ok("SELECT 2".to_string())
        };
        assert_eq!(policy.call(&generator, "", "q").unwrap(), "SELECT 2");
    }
}
