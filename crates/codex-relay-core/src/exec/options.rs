//! Execution options: timeout, output cap and retry with exponential backoff.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default wall-clock limit for a single attempt (10 minutes).
pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

/// Default cap on captured stdout/stderr, per stream.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Configuration for one logical process run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Maximum wall-clock time for a single attempt (milliseconds).
    pub timeout_ms: u64,
    /// Bytes kept per output stream; anything beyond is discarded.
    pub max_output_bytes: usize,
    /// Retry policy for transient failures. `None` runs exactly once.
    pub retry: Option<RetryPolicy>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            retry: None,
        }
    }
}

impl ExecutionOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Total attempts allowed, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.retry
            .as_ref()
            .map(|policy| policy.max_attempts.max(1))
            .unwrap_or(1)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_output_bytes(mut self, max_output_bytes: usize) -> Self {
        self.max_output_bytes = max_output_bytes;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Retry budget for timeouts and launch failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Attempts in total (1 = no retries).
    pub max_attempts: u32,
    /// Base delay for exponential backoff between attempts (milliseconds).
    pub backoff_base_ms: u64,
    /// Upper bound on a single backoff delay (milliseconds).
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `failed_attempt` (1-based) before the next one.
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(20);
        let delay = self
            .backoff_base_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_options_default() {
        let opts = ExecutionOptions::default();
        assert_eq!(opts.timeout_ms, 600_000);
        assert_eq!(opts.max_output_bytes, DEFAULT_MAX_OUTPUT_BYTES);
        assert!(opts.retry.is_none());
        assert_eq!(opts.max_attempts(), 1);
    }

    #[test]
    fn test_max_attempts_never_below_one() {
        let opts = ExecutionOptions::default().with_retry(RetryPolicy {
            max_attempts: 0,
            backoff_base_ms: 10,
            max_backoff_ms: 100,
        });
        assert_eq!(opts.max_attempts(), 1);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base_ms: 100,
            max_backoff_ms: 350,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(350));
        assert_eq!(policy.delay_after(40), Duration::from_millis(350));
    }

    #[test]
    fn test_options_deserialize_with_partial_fields() {
        let json = r#"{"timeout_ms": 5000}"#;
        let opts: ExecutionOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.timeout_ms, 5000);
        assert_eq!(opts.max_output_bytes, DEFAULT_MAX_OUTPUT_BYTES);
        assert!(opts.retry.is_none());
    }
}
