//! Fixed-delay retry for provider calls.
//!
//! Provider failures are classified into a [`FailureType`]; the
//! [`RetryPolicy`] then decides whether another attempt is made and how long
//! to wait first.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use satflow::pipeline::{FailureType, RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::fixed(3, Duration::from_secs(5));
//! match policy.should_retry(FailureType::Transient, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_secs(5));
//!         assert_eq!(attempt, 2);
//!     }
//!     RetryDecision::DoNotRetry { reason } => panic!("unexpected: {reason}"),
//! }
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::provider::ProviderError;

/// Default attempts for a product-type query (including the first one).
pub const DEFAULT_QUERY_ATTEMPTS: u32 = 3;

/// Default pause between query attempts.
pub const DEFAULT_QUERY_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Default attempts for a product download (no retry).
pub const DEFAULT_DOWNLOAD_ATTEMPTS: u32 = 1;

/// Classification of provider failures for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed on another attempt (remote query/download failures,
    /// rejected sessions).
    Transient,

    /// Will fail the same way again (missing configuration, unsupported
    /// product type, product gone, local disk failure).
    Permanent,
}

/// Decision on whether to retry a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt this will be (1-indexed, so the first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why no retry is attempted.
        reason: String,
    },
}

/// Retry configuration: a bounded number of attempts separated by a fixed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Pause before every retry.
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_QUERY_ATTEMPTS, DEFAULT_QUERY_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// Creates a policy with `max_attempts` total attempts and a fixed `delay`.
    ///
    /// `max_attempts` below 1 is raised to 1.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A policy making exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        RetryDecision::Retry {
            delay: self.delay,
            attempt: attempt + 1,
        }
    }
}

/// Classifies a provider error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Configuration | Permanent |
/// | UnsupportedProductType | Permanent |
/// | NotFound | Permanent |
/// | Io | Permanent |
/// | Authentication | Transient |
/// | Query | Transient |
/// | Download | Transient |
#[must_use]
pub fn classify_error(error: &ProviderError) -> FailureType {
    match error {
        ProviderError::Configuration { .. }
        | ProviderError::UnsupportedProductType { .. }
        | ProviderError::NotFound { .. }
        | ProviderError::Io { .. } => FailureType::Permanent,

        ProviderError::Authentication { .. }
        | ProviderError::Query { .. }
        | ProviderError::Download { .. } => FailureType::Transient,
    }
}

/// Classifies a provider error raised while downloading a product.
///
/// Only remote transfer failures are retried. A rejected session is
/// permanent here, unlike for queries.
///
/// | Error | Type |
/// |-------|------|
/// | Download | Transient |
/// | anything else | Permanent |
#[must_use]
pub fn classify_download_error(error: &ProviderError) -> FailureType {
    match error {
        ProviderError::Download { .. } => FailureType::Transient,

        ProviderError::Configuration { .. }
        | ProviderError::UnsupportedProductType { .. }
        | ProviderError::Authentication { .. }
        | ProviderError::Query { .. }
        | ProviderError::NotFound { .. }
        | ProviderError::Io { .. } => FailureType::Permanent,
    }
}

/// Runs `operation` until it succeeds or `policy` stops retrying.
///
/// `operation` receives the 1-indexed attempt number; `classify` decides
/// which of its errors are worth another attempt.
///
/// # Returns
///
/// - `Ok(T)` from the first successful attempt
/// - `Err((ProviderError, u32))` with the last error and the attempts made
pub(crate) async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    classify: fn(&ProviderError) -> FailureType,
    mut operation: F,
) -> Result<T, (ProviderError, u32)>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(attempt, what, "attempting");

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.should_retry(classify(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    warn!(
                        what,
                        attempt = next_attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(what, %reason, "not retrying");
                    return Err((error, attempt));
                }
            },
        }
    }
}
