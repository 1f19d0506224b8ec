//! Resilience: single-retry policy for agent calls.
//!
//! Failures are classified as transient (rate limiting / throttling) or
//! non-transient. Transient failures wait one fixed backoff and are retried
//! exactly once; everything else propagates immediately.
//!
//! ```text
//! call()
//!   ├─ Ok                          → Ok
//!   ├─ Err(non-transient)          → Err (no retry)
//!   └─ Err(transient) → sleep(backoff) → call()
//!                                    ├─ Ok  → Ok
//!                                    └─ Err → Err
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use coordination::resilience::RetryPolicy;
//!
//! let policy = RetryPolicy::new(Duration::from_secs(2));
//! let response = policy.execute("planner", || client.complete(request.clone())).await?;
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default wait before the single retry.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Substrings (lowercase) that mark an error as rate limiting / throttling.
const TRANSIENT_SIGNALS: &[&str] = &[
    "rate limit",
    "rate-limit",
    "rate_limit",
    "ratelimit",
    "429",
    "throttl",
    "too many requests",
];

/// Retry classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Expected to clear shortly, eligible for one retry.
    Transient,
    /// Propagate immediately.
    NonTransient,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::NonTransient => write!(f, "non_transient"),
        }
    }
}

/// Classify a failure from its message text.
pub fn classify_message(message: &str) -> FailureClass {
    let lower = message.to_lowercase();
    if TRANSIENT_SIGNALS.iter().any(|s| lower.contains(s)) {
        FailureClass::Transient
    } else {
        FailureClass::NonTransient
    }
}

/// Errors that can tell the retry policy how to treat them.
pub trait Retryable {
    fn failure_class(&self) -> FailureClass;

    fn is_transient(&self) -> bool {
        self.failure_class() == FailureClass::Transient
    }
}

impl Retryable for anyhow::Error {
    fn failure_class(&self) -> FailureClass {
        classify_message(&format!("{self:#}"))
    }
}

/// Fixed-backoff, retry-once policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(backoff: Duration) -> Self {
        Self { backoff }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Run `call`, retrying once after the backoff if the first failure is transient.
    ///
    /// `label` identifies the caller in logs (usually the agent role).
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_transient() {
            debug!(label, error = %err, "Non-transient failure, not retrying");
            return Err(err);
        }

        warn!(
            label,
            backoff_ms = self.backoff.as_millis() as u64,
            error = %err,
            "Transient failure, retrying once after backoff"
        );
        tokio::time::sleep(self.backoff).await;

        call().await.inspect_err(|retry_err| {
            warn!(label, error = %retry_err, "Retry failed, propagating");
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BACKOFF)
    }
}
