//! Retry - Bounded retry executor for vendor API calls
//!
//! Each call site wraps one vendor API attempt in a closure that reports
//! either success, a retryable error or a fatal error. [`retry`] re-runs the
//! closure with a doubling backoff until it succeeds, fails fatally, or the
//! policy's deadline passes.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use log::{debug, error, warn};
use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::context::{DEFAULT_MAX_BACKOFF, DEFAULT_MIN_BACKOFF, LogId};

/// Outcome of a single failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError<E> {
    /// Transient failure, the attempt may be repeated
    Retryable(E),
    /// Permanent failure, abort immediately
    Fatal(E),
}

impl<E> AttemptError<E> {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttemptError::Retryable(_))
    }

    pub fn into_inner(self) -> E {
        match self {
            AttemptError::Retryable(e) | AttemptError::Fatal(e) => e,
        }
    }

    pub fn map<F, O>(self, f: F) -> AttemptError<O>
    where
        F: FnOnce(E) -> O,
    {
        match self {
            AttemptError::Retryable(e) => AttemptError::Retryable(f(e)),
            AttemptError::Fatal(e) => AttemptError::Fatal(f(e)),
        }
    }
}

/// Errors that expose a vendor error code
pub trait ErrorCode {
    /// Vendor error code (e.g., "ThrottlingException", "ResourceInUse.Busy")
    fn code(&self) -> Option<&str>;

    /// Whether the error happened below the API layer (connection reset, timeout)
    fn is_transient(&self) -> bool {
        false
    }
}

/// Classify an error as retryable or fatal
///
/// An error is retryable when it is transient, or when its code matches an
/// entry of `retryable` or `extra`. Dotted codes also match on their first
/// segment, so `ResourceInUse` covers `ResourceInUse.Instance`.
pub fn classify<E: ErrorCode>(err: E, retryable: &[&str], extra: &[&str]) -> AttemptError<E> {
    if err.is_transient() {
        return AttemptError::Retryable(err);
    }
    let matched = err
        .code()
        .is_some_and(|code| matches_code(code, retryable) || matches_code(code, extra));
    if matched {
        AttemptError::Retryable(err)
    } else {
        AttemptError::Fatal(err)
    }
}

fn matches_code(code: &str, expected: &[&str]) -> bool {
    if expected.contains(&code) {
        return true;
    }
    match code.split_once('.') {
        Some((short, _)) => expected.contains(&short),
        None => false,
    }
}

/// Deadline and backoff bounds for one retried call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total budget across all attempts
    pub timeout: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            min_backoff: DEFAULT_MIN_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, min: Duration, max: Duration) -> Self {
        self.min_backoff = min.max(Duration::from_millis(1));
        self.max_backoff = max.max(self.min_backoff);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Final failure of a retried call
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The call failed with an error that is not worth repeating
    #[error("{0}")]
    Fatal(#[source] E),

    /// The deadline passed while the call kept failing with retryable errors
    #[error("{action} timed out after {attempts} attempt(s) in {elapsed:?}: {last}")]
    Timeout {
        action: String,
        attempts: u32,
        elapsed: Duration,
        /// The last retryable error observed
        #[source]
        last: E,
    },
}

impl<E> RetryError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RetryError::Timeout { .. })
    }

    pub fn into_inner(self) -> E {
        match self {
            RetryError::Fatal(e) => e,
            RetryError::Timeout { last, .. } => last,
        }
    }
}

/// Run `op` until it succeeds, fails fatally, or `policy.timeout` elapses
///
/// A fatal error on any attempt returns at once without sleeping. The
/// deadline only bounds the time spent repeating retryable failures.
pub async fn retry<T, E, F, Fut>(
    log_id: &LogId,
    policy: &RetryPolicy,
    action: &str,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError<E>>>,
    E: fmt::Display,
{
    let start = Instant::now();
    let deadline = start + policy.timeout;
    let mut backoff = policy.min_backoff;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match op().await {
            Ok(value) => {
                debug!("[{}] api[{}] success on attempt {}", log_id, action, attempts);
                return Ok(value);
            }
            Err(AttemptError::Fatal(e)) => {
                error!("[{}] api[{}] failed, reason: {}", log_id, action, e);
                return Err(RetryError::Fatal(e));
            }
            Err(AttemptError::Retryable(e)) => {
                let now = Instant::now();
                if now >= deadline {
                    error!(
                        "[{}] api[{}] gave up after {} attempt(s), last error: {}",
                        log_id, action, attempts, e
                    );
                    return Err(RetryError::Timeout {
                        action: action.to_string(),
                        attempts,
                        elapsed: now - start,
                        last: e,
                    });
                }
                let pause = backoff.min(deadline - now);
                warn!(
                    "[{}] api[{}] attempt {} failed, retrying in {:?}: {}",
                    log_id, action, attempts, pause, e
                );
                sleep(pause).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, Clone, PartialEq, thiserror::Error)]
    #[error("{code}: {message}")]
    struct FakeError {
        code: String,
        message: String,
        transient: bool,
    }

    impl FakeError {
        fn new(code: &str, message: impl Into<String>) -> Self {
            Self {
                code: code.to_string(),
                message: message.into(),
                transient: false,
            }
        }
    }

    impl ErrorCode for FakeError {
        fn code(&self) -> Option<&str> {
            if self.code.is_empty() {
                None
            } else {
                Some(&self.code)
            }
        }

        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    const CODES: &[&str] = &["RequestLimitExceeded", "ResourceInUse"];

    #[test]
    fn classify_matches_exact_and_short_codes() {
        let err = FakeError::new("RequestLimitExceeded", "slow down");
        assert!(classify(err, CODES, &[]).is_retryable());

        let err = FakeError::new("ResourceInUse.Instance", "busy");
        assert!(classify(err, CODES, &[]).is_retryable());

        let err = FakeError::new("InvalidParameter", "bad cidr");
        assert!(!classify(err, CODES, &[]).is_retryable());
    }

    #[test]
    fn classify_uses_extra_codes() {
        let err = FakeError::new("OperationDenied.Locked", "locked");
        assert!(!classify(err.clone(), CODES, &[]).is_retryable());
        assert!(classify(err, CODES, &["OperationDenied"]).is_retryable());
    }

    #[test]
    fn classify_transient_without_code() {
        let mut err = FakeError::new("", "connection reset");
        assert!(!classify(err.clone(), CODES, &[]).is_retryable());
        err.transient = true;
        assert!(classify(err, CODES, &[]).is_retryable());
    }

    fn policy(timeout_secs: u64) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(timeout_secs))
            .with_backoff(Duration::from_millis(500), Duration::from_secs(10))
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_first_attempt_returns_immediately() {
        let attempts = Cell::new(0);
        let start = Instant::now();

        let result: Result<(), _> = retry(&LogId::from("t"), &policy(60), "CreateVpc", || {
            attempts.set(attempts.get() + 1);
            async { Err(AttemptError::Fatal(FakeError::new("InvalidParameter", "bad"))) }
        })
        .await;

        assert_eq!(attempts.get(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        match result {
            Err(RetryError::Fatal(e)) => assert_eq!(e.code, "InvalidParameter"),
            other => panic!("expected fatal error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_errors_stop_at_deadline_with_last_error() {
        let attempts = Cell::new(0);
        let start = Instant::now();

        let result: Result<(), _> = retry(&LogId::from("t"), &policy(5), "DescribeVpc", || {
            attempts.set(attempts.get() + 1);
            let n = attempts.get();
            async move {
                Err(AttemptError::Retryable(FakeError::new(
                    "RequestLimitExceeded",
                    format!("attempt {}", n),
                )))
            }
        })
        .await;

        // 0s, 0.5s, 1.5s, 3.5s, then capped at the 5s deadline
        assert_eq!(attempts.get(), 5);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        match result {
            Err(RetryError::Timeout { attempts, last, .. }) => {
                assert_eq!(attempts, 5);
                assert_eq!(last.message, "attempt 5");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let attempts = Cell::new(0);
        let start = Instant::now();

        let result = retry(&LogId::from("t"), &policy(60), "CreateVpc", || {
            attempts.set(attempts.get() + 1);
            let n = attempts.get();
            async move {
                if n < 3 {
                    Err(AttemptError::Retryable(FakeError::new("ResourceInUse", "busy")))
                } else {
                    Ok("vpc-123")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "vpc-123");
        assert_eq!(attempts.get(), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_after_retries_is_not_reported_as_timeout() {
        let attempts = Cell::new(0);

        let result: Result<(), _> = retry(&LogId::from("t"), &policy(60), "DeleteVpc", || {
            attempts.set(attempts.get() + 1);
            let n = attempts.get();
            async move {
                if n == 1 {
                    Err(AttemptError::Retryable(FakeError::new("ResourceInUse", "busy")))
                } else {
                    Err(AttemptError::Fatal(FakeError::new("NotFound", "gone")))
                }
            }
        })
        .await;

        assert_eq!(attempts.get(), 2);
        let err = result.unwrap_err();
        assert!(!err.is_timeout());
        assert_eq!(err.into_inner().code, "NotFound");
    }

    #[test]
    fn backoff_bounds_are_clamped() {
        let policy = RetryPolicy::new(Duration::from_secs(1))
            .with_backoff(Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.min_backoff, Duration::from_millis(1));
        assert_eq!(policy.max_backoff, Duration::from_millis(1));
    }
}
