//! Bounded re-invocation of a failing operation
//!
//! The retrier deliberately has no sleep or backoff between attempts:
//! pacing is the caller's job, via the timer or a wrapping predicate.

use crate::error::CallError;
use crate::op::{CallFn, ErrorPredicate, any_error};
use std::future::Future;
use std::sync::Arc;

const DEFAULT_MAX_ATTEMPTS: u32 = 1;

/// Re-invokes an operation while its error is classified retriable
///
/// Immutable after construction and cheap to clone; safe to share across
/// any number of concurrent callers.
///
/// # Example
///
/// ```ignore
/// let retrier = Retrier::new()
///     .with_max_attempts(3)
///     .with_is_retriable(|err| err.to_string() != "perm");
/// let result = retrier.run(|| async { query().await }).await;
/// ```
#[derive(Clone)]
pub struct Retrier {
    is_retriable: ErrorPredicate,
    max_attempts: u32,
}

impl Retrier {
    /// A retrier with the default single attempt and any-error policy
    pub fn new() -> Self {
        Self {
            is_retriable: any_error(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Maximum number of attempts. Zero keeps the default of one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = if max_attempts == 0 {
            DEFAULT_MAX_ATTEMPTS
        } else {
            max_attempts
        };
        self
    }

    /// Classify which errors are worth another attempt
    pub fn with_is_retriable<P>(mut self, is_retriable: P) -> Self
    where
        P: Fn(&CallError) -> bool + Send + Sync + 'static,
    {
        self.is_retriable = Arc::new(is_retriable);
        self
    }

    /// Run the operation until it succeeds, returns a non-retriable error,
    /// or the attempt budget is exhausted. The last error is returned.
    pub async fn run<F, Fut>(&self, cb: F) -> Result<(), CallError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<(), CallError>>,
    {
        let mut last = Ok(());
        for _ in 0..self.max_attempts {
            match cb().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if !(self.is_retriable)(&err) {
                        return Err(err);
                    }
                    last = Err(err);
                }
            }
        }
        last
    }

    pub(crate) async fn run_boxed(&self, cb: CallFn) -> Result<(), CallError> {
        self.run(move || cb()).await
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test]
    async fn test_defaults_run_once_on_success() {
        let counts = counter();
        let result = Retrier::new()
            .run(|| {
                let counts = Arc::clone(&counts);
                async move {
                    counts.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(counts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_defaults_run_once_on_error() {
        let counts = counter();
        let err = Retrier::new()
            .run(|| {
                let counts = Arc::clone(&counts);
                async move {
                    counts.fetch_add(1, Ordering::SeqCst);
                    Err(CallError::app("oops"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err, CallError::app("oops"));
        assert_eq!(counts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausts_attempt_budget() {
        let counts = counter();
        let err = Retrier::new()
            .with_max_attempts(3)
            .run(|| {
                let counts = Arc::clone(&counts);
                async move {
                    counts.fetch_add(1, Ordering::SeqCst);
                    Err(CallError::app("oops"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err, CallError::app("oops"));
        assert_eq!(counts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_attempt_that_succeeds() {
        let counts = counter();
        let result = Retrier::new()
            .with_max_attempts(3)
            .run(|| {
                let counts = Arc::clone(&counts);
                async move {
                    if counts.fetch_add(1, Ordering::SeqCst) == 1 {
                        Ok(())
                    } else {
                        Err(CallError::app("oops"))
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(counts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retriable_error_short_circuits() {
        let counts = counter();
        let err = Retrier::new()
            .with_max_attempts(3)
            .with_is_retriable(|err| err.to_string() != "perm err")
            .run(|| {
                let counts = Arc::clone(&counts);
                async move {
                    if counts.fetch_add(1, Ordering::SeqCst) == 1 {
                        Err(CallError::app("perm err"))
                    } else {
                        Err(CallError::app("oops"))
                    }
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err, CallError::app("perm err"));
        assert_eq!(counts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_attempts_promoted_to_default() {
        let counts = counter();
        let err = Retrier::new()
            .with_max_attempts(0)
            .run(|| {
                let counts = Arc::clone(&counts);
                async move {
                    counts.fetch_add(1, Ordering::SeqCst);
                    Err(CallError::app("oops"))
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err, CallError::app("oops"));
        assert_eq!(counts.load(Ordering::SeqCst), 1);
    }
}
