//! Alternative operation consulted after a failed call

use crate::error::CallError;
use crate::op::{CallFn, ErrorPredicate, any_error, call_fn};
use std::future::Future;
use std::sync::Arc;

/// Decides whether a failure should trigger an alternative operation,
/// and runs it.
///
/// Callers must consult [`use_fallback`] before invoking [`call`].
///
/// [`use_fallback`]: Fallback::use_fallback
/// [`call`]: Fallback::call
#[derive(Clone)]
pub struct Fallback {
    use_fallback: ErrorPredicate,
    call: CallFn,
}

impl Fallback {
    /// A fallback running the supplied operation for any error
    pub fn new<F, Fut>(call: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallError>> + Send + 'static,
    {
        Self {
            use_fallback: any_error(),
            call: call_fn(call),
        }
    }

    /// Restrict which errors trigger the fallback
    pub fn with_use_fallback<P>(mut self, use_fallback: P) -> Self
    where
        P: Fn(&CallError) -> bool + Send + Sync + 'static,
    {
        self.use_fallback = Arc::new(use_fallback);
        self
    }

    /// Should this error be replaced by the fallback's result?
    pub fn use_fallback(&self, err: &CallError) -> bool {
        (self.use_fallback)(err)
    }

    /// Execute the fallback operation
    pub async fn call(&self) -> Result<(), CallError> {
        (self.call)().await
    }
}

impl Default for Fallback {
    /// A no-op fallback that succeeds for any error
    fn default() -> Self {
        Self::new(|| async { Ok(()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_defaults() {
        let fallback = Fallback::default();

        assert!(fallback.use_fallback(&CallError::app("oops")));
        assert!(fallback.call().await.is_ok());
    }

    #[tokio::test]
    async fn test_overrides() {
        let counts = Arc::new(AtomicU32::new(0));
        let fallback = {
            let counts = Arc::clone(&counts);
            Fallback::new(move || {
                let counts = Arc::clone(&counts);
                async move {
                    counts.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        }
        .with_use_fallback(|err| err.to_string() != "no fallback");

        assert!(fallback.use_fallback(&CallError::app("oops")));
        assert!(!fallback.use_fallback(&CallError::app("no fallback")));

        assert!(fallback.call().await.is_ok());
        assert_eq!(counts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_error_propagates() {
        let fallback = Fallback::new(|| async { Err(CallError::app("secondary down")) });

        let err = fallback.call().await.unwrap_err();
        assert_eq!(err, CallError::app("secondary down"));
    }
}
