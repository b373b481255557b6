//! Bounds the wait for an operation
//!
//! The timer bounds *observed* latency only. When the deadline fires first
//! the operation keeps running on its detached task and its eventual result
//! is discarded. Prefer a dependency's native timeout when it has one; this
//! guard exists for clients that do not.

use crate::error::CallError;
use crate::op::{CallFn, call_fn, join_outcome, run_guarded};
use std::future::Future;
use std::time::Duration;

/// Races an operation against a deadline
#[derive(Debug, Clone)]
pub struct Timer {
    duration: Duration,
}

impl Timer {
    /// A timer with the supplied deadline. A zero duration disables the
    /// guard and the operation runs unbounded.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Run the operation, returning [`CallError::Timeout`] if the deadline
    /// elapses first. A panic inside the operation surfaces as
    /// [`CallError::Panic`].
    pub async fn run<F, Fut>(&self, cb: F) -> Result<(), CallError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallError>> + Send + 'static,
    {
        self.run_boxed(call_fn(cb)).await
    }

    pub(crate) async fn run_boxed(&self, cb: CallFn) -> Result<(), CallError> {
        if self.duration.is_zero() {
            return run_guarded(cb).await;
        }

        let operation = tokio::spawn(cb());
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => Err(CallError::Timeout),
            joined = operation => join_outcome(joined),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_zero_duration_runs_unbounded() {
        let timer = Timer::new(Duration::ZERO);

        let err = timer
            .run(|| async { Err(CallError::app("oops")) })
            .await
            .unwrap_err();
        assert_eq!(err, CallError::app("oops"));
    }

    #[tokio::test]
    async fn test_error_passes_through() {
        let timer = Timer::new(Duration::from_millis(50));

        let err = timer
            .run(|| async { Err(CallError::app("oops")) })
            .await
            .unwrap_err();
        assert_eq!(err, CallError::app("oops"));
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let timer = Timer::new(Duration::from_millis(50));

        let err = timer.run(|| async { panic!("oops") }).await.unwrap_err();
        assert_eq!(err, CallError::Panic("oops".into()));
        assert_eq!(err.to_string(), "oops");
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_before_deadline() {
        let timer = Timer::new(Duration::from_millis(50));

        let result = timer
            .run(|| async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(())
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_before_completion() {
        let timer = Timer::new(Duration::from_millis(50));

        let err = timer
            .run(|| async {
                tokio::time::sleep(Duration::from_millis(75)).await;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err, CallError::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_operation_keeps_running() {
        let timer = Timer::new(Duration::from_millis(50));
        let finished = Arc::new(AtomicBool::new(false));

        let err = {
            let finished = Arc::clone(&finished);
            timer
                .run(move || {
                    let finished = Arc::clone(&finished);
                    async move {
                        tokio::time::sleep(Duration::from_millis(75)).await;
                        finished.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                })
                .await
                .unwrap_err()
        };
        assert_eq!(err, CallError::Timeout);
        assert!(!finished.load(Ordering::SeqCst));

        // The detached task finishes on its own schedule.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
