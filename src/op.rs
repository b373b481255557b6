//! Operation plumbing shared by the resilience primitives
//!
//! A wrapped operation is a zero-argument async function returning
//! `Result<(), CallError>`. It is held behind an `Arc` so the retrier can
//! re-invoke it and the timer can ship it to a worker task while the
//! caller keeps its own handle.

use crate::error::CallError;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinError;

/// Future produced by a single invocation of an operation
pub type CallFuture = BoxFuture<'static, Result<(), CallError>>;

/// A reusable handle to a wrapped operation
pub type CallFn = Arc<dyn Fn() -> CallFuture + Send + Sync>;

/// Classifies an error for retry, breaker accounting, or fallback selection
pub type ErrorPredicate = Arc<dyn Fn(&CallError) -> bool + Send + Sync>;

/// Adapt a plain async closure into a [`CallFn`]
///
/// # Example
///
/// ```
/// use callguard::{call_fn, CallError};
///
/// let op = call_fn(|| async { Err(CallError::app("oops")) });
/// ```
pub fn call_fn<F, Fut>(f: F) -> CallFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Default predicate: every error counts
pub(crate) fn any_error() -> ErrorPredicate {
    Arc::new(|_| true)
}

/// Run the operation under a recovery barrier.
///
/// The operation executes on its own task; a panic inside it is converted
/// into [`CallError::Panic`] carrying the panic payload's string form
/// instead of unwinding into the caller.
pub(crate) async fn run_guarded(cb: CallFn) -> Result<(), CallError> {
    join_outcome(tokio::spawn(cb()).await)
}

/// Map a joined task result onto the operation's result, converting a
/// panicked task into an error.
pub(crate) fn join_outcome(
    joined: std::result::Result<Result<(), CallError>, JoinError>,
) -> Result<(), CallError> {
    match joined {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(CallError::Panic(panic_message(err.into_panic()))),
        Err(err) => Err(CallError::Operation(err.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_call_fn_is_reusable() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let counts = Arc::new(AtomicU32::new(0));
        let op = {
            let counts = Arc::clone(&counts);
            call_fn(move || {
                let counts = Arc::clone(&counts);
                async move {
                    counts.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
        };

        op().await.unwrap();
        op().await.unwrap();
        assert_eq!(counts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_guarded_passes_result_through() {
        let err = run_guarded(call_fn(|| async { Err(CallError::app("oops")) }))
            .await
            .unwrap_err();
        assert_eq!(err, CallError::app("oops"));
    }

    #[tokio::test]
    async fn test_guarded_captures_panic_message() {
        let err = run_guarded(call_fn(|| async { panic!("boom") }))
            .await
            .unwrap_err();
        assert_eq!(err, CallError::Panic("boom".into()));
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_guarded_captures_formatted_panic() {
        let err = run_guarded(call_fn(|| async { panic!("bad value: {}", 42) }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "bad value: 42");
    }
}
