//! A named, policy-equipped invocation site
//!
//! A [`Caller`] binds a dependency and operation name to an optional set
//! of resilience primitives and composes them around the user operation
//! in a fixed nesting order:
//!
//! ```text
//! Timer ▸ Breaker ▸ Retrier ▸ operation
//! ```
//!
//! The retrier sits innermost so retries land inside a single breaker
//! decision window and cannot amplify the timeout; the breaker sits above
//! it so an open circuit short-circuits every attempt; the timer bounds
//! the total wait regardless of retry count. The fallback is consulted
//! last, outside the timer, so even a timeout can be rescued.

use crate::breaker::Breaker;
use crate::error::CallError;
use crate::fallback::Fallback;
use crate::op::{CallFn, call_fn};
use crate::retrier::Retrier;
use crate::timer::Timer;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// An invocation site for a named dependency operation
///
/// Immutable: every `with_` derivation returns a new caller sharing the
/// attached primitives, leaving the source untouched.
#[derive(Clone)]
pub struct Caller {
    dependency: String,
    name: String,
    key: String,

    breaker: Option<Arc<Breaker>>,
    fallback: Option<Fallback>,
    retrier: Option<Retrier>,
    timer: Option<Timer>,
}

impl Caller {
    /// A bare caller for the dependency and operation name. Without any
    /// attached primitive, [`call`](Caller::call) is a transparent
    /// pass-through.
    pub fn new(dependency: impl Into<String>, name: impl Into<String>) -> Self {
        let dependency = dependency.into();
        let name = name.into();
        let key = format!("{dependency}:{name}");
        Self {
            dependency,
            name,
            key,
            breaker: None,
            fallback: None,
            retrier: None,
            timer: None,
        }
    }

    /// Logical name of the external system, e.g. "mysql"
    pub fn dependency(&self) -> &str {
        &self.dependency
    }

    /// Operation name within the dependency
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry key, `dependency:name`
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Derive a caller guarded by the circuit breaker
    pub fn with_breaker(&self, breaker: Arc<Breaker>) -> Caller {
        let mut caller = self.clone();
        caller.breaker = Some(breaker);
        caller
    }

    /// Derive a caller with fallback behavior
    pub fn with_fallback(&self, fallback: Fallback) -> Caller {
        let mut caller = self.clone();
        caller.fallback = Some(fallback);
        caller
    }

    /// Derive a caller that retries failures
    pub fn with_retrier(&self, retrier: Retrier) -> Caller {
        let mut caller = self.clone();
        caller.retrier = Some(retrier);
        caller
    }

    /// Derive a caller whose total wait is bounded by the timeout.
    ///
    /// Prefer timeout functionality provided by the dependency's own
    /// client when it exists: this guard only bounds the wait, it does not
    /// stop the operation from running to completion in the background.
    pub fn with_timeout(&self, timeout: Duration) -> Caller {
        let mut caller = self.clone();
        caller.timer = Some(Timer::new(timeout));
        caller
    }

    /// Execute the operation through the attached primitives
    pub async fn call<F, Fut>(&self, cb: F) -> Result<(), CallError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallError>> + Send + 'static,
    {
        self.call_boxed(call_fn(cb)).await
    }

    pub(crate) async fn call_boxed(&self, cb: CallFn) -> Result<(), CallError> {
        let mut op = cb;

        if let Some(retrier) = &self.retrier {
            let retrier = retrier.clone();
            let inner = op;
            op = Arc::new(move || {
                let retrier = retrier.clone();
                let inner = Arc::clone(&inner);
                async move { retrier.run_boxed(inner).await }.boxed()
            });
        }

        if let Some(breaker) = &self.breaker {
            let breaker = Arc::clone(breaker);
            let inner = op;
            op = Arc::new(move || {
                let breaker = Arc::clone(&breaker);
                let inner = Arc::clone(&inner);
                async move { breaker.run_boxed(inner).await }.boxed()
            });
        }

        let result = match &self.timer {
            Some(timer) => timer.run_boxed(op).await,
            None => op().await,
        };

        if let Err(err) = &result {
            if let Some(fallback) = &self.fallback {
                if fallback.use_fallback(err) {
                    return fallback.call().await;
                }
            }
        }
        result
    }
}
