//! Three-state circuit breaker
//!
//! Guards invocation of an operation based on its recent performance:
//!
//! ```text
//!              failures reach max_failures
//!   Closed ───────────────────────────────► Open
//!     ▲                                       │
//!     │ max_half_open_requests                │ timeout elapses
//!     │ consecutive successes                 ▼ (observed, not stored)
//!     └────────────────────────────────── HalfOpen
//!                 any failure returns HalfOpen to Open
//! ```
//!
//! The Open → HalfOpen edge is derived from the clock: observers see
//! HalfOpen once the expiry passes, while the stored status is updated
//! lazily by the next admitted call's outcome. Breakers are process-local
//! and must be shared (via [`Registry`]) between every call site that hits
//! the same dependency.

mod registry;

pub use registry::Registry;

use crate::clock::{Clock, SystemClock};
use crate::error::CallError;
use crate::op::{CallFn, ErrorPredicate, any_error, call_fn, run_guarded};
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_MAX_FAILURES: u32 = 5;
const DEFAULT_MAX_HALF_OPEN_REQUESTS: u32 = 1;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Breaker status as seen by observers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Status {
    /// Operations run as normal
    #[default]
    Closed,

    /// Operations run in a limited capacity; a failure reopens the breaker
    HalfOpen,

    /// Operations are rejected without running
    Open,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Closed => write!(f, "closed"),
            Status::HalfOpen => write!(f, "half-open"),
            Status::Open => write!(f, "open"),
        }
    }
}

/// A consistent view of the breaker taken under the read lock
#[derive(Clone, Copy, Debug)]
pub struct Snapshot {
    /// Observed status, with the time-based Open → HalfOpen derivation
    /// already applied
    pub status: Status,

    /// Consecutive failures; only tracked while closed
    pub failures: u32,

    /// Consecutive successes; only tracked while half-open
    pub successes: u32,
}

#[derive(Debug, Default)]
struct State {
    status: Status,
    expires_at: Option<Instant>,
    failures: u32,
    successes: u32,
    half_open_requests: u32,
}

impl State {
    /// Status after applying the time-based derivation. The stored status
    /// stays Open until the next accounted outcome rewrites it.
    fn observed(&self, now: Instant) -> Status {
        match (self.status, self.expires_at) {
            (Status::Open, Some(expires_at)) if expires_at <= now => Status::HalfOpen,
            (status, _) => status,
        }
    }
}

/// Conditionally runs an operation based on its past performance
pub struct Breaker {
    is_failure: ErrorPredicate,
    max_failures: u32,
    max_half_open_requests: u32,
    timeout: Duration,
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
}

impl Breaker {
    /// A breaker with the defaults: 5 consecutive failures to open, a 60
    /// second open window, one half-open probe, and any error counting as
    /// a failure.
    pub fn new() -> Self {
        Self {
            is_failure: any_error(),
            max_failures: DEFAULT_MAX_FAILURES,
            max_half_open_requests: DEFAULT_MAX_HALF_OPEN_REQUESTS,
            timeout: DEFAULT_TIMEOUT,
            clock: Arc::new(SystemClock),
            state: RwLock::new(State::default()),
        }
    }

    /// Consecutive failures required to open the breaker. Zero keeps the
    /// default of 5.
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = if max_failures == 0 {
            DEFAULT_MAX_FAILURES
        } else {
            max_failures
        };
        self
    }

    /// Requests admitted concurrently while half-open, and the successes
    /// required to close. Zero keeps the default of 1.
    pub fn with_max_half_open_requests(mut self, max_requests: u32) -> Self {
        self.max_half_open_requests = if max_requests == 0 {
            DEFAULT_MAX_HALF_OPEN_REQUESTS
        } else {
            max_requests
        };
        self
    }

    /// How long the breaker stays open before probing. Zero keeps the
    /// default of 60 seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            timeout
        };
        self
    }

    /// Classify which errors count toward the failure streak. Errors the
    /// predicate declines still surface to the caller, but they reset the
    /// streak instead of extending it.
    pub fn with_is_failure<P>(mut self, is_failure: P) -> Self
    where
        P: Fn(&CallError) -> bool + Send + Sync + 'static,
    {
        self.is_failure = Arc::new(is_failure);
        self
    }

    /// Replace the time source. Only useful for testing.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Observed status
    pub fn status(&self) -> Status {
        self.snapshot().status
    }

    /// A consistent view of status and counters
    pub fn snapshot(&self) -> Snapshot {
        let now = self.clock.now();
        let state = self.state.read();
        Snapshot {
            status: state.observed(now),
            failures: state.failures,
            successes: state.successes,
        }
    }

    /// Run the operation if the breaker admits it, tracking the outcome.
    ///
    /// Rejected calls return [`CallError::BreakerOpen`] without invoking
    /// the operation or touching any counter. A panic inside the operation
    /// is converted to [`CallError::Panic`] and accounted as a failure.
    pub async fn run<F, Fut>(&self, cb: F) -> Result<(), CallError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallError>> + Send + 'static,
    {
        self.run_boxed(call_fn(cb)).await
    }

    pub(crate) async fn run_boxed(&self, cb: CallFn) -> Result<(), CallError> {
        let snapshot = self.snapshot();
        match snapshot.status {
            Status::Open => return Err(CallError::BreakerOpen),
            Status::HalfOpen if !self.admit_half_open() => return Err(CallError::BreakerOpen),
            _ => {}
        }

        let result = run_guarded(cb).await;
        self.record_outcome(snapshot, result.as_ref().err());
        result
    }

    /// Atomically claim one of the half-open slots.
    fn admit_half_open(&self) -> bool {
        let mut state = self.state.write();
        if state.half_open_requests >= self.max_half_open_requests {
            return false;
        }
        state.half_open_requests += 1;
        true
    }

    fn record_outcome(&self, snapshot: Snapshot, err: Option<&CallError>) {
        let is_failure = err.is_some_and(|err| (self.is_failure)(err));

        // Failures are only tracked in the closed state, so a clean streak
        // that stays clean never needs the write lock.
        if snapshot.status == Status::Closed && !is_failure && snapshot.failures == 0 {
            return;
        }

        let now = self.clock.now();
        let mut state = self.state.write();
        match state.observed(now) {
            Status::Closed => {
                if is_failure {
                    state.failures += 1;
                    state.successes = 0;
                    if state.failures >= self.max_failures {
                        self.transition(&mut state, Status::Open);
                    }
                } else {
                    state.failures = 0;
                }
            }
            Status::HalfOpen => {
                // A failure returns the breaker to open; closing requires a
                // success for each allowed half-open request.
                if is_failure {
                    self.transition(&mut state, Status::Open);
                } else {
                    state.successes += 1;
                    state.failures = 0;
                    if state.successes == self.max_half_open_requests {
                        self.transition(&mut state, Status::Closed);
                    }
                }
            }
            Status::Open => {}
        }
    }

    /// Callers must hold the write lock.
    fn transition(&self, state: &mut State, status: Status) {
        state.status = status;
        state.failures = 0;
        state.successes = 0;
        state.half_open_requests = 0;
        state.expires_at = if status == Status::Open {
            Some(self.clock.now() + self.timeout)
        } else {
            None
        };

        match status {
            Status::Open => warn!(timeout = ?self.timeout, "circuit breaker opened"),
            Status::Closed => debug!("circuit breaker closed"),
            Status::HalfOpen => {}
        }
    }
}

impl Default for Breaker {
    fn default() -> Self {
        Self::new()
    }
}
