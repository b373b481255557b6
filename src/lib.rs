//! CALLGUARD - composable call-resilience primitives
//!
//! Library for wrapping outbound dependency calls (RPCs, database
//! queries, third-party HTTP) with reliability policies, plus a
//! background daemon that ships per-call telemetry to a collector.
//!
//! # Composition
//!
//! ```text
//! Caller.call ──► Timer ──► Breaker ──► Retrier ──► operation
//!                    └─ Fallback consulted on the composed result
//! ```
//!
//! Each primitive is optional; an absent primitive is a transparent
//! pass-through, so a caller carrying only a retrier behaves exactly like
//! a bare retrier.
//!
//! # Example
//!
//! ```ignore
//! use callguard::{Breaker, Caller, Daemon, Fallback, Retrier};
//!
//! let breaker = Arc::new(Breaker::new());
//! let caller = Caller::new("mysql", "users.GetUser")
//!     .with_breaker(breaker)
//!     .with_retrier(Retrier::new().with_max_attempts(3))
//!     .with_timeout(Duration::from_secs(1))
//!     .with_fallback(Fallback::default());
//!
//! let mut daemon = Daemon::from_config(&Config::from_env()?);
//! let key = daemon.register_caller(caller)?;
//! daemon.start();
//!
//! daemon.call(&key, || async { fetch_user().await }).await?;
//! ```
//!
//! Breaker and retry state are process-local; there is no distributed
//! coordination and no persistence.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod api;
pub mod breaker;
pub mod caller;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod error;
pub mod fallback;
pub mod op;
pub mod retrier;
pub mod timer;

// Proto types generated from proto/v1/collector.proto
pub mod proto {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::derive_partial_eq_without_eq)]

    include!("proto/callguard.v1.rs");
}

pub use api::{CallRecord, CollectorClient, GrpcClient, RecordCallsRequest};
pub use breaker::{Breaker, Registry, Snapshot, Status};
pub use caller::Caller;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{CallError, CallguardError, Result};
pub use fallback::Fallback;
pub use op::{CallFn, CallFuture, ErrorPredicate, call_fn};
pub use retrier::Retrier;
pub use timer::Timer;
