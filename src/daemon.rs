//! Background telemetry collection
//!
//! The daemon owns a registry of [`Caller`]s and times every invocation
//! made through it. Completed calls are queued on a bounded channel and a
//! background worker batches them to the collector: a full batch of 100
//! flushes immediately, a 15 second tick flushes whatever has
//! accumulated, and shutdown drains the residue.
//!
//! A daemon with neither a client nor a collector address is *disabled*:
//! calls still run through their registered callers, nothing is recorded.
//! This makes instrumentation a construction-time toggle.

use crate::api::{CallRecord, CollectorClient, GrpcClient, RecordCallsRequest};
use crate::caller::Caller;
use crate::config::Config;
use crate::error::{CallError, CallguardError};
use crate::op::{CallFn, call_fn, join_outcome};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

/// Queue depth between callers and the worker. Enqueueing awaits when the
/// worker falls this far behind.
const CHANNEL_CAPACITY: usize = 100;

/// Batch size that triggers an immediate flush
const FLUSH_THRESHOLD: usize = 100;

/// Partial batches are flushed this often
const FLUSH_INTERVAL: Duration = Duration::from_secs(15);

/// Background processor that collects completed calls and ships them to
/// the collector
pub struct Daemon {
    environment: String,
    service: String,
    collector_addr: Option<Url>,
    client: Option<Arc<dyn CollectorClient>>,

    registry: HashMap<String, Caller>,
    call_tx: mpsc::Sender<CallRecord>,
    call_rx: Mutex<Option<mpsc::Receiver<CallRecord>>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Daemon {
    /// A disabled daemon; attach a client or collector address to enable
    /// telemetry.
    pub fn new() -> Self {
        let (call_tx, call_rx) = mpsc::channel(CHANNEL_CAPACITY);
        Self {
            environment: String::new(),
            service: String::new(),
            collector_addr: None,
            client: None,
            registry: HashMap::new(),
            call_tx,
            call_rx: Mutex::new(Some(call_rx)),
            cancel: CancellationToken::new(),
            worker: Mutex::new(None),
        }
    }

    /// Build a daemon from environment-driven configuration
    pub fn from_config(config: &Config) -> Self {
        let mut daemon = Self::new()
            .with_environment(config.environment.clone())
            .with_service(config.service.clone());
        if let Some(addr) = &config.collector_addr {
            daemon = daemon.with_collector_addr(addr.clone());
        }
        daemon
    }

    /// Environment label attached to every shipped batch
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = environment.into();
        self
    }

    /// Service label attached to every shipped batch
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    /// Collector address; a gRPC client is built lazily from it on the
    /// first flush
    pub fn with_collector_addr(mut self, addr: Url) -> Self {
        self.collector_addr = Some(addr);
        self
    }

    /// Use the supplied client instead of dialing the collector address.
    /// This allows finer control over the transport, and mocking in tests.
    pub fn with_client(mut self, client: Arc<dyn CollectorClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// True when telemetry will actually be recorded
    pub fn enabled(&self) -> bool {
        self.client.is_some() || self.collector_addr.is_some()
    }

    /// Attach a caller so it does not need to be re-instantiated per call.
    /// Returns the key to pass to [`call`](Daemon::call). Must precede
    /// [`start`](Daemon::start); registering the same key twice fails.
    pub fn register_caller(&mut self, caller: Caller) -> Result<String, CallguardError> {
        let key = caller.key().to_string();
        if self.registry.contains_key(&key) {
            return Err(CallguardError::DuplicateCaller { key });
        }
        self.registry.insert(key.clone(), caller);
        Ok(key)
    }

    /// Execute the operation through the caller registered under `key`,
    /// recording a telemetry record for the invocation when enabled.
    ///
    /// The operation's own result is returned unchanged; a panic inside
    /// it surfaces as [`CallError::Panic`]. Telemetry failures never
    /// affect the return value.
    pub async fn call<F, Fut>(&self, key: &str, cb: F) -> Result<(), CallError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallError>> + Send + 'static,
    {
        self.call_boxed(key, call_fn(cb)).await
    }

    async fn call_boxed(&self, key: &str, cb: CallFn) -> Result<(), CallError> {
        // An unknown key degrades to a bare pass-through caller.
        let caller = self
            .registry
            .get(key)
            .cloned()
            .unwrap_or_else(|| Caller::new("", ""));

        let started_at = SystemTime::now();
        let started = Instant::now();
        let result = join_outcome(
            tokio::spawn({
                let caller = caller.clone();
                async move { caller.call_boxed(cb).await }
            })
            .await,
        );
        let duration = started.elapsed();

        if self.enabled() {
            let record = CallRecord {
                dependency: caller.dependency().to_string(),
                name: caller.name().to_string(),
                started_at,
                duration,
                error: result.as_ref().err().map(|err| err.to_string()),
            };
            // A full queue makes this await until the worker catches up.
            if self.call_tx.send(record).await.is_err() {
                warn!(key, "telemetry queue closed, dropping record");
            }
        }

        result
    }

    /// Start the background worker. Calls made before `start` enqueue into
    /// the channel and are picked up once the worker runs.
    pub fn start(&self) {
        let Some(rx) = self.call_rx.lock().take() else {
            warn!("daemon already started");
            return;
        };

        let worker = Worker {
            environment: self.environment.clone(),
            service: self.service.clone(),
            collector_addr: self.collector_addr.clone(),
            client: self.client.clone(),
            enabled: self.enabled(),
        };
        let cancel = self.cancel.clone();
        *self.worker.lock() = Some(tokio::spawn(worker.consume_calls(rx, cancel)));
    }

    /// Stop the background worker, draining any residual batch first
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                error!(error = %err, "telemetry worker ended abnormally");
            }
        }
    }
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

struct Worker {
    environment: String,
    service: String,
    collector_addr: Option<Url>,
    client: Option<Arc<dyn CollectorClient>>,
    enabled: bool,
}

impl Worker {
    async fn consume_calls(mut self, mut rx: mpsc::Receiver<CallRecord>, cancel: CancellationToken) {
        if !self.enabled {
            debug!("telemetry disabled, worker exiting");
            return;
        }

        info!("telemetry worker started");

        let mut batch: Vec<CallRecord> = Vec::with_capacity(FLUSH_THRESHOLD);
        // First tick lands a full interval out, like a ticking clock.
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + FLUSH_INTERVAL,
            FLUSH_INTERVAL,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(record) => {
                        batch.push(record);
                        if batch.len() == FLUSH_THRESHOLD {
                            self.flush(&mut batch).await;
                        }
                    }
                    None => {
                        // Every sender is gone; ship what is left.
                        self.flush(&mut batch).await;
                        return;
                    }
                },
                _ = ticker.tick() => self.flush(&mut batch).await,
                _ = cancel.cancelled() => {
                    // Pull already-queued records before the final flush.
                    while let Ok(record) = rx.try_recv() {
                        batch.push(record);
                        if batch.len() == FLUSH_THRESHOLD {
                            self.flush(&mut batch).await;
                        }
                    }
                    self.flush(&mut batch).await;
                    info!("telemetry worker stopped");
                    return;
                }
            }
        }
    }

    async fn flush(&mut self, batch: &mut Vec<CallRecord>) {
        if batch.is_empty() {
            return;
        }

        let Some(client) = self.client().await else {
            batch.clear();
            return;
        };

        let calls = std::mem::take(batch);
        let count = calls.len();
        debug!(count, "flushing call batch");

        let request = RecordCallsRequest {
            environment: self.environment.clone(),
            service: self.service.clone(),
            calls,
        };
        if let Err(err) = client.record_calls(request).await {
            // The batch is dropped; buffering for retry is future work.
            error!(error = %err, count, "failed to record calls");
        }
    }

    async fn client(&mut self) -> Option<Arc<dyn CollectorClient>> {
        if self.client.is_none() {
            let addr = self.collector_addr.as_ref()?;
            match GrpcClient::connect(addr).await {
                Ok(client) => self.client = Some(Arc::new(client)),
                Err(err) => {
                    error!(error = %err, addr = %addr, "failed to connect to collector");
                    return None;
                }
            }
        }
        self.client.clone()
    }
}
