//! Client for shipping call batches to the collector
//!
//! The daemon flushes through the [`CollectorClient`] seam; tests inject
//! mocks, production uses the [`GrpcClient`] over the generated stub.

use crate::error::{CallguardError, Result};
use crate::proto;
use crate::proto::collector_client::CollectorClient as CollectorStub;
use async_trait::async_trait;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;
use url::Url;

/// Default connect timeout (10 seconds)
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default request timeout (30 seconds)
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// A completed invocation, queued for asynchronous shipping
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub dependency: String,
    pub name: String,
    pub started_at: SystemTime,
    pub duration: Duration,
    /// None when the call succeeded
    pub error: Option<String>,
}

impl CallRecord {
    fn into_proto(self) -> proto::Call {
        proto::Call {
            dependency: self.dependency,
            name: self.name,
            started_at: Some(prost_types::Timestamp::from(self.started_at)),
            duration: self.duration.try_into().ok(),
            error: self.error.unwrap_or_default(),
        }
    }
}

/// A batch of call records with its environment and service labels
#[derive(Debug, Clone)]
pub struct RecordCallsRequest {
    pub environment: String,
    pub service: String,
    pub calls: Vec<CallRecord>,
}

impl RecordCallsRequest {
    fn into_proto(self) -> proto::RecordCallsRequest {
        proto::RecordCallsRequest {
            env: self.environment,
            service: self.service,
            calls: self.calls.into_iter().map(CallRecord::into_proto).collect(),
        }
    }
}

/// Boundary to the collector service
#[async_trait]
pub trait CollectorClient: Send + Sync {
    /// Record a batch of completed calls. An empty batch must be a no-op.
    async fn record_calls(&self, request: RecordCallsRequest) -> Result<()>;
}

/// gRPC client for the collector service
pub struct GrpcClient {
    /// The generated stub (wrapped in Mutex for interior mutability)
    client: Mutex<CollectorStub<Channel>>,
    /// Target endpoint for logging/debugging
    endpoint: String,
}

impl GrpcClient {
    /// Connect to the collector using the host component of the URL.
    ///
    /// Uses default timeouts: 10s connect, 30s request.
    pub async fn connect(addr: &Url) -> Result<Self> {
        let host = addr.host_str().ok_or_else(|| {
            CallguardError::Config(format!("collector address {addr} has no host"))
        })?;
        let endpoint = match addr.port() {
            Some(port) => format!("http://{host}:{port}"),
            None => format!("http://{host}"),
        };

        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| CallguardError::Config(format!("invalid collector endpoint: {e}")))?
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .connect()
            .await?;

        debug!(endpoint = %endpoint, "collector client connected");

        Ok(Self {
            client: Mutex::new(CollectorStub::new(channel)),
            endpoint,
        })
    }
}

#[async_trait]
impl CollectorClient for GrpcClient {
    async fn record_calls(&self, request: RecordCallsRequest) -> Result<()> {
        if request.calls.is_empty() {
            return Ok(());
        }

        // Clone the stub and release the lock immediately; tonic clients
        // are cheap to clone and this allows concurrent flushes.
        let mut client = self.client.lock().await.clone();
        let count = request.calls.len();

        client.record_calls(request.into_proto()).await?;
        debug!(endpoint = %self.endpoint, count, "recorded calls");
        Ok(())
    }
}
