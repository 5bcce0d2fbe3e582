//! Backend that answers without contacting anything.

use crate::{Availability, Backend, BackendFactory};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{BackendDescriptor, PayloadSet};
use switchboard_error::{BackendFailure, BrokerError, BuilderError, FailureKind};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Backend that echoes payload statistics after an optional delay.
///
/// Used for dry runs and tests of the broker plumbing.
#[derive(Debug, Clone)]
pub struct NoopBackend {
    id: String,
    latency: Duration,
}

impl NoopBackend {
    /// Create a no-op backend that answers immediately.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            latency: Duration::ZERO,
        }
    }

    /// Answer only after `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl Backend for NoopBackend {
    fn backend_id(&self) -> &str {
        &self.id
    }

    async fn complete(
        &self,
        payload: &PayloadSet,
        cancel: CancellationToken,
    ) -> Result<String, BackendFailure> {
        debug!(
            backend = %self.id,
            blocks = payload.len(),
            "NoopBackend: complete() called (no request sent)"
        );
        if !self.latency.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(self.latency) => {}
                _ = cancel.cancelled() => {
                    return Err(BackendFailure::tagged(FailureKind::Timeout, "cancelled before answering"));
                }
            }
        }
        Ok(format!(
            "{} received {} blocks ({} chars): {}",
            self.id,
            payload.len(),
            payload.total_chars(),
            payload.names().join(", ")
        ))
    }
}

/// Factory for [`NoopBackend`]s; always available.
#[derive(Debug, Clone)]
pub struct NoopFactory {
    id: String,
    latency: Duration,
}

impl NoopFactory {
    /// Create a factory for backend `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            latency: Duration::ZERO,
        }
    }

    /// Give created backends a fixed latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl BackendFactory for NoopFactory {
    fn backend_id(&self) -> &str {
        &self.id
    }

    fn probe(&self) -> Availability {
        Availability::Available
    }

    fn default_descriptor(&self) -> Result<BackendDescriptor, BuilderError> {
        Ok(BackendDescriptor::builder()
            .id(self.id.clone())
            .max_concurrent(4usize)
            .build()?)
    }

    fn create(&self) -> Result<Arc<dyn Backend>, BrokerError> {
        Ok(Arc::new(
            NoopBackend::new(self.id.clone()).with_latency(self.latency),
        ))
    }
}
