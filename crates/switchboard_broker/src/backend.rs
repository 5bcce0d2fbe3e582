//! Backend adapters and the capability-checked plugin registry.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use switchboard_core::{BackendDescriptor, PayloadSet};
use switchboard_error::{BackendFailure, BrokerError, BuilderError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// One AI-completion provider.
///
/// Implementations perform a single remote call. They should stop work when
/// `cancel` fires and may tag failures with a structured
/// [`FailureKind`](switchboard_error::FailureKind).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Identifier matching the backend's descriptor.
    fn backend_id(&self) -> &str;

    /// Send `payload` and return the provider's answer.
    ///
    /// # Errors
    ///
    /// Returns a failure describing what went wrong; it is classified by the
    /// broker, never propagated.
    async fn complete(
        &self,
        payload: &PayloadSet,
        cancel: CancellationToken,
    ) -> Result<String, BackendFailure>;
}

/// Whether a backend can be used in this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// Ready to create.
    Available,
    /// Missing credentials, feature or dependency.
    Unavailable(String),
}

impl Availability {
    /// Check if the backend can be created.
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Available => write!(f, "available"),
            Availability::Unavailable(reason) => write!(f, "unavailable: {}", reason),
        }
    }
}

/// Creates a backend after checking it can run here.
pub trait BackendFactory: Send + Sync {
    /// Identifier of the backend this factory creates.
    fn backend_id(&self) -> &str;

    /// Check credentials and other prerequisites without side effects.
    fn probe(&self) -> Availability;

    /// Limits to use when configuration does not name this backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the built-in limits are invalid.
    fn default_descriptor(&self) -> Result<BackendDescriptor, BuilderError>;

    /// Build the adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot be constructed.
    fn create(&self) -> Result<Arc<dyn Backend>, BrokerError>;
}

/// Registry of backend factories keyed by backend id.
#[derive(Default)]
pub struct BackendRegistry {
    factories: HashMap<String, Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory.
    ///
    /// A factory with the same id is replaced and a warning logged.
    #[instrument(skip(self, factory), fields(backend = factory.backend_id()))]
    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        let id = factory.backend_id().to_string();
        if self.factories.contains_key(&id) {
            warn!(backend = %id, "Backend factory already registered, overwriting previous registration");
        } else {
            debug!("Registering backend factory");
        }
        self.factories.insert(id, factory);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.register(factory);
        self
    }

    /// Get a factory by id.
    pub fn get(&self, id: &str) -> Option<Arc<dyn BackendFactory>> {
        self.factories.get(id).cloned()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Factories in id order.
    pub fn factories(&self) -> Vec<Arc<dyn BackendFactory>> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    /// Probe every factory, in id order.
    #[instrument(skip(self))]
    pub fn probe_all(&self) -> Vec<(String, Availability)> {
        self.factories()
            .into_iter()
            .map(|factory| (factory.backend_id().to_string(), factory.probe()))
            .collect()
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Check if no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.ids())
            .finish()
    }
}
