//! Backend contract and registry.
//!
//! A backend is the pluggable store/transport behind an interface. The engine
//! hands it encoded envelopes on send and expects encoded envelopes back from
//! receive; it never looks inside a backend's storage.

use crate::config::InterfaceConfig;
use crate::error::{BackendError, ConfigurationError};
use crate::message::{Envelope, QueueName, ReceiveOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Enumeration of the reference backends shipped with the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    InMemory,
    FileSystem,
    HttpRelay,
    /// Any backend implemented outside this crate
    Custom,
}

impl BackendKind {
    /// Whether messages survive a process restart
    pub fn is_durable(&self) -> bool {
        match self {
            Self::InMemory => false,
            Self::FileSystem => true,
            Self::HttpRelay => true,
            Self::Custom => false,
        }
    }

    /// Whether `receive` can ever return messages
    pub fn supports_receive(&self) -> bool {
        !matches!(self, Self::HttpRelay)
    }
}

/// Store/transport implementation for one or more interfaces.
///
/// # Receive contract
///
/// `receive` must be atomic with respect to concurrent callers: every stored
/// message is returned by exactly one call. Implementations achieve this with
/// locking or a transactional claim-then-delete. Nothing available is an empty
/// vector, not an error.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Store an encoded envelope on `queue`
    async fn send(
        &self,
        queue: &QueueName,
        envelope: Envelope,
        config: &InterfaceConfig,
    ) -> Result<(), BackendError>;

    /// Take up to `options.limit` encoded envelopes.
    ///
    /// `None` means every queue owned by `config`. Returned envelopes carry the
    /// queue they were stored on.
    async fn receive(
        &self,
        queue: Option<&QueueName>,
        config: &InterfaceConfig,
        options: &ReceiveOptions,
    ) -> Result<Vec<Envelope>, BackendError>;

    fn kind(&self) -> BackendKind;
}

// ============================================================================
// BackendRegistry
// ============================================================================

/// Registry mapping backend ids (as named by `InterfaceConfig::backend`) to
/// implementations.
///
/// Built once when the engine is assembled and read-only afterwards.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend under `id`, replacing any previous registration.
    /// Returns `&mut Self` to allow method chaining.
    pub fn register(&mut self, id: impl Into<String>, backend: Arc<dyn Backend>) -> &mut Self {
        self.backends.insert(id.into(), backend);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(id).cloned()
    }

    /// Look up a backend, failing with a configuration error if it is missing
    pub fn require(&self, id: &str) -> Result<Arc<dyn Backend>, ConfigurationError> {
        self.get(id).ok_or_else(|| ConfigurationError::UnknownBackend {
            backend: id.to_string(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.backends.contains_key(id)
    }

    /// Registered ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.backends.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.ids())
            .finish()
    }
}

#[cfg(test)]
#[path = "backend_tests.rs"]
mod tests;
