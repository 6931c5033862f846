//! Common test utilities for message-queue integration tests
//!
//! This module provides:
//! - Recording implementations of the handler traits
//! - Helpers for building registries and engines over shared backends

use async_trait::async_trait;
use message_queue::{
    Body, DeliveryCallback, DeliveryFailure, Encoding, Envelope, FailureLog, HandlerError,
    InMemoryBackend, InterfaceConfig, InterfaceRegistry, MessageQueueBuilder, QueueSelector,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

// ============================================================================
// Recording Failure Log
// ============================================================================

/// One `log` error action
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(dead_code)]
pub struct FailureRecord {
    pub interface: String,
    pub queue: String,
    pub failure: String,
}

#[derive(Clone, Default)]
pub struct RecordingFailureLog {
    records: Arc<Mutex<Vec<FailureRecord>>>,
}

impl RecordingFailureLog {
    #[allow(dead_code)]
    pub fn records(&self) -> Vec<FailureRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl FailureLog for RecordingFailureLog {
    fn record(&self, failure: &DeliveryFailure, envelope: &Envelope, interface: &str) {
        self.records.lock().unwrap().push(FailureRecord {
            interface: interface.to_string(),
            queue: envelope.origin().to_string(),
            failure: failure.to_string(),
        });
    }
}

// ============================================================================
// Recording Callback
// ============================================================================

/// Delivery callback that records every delivered envelope and rejects text
/// bodies it has been told to fail
#[derive(Clone, Default)]
pub struct RecordingCallback {
    delivered: Arc<Mutex<Vec<Envelope>>>,
    rejected: Arc<Mutex<HashSet<String>>>,
}

impl RecordingCallback {
    #[allow(dead_code)]
    pub fn failing_on(bodies: &[&str]) -> Self {
        let callback = Self::default();
        callback
            .rejected
            .lock()
            .unwrap()
            .extend(bodies.iter().map(|b| b.to_string()));
        callback
    }

    #[allow(dead_code)]
    pub fn delivered(&self) -> Vec<Envelope> {
        self.delivered.lock().unwrap().clone()
    }

    /// Text of every delivered text body, in delivery order
    #[allow(dead_code)]
    pub fn delivered_texts(&self) -> Vec<String> {
        self.delivered()
            .into_iter()
            .filter_map(|envelope| match envelope.body {
                Body::Text(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl DeliveryCallback for RecordingCallback {
    async fn deliver(
        &self,
        envelope: &Envelope,
        _config: &InterfaceConfig,
    ) -> Result<(), HandlerError> {
        if let Body::Text(text) = &envelope.body {
            if self.rejected.lock().unwrap().contains(text) {
                return Err(format!("rejected '{}'", text).into());
            }
        }
        self.delivered.lock().unwrap().push(envelope.clone());
        Ok(())
    }
}

// ============================================================================
// Builders
// ============================================================================

/// Interface serving a single named queue from `backend`
#[allow(dead_code)]
pub fn named(queue: &str, backend: &str) -> InterfaceConfig {
    InterfaceConfig::new(QueueSelector::name(queue), backend)
}

/// Registry holding `interfaces` in the given order
#[allow(dead_code)]
pub fn registry_with(interfaces: Vec<(&str, InterfaceConfig)>) -> Arc<InterfaceRegistry> {
    let registry = Arc::new(InterfaceRegistry::new());
    for (name, config) in interfaces {
        registry.add_interface(name, config);
    }
    registry
}

/// Engine builder over a shared in-memory backend registered as `memory`
#[allow(dead_code)]
pub fn memory_engine(
    registry: Arc<InterfaceRegistry>,
    backend: &InMemoryBackend,
    log: &RecordingFailureLog,
) -> MessageQueueBuilder {
    MessageQueueBuilder::new()
        .registry(registry)
        .backend("memory", Arc::new(backend.clone()))
        .failure_log(Arc::new(log.clone()))
}

/// Decode everything stored for `queue` without consuming it
#[allow(dead_code)]
pub fn stored_texts(backend: &InMemoryBackend, queue: &str) -> Vec<String> {
    backend
        .peek(queue)
        .into_iter()
        .filter_map(|encoded| Encoding::Structured.decode(encoded).ok())
        .filter_map(|envelope| match envelope.body {
            Body::Text(text) => Some(text),
            _ => None,
        })
        .collect()
}
