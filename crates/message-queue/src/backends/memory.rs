//! In-memory backend for tests, development and single-process deployments.
//!
//! All queues share one insertion-ordered store guarded by a mutex. Receive
//! removes the messages it returns while holding the lock, so concurrent
//! receivers never see the same message.

use crate::backend::{Backend, BackendKind};
use crate::config::InterfaceConfig;
use crate::error::BackendError;
use crate::message::{Envelope, QueueName, ReceiveOptions};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// A message held by the store
struct StoredMessage {
    queue: QueueName,
    envelope: Envelope,
}

/// Mutex-guarded in-memory backend.
///
/// Cloning shares the underlying store.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    storage: Arc<Mutex<Vec<StoredMessage>>>,
    max_messages: Option<usize>,
}

impl InMemoryBackend {
    /// Create an empty, unbounded backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject sends once `max_messages` are stored
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = Some(max_messages);
        self
    }

    /// Number of messages stored on `queue`
    pub fn len(&self, queue: &str) -> usize {
        self.lock()
            .iter()
            .filter(|stored| stored.queue.as_str() == queue)
            .count()
    }

    /// Number of messages stored across all queues
    pub fn total(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copies of the encoded envelopes on `queue`, without receiving them
    pub fn peek(&self, queue: &str) -> Vec<Envelope> {
        self.lock()
            .iter()
            .filter(|stored| stored.queue.as_str() == queue)
            .map(|stored| stored.envelope.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredMessage>> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn send(
        &self,
        queue: &QueueName,
        mut envelope: Envelope,
        _config: &InterfaceConfig,
    ) -> Result<(), BackendError> {
        let mut storage = self.lock();

        if let Some(max) = self.max_messages {
            if storage.len() >= max {
                return Err(BackendError::Unavailable {
                    backend: "memory".to_string(),
                    message: format!("store is full ({} messages)", max),
                });
            }
        }

        envelope.queue = None;
        storage.push(StoredMessage {
            queue: queue.clone(),
            envelope,
        });

        debug!(queue = %queue, stored = storage.len(), "Stored message in memory");
        Ok(())
    }

    async fn receive(
        &self,
        queue: Option<&QueueName>,
        config: &InterfaceConfig,
        options: &ReceiveOptions,
    ) -> Result<Vec<Envelope>, BackendError> {
        let mut storage = self.lock();
        let mut received = Vec::new();
        let mut index = 0;

        while index < storage.len() && !options.is_satisfied(received.len()) {
            let wanted = match queue {
                Some(queue) => storage[index].queue == *queue,
                None => config.queues.matches(storage[index].queue.as_str()),
            };

            if wanted {
                let stored = storage.remove(index);
                received.push(stored.envelope.with_queue(stored.queue));
            } else {
                index += 1;
            }
        }

        debug!(
            queue = queue.map(QueueName::as_str).unwrap_or("*"),
            count = received.len(),
            "Received messages from memory"
        );
        Ok(received)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::InMemory
    }
}
