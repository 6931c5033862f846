//! The message queue engine.
//!
//! [`MessageQueue`] ties the interface registry, backends, handlers and the
//! deferred dispatcher together. The send path is
//! `resolve -> (buffer redirect) -> encode -> backend`; the consume path is
//! `backend -> decode -> deliver`, with delivery and its error pipeline living
//! in [`crate::delivery`] and buffer flushing in [`crate::buffering`].

use crate::backend::BackendRegistry;
use crate::backends::{InMemoryBackend, RelayFrame};
use crate::config::{InterfaceConfig, ShutdownActions};
use crate::dispatcher::{DeferredReport, ShutdownDispatcher};
use crate::error::{ConfigurationError, QueueError, SerializationError};
use crate::handlers::{DeliveryCallback, ErrorCallback, FailureLog, Handlers, Task, TracingFailureLog};
use crate::launcher::{channel, ConsumerLauncher, DisabledLauncher};
use crate::message::{Envelope, Header, QueueName, ReceiveOptions};
use crate::registry::{InterfaceRegistry, ResolvedInterface};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

/// Result of a `process` pass over one queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed { flushed: usize, consumed: usize },
    /// Consumption was requested and the queue was empty
    NoMessages,
}

// ============================================================================
// MessageQueue
// ============================================================================

/// Routing, encoding and delivery engine.
///
/// # Examples
///
/// ```rust
/// use message_queue::config::{InterfaceConfig, QueueSelector};
/// use message_queue::handlers::callback_fn;
/// use message_queue::MessageQueue;
/// use message_queue::registry::InterfaceRegistry;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), message_queue::QueueError> {
/// let registry = Arc::new(InterfaceRegistry::new());
/// registry.add_interface(
///     "orders",
///     InterfaceConfig::new(QueueSelector::name("orders"), "memory").with_callback("print"),
/// );
///
/// let queue = MessageQueue::builder()
///     .registry(registry)
///     .callback("print", callback_fn(|envelope| async move {
///         println!("{:?}", envelope.body);
///         Ok(())
///     }))
///     .build()?;
///
/// queue.send("orders", "hello").await?;
/// assert_eq!(queue.consume("orders", &Default::default()).await?, 1);
/// # Ok(())
/// # }
/// ```
pub struct MessageQueue {
    pub(crate) registry: Arc<InterfaceRegistry>,
    pub(crate) backends: BackendRegistry,
    pub(crate) handlers: Handlers,
    pub(crate) failure_log: Arc<dyn FailureLog>,
    pub(crate) dispatcher: ShutdownDispatcher,
    pub(crate) force_immediate_delivery: bool,
}

impl MessageQueue {
    pub fn builder() -> MessageQueueBuilder {
        MessageQueueBuilder::new()
    }

    pub fn registry(&self) -> &Arc<InterfaceRegistry> {
        &self.registry
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    pub fn dispatcher(&self) -> &ShutdownDispatcher {
        &self.dispatcher
    }

    // ------------------------------------------------------------------------
    // Configuration surface
    // ------------------------------------------------------------------------

    pub fn add_interface(&self, name: impl Into<String>, config: InterfaceConfig) {
        self.registry.add_interface(name, config);
    }

    pub fn remove_interface(&self, name: &str) -> Option<Arc<InterfaceConfig>> {
        self.registry.remove_interface(name)
    }

    pub fn get_interfaces(&self) -> Vec<(String, Arc<InterfaceConfig>)> {
        self.registry.get_interfaces()
    }

    pub fn interface_name_for(&self, queue: &str) -> Option<String> {
        self.registry.interface_name_for(queue)
    }

    // ------------------------------------------------------------------------
    // Send
    // ------------------------------------------------------------------------

    /// Send a message, honoring the interface's buffer
    pub async fn send(&self, queue: &str, message: impl Into<Envelope>) -> Result<(), QueueError> {
        self.dispatch_send(queue.to_string(), message.into(), true)
            .await
    }

    /// Send a message with extra header entries.
    ///
    /// Entries are merged into any header the message already carries,
    /// overwriting existing keys.
    pub async fn send_with_header(
        &self,
        queue: &str,
        message: impl Into<Envelope>,
        header: Header,
    ) -> Result<(), QueueError> {
        let mut envelope = message.into();
        envelope.merge_header(header);
        self.dispatch_send(queue.to_string(), envelope, true).await
    }

    /// Send a message straight to `queue`, bypassing any buffer
    pub async fn send_unbuffered(
        &self,
        queue: &str,
        message: impl Into<Envelope>,
    ) -> Result<(), QueueError> {
        self.dispatch_send(queue.to_string(), message.into(), false)
            .await
    }

    /// Shared send path. Boxed because delivery can send and sending can
    /// deliver.
    pub(crate) fn dispatch_send(
        &self,
        queue: String,
        envelope: Envelope,
        use_buffer: bool,
    ) -> BoxFuture<'_, Result<(), QueueError>> {
        async move {
            let mut resolved = self.registry.resolve(&queue)?;
            let mut target = queue;

            if use_buffer {
                if let Some(buffer) = resolved.config.send.buffer.clone() {
                    debug!(queue = %target, buffer = %buffer, "Redirecting send to buffer");
                    resolved = self.registry.resolve(&buffer)?;
                    target = buffer;
                }
            }

            // Deferred bookkeeping follows the interface that performs the
            // backend send, so a buffered send never records the original queue
            let deferred = resolved.config.deferred_actions().is_some();
            let queue_name = QueueName::new(target)?;
            let encoded = resolved.config.encoding.encode(envelope)?;

            if self.force_immediate_delivery {
                let decoded = resolved
                    .config
                    .encoding
                    .decode(encoded)?
                    .with_queue(queue_name);
                return self.deliver(decoded, &resolved).await;
            }

            let backend = self.backends.require(&resolved.backend)?;
            backend.send(&queue_name, encoded, &resolved.config).await?;

            debug!(
                queue = %queue_name,
                interface = %resolved.name,
                backend = %resolved.backend,
                "Sent message"
            );

            if deferred {
                self.dispatcher.register_interest(queue_name.as_str());
            }
            Ok(())
        }
        .boxed()
    }

    // ------------------------------------------------------------------------
    // Receive
    // ------------------------------------------------------------------------

    /// Receive and decode messages without delivering them.
    ///
    /// With no queue name the default (first registered) interface is read
    /// across all of its queues. Messages that cannot be decoded go through
    /// the error pipeline and are left out of the result.
    pub async fn get_messages(
        &self,
        queue: Option<&str>,
        options: &ReceiveOptions,
    ) -> Result<Vec<Envelope>, QueueError> {
        let (resolved, queue_name) = match queue {
            Some(queue) => (self.registry.resolve(queue)?, Some(QueueName::new(queue)?)),
            None => (self.registry.resolve_default()?, None),
        };

        let encoded = self
            .receive_encoded(&resolved, queue_name.as_ref(), options)
            .await?;

        let mut messages = Vec::with_capacity(encoded.len());
        for stored in encoded {
            if let Some(envelope) = self.decode_received(stored, &resolved).await? {
                messages.push(envelope);
            }
        }
        Ok(messages)
    }

    /// Receive, decode and deliver messages from `queue`.
    ///
    /// Returns the number of messages received. Messages that cannot be
    /// decoded go through the error pipeline instead of delivery.
    #[instrument(skip(self, options))]
    pub async fn consume(&self, queue: &str, options: &ReceiveOptions) -> Result<usize, QueueError> {
        let resolved = self.registry.resolve(queue)?;
        let queue_name = QueueName::new(queue)?;

        let encoded = self
            .receive_encoded(&resolved, Some(&queue_name), options)
            .await?;
        let received = encoded.len();

        for stored in encoded {
            if let Some(envelope) = self.decode_received(stored, &resolved).await? {
                self.deliver(envelope, &resolved).await?;
            }
        }

        info!(queue = %queue_name, count = received, "Consumed messages");
        Ok(received)
    }

    /// Consume across every queue owned by the named interface
    #[instrument(skip(self, options))]
    pub async fn consume_all_queues(
        &self,
        interface: &str,
        options: &ReceiveOptions,
    ) -> Result<usize, QueueError> {
        let resolved = self.registry.resolve_named(interface)?;

        let encoded = self.receive_encoded(&resolved, None, options).await?;
        let received = encoded.len();

        for stored in encoded {
            if let Some(envelope) = self.decode_received(stored, &resolved).await? {
                self.deliver(envelope, &resolved).await?;
            }
        }

        info!(interface = %interface, count = received, "Consumed messages from all queues");
        Ok(received)
    }

    /// Put an already encoded message on `queue` as is.
    ///
    /// Used for messages that failed to decode, so no buffer or encoding
    /// applies.
    pub(crate) async fn store_encoded(
        &self,
        queue: &str,
        envelope: Envelope,
    ) -> Result<(), QueueError> {
        let resolved = self.registry.resolve(queue)?;
        let queue_name = QueueName::new(queue)?;
        let backend = self.backends.require(&resolved.backend)?;
        backend.send(&queue_name, envelope, &resolved.config).await?;

        debug!(queue = %queue_name, interface = %resolved.name, "Stored encoded message");

        if resolved.config.deferred_actions().is_some() {
            self.dispatcher.register_interest(queue_name.as_str());
        }
        Ok(())
    }

    async fn receive_encoded(
        &self,
        resolved: &ResolvedInterface,
        queue: Option<&QueueName>,
        options: &ReceiveOptions,
    ) -> Result<Vec<Envelope>, QueueError> {
        let backend = self.backends.require(&resolved.backend)?;
        let encoded = backend.receive(queue, &resolved.config, options).await?;
        debug!(
            interface = %resolved.name,
            queue = queue.map(QueueName::as_str).unwrap_or("*"),
            count = encoded.len(),
            "Received messages"
        );
        Ok(encoded)
    }

    // ------------------------------------------------------------------------
    // Processing entry points
    // ------------------------------------------------------------------------

    /// Flush and/or consume `queue`, as requested by a deferred pass
    pub async fn process(
        &self,
        queue: &str,
        actions: ShutdownActions,
        limit: Option<usize>,
    ) -> Result<ProcessOutcome, QueueError> {
        let flushed = if actions.flush {
            self.flush(queue).await?
        } else {
            0
        };

        if !actions.consume {
            return Ok(ProcessOutcome::Processed {
                flushed,
                consumed: 0,
            });
        }

        let options = ReceiveOptions { limit };
        match self.consume(queue, &options).await? {
            0 => Ok(ProcessOutcome::NoMessages),
            consumed => Ok(ProcessOutcome::Processed { flushed, consumed }),
        }
    }

    /// Deliver a message forwarded by a [`RelayBackend`](crate::backends::RelayBackend)
    pub async fn accept_relayed(&self, raw: &[u8]) -> Result<(), QueueError> {
        let frame: RelayFrame =
            serde_json::from_slice(raw).map_err(SerializationError::JsonError)?;
        let resolved = self.registry.resolve(frame.queue.as_str())?;

        let envelope = resolved
            .config
            .encoding
            .decode(frame.envelope)?
            .with_queue(frame.queue);

        debug!(queue = %envelope.origin(), interface = %resolved.name, "Accepted relayed message");
        self.deliver(envelope, &resolved).await
    }

    /// Launch the deferred consumption passes registered during this run
    pub fn run_deferred(&self) -> DeferredReport {
        self.dispatcher.run(&self.registry)
    }

    /// Process-end hook: run the deferred pass, then release the launcher
    pub fn shutdown(&self) -> DeferredReport {
        let report = self.run_deferred();
        self.dispatcher.finish();
        report
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("interfaces", &self.registry.len())
            .field("backends", &self.backends)
            .field("handlers", &self.handlers)
            .field("dispatcher", &self.dispatcher)
            .field("force_immediate_delivery", &self.force_immediate_delivery)
            .finish()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles a [`MessageQueue`]
pub struct MessageQueueBuilder {
    registry: Option<Arc<InterfaceRegistry>>,
    backends: BackendRegistry,
    handlers: Handlers,
    failure_log: Arc<dyn FailureLog>,
    launcher: Option<Arc<dyn ConsumerLauncher>>,
    deferred_enabled: bool,
    force_immediate_delivery: bool,
}

impl MessageQueueBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            backends: BackendRegistry::new(),
            handlers: Handlers::new(),
            failure_log: Arc::new(TracingFailureLog),
            launcher: None,
            deferred_enabled: true,
            force_immediate_delivery: false,
        }
    }

    /// Use an existing registry. Without one the engine starts from the
    /// built-in `default` interface and an in-memory `memory` backend.
    pub fn registry(mut self, registry: Arc<InterfaceRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn backend(mut self, id: impl Into<String>, backend: Arc<dyn crate::backend::Backend>) -> Self {
        self.backends.register(id, backend);
        self
    }

    pub fn task(mut self, name: impl Into<String>, task: impl Task + 'static) -> Self {
        self.handlers.register_task(name, Arc::new(task));
        self
    }

    pub fn callback(
        mut self,
        name: impl Into<String>,
        callback: impl DeliveryCallback + 'static,
    ) -> Self {
        self.handlers.register_callback(name, Arc::new(callback));
        self
    }

    pub fn error_callback(
        mut self,
        name: impl Into<String>,
        callback: impl ErrorCallback + 'static,
    ) -> Self {
        self.handlers.register_error_callback(name, Arc::new(callback));
        self
    }

    pub fn handlers(mut self, handlers: Handlers) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn failure_log(mut self, failure_log: Arc<dyn FailureLog>) -> Self {
        self.failure_log = failure_log;
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn ConsumerLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }

    pub fn deferred_enabled(mut self, enabled: bool) -> Self {
        self.deferred_enabled = enabled;
        self
    }

    /// Deliver every send in-process instead of storing it
    pub fn force_immediate_delivery(mut self, force: bool) -> Self {
        self.force_immediate_delivery = force;
        self
    }

    pub fn build(mut self) -> Result<MessageQueue, ConfigurationError> {
        let registry = match self.registry.take() {
            Some(registry) => registry,
            None => {
                if !self.backends.contains("memory") {
                    self.backends
                        .register("memory", Arc::new(InMemoryBackend::new()));
                }
                Arc::new(InterfaceRegistry::with_defaults()?)
            }
        };

        let launcher = self
            .launcher
            .take()
            .unwrap_or_else(|| Arc::new(DisabledLauncher));

        Ok(MessageQueue {
            registry,
            backends: self.backends,
            handlers: self.handlers,
            failure_log: self.failure_log,
            dispatcher: ShutdownDispatcher::new(launcher, self.deferred_enabled),
            force_immediate_delivery: self.force_immediate_delivery,
        })
    }

    /// Build a shared engine whose deferred passes run on an in-process
    /// worker task. Must be called within a Tokio runtime.
    ///
    /// The worker exits after [`MessageQueue::shutdown`]; await the handle to
    /// wait for the final passes.
    pub fn build_with_worker(
        mut self,
    ) -> Result<(Arc<MessageQueue>, JoinHandle<usize>), ConfigurationError> {
        let (launcher, worker) = channel();
        self.launcher = Some(Arc::new(launcher));

        let queue = Arc::new(self.build()?);
        let handle = worker.spawn(Arc::clone(&queue));
        Ok((queue, handle))
    }
}

impl Default for MessageQueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
