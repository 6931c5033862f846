//! # Message Queue
//!
//! Pluggable message queueing: named interfaces route queue names to a
//! backend, a body encoding and a delivery policy.
//!
//! This library provides:
//! - Ordered, first-match routing of queue names to interfaces
//! - Structured (JSON) and raw body encodings
//! - Send buffering with explicit flush
//! - Delivery through callbacks, executable invocation bodies or requeueing
//! - An ordered error-action pipeline (`drop`, `log`, `requeue`, `callback`)
//! - Deferred consumption of queues that received traffic, run once at
//!   process end through a pluggable launcher
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Queue names, bodies and envelopes
//! - [`codec`] - Body encodings
//! - [`config`] - Interface configuration
//! - [`registry`] - Interface registry and routing
//! - [`backend`] / [`backends`] - Backend contract and reference backends
//! - [`handlers`] - Named tasks, callbacks and the failure log
//! - [`engine`] - The [`MessageQueue`] engine and its builder
//! - [`delivery`] - Delivery strategies and the error pipeline
//! - [`buffering`] - Buffer flushing
//! - [`dispatcher`] / [`launcher`] - Deferred consumption
//! - [`settings`] - File and environment settings

pub mod backend;
pub mod backends;
pub mod buffering;
pub mod codec;
pub mod config;
pub mod delivery;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod launcher;
pub mod message;
pub mod registry;
pub mod settings;

pub use backend::{Backend, BackendKind, BackendRegistry};
pub use backends::{FileSystemBackend, InMemoryBackend, RelayBackend, RelayConfig, RelayFrame};
pub use codec::Encoding;
pub use config::{
    DeliveryPolicy, ErrorActionEntry, InterfaceConfig, QueueSelector, RequeueTarget, SendPolicy,
    ShutdownActions,
};
pub use dispatcher::{DeferredReport, ShutdownDispatcher};
pub use engine::{MessageQueue, MessageQueueBuilder, ProcessOutcome};
pub use error::{
    BackendError, ConfigurationError, DeliveryFailure, HandlerError, LaunchError, QueueError,
    SerializationError, ValidationError,
};
pub use handlers::{
    callback_fn, error_callback_fn, task_fn, DeliveryCallback, ErrorCallback, FailureLog,
    Handlers, Task, TracingFailureLog,
};
pub use launcher::{CommandLauncher, ConsumerLauncher, DeferredWorker, ProcessRequest, WorkerLauncher};
pub use message::{Body, Envelope, Header, Invocation, QueueName, ReceiveOptions};
pub use registry::{InterfaceRegistry, ResolvedInterface};
pub use settings::MessageQueueSettings;
