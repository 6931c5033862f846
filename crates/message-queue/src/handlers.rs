//! User-supplied handlers referenced by name from interface configuration.
//!
//! Configuration stays plain data: a delivery callback or error callback is a
//! name, and an [`Invocation`](crate::message::Invocation) body names a task.
//! The engine looks names up in a [`Handlers`] registry at delivery time.

use crate::config::InterfaceConfig;
use crate::error::{DeliveryFailure, HandlerError};
use crate::message::Envelope;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

// ============================================================================
// Handler traits
// ============================================================================

/// Executes an invocation body
#[async_trait]
pub trait Task: Send + Sync {
    async fn execute(
        &self,
        args: &[Value],
        envelope: &Envelope,
        config: &InterfaceConfig,
    ) -> Result<(), HandlerError>;
}

/// Delivers a decoded message. Any error is a delivery failure.
#[async_trait]
pub trait DeliveryCallback: Send + Sync {
    async fn deliver(&self, envelope: &Envelope, config: &InterfaceConfig)
        -> Result<(), HandlerError>;
}

/// Reacts to a delivery failure as part of the error-action pipeline
#[async_trait]
pub trait ErrorCallback: Send + Sync {
    async fn handle(&self, failure: &DeliveryFailure, envelope: &Envelope)
        -> Result<(), HandlerError>;
}

/// Collaborator behind the `log` error action.
///
/// Recording is best effort and cannot fail the pipeline.
pub trait FailureLog: Send + Sync {
    fn record(&self, failure: &DeliveryFailure, envelope: &Envelope, interface: &str);
}

/// Emits each failure as a `tracing` error event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFailureLog;

impl FailureLog for TracingFailureLog {
    fn record(&self, failure: &DeliveryFailure, envelope: &Envelope, interface: &str) {
        error!(
            interface = %interface,
            queue = %envelope.origin(),
            body_kind = envelope.body.kind(),
            error = %failure,
            "Message delivery failed"
        );
    }
}

// ============================================================================
// Closure adapters
// ============================================================================

/// Task backed by an async closure over owned arguments
pub struct FnTask<F>(F);

/// Build a [`Task`] from a closure receiving the invocation arguments and the
/// envelope
pub fn task_fn<F, Fut>(f: F) -> FnTask<F>
where
    F: Fn(Vec<Value>, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnTask(f)
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
    F: Fn(Vec<Value>, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn execute(
        &self,
        args: &[Value],
        envelope: &Envelope,
        _config: &InterfaceConfig,
    ) -> Result<(), HandlerError> {
        (self.0)(args.to_vec(), envelope.clone()).await
    }
}

/// Delivery callback backed by an async closure
pub struct FnCallback<F>(F);

pub fn callback_fn<F, Fut>(f: F) -> FnCallback<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnCallback(f)
}

#[async_trait]
impl<F, Fut> DeliveryCallback for FnCallback<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn deliver(
        &self,
        envelope: &Envelope,
        _config: &InterfaceConfig,
    ) -> Result<(), HandlerError> {
        (self.0)(envelope.clone()).await
    }
}

/// Error callback backed by an async closure receiving the rendered failure
pub struct FnErrorCallback<F>(F);

pub fn error_callback_fn<F, Fut>(f: F) -> FnErrorCallback<F>
where
    F: Fn(String, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    FnErrorCallback(f)
}

#[async_trait]
impl<F, Fut> ErrorCallback for FnErrorCallback<F>
where
    F: Fn(String, Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(
        &self,
        failure: &DeliveryFailure,
        envelope: &Envelope,
    ) -> Result<(), HandlerError> {
        (self.0)(failure.to_string(), envelope.clone()).await
    }
}

// ============================================================================
// Handlers registry
// ============================================================================

/// Named tasks and callbacks available to the delivery engine
#[derive(Clone, Default)]
pub struct Handlers {
    tasks: HashMap<String, Arc<dyn Task>>,
    callbacks: HashMap<String, Arc<dyn DeliveryCallback>>,
    error_callbacks: HashMap<String, Arc<dyn ErrorCallback>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_task(&mut self, name: impl Into<String>, task: Arc<dyn Task>) -> &mut Self {
        self.tasks.insert(name.into(), task);
        self
    }

    pub fn register_callback(
        &mut self,
        name: impl Into<String>,
        callback: Arc<dyn DeliveryCallback>,
    ) -> &mut Self {
        self.callbacks.insert(name.into(), callback);
        self
    }

    pub fn register_error_callback(
        &mut self,
        name: impl Into<String>,
        callback: Arc<dyn ErrorCallback>,
    ) -> &mut Self {
        self.error_callbacks.insert(name.into(), callback);
        self
    }

    pub fn task(&self, name: &str) -> Option<Arc<dyn Task>> {
        self.tasks.get(name).cloned()
    }

    pub fn callback(&self, name: &str) -> Option<Arc<dyn DeliveryCallback>> {
        self.callbacks.get(name).cloned()
    }

    pub fn error_callback(&self, name: &str) -> Option<Arc<dyn ErrorCallback>> {
        self.error_callbacks.get(name).cloned()
    }
}

impl std::fmt::Debug for Handlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut tasks: Vec<_> = self.tasks.keys().collect();
        tasks.sort();
        let mut callbacks: Vec<_> = self.callbacks.keys().collect();
        callbacks.sort();
        let mut error_callbacks: Vec<_> = self.error_callbacks.keys().collect();
        error_callbacks.sort();

        f.debug_struct("Handlers")
            .field("tasks", &tasks)
            .field("callbacks", &callbacks)
            .field("error_callbacks", &error_callbacks)
            .finish()
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
