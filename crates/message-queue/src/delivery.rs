//! Delivery strategies and the error-action pipeline.
//!
//! Strategy precedence for a decoded envelope:
//!
//! 1. `requeue` with `immediate: true`: deliver again right away using the
//!    target queue's interface.
//! 2. `requeue` without `immediate`: send the message to the target queue.
//!    Failures here propagate to the caller and skip the pipeline.
//! 3. `callback`: call the named delivery callback.
//! 4. An invocation body: run the named task.
//! 5. Otherwise the message has no delivery strategy.
//!
//! A [`DeliveryFailure`] from any other step runs every entry of the
//! interface's `on_error` pipeline in order. A received message that cannot
//! be decoded runs the same pipeline in its stored form, and a `requeue`
//! puts it back without re-encoding.

use crate::config::ErrorActionEntry;
use crate::engine::MessageQueue;
use crate::error::{ConfigurationError, DeliveryFailure, QueueError};
use crate::message::Envelope;
use crate::registry::ResolvedInterface;
use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

/// Outcome of a failed delivery attempt
enum AttemptError {
    /// Handled by the error pipeline
    Failed(DeliveryFailure),
    /// Returned to the caller untouched
    Fatal(QueueError),
}

impl From<DeliveryFailure> for AttemptError {
    fn from(failure: DeliveryFailure) -> Self {
        Self::Failed(failure)
    }
}

/// Form of the message handed to the error pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessageForm {
    Decoded,
    /// As received from the backend, still encoded
    Stored,
}

/// One parsed pipeline entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorAction<'a> {
    Drop,
    Log,
    Requeue(Option<&'a str>),
    Callback(&'a str),
}

impl<'a> ErrorAction<'a> {
    fn parse(entry: &'a ErrorActionEntry) -> Result<Self, ConfigurationError> {
        let argument = entry.argument.as_deref();
        match entry.action.as_str() {
            "drop" => Ok(Self::Drop),
            "log" => Ok(Self::Log),
            "requeue" => Ok(Self::Requeue(argument)),
            "callback" => argument
                .map(Self::Callback)
                .ok_or_else(|| ConfigurationError::MissingArgument {
                    action: "callback".to_string(),
                }),
            other => Err(ConfigurationError::UnknownAction {
                action: other.to_string(),
            }),
        }
    }
}

impl MessageQueue {
    /// Deliver a decoded envelope under `interface`, running its error
    /// pipeline on failure.
    ///
    /// Returns an error only for configuration problems, backend failures on
    /// a relocating requeue, and failures raised while handling a failure.
    pub fn deliver<'a>(
        &'a self,
        envelope: Envelope,
        interface: &'a ResolvedInterface,
    ) -> BoxFuture<'a, Result<(), QueueError>> {
        async move {
            match self.attempt(&envelope, interface).await {
                Ok(()) => Ok(()),
                Err(AttemptError::Fatal(e)) => Err(e),
                Err(AttemptError::Failed(failure)) => {
                    self.handle_failure(failure, envelope, MessageForm::Decoded, interface)
                        .await
                }
            }
        }
        .boxed()
    }

    /// Decode a message received under `interface`.
    ///
    /// A message that cannot be decoded is handed to the error pipeline in
    /// its stored form and `None` is returned.
    pub(crate) async fn decode_received(
        &self,
        stored: Envelope,
        interface: &ResolvedInterface,
    ) -> Result<Option<Envelope>, QueueError> {
        let fallback = stored.clone();
        match interface.config.encoding.decode(stored) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(source) => {
                let failure = DeliveryFailure::Undecodable {
                    queue: fallback.origin().to_string(),
                    source,
                };
                self.handle_failure(failure, fallback, MessageForm::Stored, interface)
                    .await?;
                Ok(None)
            }
        }
    }

    async fn attempt(
        &self,
        envelope: &Envelope,
        interface: &ResolvedInterface,
    ) -> Result<(), AttemptError> {
        let config = &interface.config;
        let policy = &config.delivery;

        if let Some(target) = &policy.requeue {
            if target.immediate {
                let target_interface = self.registry.resolve(&target.queue).map_err(|source| {
                    DeliveryFailure::RequeueTarget {
                        queue: target.queue.clone(),
                        source,
                    }
                })?;
                debug!(
                    queue = %envelope.origin(),
                    target = %target.queue,
                    "Delivering immediately through requeue target"
                );
                return self
                    .deliver(envelope.clone(), &target_interface)
                    .await
                    .map_err(AttemptError::Fatal);
            }

            debug!(queue = %envelope.origin(), target = %target.queue, "Requeueing message");
            return self
                .dispatch_send(target.queue.clone(), envelope.resend_copy(), true)
                .await
                .map_err(AttemptError::Fatal);
        }

        if let Some(name) = &policy.callback {
            let callback = self.handlers.callback(name).ok_or_else(|| {
                AttemptError::Fatal(
                    ConfigurationError::UnknownHandler {
                        kind: "callback",
                        name: name.clone(),
                    }
                    .into(),
                )
            })?;
            callback
                .deliver(envelope, config)
                .await
                .map_err(|source| DeliveryFailure::Callback {
                    handler: name.clone(),
                    source,
                })?;
            return Ok(());
        }

        if let Some(invocation) = envelope.body.as_invocation() {
            let task = self
                .handlers
                .task(&invocation.task)
                .ok_or_else(|| DeliveryFailure::UnknownTask {
                    task: invocation.task.clone(),
                })?;
            task.execute(&invocation.args, envelope, config)
                .await
                .map_err(|source| DeliveryFailure::Task {
                    task: invocation.task.clone(),
                    source,
                })?;
            return Ok(());
        }

        Err(DeliveryFailure::NoDeliveryStrategy {
            queue: envelope.origin().to_string(),
        }
        .into())
    }

    /// Run the `on_error` pipeline for one failure.
    ///
    /// The whole pipeline is parsed before any action runs, so a bad entry
    /// aborts without partial effects.
    async fn handle_failure(
        &self,
        failure: DeliveryFailure,
        envelope: Envelope,
        form: MessageForm,
        interface: &ResolvedInterface,
    ) -> Result<(), QueueError> {
        warn!(
            queue = %envelope.origin(),
            interface = %interface.name,
            error = %failure,
            "Delivery failed, running error actions"
        );

        let entries = interface.config.delivery.error_actions();
        let actions = entries
            .iter()
            .map(ErrorAction::parse)
            .collect::<Result<Vec<_>, _>>()?;

        for action in actions {
            match action {
                ErrorAction::Drop => {
                    debug!(queue = %envelope.origin(), "Dropping failed message");
                }
                ErrorAction::Log => {
                    self.failure_log.record(&failure, &envelope, &interface.name);
                }
                ErrorAction::Requeue(target) => {
                    let target = match (target, &envelope.queue) {
                        (Some(target), _) => target.to_string(),
                        (None, Some(origin)) => origin.to_string(),
                        (None, None) => {
                            return Err(ConfigurationError::MissingArgument {
                                action: "requeue".to_string(),
                            }
                            .into())
                        }
                    };
                    debug!(queue = %envelope.origin(), target = %target, "Requeueing failed message");
                    match form {
                        MessageForm::Decoded => {
                            self.dispatch_send(target, envelope.resend_copy(), true)
                                .await?
                        }
                        MessageForm::Stored => {
                            self.store_encoded(&target, envelope.resend_copy()).await?
                        }
                    }
                }
                ErrorAction::Callback(name) => {
                    let callback = self.handlers.error_callback(name).ok_or_else(|| {
                        ConfigurationError::UnknownHandler {
                            kind: "error_callback",
                            name: name.to_string(),
                        }
                    })?;
                    callback.handle(&failure, &envelope).await.map_err(|source| {
                        DeliveryFailure::ErrorCallback {
                            handler: name.to_string(),
                            source,
                        }
                    })?;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
