//! Deferred consumption bookkeeping.
//!
//! Sends whose interface asks for post-run processing register their queue
//! here. The first registration arms the dispatcher; later ones only add to the
//! pending set. [`ShutdownDispatcher::run`] fires once per process lifetime and
//! launches one consumption pass per distinct queue.

use crate::launcher::{ConsumerLauncher, ProcessRequest};
use crate::registry::InterfaceRegistry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
enum DispatchState {
    /// No qualifying send has happened yet
    #[default]
    Idle,
    /// Queues in first-registration order
    Armed(Vec<String>),
    /// The deferred pass has run; registrations are ignored
    Fired,
}

/// Summary of one deferred pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeferredReport {
    /// Queues handed to the launcher
    pub launched: Vec<String>,
    /// Queues that could not be launched, with the reason
    pub failed: Vec<(String, String)>,
}

impl DeferredReport {
    pub fn is_empty(&self) -> bool {
        self.launched.is_empty() && self.failed.is_empty()
    }
}

/// Tracks queues needing deferred consumption and fires their passes once
pub struct ShutdownDispatcher {
    state: Mutex<DispatchState>,
    launcher: Arc<dyn ConsumerLauncher>,
    enabled: bool,
}

impl ShutdownDispatcher {
    pub fn new(launcher: Arc<dyn ConsumerLauncher>, enabled: bool) -> Self {
        Self {
            state: Mutex::new(DispatchState::Idle),
            launcher,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record that `queue` needs a deferred pass.
    ///
    /// Returns `true` if the queue was newly added.
    pub fn register_interest(&self, queue: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let mut state = self.lock();
        match &mut *state {
            DispatchState::Idle => {
                info!(queue = %queue, "Armed deferred consumption");
                *state = DispatchState::Armed(vec![queue.to_string()]);
                true
            }
            DispatchState::Armed(queues) => {
                if queues.iter().any(|existing| existing == queue) {
                    false
                } else {
                    debug!(queue = %queue, "Registered deferred consumption");
                    queues.push(queue.to_string());
                    true
                }
            }
            DispatchState::Fired => {
                debug!(queue = %queue, "Deferred pass already ran, ignoring registration");
                false
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(*self.lock(), DispatchState::Armed(_))
    }

    /// Queues currently waiting for the deferred pass
    pub fn pending_queues(&self) -> Vec<String> {
        match &*self.lock() {
            DispatchState::Armed(queues) => queues.clone(),
            DispatchState::Idle | DispatchState::Fired => Vec::new(),
        }
    }

    /// Launch one pass per pending queue and mark the dispatcher as fired.
    ///
    /// Each queue's actions come from its interface's `on_shutdown` policy.
    /// Launch failures are logged and reported; they never abort the
    /// remaining launches.
    pub fn run(&self, registry: &InterfaceRegistry) -> DeferredReport {
        let queues = self.take_pending();
        let mut report = DeferredReport::default();

        for queue in queues {
            let actions = match registry.resolve(&queue) {
                Ok(resolved) => match resolved.config.deferred_actions() {
                    Some(actions) => actions,
                    None => {
                        debug!(queue = %queue, "Interface no longer requests deferred consumption");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(queue = %queue, error = %e, "Cannot resolve deferred queue");
                    report.failed.push((queue, e.to_string()));
                    continue;
                }
            };

            match self.launcher.launch(ProcessRequest::new(queue.clone(), actions)) {
                Ok(()) => report.launched.push(queue),
                Err(e) => {
                    warn!(queue = %queue, error = %e, "Failed to launch deferred consumer");
                    report.failed.push((queue, e.to_string()));
                }
            }
        }

        if !report.is_empty() {
            info!(
                launched = report.launched.len(),
                failed = report.failed.len(),
                "Deferred consumption dispatched"
            );
        }
        report
    }

    /// Signal the launcher that no more passes will follow
    pub fn finish(&self) {
        self.launcher.finish();
    }

    fn take_pending(&self) -> Vec<String> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, DispatchState::Fired) {
            DispatchState::Armed(queues) => queues,
            DispatchState::Idle | DispatchState::Fired => Vec::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ShutdownDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownDispatcher")
            .field("state", &*self.lock())
            .field("enabled", &self.enabled)
            .finish()
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
