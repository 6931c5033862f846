//! Launch strategies for deferred consumption passes.
//!
//! The dispatcher hands each queue that needs post-run processing to a
//! [`ConsumerLauncher`] and does not wait for the outcome. Two strategies are
//! provided:
//!
//! - [`WorkerLauncher`] queues the request for a [`DeferredWorker`] task in the
//!   same process.
//! - [`CommandLauncher`] spawns a detached `msgq process` style command.

use crate::config::ShutdownActions;
use crate::engine::MessageQueue;
use crate::error::LaunchError;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// One deferred consumption pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub queue: String,
    pub actions: ShutdownActions,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ProcessRequest {
    pub fn new(queue: impl Into<String>, actions: ShutdownActions) -> Self {
        Self {
            queue: queue.into(),
            actions,
            limit: None,
        }
    }

    /// Command-line arguments for the `process` entry point
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "process".to_string(),
            "--queue".to_string(),
            self.queue.clone(),
            "--actions".to_string(),
            self.actions.to_string(),
        ];
        if let Some(limit) = self.limit {
            args.push("--limit".to_string());
            args.push(limit.to_string());
        }
        args
    }
}

/// Starts deferred consumption passes without waiting for them
pub trait ConsumerLauncher: Send + Sync {
    fn launch(&self, request: ProcessRequest) -> Result<(), LaunchError>;

    /// Called once after the final deferred pass has been launched
    fn finish(&self) {}
}

/// Launcher used when deferred consumption has no configured strategy
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledLauncher;

impl ConsumerLauncher for DisabledLauncher {
    fn launch(&self, _request: ProcessRequest) -> Result<(), LaunchError> {
        Err(LaunchError::NotConfigured)
    }
}

// ============================================================================
// In-process worker
// ============================================================================

/// Sending half of the deferred worker channel
#[derive(Debug)]
pub struct WorkerLauncher {
    sender: Mutex<Option<mpsc::UnboundedSender<ProcessRequest>>>,
}

/// Receiving half: runs queued passes against an engine
#[derive(Debug)]
pub struct DeferredWorker {
    receiver: mpsc::UnboundedReceiver<ProcessRequest>,
}

/// Create a connected launcher/worker pair
pub fn channel() -> (WorkerLauncher, DeferredWorker) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (
        WorkerLauncher {
            sender: Mutex::new(Some(sender)),
        },
        DeferredWorker { receiver },
    )
}

impl ConsumerLauncher for WorkerLauncher {
    fn launch(&self, request: ProcessRequest) -> Result<(), LaunchError> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = sender.as_ref().ok_or(LaunchError::WorkerStopped)?;
        sender
            .send(request)
            .map_err(|_| LaunchError::WorkerStopped)
    }

    fn finish(&self) {
        // Dropping the sender lets the worker drain and exit
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl DeferredWorker {
    /// Process requests until the launcher finishes. Returns the number of
    /// passes that completed without error.
    pub async fn run(mut self, queue: Arc<MessageQueue>) -> usize {
        let mut completed = 0;

        while let Some(request) = self.receiver.recv().await {
            match queue
                .process(&request.queue, request.actions, request.limit)
                .await
            {
                Ok(outcome) => {
                    info!(
                        queue = %request.queue,
                        actions = %request.actions,
                        outcome = ?outcome,
                        "Deferred pass finished"
                    );
                    completed += 1;
                }
                Err(e) => {
                    warn!(
                        queue = %request.queue,
                        actions = %request.actions,
                        error = %e,
                        "Deferred pass failed"
                    );
                }
            }
        }

        debug!(completed, "Deferred worker stopped");
        completed
    }

    pub fn spawn(self, queue: Arc<MessageQueue>) -> JoinHandle<usize> {
        tokio::spawn(self.run(queue))
    }
}

// ============================================================================
// Detached command
// ============================================================================

/// Spawns `program [args..] process --queue <q> --actions <a>` detached.
///
/// With a debug path, the child's stdout and stderr are appended to
/// `msgq.stdout` and `msgq.stderr` in that directory; otherwise both are
/// discarded.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
    debug_path: Option<PathBuf>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            debug_path: None,
        }
    }

    /// Arguments placed before the `process` subcommand
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_debug_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    /// Full argument list for `request`
    pub fn command_args(&self, request: &ProcessRequest) -> Vec<String> {
        let mut args = self.args.clone();
        args.extend(request.to_args());
        args
    }

    fn output(&self, file_name: &str) -> Result<Stdio, LaunchError> {
        let Some(dir) = &self.debug_path else {
            return Ok(Stdio::null());
        };

        let path = dir.join(file_name);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LaunchError::Output {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Stdio::from(file))
    }
}

impl ConsumerLauncher for CommandLauncher {
    fn launch(&self, request: ProcessRequest) -> Result<(), LaunchError> {
        let args = self.command_args(&request);

        let mut cmd = Command::new(&self.program);
        cmd.args(&args);
        cmd.stdin(Stdio::null());
        cmd.stdout(self.output("msgq.stdout")?);
        cmd.stderr(self.output("msgq.stderr")?);

        let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        info!(
            program = %self.program,
            queue = %request.queue,
            pid = ?child.id(),
            "Launched deferred consumer"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "launcher_tests.rs"]
mod tests;
