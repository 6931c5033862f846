//! Engine settings loaded from files and the environment.
//!
//! Sources, applied in order (later sources override earlier ones):
//!
//! 1. An optional settings file (YAML, TOML or JSON, chosen by extension).
//! 2. Environment variables prefixed `MSGQ__`, with `__` separating nested
//!    keys, e.g. `MSGQ__DEFERRED__ENABLED=false`.
//!
//! ```yaml
//! force_immediate_delivery: false
//! deferred:
//!   launcher: command
//!   command:
//!     program: msgq
//!   debug_path: /var/log/msgq
//! backends:
//!   - id: files
//!     kind: filesystem
//!     path: /var/spool/msgq
//! interfaces:
//!   - name: orders
//!     queues: /^orders-/
//!     backend: files
//!     delivery:
//!       callback: orders
//!       on_error: [log, requeue]
//! ```

use crate::backend::Backend;
use crate::backends::{BasicAuth, FileSystemBackend, InMemoryBackend, RelayBackend, RelayConfig};
use crate::config::{default_interfaces, InterfaceConfig};
use crate::engine::MessageQueueBuilder;
use crate::error::{ConfigurationError, QueueError};
use crate::launcher::CommandLauncher;
use crate::registry::InterfaceRegistry;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Environment variable prefix for settings overrides
pub const ENV_PREFIX: &str = "MSGQ";

/// Top-level engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageQueueSettings {
    /// Deliver every send in-process instead of storing it
    #[serde(default)]
    pub force_immediate_delivery: bool,

    #[serde(default)]
    pub deferred: DeferredSettings,

    /// Interfaces in matching order. Empty means the built-in `default`.
    #[serde(default)]
    pub interfaces: Vec<NamedInterface>,

    #[serde(default = "default_backends")]
    pub backends: Vec<BackendSettings>,
}

impl Default for MessageQueueSettings {
    fn default() -> Self {
        Self {
            force_immediate_delivery: false,
            deferred: DeferredSettings::default(),
            interfaces: Vec::new(),
            backends: default_backends(),
        }
    }
}

/// An interface entry: its name plus the interface configuration fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedInterface {
    pub name: String,
    #[serde(flatten)]
    pub config: InterfaceConfig,
}

/// Deferred consumption settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub launcher: LauncherKind,

    /// Program to run when `launcher` is `command`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandSettings>,

    /// Directory collecting launched consumers' stdout/stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_path: Option<PathBuf>,
}

impl Default for DeferredSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            launcher: LauncherKind::default(),
            command: None,
            debug_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LauncherKind {
    /// In-process worker task
    #[default]
    Worker,
    /// Detached subprocess
    Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSettings {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A backend instance and the id interfaces refer to it by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendSettings {
    pub id: String,
    #[serde(flatten)]
    pub spec: BackendSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSpec {
    Memory,
    Filesystem {
        path: PathBuf,
    },
    Relay {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        basic_auth: Option<BasicAuth>,
        #[serde(default = "default_timeout_seconds")]
        timeout_seconds: u64,
    },
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_backends() -> Vec<BackendSettings> {
    vec![BackendSettings {
        id: "memory".to_string(),
        spec: BackendSpec::Memory,
    }]
}

impl MessageQueueSettings {
    /// Load settings from an optional file plus `MSGQ__` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading settings file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a string in the given format, without the
    /// environment layer
    pub fn parse(contents: &str, format: config::FileFormat) -> Result<Self, ConfigurationError> {
        let settings: Self = config::Config::builder()
            .add_source(config::File::from_str(contents, format))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Interfaces to register, falling back to the built-in defaults
    pub fn effective_interfaces(&self) -> Result<Vec<(String, InterfaceConfig)>, ConfigurationError> {
        if self.interfaces.is_empty() {
            return default_interfaces();
        }
        Ok(self
            .interfaces
            .iter()
            .map(|entry| (entry.name.clone(), entry.config.clone()))
            .collect())
    }

    /// Check cross references that serde cannot
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut backend_ids = HashSet::new();
        for backend in &self.backends {
            if !backend_ids.insert(backend.id.as_str()) {
                return Err(ConfigurationError::Invalid {
                    message: format!("backend '{}' is declared more than once", backend.id),
                });
            }
        }

        let mut names = HashSet::new();
        for (name, config) in self.effective_interfaces()? {
            if !names.insert(name.clone()) {
                return Err(ConfigurationError::Invalid {
                    message: format!("interface '{}' is declared more than once", name),
                });
            }
            let backend = config
                .backend
                .as_deref()
                .ok_or_else(|| ConfigurationError::MissingBackend {
                    interface: name.clone(),
                })?;
            if !backend_ids.contains(backend) {
                return Err(ConfigurationError::UnknownBackend {
                    backend: backend.to_string(),
                });
            }
        }

        if self.deferred.launcher == LauncherKind::Command && self.deferred.command.is_none() {
            return Err(ConfigurationError::Missing {
                key: "deferred.command".to_string(),
            });
        }

        Ok(())
    }

    /// Whether deferred passes should run on an in-process worker
    pub fn uses_worker(&self) -> bool {
        self.deferred.enabled && self.deferred.launcher == LauncherKind::Worker
    }

    /// Build the registry described by these settings
    pub fn registry(&self) -> Result<InterfaceRegistry, ConfigurationError> {
        let registry = InterfaceRegistry::new();
        for (name, config) in self.effective_interfaces()? {
            registry.add_interface(name, config);
        }
        Ok(registry)
    }

    /// Create the configured backends and return a builder wired with them.
    ///
    /// With the worker launcher, finish with
    /// [`MessageQueueBuilder::build_with_worker`].
    pub async fn builder(&self) -> Result<MessageQueueBuilder, QueueError> {
        let mut builder = MessageQueueBuilder::new()
            .registry(Arc::new(self.registry()?))
            .force_immediate_delivery(self.force_immediate_delivery)
            .deferred_enabled(self.deferred.enabled);

        for backend in &self.backends {
            let instance: Arc<dyn Backend> = match &backend.spec {
                BackendSpec::Memory => Arc::new(InMemoryBackend::new()),
                BackendSpec::Filesystem { path } => Arc::new(FileSystemBackend::new(path).await?),
                BackendSpec::Relay {
                    url,
                    basic_auth,
                    timeout_seconds,
                } => {
                    let mut config =
                        RelayConfig::new(url).with_timeout(Duration::from_secs(*timeout_seconds));
                    config.basic_auth = basic_auth.clone();
                    Arc::new(RelayBackend::new(config)?)
                }
            };
            builder = builder.backend(backend.id.clone(), instance);
        }

        if self.deferred.launcher == LauncherKind::Command {
            if let Some(command) = &self.deferred.command {
                let mut launcher =
                    CommandLauncher::new(&command.program).with_args(command.args.clone());
                if let Some(debug_path) = &self.deferred.debug_path {
                    launcher = launcher.with_debug_path(debug_path);
                }
                builder = builder.launcher(Arc::new(launcher));
            }
        }

        Ok(builder)
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
