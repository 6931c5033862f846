//! Interface registry and queue routing.
//!
//! The registry is an explicit object shared by handle (`Arc<InterfaceRegistry>`)
//! between the engine and anything that reconfigures it at runtime. Insertion
//! order defines rule-matching priority: the first interface whose selector
//! owns a queue name wins.

use crate::config::{default_interfaces, InterfaceConfig};
use crate::error::ConfigurationError;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// An interface selected for a queue, with its backend id already checked
#[derive(Debug, Clone)]
pub struct ResolvedInterface {
    pub name: String,
    pub config: Arc<InterfaceConfig>,
    pub backend: String,
}

impl ResolvedInterface {
    fn from_entry(name: &str, config: &Arc<InterfaceConfig>) -> Result<Self, ConfigurationError> {
        let backend = config
            .backend
            .clone()
            .ok_or_else(|| ConfigurationError::MissingBackend {
                interface: name.to_string(),
            })?;

        Ok(Self {
            name: name.to_string(),
            config: Arc::clone(config),
            backend,
        })
    }
}

// ============================================================================
// InterfaceRegistry
// ============================================================================

/// Ordered set of named interface configurations.
///
/// # Examples
///
/// ```rust
/// use message_queue::config::{InterfaceConfig, QueueSelector};
/// use message_queue::registry::InterfaceRegistry;
///
/// let registry = InterfaceRegistry::new();
/// registry.add_interface("orders", InterfaceConfig::new(QueueSelector::name("orders"), "memory"));
///
/// let resolved = registry.resolve("orders").unwrap();
/// assert_eq!(resolved.name, "orders");
/// assert!(registry.resolve("unknown").is_err());
/// ```
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    interfaces: RwLock<Vec<(String, Arc<InterfaceConfig>)>>,
}

impl InterfaceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the built-in `default` interface
    pub fn with_defaults() -> Result<Self, ConfigurationError> {
        let registry = Self::new();
        for (name, config) in default_interfaces()? {
            registry.add_interface(name, config);
        }
        Ok(registry)
    }

    /// Register an interface.
    ///
    /// An existing interface with the same name is replaced in place and keeps
    /// its matching priority; new names are appended.
    pub fn add_interface(&self, name: impl Into<String>, config: InterfaceConfig) {
        let name = name.into();
        let config = Arc::new(config);
        let mut interfaces = self.write();

        match interfaces.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => {
                debug!(interface = %name, "Replacing interface configuration");
                entry.1 = config;
            }
            None => {
                debug!(interface = %name, "Adding interface configuration");
                interfaces.push((name, config));
            }
        }
    }

    /// Remove an interface, returning its configuration if it was registered
    pub fn remove_interface(&self, name: &str) -> Option<Arc<InterfaceConfig>> {
        let mut interfaces = self.write();
        let index = interfaces.iter().position(|(existing, _)| existing == name)?;
        debug!(interface = %name, "Removing interface configuration");
        Some(interfaces.remove(index).1)
    }

    /// Snapshot of all interfaces in matching order
    pub fn get_interfaces(&self) -> Vec<(String, Arc<InterfaceConfig>)> {
        self.read().clone()
    }

    /// Look up an interface by name
    pub fn get(&self, name: &str) -> Option<Arc<InterfaceConfig>> {
        self.read()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, config)| Arc::clone(config))
    }

    /// Look up an interface by name, checking that it declares a backend
    pub fn resolve_named(&self, name: &str) -> Result<ResolvedInterface, ConfigurationError> {
        let interfaces = self.read();
        let (name, config) = interfaces
            .iter()
            .find(|(existing, _)| existing == name)
            .ok_or_else(|| ConfigurationError::UnknownInterface {
                name: name.to_string(),
            })?;
        ResolvedInterface::from_entry(name, config)
    }

    /// Name of the interface that owns `queue`, if any
    pub fn interface_name_for(&self, queue: &str) -> Option<String> {
        self.read()
            .iter()
            .find(|(_, config)| config.queues.matches(queue))
            .map(|(name, _)| name.clone())
    }

    /// Resolve the interface owning `queue`. First match in insertion order wins.
    pub fn resolve(&self, queue: &str) -> Result<ResolvedInterface, ConfigurationError> {
        let interfaces = self.read();
        let (name, config) = interfaces
            .iter()
            .find(|(_, config)| config.queues.matches(queue))
            .ok_or_else(|| ConfigurationError::NoMatchingInterface {
                queue: queue.to_string(),
            })?;
        ResolvedInterface::from_entry(name, config)
    }

    /// The first registered interface, used when no queue name is given
    pub fn resolve_default(&self) -> Result<ResolvedInterface, ConfigurationError> {
        let interfaces = self.read();
        let (name, config) = interfaces.first().ok_or(ConfigurationError::NoInterfaces)?;
        ResolvedInterface::from_entry(name, config)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<(String, Arc<InterfaceConfig>)>> {
        self.interfaces.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<(String, Arc<InterfaceConfig>)>> {
        self.interfaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
