//! Registry of bus master backends.
//!
//! Provides a `MasterRegistry` struct for registering and retrieving bus
//! master factories by name. Constructed at startup and passed by value,
//! no global state.

use ecat_common::bus::{BusError, BusMaster, MasterFactory};
use std::collections::HashMap;
use std::path::Path;

use crate::simulation;

/// Registry of available bus masters.
pub struct MasterRegistry {
    factories: HashMap<&'static str, MasterFactory>,
}

impl MasterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry holding all built-in masters.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("simulation", simulation::create_master);
        registry
    }

    /// Register a master factory.
    ///
    /// # Panics
    /// Panics if a master with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: MasterFactory) {
        if self.factories.contains_key(name) {
            panic!("Bus master '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Create a master by name, bound to the given topology file.
    ///
    /// # Errors
    /// Returns `BusError::MasterNotFound` if no master with the given name is
    /// registered, or the factory's error if the topology cannot be used.
    pub fn create(&self, name: &str, topology: &Path) -> Result<Box<dyn BusMaster>, BusError> {
        let factory = self
            .factories
            .get(name)
            .copied()
            .ok_or_else(|| BusError::MasterNotFound(name.to_string()))?;
        factory(topology)
    }

    /// List all registered master names, sorted.
    pub fn list(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for MasterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
