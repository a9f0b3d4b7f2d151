//! Environment overrides owned by a container.
//!
//! Features that "set environment variables" write here instead of into the process
//! environment, so two containers in one process never see each other's values.

use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct EnvOverrides {
    vars: RwLock<BTreeMap<String, String>>,
}

impl EnvOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.vars.read().get(key).cloned()
    }

    /// Set a variable, returning the previous override.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.vars.write().insert(key.into(), value.into())
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.vars.write().remove(key)
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.vars.read().clone()
    }

    pub fn clear(&self) {
        self.vars.write().clear();
    }

    /// Override first, then the process environment.
    pub fn resolve(&self, key: &str) -> Option<String> {
        self.get(key).or_else(|| std::env::var(key).ok())
    }
}
