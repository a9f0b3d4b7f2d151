//! # Feature Registry & Module Table
//!
//! The registry decides *where* a feature's implementation lives:
//!
//! - an explicit entry maps a feature name to a module path, optionally with a nested
//!   export key path for modules that ship several features;
//! - every other name falls back to the wildcard (`*`) directory list, searched from the
//!   most recently merged directory backwards.
//!
//! Module paths point into a [`ModuleSource`], the statically populated table that stands
//! in for loading code from disk. [`ModuleCatalog`] is the in-memory implementation.

use crate::feature::{Feature, FeatureModule};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Registry key holding the fallback directory list.
pub const WILDCARD: &str = "*";

/// Where to load a feature from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEntry {
    /// Load the module at this path; the module itself is the feature.
    Module(PathBuf),
    /// `[module-path, nested-key-path]`. Only the first element is required; an empty
    /// list is rejected at resolution time.
    Parts(Vec<String>),
}

/// Mapping from feature name to load location, plus the fallback directory list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureRegistry {
    fallback: Vec<PathBuf>,
    entries: HashMap<String, RegistryEntry>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry a container starts with: builtin features first, the application's
    /// own `features` directory second so it shadows builtins of the same name.
    pub fn with_defaults(builtin_dir: impl Into<PathBuf>, app_features_dir: impl Into<PathBuf>) -> Self {
        Self::new()
            .with_fallback(builtin_dir)
            .with_fallback(app_features_dir)
    }

    pub fn with_fallback(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback.push(dir.into());
        self
    }

    pub fn with_module(mut self, feature: impl Into<String>, module_path: impl Into<PathBuf>) -> Self {
        self.entries
            .insert(feature.into(), RegistryEntry::Module(module_path.into()));
        self
    }

    pub fn with_nested(
        mut self,
        feature: impl Into<String>,
        module_path: impl Into<String>,
        key_path: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            feature.into(),
            RegistryEntry::Parts(vec![module_path.into(), key_path.into()]),
        );
        self
    }

    pub fn with_entry(mut self, feature: impl Into<String>, entry: RegistryEntry) -> Self {
        self.entries.insert(feature.into(), entry);
        self
    }

    /// Merge a partial registry into this one.
    ///
    /// Wildcard directories are appended, never replaced; named entries overwrite.
    pub fn merge(&mut self, partial: FeatureRegistry) {
        self.fallback.extend(partial.fallback);
        self.entries.extend(partial.entries);
    }

    /// The explicit entry for a feature, if any. The wildcard key never matches.
    pub fn entry(&self, feature: &str) -> Option<&RegistryEntry> {
        if feature == WILDCARD {
            return None;
        }
        self.entries.get(feature)
    }

    /// Fallback directories in merge order (lowest priority first).
    pub fn fallback_dirs(&self) -> &[PathBuf] {
        &self.fallback
    }
}

/// Source of feature modules keyed by path.
///
/// This is the seam that replaces loading code by file path: `contains` plays the role of
/// a file-existence check, `load` the role of importing the module.
pub trait ModuleSource: Send + Sync + 'static {
    fn contains(&self, path: &Path) -> bool;
    fn load(&self, path: &Path) -> Option<FeatureModule>;

    /// Every module path below `dir`, at any depth, in sorted order.
    fn modules_under(&self, dir: &Path) -> Vec<PathBuf> {
        let _ = dir;
        Vec::new()
    }
}

/// In-memory module table populated by explicit registration.
#[derive(Default)]
pub struct ModuleCatalog {
    modules: RwLock<HashMap<PathBuf, FeatureModule>>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a module under a path, replacing any previous module there.
    pub fn register(&self, path: impl Into<PathBuf>, module: FeatureModule) -> &Self {
        self.modules.write().insert(path.into(), module);
        self
    }

    /// Publish a single feature as `<dir>/<name>`, the layout fallback resolution scans.
    pub fn register_feature(&self, dir: impl AsRef<Path>, name: &str, feature: impl Feature) -> &Self {
        self.register(dir.as_ref().join(name), FeatureModule::feature(feature))
    }

    pub fn len(&self) -> usize {
        self.modules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }
}

impl ModuleSource for ModuleCatalog {
    fn contains(&self, path: &Path) -> bool {
        self.modules.read().contains_key(path)
    }

    fn load(&self, path: &Path) -> Option<FeatureModule> {
        self.modules.read().get(path).cloned()
    }

    fn modules_under(&self, dir: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self
            .modules
            .read()
            .keys()
            .filter(|path| path.starts_with(dir) && path.as_path() != dir)
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

impl fmt::Debug for ModuleCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modules = self.modules.read();
        let mut paths: Vec<_> = modules.keys().collect();
        paths.sort();
        f.debug_struct("ModuleCatalog").field("modules", &paths).finish()
    }
}
