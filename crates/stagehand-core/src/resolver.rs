//! # Feature Resolver
//!
//! Turns a feature name into a cached, validated [`FeatureDescriptor`].
//!
//! Resolution order:
//! 1. a descriptor already cached under the name is returned as-is (no module reload,
//!    even if the registry changed since);
//! 2. an explicit registry entry loads that module, projecting into a nested export
//!    when the entry carries a key path;
//! 3. otherwise the fallback directories are scanned from last to first and the first
//!    directory holding `<dir>/<name>` wins.

use crate::container::ServiceContainer;
use crate::error::{ContainerError, ResolutionError};
use crate::feature::{Feature, FeatureKind, FeatureModule};
use crate::registry::{FeatureRegistry, ModuleSource, RegistryEntry};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// An immutable, resolved feature: its stage kind, its loader and where it came from.
///
/// Cloning is cheap and clones share identity (see [`FeatureDescriptor::ptr_eq`]).
#[derive(Clone)]
pub struct FeatureDescriptor {
    inner: Arc<Descriptor>,
}

struct Descriptor {
    kind: FeatureKind,
    feature: Arc<dyn Feature>,
    origin: PathBuf,
}

impl FeatureDescriptor {
    fn new(feature: Arc<dyn Feature>, origin: PathBuf) -> Self {
        Self {
            inner: Arc::new(Descriptor {
                kind: feature.kind(),
                feature,
                origin,
            }),
        }
    }

    pub fn kind(&self) -> FeatureKind {
        self.inner.kind
    }

    /// Module path the feature was loaded from.
    pub fn origin(&self) -> &Path {
        &self.inner.origin
    }

    pub async fn load(&self, container: &ServiceContainer, options: Value) -> Result<(), ContainerError> {
        self.inner.feature.load(container, options).await
    }

    /// Whether two descriptors are the same cached object.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for FeatureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureDescriptor")
            .field("kind", &self.inner.kind)
            .field("origin", &self.inner.origin)
            .finish()
    }
}

/// Resolves feature names against a registry and a module source, caching results.
pub struct FeatureResolver {
    source: Arc<dyn ModuleSource>,
    resolved: RwLock<HashMap<String, FeatureDescriptor>>,
}

impl FeatureResolver {
    pub fn new(source: Arc<dyn ModuleSource>) -> Self {
        Self {
            source,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, feature: &str, registry: &FeatureRegistry) -> Result<FeatureDescriptor, ResolutionError> {
        if let Some(descriptor) = self.cached(feature) {
            return Ok(descriptor);
        }

        let (origin, module) = match registry.entry(feature) {
            Some(RegistryEntry::Module(path)) => {
                let module = self.import(feature, path)?;
                (path.clone(), module)
            }
            Some(RegistryEntry::Parts(parts)) => {
                let Some(first) = parts.first() else {
                    return Err(ResolutionError::InvalidRegistryEntry(feature.to_owned()));
                };
                let path = PathBuf::from(first);
                let mut module = self.import(feature, &path)?;
                if let Some(key_path) = parts.get(1) {
                    module = module
                        .project(key_path)
                        .cloned()
                        .ok_or_else(|| ResolutionError::InvalidFeatureObject(path.clone()))?;
                }
                (path, module)
            }
            None => {
                let path = registry
                    .fallback_dirs()
                    .iter()
                    .rev()
                    .map(|dir| dir.join(feature))
                    .find(|candidate| self.source.contains(candidate))
                    .ok_or_else(|| ResolutionError::FeatureNotFound(feature.to_owned()))?;
                let module = self.import(feature, &path)?;
                (path, module)
            }
        };

        let feature_object = match module {
            FeatureModule::Feature(feature_object) => feature_object,
            FeatureModule::Exports(_) => return Err(ResolutionError::InvalidFeatureObject(origin)),
        };

        debug!(feature, origin = %origin.display(), "Feature resolved");
        let descriptor = FeatureDescriptor::new(feature_object, origin);
        let mut resolved = self.resolved.write();
        let descriptor = resolved.entry(feature.to_owned()).or_insert(descriptor).clone();
        Ok(descriptor)
    }

    pub fn cached(&self, feature: &str) -> Option<FeatureDescriptor> {
        self.resolved.read().get(feature).cloned()
    }

    pub fn is_resolved(&self, feature: &str) -> bool {
        self.resolved.read().contains_key(feature)
    }

    pub fn source(&self) -> &Arc<dyn ModuleSource> {
        &self.source
    }

    /// Drop every cached descriptor.
    pub fn clear(&self) {
        self.resolved.write().clear();
    }

    fn import(&self, feature: &str, path: &Path) -> Result<FeatureModule, ResolutionError> {
        self.source.load(path).ok_or_else(|| ResolutionError::ModuleNotFound {
            feature: feature.to_owned(),
            path: path.to_path_buf(),
        })
    }
}

impl fmt::Debug for FeatureResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolved = self.resolved.read();
        f.debug_struct("FeatureResolver")
            .field("resolved", &resolved.keys().collect::<Vec<_>>())
            .finish()
    }
}
