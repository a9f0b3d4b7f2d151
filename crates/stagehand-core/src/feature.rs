//! # Feature Contract
//!
//! A feature is a named, pluggable unit of startup behavior. Every feature declares the
//! stage it belongs to ([`FeatureKind`]) and an async `load` hook that receives the
//! container and the feature's slice of the configuration document.
//!
//! Features are published to the container through a module table (see
//! [`crate::registry::ModuleCatalog`]). A module is either a single feature or a table
//! of named exports, which lets one module ship several features that registry entries
//! pick out by a dotted key path.

use crate::container::ServiceContainer;
use crate::error::ContainerError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// The stage a feature is loaded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeatureKind {
    /// Configuration stage: runs first, may rewrite the configuration document.
    Conf,
    Init,
    Service,
    Plugin,
    Final,
}

impl FeatureKind {
    /// The regular stages, in execution order.
    pub const ORDERED: [FeatureKind; 4] = [
        FeatureKind::Init,
        FeatureKind::Service,
        FeatureKind::Plugin,
        FeatureKind::Final,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureKind::Conf => "CONF",
            FeatureKind::Init => "INIT",
            FeatureKind::Service => "SERVICE",
            FeatureKind::Plugin => "PLUGIN",
            FeatureKind::Final => "FINAL",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract every feature implements to be loaded by the container.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use stagehand_core::{ContainerError, Feature, FeatureKind, ServiceContainer};
///
/// struct Greeter;
///
/// #[async_trait]
/// impl Feature for Greeter {
///     fn kind(&self) -> FeatureKind {
///         FeatureKind::Service
///     }
///
///     async fn load(&self, app: &ServiceContainer, options: Value) -> Result<(), ContainerError> {
///         let greeting = options.as_str().unwrap_or("hello").to_owned();
///         app.register_service("greeting", greeting, false)?;
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Feature: Send + Sync + 'static {
    /// The stage this feature belongs to.
    fn kind(&self) -> FeatureKind;

    /// Wire the feature into the container using its configuration options.
    async fn load(&self, container: &ServiceContainer, options: Value) -> Result<(), ContainerError>;
}

/// A feature built from a closure.
///
/// The closure receives an owned container handle so the returned future can be `'static`.
pub struct FnFeature<F> {
    kind: FeatureKind,
    load: F,
}

/// Build a [`FnFeature`] from a stage kind and a load closure.
pub fn feature_fn<F, Fut>(kind: FeatureKind, load: F) -> FnFeature<F>
where
    F: Fn(ServiceContainer, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ContainerError>> + Send + 'static,
{
    FnFeature { kind, load }
}

#[async_trait]
impl<F, Fut> Feature for FnFeature<F>
where
    F: Fn(ServiceContainer, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ContainerError>> + Send + 'static,
{
    fn kind(&self) -> FeatureKind {
        self.kind
    }

    async fn load(&self, container: &ServiceContainer, options: Value) -> Result<(), ContainerError> {
        (self.load)(container.clone(), options).await
    }
}

/// Deserialize a feature's options, treating `null` as an empty object.
pub fn parse_options<T: DeserializeOwned>(feature: &str, options: Value) -> Result<T, ContainerError> {
    let options = match options {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(options).map_err(|e| ContainerError::invalid_config(feature, e.to_string()))
}

/// What a module path resolves to in the module table.
#[derive(Clone)]
pub enum FeatureModule {
    Feature(Arc<dyn Feature>),
    Exports(BTreeMap<String, FeatureModule>),
}

impl FeatureModule {
    pub fn feature(feature: impl Feature) -> Self {
        Self::Feature(Arc::new(feature))
    }

    /// Start an empty export table.
    pub fn exports() -> Self {
        Self::Exports(BTreeMap::new())
    }

    /// Add a named export. No-op on a single-feature module.
    pub fn with_export(mut self, name: impl Into<String>, module: FeatureModule) -> Self {
        if let Self::Exports(table) = &mut self {
            table.insert(name.into(), module);
        }
        self
    }

    /// Walk a dotted key path (`"cache.lru"`) through nested export tables.
    pub fn project(&self, key_path: &str) -> Option<&FeatureModule> {
        key_path
            .split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |module, segment| match module {
                Self::Exports(table) => table.get(segment),
                Self::Feature(_) => None,
            })
    }

    /// The feature, if this module is a single feature rather than an export table.
    pub fn as_feature(&self) -> Option<&Arc<dyn Feature>> {
        match self {
            Self::Feature(feature) => Some(feature),
            Self::Exports(_) => None,
        }
    }
}

impl fmt::Debug for FeatureModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feature(feature) => write!(f, "Feature({})", feature.kind()),
            Self::Exports(table) => f.debug_map().entries(table.iter()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop(kind: FeatureKind) -> FeatureModule {
        FeatureModule::feature(feature_fn(kind, |_, _| async { Ok(()) }))
    }

    #[test]
    fn kind_labels_round_trip_through_serde() {
        assert_eq!(FeatureKind::Service.to_string(), "SERVICE");
        let kind: FeatureKind = serde_json::from_value(json!("PLUGIN")).unwrap();
        assert_eq!(kind, FeatureKind::Plugin);
        assert!(serde_json::from_value::<FeatureKind>(json!("LATE")).is_err());
    }

    #[test]
    fn project_walks_nested_exports() {
        let module = FeatureModule::exports()
            .with_export("cache", FeatureModule::exports().with_export("lru", noop(FeatureKind::Service)))
            .with_export("env", noop(FeatureKind::Init));

        let lru = module.project("cache.lru").and_then(FeatureModule::as_feature).unwrap();
        assert_eq!(lru.kind(), FeatureKind::Service);
        assert!(module.project("cache").unwrap().as_feature().is_none());
        assert!(module.project("cache.lru.deeper").is_none());
        assert!(module.project("missing").is_none());
    }

    #[test]
    fn parse_options_accepts_null_as_defaults() {
        #[derive(serde::Deserialize, Default)]
        struct Opts {
            #[serde(default)]
            max: usize,
        }
        let opts: Opts = parse_options("lruCache", Value::Null).unwrap();
        assert_eq!(opts.max, 0);

        let err = parse_options::<Opts>("lruCache", json!({ "max": "many" })).err().unwrap();
        assert!(matches!(err, ContainerError::InvalidConfiguration { ref item, .. } if item == "lruCache"));
    }
}
