//! # Stagehand Core
//!
//! An application container that boots itself from configuration. The container's
//! configuration document lists features by name; each feature declares a stage and an
//! async `load` hook, and the container loads them stage by stage:
//!
//! ```text
//! CONF (repeated while new CONF features appear) ─▶ INIT ─▶ SERVICE ─▶ PLUGIN ─▶ FINAL
//! ```
//!
//! ## Architecture Overview
//!
//! 1. **Features** ([`Feature`], [`FeatureKind`]): the `(kind, load)` contract.
//! 2. **Lookup** ([`FeatureRegistry`], [`ModuleSource`], [`FeatureResolver`]): where a
//!    feature name's implementation lives, resolved once and cached.
//! 3. **Orchestration** ([`StagedLoader`], [`ServiceContainer`]): lifecycle, service
//!    registry, environment overrides and lifecycle events ([`EventBus`]).
//! 4. **Configuration** ([`ConfigLoader`], [`ConfigProvider`]): JSON documents, optionally
//!    environment-aware.
//!
//! ## Quick Start
//!
//! ```rust
//! use serde_json::json;
//! use stagehand_core::{feature_fn, ContainerOptions, FeatureKind, ModuleCatalog, ServiceContainer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), stagehand_core::ContainerError> {
//!     let catalog = ModuleCatalog::new();
//!     catalog.register_feature(
//!         "/app/features",
//!         "greeting",
//!         feature_fn(FeatureKind::Service, |app, options| async move {
//!             let text = options["text"].as_str().unwrap_or("hello").to_owned();
//!             app.register_service("greeting", text, false)
//!         }),
//!     );
//!
//!     let config = json!({ "greeting": { "text": "hi" } });
//!     let app = ServiceContainer::with_module_source(
//!         "demo",
//!         ContainerOptions::default()
//!             .with_working_path("/app")
//!             .with_config(config.as_object().cloned().unwrap_or_default()),
//!         Arc::new(catalog),
//!     );
//!
//!     app.start().await?;
//!     assert_eq!(*app.get_service::<String>("greeting").unwrap(), "hi");
//!     app.stop().await
//! }
//! ```
//!
//! ## Observability
//!
//! Every lifecycle step logs through `tracing` with structured fields (`app`, `feature`,
//! `stage`). The crate never installs a subscriber.

pub mod config;
pub mod container;
pub mod env;
pub mod error;
pub mod events;
pub mod feature;
pub mod loader;
pub mod mock;
pub mod registry;
pub mod resolver;

pub use config::{
    merge_documents, ConfigDocument, ConfigLoader, ConfigProvider, ConfigVariables, EnvAwareJsonProvider,
    JsonConfigProvider,
};
pub use container::{
    ContainerOptions, LifecycleState, ServiceContainer, WeakContainer, DEFAULT_BUILTIN_FEATURES_PATH,
    DEFAULT_CONFIG_NAME, DEFAULT_CONFIG_PATH, ENV_VAR, FEATURES_PATH,
};
pub use env::EnvOverrides;
pub use error::{BoxError, ConfigError, ContainerError, ResolutionError};
pub use events::{EventBus, LifecycleEvent, Stoppers, SubscriptionId};
pub use feature::{feature_fn, parse_options, Feature, FeatureKind, FeatureModule, FnFeature};
pub use loader::{StagedLoader, DEFAULT_MAX_CONF_PASSES};
pub use registry::{FeatureRegistry, ModuleCatalog, ModuleSource, RegistryEntry, WILDCARD};
pub use resolver::{FeatureDescriptor, FeatureResolver};
