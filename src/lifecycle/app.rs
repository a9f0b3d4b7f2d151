//! # App
//!
//! [`App`] pairs a [`ServiceContainer`] with the [`ModuleCatalog`] it resolves features
//! from. The catalog starts out holding every builtin feature under
//! [`BUILTIN_FEATURES_DIR`]; application features are added with
//! [`App::register_feature`] and land in `<workingPath>/features`, the directory the
//! default registry scans after the builtin one.
//!
//! `App` dereferences to [`ServiceContainer`], so the whole container API is available on
//! it directly.

use stagehand_core::{
    ContainerOptions, Feature, FeatureModule, ModuleCatalog, ServiceContainer, DEFAULT_BUILTIN_FEATURES_PATH,
    FEATURES_PATH,
};
use stagehand_features::bootstrap::DEFAULT_BOOTSTRAP_PATH;
use stagehand_features::register_builtins;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Directory the builtin features are published under.
pub const BUILTIN_FEATURES_DIR: &str = DEFAULT_BUILTIN_FEATURES_PATH;

/// Name used when none is given.
pub const DEFAULT_APP_NAME: &str = "cli";

#[derive(Clone)]
pub struct App {
    container: ServiceContainer,
    catalog: Arc<ModuleCatalog>,
}

impl App {
    pub fn new(name: impl Into<String>, options: ContainerOptions) -> Self {
        let catalog = Arc::new(ModuleCatalog::new());
        register_builtins(&catalog, BUILTIN_FEATURES_DIR);

        let container = ServiceContainer::with_module_source(
            name,
            options.with_builtin_features_path(BUILTIN_FEATURES_DIR),
            catalog.clone(),
        );
        debug!(app = %container.name(), modules = catalog.len(), "App created");
        Self { container, catalog }
    }

    /// An app named [`DEFAULT_APP_NAME`].
    pub fn with_options(options: ContainerOptions) -> Self {
        Self::new(DEFAULT_APP_NAME, options)
    }

    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// Directory application features are published under.
    pub fn features_dir(&self) -> PathBuf {
        self.container.working_path().join(FEATURES_PATH)
    }

    /// Make `feature` resolvable by `name` from configuration.
    pub fn register_feature(&self, name: &str, feature: impl Feature) -> &Self {
        self.catalog.register_feature(self.features_dir(), name, feature);
        self
    }

    /// Add a hook the `bootstrap` feature runs from its default directory,
    /// `<workingPath>/bootstrap`. Hooks run in name order.
    pub fn register_bootstrap_hook(&self, name: &str, hook: impl Feature) -> &Self {
        let dir = self.container.working_path().join(DEFAULT_BOOTSTRAP_PATH);
        self.catalog.register_feature(dir, name, hook);
        self
    }

    /// Publish a module under `<workingPath>/features/<name>`, e.g. an exports table that
    /// registry entries project into.
    pub fn register_module(&self, name: &str, module: FeatureModule) -> &Self {
        self.catalog.register(self.features_dir().join(name), module);
        self
    }
}

impl Deref for App {
    type Target = ServiceContainer;

    fn deref(&self) -> &ServiceContainer {
        &self.container
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("container", &self.container)
            .field("modules", &self.catalog.len())
            .finish()
    }
}
