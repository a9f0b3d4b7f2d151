//! # Service Container
//!
//! [`ServiceContainer`] is the runtime object every feature receives. It owns:
//!
//! - the configuration document and the loader that produced it;
//! - the feature registry and the resolver cache;
//! - the set of loaded features and the map of registered services;
//! - the environment overrides;
//! - the lifecycle event bus.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──start()──▶ Starting ──▶ Started ──stop()──▶ Stopping ──▶ Stopped
//!                               │
//!                               └── any startup error ──▶ Stopped
//! ```
//!
//! `start()` resets all per-run state, loads the configuration, emits `configLoaded`,
//! runs the [`StagedLoader`] and emits `ready`. `stop()` emits `stopping`, awaits every
//! cleanup future observers pushed, then tears the per-run state down. Event subscriptions
//! made during a run (typically by features in `load`) are part of that state; subscriptions
//! made while the container is idle survive restarts.
//!
//! The handle is cheap to clone; clones share one container. Features that need to keep
//! a handle inside a service should hold a [`WeakContainer`] to avoid a reference cycle.

use crate::config::{ConfigDocument, ConfigLoader, ConfigProvider, ConfigVariables};
use crate::env::EnvOverrides;
use crate::error::{ContainerError, ResolutionError};
use crate::events::{EventBus, LifecycleEvent, Stoppers, SubscriptionId};
use crate::feature::FeatureModule;
use crate::loader::{StagedLoader, DEFAULT_MAX_CONF_PASSES};
use crate::registry::{FeatureRegistry, ModuleCatalog, ModuleSource};
use crate::resolver::{FeatureDescriptor, FeatureResolver};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, error, info, warn};

/// Directory prefix the builtin features are published under in a module table.
pub const DEFAULT_BUILTIN_FEATURES_PATH: &str = "@builtin/features";
/// Config directory, relative to the working path.
pub const DEFAULT_CONFIG_PATH: &str = "conf";
/// Base name of the configuration files.
pub const DEFAULT_CONFIG_NAME: &str = "app";
/// Application feature directory, relative to the working path.
pub const FEATURES_PATH: &str = "features";
/// Environment variable naming the deployment environment.
pub const ENV_VAR: &str = "APP_ENV";

type SharedService = Arc<dyn Any + Send + Sync>;

/// Where the container is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Starting,
    Started,
    Stopping,
    Stopped,
}

/// Options accepted by [`ServiceContainer::new`].
///
/// Deserializes from the camelCase keys used in configuration files
/// (`workingPath`, `disableEnvAwareConfig`, ...). Every field is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerOptions {
    /// Environment name. Defaults to `$APP_ENV`, then `development`.
    pub env: Option<String>,
    /// Defaults to the current directory.
    pub working_path: Option<PathBuf>,
    /// Relative to the working path unless absolute. Defaults to `conf`.
    pub config_path: Option<PathBuf>,
    /// Defaults to `app`.
    pub config_name: Option<String>,
    /// Read `<configName>.json` instead of the default/env file pair.
    pub disable_env_aware_config: bool,
    /// Only these top-level keys are treated as features. `None` allows all.
    pub allowed_features: Option<Vec<String>>,
    /// Use [`ContainerOptions::config`] verbatim instead of loading files.
    pub load_config_from_options: bool,
    pub config: Option<ConfigDocument>,
    pub builtin_features_path: Option<PathBuf>,
    /// Upper bound on configuration-stage passes per start.
    pub max_conf_passes: usize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            env: None,
            working_path: None,
            config_path: None,
            config_name: None,
            disable_env_aware_config: false,
            allowed_features: None,
            load_config_from_options: false,
            config: None,
            builtin_features_path: None,
            max_conf_passes: DEFAULT_MAX_CONF_PASSES,
        }
    }
}

impl ContainerOptions {
    pub fn with_env(mut self, env: impl Into<String>) -> Self {
        self.env = Some(env.into());
        self
    }

    pub fn with_working_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.working_path = Some(path.into());
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_config_name(mut self, name: impl Into<String>) -> Self {
        self.config_name = Some(name.into());
        self
    }

    /// `false` switches to the single `<configName>.json` file.
    pub fn with_env_aware_config(mut self, enabled: bool) -> Self {
        self.disable_env_aware_config = !enabled;
        self
    }

    pub fn with_allowed_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_features = Some(features.into_iter().map(Into::into).collect());
        self
    }

    /// Use this document as the configuration and skip file loading.
    pub fn with_config(mut self, config: ConfigDocument) -> Self {
        self.config = Some(config);
        self.load_config_from_options = true;
        self
    }

    pub fn with_builtin_features_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.builtin_features_path = Some(path.into());
        self
    }

    pub fn with_max_conf_passes(mut self, passes: usize) -> Self {
        self.max_conf_passes = passes;
        self
    }

    pub fn is_allowed(&self, feature: &str) -> bool {
        self.allowed_features
            .as_ref()
            .map_or(true, |allowed| allowed.iter().any(|name| name == feature))
    }
}

/// Shared handle to a running application container.
#[derive(Clone)]
pub struct ServiceContainer {
    inner: Arc<ContainerInner>,
}

/// Non-owning handle, for services that need to reach back into the container.
#[derive(Clone, Debug)]
pub struct WeakContainer {
    inner: Weak<ContainerInner>,
}

impl WeakContainer {
    pub fn upgrade(&self) -> Option<ServiceContainer> {
        self.inner.upgrade().map(|inner| ServiceContainer { inner })
    }
}

struct ContainerInner {
    name: String,
    env: String,
    working_path: PathBuf,
    config_path: PathBuf,
    config_name: String,
    builtin_features_path: PathBuf,
    options: ContainerOptions,
    registry: RwLock<FeatureRegistry>,
    resolver: FeatureResolver,
    loaded: RwLock<Vec<String>>,
    services: RwLock<HashMap<String, SharedService>>,
    config: RwLock<ConfigDocument>,
    config_loader: RwLock<Option<ConfigLoader>>,
    env_overrides: EnvOverrides,
    events: EventBus,
    /// Subscriptions made while a run was in progress; dropped on tear-down.
    run_subscriptions: RwLock<Vec<SubscriptionId>>,
    state: RwLock<LifecycleState>,
}

impl ServiceContainer {
    /// A container with an empty module table. Use
    /// [`ServiceContainer::with_module_source`] to make features resolvable.
    pub fn new(name: impl Into<String>, options: ContainerOptions) -> Self {
        Self::with_module_source(name, options, Arc::new(ModuleCatalog::new()))
    }

    pub fn with_module_source(
        name: impl Into<String>,
        options: ContainerOptions,
        source: Arc<dyn ModuleSource>,
    ) -> Self {
        let env = options
            .env
            .clone()
            .or_else(|| std::env::var(ENV_VAR).ok())
            .unwrap_or_else(|| "development".to_owned());
        let working_path = absolute_working_path(options.working_path.as_deref());
        let config_path = resolve_against(
            &working_path,
            options
                .config_path
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_CONFIG_PATH)),
        );
        let config_name = options
            .config_name
            .clone()
            .unwrap_or_else(|| DEFAULT_CONFIG_NAME.to_owned());
        let builtin_features_path = options
            .builtin_features_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BUILTIN_FEATURES_PATH));

        Self {
            inner: Arc::new(ContainerInner {
                name: name.into(),
                env,
                working_path,
                config_path,
                config_name,
                builtin_features_path,
                options,
                registry: RwLock::new(FeatureRegistry::new()),
                resolver: FeatureResolver::new(source),
                loaded: RwLock::new(Vec::new()),
                services: RwLock::new(HashMap::new()),
                config: RwLock::new(ConfigDocument::new()),
                config_loader: RwLock::new(None),
                env_overrides: EnvOverrides::new(),
                events: EventBus::new(),
                run_subscriptions: RwLock::new(Vec::new()),
                state: RwLock::new(LifecycleState::Uninitialized),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn env(&self) -> &str {
        &self.inner.env
    }

    pub fn working_path(&self) -> &Path {
        &self.inner.working_path
    }

    pub fn config_path(&self) -> &Path {
        &self.inner.config_path
    }

    pub fn config_name(&self) -> &str {
        &self.inner.config_name
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    pub fn state(&self) -> LifecycleState {
        *self.inner.state.read()
    }

    pub fn is_started(&self) -> bool {
        self.state() == LifecycleState::Started
    }

    pub fn downgrade(&self) -> WeakContainer {
        WeakContainer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Load the configuration and every configured feature.
    ///
    /// Emits `configLoaded`, the stage and per-feature events, then `ready`. Any error
    /// aborts startup and leaves the container in [`LifecycleState::Stopped`].
    pub async fn start(&self) -> Result<(), ContainerError> {
        self.set_state(LifecycleState::Starting);
        info!(app = %self.name(), env = %self.env(), "Starting");

        match self.start_stages().await {
            Ok(()) => {
                self.set_state(LifecycleState::Started);
                info!(app = %self.name(), features = self.inner.loaded.read().len(), "Started");
                Ok(())
            }
            Err(e) => {
                self.set_state(LifecycleState::Stopped);
                error!(app = %self.name(), error = %e, "Startup failed");
                Err(e)
            }
        }
    }

    async fn start_stages(&self) -> Result<(), ContainerError> {
        // Left over by a failed start that was never stopped.
        self.drop_run_subscriptions();
        *self.inner.registry.write() = self.default_registry();
        self.inner.resolver.clear();
        self.inner.loaded.write().clear();
        self.inner.services.write().clear();

        let options = &self.inner.options;
        if options.load_config_from_options {
            *self.inner.config.write() = options.config.clone().unwrap_or_default();
        } else {
            let loader = if options.disable_env_aware_config {
                ConfigLoader::json(self.config_path(), self.config_name())
            } else {
                ConfigLoader::env_aware(self.config_path(), self.config_name(), self.env())
            };
            *self.inner.config_loader.write() = Some(loader);
            self.load_config().await?;
        }

        self.emit(&LifecycleEvent::ConfigLoaded);

        if self.inner.config.read().is_empty() {
            return Err(ContainerError::EmptyConfig {
                config_path: self.inner.config_path.clone(),
            });
        }

        StagedLoader::new(self).run().await?;

        self.emit(&LifecycleEvent::Ready);
        Ok(())
    }

    /// Emit `stopping`, await every cleanup future observers pushed, then tear down.
    ///
    /// All cleanups run to completion even if one fails; the first failure is returned.
    pub async fn stop(&self) -> Result<(), ContainerError> {
        self.set_state(LifecycleState::Stopping);
        info!(app = %self.name(), "Stopping");

        let stoppers = Stoppers::new();
        self.emit(&LifecycleEvent::Stopping(&stoppers));
        let cleanups = stoppers.take();
        debug!(app = %self.name(), cleanups = cleanups.len(), "Awaiting cleanups");
        let results = futures::future::join_all(cleanups).await;

        self.tear_down();
        self.set_state(LifecycleState::Stopped);

        let mut failures = results.into_iter().filter_map(Result::err);
        match failures.next() {
            Some(first) => {
                let others = failures.count();
                error!(app = %self.name(), error = %first, others, "Cleanup failed");
                Err(ContainerError::Cleanup(first))
            }
            None => {
                info!(app = %self.name(), "Stopped");
                Ok(())
            }
        }
    }

    fn tear_down(&self) {
        self.inner.services.write().clear();
        self.inner.loaded.write().clear();
        self.inner.resolver.clear();
        self.inner.config.write().clear();
        *self.inner.config_loader.write() = None;
        *self.inner.registry.write() = FeatureRegistry::new();
        self.inner.env_overrides.clear();
        self.drop_run_subscriptions();
    }

    fn drop_run_subscriptions(&self) {
        let run_subscriptions = std::mem::take(&mut *self.inner.run_subscriptions.write());
        if run_subscriptions.is_empty() {
            return;
        }
        let dropped = run_subscriptions
            .into_iter()
            .filter(|id| self.inner.events.unsubscribe(*id))
            .count();
        debug!(app = %self.name(), subscriptions = dropped, "Run-scoped subscriptions dropped");
    }

    fn set_state(&self, state: LifecycleState) {
        *self.inner.state.write() = state;
    }

    fn default_registry(&self) -> FeatureRegistry {
        FeatureRegistry::with_defaults(
            self.inner.builtin_features_path.clone(),
            self.inner.working_path.join(FEATURES_PATH),
        )
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// (Re)load the configuration through the current loader, replacing the document.
    pub async fn load_config(&self) -> Result<(), ContainerError> {
        let loader = self
            .inner
            .config_loader
            .read()
            .clone()
            .ok_or(ContainerError::NoConfigLoader)?;
        let document = loader.load(&ConfigVariables::new(self)).await?;
        debug!(app = %self.name(), keys = document.len(), "Configuration loaded");
        *self.inner.config.write() = document;
        Ok(())
    }

    /// Swap the provider of the config loader, creating a loader if there is none.
    pub fn set_config_provider(&self, provider: impl ConfigProvider) {
        let provider: Arc<dyn ConfigProvider> = Arc::new(provider);
        let mut loader = self.inner.config_loader.write();
        match loader.as_mut() {
            Some(loader) => loader.set_provider(provider),
            None => *loader = Some(ConfigLoader::from_shared(provider)),
        }
    }

    /// Snapshot of the current configuration document.
    pub fn config(&self) -> ConfigDocument {
        self.inner.config.read().clone()
    }

    pub fn config_value(&self, key: &str) -> Option<Value> {
        self.inner.config.read().get(key).cloned()
    }

    pub fn set_config(&self, config: ConfigDocument) {
        *self.inner.config.write() = config;
    }

    /// Edit a copy of the configuration document, then swap it in.
    ///
    /// The document is not locked while `edit` runs, so the closure may read the container's
    /// configuration. A concurrent `set_config` during the edit is overwritten.
    pub fn update_config<R>(&self, edit: impl FnOnce(&mut ConfigDocument) -> R) -> R {
        let mut document = self.config();
        let result = edit(&mut document);
        *self.inner.config.write() = document;
        result
    }

    // =========================================================================
    // Services
    // =========================================================================

    /// Register a service under a unique name.
    ///
    /// Fails with [`ContainerError::ServiceAlreadyRegistered`] when the name is taken,
    /// unless `override_existing` is set.
    pub fn register_service<S>(&self, name: impl Into<String>, service: S, override_existing: bool) -> Result<(), ContainerError>
    where
        S: Any + Send + Sync,
    {
        self.register_shared_service(name, Arc::new(service), override_existing)
    }

    pub fn register_shared_service<S>(
        &self,
        name: impl Into<String>,
        service: Arc<S>,
        override_existing: bool,
    ) -> Result<(), ContainerError>
    where
        S: Any + Send + Sync,
    {
        let name = name.into();
        let mut services = self.inner.services.write();
        if !override_existing && services.contains_key(&name) {
            return Err(ContainerError::ServiceAlreadyRegistered(name));
        }
        debug!(app = %self.inner.name, service = %name, "Service registered");
        services.insert(name, service);
        Ok(())
    }

    /// Return the service registered under `name`, registering `init()` first if absent.
    pub fn get_or_register_service<S, F>(&self, name: &str, init: F) -> Result<Arc<S>, ContainerError>
    where
        S: Any + Send + Sync,
        F: FnOnce() -> S,
    {
        let mut services = self.inner.services.write();
        if let Some(existing) = services.get(name) {
            return Arc::clone(existing)
                .downcast::<S>()
                .map_err(|_| ContainerError::Custom(format!("Service \"{name}\" has a different type")));
        }
        let service = Arc::new(init());
        services.insert(name.to_owned(), Arc::clone(&service) as SharedService);
        Ok(service)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.inner.services.read().contains_key(name)
    }

    /// The service registered under `name`, if it exists and has type `S`.
    pub fn get_service<S>(&self, name: &str) -> Option<Arc<S>>
    where
        S: Any + Send + Sync,
    {
        let service = self.inner.services.read().get(name).cloned()?;
        service.downcast::<S>().ok()
    }

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    // =========================================================================
    // Features
    // =========================================================================

    /// Whether the feature has been resolved during this run.
    pub fn enabled(&self, feature: &str) -> bool {
        self.inner.resolver.is_resolved(feature)
    }

    /// Whether the feature's `load` has completed during this run.
    pub fn is_loaded(&self, feature: &str) -> bool {
        self.inner.loaded.read().iter().any(|name| name == feature)
    }

    /// Loaded features in completion order.
    pub fn loaded_features(&self) -> Vec<String> {
        self.inner.loaded.read().clone()
    }

    /// Merge extra lookup locations into the feature registry.
    pub fn add_feature_registry(&self, registry: FeatureRegistry) {
        self.inner.registry.write().merge(registry);
    }

    pub fn resolve_feature(&self, feature: &str) -> Result<FeatureDescriptor, ResolutionError> {
        let registry = self.inner.registry.read();
        self.inner.resolver.resolve(feature, &registry)
    }

    /// Every module published below `dir` in the module source, in path order.
    pub fn modules_under(&self, dir: impl AsRef<Path>) -> Vec<(PathBuf, FeatureModule)> {
        let source = self.inner.resolver.source();
        source
            .modules_under(dir.as_ref())
            .into_iter()
            .filter_map(|path| source.load(&path).map(|module| (path, module)))
            .collect()
    }

    pub(crate) fn mark_loaded(&self, feature: &str) {
        let mut loaded = self.inner.loaded.write();
        if !loaded.iter().any(|name| name == feature) {
            loaded.push(feature.to_owned());
        }
    }

    // =========================================================================
    // Environment & paths
    // =========================================================================

    /// An environment variable, preferring the container's overrides.
    pub fn env_var(&self, key: &str) -> Option<String> {
        self.inner.env_overrides.resolve(key)
    }

    pub fn set_env_var(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.env_overrides.set(key, value);
    }

    pub fn env_overrides(&self) -> &EnvOverrides {
        &self.inner.env_overrides
    }

    /// Resolve a path against the working path.
    pub fn to_absolute_path(&self, path: impl AsRef<Path>) -> PathBuf {
        resolve_against(&self.inner.working_path, path.as_ref())
    }

    /// Log a collaborator's runtime error with its source chain.
    pub fn log_error(&self, err: &(dyn std::error::Error + 'static)) {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        error!(app = %self.inner.name, error = %err, ?causes, "Runtime error");
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    // Subscriptions made between `start()` and the end of `stop()` only last for that run;
    // ones made while the container is idle persist across restarts.

    pub fn on<F>(&self, event: impl Into<String>, observer: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        self.track(self.inner.events.on(event, observer))
    }

    pub fn once<F>(&self, event: impl Into<String>, observer: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        self.track(self.inner.events.once(event, observer))
    }

    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        self.track(self.inner.events.subscribe(observer))
    }

    fn track(&self, id: SubscriptionId) -> SubscriptionId {
        let in_run = matches!(
            self.state(),
            LifecycleState::Starting | LifecycleState::Started | LifecycleState::Stopping
        );
        if in_run {
            self.inner.run_subscriptions.write().push(id);
        }
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    pub(crate) fn emit(&self, event: &LifecycleEvent<'_>) {
        debug!(app = %self.inner.name, event = %event.name(), "Emit");
        self.inner.events.emit(event);
    }
}

impl fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("name", &self.inner.name)
            .field("env", &self.inner.env)
            .field("working_path", &self.inner.working_path)
            .field("state", &self.state())
            .field("services", &self.service_names())
            .finish_non_exhaustive()
    }
}

fn absolute_working_path(path: Option<&Path>) -> PathBuf {
    let cwd = std::env::current_dir();
    match (path, cwd) {
        (Some(path), _) if path.is_absolute() => path.to_path_buf(),
        (Some(path), Ok(cwd)) => cwd.join(path),
        (None, Ok(cwd)) => cwd,
        (Some(path), Err(e)) => {
            warn!(error = %e, "Current directory unavailable, keeping relative working path");
            path.to_path_buf()
        }
        (None, Err(e)) => {
            warn!(error = %e, "Current directory unavailable, using \".\" as working path");
            PathBuf::from(".")
        }
    }
}

fn resolve_against(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
