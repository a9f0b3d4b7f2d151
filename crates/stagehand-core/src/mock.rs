//! # Test Doubles
//!
//! Instrumented stand-ins for exercising the container without real features.
//!
//! | Double | Records | Typical assertion |
//! |--------|---------|-------------------|
//! | [`RecordingFeature`] | load start/finish in a shared [`LoadJournal`] | stage ordering, failures |
//! | [`CountingSource`] | module loads per path | resolution caching |
//! | [`EventRecorder`] | every emitted event name | event sequence |
//!
//! ## Example
//!
//! ```rust
//! use stagehand_core::mock::{EventRecorder, LoadJournal, RecordingFeature};
//! use stagehand_core::{ContainerOptions, FeatureKind, ModuleCatalog, ServiceContainer};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let journal = LoadJournal::new();
//!     let catalog = ModuleCatalog::new();
//!     catalog.register_feature("/builtin", "audit", RecordingFeature::new("audit", FeatureKind::Final, &journal));
//!
//!     let config = json!({ "audit": {} }).as_object().cloned().unwrap();
//!     let app = ServiceContainer::with_module_source(
//!         "demo",
//!         ContainerOptions::default()
//!             .with_builtin_features_path("/builtin")
//!             .with_config(config),
//!         Arc::new(catalog),
//!     );
//!     let events = EventRecorder::attach(&app);
//!
//!     app.start().await.unwrap();
//!     assert_eq!(journal.finished(), vec!["audit"]);
//!     assert!(events.names().contains(&"after:load:audit".to_string()));
//! }
//! ```

use crate::container::ServiceContainer;
use crate::error::ContainerError;
use crate::feature::{Feature, FeatureKind, FeatureModule};
use crate::registry::{ModuleCatalog, ModuleSource};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One step recorded by a [`RecordingFeature`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Started(String),
    Finished(String),
}

/// Shared, ordered log of feature loads.
#[derive(Debug, Clone, Default)]
pub struct LoadJournal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl LoadJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    /// Feature names in the order their loads finished.
    pub fn finished(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Finished(name) => Some(name.clone()),
                JournalEntry::Started(_) => None,
            })
            .collect()
    }

    pub fn position(&self, entry: &JournalEntry) -> Option<usize> {
        self.entries.lock().iter().position(|seen| seen == entry)
    }

    fn record(&self, entry: JournalEntry) {
        self.entries.lock().push(entry);
    }
}

type LoadHook = Arc<dyn Fn(&ServiceContainer, &Value) -> Result<(), ContainerError> + Send + Sync>;

/// A feature that journals its load and can be told to sleep, fail or run a hook.
#[derive(Clone)]
pub struct RecordingFeature {
    name: String,
    kind: FeatureKind,
    journal: LoadJournal,
    delay: Option<Duration>,
    failure: Option<String>,
    hook: Option<LoadHook>,
}

impl RecordingFeature {
    pub fn new(name: impl Into<String>, kind: FeatureKind, journal: &LoadJournal) -> Self {
        Self {
            name: name.into(),
            kind,
            journal: journal.clone(),
            delay: None,
            failure: None,
            hook: None,
        }
    }

    /// Sleep before finishing, to give other members of the group a chance to run.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the load with [`ContainerError::Custom`].
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Run `hook` with the container and options during load, after any delay.
    pub fn on_load<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ServiceContainer, &Value) -> Result<(), ContainerError> + Send + Sync + 'static,
    {
        self.hook = Some(Arc::new(hook));
        self
    }

    pub fn into_module(self) -> FeatureModule {
        FeatureModule::feature(self)
    }
}

#[async_trait]
impl Feature for RecordingFeature {
    fn kind(&self) -> FeatureKind {
        self.kind
    }

    async fn load(&self, container: &ServiceContainer, options: Value) -> Result<(), ContainerError> {
        self.journal.record(JournalEntry::Started(self.name.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(hook) = &self.hook {
            hook(container, &options)?;
        }
        if let Some(message) = &self.failure {
            return Err(ContainerError::Custom(message.clone()));
        }
        self.journal.record(JournalEntry::Finished(self.name.clone()));
        Ok(())
    }
}

/// A [`ModuleCatalog`] that counts how often each module is loaded.
#[derive(Debug, Default)]
pub struct CountingSource {
    catalog: ModuleCatalog,
    loads: Mutex<HashMap<PathBuf, usize>>,
}

impl CountingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    pub fn load_count(&self, path: impl AsRef<Path>) -> usize {
        self.loads.lock().get(path.as_ref()).copied().unwrap_or(0)
    }

    pub fn total_loads(&self) -> usize {
        self.loads.lock().values().sum()
    }
}

impl ModuleSource for CountingSource {
    fn contains(&self, path: &Path) -> bool {
        self.catalog.contains(path)
    }

    fn load(&self, path: &Path) -> Option<FeatureModule> {
        let module = self.catalog.load(path)?;
        *self.loads.lock().entry(path.to_path_buf()).or_default() += 1;
        Some(module)
    }

    fn modules_under(&self, dir: &Path) -> Vec<PathBuf> {
        self.catalog.modules_under(dir)
    }
}

/// Records the name of every event a container emits.
#[derive(Debug, Clone, Default)]
pub struct EventRecorder {
    names: Arc<Mutex<Vec<String>>>,
}

impl EventRecorder {
    pub fn attach(container: &ServiceContainer) -> Self {
        let recorder = Self::default();
        let sink = Arc::clone(&recorder.names);
        container.subscribe(move |event| sink.lock().push(event.name()));
        recorder
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().clone()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.lock().iter().position(|seen| seen == name)
    }
}
