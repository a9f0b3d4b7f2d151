//! # Configuration Loading
//!
//! The container's configuration is a [`ConfigDocument`]: an insertion-ordered JSON object
//! whose top-level keys name features and whose values are those features' options.
//!
//! A [`ConfigLoader`] wraps a swappable [`ConfigProvider`]. Two providers ship here:
//!
//! - [`JsonConfigProvider`] reads a single JSON file;
//! - [`EnvAwareJsonProvider`] reads `<name>.default.json` and deep-merges
//!   `<name>.<env>.json` over it.
//!
//! A file that does not exist yields an empty document. Malformed JSON or a non-object
//! root is an error.
//!
//! ## Placeholders
//!
//! String values may reference `${env}`, `${app.name}`, `${app.workingPath}` and
//! `${app.configPath}`. They are substituted from [`ConfigVariables`] after merging.
//! Unknown placeholders are left untouched.

use crate::container::ServiceContainer;
use crate::error::ConfigError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, Span};

/// Feature name -> options, in insertion order.
pub type ConfigDocument = Map<String, Value>;

/// Values a provider may substitute into configuration templates.
#[derive(Debug, Clone)]
pub struct ConfigVariables {
    app: ServiceContainer,
    log: Span,
    env: String,
}

impl ConfigVariables {
    pub fn new(app: &ServiceContainer) -> Self {
        Self {
            app: app.clone(),
            log: tracing::info_span!("config", app = %app.name(), env = %app.env()),
            env: app.env().to_owned(),
        }
    }

    pub fn app(&self) -> &ServiceContainer {
        &self.app
    }

    /// Span that config providers log under.
    pub fn log(&self) -> &Span {
        &self.log
    }

    pub fn env(&self) -> &str {
        &self.env
    }

    /// Value of a `${...}` placeholder, if it is a known variable.
    pub fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "env" => Some(self.env.clone()),
            "app.name" => Some(self.app.name().to_owned()),
            "app.workingPath" => Some(self.app.working_path().display().to_string()),
            "app.configPath" => Some(self.app.config_path().display().to_string()),
            _ => None,
        }
    }
}

/// Source of a configuration document.
#[async_trait]
pub trait ConfigProvider: Send + Sync + 'static {
    async fn load(&self, variables: &ConfigVariables) -> Result<ConfigDocument, ConfigError>;
}

/// Reads one JSON file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonConfigProvider {
    path: PathBuf,
}

impl JsonConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigProvider for JsonConfigProvider {
    async fn load(&self, variables: &ConfigVariables) -> Result<ConfigDocument, ConfigError> {
        let mut document = read_document(&self.path).await?;
        substitute_variables(&mut document, variables);
        debug!(parent: variables.log(), path = %self.path.display(), keys = document.len(), "Config loaded");
        Ok(document)
    }
}

/// Reads `<name>.default.json` and overlays `<name>.<env>.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvAwareJsonProvider {
    config_path: PathBuf,
    name: String,
    env: String,
}

impl EnvAwareJsonProvider {
    pub fn new(config_path: impl Into<PathBuf>, name: impl Into<String>, env: impl Into<String>) -> Self {
        Self {
            config_path: config_path.into(),
            name: name.into(),
            env: env.into(),
        }
    }

    pub fn default_file(&self) -> PathBuf {
        self.config_path.join(format!("{}.default.json", self.name))
    }

    pub fn env_file(&self) -> PathBuf {
        self.config_path.join(format!("{}.{}.json", self.name, self.env))
    }
}

#[async_trait]
impl ConfigProvider for EnvAwareJsonProvider {
    async fn load(&self, variables: &ConfigVariables) -> Result<ConfigDocument, ConfigError> {
        let mut document = read_document(&self.default_file()).await?;
        let overlay = read_document(&self.env_file()).await?;
        merge_documents(&mut document, overlay);
        substitute_variables(&mut document, variables);
        debug!(parent: variables.log(), env = %self.env, keys = document.len(), "Environment-aware config loaded");
        Ok(document)
    }
}

/// Deep-merge `overlay` into `base`. Objects merge key by key; any other value replaces.
pub fn merge_documents(base: &mut ConfigDocument, overlay: ConfigDocument) {
    for (key, value) in overlay {
        match value {
            Value::Object(incoming) => match base.get_mut(&key) {
                Some(Value::Object(existing)) => merge_documents(existing, incoming),
                _ => {
                    base.insert(key, Value::Object(incoming));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}

async fn read_document(path: &Path) -> Result<ConfigDocument, ConfigError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ConfigDocument::new()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    match serde_json::from_str(&raw) {
        Ok(Value::Object(document)) => Ok(document),
        Ok(_) => Err(ConfigError::NotAnObject(path.to_path_buf())),
        Err(source) => Err(ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn substitute_variables(document: &mut ConfigDocument, variables: &ConfigVariables) {
    for value in document.values_mut() {
        substitute_value(value, variables);
    }
}

fn substitute_value(value: &mut Value, variables: &ConfigVariables) {
    match value {
        Value::String(text) if text.contains("${") => *text = interpolate(text, variables),
        Value::Array(items) => items.iter_mut().for_each(|item| substitute_value(item, variables)),
        Value::Object(map) => substitute_variables(map, variables),
        _ => {}
    }
}

fn interpolate(text: &str, variables: &ConfigVariables) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let key = &after[..end];
                match variables.lookup(key) {
                    Some(replacement) => out.push_str(&replacement),
                    None => out.push_str(&rest[start..start + 3 + end]),
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Loads configuration through a swappable provider.
#[derive(Clone)]
pub struct ConfigLoader {
    provider: Arc<dyn ConfigProvider>,
}

impl ConfigLoader {
    pub fn new(provider: impl ConfigProvider) -> Self {
        Self::from_shared(Arc::new(provider))
    }

    pub fn from_shared(provider: Arc<dyn ConfigProvider>) -> Self {
        Self { provider }
    }

    /// Loader reading `<config_path>/<name>.json`.
    pub fn json(config_path: &Path, name: &str) -> Self {
        Self::new(JsonConfigProvider::new(config_path.join(format!("{name}.json"))))
    }

    pub fn env_aware(config_path: &Path, name: &str, env: &str) -> Self {
        Self::new(EnvAwareJsonProvider::new(config_path, name, env))
    }

    pub fn set_provider(&mut self, provider: Arc<dyn ConfigProvider>) {
        self.provider = provider;
    }

    pub async fn load(&self, variables: &ConfigVariables) -> Result<ConfigDocument, ConfigError> {
        self.provider.load(variables).await
    }
}

impl fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigLoader").finish_non_exhaustive()
    }
}
