//! # Container Errors
//!
//! Error types shared by the registry, the resolver, the config loader and the
//! container lifecycle. Every fatal startup condition maps to one variant of
//! [`ContainerError`], so callers of `start()` can match on the exact cause.

use crate::feature::FeatureKind;
use std::path::PathBuf;

/// Opaque error produced by collaborator code (cleanup futures, workers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures while turning a feature name into a descriptor.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Invalid registry value for feature \"{0}\".")]
    InvalidRegistryEntry(String),
    #[error("Don't know where to load feature \"{0}\".")]
    FeatureNotFound(String),
    #[error("Cannot find module \"{}\" for feature \"{feature}\".", .path.display())]
    ModuleNotFound { feature: String, path: PathBuf },
    #[error("Invalid feature object loaded from \"{}\".", .0.display())]
    InvalidFeatureObject(PathBuf),
}

/// Failures of the configuration loader and its providers.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed config file \"{}\": {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Config file \"{}\" must contain a JSON object", .0.display())]
    NotAnObject(PathBuf),
}

/// Errors raised by the service container and the staged loader.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("Empty configuration. Nothing to do! Config path: {}", .config_path.display())]
    EmptyConfig { config_path: PathBuf },
    #[error("Invalid feature type. Feature: {feature}, type: {kind}")]
    InvalidFeatureType { feature: String, kind: FeatureKind },
    #[error("Configuration stage still produced CONF features after {0} passes")]
    ConfigStageOverflow(usize),
    #[error("Feature \"{feature}\" failed to load: {source}")]
    FeatureLoad {
        feature: String,
        #[source]
        source: Box<ContainerError>,
    },
    #[error("Service \"{0}\" already registered!")]
    ServiceAlreadyRegistered(String),
    #[error("Invalid configuration at \"{item}\": {message}")]
    InvalidConfiguration { item: String, message: String },
    #[error("No config loader attached to the container")]
    NoConfigLoader,
    #[error("Container has been dropped")]
    ContainerDropped,
    #[error("Cleanup failed: {0}")]
    Cleanup(BoxError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Custom(String),
}

impl ContainerError {
    /// Shorthand for [`ContainerError::InvalidConfiguration`].
    pub fn invalid_config(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            item: item.into(),
            message: message.into(),
        }
    }

    /// The innermost error, unwrapping nested [`ContainerError::FeatureLoad`] layers.
    pub fn root_cause(&self) -> &ContainerError {
        match self {
            Self::FeatureLoad { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
