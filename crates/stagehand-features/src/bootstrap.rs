//! `bootstrap` (INIT): run the application's bootstrap hooks.
//!
//! A hook is any feature module published below the bootstrap directory,
//! `<workingPath>/bootstrap` unless `path` says otherwise (relative to the working path).
//! Hooks run one at a time in path order, each with `null` options; their declared kind is
//! ignored. The first failing hook stops the run.
//!
//! ```json
//! { "bootstrap": { "path": "boot" } }
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use stagehand_core::{parse_options, ContainerError, Feature, FeatureKind, ResolutionError, ServiceContainer};
use std::path::PathBuf;
use tracing::{debug, info};

pub const NAME: &str = "bootstrap";

/// Hook directory, relative to the working path.
pub const DEFAULT_BOOTSTRAP_PATH: &str = "bootstrap";

#[derive(Debug, Default, Deserialize)]
struct BootstrapOptions {
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Bootstrap;

#[async_trait]
impl Feature for Bootstrap {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Init
    }

    async fn load(&self, container: &ServiceContainer, options: Value) -> Result<(), ContainerError> {
        let options: BootstrapOptions = parse_options(NAME, options)?;
        let dir = container.to_absolute_path(options.path.unwrap_or_else(|| PathBuf::from(DEFAULT_BOOTSTRAP_PATH)));

        let hooks = container.modules_under(&dir);
        for (path, module) in &hooks {
            let hook = module
                .as_feature()
                .ok_or_else(|| ResolutionError::InvalidFeatureObject(path.clone()))?;
            debug!(hook = %path.display(), "Running bootstrap hook");
            hook.load(container, Value::Null).await?;
        }

        info!(app = %container.name(), dir = %dir.display(), hooks = hooks.len(), "Bootstrap finished");
        Ok(())
    }
}
