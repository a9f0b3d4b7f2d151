//! `configByHostname` (CONF): replace the configuration with a host-specific file.
//!
//! Reads `<configPath>/<configName>.<host>.json`, where `host` comes from the
//! `altUserForTest` option or the `hostname` command. The loaded document replaces the
//! current configuration entirely.

use crate::probe::{command_output, ProbeOptions};
use async_trait::async_trait;
use serde_json::Value;
use stagehand_core::{parse_options, ContainerError, Feature, FeatureKind, JsonConfigProvider, ServiceContainer};
use tracing::info;

pub const NAME: &str = "configByHostname";

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigByHostname;

#[async_trait]
impl Feature for ConfigByHostname {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Conf
    }

    async fn load(&self, container: &ServiceContainer, options: Value) -> Result<(), ContainerError> {
        let options: ProbeOptions = parse_options(NAME, options)?;
        let host = match options.alt_user_for_test {
            Some(host) => host,
            None => command_output("hostname", &[])
                .await
                .map_err(|e| ContainerError::Custom(format!("Unable to read \"hostname\" from environment: {e}")))?,
        };
        let host = host.trim();
        if host.is_empty() {
            return Err(ContainerError::Custom(
                "Unable to read \"hostname\" from environment.".to_owned(),
            ));
        }

        let path = container
            .config_path()
            .join(format!("{}.{host}.json", container.config_name()));
        info!(app = %container.name(), %host, path = %path.display(), "Switching to host config");
        container.set_config_provider(JsonConfigProvider::new(path));
        container.load_config().await
    }
}
