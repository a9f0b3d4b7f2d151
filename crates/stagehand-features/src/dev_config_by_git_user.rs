//! `devConfigByGitUser` (CONF): switch to a developer's own configuration file.
//!
//! The developer name is the local part of `altUserForTest` or of
//! `git config --global user.email`. When `<configPath>/<configName>.<developer>.json`
//! exists it replaces the configuration; otherwise nothing changes. An unreadable git
//! identity is only a warning.

use crate::probe::{command_output, ProbeOptions};
use async_trait::async_trait;
use serde_json::Value;
use stagehand_core::{parse_options, ContainerError, Feature, FeatureKind, JsonConfigProvider, ServiceContainer};
use tracing::{debug, info, warn};

pub const NAME: &str = "devConfigByGitUser";

#[derive(Debug, Clone, Copy, Default)]
pub struct DevConfigByGitUser;

/// `jane@example.com` -> `jane`. A value without `@` is used whole.
fn developer_name(email: &str) -> &str {
    email.split_once('@').map_or(email, |(local, _)| local)
}

#[async_trait]
impl Feature for DevConfigByGitUser {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Conf
    }

    async fn load(&self, container: &ServiceContainer, options: Value) -> Result<(), ContainerError> {
        let options: ProbeOptions = parse_options(NAME, options)?;
        let email = match options.alt_user_for_test {
            Some(email) => email,
            None => command_output("git", &["config", "--global", "user.email"])
                .await
                .unwrap_or_else(|e| {
                    debug!(error = %e, "git user.email probe failed");
                    String::new()
                }),
        };

        let developer = developer_name(email.trim());
        if developer.is_empty() {
            warn!(app = %container.name(), "Unable to read \"user.email\" of git config.");
            return Ok(());
        }

        let path = container
            .config_path()
            .join(format!("{}.{developer}.json", container.config_name()));
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(%developer, path = %path.display(), "No developer config");
            return Ok(());
        }

        info!(app = %container.name(), %developer, path = %path.display(), "Switching to developer config");
        container.set_config_provider(JsonConfigProvider::new(path));
        container.load_config().await
    }
}
