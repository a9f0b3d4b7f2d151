//! `processEnv` (INIT): copy configured variables into the container's environment.
//!
//! ```json
//! { "processEnv": { "LOG_LEVEL": "debug", "WORKERS": 4 } }
//! ```
//!
//! Values are written to the container's [`EnvOverrides`](stagehand_core::EnvOverrides),
//! never to the process environment. Non-string values are stored as their JSON text.

use async_trait::async_trait;
use serde_json::Value;
use stagehand_core::{ContainerError, Feature, FeatureKind, ServiceContainer};
use tracing::debug;

pub const NAME: &str = "processEnv";

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

#[async_trait]
impl Feature for ProcessEnv {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Init
    }

    async fn load(&self, container: &ServiceContainer, options: Value) -> Result<(), ContainerError> {
        let variables = match options {
            Value::Object(variables) => variables,
            Value::Null => return Ok(()),
            other => {
                return Err(ContainerError::invalid_config(
                    NAME,
                    format!("expected an object of variables, got {other}"),
                ))
            }
        };

        for (key, value) in variables {
            let value = match value {
                Value::String(text) => text,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            debug!(app = %container.name(), %key, "Environment override");
            container.set_env_var(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stagehand_core::ContainerOptions;

    #[tokio::test]
    async fn non_string_values_are_stringified() {
        let app = ServiceContainer::new("test", ContainerOptions::default());
        ProcessEnv
            .load(&app, json!({ "PORT": 8080, "DEBUG": true, "NAME": "api", "EMPTY": null }))
            .await
            .unwrap();

        assert_eq!(app.env_var("PORT").as_deref(), Some("8080"));
        assert_eq!(app.env_var("DEBUG").as_deref(), Some("true"));
        assert_eq!(app.env_var("NAME").as_deref(), Some("api"));
        assert_eq!(app.env_var("EMPTY").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn list_options_are_rejected() {
        let app = ServiceContainer::new("test", ContainerOptions::default());
        let err = ProcessEnv.load(&app, json!(["FOO=bar"])).await.unwrap_err();
        assert!(matches!(err, ContainerError::InvalidConfiguration { ref item, .. } if item == NAME));
    }
}
