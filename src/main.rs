//! # Stagehand demo
//!
//! Starts an app from an in-memory configuration:
//! 1. `processEnv` (INIT) sets `GREETING_TARGET`.
//! 2. `lruCache` (SERVICE) registers a `greetings` cache.
//! 3. `greeter` (PLUGIN), an application feature, registers a [`Greeter`] service that
//!    reads the variable.
//!
//! The worker then builds a greeting and caches it before the app stops.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use stagehand::{
    parse_options, setup_tracing, App, AppError, BoxError, ContainerError, ContainerOptions, Feature, FeatureKind,
    LifecycleEvent, LruCacheService, Runner, ServiceContainer,
};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct GreeterOptions {
    #[serde(default = "default_salutation")]
    salutation: String,
}

fn default_salutation() -> String {
    "Hello".to_owned()
}

#[derive(Debug)]
struct Greeter {
    salutation: String,
    target: String,
}

impl Greeter {
    fn greet(&self) -> String {
        format!("{}, {}!", self.salutation, self.target)
    }
}

struct GreeterFeature;

#[async_trait]
impl Feature for GreeterFeature {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Plugin
    }

    async fn load(&self, container: &ServiceContainer, options: Value) -> Result<(), ContainerError> {
        let options: GreeterOptions = parse_options("greeter", options)?;
        let target = container.env_var("GREETING_TARGET").unwrap_or_else(|| "stranger".to_owned());
        container.register_service(
            "greeter",
            Greeter {
                salutation: options.salutation,
                target,
            },
            false,
        )
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    setup_tracing();

    let config = json!({
        "processEnv": { "GREETING_TARGET": "world" },
        "lruCache": { "resources": { "greetings": { "max": 16 } } },
        "greeter": { "salutation": "Hello" }
    });
    let app = App::new(
        "demo",
        ContainerOptions::default().with_config(config.as_object().cloned().unwrap_or_default()),
    );
    app.register_feature("greeter", GreeterFeature);
    app.subscribe(|event: &LifecycleEvent<'_>| debug!(event = %event.name(), "Lifecycle event"));

    let greeting = Runner::from(app)
        .run(|container| async move {
            let greeter = container
                .get_service::<Greeter>("greeter")
                .ok_or("greeter service is not registered")?;
            let caches = container
                .get_service::<LruCacheService>("lruCache")
                .ok_or("lruCache service is not registered")?;

            let greeting = greeter.greet();
            caches.res("greetings")?.put(greeter.target.clone(), json!(greeting));
            info!(app = %container.name(), target = %greeter.target, "Greeting cached");
            Ok::<_, BoxError>(greeting)
        })
        .await?;

    info!(%greeting, "Done");
    Ok(())
}
