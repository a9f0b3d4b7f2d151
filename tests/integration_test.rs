use serde_json::{json, Value};
use stagehand::{
    feature_fn, start_worker, App, AppError, BoxError, ContainerError, ContainerOptions, FeatureKind,
    LifecycleEvent, LifecycleState, LruCacheService, Runner, ServiceContainer,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn in_memory(name: &str, config: Value) -> App {
    App::new(
        name,
        ContainerOptions::default().with_config(config.as_object().cloned().expect("object config")),
    )
}

fn write_conf(dir: &Path, file: &str, body: Value) {
    let conf = dir.join("conf");
    std::fs::create_dir_all(&conf).unwrap();
    std::fs::write(conf.join(file), body.to_string()).unwrap();
}

/// Builtins and an application feature load from one configuration.
#[tokio::test]
async fn app_loads_builtin_and_application_features() {
    let app = in_memory(
        "svc",
        json!({
            "processEnv": { "REGION": "eu-west" },
            "lruCache": { "resources": { "sessions": { "max": 8 } } },
            "regionTag": {}
        }),
    );
    app.register_feature(
        "regionTag",
        feature_fn(FeatureKind::Plugin, |container: ServiceContainer, _| async move {
            let region = container.env_var("REGION").unwrap_or_default();
            container.register_service("regionTag", format!("region:{region}"), false)
        }),
    );

    app.start().await.unwrap();

    assert_eq!(*app.get_service::<String>("regionTag").unwrap(), "region:eu-west");
    let caches = app.get_service::<LruCacheService>("lruCache").unwrap();
    assert_eq!(caches.res("sessions").unwrap().max(), 8);
    assert_eq!(app.loaded_features(), vec!["processEnv", "lruCache", "regionTag"]);

    app.stop().await.unwrap();
    assert_eq!(app.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn runner_returns_worker_output_and_stops() {
    let app = in_memory("svc", json!({ "processEnv": { "MODE": "batch" } }));
    let container = app.container().clone();

    let mode = Runner::from(app)
        .run(|container| async move { Ok::<_, BoxError>(container.env_var("MODE")) })
        .await
        .unwrap();

    assert_eq!(mode.as_deref(), Some("batch"));
    assert_eq!(container.state(), LifecycleState::Stopped);
    assert_eq!(container.env_var("MODE"), std::env::var("MODE").ok());
}

#[tokio::test]
async fn runner_stops_even_when_the_worker_fails() {
    let app = in_memory("svc", json!({ "processEnv": {} }));
    let cleanups = Arc::new(AtomicUsize::new(0));
    let counter = cleanups.clone();
    app.on("stopping", move |event| {
        if let LifecycleEvent::Stopping(stoppers) = event {
            let counter = counter.clone();
            stoppers.push(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
    });
    let container = app.container().clone();

    let err = Runner::from(app)
        .run(|_| async { Err::<(), BoxError>("boom".into()) })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Worker(_)));
    assert_eq!(err.to_string(), "worker failed: boom");
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(container.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn runner_does_not_call_the_worker_when_start_fails() {
    let app = in_memory("svc", json!({ "missingFeature": {} }));
    let called = Arc::new(AtomicUsize::new(0));
    let seen = called.clone();

    let err = Runner::from(app)
        .run(|_| async move {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(())
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Container(_)));
    assert_eq!(called.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn start_worker_reads_configuration_from_the_working_path() {
    let dir = tempfile::tempdir().unwrap();
    write_conf(dir.path(), "job.default.json", json!({ "processEnv": { "JOB_NAME": "${app.name}" } }));
    write_conf(dir.path(), "job.development.json", json!({ "processEnv": { "JOB_ENV": "${env}" } }));

    let (name, job, env) = start_worker(dir.path(), "job", Some("nightly"), |container| async move {
        Ok::<_, BoxError>((
            container.name().to_owned(),
            container.env_var("JOB_NAME"),
            container.env().to_owned(),
        ))
    })
    .await
    .unwrap();

    assert_eq!(name, "nightly");
    assert_eq!(job.as_deref(), Some("nightly"));
    assert!(!env.is_empty());
}

#[tokio::test]
async fn start_worker_without_configuration_fails() {
    let dir = tempfile::tempdir().unwrap();

    let err = start_worker(dir.path(), "job", None, |_| async { Ok::<_, BoxError>(()) })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Container(ContainerError::EmptyConfig { .. })));
}

#[tokio::test]
async fn bootstrap_hooks_registered_on_the_app_run_at_init() {
    let app = in_memory("svc", json!({ "bootstrap": {}, "lruCache": {} }));
    app.register_bootstrap_hook(
        "seed",
        feature_fn(FeatureKind::Init, |container: ServiceContainer, _| async move {
            container.register_service("seeded", true, false)
        }),
    );

    app.start().await.unwrap();

    assert!(*app.get_service::<bool>("seeded").unwrap());
    assert!(app.is_loaded("bootstrap"));
}
