use serde_json::{json, Value};
use stagehand_core::mock::{CountingSource, EventRecorder, JournalEntry, LoadJournal, RecordingFeature};
use stagehand_core::{
    feature_fn, BoxError, ConfigDocument, ContainerError, ContainerOptions, FeatureDescriptor, FeatureKind,
    FeatureRegistry, LifecycleEvent, LifecycleState, ModuleCatalog, RegistryEntry, ResolutionError, ServiceContainer,
};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

// --- Helpers ---

const BUILTIN: &str = "/builtin";
const APP_FEATURES: &str = "/app/features";

fn document(value: Value) -> ConfigDocument {
    value.as_object().cloned().expect("config must be an object")
}

fn options(config: Value) -> ContainerOptions {
    ContainerOptions::default()
        .with_working_path("/app")
        .with_builtin_features_path(BUILTIN)
        .with_config(document(config))
}

fn app_with(catalog: ModuleCatalog, config: Value) -> ServiceContainer {
    ServiceContainer::with_module_source("test", options(config), Arc::new(catalog))
}

fn recording(catalog: &ModuleCatalog, journal: &LoadJournal, name: &str, kind: FeatureKind) {
    catalog.register_feature(BUILTIN, name, RecordingFeature::new(name, kind, journal));
}

fn finished_at(journal: &LoadJournal, name: &str) -> usize {
    journal
        .position(&JournalEntry::Finished(name.into()))
        .unwrap_or_else(|| panic!("{name} never finished"))
}

fn started_at(journal: &LoadJournal, name: &str) -> usize {
    journal
        .position(&JournalEntry::Started(name.into()))
        .unwrap_or_else(|| panic!("{name} never started"))
}

// --- Stage ordering ---

#[tokio::test]
async fn stages_settle_in_order_and_members_overlap() {
    let journal = LoadJournal::new();
    let catalog = ModuleCatalog::new();
    catalog.register_feature(
        BUILTIN,
        "slowInit",
        RecordingFeature::new("slowInit", FeatureKind::Init, &journal).with_delay(Duration::from_millis(20)),
    );
    recording(&catalog, &journal, "fastInit", FeatureKind::Init);
    recording(&catalog, &journal, "store", FeatureKind::Service);
    recording(&catalog, &journal, "routes", FeatureKind::Plugin);
    recording(&catalog, &journal, "banner", FeatureKind::Final);

    let app = app_with(
        catalog,
        json!({ "banner": {}, "routes": {}, "store": {}, "slowInit": {}, "fastInit": {} }),
    );
    app.start().await.unwrap();

    assert!(app.is_started());
    assert!(started_at(&journal, "fastInit") < finished_at(&journal, "slowInit"));
    assert!(finished_at(&journal, "slowInit") < started_at(&journal, "store"));
    assert!(finished_at(&journal, "fastInit") < started_at(&journal, "store"));
    assert!(finished_at(&journal, "store") < started_at(&journal, "routes"));
    assert!(finished_at(&journal, "routes") < started_at(&journal, "banner"));
    for name in ["slowInit", "fastInit", "store", "routes", "banner"] {
        assert!(app.is_loaded(name), "{name} should be loaded");
        assert!(app.enabled(name));
    }
}

#[tokio::test]
async fn events_follow_the_stage_sequence() {
    let journal = LoadJournal::new();
    let catalog = ModuleCatalog::new();
    recording(&catalog, &journal, "env", FeatureKind::Init);
    recording(&catalog, &journal, "svc", FeatureKind::Service);

    let app = app_with(catalog, json!({ "svc": {}, "env": {} }));
    let events = EventRecorder::attach(&app);
    app.start().await.unwrap();

    assert_eq!(
        events.names(),
        [
            "configLoaded",
            "before:INIT",
            "before:load:env",
            "after:load:env",
            "after:INIT",
            "before:SERVICE",
            "before:load:svc",
            "after:load:svc",
            "after:SERVICE",
            "before:PLUGIN",
            "after:PLUGIN",
            "before:FINAL",
            "after:FINAL",
            "ready",
        ]
    );
}

// --- Configuration stage ---

#[tokio::test]
async fn conf_feature_can_add_features_to_later_stages() {
    let journal = LoadJournal::new();
    let catalog = ModuleCatalog::new();
    catalog.register_feature(
        BUILTIN,
        "overlay",
        RecordingFeature::new("overlay", FeatureKind::Conf, &journal).on_load(|app, _| {
            app.update_config(|config| {
                config.insert("secondOverlay".into(), json!({}));
            });
            Ok(())
        }),
    );
    catalog.register_feature(
        BUILTIN,
        "secondOverlay",
        RecordingFeature::new("secondOverlay", FeatureKind::Conf, &journal).on_load(|app, _| {
            app.update_config(|config| {
                config.insert("late".into(), json!({ "from": "overlay" }));
            });
            Ok(())
        }),
    );
    recording(&catalog, &journal, "late", FeatureKind::Init);

    let app = app_with(catalog, json!({ "overlay": {} }));
    let events = EventRecorder::attach(&app);
    app.start().await.unwrap();

    assert_eq!(journal.finished(), ["overlay", "secondOverlay", "late"]);
    let config = app.config();
    assert!(!config.contains_key("overlay"));
    assert!(!config.contains_key("secondOverlay"));
    assert_eq!(config["late"], json!({ "from": "overlay" }));
    assert_eq!(events.names().iter().filter(|name| *name == "before:CONF").count(), 2);
}

#[tokio::test]
async fn conf_scan_skips_names_a_conf_feature_later_registers() {
    let journal = LoadJournal::new();
    let catalog = ModuleCatalog::new();
    catalog.register_feature(
        BUILTIN,
        "vendorPaths",
        RecordingFeature::new("vendorPaths", FeatureKind::Conf, &journal).on_load(|app, _| {
            app.add_feature_registry(FeatureRegistry::new().with_fallback("/vendor"));
            Ok(())
        }),
    );
    catalog.register_feature("/vendor", "metrics", RecordingFeature::new("metrics", FeatureKind::Plugin, &journal));

    let app = app_with(catalog, json!({ "metrics": {}, "vendorPaths": {} }));
    app.start().await.unwrap();

    assert!(app.is_loaded("metrics"));
    let descriptor = app.resolve_feature("metrics").unwrap();
    assert_eq!(descriptor.origin(), Path::new("/vendor/metrics"));
}

#[tokio::test]
async fn self_reinserting_conf_feature_hits_the_pass_limit() {
    let catalog = ModuleCatalog::new();
    catalog.register_feature(
        BUILTIN,
        "again",
        feature_fn(FeatureKind::Conf, |app, _| async move {
            app.update_config(|config| {
                config.insert("again".into(), json!({}));
            });
            Ok(())
        }),
    );

    let app = ServiceContainer::with_module_source(
        "test",
        options(json!({ "again": {} })).with_max_conf_passes(3),
        Arc::new(catalog),
    );

    let err = app.start().await.unwrap_err();
    assert!(matches!(err, ContainerError::ConfigStageOverflow(3)));
    assert_eq!(app.state(), LifecycleState::Stopped);
}

// --- Resolution ---

#[tokio::test]
async fn application_feature_directory_shadows_builtin() {
    let journal = LoadJournal::new();
    let catalog = ModuleCatalog::new();
    catalog.register_feature(BUILTIN, "cache", RecordingFeature::new("builtin-cache", FeatureKind::Service, &journal));
    catalog.register_feature(
        APP_FEATURES,
        "cache",
        RecordingFeature::new("app-cache", FeatureKind::Service, &journal),
    );

    let app = app_with(catalog, json!({ "cache": {} }));
    app.start().await.unwrap();

    assert_eq!(journal.finished(), ["app-cache"]);
}

#[tokio::test]
async fn resolving_twice_returns_the_cached_descriptor() {
    let journal = LoadJournal::new();
    let source = Arc::new(CountingSource::new());
    source
        .catalog()
        .register_feature(BUILTIN, "store", RecordingFeature::new("store", FeatureKind::Service, &journal));

    let app = ServiceContainer::with_module_source("test", options(json!({ "store": {} })), source.clone());
    app.start().await.unwrap();

    let first = app.resolve_feature("store").unwrap();
    let second = app.resolve_feature("store").unwrap();
    assert!(FeatureDescriptor::ptr_eq(&first, &second));
    assert_eq!(source.load_count("/builtin/store"), 1);
}

#[tokio::test]
async fn unknown_feature_fails_startup() {
    let app = app_with(ModuleCatalog::new(), json!({ "imap": { "host": "mail" } }));
    let err = app.start().await.unwrap_err();

    assert!(matches!(
        err,
        ContainerError::Resolution(ResolutionError::FeatureNotFound(ref name)) if name == "imap"
    ));
    assert_eq!(app.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn empty_registry_entry_fails_startup() {
    let journal = LoadJournal::new();
    let catalog = ModuleCatalog::new();
    catalog.register_feature(
        BUILTIN,
        "registrar",
        RecordingFeature::new("registrar", FeatureKind::Conf, &journal).on_load(|app, _| {
            app.add_feature_registry(FeatureRegistry::new().with_entry("broken", RegistryEntry::Parts(vec![])));
            Ok(())
        }),
    );

    let app = app_with(catalog, json!({ "registrar": {}, "broken": {} }));
    let err = app.start().await.unwrap_err();

    assert_eq!(err.to_string(), "Invalid registry value for feature \"broken\".");
}

#[tokio::test]
async fn disallowed_keys_are_ignored() {
    let journal = LoadJournal::new();
    let catalog = ModuleCatalog::new();
    recording(&catalog, &journal, "store", FeatureKind::Service);

    let app = ServiceContainer::with_module_source(
        "test",
        options(json!({ "store": {}, "notAFeature": { "anything": 1 } })).with_allowed_features(["store"]),
        Arc::new(catalog),
    );
    app.start().await.unwrap();

    assert!(app.is_loaded("store"));
    assert!(!app.enabled("notAFeature"));
}

// --- Failures ---

#[tokio::test]
async fn empty_configuration_is_rejected_after_config_loaded() {
    let app = app_with(ModuleCatalog::new(), json!({}));
    let events = EventRecorder::attach(&app);

    let err = app.start().await.unwrap_err();
    assert!(matches!(err, ContainerError::EmptyConfig { ref config_path } if config_path == Path::new("/app/conf")));
    assert_eq!(events.names(), ["configLoaded"]);
}

#[tokio::test]
async fn failing_member_aborts_startup() {
    let journal = LoadJournal::new();
    let catalog = ModuleCatalog::new();
    catalog.register_feature(
        BUILTIN,
        "bad",
        RecordingFeature::new("bad", FeatureKind::Init, &journal).failing("boom"),
    );
    recording(&catalog, &journal, "store", FeatureKind::Service);

    let app = app_with(catalog, json!({ "bad": {}, "store": {} }));
    let events = EventRecorder::attach(&app);
    let err = app.start().await.unwrap_err();

    assert!(matches!(err, ContainerError::FeatureLoad { ref feature, .. } if feature == "bad"));
    assert!(matches!(err.root_cause(), ContainerError::Custom(msg) if msg == "boom"));
    assert!(journal.position(&JournalEntry::Started("store".into())).is_none());
    assert!(events.position("after:INIT").is_none());
    assert!(events.position("ready").is_none());
    assert!(!app.is_loaded("bad"));
}

#[tokio::test]
async fn duplicate_service_from_two_features_fails() {
    let catalog = ModuleCatalog::new();
    for name in ["primaryDb", "replicaDb"] {
        catalog.register_feature(
            BUILTIN,
            name,
            feature_fn(FeatureKind::Service, |app, _| async move { app.register_service("db", 1u8, false) }),
        );
    }

    let app = app_with(catalog, json!({ "primaryDb": {}, "replicaDb": {} }));
    let err = app.start().await.unwrap_err();

    assert!(matches!(err.root_cause(), ContainerError::ServiceAlreadyRegistered(name) if name == "db"));
}

// --- Stop ---

fn cleanup_feature(done: Arc<AtomicBool>, fail: bool) -> impl stagehand_core::Feature {
    feature_fn(FeatureKind::Service, move |app, _| {
        let done = Arc::clone(&done);
        async move {
            app.on("stopping", move |event| {
                if let LifecycleEvent::Stopping(stoppers) = event {
                    let done = Arc::clone(&done);
                    stoppers.push(async move {
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        done.store(true, Ordering::SeqCst);
                        if fail {
                            return Err::<(), BoxError>("pool refused to close".into());
                        }
                        Ok(())
                    });
                }
            });
            app.register_service("pool", String::from("connections"), false)
        }
    })
}

#[tokio::test]
async fn stop_waits_for_cleanups_and_tears_down() {
    let done = Arc::new(AtomicBool::new(false));
    let catalog = ModuleCatalog::new();
    catalog.register_feature(BUILTIN, "pool", cleanup_feature(Arc::clone(&done), false));

    let app = app_with(catalog, json!({ "pool": {} }));
    app.start().await.unwrap();
    assert!(app.has_service("pool"));

    app.stop().await.unwrap();

    assert!(done.load(Ordering::SeqCst));
    assert_eq!(app.state(), LifecycleState::Stopped);
    assert!(!app.has_service("pool"));
    assert!(!app.is_loaded("pool"));
    assert!(app.config().is_empty());
}

#[tokio::test]
async fn failing_cleanup_fails_stop_after_all_cleanups_ran() {
    let failed = Arc::new(AtomicBool::new(false));
    let succeeded = Arc::new(AtomicBool::new(false));
    let catalog = ModuleCatalog::new();
    catalog.register_feature(BUILTIN, "flaky", cleanup_feature(Arc::clone(&failed), true));
    catalog.register_feature(BUILTIN, "steady", {
        let succeeded = Arc::clone(&succeeded);
        feature_fn(FeatureKind::Plugin, move |app, _| {
            let succeeded = Arc::clone(&succeeded);
            async move {
                app.on("stopping", move |event| {
                    if let LifecycleEvent::Stopping(stoppers) = event {
                        let succeeded = Arc::clone(&succeeded);
                        stoppers.push(async move {
                            succeeded.store(true, Ordering::SeqCst);
                            Ok::<(), BoxError>(())
                        });
                    }
                });
                Ok(())
            }
        })
    });

    let app = app_with(catalog, json!({ "flaky": {}, "steady": {} }));
    app.start().await.unwrap();

    let err = app.stop().await.unwrap_err();
    assert_eq!(err.to_string(), "Cleanup failed: pool refused to close");
    assert!(failed.load(Ordering::SeqCst));
    assert!(succeeded.load(Ordering::SeqCst));
    assert_eq!(app.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn container_restarts_after_stop() {
    let journal = LoadJournal::new();
    let catalog = ModuleCatalog::new();
    recording(&catalog, &journal, "store", FeatureKind::Service);

    let app = app_with(catalog, json!({ "store": {} }));
    app.start().await.unwrap();
    app.stop().await.unwrap();
    app.start().await.unwrap();

    assert_eq!(journal.finished(), ["store", "store"]);
    assert!(app.is_started());
}

#[tokio::test]
async fn feature_subscriptions_last_for_one_run() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let catalog = ModuleCatalog::new();
    catalog.register_feature(BUILTIN, "pool", {
        let cleanups = Arc::clone(&cleanups);
        feature_fn(FeatureKind::Service, move |app, _| {
            let cleanups = Arc::clone(&cleanups);
            async move {
                app.on("stopping", move |event| {
                    if let LifecycleEvent::Stopping(stoppers) = event {
                        let cleanups = Arc::clone(&cleanups);
                        stoppers.push(async move {
                            cleanups.fetch_add(1, Ordering::SeqCst);
                            Ok::<(), BoxError>(())
                        });
                    }
                });
                Ok(())
            }
        })
    });

    let app = app_with(catalog, json!({ "pool": {} }));
    let events = EventRecorder::attach(&app);
    let idle_listeners = app.events().listener_count();

    app.start().await.unwrap();
    app.stop().await.unwrap();
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    assert_eq!(app.events().listener_count(), idle_listeners);

    app.start().await.unwrap();
    app.stop().await.unwrap();
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    assert_eq!(app.events().listener_count(), idle_listeners);

    let readies = events.names().iter().filter(|name| *name == "ready").count();
    assert_eq!(readies, 2);
}

#[tokio::test]
async fn container_is_released_after_stop_even_if_observers_captured_it() {
    let catalog = ModuleCatalog::new();
    catalog.register_feature(
        BUILTIN,
        "watcher",
        feature_fn(FeatureKind::Plugin, |app, _| async move {
            let handle = app.clone();
            app.on("ready", move |_| {
                let _ = handle.name();
            });
            Ok(())
        }),
    );

    let app = app_with(catalog, json!({ "watcher": {} }));
    app.start().await.unwrap();
    app.stop().await.unwrap();

    let weak = app.downgrade();
    drop(app);
    assert!(weak.upgrade().is_none());
}

// --- File-based configuration ---

#[tokio::test]
async fn env_aware_files_drive_startup() {
    let dir = tempfile::tempdir().unwrap();
    let conf = dir.path().join("conf");
    std::fs::create_dir_all(&conf).unwrap();
    std::fs::write(conf.join("app.default.json"), r#"{ "store": { "size": 1 } }"#).unwrap();
    std::fs::write(conf.join("app.test.json"), r#"{ "store": { "size": 5 } }"#).unwrap();

    let seen = Arc::new(parking_lot::Mutex::new(Value::Null));
    let catalog = ModuleCatalog::new();
    let sink = Arc::clone(&seen);
    catalog.register_feature(
        BUILTIN,
        "store",
        feature_fn(FeatureKind::Service, move |_, options| {
            let sink = Arc::clone(&sink);
            async move {
                *sink.lock() = options;
                Ok(())
            }
        }),
    );

    let app = ServiceContainer::with_module_source(
        "test",
        ContainerOptions::default()
            .with_env("test")
            .with_working_path(dir.path())
            .with_builtin_features_path(BUILTIN),
        Arc::new(catalog),
    );
    app.start().await.unwrap();

    assert_eq!(*seen.lock(), json!({ "size": 5 }));
}

#[tokio::test]
async fn missing_config_files_mean_empty_config() {
    let dir = tempfile::tempdir().unwrap();
    let app = ServiceContainer::new(
        "test",
        ContainerOptions::default()
            .with_working_path(dir.path())
            .with_env_aware_config(false),
    );

    let err = app.start().await.unwrap_err();
    assert!(matches!(err, ContainerError::EmptyConfig { .. }));
}
