//! # Stagehand
//!
//! An application container that assembles itself from configuration. Each top-level key of
//! the configuration document names a *feature*; the container resolves every name to a
//! module, then loads the features stage by stage:
//!
//! | Stage | Typical work |
//! |-------|--------------|
//! | `CONF` | replace or extend the configuration itself (repeated until no new `CONF` keys appear) |
//! | `INIT` | process-wide setup such as environment variables |
//! | `SERVICE` | register shared services |
//! | `PLUGIN` | wire services together |
//! | `FINAL` | last-minute checks |
//!
//! Features within one stage load concurrently; a stage only begins when the previous one
//! has finished.
//!
//! ## Crates
//!
//! - [`stagehand_core`]: the container, registry, resolver, staged loader, config and events.
//! - [`stagehand_features`]: the builtin features (`processEnv`, `bootstrap`, `lruCache`,
//!   `configByHostname`, `devConfigByGitUser`).
//! - this crate: [`App`], [`Runner`], [`start_worker`] and [`setup_tracing`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use stagehand::{App, ContainerOptions, Runner};
//!
//! # async fn demo() -> Result<(), stagehand::AppError> {
//! let config = json!({ "processEnv": { "MODE": "batch" } });
//! let app = App::new(
//!     "batch",
//!     ContainerOptions::default().with_config(config.as_object().cloned().unwrap_or_default()),
//! );
//! let mode = Runner::from(app)
//!     .run(|container| async move { Ok::<_, stagehand::BoxError>(container.env_var("MODE")) })
//!     .await?;
//! assert_eq!(mode.as_deref(), Some("batch"));
//! # Ok(())
//! # }
//! ```
//!
//! ```bash
//! RUST_LOG=info cargo run
//! cargo test
//! ```

pub mod error;
pub mod lifecycle;

pub use error::AppError;
pub use lifecycle::{
    setup_tracing, start_worker, App, Runner, BUILTIN_FEATURES_DIR, DEFAULT_APP_NAME, DEFAULT_WORKER_NAME,
};
pub use stagehand_core::*;
pub use stagehand_features::{
    register_builtins, Bootstrap, CacheOptions, ConfigByHostname, DevConfigByGitUser, LruCacheFeature, LruCacheService,
    ProcessEnv, ResourceCache, BUILTIN_FEATURES,
};
