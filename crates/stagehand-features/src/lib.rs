//! # Stagehand Builtin Features
//!
//! The features every application gets without writing any code. Publish them into a
//! module table with [`register_builtins`] and reference them by name in configuration:
//!
//! | Name | Stage | Effect |
//! |------|-------|--------|
//! | `processEnv` | INIT | copies variables into the container's environment overrides |
//! | `bootstrap` | INIT | runs every hook published under `<workingPath>/bootstrap` |
//! | `lruCache` | SERVICE | registers named LRU caches and the `lruCache` service |
//! | `configByHostname` | CONF | replaces the config with `<configName>.<host>.json` |
//! | `devConfigByGitUser` | CONF | replaces the config with `<configName>.<developer>.json` if present |
//!
//! ```rust
//! use stagehand_core::ModuleCatalog;
//! use stagehand_features::{register_builtins, BUILTIN_FEATURES};
//!
//! let catalog = ModuleCatalog::new();
//! register_builtins(&catalog, "@builtin/features");
//! assert_eq!(catalog.len(), BUILTIN_FEATURES.len());
//! ```

pub mod bootstrap;
pub mod config_by_hostname;
pub mod dev_config_by_git_user;
pub mod lru_cache;
mod probe;
pub mod process_env;

pub use bootstrap::Bootstrap;
pub use config_by_hostname::ConfigByHostname;
pub use dev_config_by_git_user::DevConfigByGitUser;
pub use lru_cache::{CacheOptions, LruCacheFeature, LruCacheService, ResourceCache};
pub use process_env::ProcessEnv;

use stagehand_core::ModuleCatalog;
use std::path::Path;

/// Names of the builtin features, as used in configuration documents.
pub const BUILTIN_FEATURES: [&str; 5] = [
    process_env::NAME,
    bootstrap::NAME,
    lru_cache::NAME,
    config_by_hostname::NAME,
    dev_config_by_git_user::NAME,
];

/// Publish every builtin feature as `<dir>/<name>`.
pub fn register_builtins(catalog: &ModuleCatalog, dir: impl AsRef<Path>) {
    let dir = dir.as_ref();
    catalog
        .register_feature(dir, process_env::NAME, ProcessEnv)
        .register_feature(dir, bootstrap::NAME, Bootstrap)
        .register_feature(dir, lru_cache::NAME, LruCacheFeature)
        .register_feature(dir, config_by_hostname::NAME, ConfigByHostname)
        .register_feature(dir, dev_config_by_git_user::NAME, DevConfigByGitUser);
}
