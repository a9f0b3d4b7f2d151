//! # `lruCache` (SERVICE)
//!
//! Named in-memory LRU caches, one per resource.
//!
//! ```json
//! {
//!   "lruCache": {
//!     "default": { "max": 500 },
//!     "resources": { "users": { "max": 100 }, "sessions": {} }
//!   }
//! }
//! ```
//!
//! On load, every entry under `resources` gets a [`ResourceCache`] registered as the
//! service `lruCache:<resource>`, and the [`LruCacheService`] is registered as `lruCache`.
//! A cache's options are `default` (or `{ "max": 0 }`) overlaid key by key with the
//! resource's own options. `max: 0` means unbounded.

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use stagehand_core::{parse_options, ContainerError, Feature, FeatureKind, ServiceContainer, WeakContainer};
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info};

pub const NAME: &str = "lruCache";

/// Service name of a resource's cache.
pub fn service_key(resource: &str) -> String {
    format!("{NAME}:{resource}")
}

/// Options of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct CacheOptions {
    /// Capacity; `0` is unbounded.
    #[serde(default)]
    pub max: usize,
}

#[derive(Debug, Default, Deserialize)]
struct LruCacheOptions {
    #[serde(default)]
    default: Option<Map<String, Value>>,
    #[serde(default)]
    resources: Map<String, Value>,
}

/// A thread-safe LRU cache of JSON values keyed by string.
pub struct ResourceCache {
    resource: String,
    max: usize,
    entries: Mutex<LruCache<String, Value>>,
}

impl ResourceCache {
    pub fn new(resource: impl Into<String>, options: CacheOptions) -> Self {
        let entries = match NonZeroUsize::new(options.max) {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            resource: resource.into(),
            max: options.max,
            entries: Mutex::new(entries),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Configured capacity, `0` when unbounded.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Look up a value, marking it most recently used.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().get(key).cloned()
    }

    /// Insert a value, returning the one it replaced.
    pub fn put(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.entries.lock().put(key.into(), value)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.entries.lock().pop(key)
    }

    /// Whether the key is cached, without touching its recency.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceCache")
            .field("resource", &self.resource)
            .field("max", &self.max)
            .field("len", &self.len())
            .finish()
    }
}

/// Registry-backed access to per-resource caches.
#[derive(Debug)]
pub struct LruCacheService {
    container: WeakContainer,
    defaults: Map<String, Value>,
    resources: Map<String, Value>,
}

impl LruCacheService {
    /// The cache for `resource`, created and registered on first use.
    pub fn res(&self, resource: &str) -> Result<Arc<ResourceCache>, ContainerError> {
        let container = self.container.upgrade().ok_or(ContainerError::ContainerDropped)?;
        let key = service_key(resource);
        if let Some(cache) = container.get_service::<ResourceCache>(&key) {
            return Ok(cache);
        }

        let options = self.options_for(resource)?;
        debug!(%resource, max = options.max, "Creating cache on first use");
        container.get_or_register_service(&key, || ResourceCache::new(resource, options))
    }

    /// Empty the cache for `resource`, creating it if needed.
    pub fn reset(&self, resource: &str) -> Result<Arc<ResourceCache>, ContainerError> {
        let cache = self.res(resource)?;
        cache.clear();
        Ok(cache)
    }

    fn options_for(&self, resource: &str) -> Result<CacheOptions, ContainerError> {
        let mut merged = self.defaults.clone();
        if let Some(Value::Object(specific)) = self.resources.get(resource) {
            merged.extend(specific.clone());
        }
        parse_options(NAME, Value::Object(merged))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LruCacheFeature;

#[async_trait]
impl Feature for LruCacheFeature {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Service
    }

    async fn load(&self, container: &ServiceContainer, options: Value) -> Result<(), ContainerError> {
        let options: LruCacheOptions = parse_options(NAME, options)?;
        let defaults = options.default.unwrap_or_else(|| {
            let mut unbounded = Map::new();
            unbounded.insert("max".to_owned(), json!(0));
            unbounded
        });

        let service = LruCacheService {
            container: container.downgrade(),
            defaults,
            resources: options.resources,
        };

        for resource in service.resources.keys() {
            let cache_options = service.options_for(resource)?;
            container.register_service(service_key(resource), ResourceCache::new(resource, cache_options), false)?;
        }

        info!(app = %container.name(), resources = service.resources.len(), "LRU caches ready");
        container.register_service(NAME, service, false)
    }
}
