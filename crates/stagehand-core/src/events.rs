//! # Lifecycle Events
//!
//! A typed, synchronous publish/subscribe bus. The container and the staged loader emit
//! [`LifecycleEvent`]s; observers registered with [`EventBus::on`], [`EventBus::once`] or
//! [`EventBus::subscribe`] run in registration order on the emitting task.
//!
//! Event names follow a fixed scheme, which is what `on`/`once` filter by:
//!
//! | Event | Name |
//! |-------|------|
//! | [`LifecycleEvent::ConfigLoaded`] | `configLoaded` |
//! | [`LifecycleEvent::Ready`] | `ready` |
//! | [`LifecycleEvent::Stopping`] | `stopping` |
//! | [`LifecycleEvent::BeforeStage`] | `before:<STAGE>` |
//! | [`LifecycleEvent::AfterStage`] | `after:<STAGE>` |
//! | [`LifecycleEvent::BeforeLoad`] | `before:load:<feature>` |
//! | [`LifecycleEvent::AfterLoad`] | `after:load:<feature>` |
//!
//! Observers are plain closures and cannot await. Async teardown work is handed to the
//! container through the [`Stoppers`] list carried by the `stopping` event.

use crate::error::BoxError;
use crate::feature::FeatureKind;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Something that happened during the container lifecycle.
#[derive(Debug, Clone, Copy)]
pub enum LifecycleEvent<'a> {
    ConfigLoaded,
    Ready,
    /// Observers may push cleanup futures that `stop()` awaits.
    Stopping(&'a Stoppers),
    BeforeStage(FeatureKind),
    AfterStage(FeatureKind),
    BeforeLoad(&'a str),
    AfterLoad(&'a str),
}

impl LifecycleEvent<'_> {
    pub fn name(&self) -> String {
        match self {
            Self::ConfigLoaded => "configLoaded".to_owned(),
            Self::Ready => "ready".to_owned(),
            Self::Stopping(_) => "stopping".to_owned(),
            Self::BeforeStage(kind) => format!("before:{kind}"),
            Self::AfterStage(kind) => format!("after:{kind}"),
            Self::BeforeLoad(feature) => format!("before:load:{feature}"),
            Self::AfterLoad(feature) => format!("after:load:{feature}"),
        }
    }
}

/// Handle returned by every subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Arc<dyn Fn(&LifecycleEvent<'_>) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    filter: Option<String>,
    once: bool,
    observer: Observer,
}

impl Subscription {
    fn matches(&self, name: &str) -> bool {
        self.filter.as_deref().map_or(true, |filter| filter == name)
    }
}

/// Ordered list of observers with synchronous delivery.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe every event.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        self.insert(None, false, Arc::new(observer))
    }

    /// Observe events with the given name.
    pub fn on<F>(&self, name: impl Into<String>, observer: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        self.insert(Some(name.into()), false, Arc::new(observer))
    }

    /// Observe the next event with the given name, then unsubscribe.
    pub fn once<F>(&self, name: impl Into<String>, observer: F) -> SubscriptionId
    where
        F: Fn(&LifecycleEvent<'_>) + Send + Sync + 'static,
    {
        self.insert(Some(name.into()), true, Arc::new(observer))
    }

    /// Returns `false` when the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        subscriptions.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Deliver an event to every matching observer, in subscription order.
    ///
    /// The observer list is snapshotted first, so observers may subscribe or unsubscribe
    /// while being called. Those changes apply from the next emit.
    pub fn emit(&self, event: &LifecycleEvent<'_>) {
        let name = event.name();
        let observers: Vec<Observer> = {
            let mut subscriptions = self.subscriptions.lock();
            let observers = subscriptions
                .iter()
                .filter(|subscription| subscription.matches(&name))
                .map(|subscription| Arc::clone(&subscription.observer))
                .collect();
            subscriptions.retain(|subscription| !(subscription.once && subscription.matches(&name)));
            observers
        };

        for observer in observers {
            observer(event);
        }
    }

    fn insert(&self, filter: Option<String>, once: bool, observer: Observer) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.lock().push(Subscription {
            id,
            filter,
            once,
            observer,
        });
        id
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Cleanup futures collected while the container is stopping.
#[derive(Default)]
pub struct Stoppers {
    pending: Mutex<Vec<BoxFuture<'static, Result<(), BoxError>>>>,
}

impl Stoppers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&self, cleanup: F)
    where
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.pending.lock().push(cleanup.boxed());
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Take every pushed future, leaving the list empty.
    pub fn take(&self) -> Vec<BoxFuture<'static, Result<(), BoxError>>> {
        std::mem::take(&mut *self.pending.lock())
    }
}

impl fmt::Debug for Stoppers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stoppers").field("pending", &self.len()).finish()
    }
}
