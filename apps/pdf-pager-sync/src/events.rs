//! Event subscription capability
//!
//! Every subscription returns a [`SubscriptionHandle`] that identifies exactly
//! one registered handler, so the matching `unsubscribe` always succeeds.
//! Owners keep their handles in a [`Subscriptions`] set and release them all
//! on teardown.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// An event with a discriminant handlers subscribe to
pub trait Event: Send + Sync + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Shared, identity-stable event handler
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Identifies one registered handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        SubscriptionHandle(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Anything handlers can subscribe to
pub trait EventSource<E: Event>: Send + Sync {
    fn subscribe(&self, kind: E::Kind, handler: Handler<E>) -> SubscriptionHandle;

    /// Returns false if the handle was not registered here
    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool;
}

/// In-process event bus
///
/// Handlers are invoked synchronously, in subscription order, outside of the
/// bus lock so a handler may emit or (un)subscribe re-entrantly.
pub struct EventBus<E: Event> {
    handlers: RwLock<HashMap<E::Kind, Vec<(SubscriptionHandle, Handler<E>)>>>,
}

impl<E: Event> EventBus<E> {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Deliver an event; returns how many handlers saw it
    pub fn emit(&self, event: &E) -> usize {
        let targets: Vec<Handler<E>> = {
            let handlers = self.handlers.read();
            handlers
                .get(&event.kind())
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        for handler in &targets {
            handler(event);
        }
        targets.len()
    }

    pub fn subscriber_count(&self, kind: E::Kind) -> usize {
        self.handlers.read().get(&kind).map_or(0, Vec::len)
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> EventSource<E> for EventBus<E> {
    fn subscribe(&self, kind: E::Kind, handler: Handler<E>) -> SubscriptionHandle {
        let handle = SubscriptionHandle::next();
        self.handlers
            .write()
            .entry(kind)
            .or_default()
            .push((handle, handler));
        handle
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut handlers = self.handlers.write();
        for list in handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(h, _)| *h == handle) {
                list.remove(pos);
                return true;
            }
        }
        false
    }
}

/// Handles registered by one owner against one source
pub struct Subscriptions<E: Event> {
    source: Arc<dyn EventSource<E>>,
    handles: Mutex<Vec<SubscriptionHandle>>,
}

impl<E: Event> Subscriptions<E> {
    pub fn new(source: Arc<dyn EventSource<E>>) -> Self {
        Self {
            source,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, kind: E::Kind, handler: Handler<E>) {
        let handle = self.source.subscribe(kind, handler);
        self.handles.lock().push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Unsubscribe everything; returns how many handles the source released
    pub fn release_all(&self) -> usize {
        let handles = std::mem::take(&mut *self.handles.lock());
        handles
            .into_iter()
            .filter(|handle| self.source.unsubscribe(*handle))
            .count()
    }
}
