//! Observer registrations for floor events.
//!
//! Each event kind has its own [`ObserverList`]. Registering returns a
//! [`Subscription`]; observers stay registered until
//! [`Subscription::unsubscribe`] is called, even if the handle is dropped.
//!
//! Observers run on the room actor's task. A panicking observer is caught and
//! logged; it does not affect other observers or the room.

use crate::floor::{FloorDenial, FloorRelease, FloorState, FloorToken};

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::error;

/// Observer callback type.
pub type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: AtomicU64,
    observers: Mutex<BTreeMap<u64, Observer<T>>>,
}

impl<T> Registry<T> {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Observer<T>>> {
        // Observers never run while the lock is held, so a poisoned lock
        // still holds a consistent map.
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ordered list of observers for one event kind.
pub struct ObserverList<T> {
    kind: &'static str,
    registry: Arc<Registry<T>>,
}

impl<T: 'static> ObserverList<T> {
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                observers: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Register an observer. Observers are notified in registration order.
    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.lock().insert(id, Arc::new(observer));

        let registry = Arc::downgrade(&self.registry);
        Subscription {
            kind: self.kind,
            cancel: Some(Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.lock().remove(&id);
                }
            })),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every registered observer.
    ///
    /// Returns the number of observers that panicked.
    pub fn notify(&self, event: &T) -> usize {
        let observers: Vec<Observer<T>> = self.registry.lock().values().cloned().collect();

        let mut panicked = 0;
        for observer in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                panicked += 1;
                error!(
                    target: "fc.observers",
                    kind = self.kind,
                    "Floor observer panicked"
                );
            }
        }
        panicked
    }
}

impl<T> fmt::Debug for ObserverList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self
            .registry
            .observers
            .lock()
            .map_or_else(|p| p.into_inner().len(), |g| g.len());
        f.debug_struct("ObserverList")
            .field("kind", &self.kind)
            .field("observers", &count)
            .finish()
    }
}

/// Handle returned by observer registration.
#[must_use = "dropping a Subscription keeps the observer registered; call unsubscribe() to remove it"]
pub struct Subscription {
    kind: &'static str,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Remove the observer. Safe to call after the room has shut down.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Observer lists for one room.
#[derive(Debug)]
pub struct FloorObservers {
    pub state_change: ObserverList<FloorState>,
    pub granted: ObserverList<FloorToken>,
    pub denied: ObserverList<FloorDenial>,
    pub released: ObserverList<FloorRelease>,
}

impl Default for FloorObservers {
    fn default() -> Self {
        Self {
            state_change: ObserverList::new("state_change"),
            granted: ObserverList::new("granted"),
            denied: ObserverList::new("denied"),
            released: ObserverList::new("released"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(list: &ObserverList<u32>) -> (Arc<AtomicUsize>, Subscription) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let sub = list.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (count, sub)
    }

    #[test]
    fn test_notify_reaches_all_observers() {
        let list = ObserverList::new("test");
        let (a, _sub_a) = counter(&list);
        let (b, _sub_b) = counter(&list);

        list.notify(&1);
        list.notify(&2);

        assert_eq!(a.load(Ordering::SeqCst), 2);
        assert_eq!(b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let list = ObserverList::new("test");
        let (count, sub) = counter(&list);

        list.notify(&1);
        sub.unsubscribe();
        list.notify(&2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn test_dropping_subscription_keeps_observer() {
        let list = ObserverList::new("test");
        let (count, sub) = counter(&list);
        drop(sub);

        list.notify(&1);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_unsubscribe_after_list_dropped() {
        let list = ObserverList::new("test");
        let (_, sub) = counter(&list);
        drop(list);

        sub.unsubscribe();
    }

    #[test]
    fn test_panicking_observer_is_isolated() {
        let list = ObserverList::new("test");
        let _bad = list.subscribe(|_: &u32| panic!("observer bug"));
        let (good, _sub) = counter(&list);

        let panicked = list.notify(&7);

        assert_eq!(panicked, 1);
        assert_eq!(good.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_may_subscribe_during_notify() {
        let list = Arc::new(ObserverList::<u32>::new("test"));
        let inner = Arc::clone(&list);
        let _sub = list.subscribe(move |_| {
            let _nested = inner.subscribe(|_| {});
        });

        list.notify(&1);

        assert_eq!(list.len(), 2);
    }
}
