//! Change notification registry owned by the provider.
//!
//! A notification only says "data under this resource changed"; readers are
//! expected to re-query. Delivery happens on the writing thread, after the
//! write commits and before the write call returns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crossbeam::channel::{self, Receiver};
use tracing::trace;

use crate::router::Resource;

/// Receives change signals.
pub trait Observer: Send + Sync {
    fn on_change(&self, resource: Resource);
}

impl<F> Observer for F
where
    F: Fn(Resource) + Send + Sync,
{
    fn on_change(&self, resource: Resource) {
        self(resource)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Entry {
    id: SubscriptionId,
    resource: Resource,
    include_descendants: bool,
    observer: Arc<dyn Observer>,
}

/// Shared set of listeners. Registration takes a short write lock on the
/// listener list only; it never touches the storage lock, so it cannot stall a
/// writer.
#[derive(Default)]
pub struct Observers {
    next_id: AtomicU64,
    entries: RwLock<Vec<Entry>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer` for changes to `resource`. With
    /// `include_descendants`, a collection subscriber also hears about
    /// single-item changes.
    pub fn subscribe<O>(
        &self,
        resource: Resource,
        include_descendants: bool,
        observer: O,
    ) -> SubscriptionId
    where
        O: Observer + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Entry {
                id,
                resource,
                include_descendants,
                observer: Arc::new(observer),
            });
        trace!(?id, %resource, "observer subscribed");
        id
    }

    /// Subscribe through a channel; each change arrives as one message.
    pub fn subscribe_channel(
        &self,
        resource: Resource,
        include_descendants: bool,
    ) -> (SubscriptionId, Receiver<Resource>) {
        let (tx, rx) = channel::unbounded();
        let id = self.subscribe(resource, include_descendants, move |changed| {
            // A dropped receiver just means nobody is listening any more.
            let _ = tx.send(changed);
        });
        (id, rx)
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        before != entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signal every interested observer and return how many were reached.
    /// Observers run outside the registry lock so they may subscribe or
    /// unsubscribe from inside the callback.
    pub fn notify(&self, changed: Resource) -> usize {
        let targets: Vec<Arc<dyn Observer>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| {
                entry
                    .resource
                    .is_affected_by(&changed, entry.include_descendants)
            })
            .map(|entry| Arc::clone(&entry.observer))
            .collect();

        for observer in &targets {
            observer.on_change(changed);
        }
        trace!(%changed, delivered = targets.len(), "change notified");
        targets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter(observers: &Observers, resource: Resource, descendants: bool) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        observers.subscribe(resource, descendants, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        hits
    }

    #[test]
    fn test_collection_change_reaches_everyone() {
        let observers = Observers::new();
        let list = counter(&observers, Resource::Collection, false);
        let item = counter(&observers, Resource::Item(1), false);
        assert_eq!(observers.notify(Resource::Collection), 2);
        assert_eq!(list.load(Ordering::SeqCst), 1);
        assert_eq!(item.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_item_change_respects_descendant_flag() {
        let observers = Observers::new();
        let shallow = counter(&observers, Resource::Collection, false);
        let deep = counter(&observers, Resource::Collection, true);
        let other = counter(&observers, Resource::Item(2), false);
        observers.notify(Resource::Item(1));
        assert_eq!(shallow.load(Ordering::SeqCst), 0);
        assert_eq!(deep.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let observers = Observers::new();
        let (id, rx) = observers.subscribe_channel(Resource::Collection, true);
        observers.notify(Resource::Item(5));
        assert_eq!(rx.try_recv().unwrap(), Resource::Item(5));

        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        observers.notify(Resource::Collection);
        assert!(rx.try_recv().is_err());
        assert!(observers.is_empty());
    }

    #[test]
    fn test_observer_may_unsubscribe_itself() {
        let observers = Arc::new(Observers::new());
        let registry = Arc::clone(&observers);
        let slot: Arc<RwLock<Option<SubscriptionId>>> = Arc::new(RwLock::new(None));
        let slot_inner = Arc::clone(&slot);
        let id = observers.subscribe(Resource::Collection, false, move |_| {
            if let Some(id) = *slot_inner.read().unwrap() {
                registry.unsubscribe(id);
            }
        });
        *slot.write().unwrap() = Some(id);

        assert_eq!(observers.notify(Resource::Collection), 1);
        assert_eq!(observers.notify(Resource::Collection), 0);
    }
}
