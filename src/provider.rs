//! The provider: the single entry point through which books are read and
//! written. Each call routes the identifier, validates any payload, runs the
//! storage primitive, and signals observers once a write has committed.
//! Nothing is kept between calls apart from the observer registry.

use crossbeam::channel::Receiver;
use tracing::{error, info, warn};

use crate::db::{Cursor, Selection, SortKey, Storage, Values};
use crate::error::{Error, Result, WriteOp};
use crate::models::{Book, Column};
use crate::observer::{Observer, Observers, SubscriptionId};
use crate::router::{Resource, Router};
use crate::validate::{validate, Mode};

pub struct BookProvider {
    storage: Storage,
    router: Router,
    observers: Observers,
}

impl BookProvider {
    pub fn new(storage: Storage, router: Router) -> Self {
        Self {
            storage,
            router,
            observers: Observers::new(),
        }
    }

    /// Provider over a fresh in-memory database with the books router.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Storage::open_in_memory()?, Router::books()))
    }

    /// MIME type of the data behind `uri`.
    pub fn resource_type(&self, uri: &str) -> Result<String> {
        Ok(self.router.resolve(uri)?.mime_type())
    }

    /// Run a query. For a single item the caller's selection is replaced by
    /// an `_id` match rather than merged with it.
    pub fn query(
        &self,
        uri: &str,
        projection: &[Column],
        selection: &Selection,
        sort: &[SortKey],
    ) -> Result<Cursor> {
        let resource = self.resolve(uri)?;
        let selection = scoped_selection(resource, selection);
        let mut cursor = self.storage.query_rows(projection, &selection, sort)?;
        cursor.set_resource(resource);
        Ok(cursor)
    }

    /// Insert one book into the collection and return its item resource.
    pub fn insert(&self, uri: &str, values: &Values) -> Result<Resource> {
        let resource = self.resolve(uri)?;
        if resource != Resource::Collection {
            warn!(%uri, "insert rejected for item resource");
            return Err(Error::UnsupportedOperation {
                operation: WriteOp::Insert,
                resource: uri.to_string(),
            });
        }

        validate(values, Mode::Insert).inspect_err(|err| warn!(%uri, %err, "insert rejected"))?;

        let id = self
            .storage
            .insert_row(values)
            .inspect_err(|err| error!(%uri, error = %err, "failed to insert book"))?;

        self.observers.notify(Resource::Collection);
        info!(id, "inserted book");
        Ok(Resource::Item(id))
    }

    /// Update matching books. An empty payload returns 0 without touching
    /// storage or notifying anyone.
    pub fn update(&self, uri: &str, values: &Values, selection: &Selection) -> Result<usize> {
        let resource = self.resolve(uri)?;
        let selection = scoped_selection(resource, selection);

        validate(values, Mode::Update).inspect_err(|err| warn!(%uri, %err, "update rejected"))?;

        if values.is_empty() {
            return Ok(0);
        }

        let updated = self
            .storage
            .update_rows(values, &selection)
            .inspect_err(|err| error!(%uri, error = %err, "failed to update books"))?;

        if updated > 0 {
            self.observers.notify(resource);
            info!(%resource, rows = updated, "updated books");
        }
        Ok(updated)
    }

    pub fn delete(&self, uri: &str, selection: &Selection) -> Result<usize> {
        let resource = self.resolve(uri)?;
        let selection = scoped_selection(resource, selection);

        let deleted = self
            .storage
            .delete_rows(&selection)
            .inspect_err(|err| error!(%uri, error = %err, "failed to delete books"))?;

        if deleted > 0 {
            self.observers.notify(resource);
            info!(%resource, rows = deleted, "deleted books");
        }
        Ok(deleted)
    }

    /// Every book ordered by name. Convenience wrapper for list screens.
    pub fn list_books(&self) -> Result<Vec<Book>> {
        self.query(
            &Resource::Collection.to_string(),
            &Column::ALL,
            &Selection::all(),
            &[SortKey::asc(Column::Name), SortKey::asc(Column::Id)],
        )?
        .into_books()
    }

    /// Look up one book, `None` if it does not exist.
    pub fn fetch_book(&self, id: i64) -> Result<Option<Book>> {
        let books = self
            .query(
                &Resource::Item(id).to_string(),
                &Column::ALL,
                &Selection::all(),
                &[],
            )?
            .into_books()?;
        Ok(books.into_iter().next())
    }

    pub fn subscribe<O>(
        &self,
        resource: Resource,
        include_descendants: bool,
        observer: O,
    ) -> SubscriptionId
    where
        O: Observer + 'static,
    {
        self.observers
            .subscribe(resource, include_descendants, observer)
    }

    pub fn subscribe_channel(
        &self,
        resource: Resource,
        include_descendants: bool,
    ) -> (SubscriptionId, Receiver<Resource>) {
        self.observers
            .subscribe_channel(resource, include_descendants)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    /// Number of live subscriptions.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    fn resolve(&self, uri: &str) -> Result<Resource> {
        self.router
            .resolve(uri)
            .inspect_err(|_| warn!(%uri, "unroutable resource"))
    }
}

/// Item resources always target exactly their own row.
fn scoped_selection(resource: Resource, selection: &Selection) -> Selection {
    match resource {
        Resource::Collection => selection.clone(),
        Resource::Item(id) => Selection::by_id(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;
    use crate::models::Genre;
    use crate::validate::{Reason, ValidationError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn book(name: &str, quantity: i64) -> Values {
        Values::new()
            .with(Column::Name, name)
            .with(Column::Genre, Genre::Fantasy)
            .with(Column::Price, 9.99)
            .with(Column::Quantity, quantity)
            .with(Column::SupplierName, "Tor")
            .with(Column::SupplierPhone, "5550100")
    }

    fn watch(provider: &BookProvider) -> Arc<AtomicUsize> {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        provider.subscribe(Resource::Collection, true, move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        hits
    }

    #[test]
    fn test_insert_then_fetch() {
        let provider = BookProvider::in_memory().unwrap();
        let resource = provider.insert("books", &book("Mistborn", 3)).unwrap();
        let Resource::Item(id) = resource else {
            panic!("expected item resource");
        };
        let stored = provider.fetch_book(id).unwrap().unwrap();
        assert_eq!(stored.name, "Mistborn");
        assert_eq!(stored.genre, Genre::Fantasy);
        assert_eq!(stored.price, 9.99);
        assert_eq!(stored.quantity, 3);
        assert_eq!(stored.supplier_phone, "5550100");
    }

    #[test]
    fn test_insert_on_item_is_unsupported() {
        let provider = BookProvider::in_memory().unwrap();
        let err = provider.insert("books/1", &book("X", 1)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation { .. }));
        assert!(err.is_programming_error());
    }

    #[test]
    fn test_invalid_insert_writes_nothing_and_notifies_nobody() {
        let provider = BookProvider::in_memory().unwrap();
        let hits = watch(&provider);
        let err = provider
            .insert("books", &book("X", 1).with(Column::Genre, 99))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ValidationFailed(ValidationError {
                field: Column::Genre,
                reason: Reason::UnknownGenre(99)
            })
        ));
        assert!(provider.list_books().unwrap().is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_insert_notifies_collection() {
        let provider = BookProvider::in_memory().unwrap();
        let (_, rx) = provider.subscribe_channel(Resource::Collection, false);
        provider.insert("books", &book("A", 1)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Resource::Collection);
    }

    #[test]
    fn test_item_update_ignores_caller_selection() {
        let provider = BookProvider::in_memory().unwrap();
        let Resource::Item(first) = provider.insert("books", &book("A", 1)).unwrap() else {
            unreachable!()
        };
        provider.insert("books", &book("B", 1)).unwrap();

        let everything = Selection::new("1 = 1", vec![]);
        let values = Values::new().with(Column::Quantity, 7);
        let updated = provider
            .update(&format!("books/{first}"), &values, &everything)
            .unwrap();
        assert_eq!(updated, 1);

        let books = provider.list_books().unwrap();
        assert_eq!(books.iter().filter(|b| b.quantity == 7).count(), 1);
        assert_eq!(provider.fetch_book(first).unwrap().unwrap().quantity, 7);
    }

    #[test]
    fn test_item_query_ignores_caller_selection() {
        let provider = BookProvider::in_memory().unwrap();
        let Resource::Item(id) = provider.insert("books", &book("A", 1)).unwrap() else {
            unreachable!()
        };
        provider.insert("books", &book("B", 1)).unwrap();
        let selection = Selection::new("name = ?", vec![Value::from("B")]);
        let cursor = provider
            .query(&format!("books/{id}"), &[], &selection, &[])
            .unwrap();
        assert_eq!(cursor.resource(), Some(&Resource::Item(id)));
        let books = cursor.into_books().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].name, "A");
    }

    #[test]
    fn test_empty_update_short_circuits() {
        let provider = BookProvider::in_memory().unwrap();
        provider.insert("books", &book("A", 1)).unwrap();
        let hits = watch(&provider);
        assert_eq!(
            provider
                .update("books", &Values::new(), &Selection::all())
                .unwrap(),
            0
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_update_without_matches_does_not_notify() {
        let provider = BookProvider::in_memory().unwrap();
        let hits = watch(&provider);
        let values = Values::new().with(Column::Quantity, 1);
        assert_eq!(provider.update("books/77", &values, &Selection::all()).unwrap(), 0);
        assert_eq!(provider.delete("books/77", &Selection::all()).unwrap(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_storage_write_failure_is_surfaced_without_notifying() {
        let provider = BookProvider::in_memory().unwrap();
        provider.insert("books", &book("A", 1)).unwrap();
        let hits = watch(&provider);
        let broken = Selection::new("nonsense ===", vec![]);

        let err = provider
            .update("books", &Values::new().with(Column::Quantity, 2), &broken)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::WriteFailed {
                operation: WriteOp::Update,
                ..
            }
        ));
        assert!(!err.is_programming_error());

        let err = provider.delete("books", &broken).unwrap_err();
        assert!(matches!(
            err,
            Error::WriteFailed {
                operation: WriteOp::Delete,
                ..
            }
        ));

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(provider.list_books().unwrap()[0].quantity, 1);
    }

    #[test]
    fn test_item_delete_notifies_item_and_deep_collection_observers() {
        let provider = BookProvider::in_memory().unwrap();
        let Resource::Item(id) = provider.insert("books", &book("A", 1)).unwrap() else {
            unreachable!()
        };
        let (_, item_rx) = provider.subscribe_channel(Resource::Item(id), false);
        let (_, shallow_rx) = provider.subscribe_channel(Resource::Collection, false);
        let (_, deep_rx) = provider.subscribe_channel(Resource::Collection, true);

        assert_eq!(
            provider
                .delete(&format!("books/{id}"), &Selection::all())
                .unwrap(),
            1
        );
        assert_eq!(item_rx.try_recv().unwrap(), Resource::Item(id));
        assert_eq!(deep_rx.try_recv().unwrap(), Resource::Item(id));
        assert!(shallow_rx.try_recv().is_err());
    }

    #[test]
    fn test_collection_delete_with_filter() {
        let provider = BookProvider::in_memory().unwrap();
        provider.insert("books", &book("Keep", 1)).unwrap();
        provider.insert("books", &book("Drop", 1)).unwrap();
        let selection = Selection::new("name = ?", vec![Value::from("Drop")]);
        assert_eq!(provider.delete("books", &selection).unwrap(), 1);
        let names: Vec<String> = provider
            .list_books()
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["Keep".to_string()]);
    }

    #[test]
    fn test_resource_type() {
        let provider = BookProvider::in_memory().unwrap();
        assert!(provider
            .resource_type("books")
            .unwrap()
            .starts_with("vnd.android.cursor.dir/"));
        assert!(matches!(
            provider.resource_type("shelves"),
            Err(Error::UnroutableResource(_))
        ));
    }

    #[test]
    fn test_concurrent_inserts_get_distinct_ids() {
        let provider = Arc::new(BookProvider::in_memory().unwrap());
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let provider = Arc::clone(&provider);
                std::thread::spawn(move || {
                    (0..10)
                        .map(|n| {
                            provider
                                .insert("books", &book(&format!("w{worker}-{n}"), n))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<Resource> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        ids.sort_by_key(|resource| resource.to_string());
        ids.dedup();
        assert_eq!(ids.len(), 40);
        assert_eq!(provider.list_books().unwrap().len(), 40);
    }
}
