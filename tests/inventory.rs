use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use book_inventory::{
    App, BookProvider, Column, Error, Genre, Reason, Resource, Router, Selection, SortKey,
    Storage, Value, ValidationError, Values,
};
use crossterm::event::KeyCode;
use tempfile::tempdir;

fn sample(name: &str) -> Values {
    Values::new()
        .with(Column::Name, name)
        .with(Column::Genre, Genre::Fantasy)
        .with(Column::Price, 9.99)
        .with(Column::Quantity, 3)
        .with(Column::SupplierName, "Gollancz")
        .with(Column::SupplierPhone, "+44 (20) 555-0101")
}

fn item_id(resource: Resource) -> i64 {
    match resource {
        Resource::Item(id) => id,
        Resource::Collection => panic!("insert should return an item resource"),
    }
}

fn count_signals(provider: &BookProvider) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    provider.subscribe(Resource::Collection, true, move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    hits
}

#[test]
fn insert_then_query_returns_the_same_fields() {
    let provider = BookProvider::in_memory().unwrap();
    let id = item_id(provider.insert("books", &sample("The Name of the Wind")).unwrap());

    let mut cursor = provider
        .query(&format!("books/{id}"), &[], &Selection::all(), &[])
        .unwrap();
    let row = cursor.next().unwrap().unwrap();
    assert!(cursor.next().is_none());

    assert_eq!(row.get_i64(Column::Id).unwrap(), id);
    assert_eq!(row.get_text(Column::Name).unwrap(), "The Name of the Wind");
    assert_eq!(row.get_i64(Column::Genre).unwrap(), Genre::Fantasy.code());
    assert_eq!(row.get_f64(Column::Price).unwrap(), 9.99);
    assert_eq!(row.get_i64(Column::Quantity).unwrap(), 3);
    assert_eq!(row.get_text(Column::SupplierName).unwrap(), "Gollancz");
    assert_eq!(
        row.get_text(Column::SupplierPhone).unwrap(),
        "+44 (20) 555-0101"
    );
}

#[test]
fn missing_fields_fail_in_check_order_without_writing() {
    let provider = BookProvider::in_memory().unwrap();
    let hits = count_signals(&provider);

    let cases = [
        (Column::Name, Column::Name),
        (Column::Price, Column::Price),
        (Column::Quantity, Column::Quantity),
        (Column::SupplierName, Column::SupplierName),
        (Column::SupplierPhone, Column::SupplierPhone),
    ];
    for (removed, expected) in cases {
        let mut values = sample("Partial");
        values.remove(removed);
        let err = provider.insert("books", &values).unwrap_err();
        match err {
            Error::ValidationFailed(ValidationError { field, reason }) => {
                assert_eq!(field, expected);
                assert_eq!(reason, Reason::Required);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // Several gaps at once report the earliest column.
    let only_phone = Values::new().with(Column::SupplierPhone, "555");
    let err = provider.insert("books", &only_phone).unwrap_err();
    assert!(matches!(
        err,
        Error::ValidationFailed(ValidationError {
            field: Column::Name,
            ..
        })
    ));

    assert!(provider.list_books().unwrap().is_empty());
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn genre_is_optional_on_insert() {
    let provider = BookProvider::in_memory().unwrap();
    let mut values = sample("No Genre");
    values.remove(Column::Genre);
    let id = item_id(provider.insert("books", &values).unwrap());
    assert_eq!(
        provider.fetch_book(id).unwrap().unwrap().genre,
        Genre::Unknown
    );
}

#[test]
fn empty_update_affects_nothing_and_stays_silent() {
    let provider = BookProvider::in_memory().unwrap();
    let id = item_id(provider.insert("books", &sample("Quiet")).unwrap());
    let hits = count_signals(&provider);

    let rows = provider
        .update(&format!("books/{id}"), &Values::new(), &Selection::all())
        .unwrap();
    assert_eq!(rows, 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[test]
fn item_writes_ignore_caller_filters() {
    let provider = BookProvider::in_memory().unwrap();
    let target = item_id(provider.insert("books", &sample("Target")).unwrap());
    let bystander = item_id(provider.insert("books", &sample("Bystander")).unwrap());

    let claims_bystander = Selection::new("_id = ?", vec![Value::from(bystander)]);
    let values = Values::new().with(Column::Quantity, 11);
    let updated = provider
        .update(&format!("books/{target}"), &values, &claims_bystander)
        .unwrap();
    assert_eq!(updated, 1);
    assert_eq!(provider.fetch_book(target).unwrap().unwrap().quantity, 11);
    assert_eq!(provider.fetch_book(bystander).unwrap().unwrap().quantity, 3);

    let deleted = provider
        .delete(&format!("books/{target}"), &claims_bystander)
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(provider.fetch_book(target).unwrap().is_none());
    assert!(provider.fetch_book(bystander).unwrap().is_some());
}

#[test]
fn fantasy_round_trip() {
    let provider = BookProvider::in_memory().unwrap();
    let uri = provider
        .insert("books", &sample("Round Trip"))
        .unwrap()
        .to_uri_string();

    let values = Values::new().with(Column::Quantity, 2);
    assert_eq!(provider.update(&uri, &values, &Selection::all()).unwrap(), 1);
    let books = provider
        .query(&uri, &[], &Selection::all(), &[])
        .unwrap()
        .into_books()
        .unwrap();
    assert_eq!(books[0].quantity, 2);
    assert_eq!(books[0].genre, Genre::Fantasy);
    assert_eq!(books[0].display_price(), "$9.99");

    assert_eq!(provider.delete(&uri, &Selection::all()).unwrap(), 1);
    let mut cursor = provider.query(&uri, &[], &Selection::all(), &[]).unwrap();
    assert!(cursor.next().is_none());
}

#[test]
fn non_integer_id_is_unroutable_everywhere() {
    let provider = BookProvider::in_memory().unwrap();
    let uri = "books/abc";
    let unroutable = |err: Error| matches!(err, Error::UnroutableResource(_));

    assert!(unroutable(
        provider
            .query(uri, &[], &Selection::all(), &[])
            .unwrap_err()
    ));
    assert!(unroutable(provider.insert(uri, &sample("X")).unwrap_err()));
    assert!(unroutable(
        provider
            .update(uri, &sample("X"), &Selection::all())
            .unwrap_err()
    ));
    assert!(unroutable(
        provider.delete(uri, &Selection::all()).unwrap_err()
    ));
}

#[test]
fn collection_query_pages_through_every_row() {
    let dir = tempdir().unwrap();
    let storage = Storage::open(&dir.path().join("books.sqlite"))
        .unwrap()
        .with_page_size(3);
    let provider = BookProvider::new(storage, Router::books());
    for n in 0..10 {
        provider
            .insert("books", &sample(&format!("Volume {n:02}")))
            .unwrap();
    }

    let names: Vec<String> = provider
        .query(
            "books",
            &[Column::Name],
            &Selection::all(),
            &[SortKey::desc(Column::Name)],
        )
        .unwrap()
        .map(|row| row.unwrap().get_text(Column::Name).unwrap())
        .collect();
    assert_eq!(names.len(), 10);
    assert_eq!(names.first().map(String::as_str), Some("Volume 09"));
    assert_eq!(names.last().map(String::as_str), Some("Volume 00"));
}

#[test]
fn data_survives_reopening_and_ids_are_not_reused() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("books.sqlite");

    let first = {
        let provider = BookProvider::new(Storage::open(&path).unwrap(), Router::books());
        let first = item_id(provider.insert("books", &sample("First")).unwrap());
        let second = item_id(provider.insert("books", &sample("Second")).unwrap());
        provider
            .delete(&format!("books/{second}"), &Selection::all())
            .unwrap();
        first
    };

    let provider = BookProvider::new(Storage::open(&path).unwrap(), Router::books());
    let books = provider.list_books().unwrap();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].id, first);

    let third = item_id(provider.insert("books", &sample("Third")).unwrap());
    assert!(third > first + 1);
}

#[test]
fn unusable_path_is_storage_unavailable() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-directory");
    fs::write(&blocker, b"occupied").unwrap();

    let err = Storage::open(&blocker.join("books.sqlite")).unwrap_err();
    assert!(matches!(err, Error::StorageUnavailable { .. }));
    assert!(!err.is_programming_error());
}

#[test]
fn decrement_at_zero_never_reaches_storage() {
    let provider = Arc::new(BookProvider::in_memory().unwrap());
    let values = sample("Sold Out").with(Column::Quantity, 0);
    let id = item_id(provider.insert("books", &values).unwrap());
    let hits = count_signals(&provider);

    let mut app = App::new(Arc::clone(&provider)).unwrap();
    app.handle_key(KeyCode::Enter).unwrap();
    app.handle_key(KeyCode::Char('-')).unwrap();
    app.handle_key(KeyCode::Esc).unwrap();
    app.handle_key(KeyCode::Char('s')).unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(provider.fetch_book(id).unwrap().unwrap().quantity, 0);
}

#[test]
fn bad_payloads_are_rejected_with_reasons() {
    let provider = BookProvider::in_memory().unwrap();
    let id = item_id(provider.insert("books", &sample("Strict")).unwrap());
    let uri = format!("books/{id}");

    let reason_for = |values: Values| match provider
        .update(&uri, &values, &Selection::all())
        .unwrap_err()
    {
        Error::ValidationFailed(err) => (err.field, err.reason),
        other => panic!("unexpected error: {other}"),
    };

    assert_eq!(
        reason_for(Values::new().with(Column::Price, -1.0)),
        (Column::Price, Reason::Negative)
    );
    assert_eq!(
        reason_for(Values::new().with(Column::Quantity, 1.5)),
        (Column::Quantity, Reason::WrongType)
    );
    assert_eq!(
        reason_for(Values::new().with(Column::SupplierPhone, "call me")),
        (Column::SupplierPhone, Reason::InvalidPhone)
    );
    assert_eq!(
        reason_for(Values::new().with(Column::Id, 5)),
        (Column::Id, Reason::Immutable)
    );
    assert_eq!(
        reason_for(Values::new().with(Column::Name, Value::Null)),
        (Column::Name, Reason::Required)
    );

    // Integer prices widen to real.
    let values = Values::new().with(Column::Price, 12);
    assert_eq!(provider.update(&uri, &values, &Selection::all()).unwrap(), 1);
    assert_eq!(provider.fetch_book(id).unwrap().unwrap().price, 12.0);
}

#[test]
fn list_drain_survives_a_delete_between_pages() {
    let storage = Storage::open_in_memory().unwrap().with_page_size(2);
    let provider = BookProvider::new(storage, Router::books());
    let ids: Vec<i64> = (0..6)
        .map(|n| item_id(provider.insert("books", &sample(&format!("B{n}"))).unwrap()))
        .collect();

    let mut cursor = provider
        .query("books", &[Column::Name], &Selection::all(), &[SortKey::asc(Column::Name)])
        .unwrap();
    let mut seen: Vec<String> = Vec::new();
    for _ in 0..2 {
        seen.push(cursor.next().unwrap().unwrap().get_text(Column::Name).unwrap());
    }
    provider
        .delete(&format!("books/{}", ids[0]), &Selection::all())
        .unwrap();
    seen.extend(cursor.map(|row| row.unwrap().get_text(Column::Name).unwrap()));

    assert_eq!(seen, ["B0", "B1", "B2", "B3", "B4", "B5"]);
}
