//! Static description of the `books` table.

/// Name of the only table in the database.
pub const TABLE_NAME: &str = "books";

/// Stamped into `PRAGMA user_version` once the table exists.
pub const SCHEMA_VERSION: i64 = 1;

/// `AUTOINCREMENT` keeps ids from being reused after a delete.
pub const CREATE_BOOKS_TABLE: &str = "CREATE TABLE IF NOT EXISTS books (
    _id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    genre INTEGER NOT NULL DEFAULT 0,
    price REAL NOT NULL DEFAULT 0,
    quantity INTEGER NOT NULL DEFAULT 0,
    supplier_name TEXT NOT NULL,
    supplier_phone_number TEXT NOT NULL
)";
