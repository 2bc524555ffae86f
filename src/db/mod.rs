//! Storage engine split across logical submodules.

mod connection;
mod cursor;
pub mod schema;
mod value;

pub use connection::{Storage, DEFAULT_PAGE_SIZE};
pub use cursor::{Cursor, Row};
pub use value::{Direction, Selection, SortKey, Value, Values};
