use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use super::cursor::{Cursor, PagePlan};
use super::schema::{CREATE_BOOKS_TABLE, SCHEMA_VERSION, TABLE_NAME};
use super::value::{Selection, SortKey, Value, Values};
use crate::error::{Error, Result, WriteOp};
use crate::models::Column;

/// Rows fetched per round-trip when a cursor is drained.
pub const DEFAULT_PAGE_SIZE: usize = 64;

/// Owner of the on-disk `books` table. Cloning shares the same connection; the
/// connection lock is what serializes writers.
#[derive(Clone, Debug)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
    page_size: usize,
}

impl Storage {
    /// Open (or create) the database file, creating missing parent
    /// directories, then make sure the schema is current. Safe to call on an
    /// already initialized file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    Error::unavailable_from(
                        format!("failed to create data directory {}", parent.display()),
                        err,
                    )
                })?;
            }
        }

        let conn = Connection::open(path).map_err(|err| {
            Error::unavailable_from(format!("failed to open {}", path.display()), err)
        })?;
        let storage = Self::from_connection(conn)?;
        info!(path = %path.display(), "opened book database");
        Ok(storage)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|err| Error::unavailable_from("failed to open in-memory database", err))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Override how many rows a cursor pulls per page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Append one row and return the id SQLite assigned to it.
    pub fn insert_row(&self, values: &Values) -> Result<i64> {
        let sql = if values.is_empty() {
            format!("INSERT INTO {TABLE_NAME} DEFAULT VALUES")
        } else {
            let columns: Vec<&str> = values.iter().map(|(column, _)| column.as_str()).collect();
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {TABLE_NAME} ({}) VALUES ({placeholders})",
                columns.join(", ")
            )
        };

        let conn = self.lock()?;
        conn.execute(&sql, params_from_iter(values.iter().map(|(_, value)| value)))
            .map_err(|source| Error::WriteFailed {
                operation: WriteOp::Insert,
                source,
            })?;
        // Read under the same guard so a concurrent insert cannot race us.
        let id = conn.last_insert_rowid();
        debug!(id, "inserted row");
        Ok(id)
    }

    /// Apply `values` to every row matching `selection`. Zero matches is not
    /// an error.
    pub fn update_rows(&self, values: &Values, selection: &Selection) -> Result<usize> {
        let assignments: Vec<String> = values
            .iter()
            .map(|(column, _)| format!("{} = ?", column.as_str()))
            .collect();
        let sql = format!(
            "UPDATE {TABLE_NAME} SET {}{}",
            assignments.join(", "),
            selection.where_sql()
        );
        let args = values
            .iter()
            .map(|(_, value)| value)
            .chain(selection.args.iter());

        let updated = self
            .lock()?
            .execute(&sql, params_from_iter(args))
            .map_err(|source| Error::WriteFailed {
                operation: WriteOp::Update,
                source,
            })?;
        debug!(rows = updated, "updated rows");
        Ok(updated)
    }

    pub fn delete_rows(&self, selection: &Selection) -> Result<usize> {
        let sql = format!("DELETE FROM {TABLE_NAME}{}", selection.where_sql());
        let deleted = self
            .lock()?
            .execute(&sql, params_from_iter(selection.args.iter()))
            .map_err(|source| Error::WriteFailed {
                operation: WriteOp::Delete,
                source,
            })?;
        debug!(rows = deleted, "deleted rows");
        Ok(deleted)
    }

    /// Start a query. The first page is fetched immediately so a malformed
    /// filter fails here rather than on the first `next()`; later pages are
    /// pulled as the cursor drains.
    pub fn query_rows(
        &self,
        projection: &[Column],
        selection: &Selection,
        sort: &[SortKey],
    ) -> Result<Cursor> {
        let columns: Vec<Column> = if projection.is_empty() {
            Column::ALL.to_vec()
        } else {
            projection.to_vec()
        };
        let plan = PagePlan::new(columns, selection.clone(), sort);
        debug!(sql = %plan.base_sql(), "query");

        let mut cursor = Cursor::new(self.clone(), plan);
        cursor.prefetch()?;
        Ok(cursor)
    }

    /// Run one page statement and return the raw cells, `width` per row.
    pub(crate) fn fetch_page(
        &self,
        sql: &str,
        args: &[Value],
        width: usize,
    ) -> Result<Vec<Vec<Value>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(Error::QueryFailed)?;

        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                (0..width)
                    .map(|idx| row.get_ref(idx).map(Value::from_sql))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .map_err(Error::QueryFailed)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::QueryFailed)?;

        Ok(rows)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::unavailable("database connection lock poisoned"))
    }
}

/// Create the table on a fresh file and stamp the schema version. Files from a
/// newer release are refused instead of guessed at.
fn migrate(conn: &Connection) -> Result<()> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|err| Error::unavailable_from("failed to read schema version", err))?;

    if version > SCHEMA_VERSION {
        return Err(Error::unavailable(format!(
            "database schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    conn.execute(CREATE_BOOKS_TABLE, [])
        .map_err(|err| Error::unavailable_from("failed to create books table", err))?;

    if version < SCHEMA_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .map_err(|err| Error::unavailable_from("failed to stamp schema version", err))?;
        info!(from = version, to = SCHEMA_VERSION, "upgraded book schema");
    }

    Ok(())
}
