use std::collections::VecDeque;

use rusqlite::types::Type;

use super::connection::Storage;
use super::schema::TABLE_NAME;
use super::value::{Direction, Selection, SortKey, Value};
use crate::error::{Error, Result};
use crate::models::{Book, Column};
use crate::router::Resource;

/// One row of a query result, holding only the projected columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<Column>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn new(columns: Vec<Column>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn get(&self, column: Column) -> Option<&Value> {
        self.index_of(column).map(|idx| &self.values[idx])
    }

    pub fn get_i64(&self, column: Column) -> Result<i64> {
        let (idx, value) = self.require(column)?;
        value
            .as_i64()
            .ok_or_else(|| type_mismatch(idx, column, Type::Integer))
    }

    pub fn get_f64(&self, column: Column) -> Result<f64> {
        let (idx, value) = self.require(column)?;
        value
            .as_f64()
            .ok_or_else(|| type_mismatch(idx, column, Type::Real))
    }

    pub fn get_text(&self, column: Column) -> Result<String> {
        let (idx, value) = self.require(column)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| type_mismatch(idx, column, Type::Text))
    }

    fn index_of(&self, column: Column) -> Option<usize> {
        self.columns.iter().position(|c| *c == column)
    }

    fn require(&self, column: Column) -> Result<(usize, &Value)> {
        let idx = self.index_of(column).ok_or_else(|| {
            Error::QueryFailed(rusqlite::Error::InvalidColumnName(column.to_string()))
        })?;
        Ok((idx, &self.values[idx]))
    }
}

fn type_mismatch(idx: usize, column: Column, expected: Type) -> Error {
    Error::QueryFailed(rusqlite::Error::InvalidColumnType(
        idx,
        column.to_string(),
        expected,
    ))
}

/// How a cursor walks a query. Each page resumes after the sort key of the
/// last row handed out, with `_id` as the final tiebreaker, so a delete
/// behind the cursor cannot shift rows that are still ahead of it.
#[derive(Debug)]
pub(crate) struct PagePlan {
    /// Columns the caller asked for.
    columns: Vec<Column>,
    /// `columns` plus any sort column the caller did not project.
    fetched: Vec<Column>,
    selection: Selection,
    keys: Vec<SortKey>,
    /// Position of each key inside `fetched`.
    key_slots: Vec<usize>,
}

impl PagePlan {
    pub(crate) fn new(columns: Vec<Column>, selection: Selection, sort: &[SortKey]) -> Self {
        let mut keys: Vec<SortKey> = Vec::with_capacity(sort.len() + 1);
        for key in sort {
            if keys.iter().any(|seen| seen.column == key.column) {
                continue;
            }
            keys.push(*key);
            // `_id` is unique; nothing after it can change the order.
            if key.column == Column::Id {
                break;
            }
        }
        if !keys.iter().any(|key| key.column == Column::Id) {
            keys.push(SortKey::asc(Column::Id));
        }

        let mut fetched = columns.clone();
        let key_slots: Vec<usize> = keys
            .iter()
            .map(|key| match fetched.iter().position(|c| *c == key.column) {
                Some(slot) => slot,
                None => {
                    fetched.push(key.column);
                    fetched.len() - 1
                }
            })
            .collect();

        Self {
            columns,
            fetched,
            selection,
            keys,
            key_slots,
        }
    }

    /// The statement without paging, for logging.
    pub(crate) fn base_sql(&self) -> String {
        format!(
            "SELECT {} FROM {TABLE_NAME}{}{}",
            self.column_list(),
            self.selection.where_sql(),
            SortKey::order_by_sql(&self.keys)
        )
    }

    /// Statement and arguments for the page following the row whose sort key
    /// is `after`, or the first page when `None`.
    pub(crate) fn page_sql(&self, after: Option<&[Value]>, limit: usize) -> (String, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut args = Vec::new();

        let clause = self
            .selection
            .clause
            .as_deref()
            .map(str::trim)
            .filter(|clause| !clause.is_empty());
        if let Some(clause) = clause {
            conditions.push(format!("({clause})"));
            args.extend(self.selection.args.iter().cloned());
        }
        if let Some(last) = after {
            let (resume, resume_args) = self.resume_after(last);
            conditions.push(resume);
            args.extend(resume_args);
        }

        let where_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM {TABLE_NAME}{where_sql}{} LIMIT {limit}",
            self.column_list(),
            SortKey::order_by_sql(&self.keys)
        );
        (sql, args)
    }

    /// `(k1 > ?) OR (k1 = ? AND k2 > ?) OR ...`, with `<` for descending keys.
    fn resume_after(&self, last: &[Value]) -> (String, Vec<Value>) {
        let mut branches = Vec::with_capacity(self.keys.len());
        let mut args = Vec::new();

        for (depth, (key, value)) in self.keys.iter().zip(last).enumerate() {
            let mut terms = Vec::with_capacity(depth + 1);
            for (prefix, prefix_value) in self.keys[..depth].iter().zip(last) {
                terms.push(format!("{} = ?", prefix.column));
                args.push(prefix_value.clone());
            }
            let op = match key.direction {
                Direction::Ascending => ">",
                Direction::Descending => "<",
            };
            terms.push(format!("{} {op} ?", key.column));
            args.push(value.clone());
            branches.push(format!("({})", terms.join(" AND ")));
        }

        (format!("({})", branches.join(" OR ")), args)
    }

    fn column_list(&self) -> String {
        let names: Vec<&str> = self.fetched.iter().map(|column| column.as_str()).collect();
        names.join(", ")
    }
}

/// Lazy, forward-only sequence of rows. Rows are pulled from storage one page
/// at a time and no lock is held between pages. A write that commits while a
/// cursor is being drained may or may not show up in it, but rows the write
/// did not touch are never skipped or repeated. Re-query to start over.
#[derive(Debug)]
pub struct Cursor {
    storage: Storage,
    plan: PagePlan,
    buffer: VecDeque<Row>,
    /// Sort key of the last row pulled from storage.
    last_key: Option<Vec<Value>>,
    exhausted: bool,
    resource: Option<Resource>,
}

impl Cursor {
    pub(crate) fn new(storage: Storage, plan: PagePlan) -> Self {
        Self {
            storage,
            plan,
            buffer: VecDeque::new(),
            last_key: None,
            exhausted: false,
            resource: None,
        }
    }

    pub(crate) fn prefetch(&mut self) -> Result<()> {
        self.fill()
    }

    pub(crate) fn set_resource(&mut self, resource: Resource) {
        self.resource = Some(resource);
    }

    /// Resource whose change notifications invalidate this cursor.
    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    pub fn columns(&self) -> &[Column] {
        &self.plan.columns
    }

    /// Drain into hydrated books. Requires a projection covering every column.
    pub fn into_books(self) -> Result<Vec<Book>> {
        self.map(|row| row.and_then(|row| Book::try_from(&row)))
            .collect()
    }

    fn fill(&mut self) -> Result<()> {
        let page_size = self.storage.page_size();
        let (sql, args) = self.plan.page_sql(self.last_key.as_deref(), page_size);
        let page = self
            .storage
            .fetch_page(&sql, &args, self.plan.fetched.len())?;
        if page.len() < page_size {
            self.exhausted = true;
        }

        for mut cells in page {
            let key = self
                .plan
                .key_slots
                .iter()
                .map(|&slot| cells[slot].clone())
                .collect();
            self.last_key = Some(key);
            cells.truncate(self.plan.columns.len());
            self.buffer
                .push_back(Row::new(self.plan.columns.clone(), cells));
        }
        Ok(())
    }
}

impl Iterator for Cursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.buffer.pop_front() {
            return Some(Ok(row));
        }
        if self.exhausted {
            return None;
        }
        match self.fill() {
            Ok(()) => self.buffer.pop_front().map(Ok),
            Err(err) => {
                self.exhausted = true;
                Some(Err(err))
            }
        }
    }
}
