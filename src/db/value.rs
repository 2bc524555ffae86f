//! Value types passed between callers, the validator, and SQLite.

use std::collections::BTreeMap;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;

use crate::models::{Column, Genre};

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers widen to reals so `price: 5` is accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Real(v),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(v) => ToSqlOutput::Borrowed(ValueRef::Integer(*v)),
            Value::Real(v) => ToSqlOutput::Borrowed(ValueRef::Real(*v)),
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Genre> for Value {
    fn from(genre: Genre) -> Self {
        Value::Integer(genre.code())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Column → value map for inserts and updates. Ordered by column so generated
/// SQL is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Values {
    entries: BTreeMap<Column, Value>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, column: Column, value: impl Into<Value>) -> Self {
        self.put(column, value);
        self
    }

    pub fn put(&mut self, column: Column, value: impl Into<Value>) {
        self.entries.insert(column, value.into());
    }

    pub fn get(&self, column: Column) -> Option<&Value> {
        self.entries.get(&column)
    }

    pub fn contains(&self, column: Column) -> bool {
        self.entries.contains_key(&column)
    }

    pub fn remove(&mut self, column: Column) -> Option<Value> {
        self.entries.remove(&column)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Column, &Value)> {
        self.entries.iter().map(|(column, value)| (*column, value))
    }
}

/// A filter: a SQL condition using anonymous `?` placeholders plus the values
/// bound to them, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub clause: Option<String>,
    pub args: Vec<Value>,
}

impl Selection {
    /// Matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(clause: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            clause: Some(clause.into()),
            args,
        }
    }

    /// Exactly the row with the given `_id`.
    pub fn by_id(id: i64) -> Self {
        Self::new(format!("{} = ?", Column::Id), vec![Value::Integer(id)])
    }

    pub(crate) fn where_sql(&self) -> String {
        match self.clause.as_deref().map(str::trim) {
            Some(clause) if !clause.is_empty() => format!(" WHERE {clause}"),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub column: Column,
    pub direction: Direction,
}

impl SortKey {
    pub fn asc(column: Column) -> Self {
        Self {
            column,
            direction: Direction::Ascending,
        }
    }

    pub fn desc(column: Column) -> Self {
        Self {
            column,
            direction: Direction::Descending,
        }
    }

    pub(crate) fn order_by_sql(keys: &[SortKey]) -> String {
        if keys.is_empty() {
            return String::new();
        }
        let terms: Vec<String> = keys
            .iter()
            .map(|key| {
                let dir = match key.direction {
                    Direction::Ascending => "ASC",
                    Direction::Descending => "DESC",
                };
                format!("{} {dir}", key.column)
            })
            .collect();
        format!(" ORDER BY {}", terms.join(", "))
    }
}
