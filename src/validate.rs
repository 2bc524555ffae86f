//! Payload checks that run before anything reaches storage. Fields are checked
//! in a fixed order and the first failure is reported; later fields are not
//! examined once one fails.

use std::fmt;

use crate::db::{Value, Values};
use crate::models::{Column, Genre};

/// Order in which fields are examined.
const CHECK_ORDER: [Column; 6] = [
    Column::Name,
    Column::Genre,
    Column::Price,
    Column::Quantity,
    Column::SupplierName,
    Column::SupplierPhone,
];

/// Fields an insert must carry. `genre` falls back to `Unknown`.
const REQUIRED_ON_INSERT: [Column; 5] = [
    Column::Name,
    Column::Price,
    Column::Quantity,
    Column::SupplierName,
    Column::SupplierPhone,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Every required field must be present.
    Insert,
    /// Only the fields present are checked.
    Update,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// Missing from an insert, or explicitly null.
    Required,
    Empty,
    /// Not one of the closed genre codes.
    UnknownGenre(i64),
    Negative,
    NotFinite,
    WrongType,
    InvalidPhone,
    /// `_id` is assigned by storage and cannot be written.
    Immutable,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Required => f.write_str("is required"),
            Reason::Empty => f.write_str("must not be empty"),
            Reason::UnknownGenre(code) => write!(f, "has unknown genre code {code}"),
            Reason::Negative => f.write_str("must not be negative"),
            Reason::NotFinite => f.write_str("must be a finite number"),
            Reason::WrongType => f.write_str("has the wrong type"),
            Reason::InvalidPhone => f.write_str("must be a phone number"),
            Reason::Immutable => f.write_str("cannot be written"),
        }
    }
}

/// Which field failed and why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed: {field} {reason}")]
pub struct ValidationError {
    pub field: Column,
    pub reason: Reason,
}

impl ValidationError {
    fn new(field: Column, reason: Reason) -> Self {
        Self { field, reason }
    }
}

/// Check `values` for `mode`, stopping at the first failure.
pub fn validate(values: &Values, mode: Mode) -> Result<(), ValidationError> {
    if values.contains(Column::Id) {
        return Err(ValidationError::new(Column::Id, Reason::Immutable));
    }

    for column in CHECK_ORDER {
        match values.get(column) {
            Some(value) => check_field(column, value)?,
            None if mode == Mode::Insert && REQUIRED_ON_INSERT.contains(&column) => {
                return Err(ValidationError::new(column, Reason::Required));
            }
            None => {}
        }
    }

    Ok(())
}

fn check_field(column: Column, value: &Value) -> Result<(), ValidationError> {
    if value.is_null() {
        return Err(ValidationError::new(column, Reason::Required));
    }

    let reason = match column {
        Column::Name | Column::SupplierName => check_text(value),
        Column::Genre => check_genre(value),
        Column::Price => check_price(value),
        Column::Quantity => check_quantity(value),
        Column::SupplierPhone => check_phone(value),
        Column::Id => Some(Reason::Immutable),
    };

    match reason {
        Some(reason) => Err(ValidationError::new(column, reason)),
        None => Ok(()),
    }
}

fn check_text(value: &Value) -> Option<Reason> {
    match value.as_str() {
        None => Some(Reason::WrongType),
        Some(text) if text.trim().is_empty() => Some(Reason::Empty),
        Some(_) => None,
    }
}

fn check_genre(value: &Value) -> Option<Reason> {
    match value.as_i64() {
        None => Some(Reason::WrongType),
        Some(code) if !Genre::is_valid_code(code) => Some(Reason::UnknownGenre(code)),
        Some(_) => None,
    }
}

fn check_price(value: &Value) -> Option<Reason> {
    match value.as_f64() {
        None => Some(Reason::WrongType),
        Some(price) if !price.is_finite() => Some(Reason::NotFinite),
        Some(price) if price < 0.0 => Some(Reason::Negative),
        Some(_) => None,
    }
}

fn check_quantity(value: &Value) -> Option<Reason> {
    match value.as_i64() {
        None => Some(Reason::WrongType),
        Some(quantity) if quantity < 0 => Some(Reason::Negative),
        Some(_) => None,
    }
}

fn check_phone(value: &Value) -> Option<Reason> {
    let Some(phone) = value.as_str() else {
        return Some(Reason::WrongType);
    };
    let phone = phone.trim();
    if phone.is_empty() {
        return Some(Reason::Empty);
    }
    let allowed = phone
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, '+' | '-' | '(' | ')' | '.' | ' '));
    if !allowed || !phone.chars().any(|ch| ch.is_ascii_digit()) {
        return Some(Reason::InvalidPhone);
    }
    None
}
