//! Domain models that mirror the `books` table. `Column` is the stable set of
//! on-disk names shared with every collaborator, `Genre` is the closed
//! enumeration stored in the `genre` column, and `Book` is a fully hydrated
//! row handed to the presentation layer.

use std::fmt;
use std::str::FromStr;

use crate::db::Row;
use crate::error::{Error, Result};

/// Closed set of genre codes. Anything outside 0..=7 is rejected, never
/// folded into `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Genre {
    #[default]
    Unknown,
    Fantasy,
    SciFi,
    Mystery,
    Romance,
    Horror,
    ActionAdventure,
    Drama,
}

impl Genre {
    /// Every genre in code order. The editor cycles through this list.
    pub const ALL: [Genre; 8] = [
        Genre::Unknown,
        Genre::Fantasy,
        Genre::SciFi,
        Genre::Mystery,
        Genre::Romance,
        Genre::Horror,
        Genre::ActionAdventure,
        Genre::Drama,
    ];

    pub fn code(self) -> i64 {
        match self {
            Genre::Unknown => 0,
            Genre::Fantasy => 1,
            Genre::SciFi => 2,
            Genre::Mystery => 3,
            Genre::Romance => 4,
            Genre::Horror => 5,
            Genre::ActionAdventure => 6,
            Genre::Drama => 7,
        }
    }

    pub fn from_code(code: i64) -> Option<Genre> {
        Genre::ALL.into_iter().find(|genre| genre.code() == code)
    }

    pub fn is_valid_code(code: i64) -> bool {
        Genre::from_code(code).is_some()
    }

    pub fn label(self) -> &'static str {
        match self {
            Genre::Unknown => "Unknown",
            Genre::Fantasy => "Fantasy",
            Genre::SciFi => "Sci-Fi",
            Genre::Mystery => "Mystery",
            Genre::Romance => "Romance",
            Genre::Horror => "Horror",
            Genre::ActionAdventure => "Action & Adventure",
            Genre::Drama => "Drama",
        }
    }

    /// Next genre in code order, wrapping back to `Unknown`.
    pub fn next(self) -> Genre {
        let idx = self.code() as usize;
        Genre::ALL[(idx + 1) % Genre::ALL.len()]
    }

    pub fn previous(self) -> Genre {
        let idx = self.code() as usize;
        Genre::ALL[(idx + Genre::ALL.len() - 1) % Genre::ALL.len()]
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Column names of the `books` table. The string forms are stable on disk and
/// across the provider contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    Id,
    Name,
    Genre,
    Price,
    Quantity,
    SupplierName,
    SupplierPhone,
}

impl Column {
    /// All columns in table order; also the default projection.
    pub const ALL: [Column; 7] = [
        Column::Id,
        Column::Name,
        Column::Genre,
        Column::Price,
        Column::Quantity,
        Column::SupplierName,
        Column::SupplierPhone,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Column::Id => "_id",
            Column::Name => "name",
            Column::Genre => "genre",
            Column::Price => "price",
            Column::Quantity => "quantity",
            Column::SupplierName => "supplier_name",
            Column::SupplierPhone => "supplier_phone_number",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Column {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Column::ALL
            .into_iter()
            .find(|column| column.as_str() == s)
            .ok_or_else(|| format!("unknown column: {s}"))
    }
}

/// A fully hydrated book row. Only produced from a cursor whose projection
/// covered every column.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    /// Assigned by storage on insert and never changed afterwards.
    pub id: i64,
    pub name: String,
    pub genre: Genre,
    pub price: f64,
    /// Units in stock, never negative once stored.
    pub quantity: i64,
    pub supplier_name: String,
    pub supplier_phone: String,
}

impl Book {
    /// Price rendered the way every screen shows it.
    pub fn display_price(&self) -> String {
        format_price(self.price)
    }
}

/// Fixed two-decimal currency rendering used across the UI.
pub fn format_price(price: f64) -> String {
    format!("${price:.2}")
}

impl TryFrom<&Row> for Book {
    type Error = Error;

    fn try_from(row: &Row) -> Result<Self> {
        let genre_code = row.get_i64(Column::Genre)?;
        // A stored code outside the closed set is reported, never clamped.
        let genre = Genre::from_code(genre_code).ok_or_else(|| {
            let idx = row
                .columns()
                .iter()
                .position(|column| *column == Column::Genre)
                .unwrap_or_default();
            Error::QueryFailed(rusqlite::Error::IntegralValueOutOfRange(idx, genre_code))
        })?;
        Ok(Book {
            id: row.get_i64(Column::Id)?,
            name: row.get_text(Column::Name)?,
            genre,
            price: row.get_f64(Column::Price)?,
            quantity: row.get_i64(Column::Quantity)?,
            supplier_name: row.get_text(Column::SupplierName)?,
            supplier_phone: row.get_text(Column::SupplierPhone)?,
        })
    }
}
