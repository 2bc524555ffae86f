use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};

use crate::db::Values;
use crate::models::{Book, Column, Genre};

/// Fields of the book editor, in tab order.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub(crate) enum BookField {
    #[default]
    Name,
    Genre,
    Price,
    Quantity,
    SupplierName,
    SupplierPhone,
}

impl BookField {
    const ORDER: [BookField; 6] = [
        BookField::Name,
        BookField::Genre,
        BookField::Price,
        BookField::Quantity,
        BookField::SupplierName,
        BookField::SupplierPhone,
    ];

    pub(crate) fn label(self) -> &'static str {
        match self {
            BookField::Name => "Name",
            BookField::Genre => "Genre",
            BookField::Price => "Price",
            BookField::Quantity => "Quantity",
            BookField::SupplierName => "Supplier",
            BookField::SupplierPhone => "Supplier phone",
        }
    }

    fn position(self) -> usize {
        Self::ORDER
            .iter()
            .position(|field| *field == self)
            .unwrap_or(0)
    }

    fn next(self) -> Self {
        Self::ORDER[(self.position() + 1) % Self::ORDER.len()]
    }

    fn previous(self) -> Self {
        Self::ORDER[(self.position() + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }
}

/// Editor state for creating or editing a book. Numeric fields are kept as
/// raw text until save.
#[derive(Default, Clone, Debug)]
pub(crate) struct BookForm {
    pub(crate) name: String,
    pub(crate) genre: Genre,
    pub(crate) price: String,
    pub(crate) quantity: String,
    pub(crate) supplier_name: String,
    pub(crate) supplier_phone: String,
    pub(crate) active: BookField,
    pub(crate) error: Option<String>,
    /// Set once the user changes anything.
    pub(crate) dirty: bool,
}

impl BookForm {
    /// Populate the form from an existing book when entering edit mode.
    pub(crate) fn from_book(book: &Book) -> Self {
        Self {
            name: book.name.clone(),
            genre: book.genre,
            price: format!("{:.2}", book.price),
            quantity: book.quantity.to_string(),
            supplier_name: book.supplier_name.clone(),
            supplier_phone: book.supplier_phone.clone(),
            active: BookField::Name,
            error: None,
            dirty: false,
        }
    }

    pub(crate) fn next_field(&mut self) {
        self.active = self.active.next();
    }

    pub(crate) fn previous_field(&mut self) {
        self.active = self.active.previous();
    }

    /// Step the genre selection when it has focus.
    pub(crate) fn cycle_genre(&mut self, forward: bool) -> bool {
        if self.active != BookField::Genre {
            return false;
        }
        self.genre = if forward {
            self.genre.next()
        } else {
            self.genre.previous()
        };
        self.touch();
        true
    }

    /// Append a character to the active field, rejecting characters the
    /// field can never hold.
    pub(crate) fn push_char(&mut self, ch: char) -> bool {
        let accepted = match self.active {
            BookField::Name => push_text(&mut self.name, ch),
            BookField::SupplierName => push_text(&mut self.supplier_name, ch),
            BookField::Genre => match ch {
                ' ' | 'l' => self.cycle_genre(true),
                'h' => self.cycle_genre(false),
                _ => false,
            },
            BookField::Price => {
                if ch.is_ascii_digit() || (ch == '.' && !self.price.contains('.')) {
                    self.price.push(ch);
                    true
                } else {
                    false
                }
            }
            BookField::Quantity => {
                if ch.is_ascii_digit() {
                    self.quantity.push(ch);
                    true
                } else {
                    false
                }
            }
            BookField::SupplierPhone => {
                if ch.is_ascii_digit() || matches!(ch, '+' | '-' | '(' | ')' | '.' | ' ') {
                    self.supplier_phone.push(ch);
                    true
                } else {
                    false
                }
            }
        };
        if accepted {
            self.touch();
        }
        accepted
    }

    /// Remove the last character from the active field.
    pub(crate) fn backspace(&mut self) {
        let removed = match self.active {
            BookField::Name => self.name.pop(),
            BookField::Genre => None,
            BookField::Price => self.price.pop(),
            BookField::Quantity => self.quantity.pop(),
            BookField::SupplierName => self.supplier_name.pop(),
            BookField::SupplierPhone => self.supplier_phone.pop(),
        };
        if removed.is_some() {
            self.touch();
        }
    }

    /// True when nothing has been entered at all.
    pub(crate) fn is_blank(&self) -> bool {
        self.name.trim().is_empty()
            && self.price.trim().is_empty()
            && self.quantity.trim().is_empty()
            && self.supplier_name.trim().is_empty()
            && self.supplier_phone.trim().is_empty()
            && self.genre == Genre::Unknown
    }

    /// Turn the inputs into a payload, stopping at the first blank or
    /// unparsable field.
    pub(crate) fn to_values(&self) -> Result<Values, (BookField, String)> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err((BookField::Name, "Book name is required.".to_string()));
        }

        let price_raw = self.price.trim();
        if price_raw.is_empty() {
            return Err((BookField::Price, "Book price is required.".to_string()));
        }
        let price = price_raw
            .parse::<f64>()
            .map_err(|_| (BookField::Price, "Book price must be a number.".to_string()))?;

        let quantity_raw = self.quantity.trim();
        if quantity_raw.is_empty() {
            return Err((BookField::Quantity, "Book quantity is required.".to_string()));
        }
        let quantity = quantity_raw.parse::<i64>().map_err(|_| {
            (
                BookField::Quantity,
                "Book quantity must be a whole number.".to_string(),
            )
        })?;

        let supplier_name = self.supplier_name.trim();
        if supplier_name.is_empty() {
            return Err((
                BookField::SupplierName,
                "Book supplier name is required.".to_string(),
            ));
        }

        let supplier_phone = self.supplier_phone.trim();
        if supplier_phone.is_empty() {
            return Err((
                BookField::SupplierPhone,
                "Book supplier phone is required.".to_string(),
            ));
        }

        Ok(Values::new()
            .with(Column::Name, name)
            .with(Column::Genre, self.genre)
            .with(Column::Price, price)
            .with(Column::Quantity, quantity)
            .with(Column::SupplierName, supplier_name)
            .with(Column::SupplierPhone, supplier_phone))
    }

    pub(crate) fn value(&self, field: BookField) -> String {
        match field {
            BookField::Name => self.name.clone(),
            BookField::Genre => format!("< {} >", self.genre),
            BookField::Price => self.price.clone(),
            BookField::Quantity => self.quantity.clone(),
            BookField::SupplierName => self.supplier_name.clone(),
            BookField::SupplierPhone => self.supplier_phone.clone(),
        }
    }

    /// Render a single line for the form widget.
    pub(crate) fn build_line(&self, field: BookField) -> Line<'static> {
        let value = self.value(field);
        let is_active = self.active == field;

        let display = if value.is_empty() {
            "<required>".to_string()
        } else {
            value.clone()
        };

        let style = if is_active {
            Style::default().fg(Color::Yellow)
        } else if value.is_empty() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };

        Line::from(vec![
            Span::raw(format!("{}: ", field.label())),
            Span::styled(display, style),
        ])
    }

    /// Row of `field` inside the form, used to place the cursor.
    pub(crate) fn row_of(field: BookField) -> u16 {
        field.position() as u16
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.error = None;
    }
}

fn push_text(target: &mut String, ch: char) -> bool {
    if ch.is_control() {
        false
    } else {
        target.push(ch);
        true
    }
}

/// Which rows a delete confirmation is about.
#[derive(Clone, Debug)]
pub(crate) enum ConfirmDelete {
    Book { id: i64, name: String },
    All,
}

impl ConfirmDelete {
    pub(crate) fn prompt(&self) -> String {
        match self {
            ConfirmDelete::Book { name, .. } => format!("Delete \"{name}\"?"),
            ConfirmDelete::All => "Delete every book in the inventory?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;

    fn filled() -> BookForm {
        BookForm {
            name: "Dune".into(),
            genre: Genre::SciFi,
            price: "9.99".into(),
            quantity: "3".into(),
            supplier_name: "Ace".into(),
            supplier_phone: "5550100".into(),
            ..BookForm::default()
        }
    }

    #[test]
    fn test_numeric_fields_filter_input() {
        let mut form = BookForm {
            active: BookField::Price,
            ..BookForm::default()
        };
        assert!(form.push_char('1'));
        assert!(form.push_char('.'));
        assert!(!form.push_char('.'));
        assert!(!form.push_char('x'));
        assert_eq!(form.price, "1.");

        form.active = BookField::Quantity;
        assert!(!form.push_char('-'));
        assert!(form.dirty);
    }

    #[test]
    fn test_first_blank_field_blocks_save() {
        let mut form = filled();
        form.price.clear();
        form.supplier_name.clear();
        let (field, message) = form.to_values().unwrap_err();
        assert_eq!(field, BookField::Price);
        assert_eq!(message, "Book price is required.");
    }

    #[test]
    fn test_to_values_carries_every_column() {
        let values = filled().to_values().unwrap();
        assert_eq!(values.get(Column::Genre), Some(&Value::Integer(2)));
        assert_eq!(values.get(Column::Price), Some(&Value::Real(9.99)));
        assert_eq!(values.get(Column::Quantity), Some(&Value::Integer(3)));
        assert_eq!(values.len(), 6);
    }

    #[test]
    fn test_genre_cycles_only_when_focused() {
        let mut form = BookForm::default();
        assert!(!form.cycle_genre(true));
        form.active = BookField::Genre;
        assert!(form.cycle_genre(false));
        assert_eq!(form.genre, Genre::Drama);
        assert!(!form.is_blank());
    }

    #[test]
    fn test_focus_wraps() {
        let mut form = BookForm::default();
        form.previous_field();
        assert_eq!(form.active, BookField::SupplierPhone);
        form.next_field();
        assert_eq!(form.active, BookField::Name);
    }
}
