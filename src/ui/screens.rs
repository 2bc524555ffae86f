use std::cmp::min;

use crossbeam::channel::Receiver;

use crate::models::Book;
use crate::observer::SubscriptionId;
use crate::router::Resource;

/// The inventory list. Holds the last query result; the app re-queries
/// whenever the collection feed fires.
pub(crate) struct ListScreen {
    pub(crate) books: Vec<Book>,
    pub(crate) selected: usize,
}

impl ListScreen {
    pub(crate) fn new(books: Vec<Book>) -> Self {
        let mut screen = Self { books, selected: 0 };
        screen.ensure_in_bounds();
        screen
    }

    /// Swap in fresh rows, keeping the cursor on `focus_id` if it survived.
    pub(crate) fn replace(&mut self, books: Vec<Book>, focus_id: Option<i64>) {
        let focus_id = focus_id.or_else(|| self.current_book().map(|book| book.id));
        self.books = books;
        if let Some(id) = focus_id {
            if let Some(idx) = self.books.iter().position(|book| book.id == id) {
                self.selected = idx;
                return;
            }
        }
        self.ensure_in_bounds();
    }

    pub(crate) fn current_book(&self) -> Option<&Book> {
        self.books.get(self.selected)
    }

    pub(crate) fn move_selection(&mut self, offset: isize) {
        if self.books.is_empty() {
            self.selected = 0;
            return;
        }
        let len = self.books.len() as isize;
        let mut new_index = self.selected as isize + offset;
        if new_index < 0 {
            new_index = 0;
        } else if new_index >= len {
            new_index = len - 1;
        }
        self.selected = new_index as usize;
    }

    pub(crate) fn select_first(&mut self) {
        self.selected = 0;
    }

    pub(crate) fn select_last(&mut self) {
        self.selected = self.books.len().saturating_sub(1);
    }

    fn ensure_in_bounds(&mut self) {
        if self.books.is_empty() {
            self.selected = 0;
        } else {
            self.selected = min(self.selected, self.books.len() - 1);
        }
    }
}

/// One book's details. Subscribed to its own item resource for as long as it
/// is open.
pub(crate) struct DetailScreen {
    pub(crate) id: i64,
    pub(crate) book: Option<Book>,
    pub(crate) subscription: SubscriptionId,
    pub(crate) feed: Receiver<Resource>,
}

impl DetailScreen {
    pub(crate) fn resource(&self) -> Resource {
        Resource::Item(self.id)
    }

    /// Drain pending signals, returning whether any arrived.
    pub(crate) fn take_changes(&self) -> bool {
        self.feed.try_iter().count() > 0
    }
}
