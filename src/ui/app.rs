use std::mem;
use std::sync::Arc;

use anyhow::Result;
use crossbeam::channel::Receiver;
use crossterm::event::KeyCode;
use open::that as open_link;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use tracing::{debug, warn};

use crate::db::{Selection, Values};
use crate::error::Error;
use crate::models::{format_price, Book, Column};
use crate::observer::SubscriptionId;
use crate::provider::BookProvider;
use crate::router::Resource;

use super::forms::{BookField, BookForm, ConfirmDelete};
use super::helpers::{centered_rect, key_hints, stock_style, surface_error};
use super::screens::{DetailScreen, ListScreen};

/// Footer space reserved for status messages and instructions.
const FOOTER_HEIGHT: u16 = 3;
/// Rows skipped by PageUp/PageDown.
const PAGE_STEP: isize = 5;

/// Shown whenever a sale or decrement would take stock below zero.
pub(crate) const NO_STOCK_MESSAGE: &str = "No stock left for this book.";
/// Shown when receiving one more unit would overflow the stock count.
pub(crate) const STOCK_FULL_MESSAGE: &str = "Stock count cannot go any higher.";

/// High-level navigation states. The list always exists underneath; the
/// detail screen sits on top of it while open.
enum Screen {
    List,
    Detail(DetailScreen),
}

/// Fine-grained modes scoped to the current screen.
enum Mode {
    Normal,
    Editing(EditorState),
    ConfirmDiscard(EditorState),
    ConfirmDelete(ConfirmDelete),
}

/// An open editor. `target` is `None` for a new book.
struct EditorState {
    target: Option<i64>,
    form: BookForm,
}

/// Holds the footer message text plus its severity.
struct StatusMessage {
    text: String,
    kind: StatusKind,
}

/// Severity levels shown in the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusKind {
    Info,
    Error,
}

impl StatusKind {
    fn style(&self) -> Style {
        match self {
            StatusKind::Info => Style::default().fg(Color::Green),
            StatusKind::Error => Style::default().fg(Color::Red),
        }
    }
}

/// Central application state. Every read and write goes through the
/// provider; the app never touches storage directly.
pub struct App {
    provider: Arc<BookProvider>,
    list: ListScreen,
    list_subscription: SubscriptionId,
    list_feed: Receiver<Resource>,
    screen: Screen,
    mode: Mode,
    status: Option<StatusMessage>,
}

impl App {
    pub fn new(provider: Arc<BookProvider>) -> Result<Self> {
        let (list_subscription, list_feed) =
            provider.subscribe_channel(Resource::Collection, true);
        let books = provider.list_books()?;
        Ok(Self {
            provider,
            list: ListScreen::new(books),
            list_subscription,
            list_feed,
            screen: Screen::List,
            mode: Mode::Normal,
            status: None,
        })
    }

    /// Re-query whatever the change feeds say is stale.
    pub fn pump_changes(&mut self) -> Result<()> {
        if self.list_feed.try_iter().count() > 0 {
            let books = self.provider.list_books()?;
            self.list.replace(books, None);
            debug!(rows = self.list.books.len(), "list refreshed");
        }

        let detail_changed = match &self.screen {
            Screen::Detail(detail) => detail.take_changes(),
            Screen::List => false,
        };
        if detail_changed {
            self.refresh_detail()?;
        }
        Ok(())
    }

    /// Handle one key press. Returns `true` when the app should exit.
    pub fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let mut exit = false;
        let mode = mem::replace(&mut self.mode, Mode::Normal);

        self.mode = match mode {
            Mode::Normal => self.handle_normal_key(code, &mut exit)?,
            Mode::Editing(editor) => self.handle_editor(code, editor)?,
            Mode::ConfirmDiscard(editor) => self.handle_confirm_discard(code, editor),
            Mode::ConfirmDelete(confirm) => self.handle_confirm_delete(code, confirm)?,
        };

        // Writes made above signal synchronously, so refresh before the next
        // frame is drawn.
        self.pump_changes()?;
        Ok(exit)
    }

    fn handle_normal_key(&mut self, code: KeyCode, exit: &mut bool) -> Result<Mode> {
        let detail_book = match &self.screen {
            Screen::List => None,
            Screen::Detail(detail) => Some(detail.book.clone()),
        };
        match detail_book {
            None => {
                match code {
                    KeyCode::Char('q') | KeyCode::Esc => *exit = true,
                    KeyCode::Up => self.list.move_selection(-1),
                    KeyCode::Down => self.list.move_selection(1),
                    KeyCode::PageUp => self.list.move_selection(-PAGE_STEP),
                    KeyCode::PageDown => self.list.move_selection(PAGE_STEP),
                    KeyCode::Home => self.list.select_first(),
                    KeyCode::End => self.list.select_last(),
                    KeyCode::Enter => match self.list.current_book().map(|book| book.id) {
                        Some(id) => {
                            self.clear_status();
                            self.open_detail(id)?;
                        }
                        None => self.set_status("No book selected.", StatusKind::Error),
                    },
                    KeyCode::Char('+') | KeyCode::Char('a') => {
                        self.clear_status();
                        return Ok(Mode::Editing(EditorState {
                            target: None,
                            form: BookForm::default(),
                        }));
                    }
                    KeyCode::Char('s') => match self.list.current_book().cloned() {
                        Some(book) => self.adjust_stock(&book, -1),
                        None => self.set_status("No book selected.", StatusKind::Error),
                    },
                    KeyCode::Char('D') => {
                        if self.list.books.is_empty() {
                            self.set_status("There are no books to delete.", StatusKind::Error);
                        } else {
                            self.clear_status();
                            return Ok(Mode::ConfirmDelete(ConfirmDelete::All));
                        }
                    }
                    _ => {}
                }
                Ok(Mode::Normal)
            }
            Some(book) => {
                match code {
                    KeyCode::Char('q') => *exit = true,
                    KeyCode::Esc => {
                        self.clear_status();
                        self.close_detail();
                    }
                    KeyCode::Char('+') => {
                        if let Some(book) = book {
                            self.adjust_stock(&book, 1);
                        }
                    }
                    KeyCode::Char('-') => {
                        if let Some(book) = book {
                            self.adjust_stock(&book, -1);
                        }
                    }
                    KeyCode::Char('e') => {
                        if let Some(book) = book {
                            self.clear_status();
                            return Ok(Mode::Editing(EditorState {
                                target: Some(book.id),
                                form: BookForm::from_book(&book),
                            }));
                        }
                    }
                    KeyCode::Char('d') => {
                        if let Some(book) = book {
                            self.clear_status();
                            return Ok(Mode::ConfirmDelete(ConfirmDelete::Book {
                                id: book.id,
                                name: book.name,
                            }));
                        }
                    }
                    KeyCode::Char('o') => {
                        if let Some(book) = book {
                            self.order_from_supplier(&book);
                        }
                    }
                    _ => {}
                }
                Ok(Mode::Normal)
            }
        }
    }

    fn handle_editor(&mut self, code: KeyCode, mut editor: EditorState) -> Result<Mode> {
        match code {
            KeyCode::Esc => {
                if editor.form.dirty {
                    return Ok(Mode::ConfirmDiscard(editor));
                }
                self.set_status("Edit cancelled.", StatusKind::Info);
                return Ok(Mode::Normal);
            }
            KeyCode::Tab | KeyCode::Down => editor.form.next_field(),
            KeyCode::BackTab | KeyCode::Up => editor.form.previous_field(),
            KeyCode::Left => {
                editor.form.cycle_genre(false);
            }
            KeyCode::Right => {
                editor.form.cycle_genre(true);
            }
            KeyCode::Backspace => editor.form.backspace(),
            KeyCode::Enter => {
                if self.save_editor(&mut editor)? {
                    return Ok(Mode::Normal);
                }
            }
            KeyCode::Char(ch) => {
                editor.form.push_char(ch);
            }
            _ => {}
        }
        Ok(Mode::Editing(editor))
    }

    fn handle_confirm_discard(&mut self, code: KeyCode, editor: EditorState) -> Mode {
        match code {
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.set_status("Changes discarded.", StatusKind::Info);
                Mode::Normal
            }
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => Mode::Editing(editor),
            _ => Mode::ConfirmDiscard(editor),
        }
    }

    fn handle_confirm_delete(&mut self, code: KeyCode, confirm: ConfirmDelete) -> Result<Mode> {
        match code {
            KeyCode::Esc | KeyCode::Char('n') | KeyCode::Char('N') => {
                self.set_status("Deletion cancelled.", StatusKind::Info);
                Ok(Mode::Normal)
            }
            KeyCode::Enter | KeyCode::Char('y') | KeyCode::Char('Y') => {
                self.perform_delete(&confirm)?;
                Ok(Mode::Normal)
            }
            _ => Ok(Mode::ConfirmDelete(confirm)),
        }
    }

    /// Persist the editor. Returns whether the editor should close.
    fn save_editor(&mut self, editor: &mut EditorState) -> Result<bool> {
        if editor.target.is_none() && editor.form.is_blank() {
            self.set_status("Nothing to save.", StatusKind::Info);
            return Ok(true);
        }

        let values = match editor.form.to_values() {
            Ok(values) => values,
            Err((field, message)) => {
                editor.form.active = field;
                editor.form.error = Some(message.clone());
                self.set_status(message, StatusKind::Error);
                return Ok(false);
            }
        };

        let outcome = match editor.target {
            None => self
                .provider
                .insert(&Resource::Collection.to_string(), &values)
                .map(|resource| match resource {
                    Resource::Item(id) => Some(id),
                    Resource::Collection => None,
                }),
            Some(id) => self
                .provider
                .update(&Resource::Item(id).to_string(), &values, &Selection::all())
                .map(|rows| (rows > 0).then_some(id)),
        };

        match outcome {
            Ok(Some(id)) => {
                let message = if editor.target.is_some() {
                    "Book updated."
                } else {
                    "Book saved."
                };
                self.set_status(message, StatusKind::Info);
                if let Screen::List = self.screen {
                    let books = self.provider.list_books()?;
                    self.list.replace(books, Some(id));
                }
                Ok(true)
            }
            Ok(None) => {
                self.set_status("Error with updating book.", StatusKind::Error);
                Ok(true)
            }
            Err(err) => self.report_write_error("saving book", err).map(|()| false),
        }
    }

    /// Read-then-write stock change. Refuses to go below zero without
    /// touching the provider.
    fn adjust_stock(&mut self, book: &Book, delta: i64) {
        let new_quantity = match book.quantity.checked_add(delta) {
            Some(quantity) if quantity < 0 => {
                self.set_status(NO_STOCK_MESSAGE, StatusKind::Error);
                return;
            }
            Some(quantity) => quantity,
            None => {
                self.set_status(STOCK_FULL_MESSAGE, StatusKind::Error);
                return;
            }
        };

        let values = Values::new().with(Column::Quantity, new_quantity);
        let uri = Resource::Item(book.id).to_string();
        match self.provider.update(&uri, &values, &Selection::all()) {
            Ok(0) => self.set_status("Book no longer exists.", StatusKind::Error),
            Ok(_) => self.set_status(
                format!("{} now has {new_quantity} in stock.", book.name),
                StatusKind::Info,
            ),
            Err(err) => {
                let message = surface_error(&err);
                self.set_status(format!("Error with updating stock: {message}"), StatusKind::Error);
            }
        }
    }

    fn perform_delete(&mut self, confirm: &ConfirmDelete) -> Result<()> {
        let (uri, selection) = match confirm {
            ConfirmDelete::Book { id, .. } => (Resource::Item(*id).to_string(), Selection::all()),
            ConfirmDelete::All => (Resource::Collection.to_string(), Selection::all()),
        };

        match self.provider.delete(&uri, &selection) {
            Ok(0) => self.set_status("Error with deleting book.", StatusKind::Error),
            Ok(rows) => {
                let message = match confirm {
                    ConfirmDelete::Book { name, .. } => format!("Deleted \"{name}\"."),
                    ConfirmDelete::All => format!("Deleted {rows} books."),
                };
                self.set_status(message, StatusKind::Info);
            }
            Err(err) => return self.report_write_error("deleting book", err),
        }

        if let ConfirmDelete::Book { .. } = confirm {
            self.close_detail();
        }
        Ok(())
    }

    /// Storage-level failures become a footer notice; interface misuse is a
    /// bug and propagates.
    fn report_write_error(&mut self, action: &str, err: Error) -> Result<()> {
        if err.is_programming_error() {
            return Err(err.into());
        }
        warn!(action, error = %err, "write rejected");
        let message = surface_error(&err);
        self.set_status(format!("Error with {action}: {message}"), StatusKind::Error);
        Ok(())
    }

    fn order_from_supplier(&mut self, book: &Book) {
        let phone: String = book
            .supplier_phone
            .chars()
            .filter(|ch| ch.is_ascii_digit() || *ch == '+')
            .collect();
        match open_link(format!("tel:{phone}")) {
            Ok(()) => self.set_status(
                format!("Calling {} at {}.", book.supplier_name, book.supplier_phone),
                StatusKind::Info,
            ),
            Err(err) => self.set_status(format!("Failed to start call: {err}"), StatusKind::Error),
        }
    }

    fn open_detail(&mut self, id: i64) -> Result<()> {
        self.close_detail();
        let (subscription, feed) = self
            .provider
            .subscribe_channel(Resource::Item(id), false);
        let book = self.provider.fetch_book(id)?;
        self.screen = Screen::Detail(DetailScreen {
            id,
            book,
            subscription,
            feed,
        });
        Ok(())
    }

    fn refresh_detail(&mut self) -> Result<()> {
        let Screen::Detail(detail) = &mut self.screen else {
            return Ok(());
        };
        detail.book = self.provider.fetch_book(detail.id)?;
        if detail.book.is_none() {
            self.close_detail();
            self.set_status("This book was removed.", StatusKind::Info);
        }
        Ok(())
    }

    fn close_detail(&mut self) {
        if let Screen::Detail(detail) = mem::replace(&mut self.screen, Screen::List) {
            self.provider.unsubscribe(detail.subscription);
        }
    }

    pub(crate) fn draw(&self, frame: &mut Frame) {
        let area = frame.area();
        let footer_height = FOOTER_HEIGHT.min(area.height);

        let (content_area, footer_area) = if area.height > footer_height {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(footer_height)])
                .split(area);
            (chunks[0], chunks[1])
        } else {
            (area, area)
        };

        match &self.screen {
            Screen::List => self.draw_list(frame, content_area),
            Screen::Detail(detail) => self.draw_detail(frame, content_area, detail),
        }

        if area.height >= footer_height {
            self.draw_footer(frame, footer_area);
        }

        match &self.mode {
            Mode::Editing(editor) => self.draw_editor(frame, area, editor),
            Mode::ConfirmDiscard(_) => self.draw_confirm(
                frame,
                area,
                "Unsaved Changes",
                "Discard your changes and quit editing?",
            ),
            Mode::ConfirmDelete(confirm) => {
                self.draw_confirm(frame, area, "Delete", &confirm.prompt())
            }
            Mode::Normal => {}
        }
    }

    fn draw_list(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .title(format!("Inventory ({} books)", self.list.books.len()))
            .borders(Borders::ALL);

        if self.list.books.is_empty() {
            let message = Paragraph::new("The inventory is empty. Press '+' to add a book.")
                .alignment(Alignment::Center)
                .block(block)
                .wrap(Wrap { trim: true });
            frame.render_widget(message, area);
            return;
        }

        let inner = block.inner(area);
        frame.render_widget(block, area);
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(0)])
            .split(inner);

        let name_width = (inner.width as usize).saturating_sub(32).max(10);
        let header = Paragraph::new(Line::from(Span::styled(
            format!(
                "  {:<name_width$} {:<18} {:>8} {:>4}",
                "Name", "Genre", "Price", "Qty"
            ),
            Style::default().add_modifier(Modifier::BOLD),
        )));
        frame.render_widget(header, chunks[0]);

        let items: Vec<ListItem> = self
            .list
            .books
            .iter()
            .map(|book| {
                let name: String = book.name.chars().take(name_width).collect();
                ListItem::new(Line::from(vec![
                    Span::raw(format!(
                        "{name:<name_width$} {:<18} {:>8} ",
                        book.genre.label(),
                        book.display_price()
                    )),
                    Span::styled(format!("{:>4}", book.quantity), stock_style(book.quantity)),
                ]))
            })
            .collect();

        let list = List::new(items)
            .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
            .highlight_symbol("> ");
        let mut state = ListState::default();
        state.select(Some(self.list.selected));
        frame.render_stateful_widget(list, chunks[1], &mut state);
    }

    fn draw_detail(&self, frame: &mut Frame, area: Rect, detail: &DetailScreen) {
        let block = Block::default()
            .title(format!("Book {}", detail.resource()))
            .borders(Borders::ALL);

        let Some(book) = &detail.book else {
            let message = Paragraph::new("This book no longer exists.")
                .alignment(Alignment::Center)
                .block(block);
            frame.render_widget(message, area);
            return;
        };

        let label = Style::default().fg(Color::Gray);
        let row = |name: &str, value: Span<'static>| {
            Line::from(vec![Span::styled(format!("{name:<16}"), label), value])
        };
        let lines = vec![
            Line::from(Span::styled(
                book.name.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            row("Genre", Span::raw(book.genre.label())),
            row("Price", Span::raw(format_price(book.price))),
            row(
                "In stock",
                Span::styled(book.quantity.to_string(), stock_style(book.quantity)),
            ),
            row("Supplier", Span::raw(book.supplier_name.clone())),
            row("Supplier phone", Span::raw(book.supplier_phone.clone())),
        ];

        let paragraph = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, area);
    }

    fn draw_footer(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().borders(Borders::TOP);
        frame.render_widget(block.clone(), area);
        let inner = block.inner(area);

        let status_line = if let Some(status) = &self.status {
            Line::from(vec![Span::styled(status.text.clone(), status.kind.style())])
        } else {
            Line::from("")
        };

        let instructions = self.footer_instructions();

        let paragraph = Paragraph::new(vec![status_line, instructions]).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);
    }

    fn footer_instructions(&self) -> Line<'static> {
        match (&self.screen, &self.mode) {
            (_, Mode::Editing(_)) => key_hints(&[
                ("Tab", "Next field"),
                ("←→", "Genre"),
                ("Enter", "Save"),
                ("Esc", "Cancel"),
            ]),
            (_, Mode::ConfirmDiscard(_)) | (_, Mode::ConfirmDelete(_)) => {
                key_hints(&[("y", "Yes"), ("n", "No")])
            }
            (Screen::Detail(_), _) => key_hints(&[
                ("+", "Receive one"),
                ("-", "Sell one"),
                ("e", "Edit"),
                ("d", "Delete"),
                ("o", "Order"),
                ("Esc", "Back"),
                ("q", "Quit"),
            ]),
            (Screen::List, _) => key_hints(&[
                ("↑↓", "Select"),
                ("Enter", "Details"),
                ("s", "Sale"),
                ("+", "Add"),
                ("D", "Delete all"),
                ("q", "Quit"),
            ]),
        }
    }

    fn draw_editor(&self, frame: &mut Frame, area: Rect, editor: &EditorState) {
        let popup_area = centered_rect(70, 60, area);
        frame.render_widget(Clear, popup_area);

        let title = if editor.target.is_some() {
            "Edit Book"
        } else {
            "Add a Book"
        };
        let block = Block::default().title(title).borders(Borders::ALL);
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);

        let form = &editor.form;
        let mut lines: Vec<Line> = [
            BookField::Name,
            BookField::Genre,
            BookField::Price,
            BookField::Quantity,
            BookField::SupplierName,
            BookField::SupplierPhone,
        ]
        .into_iter()
        .map(|field| form.build_line(field))
        .collect();
        lines.push(Line::from(""));

        if let Some(error) = &form.error {
            lines.push(Line::from(Span::styled(
                error.clone(),
                Style::default().fg(Color::Red),
            )));
        } else {
            lines.push(Line::from(Span::styled(
                "Enter to save • Tab to switch • Esc to cancel",
                Style::default().fg(Color::Gray),
            )));
        }

        let paragraph = Paragraph::new(lines).wrap(Wrap { trim: true });
        frame.render_widget(paragraph, inner);

        if form.active != BookField::Genre {
            let prefix = format!("{}: ", form.active.label()).chars().count() as u16;
            let value_len = form.value(form.active).chars().count() as u16;
            frame.set_cursor_position((
                inner.x + prefix + value_len,
                inner.y + BookForm::row_of(form.active),
            ));
        }
    }

    fn draw_confirm(&self, frame: &mut Frame, area: Rect, title: &str, prompt: &str) {
        let popup_area = centered_rect(60, 30, area);
        frame.render_widget(Clear, popup_area);

        let block = Block::default().title(title.to_string()).borders(Borders::ALL);
        let lines = vec![
            Line::from(prompt.to_string()),
            Line::from(""),
            Line::from(Span::styled(
                "Enter/y to confirm • Esc/n to cancel",
                Style::default().fg(Color::Gray),
            )),
        ];
        let paragraph = Paragraph::new(lines)
            .block(block)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, popup_area);
    }

    fn set_status<S: Into<String>>(&mut self, text: S, kind: StatusKind) {
        self.status = Some(StatusMessage {
            text: text.into(),
            kind,
        });
    }

    fn clear_status(&mut self) {
        self.status = None;
    }

    pub(crate) fn status_text(&self) -> Option<&str> {
        self.status.as_ref().map(|status| status.text.as_str())
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.close_detail();
        self.provider.unsubscribe(self.list_subscription);
    }
}
