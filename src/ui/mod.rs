//! Ratatui front-end: an inventory list, a per-book detail view, and a modal
//! editor. Every read and write goes through [`BookProvider`](crate::BookProvider),
//! and the screens refresh from its change signals.

mod app;
mod forms;
mod helpers;
mod screens;
mod terminal;

pub use app::App;
pub use terminal::run_app;
