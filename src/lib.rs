//! Book inventory data-access layer with a terminal front-end.
//!
//! Reads and writes go through [`BookProvider`], which resolves a resource
//! identifier with the [`Router`], checks payloads with the validator, runs the
//! [`Storage`] primitive, and signals [`Observers`] after every committed
//! change.
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod observer;
pub mod provider;
pub mod router;
pub mod ui;
pub mod validate;

pub use config::Config;
pub use db::{Cursor, Direction, Row, Selection, SortKey, Storage, Value, Values};
pub use error::{Error, Result, WriteOp};
pub use models::{Book, Column, Genre};
pub use observer::{Observer, Observers, SubscriptionId};
pub use provider::BookProvider;
pub use router::{Resource, RouteKind, Router};
pub use validate::{validate, Mode, Reason, ValidationError};

/// The interactive application entry point and state container.
pub use ui::{run_app, App};
