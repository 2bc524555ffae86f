//! Binary entry point: load configuration, start file logging, open the
//! database, and drive the Ratatui event loop until the user exits.
use std::sync::Arc;

use anyhow::Context;
use book_inventory::{logging, run_app, App, BookProvider, Config, Router, Storage};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;
    logging::init(&config.log_path, &config.log_filter)?;
    info!(db = %config.db_path.display(), page_size = config.page_size, "starting");

    let storage = Storage::open(&config.db_path)
        .inspect_err(|err| error!(error = %err, "storage unavailable"))?
        .with_page_size(config.page_size);
    let provider = Arc::new(BookProvider::new(storage, Router::books()));

    let mut app = App::new(provider)?;
    run_app(&mut app)
}
