//! Runtime configuration, resolved once at start-up from the environment with
//! defaults under the user's home directory.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use directories::BaseDirs;

use crate::db::DEFAULT_PAGE_SIZE;

/// Folder name used beneath the user's home directory for application data.
const DATA_DIR_NAME: &str = ".book-inventory";
/// SQLite file name stored inside the application data directory.
const DB_FILE_NAME: &str = "books.sqlite";
/// Log file written next to the database.
const LOG_FILE_NAME: &str = "book-inventory.log";

pub const ENV_DB_PATH: &str = "BOOK_INVENTORY_DB";
pub const ENV_LOG_PATH: &str = "BOOK_INVENTORY_LOG";
pub const ENV_PAGE_SIZE: &str = "BOOK_INVENTORY_PAGE_SIZE";
pub const ENV_LOG_FILTER: &str = "RUST_LOG";

const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_path: PathBuf,
    pub log_filter: String,
    pub page_size: usize,
}

impl Config {
    /// Defaults rooted at `data_dir`.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            db_path: data_dir.join(DB_FILE_NAME),
            log_path: data_dir.join(LOG_FILE_NAME),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Read the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve settings through `lookup`, falling back to the home directory
    /// defaults for anything not set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_override = lookup(ENV_DB_PATH).filter(|v| !v.trim().is_empty());
        let log_override = lookup(ENV_LOG_PATH).filter(|v| !v.trim().is_empty());

        let mut config = match (&db_override, &log_override) {
            (Some(_), Some(_)) => Self::in_dir(PathBuf::new()),
            _ => Self::in_dir(default_data_dir()?),
        };

        if let Some(path) = db_override {
            config.db_path = PathBuf::from(path);
        }
        if let Some(path) = log_override {
            config.log_path = PathBuf::from(path);
        }
        if let Some(filter) = lookup(ENV_LOG_FILTER).filter(|v| !v.trim().is_empty()) {
            config.log_filter = filter;
        }
        if let Some(raw) = lookup(ENV_PAGE_SIZE) {
            config.page_size = match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => bail!("invalid configuration: {ENV_PAGE_SIZE} must be a positive integer, got {raw:?}"),
            };
        }

        Ok(config)
    }
}

/// `~/.book-inventory`.
fn default_data_dir() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("could not locate home directory"))?;
    Ok(base_dirs.home_dir().join(DATA_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_overrides_win() {
        let config = Config::from_lookup(lookup(&[
            (ENV_DB_PATH, "/tmp/inv/books.db"),
            (ENV_LOG_PATH, "/tmp/inv/log.txt"),
            (ENV_LOG_FILTER, "book_inventory=debug"),
            (ENV_PAGE_SIZE, "16"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/inv/books.db"));
        assert_eq!(config.log_path, PathBuf::from("/tmp/inv/log.txt"));
        assert_eq!(config.log_filter, "book_inventory=debug");
        assert_eq!(config.page_size, 16);
    }

    #[test]
    fn test_bad_page_size_is_rejected() {
        let result = Config::from_lookup(lookup(&[
            (ENV_DB_PATH, "a.db"),
            (ENV_LOG_PATH, "a.log"),
            (ENV_PAGE_SIZE, "0"),
        ]));
        let message = result.unwrap_err().to_string();
        assert!(message.starts_with("invalid configuration"));
        assert!(message.contains(ENV_PAGE_SIZE));

        let result = Config::from_lookup(lookup(&[
            (ENV_DB_PATH, "a.db"),
            (ENV_LOG_PATH, "a.log"),
            (ENV_PAGE_SIZE, "lots"),
        ]));
        assert!(result
            .unwrap_err()
            .downcast_ref::<crate::error::Error>()
            .is_none());
    }

    #[test]
    fn test_in_dir_defaults() {
        let config = Config::in_dir("/data");
        assert_eq!(config.db_path, PathBuf::from("/data/books.sqlite"));
        assert_eq!(config.log_path, PathBuf::from("/data/book-inventory.log"));
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }
}
