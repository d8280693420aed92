//! Ricettario Storage Layer
//!
//! Implements the `RecipeCache`, `RunLedger` and `JobJournal` traits on a
//! single SQLite database.
//!
//! # Architecture
//!
//! - `recipe_cache`: write-once extraction records keyed by the SHA-256 of the
//!   normalized caption
//! - `runs`: append-only run history, ordered by insertion
//! - `batch_jobs`: provider job ids keyed by manifest fingerprint, so an
//!   interrupted batch run can resume polling
//!
//! The connection sits behind a mutex; one store can be shared by every task
//! of a run.
//!
//! # Examples
//!
//! ```
//! use ricettario_domain::{ExtractionRecord, RecipeCache};
//! use ricettario_store::{normalize_caption, SqliteStore};
//!
//! let store = SqliteStore::new(":memory:").unwrap();
//! let key = normalize_caption("Pasta al Pomodoro");
//! assert!(store.put(&key, &ExtractionRecord::titled("Pasta al pomodoro")).unwrap());
//! assert!(store.get(&key).unwrap().is_some());
//! ```

#![warn(missing_docs)]

mod cache;
mod journal;
mod ledger;
pub mod normalize;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

pub use normalize::{cache_key, normalize_caption};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Run not found
    #[error("Run not found: {0}")]
    NotFound(String),

    /// Invalid data format
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Record could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A previous holder of the connection panicked
    #[error("Store connection lock poisoned")]
    LockPoisoned,
}

/// SQLite-backed cache, history ledger and job journal
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given database path
    ///
    /// Use `:memory:` for an in-memory database (useful for testing).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ricettario_store::SqliteStore;
    ///
    /// let store = SqliteStore::new("ricettario.db").unwrap();
    /// ```
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<(), StoreError> {
        let schema = include_str!("schema.sql");
        let conn = self.conn()?;
        conn.execute_batch(schema)?;

        // Databases created before run details were recorded lack the column
        let has_details: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM pragma_table_info('runs') WHERE name = 'details_json'",
            [],
            |row| row.get(0),
        )?;
        if !has_details {
            conn.execute_batch("ALTER TABLE runs ADD COLUMN details_json TEXT NOT NULL DEFAULT '{}'")?;
        }
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

pub(crate) fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
