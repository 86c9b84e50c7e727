//! Relational persistence for PulseCRM.
//!
//! A single SQLite connection sits behind an `Arc<Mutex<_>>` so that the
//! store can be cloned freely into handlers and background jobs. Each
//! aggregate (leads, conversations, cases, commerce, ...) contributes its
//! own `impl CrmStore` block in a dedicated module.

pub mod alerts;
pub mod analysis;
pub mod cases;
mod codec;
pub mod commerce;
pub mod content;
pub mod conversations;
pub mod customers;
pub mod leads;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// Error type for persistence operations.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("duplicate {0}")]
    Duplicate(String),
    #[error("database lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, MemoryError>;

/// Handle to the CRM database.
#[derive(Clone)]
pub struct CrmStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for CrmStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmStore").finish_non_exhaustive()
    }
}

impl CrmStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        debug!(path = %path.display(), "Opened CRM database");
        Self::from_connection(conn)
    }

    /// A private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| MemoryError::LockPoisoned)
    }

    /// Re-apply the idempotent schema.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn()?;
        schema::migrate(&conn)
    }
}

pub(crate) trait OptionalRow<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalRow<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// True when `err` is a UNIQUE/constraint violation.
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
