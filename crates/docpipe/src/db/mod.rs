//! SQLite persistence for stored results, error records and the pipeline
//! configuration.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

pub mod error;
pub mod result_repo;
pub mod schema;

pub use error::ResultDbError;

/// The result database. Clones share one connection; SQLite serializes
/// writers, so the repository functions take turns on it.
#[derive(Clone)]
pub struct ResultDb {
    conn: Arc<Mutex<Connection>>,
}

impl ResultDb {
    /// Opens the database file, creating it and its directory when missing,
    /// and upgrades the schema.
    pub fn open(path: &Path) -> Result<Self, ResultDbError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| ResultDbError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let db = Self::upgraded(conn)?;
        log::info!("Result database ready at {}", path.display());
        Ok(db)
    }

    pub fn in_memory() -> Result<Self, ResultDbError> {
        Self::upgraded(Connection::open_in_memory()?)
    }

    fn upgraded(mut conn: Connection) -> Result<Self, ResultDbError> {
        schema::upgrade(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` with the connection held.
    pub fn call<F, T>(&self, f: F) -> Result<T, ResultDbError>
    where
        F: FnOnce(&Connection) -> Result<T, ResultDbError>,
    {
        let conn = self.conn.lock().map_err(|_| ResultDbError::Poisoned)?;
        f(&conn)
    }

    pub fn schema_version(&self) -> Result<u32, ResultDbError> {
        self.call(schema::current_version)
    }
}
