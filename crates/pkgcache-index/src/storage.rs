//! Exclusive owner of the SQLite connection backing the cache.

use crate::error::CacheError;
use rusqlite::{CachedStatement, Connection};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An open (or closed) handle to the cache database.
///
/// Compiled statements live in the connection's statement cache, so closing
/// the connection finalizes them together with it. Dropping a `Storage`
/// without calling [`Storage::close`] still releases everything.
#[derive(Debug)]
pub struct Storage {
    path: PathBuf,
    conn: Option<Connection>,
}

impl Storage {
    pub fn open(path: &Path) -> Result<Storage, CacheError> {
        let conn = Connection::open(path)?;
        debug!("opened cache database at {}", path.display());
        Ok(Storage {
            path: path.to_path_buf(),
            conn: Some(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Releases the connection. Calling this on a closed handle is a no-op.
    pub fn close(&mut self) -> Result<(), CacheError> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        conn.flush_prepared_statement_cache();
        if let Err((_conn, err)) = conn.close() {
            warn!("failed to close cache database cleanly: {}", err);
            return Err(CacheError::Storage(err));
        }
        debug!("closed cache database at {}", self.path.display());
        Ok(())
    }

    pub fn connection(&self) -> Result<&Connection, CacheError> {
        self.conn.as_ref().ok_or(CacheError::Closed)
    }

    pub fn connection_mut(&mut self) -> Result<&mut Connection, CacheError> {
        self.conn.as_mut().ok_or(CacheError::Closed)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<(), CacheError> {
        self.connection()?.execute_batch(sql)?;
        Ok(())
    }

    pub fn prepare(&self, sql: &str) -> Result<CachedStatement<'_>, CacheError> {
        Ok(self.connection()?.prepare_cached(sql)?)
    }

    pub fn set_statement_cache_capacity(&self, capacity: usize) -> Result<(), CacheError> {
        self.connection()?
            .set_prepared_statement_cache_capacity(capacity);
        Ok(())
    }
}
