//! Lazy, forward-only cursors over the cache's read queries.

use crate::error::CacheError;
use crate::package::Package;
use rusqlite::{CachedStatement, Row, Rows};
use std::iter::FusedIterator;
use tracing::warn;

/// Which read query a [`Query`] executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    FindByName,
    ListAll,
}

/// A compiled read query with its parameters bound.
///
/// Every `Query` owns its own statement, so several can be open at once
/// without disturbing each other.
pub struct Query<'c> {
    stmt: CachedStatement<'c>,
    kind: QueryKind,
}

impl<'c> Query<'c> {
    pub(crate) fn find_by_name(
        stmt: CachedStatement<'c>,
        name: &str,
    ) -> Result<Query<'c>, CacheError> {
        let mut query = Query {
            stmt,
            kind: QueryKind::FindByName,
        };
        query.stmt.raw_bind_parameter(1, name)?;
        Ok(query)
    }

    pub(crate) fn list_all(stmt: CachedStatement<'c>) -> Query<'c> {
        Query {
            stmt,
            kind: QueryKind::ListAll,
        }
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Starts a fresh execution and pulls the first row before returning.
    ///
    /// Each call restarts the query from its first row.
    pub fn cursor(&mut self) -> Cursor<'_> {
        Cursor::prime(self.stmt.raw_query(), self.kind)
    }
}

impl<'q, 'c> IntoIterator for &'q mut Query<'c> {
    type Item = Package;
    type IntoIter = Cursor<'q>;

    fn into_iter(self) -> Cursor<'q> {
        self.cursor()
    }
}

/// Why a cursor stopped yielding packages.
#[derive(Debug)]
pub enum CursorEnd {
    Done,
    /// The storage engine reported an error while stepping or a row failed
    /// to decode. Rows after the failure are not visible.
    Failed(CacheError),
}

/// Single-pass sequence of packages decoded from an executing query.
///
/// A storage error mid-scan ends the sequence the same way as running out
/// of rows; [`Cursor::end`] tells the two apart afterwards.
pub struct Cursor<'q> {
    rows: Rows<'q>,
    kind: QueryKind,
    pending: Option<Package>,
    end: Option<CursorEnd>,
}

impl<'q> Cursor<'q> {
    fn prime(rows: Rows<'q>, kind: QueryKind) -> Cursor<'q> {
        let mut cursor = Cursor {
            rows,
            kind,
            pending: None,
            end: None,
        };
        cursor.pending = cursor.advance();
        cursor
    }

    /// `None` while more rows may follow.
    pub fn end(&self) -> Option<&CursorEnd> {
        self.end.as_ref()
    }

    fn advance(&mut self) -> Option<Package> {
        if self.end.is_some() {
            return None;
        }
        let failure = match self.rows.next() {
            Ok(Some(row)) => match decode_package(row) {
                Ok(pkg) => return Some(pkg),
                Err(err) => err,
            },
            Ok(None) => {
                self.end = Some(CursorEnd::Done);
                return None;
            }
            Err(err) => err,
        };
        warn!(
            "{:?} cursor ended early on storage error: {}",
            self.kind, failure
        );
        self.end = Some(CursorEnd::Failed(CacheError::Storage(failure)));
        None
    }
}

impl Iterator for Cursor<'_> {
    type Item = Package;

    fn next(&mut self) -> Option<Package> {
        let current = self.pending.take()?;
        self.pending = self.advance();
        Some(current)
    }
}

impl FusedIterator for Cursor<'_> {}

fn decode_package(row: &Row<'_>) -> rusqlite::Result<Package> {
    Ok(Package {
        id: row.get(0)?,
        name: row.get(1)?,
        version: row.get(2)?,
        release: row.get(3)?,
        homepage: row.get(4)?,
        summary: row.get(5)?,
        description: row.get(6)?,
        installed: row.get::<_, i64>(7)? != 0,
    })
}
