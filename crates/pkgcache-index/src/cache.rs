use crate::cursor::Query;
use crate::error::CacheError;
use crate::package::Package;
use crate::refresh::{self, RefreshSummary};
use crate::schema;
use crate::source::PackageSource;
use crate::statements::{MatchRule, StatementSet, STATEMENT_COUNT};
use crate::storage::Storage;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    pub path: PathBuf,
    pub match_rule: MatchRule,
    pub statement_cache_capacity: usize,
}

impl CacheOptions {
    pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 16;

    pub fn new(path: impl Into<PathBuf>) -> CacheOptions {
        CacheOptions {
            path: path.into(),
            match_rule: MatchRule::default(),
            statement_cache_capacity: Self::DEFAULT_STATEMENT_CACHE_CAPACITY,
        }
    }

    pub fn with_match_rule(mut self, match_rule: MatchRule) -> CacheOptions {
        self.match_rule = match_rule;
        self
    }

    pub fn with_statement_cache_capacity(mut self, capacity: usize) -> CacheOptions {
        self.statement_cache_capacity = capacity;
        self
    }
}

/// Local package metadata cache.
///
/// Opening a cache always starts from an empty table; contents only appear
/// after [`PackageCache::refresh`] or [`PackageCache::replace`]. Operations
/// that rewrite the table borrow the cache mutably, so they cannot overlap
/// with a live [`Query`].
pub struct PackageCache {
    storage: Storage,
    statements: StatementSet,
    match_rule: MatchRule,
    statement_cache_capacity: usize,
    last_refresh: Option<RefreshSummary>,
}

impl PackageCache {
    pub fn open(options: CacheOptions) -> Result<PackageCache, CacheError> {
        let storage = Storage::open(&options.path)?;
        let statement_cache_capacity = options.statement_cache_capacity.max(STATEMENT_COUNT);
        storage.set_statement_cache_capacity(statement_cache_capacity)?;
        schema::rebuild(&storage)?;
        let statements = StatementSet::for_rule(options.match_rule);
        statements.prepare(&storage)?;
        debug!(
            "opened package cache at {} ({:?} name matching)",
            options.path.display(),
            options.match_rule
        );
        Ok(PackageCache {
            storage,
            statements,
            match_rule: options.match_rule,
            statement_cache_capacity,
            last_refresh: None,
        })
    }

    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    pub fn match_rule(&self) -> MatchRule {
        self.match_rule
    }

    /// Effective statement cache size, never below the fixed statement count.
    pub fn statement_cache_capacity(&self) -> usize {
        self.statement_cache_capacity
    }

    pub fn is_closed(&self) -> bool {
        self.storage.is_closed()
    }

    pub fn last_refresh(&self) -> Option<&RefreshSummary> {
        self.last_refresh.as_ref()
    }

    /// Releases the statements and the connection. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<(), CacheError> {
        self.storage.close()
    }

    /// Replaces the cached table with exactly `packages`, atomically.
    pub fn replace<I>(&mut self, packages: I) -> Result<RefreshSummary, CacheError>
    where
        I: IntoIterator<Item = Package>,
    {
        let conn = self.storage.connection_mut()?;
        let summary = refresh::replace(conn, &self.statements, packages)?;
        self.last_refresh = Some(summary.clone());
        Ok(summary)
    }

    /// Pulls the full package set from `source` and replaces the cache with
    /// it. A failing source leaves the cache untouched.
    pub fn refresh<S>(&mut self, source: &mut S) -> Result<RefreshSummary, CacheError>
    where
        S: PackageSource + ?Sized,
    {
        if self.storage.is_closed() {
            return Err(CacheError::Closed);
        }
        let packages = source.packages()?;
        self.replace(packages)
    }

    pub fn by_name(&self, name: &str) -> Result<Query<'_>, CacheError> {
        let stmt = self.storage.prepare(self.statements.find_by_name)?;
        Query::find_by_name(stmt, name)
    }

    pub fn list(&self) -> Result<Query<'_>, CacheError> {
        let stmt = self.storage.prepare(self.statements.list_all)?;
        Ok(Query::list_all(stmt))
    }
}
