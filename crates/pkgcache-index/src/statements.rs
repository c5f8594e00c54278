use crate::error::CacheError;
use crate::storage::Storage;
use tracing::debug;

pub const UPSERT_PACKAGE: &str = "INSERT OR REPLACE INTO packages \
     (id, name, version, release, homepage, summary, description, installed) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)";

pub const FIND_BY_NAME_EXACT: &str = "SELECT id, name, version, release, homepage, summary, description, installed \
     FROM packages WHERE name = ?1";

/// Literal prefix comparison, so `%` and `_` in the requested name carry no
/// wildcard meaning.
pub const FIND_BY_NAME_PREFIX: &str = "SELECT id, name, version, release, homepage, summary, description, installed \
     FROM packages WHERE substr(name, 1, length(?1)) = ?1";

pub const LIST_PACKAGES: &str = "SELECT id, name, version, release, homepage, summary, description, installed \
     FROM packages";

/// Number of statements in a [`StatementSet`]; the statement cache never
/// holds fewer entries than this.
pub const STATEMENT_COUNT: usize = 3;

pub(crate) const CLEAR_PACKAGES: &str = "DELETE FROM packages";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchRule {
    #[default]
    Exact,
    Prefix,
}

/// The three fixed queries the cache runs, chosen once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementSet {
    pub upsert: &'static str,
    pub find_by_name: &'static str,
    pub list_all: &'static str,
}

impl StatementSet {
    pub fn for_rule(rule: MatchRule) -> StatementSet {
        let find_by_name = match rule {
            MatchRule::Exact => FIND_BY_NAME_EXACT,
            MatchRule::Prefix => FIND_BY_NAME_PREFIX,
        };
        StatementSet {
            upsert: UPSERT_PACKAGE,
            find_by_name,
            list_all: LIST_PACKAGES,
        }
    }

    /// Compiles every statement into the connection's statement cache.
    pub fn prepare(&self, storage: &Storage) -> Result<(), CacheError> {
        for sql in [self.upsert, self.find_by_name, self.list_all] {
            storage.prepare(sql)?;
        }
        debug!("prepared cache statements");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::schema::rebuild;
    use crate::statements::{
        MatchRule, StatementSet, FIND_BY_NAME_EXACT, FIND_BY_NAME_PREFIX, LIST_PACKAGES,
        UPSERT_PACKAGE,
    };
    use crate::storage::Storage;

    #[test]
    fn rule_selects_find_query() {
        assert_eq!(
            StatementSet::for_rule(MatchRule::Exact).find_by_name,
            FIND_BY_NAME_EXACT
        );
        assert_eq!(
            StatementSet::for_rule(MatchRule::Prefix).find_by_name,
            FIND_BY_NAME_PREFIX
        );
        assert_eq!(MatchRule::default(), MatchRule::Exact);
    }

    #[test]
    fn statements_have_expected_parameter_counts() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let storage = Storage::open(&dir.path().join("cache.db")).expect("open failed");
        rebuild(&storage).expect("rebuild failed");

        let counts = [
            (UPSERT_PACKAGE, 8),
            (FIND_BY_NAME_EXACT, 1),
            (FIND_BY_NAME_PREFIX, 1),
            (LIST_PACKAGES, 0),
        ];
        for (sql, expected) in counts {
            let stmt = storage.prepare(sql).expect("prepare failed");
            assert_eq!(stmt.parameter_count(), expected, "{sql}");
        }
    }

    #[test]
    fn prepare_requires_the_table() {
        let dir = tempfile::tempdir().expect("tempdir failed");
        let storage = Storage::open(&dir.path().join("cache.db")).expect("open failed");
        let result = StatementSet::for_rule(MatchRule::Exact).prepare(&storage);
        assert!(result.is_err());
    }
}
