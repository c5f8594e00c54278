use crate::error::CacheError;
use crate::storage::Storage;
use tracing::debug;

/// The on-disk layout is not versioned: every cache construction drops the
/// table and creates it empty.
pub const SCHEMA: &str = r#"
DROP TABLE IF EXISTS packages;

CREATE TABLE packages (
    id TEXT PRIMARY KEY NOT NULL CHECK (id <> ''),
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    release INTEGER NOT NULL,
    homepage TEXT NOT NULL,
    summary TEXT NOT NULL,
    description TEXT NOT NULL,
    installed INTEGER NOT NULL CHECK (installed IN (0, 1))
);
"#;

pub fn rebuild(storage: &Storage) -> Result<(), CacheError> {
    storage.execute_batch(SCHEMA)?;
    debug!("rebuilt cache schema in {}", storage.path().display());
    Ok(())
}
