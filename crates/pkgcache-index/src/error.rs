use crate::source::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("cache is closed")]
    Closed,
    #[error("package source failed: {0}")]
    Source(#[from] SourceError),
}
