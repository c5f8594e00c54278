//! SQLite-backed cache of package metadata.
//!
//! [`PackageCache`] mirrors a slow upstream package enumerator into a local
//! database and answers two read queries from it: list everything, and find
//! packages by name.

pub mod cache;
pub mod cursor;
pub mod error;
pub mod package;
pub mod refresh;
pub mod schema;
pub mod source;
pub mod statements;
pub mod storage;

pub use cache::{CacheOptions, PackageCache};
pub use cursor::{Cursor, CursorEnd, Query, QueryKind};
pub use error::CacheError;
pub use package::Package;
pub use refresh::RefreshSummary;
pub use source::{JsonSource, PackageSource, SourceError};
pub use statements::MatchRule;
