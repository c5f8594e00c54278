use crate::error::CacheError;
use crate::package::Package;
use crate::statements::{StatementSet, CLEAR_PACKAGES};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Diagnostics from one committed refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshSummary {
    pub packages: usize,
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

/// Replaces the cached table with `packages` inside a single transaction.
///
/// Any failure drops the transaction uncommitted, leaving the previously
/// committed rows untouched.
pub fn replace<I>(
    conn: &mut Connection,
    statements: &StatementSet,
    packages: I,
) -> Result<RefreshSummary, CacheError>
where
    I: IntoIterator<Item = Package>,
{
    let started = Instant::now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(CLEAR_PACKAGES, [])?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare_cached(statements.upsert)?;
        for pkg in packages {
            stmt.execute(params![
                pkg.id,
                pkg.name,
                pkg.version,
                pkg.release,
                pkg.homepage,
                pkg.summary,
                pkg.description,
                pkg.installed,
            ])
            .inspect_err(|err| debug!("upsert of {} failed: {}", pkg.id, err))?;
            count += 1;
        }
    }
    tx.commit()?;

    let summary = RefreshSummary {
        packages: count,
        elapsed: started.elapsed(),
        completed_at: Utc::now(),
    };
    info!(
        "refreshed package cache with {} packages in {:.1?}",
        summary.packages, summary.elapsed
    );
    Ok(summary)
}
