//! Schema setup.
//!
//! The schema version is SQLite's `user_version` pragma. Entry `n` of
//! [`SCHEMA`] upgrades a database at version `n` to version `n + 1`; each
//! upgrade runs in its own transaction.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

const SCHEMA: &[&str] = &[
    // v1: opaque state values keyed by name.
    "CREATE TABLE kv_state (
        key        TEXT PRIMARY KEY,
        value      TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );",
];

/// Version a fully migrated database reports.
pub fn latest_version() -> u32 {
    u32::try_from(SCHEMA.len()).unwrap_or(u32::MAX)
}

/// Bring the schema up to [`latest_version`]. Synchronous; run it on the
/// blocking pool.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    let current = current_version(conn)?;
    if current >= latest_version() {
        debug!(version = current, "database schema is up to date");
        return Ok(());
    }

    for (version, sql) in (1..).zip(SCHEMA).skip(current as usize) {
        let fail = |e: rusqlite::Error| StoreError::Migration {
            version,
            message: e.to_string(),
        };
        let tx = conn.unchecked_transaction().map_err(fail)?;
        tx.execute_batch(sql).map_err(fail)?;
        tx.pragma_update(None, "user_version", version).map_err(fail)?;
        tx.commit().map_err(fail)?;
        info!(version, "database schema upgraded");
    }
    Ok(())
}

/// Schema version recorded in the database; 0 for a fresh file.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("failed to read schema version: {e}"),
        })
}
