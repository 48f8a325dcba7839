//! Opening and initializing SQLite with runtime parameters.
//!
//! Adapted directly from the teacher's `db/connection.rs`: WAL journal
//! mode, a busy timeout, and first-run schema application via
//! `include_str!`. The teacher's per-run `synchronous` pragma config knob
//! isn't part of this workspace's config surface (the state store is a
//! single-writer durability layer, not a tunable event sink), so it's
//! fixed at `NORMAL` here instead of configurable.

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::config::StateStoreConfig;
use crate::errors::StateStoreError;

const SCHEMA: &str = include_str!("schema.sql");

fn open_db_connection(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(1_000))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    Ok(conn)
}

/// Opens (creating if absent) the state store database at `dir.join(cfg.path)`,
/// applying pragmas and running `schema.sql` on first run.
pub fn init_state_db(dir: &Path, cfg: &StateStoreConfig) -> Result<Connection, StateStoreError> {
    let path = if cfg.path.is_absolute() { cfg.path.clone() } else { dir.join(&cfg.path) };
    let first_run = !path.exists();

    let conn = open_db_connection(&path)?;
    conn.pragma_update(None, "wal_autocheckpoint", cfg.checkpoint_seconds as i64)?;

    if first_run {
        conn.execute_batch(SCHEMA)?;
    }
    Ok(conn)
}
