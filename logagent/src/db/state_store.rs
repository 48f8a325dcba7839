//! Persistent state store (C7).
//!
//! The distilled contract is `alloc_entry`/`lookup_entry`/`map_entry`/
//! `unmap_entry` over named, versioned, byte-order-tagged blobs. Backed here
//! by a single SQLite table (`state_entries`), "map"/"unmap" collapse to
//! ordinary `Vec<u8>` returns: there's exactly one writer (this process) and
//! no shared-memory segment to pin, so the map/unmap pairing the distilled
//! spec inherits from a shared-memory original has nothing left to do here.

use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::StateStoreError;

/// A stored entry's version and byte-order tag, read back alongside its
/// payload so callers can decide whether a migration is needed.
pub struct Entry {
    pub version: u8,
    pub big_endian: bool,
    pub payload: Vec<u8>,
}

pub struct StateStore {
    conn: Connection,
}

impl StateStore {
    pub fn new(conn: Connection) -> Self {
        StateStore { conn }
    }

    /// Stores (or overwrites) the entry named `name` with the given
    /// version tag and payload. Byte order is always recorded as this
    /// host's native order; entries are read back by the same process that
    /// wrote them, so no cross-host byte-swap path is exercised here.
    pub fn put(&self, name: &str, version: u8, payload: &[u8]) -> Result<(), StateStoreError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let big_endian = cfg!(target_endian = "big") as i64;
        self.conn.execute(
            "INSERT INTO state_entries (name, version, big_endian, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                version = excluded.version,
                big_endian = excluded.big_endian,
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            params![name, version as i64, big_endian, payload, now],
        )?;
        Ok(())
    }

    /// Looks up `name`, returning its version, byte-order tag, and payload
    /// if present.
    pub fn get(&self, name: &str) -> Result<Option<Entry>, StateStoreError> {
        let entry = self
            .conn
            .query_row(
                "SELECT version, big_endian, payload FROM state_entries WHERE name = ?1",
                params![name],
                |row| {
                    let version: i64 = row.get(0)?;
                    let big_endian: i64 = row.get(1)?;
                    let payload: Vec<u8> = row.get(2)?;
                    Ok(Entry { version: version as u8, big_endian: big_endian != 0, payload })
                },
            )
            .optional()?;
        Ok(entry)
    }

    /// Deletes the entry named `name`, if present. Idempotent.
    pub fn remove(&self, name: &str) -> Result<(), StateStoreError> {
        self.conn.execute("DELETE FROM state_entries WHERE name = ?1", params![name])?;
        Ok(())
    }
}
