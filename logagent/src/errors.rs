//! Error types for the agent binary's own subsystems.
//!
//! One `thiserror` enum per subsystem, the same shape as `logcore::errors`:
//! `ConfigError` mirrors the teacher's own `ConfigError` (`Io { path,
//! source }`, `Parse`, `Validation`) almost field-for-field, and
//! `TailError`/`StateStoreError`/`MonitorError` extend that pattern to this
//! crate's own subsystems. `Kind` models the eight error kinds from the
//! specification's error-handling table so callers can match on kind rather
//! than on concrete enum variant.

use std::path::PathBuf;

use thiserror::Error;

pub use logcore::Kind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error while accessing `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Errors raised by the buffered tail source (C6).
#[derive(Debug, Error)]
pub enum TailError {
    #[error("I/O error reading `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decode leftover of {0} bytes exceeds the {1} byte bound")]
    LeftoverOverflow(usize, usize),

    #[error("decoded buffer would exceed the configured maximum of {0} bytes")]
    BufferOverflow(usize),

    #[error("end of file reached with {0} pending leftover bytes")]
    TruncatedAtEof(usize),

    #[error("persistent state mismatch for `{path}`: {reason}")]
    StateMismatch { path: PathBuf, reason: String },
}

impl TailError {
    pub fn kind(&self) -> Kind {
        match self {
            TailError::Io { .. } => Kind::Io,
            TailError::LeftoverOverflow(..) => Kind::Format,
            TailError::BufferOverflow(_) => Kind::Overflow,
            TailError::TruncatedAtEof(_) => Kind::Truncated,
            TailError::StateMismatch { .. } => Kind::State,
        }
    }
}

/// Errors raised by the SQLite-backed persistent state store (C7).
///
/// Version dispatch for the blobs this store holds (`TailState`) happens in
/// `TailState::decode_versioned`, not here; this store itself is oblivious
/// to the payload's internal versioning and just moves bytes in and out of
/// SQLite.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StateStoreError {
    pub fn kind(&self) -> Kind {
        match self {
            StateStoreError::Sqlite(_) => Kind::Io,
        }
    }
}

/// Errors raised by the directory monitor (C8).
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("I/O error watching `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("watcher backend error: {0}")]
    Backend(#[from] notify::Error),
}

impl MonitorError {
    pub fn kind(&self) -> Kind {
        match self {
            MonitorError::Io { .. } | MonitorError::Backend(_) => Kind::Io,
        }
    }
}
