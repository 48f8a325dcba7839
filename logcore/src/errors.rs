//! Error types for the core log-message model.
//!
//! Mirrors `shared/src/errors/*.rs` in the teacher agent: one `thiserror`
//! enum per subsystem, each variant carrying the context a caller needs to
//! log or react to. `Kind` additionally models the eight error kinds from
//! the specification's error-handling table so callers can match on kind
//! rather than on enum variant identity (the table's propagation rules are
//! expressed in terms of kind, not in terms of which Rust type raised it).

use thiserror::Error;

/// The error kinds named in the specification's error-handling table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Format,
    Version,
    Overflow,
    Encoding,
    Io,
    Truncated,
    State,
    Exhausted,
}

/// Errors raised by the NVTable arena (C2).
#[derive(Debug, Error)]
pub enum NvError {
    #[error("nvtable cannot grow past the {0} byte ceiling")]
    Exhausted(u32),

    #[error("malformed nvtable entry: {0}")]
    Format(String),

    #[error("dynamic index entry claims handle {0}, which falls in the static range (num_static={1})")]
    BadStaticHandle(u32, u32),
}

impl NvError {
    pub fn kind(&self) -> Kind {
        match self {
            NvError::Exhausted(_) => Kind::Exhausted,
            NvError::Format(_) => Kind::Format,
            NvError::BadStaticHandle(..) => Kind::Format,
        }
    }
}

/// Errors raised building or mutating a `LogMessage` (C3).
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("num_sdata {0} exceeds alloc_sdata {1}")]
    SdataOverflow(u8, u8),

    #[error("priority {0} is not < 1024")]
    InvalidPriority(u16),

    #[error(transparent)]
    Nv(#[from] NvError),
}

/// Errors raised by the serializer/deserializer (C4) and handle fixup (C5).
#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("unsupported message version {0} (expected 26)")]
    UnsupportedVersion(u8),

    #[error("bad nvtable magic: expected `NVT2`, got {0:?}")]
    BadMagic([u8; 4]),

    #[error("truncated input: needed {needed} bytes, had {available}")]
    Truncated { needed: usize, available: usize },

    #[error("unknown socket address family {0}")]
    UnknownFamily(u16),

    #[error("malformed nvtable: {0}")]
    Format(String),

    #[error(transparent)]
    Nv(#[from] NvError),
}

impl SerializeError {
    pub fn kind(&self) -> Kind {
        match self {
            SerializeError::UnsupportedVersion(_) => Kind::Version,
            SerializeError::Nv(NvError::Exhausted(_)) => Kind::Exhausted,
            _ => Kind::Format,
        }
    }
}
