//! Core log message representation: the name registry (C1), the NVTable
//! arena (C2), the log message model (C3), and the binary wire format
//! (C4/C5).
//!
//! Downstream (`logagent`) never touches arena bytes directly — it talks to
//! `LogMessage` and `NameRegistry`, and crosses thread boundaries through
//! `serialize`/`deserialize` rather than by sharing a live message, since
//! `NvTable`'s non-atomic refcounting makes `LogMessage` intentionally
//! `!Send`.

pub mod errors;
pub mod message;
pub mod nvtable;
pub mod registry;
pub mod serialize;
pub mod tags;

pub use errors::{Kind, MessageError, NvError, SerializeError};
pub use message::{LogMessage, LogStamp, SourceAddr, TimestampKind};
pub use nvtable::NvTable;
pub use registry::{Handle, HandleFlags, NameRegistry};
pub use tags::{TagRegistry, TagSet};
