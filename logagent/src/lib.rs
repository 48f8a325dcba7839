//! Tail-source agent: directory monitor (C8), buffered tail source (C6),
//! and a persistent state store (C7) around `logcore`'s message model and
//! wire format (C1-C5).

pub mod config;
pub mod db;
pub mod errors;
pub mod logger;
pub mod metrics;
pub mod monitor;
pub mod shutdown;
pub mod source;
