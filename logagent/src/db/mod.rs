//! Persistent state store (C7): a SQLite-backed named-blob store used by
//! the tail source to survive restarts.

mod connection;
mod state_store;

pub use connection::init_state_db;
pub use state_store::{Entry, StateStore};
