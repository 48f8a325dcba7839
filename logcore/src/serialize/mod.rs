//! Binary serialization for `LogMessage` (C4) and handle fixup (C5).
//!
//! Hand-rolled rather than derive-based: the wire format mixes a strictly
//! big-endian envelope with a host-order-tagged inner NVTable block, which
//! no serde-binary backend models directly. The `Writer`/`Reader` pair
//! here follows the same cursor style as `raya-bytecode`'s bytecode
//! reader/writer, generalized to the handful of primitive widths this
//! format actually uses.

mod endian;
mod fixup;
mod legacy;
mod message_wire;
mod nvtable_wire;
mod reader;
mod sockaddr;
mod timestamp;
mod writer;

pub use fixup::fixup;
pub use legacy::upgrade_v22;
pub use message_wire::VERSION;
pub use reader::Reader;
pub use writer::Writer;

use crate::errors::SerializeError;
use crate::message::LogMessage;
use crate::registry::NameRegistry;

/// Freezes a message to its wire representation (format version 26).
pub fn serialize(msg: &LogMessage) -> Vec<u8> {
    let mut w = Writer::new();
    message_wire::write(&mut w, msg);
    w.into_bytes()
}

/// Thaws a message from its wire representation without remapping
/// handles. Only useful when `registry` is known to be the same registry
/// the producer used (tests, single-process round trips); live cross-
/// process consumers should use [`deserialize_and_fixup`] instead.
pub fn deserialize(bytes: &[u8]) -> Result<LogMessage, SerializeError> {
    let mut r = Reader::new(bytes);
    message_wire::read(&mut r)
}

/// Thaws a message and immediately remaps its handles against `registry`
/// (C5). This is the entry point live sources and sinks should use: it
/// makes the result's NVTable payload readable through `registry` exactly
/// as if it had been built against that registry from the start.
pub fn deserialize_and_fixup(registry: &NameRegistry, bytes: &[u8]) -> Result<LogMessage, SerializeError> {
    let mut msg = deserialize(bytes)?;
    fixup::fixup(registry, &mut msg)?;
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_roundtrip_with_fixup() {
        let producer = NameRegistry::new();
        let consumer = NameRegistry::new();
        consumer.allocate_handle("unrelated-name-to-force-divergence");

        let mut msg = LogMessage::new(&producer);
        msg.set_priority(14).unwrap();
        msg.set_field(&producer, "HOST", b"box1").unwrap();
        msg.set_field(&producer, "MESSAGE", b"something happened").unwrap();
        let sdata_handle = producer.allocate_handle(".SDATA.ex\"id\"");
        msg.set_field(&producer, ".SDATA.ex\"id\"", b"42").unwrap();
        msg.add_sdata_handle(&producer, sdata_handle).unwrap();

        let bytes = serialize(&msg);
        let decoded = deserialize_and_fixup(&consumer, &bytes).unwrap();

        assert_eq!(decoded.priority(), 14);
        assert_eq!(decoded.get_field(&consumer, "HOST").unwrap(), b"box1");
        assert_eq!(decoded.get_field(&consumer, "MESSAGE").unwrap(), b"something happened");
        assert_eq!(decoded.get_field(&consumer, ".SDATA.ex\"id\"").unwrap(), b"42");
        let consumer_sdata_handle = consumer.get_handle(".SDATA.ex\"id\"").unwrap();
        assert!(decoded.sdata_handles().contains(&consumer_sdata_handle));
    }
}
