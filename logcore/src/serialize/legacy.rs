//! Legacy NVTable upgrade path.
//!
//! NVTable blobs written by older pipeline versions used 16-bit word counts
//! for offsets and lengths (`value << 2` to get the actual byte count) and
//! entries carried no `unset` bit. `upgrade_v22` reads that layout and
//! upgrades it by replaying each legacy entry through the live `NvTable`
//! API rather than hand-assembling a v26 byte buffer a second time — the
//! live API already enforces the 256 MiB arena ceiling, so a legacy blob
//! that would overflow it is rejected by `NvError::Exhausted` for free
//! instead of needing a second overflow check here. It's never reached from
//! live message deserialization (`message_wire`); no consumer in this
//! workspace currently persists NVTable blobs old enough to need it (the
//! agent's own persistent state store holds only `TailState` bookmarks,
//! which version and migrate themselves independently — see
//! `logagent::source::state`), so today it's exercised only by its own unit
//! tests below.

use std::collections::HashMap;

use crate::errors::SerializeError;
use crate::nvtable::NvTable;
use crate::registry::NameRegistry;

use super::reader::Reader;

const LEGACY_VERSION: u8 = 22;
const FLAG_INDIRECT: u8 = 0x01;

struct LegacyEntry {
    legacy_handle: u32,
    offset_words: u32,
    name: String,
    kind: LegacyKind,
}

enum LegacyKind {
    Direct(Vec<u8>),
    Indirect { ref_legacy_handle: u32, ref_offset: u32, ref_len: u32, type_tag: u8 },
}

/// Upgrades a v22 NVTable blob into a live v26 `NvTable`. Dynamic names are
/// re-registered against `registry` as they're encountered; legacy handle
/// numbers never survive the upgrade; only names do.
pub fn upgrade_v22(registry: &NameRegistry, r: &mut Reader) -> Result<NvTable, SerializeError> {
    let version = r.read_u8()?;
    if version != LEGACY_VERSION {
        return Err(SerializeError::UnsupportedVersion(version));
    }

    let size_words = r.read_u16_be()?;
    let used_words = r.read_u16_be()?;
    let index_size = r.read_u16_be()?;
    let num_static = r.read_u8()?;
    let _ = size_words;

    let mut static_offsets = Vec::with_capacity(num_static as usize);
    for _ in 0..num_static {
        static_offsets.push(r.read_u16_be()? as u32);
    }
    let mut index_offsets = Vec::with_capacity(index_size as usize);
    for _ in 0..index_size {
        let handle = r.read_u16_be()? as u32;
        let offset = r.read_u16_be()? as u32;
        index_offsets.push((handle, offset));
    }

    let payload_len = (used_words as usize) << 2;
    let payload = r.take(payload_len)?;

    let mut entries = Vec::new();
    for (i, &offset_words) in static_offsets.iter().enumerate() {
        if offset_words == 0 {
            continue;
        }
        entries.push(read_legacy_entry(payload, used_words as u32, offset_words, (i + 1) as u32)?);
    }
    for &(handle, offset_words) in &index_offsets {
        entries.push(read_legacy_entry(payload, used_words as u32, offset_words, handle)?);
    }
    // Lower offsets were allocated first in the original arena; replaying
    // in that order lets indirect entries resolve references that must
    // already be live by the time they were created.
    entries.sort_by_key(|e| e.offset_words);

    let mut table = NvTable::new(registry.num_static());
    let mut handle_map: HashMap<u32, crate::registry::Handle> = HashMap::new();

    for entry in entries {
        let new_handle = registry.allocate_handle(&entry.name);
        handle_map.insert(entry.legacy_handle, new_handle);
        match entry.kind {
            LegacyKind::Direct(value) => {
                table.set(new_handle, &entry.name, &value)?;
            }
            LegacyKind::Indirect { ref_legacy_handle, ref_offset, ref_len, type_tag } => {
                let Some(&ref_handle) = handle_map.get(&ref_legacy_handle) else {
                    return Err(SerializeError::Format(format!(
                        "legacy indirect entry references handle {ref_legacy_handle} before it was created"
                    )));
                };
                table.set_indirect(new_handle, &entry.name, ref_handle, ref_offset, ref_len, type_tag)?;
            }
        }
    }

    Ok(table)
}

fn read_legacy_entry(
    payload: &[u8],
    used_words: u32,
    offset_words: u32,
    legacy_handle: u32,
) -> Result<LegacyEntry, SerializeError> {
    let pos = ((used_words as i64 - offset_words as i64) << 2) as usize;
    if pos + 2 > payload.len() {
        return Err(SerializeError::Format("legacy entry offset out of bounds".into()));
    }
    let flags = payload[pos];
    let name_len = payload[pos + 1] as usize;
    let mut cursor = pos + 2;
    if cursor + name_len > payload.len() {
        return Err(SerializeError::Format("legacy entry name out of bounds".into()));
    }
    let name = String::from_utf8_lossy(&payload[cursor..cursor + name_len]).into_owned();
    cursor += name_len;

    let read_u16 = |at: usize| -> Result<u16, SerializeError> {
        payload
            .get(at..at + 2)
            .map(|b| u16::from_be_bytes([b[0], b[1]]))
            .ok_or_else(|| SerializeError::Format("legacy entry truncated".into()))
    };

    if flags & FLAG_INDIRECT != 0 {
        let ref_handle = read_u16(cursor)? as u32;
        let ref_offset = (read_u16(cursor + 2)? as u32) << 2;
        let ref_len = (read_u16(cursor + 4)? as u32) << 2;
        let type_tag = *payload
            .get(cursor + 6)
            .ok_or_else(|| SerializeError::Format("legacy entry truncated".into()))?;
        Ok(LegacyEntry {
            legacy_handle,
            offset_words,
            name,
            kind: LegacyKind::Indirect { ref_legacy_handle: ref_handle, ref_offset, ref_len, type_tag },
        })
    } else {
        let value_len = read_u16(cursor)? as usize;
        cursor += 2;
        if cursor + value_len > payload.len() {
            return Err(SerializeError::Format("legacy entry value out of bounds".into()));
        }
        let value = payload[cursor..cursor + value_len].to_vec();
        Ok(LegacyEntry { legacy_handle, offset_words, name, kind: LegacyKind::Direct(value) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::writer::Writer;

    fn write_legacy_entry(w: &mut Writer, flags: u8, name: &str, body: impl FnOnce(&mut Writer)) {
        w.emit_u8(flags);
        w.emit_u8(name.len() as u8);
        w.emit_bytes(name.as_bytes());
        body(w);
    }

    #[test]
    fn upgrades_a_simple_direct_entry() {
        let mut body = Writer::new();
        write_legacy_entry(&mut body, 0, "dyn1", |w| {
            w.emit_u16_be(5);
            w.emit_bytes(b"hello");
        });
        let payload_bytes = body.into_bytes();
        // Pad payload to a 4-byte boundary the way the word-count header expects.
        let mut payload = payload_bytes.clone();
        while payload.len() % 4 != 0 {
            payload.push(0);
        }
        let used_words = (payload.len() / 4) as u16;
        let offset_words = used_words; // single entry starts at the arena top

        let mut w = Writer::new();
        w.emit_u8(LEGACY_VERSION);
        w.emit_u16_be(used_words * 2); // size_words, generously larger than used
        w.emit_u16_be(used_words);
        w.emit_u16_be(1); // index_size
        w.emit_u8(0); // num_static
        w.emit_u16_be(1); // handle
        w.emit_u16_be(offset_words as u16);
        w.emit_bytes(&payload);

        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let registry = NameRegistry::new();
        let table = upgrade_v22(&registry, &mut r).unwrap();
        let h = registry.get_handle("dyn1").unwrap();
        assert_eq!(table.get(h).unwrap(), b"hello");
    }

    #[test]
    fn rejects_wrong_legacy_version() {
        let mut w = Writer::new();
        w.emit_u8(21);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let registry = NameRegistry::new();
        assert!(matches!(
            upgrade_v22(&registry, &mut r),
            Err(SerializeError::UnsupportedVersion(21))
        ));
    }
}
