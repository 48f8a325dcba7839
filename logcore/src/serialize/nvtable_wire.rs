//! The NVTable block codec: magic `NVT2`, a flags byte tagging byte order
//! and `unset` support, then the header/static-slots/index/payload layout
//! exactly as the arena stores them — this block is the one place the wire
//! format matches the in-memory representation almost verbatim, since
//! `NvTableInner`'s fields were chosen to line up with it.

use crate::errors::{NvError, SerializeError};
use crate::nvtable::entry;
use crate::nvtable::index::{self, NvIndexEntry};
use crate::nvtable::{NvTable, NvTableInner};

use super::endian;
use super::reader::Reader;
use super::writer::Writer;

const MAGIC: &[u8; 4] = b"NVT2";
const FLAG_BIG_ENDIAN: u8 = 0x01;
const FLAG_SUPPORTS_UNSET: u8 = 0x02;

pub fn write(w: &mut Writer, table: &NvTable) {
    let inner = table.borrow_inner();
    let mut flags = FLAG_SUPPORTS_UNSET;
    if cfg!(target_endian = "big") {
        flags |= FLAG_BIG_ENDIAN;
    }
    w.emit_bytes(MAGIC);
    w.emit_u8(flags);
    w.emit_u32_ne(inner.size);
    w.emit_u32_ne(inner.used);
    w.emit_u16_ne(inner.index.len() as u16);
    w.emit_u8(inner.num_static as u8);
    for &slot in &inner.static_slots {
        w.emit_u32_ne(slot);
    }
    for e in &inner.index {
        w.emit_u32_ne(e.handle);
        w.emit_u32_ne(e.offset);
    }
    w.emit_bytes(inner.payload());
}

pub fn read(r: &mut Reader) -> Result<NvTable, SerializeError> {
    let magic: [u8; 4] = r.take(4)?.try_into().unwrap();
    if &magic != MAGIC {
        return Err(SerializeError::BadMagic(magic));
    }
    let flags = r.read_u8()?;
    let producer_is_big_endian = flags & FLAG_BIG_ENDIAN != 0;
    let supports_unset = flags & FLAG_SUPPORTS_UNSET != 0;
    let swap = endian::needs_swap(producer_is_big_endian);

    let size = endian::maybe_swap_u32(r.read_u32_ne()?, swap);
    let used = endian::maybe_swap_u32(r.read_u32_ne()?, swap);
    let index_size = endian::maybe_swap_u16(r.read_u16_ne()?, swap);
    let num_static = r.read_u8()? as u32;

    let mut static_slots = Vec::with_capacity(num_static as usize);
    for _ in 0..num_static {
        static_slots.push(endian::maybe_swap_u32(r.read_u32_ne()?, swap));
    }

    let mut index = Vec::with_capacity(index_size as usize);
    for _ in 0..index_size {
        let handle = endian::maybe_swap_u32(r.read_u32_ne()?, swap);
        let offset = endian::maybe_swap_u32(r.read_u32_ne()?, swap);
        index.push(NvIndexEntry { handle, offset });
    }
    if !index::is_sorted_strict(&index) {
        return Err(SerializeError::Format("nvtable index is not strictly ascending".into()));
    }

    if (size as usize) < used as usize {
        return Err(SerializeError::Format("nvtable used exceeds size".into()));
    }
    let payload = r.take(used as usize)?;
    let mut arena = vec![0u8; size as usize];
    let arena_len = arena.len();
    arena[arena_len - used as usize..].copy_from_slice(payload);

    let mut inner = NvTableInner {
        size,
        used,
        num_static,
        static_slots,
        index,
        arena,
        borrowed: false,
    };

    if swap {
        swap_entry_headers_in_place(&mut inner)?;
    }
    if !supports_unset {
        zero_reserved_bits_in_place(&mut inner);
    }
    validate_all_entries(&inner)?;

    Ok(NvTable::from_inner(inner))
}

fn entry_offsets(inner: &NvTableInner) -> Vec<u32> {
    inner
        .static_slots
        .iter()
        .copied()
        .filter(|&o| o != 0)
        .chain(inner.index.iter().map(|e| e.offset))
        .collect()
}

fn swap_u32_field(arena: &mut [u8], at: usize) {
    let bytes: [u8; 4] = arena[at..at + 4].try_into().unwrap();
    let swapped = u32::from_ne_bytes(bytes).swap_bytes();
    arena[at..at + 4].copy_from_slice(&swapped.to_ne_bytes());
}

fn swap_entry_headers_in_place(inner: &mut NvTableInner) -> Result<(), SerializeError> {
    for offset in entry_offsets(inner) {
        let start = (inner.size - offset) as usize;
        if start + 2 > inner.arena.len() {
            return Err(SerializeError::Format("entry offset out of bounds during byte swap".into()));
        }
        let flags = inner.arena[start];
        let indirect = flags & entry::FLAG_INDIRECT != 0;
        swap_u32_field(&mut inner.arena, start + 2); // alloc_len
        if indirect {
            swap_u32_field(&mut inner.arena, start + 6); // ref_handle
            swap_u32_field(&mut inner.arena, start + 10); // ref_offset
            swap_u32_field(&mut inner.arena, start + 14); // ref_len
        } else {
            swap_u32_field(&mut inner.arena, start + 6); // value_len
        }
    }
    Ok(())
}

fn zero_reserved_bits_in_place(inner: &mut NvTableInner) {
    for offset in entry_offsets(inner) {
        let start = (inner.size - offset) as usize;
        entry::zero_reserved_bits(&mut inner.arena[start..]);
    }
}

fn validate_all_entries(inner: &NvTableInner) -> Result<(), SerializeError> {
    let check = |offset: u32| -> Result<(), NvError> {
        if offset == 0 {
            return Ok(());
        }
        let start = (inner.size - offset) as usize;
        entry::validate(&inner.arena[start..], start, inner.arena.len())?;
        Ok(())
    };
    for &slot in &inner.static_slots {
        check(slot)?;
    }
    for e in &inner.index {
        if e.handle <= inner.num_static {
            return Err(NvError::BadStaticHandle(e.handle, inner.num_static).into());
        }
        check(e.offset)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NameRegistry;

    #[test]
    fn roundtrip_empty_table() {
        let reg = NameRegistry::new();
        let table = NvTable::new(reg.num_static());
        let mut w = Writer::new();
        write(&mut w, &table);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let decoded = read(&mut r).unwrap();
        assert_eq!(decoded.size(), table.size());
        assert_eq!(decoded.used(), table.used());
    }

    #[test]
    fn roundtrip_with_entries() {
        let reg = NameRegistry::new();
        let mut table = NvTable::new(reg.num_static());
        let h = reg.allocate_handle("dyn1");
        table.set(h, "dyn1", b"value").unwrap();
        let mut w = Writer::new();
        write(&mut w, &table);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let decoded = read(&mut r).unwrap();
        assert_eq!(decoded.get(h).unwrap(), b"value");
    }

    #[test]
    fn rejects_index_entry_claiming_a_static_handle() {
        let reg = NameRegistry::new();
        let table = NvTable::new(reg.num_static());
        let mut w = Writer::new();
        write(&mut w, &table);
        let mut bytes = w.into_bytes();

        // Splice in one bogus index entry claiming handle 1, which belongs
        // in static_slots, not the dynamic index. used/index_size/payload
        // shapes are irrelevant since entry validation never runs.
        let num_static = reg.num_static();
        let mut pos = 5 + 4 + 4 + 2; // magic + flags + size + used + index_size
        let index_size_pos = 9;
        bytes[index_size_pos] = 1;
        bytes[index_size_pos + 1] = 0;
        pos += 1 + num_static as usize * 4; // num_static byte + static slots
        let mut spliced = bytes[..pos].to_vec();
        spliced.extend_from_slice(&1u32.to_ne_bytes()); // handle == 1 (static range)
        spliced.extend_from_slice(&0u32.to_ne_bytes()); // offset (unused, check short-circuits)
        spliced.extend_from_slice(&bytes[pos..]);

        let mut r = Reader::new(&spliced);
        assert!(matches!(
            read(&mut r),
            Err(SerializeError::Nv(NvError::BadStaticHandle(1, n))) if n == num_static
        ));
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![b'X', b'X', b'X', b'X', 0, 0, 0, 0, 0];
        let mut r = Reader::new(&bytes);
        assert!(matches!(read(&mut r), Err(SerializeError::BadMagic(_))));
    }

    #[test]
    fn cross_endian_roundtrip() {
        // Build a table with no static fields set, so the only entry to
        // account for is the single dynamic one below, and hand-construct
        // a wire buffer as if a foreign-endianness host had produced it:
        // every multi-byte field byte-swapped relative to what `write`
        // emits on this host, with the endianness flag bit set to match.
        let reg = NameRegistry::new();
        let mut table = NvTable::new(reg.num_static());
        let h = reg.allocate_handle("dyn1");
        table.set(h, "dyn1", b"cross-endian-value").unwrap();

        let mut offsets = Vec::new();
        table.for_each_entry(|_h, header, idx| {
            if let Some(e) = idx {
                offsets.push((e.offset, header.is_indirect()));
            }
            true
        });

        let mut w = Writer::new();
        write(&mut w, &table);
        let mut bytes = w.into_bytes();

        let swap4 = |b: &mut [u8], at: usize| {
            let v = u32::from_ne_bytes(b[at..at + 4].try_into().unwrap()).swap_bytes();
            b[at..at + 4].copy_from_slice(&v.to_ne_bytes());
        };
        let swap2 = |b: &mut [u8], at: usize| {
            let v = u16::from_ne_bytes(b[at..at + 2].try_into().unwrap()).swap_bytes();
            b[at..at + 2].copy_from_slice(&v.to_ne_bytes());
        };

        let used = table.used();
        let num_static = table.num_static() as usize;
        let index_len = table.index_len() as usize;

        let mut pos = 5usize; // past magic(4) + flags(1)
        swap4(&mut bytes, pos); // size
        pos += 4;
        swap4(&mut bytes, pos); // used
        pos += 4;
        swap2(&mut bytes, pos); // index_size
        pos += 2;
        pos += 1; // num_static, single byte, no swap
        for _ in 0..num_static {
            swap4(&mut bytes, pos);
            pos += 4;
        }
        let payload_start = pos + index_len * 8;

        // Swap each entry's internal header fields before the index
        // entries themselves get swapped (they still hold un-swapped
        // offsets at this point).
        for (offset, indirect) in &offsets {
            let entry_pos = payload_start + (used - offset) as usize;
            swap4(&mut bytes, entry_pos + 2); // alloc_len
            if *indirect {
                swap4(&mut bytes, entry_pos + 6); // ref_handle
                swap4(&mut bytes, entry_pos + 10); // ref_offset
                swap4(&mut bytes, entry_pos + 14); // ref_len
            } else {
                swap4(&mut bytes, entry_pos + 6); // value_len
            }
        }

        for _ in 0..index_len {
            swap4(&mut bytes, pos); // handle
            pos += 4;
            swap4(&mut bytes, pos); // offset
            pos += 4;
        }

        bytes[4] ^= FLAG_BIG_ENDIAN;

        let mut r = Reader::new(&bytes);
        let decoded = read(&mut r).unwrap();
        assert_eq!(decoded.get(h).unwrap(), b"cross-endian-value");
    }
}
