//! The NVTable arena (C2): a compact, reference-counted, copy-on-grow byte
//! arena holding direct/indirect name-value entries addressed through
//! static slots and a sorted dynamic index.
//!
//! Ref-counting follows the specification's §5 resource model ("NVTable
//! uses non-atomic refcounts — single-threaded ownership transfer
//! required"): `NvTable` wraps `Rc<RefCell<NvTableInner>>`, and every
//! mutating method calls `make_writable` first, which clones the inner
//! arena whenever it is shared (`Rc::strong_count() > 1`) rather than
//! mutating memory another owner can see — the "shared handle to immutable
//! table + builder for the mutable form" strategy the specification's
//! design notes call out as the idiomatic translation of the original's
//! manual ref-count-and-copy-on-write arena.

pub mod entry;
pub mod index;

use std::cell::RefCell;
use std::rc::Rc;

use crate::errors::NvError;
use crate::registry::{Handle, NameRegistry};
use entry::Header;
use index::NvIndexEntry;

/// Arenas never start smaller than this (the teacher's `SHARED_SECTION_SIZE`
/// constant plays an analogous "sane minimum" role for its ring buffer).
pub const MIN_ARENA_SIZE: u32 = 256;
/// Hard ceiling from the specification: "size (total bytes, ≤ 256 MiB)".
pub const MAX_ARENA_SIZE: u32 = 256 * 1024 * 1024;

const NVTABLE_HEADER_BYTES: u32 = 4 + 4 + 2 + 1 + 1; // size, used, index_size, num_static, ref_cnt/borrowed
const STATIC_SLOT_BYTES: u32 = 4;
const INDEX_ENTRY_BYTES: u32 = 8;

/// Indirect entries whose sliced value is this small, or whose target is
/// itself indirect, collapse to a direct copy instead — per §4.2's "MAY
/// collapse to direct" escape hatch.
const SMALL_DIRECT_COLLAPSE_THRESHOLD: usize = 32;

enum NewValue<'a> {
    Direct(&'a [u8]),
    Indirect {
        ref_handle: u32,
        ref_offset: u32,
        ref_len: u32,
        type_tag: u8,
    },
}

impl NewValue<'_> {
    fn min_alloc(&self, name_len: usize) -> usize {
        match self {
            NewValue::Direct(v) => entry::direct_min_alloc(name_len, v.len()),
            NewValue::Indirect { .. } => entry::indirect_min_alloc(name_len),
        }
    }
}

/// The table's internal state. Not exposed directly; `serialize` and
/// `fixup` reach in via the `pub(crate)` accessors below since they need to
/// read and rewrite the exact wire-level layout.
#[derive(Clone)]
pub(crate) struct NvTableInner {
    pub(crate) size: u32,
    pub(crate) used: u32,
    pub(crate) num_static: u32,
    pub(crate) static_slots: Vec<u32>,
    pub(crate) index: Vec<NvIndexEntry>,
    pub(crate) arena: Vec<u8>,
    pub(crate) borrowed: bool,
}

impl std::fmt::Debug for NvTableInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvTableInner")
            .field("size", &self.size)
            .field("used", &self.used)
            .field("num_static", &self.num_static)
            .field("index_len", &self.index.len())
            .finish()
    }
}

impl NvTableInner {
    fn new(num_static: u32) -> Self {
        Self {
            size: MIN_ARENA_SIZE,
            used: 0,
            num_static,
            static_slots: vec![0; num_static as usize],
            index: Vec::new(),
            arena: vec![0u8; MIN_ARENA_SIZE as usize],
            borrowed: false,
        }
    }

    fn header_overhead(&self) -> u32 {
        NVTABLE_HEADER_BYTES
            + self.num_static * STATIC_SLOT_BYTES
            + (self.index.len() as u32) * INDEX_ENTRY_BYTES
    }

    fn free_at_size(&self, size: u32) -> u32 {
        size.saturating_sub(self.used).saturating_sub(self.header_overhead())
    }

    fn grow_to(&mut self, new_size: u32) {
        debug_assert!(new_size > self.size);
        let delta = (new_size - self.size) as usize;
        let mut new_arena = vec![0u8; new_size as usize];
        new_arena[delta..].copy_from_slice(&self.arena);
        self.arena = new_arena;
        self.size = new_size;
    }

    /// Grows the arena (doubling, up to the 256 MiB ceiling) until at least
    /// `alloc_len` bytes of free space remain, reserving room for one more
    /// index slot if `needs_new_index_slot` is set. Returns `Exhausted` if
    /// the ceiling is reached without enough room.
    fn ensure_room(&mut self, alloc_len: u32, needs_new_index_slot: bool) -> Result<(), NvError> {
        let required = alloc_len + if needs_new_index_slot { INDEX_ENTRY_BYTES } else { 0 };
        if self.free_at_size(self.size) >= required {
            return Ok(());
        }
        let mut candidate = self.size.max(MIN_ARENA_SIZE);
        while candidate < MAX_ARENA_SIZE && self.free_at_size(candidate) < required {
            candidate = candidate.saturating_mul(2).min(MAX_ARENA_SIZE);
        }
        if self.free_at_size(candidate) < required {
            return Err(NvError::Exhausted(MAX_ARENA_SIZE));
        }
        if candidate > self.size {
            self.grow_to(candidate);
        }
        Ok(())
    }

    fn header_at(&self, offset: u32) -> Result<Header, NvError> {
        if offset == 0 || offset > self.used {
            return Err(NvError::Format(format!("invalid entry offset {offset}")));
        }
        let start = (self.size - offset) as usize;
        entry::validate(&self.arena[start..], start, self.arena.len())
    }

    fn entry_bytes(&self, offset: u32, alloc_len: usize) -> &[u8] {
        let start = (self.size - offset) as usize;
        &self.arena[start..start + alloc_len]
    }

    fn entry_bytes_mut(&mut self, offset: u32, alloc_len: usize) -> &mut [u8] {
        let start = (self.size - offset) as usize;
        &mut self.arena[start..start + alloc_len]
    }

    fn find_offset(&self, handle: u32) -> Option<u32> {
        if handle == 0 {
            return None;
        }
        if handle <= self.num_static {
            let off = self.static_slots[(handle - 1) as usize];
            (off != 0).then_some(off)
        } else {
            index::search(&self.index, handle).ok().map(|pos| self.index[pos].offset)
        }
    }

    fn try_rewrite_in_place(&mut self, offset: u32, name: &str, value: &NewValue) -> Result<bool, NvError> {
        let header = self.header_at(offset)?;
        let alloc_len = header.alloc_len as usize;
        let existing_name = {
            let buf = self.entry_bytes(offset, alloc_len);
            entry::name(buf, &header)?.to_string()
        };
        // Handle collision after fixup: a different name now maps to this
        // index/static slot. Always allocate a fresh entry in that case.
        if existing_name != name {
            return Ok(false);
        }
        let needed = value.min_alloc(name.len());
        if needed > alloc_len {
            return Ok(false);
        }
        let keep_referenced = header.flags & entry::FLAG_REFERENCED;
        let buf = self.entry_bytes_mut(offset, alloc_len);
        match value {
            NewValue::Direct(v) => {
                entry::write_direct(buf, keep_referenced, name, v, alloc_len);
            }
            NewValue::Indirect {
                ref_handle,
                ref_offset,
                ref_len,
                type_tag,
            } => {
                entry::write_indirect(
                    buf,
                    keep_referenced | entry::FLAG_INDIRECT,
                    name,
                    *ref_handle,
                    *ref_offset,
                    *ref_len,
                    *type_tag,
                    alloc_len,
                );
            }
        }
        Ok(true)
    }

    fn append_value(&mut self, name: &str, value: &NewValue, needs_new_index_slot: bool) -> Result<u32, NvError> {
        let alloc_len = value.min_alloc(name.len()) as u32;
        self.ensure_room(alloc_len, needs_new_index_slot)?;
        let start = (self.size - self.used - alloc_len) as usize;
        let buf = &mut self.arena[start..start + alloc_len as usize];
        match value {
            NewValue::Direct(v) => {
                entry::write_direct(buf, 0, name, v, alloc_len as usize);
            }
            NewValue::Indirect {
                ref_handle,
                ref_offset,
                ref_len,
                type_tag,
            } => {
                entry::write_indirect(buf, entry::FLAG_INDIRECT, name, *ref_handle, *ref_offset, *ref_len, *type_tag, alloc_len as usize);
            }
        }
        self.used += alloc_len;
        Ok(self.used)
    }

    fn set_value(&mut self, handle: Handle, name: &str, value: NewValue) -> Result<bool, NvError> {
        if handle.0 == 0 {
            return Err(NvError::Format("handle 0 cannot be set".into()));
        }
        if handle.0 <= self.num_static {
            let idx = (handle.0 - 1) as usize;
            let existing = self.static_slots[idx];
            if existing != 0 && self.try_rewrite_in_place(existing, name, &value)? {
                return Ok(false);
            }
            let new_offset = self.append_value(name, &value, false)?;
            self.static_slots[idx] = new_offset;
            Ok(existing == 0)
        } else {
            match index::search(&self.index, handle.0) {
                Ok(pos) => {
                    let existing = self.index[pos].offset;
                    if self.try_rewrite_in_place(existing, name, &value)? {
                        return Ok(false);
                    }
                    let new_offset = self.append_value(name, &value, false)?;
                    self.index[pos].offset = new_offset;
                    Ok(false)
                }
                Err(_) => {
                    let new_offset = self.append_value(name, &value, true)?;
                    index::insert_sorted(&mut self.index, NvIndexEntry { handle: handle.0, offset: new_offset });
                    Ok(true)
                }
            }
        }
    }

    fn mark_referenced(&mut self, offset: u32) -> Result<(), NvError> {
        let header = self.header_at(offset)?;
        let buf = self.entry_bytes_mut(offset, header.alloc_len as usize);
        buf[0] |= entry::FLAG_REFERENCED;
        Ok(())
    }

    /// Patches the `referenced` handle embedded in an indirect entry's
    /// bytes — used by handle fixup (C5) to remap producer-local handles.
    pub(crate) fn rewrite_indirect_ref_handle(&mut self, offset: u32, new_ref_handle: u32) -> Result<(), NvError> {
        let header = self.header_at(offset)?;
        if !header.is_indirect() {
            return Err(NvError::Format("rewrite_indirect_ref_handle on a direct entry".into()));
        }
        let buf = self.entry_bytes_mut(offset, header.alloc_len as usize);
        buf[6..10].copy_from_slice(&new_ref_handle.to_ne_bytes());
        Ok(())
    }

    pub(crate) fn payload(&self) -> &[u8] {
        &self.arena[(self.size - self.used) as usize..]
    }
}

/// The NVTable arena (C2): a ref-counted, copy-on-grow handle. Cloning is
/// `Rc`-cheap; the first mutation after a clone triggers a deep copy.
#[derive(Clone)]
pub struct NvTable {
    inner: Rc<RefCell<NvTableInner>>,
}

impl NvTable {
    /// Builds a fresh, empty table with the given number of static slots.
    pub fn new(num_static: u32) -> Self {
        Self {
            inner: Rc::new(RefCell::new(NvTableInner::new(num_static))),
        }
    }

    pub(crate) fn from_inner(inner: NvTableInner) -> Self {
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }

    pub(crate) fn borrow_inner(&self) -> std::cell::Ref<'_, NvTableInner> {
        self.inner.borrow()
    }

    /// Resolves a handle to its arena offset, if set. Used by handle fixup
    /// (C5) to find an indirect entry's referenced entry.
    pub(crate) fn offset_for_handle(&self, handle: u32) -> Option<u32> {
        self.inner.borrow().find_offset(handle)
    }

    /// Reads an entry's stored name directly, given its arena offset. Used
    /// by handle fixup, which needs the name independently of any
    /// registry (the name living in the bytes is the producer's name; the
    /// whole point of fixup is reconciling it against the consumer's
    /// registry).
    pub(crate) fn entry_name(&self, offset: u32) -> Result<String, NvError> {
        let inner = self.inner.borrow();
        let header = inner.header_at(offset)?;
        let buf = inner.entry_bytes(offset, header.alloc_len as usize);
        Ok(entry::name(buf, &header)?.to_string())
    }

    /// Rewrites every handle named in `remap` (old → new) across the
    /// dynamic index and any indirect entries' embedded `ref_handle`
    /// field, then restores the index's sort-by-handle invariant. Part of
    /// handle fixup (C5); static slots are never touched since static
    /// handles are shared process-wide by construction.
    pub(crate) fn apply_handle_remap(&mut self, remap: &std::collections::HashMap<u32, u32>) -> Result<(), NvError> {
        if remap.is_empty() {
            return Ok(());
        }
        self.make_writable();
        let mut inner = self.inner.borrow_mut();

        let mut indirect_offsets = Vec::new();
        for &slot in &inner.static_slots {
            if slot == 0 {
                continue;
            }
            if inner.header_at(slot)?.is_indirect() {
                indirect_offsets.push(slot);
            }
        }
        for e in &inner.index {
            if inner.header_at(e.offset)?.is_indirect() {
                indirect_offsets.push(e.offset);
            }
        }

        for offset in indirect_offsets {
            let header = inner.header_at(offset)?;
            if let entry::Kind::Indirect { ref_handle, .. } = header.kind {
                if let Some(&new_ref) = remap.get(&ref_handle) {
                    inner.rewrite_indirect_ref_handle(offset, new_ref)?;
                }
            }
        }

        for e in inner.index.iter_mut() {
            if let Some(&new_handle) = remap.get(&e.handle) {
                e.handle = new_handle;
            }
        }
        inner.index.sort_by_key(|e| e.handle);
        Ok(())
    }

    /// Number of live references sharing this table's backing arena.
    pub fn ref_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// Clones the inner arena if it is shared, so the caller holds the sole
    /// writer reference before mutating. Equivalent to the specification's
    /// "make-writable clone".
    pub fn make_writable(&mut self) {
        if Rc::strong_count(&self.inner) > 1 {
            let cloned = self.inner.borrow().clone();
            self.inner = Rc::new(RefCell::new(cloned));
        }
    }

    pub fn num_static(&self) -> u32 {
        self.inner.borrow().num_static
    }

    pub fn size(&self) -> u32 {
        self.inner.borrow().size
    }

    pub fn used(&self) -> u32 {
        self.inner.borrow().used
    }

    pub fn index_len(&self) -> u16 {
        self.inner.borrow().index.len() as u16
    }

    /// Sets a direct entry. Returns whether a brand new entry was created
    /// (as opposed to replacing/rewriting an existing one).
    pub fn set(&mut self, handle: Handle, name: &str, value: &[u8]) -> Result<bool, NvError> {
        self.make_writable();
        self.inner.borrow_mut().set_value(handle, name, NewValue::Direct(value))
    }

    /// Sets an indirect entry referring to a slice of another entry's
    /// value. Collapses to a direct copy when the referenced entry is
    /// itself indirect, or when the slice is small enough that copying is
    /// cheaper than chasing a reference.
    #[allow(clippy::too_many_arguments)]
    pub fn set_indirect(
        &mut self,
        handle: Handle,
        name: &str,
        ref_handle: Handle,
        ref_offset: u32,
        ref_len: u32,
        type_tag: u8,
    ) -> Result<bool, NvError> {
        self.make_writable();
        let mut inner = self.inner.borrow_mut();
        let target_offset = inner
            .find_offset(ref_handle.0)
            .ok_or_else(|| NvError::Format(format!("set_indirect: handle {} is not set", ref_handle.0)))?;
        let target_header = inner.header_at(target_offset)?;

        if target_header.is_indirect() || ref_len as usize <= SMALL_DIRECT_COLLAPSE_THRESHOLD {
            if target_header.is_indirect() {
                return Err(NvError::Format(
                    "set_indirect: referenced handle is itself indirect".into(),
                ));
            }
            let full_value = {
                let buf = inner.entry_bytes(target_offset, target_header.alloc_len as usize);
                entry::direct_value(buf, &target_header)?.to_vec()
            };
            let begin = (ref_offset as usize).min(full_value.len());
            let end = (begin + ref_len as usize).min(full_value.len());
            return inner.set_value(handle, name, NewValue::Direct(&full_value[begin..end]));
        }

        inner.mark_referenced(target_offset)?;
        inner.set_value(
            handle,
            name,
            NewValue::Indirect {
                ref_handle: ref_handle.0,
                ref_offset,
                ref_len,
                type_tag,
            },
        )
    }

    /// Marks `handle`'s entry as unset. Later reads return "not set".
    pub fn unset(&mut self, handle: Handle) -> Result<(), NvError> {
        self.make_writable();
        let mut inner = self.inner.borrow_mut();
        let Some(offset) = inner.find_offset(handle.0) else {
            return Ok(());
        };
        let header = inner.header_at(offset)?;
        let buf = inner.entry_bytes_mut(offset, header.alloc_len as usize);
        entry::set_unset(buf, true);
        Ok(())
    }

    pub fn is_set(&self, handle: Handle) -> bool {
        let inner = self.inner.borrow();
        match inner.find_offset(handle.0) {
            Some(offset) => inner.header_at(offset).map(|h| !h.is_unset()).unwrap_or(false),
            None => false,
        }
    }

    /// Resolves `handle`'s value, following indirect references. Returns
    /// `None` if the handle isn't set, or if an indirect entry's target is
    /// unset (per the specification's resolution note: "if an indirect
    /// entry's target is unset, resolution SHOULD return 'not set' rather
    /// than the raw bytes").
    pub fn get(&self, handle: Handle) -> Option<Vec<u8>> {
        let inner = self.inner.borrow();
        let offset = inner.find_offset(handle.0)?;
        let header = inner.header_at(offset).ok()?;
        if header.is_unset() {
            return None;
        }
        match header.kind {
            entry::Kind::Direct { .. } => {
                let buf = inner.entry_bytes(offset, header.alloc_len as usize);
                entry::direct_value(buf, &header).ok().map(|v| v.to_vec())
            }
            entry::Kind::Indirect {
                ref_handle,
                ref_offset,
                ref_len,
                ..
            } => {
                let ref_offset_arena = inner.find_offset(ref_handle)?;
                let ref_header = inner.header_at(ref_offset_arena).ok()?;
                if ref_header.is_unset() {
                    return None;
                }
                match ref_header.kind {
                    entry::Kind::Direct { .. } => {
                        let buf = inner.entry_bytes(ref_offset_arena, ref_header.alloc_len as usize);
                        let full_value = entry::direct_value(buf, &ref_header).ok()?;
                        let begin = (ref_offset as usize).min(full_value.len());
                        let end = (begin + ref_len as usize).min(full_value.len());
                        Some(full_value[begin..end].to_vec())
                    }
                    // Indirect-of-indirect is never produced by `set_indirect`
                    // (it collapses eagerly); tolerate it defensively rather
                    // than panicking.
                    entry::Kind::Indirect { .. } => None,
                }
            }
        }
    }

    /// Iterates static slots (in slot order) then dynamic entries (in
    /// index order). The callback receives `(handle, header, index entry or
    /// None for static slots)` and may abort the walk by returning `false`.
    pub fn for_each_entry(&self, mut callback: impl FnMut(Handle, &Header, Option<NvIndexEntry>) -> bool) {
        let inner = self.inner.borrow();
        for (i, &offset) in inner.static_slots.iter().enumerate() {
            if offset == 0 {
                continue;
            }
            if let Ok(header) = inner.header_at(offset) {
                if !callback(Handle((i + 1) as u32), &header, None) {
                    return;
                }
            }
        }
        for idx_entry in &inner.index {
            if let Ok(header) = inner.header_at(idx_entry.offset) {
                if !callback(Handle(idx_entry.handle), &header, Some(*idx_entry)) {
                    return;
                }
            }
        }
    }

    /// Like `for_each_entry` but yields resolved `(handle, name, value)`
    /// triples, skipping unset entries.
    pub fn for_each(&self, registry: &NameRegistry, mut callback: impl FnMut(Handle, &str, &[u8]) -> bool) {
        let mut keep_going = true;
        self.for_each_entry(|handle, header, _| {
            if !keep_going {
                return false;
            }
            if header.is_unset() {
                return true;
            }
            let Some((name, _)) = registry.get_name(handle) else {
                return true;
            };
            let Some(value) = self.get(handle) else {
                return true;
            };
            if !callback(handle, &name, &value) {
                keep_going = false;
                return false;
            }
            true
        });
    }

    /// Deep-copies this table into a freshly allocated arena with at least
    /// `extra_space` additional free bytes.
    pub fn clone_with_extra(&self, extra_space: u32) -> NvTable {
        let inner = self.inner.borrow();
        let mut cloned = inner.clone();
        drop(inner);
        let new_size = cloned.size.saturating_add(extra_space).min(MAX_ARENA_SIZE);
        if new_size > cloned.size {
            cloned.grow_to(new_size);
        }
        NvTable::from_inner(cloned)
    }

    /// Grows the table to at least `new_min_size` bytes, cloning first if
    /// the table is shared (growth must never mutate memory another owner
    /// can observe).
    pub fn realloc(&mut self, new_min_size: u32) -> Result<(), NvError> {
        if new_min_size > MAX_ARENA_SIZE {
            return Err(NvError::Exhausted(MAX_ARENA_SIZE));
        }
        self.make_writable();
        let mut inner = self.inner.borrow_mut();
        if new_min_size > inner.size {
            inner.grow_to(new_min_size);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(names: &[&str]) -> NameRegistry {
        let reg = NameRegistry::new();
        for n in names {
            reg.allocate_handle(n);
        }
        reg
    }

    #[test]
    fn set_get_direct() {
        let reg = registry_with(&["foo"]);
        let mut t = NvTable::new(reg.num_static());
        let h = reg.get_handle("foo").unwrap();
        assert!(t.set(h, "foo", b"bar").unwrap());
        assert_eq!(t.get(h).unwrap(), b"bar");
        assert!(t.is_set(h));
    }

    #[test]
    fn set_in_place_when_it_fits() {
        let reg = registry_with(&["foo"]);
        let mut t = NvTable::new(reg.num_static());
        let h = reg.get_handle("foo").unwrap();
        t.set(h, "foo", b"0123456789").unwrap();
        let used_before = t.used();
        t.set(h, "foo", b"abc").unwrap(); // shorter value, same alloc slot
        assert_eq!(t.used(), used_before, "shrinking value should rewrite in place");
        assert_eq!(t.get(h).unwrap(), b"abc");
    }

    #[test]
    fn set_appends_when_it_no_longer_fits() {
        let reg = registry_with(&["foo"]);
        let mut t = NvTable::new(reg.num_static());
        let h = reg.get_handle("foo").unwrap();
        t.set(h, "foo", b"x").unwrap();
        let used_before = t.used();
        t.set(h, "foo", &vec![b'y'; 200]).unwrap();
        assert!(t.used() > used_before);
        assert_eq!(t.get(h).unwrap(), vec![b'y'; 200]);
    }

    #[test]
    fn unset_then_get_returns_none() {
        let reg = registry_with(&["foo"]);
        let mut t = NvTable::new(reg.num_static());
        let h = reg.get_handle("foo").unwrap();
        t.set(h, "foo", b"bar").unwrap();
        t.unset(h).unwrap();
        assert_eq!(t.get(h), None);
        assert!(!t.is_set(h));
    }

    #[test]
    fn indirect_slice_resolves() {
        let reg = registry_with(&["outer", "inner"]);
        let mut t = NvTable::new(reg.num_static());
        let outer = reg.get_handle("outer").unwrap();
        let inner = reg.get_handle("inner").unwrap();
        t.set(outer, "outer", b"HELLO WORLD").unwrap();
        // "WORLD" is long enough (5 bytes) to stay under the collapse
        // threshold only if threshold < 5; use a value long enough to
        // force a genuine indirect entry by referencing a big slice.
        let big = "x".repeat(64);
        t.set(outer, "outer", big.as_bytes()).unwrap();
        t.set_indirect(inner, "inner", outer, 0, 40, entry::TYPE_TAG_STRING).unwrap();
        assert_eq!(t.get(inner).unwrap(), big.as_bytes()[0..40].to_vec());
    }

    #[test]
    fn indirect_collapses_when_small() {
        let reg = registry_with(&["outer", "inner"]);
        let mut t = NvTable::new(reg.num_static());
        let outer = reg.get_handle("outer").unwrap();
        let inner = reg.get_handle("inner").unwrap();
        t.set(outer, "outer", b"HELLO WORLD").unwrap();
        t.set_indirect(inner, "inner", outer, 6, 5, entry::TYPE_TAG_STRING).unwrap();
        assert_eq!(t.get(inner).unwrap(), b"WORLD");
    }

    #[test]
    fn index_stays_sorted_after_many_inserts() {
        let names = ["mmm", "aaa", "zzz", "bbb", "yyy"];
        let reg = registry_with(&names);
        let mut t = NvTable::new(reg.num_static());
        for n in names {
            let h = reg.get_handle(n).unwrap();
            t.set(h, n, n.as_bytes()).unwrap();
        }
        let inner = t.borrow_inner();
        assert!(index::is_sorted_strict(&inner.index));
    }

    #[test]
    fn clone_is_independent() {
        let reg = registry_with(&["foo"]);
        let mut t = NvTable::new(reg.num_static());
        let h = reg.get_handle("foo").unwrap();
        t.set(h, "foo", b"bar").unwrap();
        let mut cloned = t.clone();
        cloned.set(h, "foo", b"baz").unwrap();
        assert_eq!(t.get(h).unwrap(), b"bar");
        assert_eq!(cloned.get(h).unwrap(), b"baz");
    }

    #[test]
    fn make_writable_clones_only_when_shared() {
        let mut t = NvTable::new(0);
        let before = Rc::strong_count(&t.inner);
        assert_eq!(before, 1);
        let _shared = t.clone();
        assert_eq!(Rc::strong_count(&t.inner), 2);
        t.make_writable();
        assert_eq!(Rc::strong_count(&t.inner), 1);
    }

    #[test]
    fn arena_grows_past_initial_size() {
        let reg = NameRegistry::new();
        let mut t = NvTable::new(reg.num_static());
        for i in 0..200u32 {
            let name = format!("dyn{i}");
            let h = reg.allocate_handle(&name);
            t.set(h, &name, &vec![b'a'; 64]).unwrap();
        }
        assert!(t.size() > MIN_ARENA_SIZE);
    }

    #[test]
    fn handle_collision_allocates_fresh_entry() {
        // Simulate a fixup scenario: the same index slot position now maps
        // to a different name under the same handle number.
        let reg = registry_with(&["foo"]);
        let mut t = NvTable::new(reg.num_static());
        let h = reg.get_handle("foo").unwrap();
        t.set(h, "foo", b"bar").unwrap();
        let offset_before = t.inner.borrow().static_slots.first().copied();
        // Re-set the same handle with a different name: this is the
        // "handle collision after fixup" case and must not silently
        // overwrite the old entry's bytes.
        t.set(h, "different-name", b"baz").unwrap();
        assert_eq!(t.get(h).unwrap(), b"baz");
        let offset_after = t.inner.borrow().static_slots.first().copied();
        assert_ne!(offset_before, offset_after, "must allocate a fresh entry on name mismatch");
    }
}
