//! Handle fixup (C5): remaps a freshly deserialized message's
//! producer-local handles to this process's consumer-local ones.
//!
//! A handle is only meaningful relative to the `NameRegistry` that minted
//! it. Two processes agree on the low, pre-registered static handles (both
//! sides boot with the same `STATIC_FIELDS` list), but any dynamically
//! allocated handle — SDATA names, match captures, ad-hoc fields set by a
//! filter — was assigned by whichever registry the producer happened to
//! have. Before a deserialized message's payload can be read through this
//! process's own registry, every dynamic handle in it has to be rewritten
//! to whatever this registry assigns the same *name*.

use std::collections::HashMap;

use crate::errors::SerializeError;
use crate::message::LogMessage;
use crate::nvtable::entry;
use crate::registry::{Handle, NameRegistry};

/// Rewrites `msg`'s dynamic handles (its NVTable index, any indirect
/// entries' `ref_handle`, and its SDATA handle list) in place against
/// `registry`. Static handles are left untouched: both ends share the same
/// static field numbering by construction.
pub fn fixup(registry: &NameRegistry, msg: &mut LogMessage) -> Result<(), SerializeError> {
    let payload = msg.payload();
    let num_static = payload.num_static();

    let mut remap: HashMap<u32, u32> = HashMap::new();
    let mut first_error = None;

    payload.for_each_entry(|handle, header, idx_entry| {
        let Some(idx_entry) = idx_entry else {
            return true; // static slot, shared across processes already
        };
        let _ = handle;
        match payload.entry_name(idx_entry.offset) {
            Ok(name) => {
                remap_one(registry, idx_entry.handle, &name, &mut remap);
            }
            Err(e) => {
                first_error = Some(e);
                return false;
            }
        }
        if let entry::Kind::Indirect { ref_handle, .. } = header.kind {
            if ref_handle > num_static {
                if let Some(ref_offset) = payload.offset_for_handle(ref_handle) {
                    match payload.entry_name(ref_offset) {
                        Ok(ref_name) => remap_one(registry, ref_handle, &ref_name, &mut remap),
                        Err(e) => {
                            first_error = Some(e);
                            return false;
                        }
                    }
                }
            }
        }
        true
    });
    if let Some(e) = first_error {
        return Err(e.into());
    }
    if remap.is_empty() {
        return Ok(());
    }

    let mut payload = payload;
    payload.apply_handle_remap(&remap)?;

    let new_sdata: Vec<Handle> = msg
        .sdata_handles()
        .into_iter()
        .map(|h| Handle(remap.get(&h.0).copied().unwrap_or(h.0)))
        .collect();
    msg.set_payload(payload);
    // `set_sdata_handles_raw` only fails if the list grows past
    // `alloc_sdata`, which a pure rename can never do.
    msg.set_sdata_handles_raw(new_sdata).expect("remap cannot change sdata handle count");
    Ok(())
}

/// Resolves `old_handle`/`name` against `registry`, recording the mapping
/// in `remap` if it changes. Skips the registry write entirely when the
/// consumer already has this exact name bound to this exact handle — a
/// pure performance optimization (see DESIGN.md) with no effect on the
/// result.
fn remap_one(registry: &NameRegistry, old_handle: u32, name: &str, remap: &mut HashMap<u32, u32>) {
    if remap.contains_key(&old_handle) {
        return;
    }
    if let Some((existing_name, _)) = registry.get_name(Handle(old_handle)) {
        if &*existing_name == name {
            return;
        }
    }
    let new_handle = registry.allocate_handle(name).0;
    if new_handle != old_handle {
        remap.insert(old_handle, new_handle);
    }
}
