//! Top-level `LogMessage` freeze/thaw, format version 26.
//!
//! The envelope (everything up to the NVTable block) is always written
//! big-endian; only the NVTable block itself carries the host-order tag and
//! swap-on-read behavior described in `nvtable_wire`.

use crate::errors::SerializeError;
use crate::message::LogMessage;
use crate::registry::Handle;
use crate::tags::TagSet;

use super::reader::Reader;
use super::writer::Writer;
use super::{nvtable_wire, sockaddr, timestamp};

pub const VERSION: u8 = 26;

pub fn write(w: &mut Writer, msg: &LogMessage) {
    let snap = msg.snapshot();
    w.emit_u8(VERSION);
    w.emit_u64_be(snap.rcptid);
    // Any processing-only state bits in `flags` are the caller's
    // responsibility to clear before freezing; this crate doesn't define
    // such bits itself.
    w.emit_u32_be(snap.flags);
    w.emit_u16_be(snap.pri);
    sockaddr::write(w, &snap.source_addr);
    timestamp::write_three(w, &snap.stamps);
    w.emit_u32_be(snap.host_id);
    write_tags(w, &snap.tags);
    w.emit_u8(snap.initial_parse as u8);
    w.emit_u8(snap.num_matches);
    w.emit_u8(snap.sdata_handles.len() as u8);
    w.emit_u8(snap.alloc_sdata);
    for h in &snap.sdata_handles {
        w.emit_u32_be(h.0);
    }
    nvtable_wire::write(w, &snap.payload);
}

pub fn read(r: &mut Reader) -> Result<LogMessage, SerializeError> {
    let version = r.read_u8()?;
    if version != VERSION {
        return Err(SerializeError::UnsupportedVersion(version));
    }
    let rcptid = r.read_u64_be()?;
    let flags = r.read_u32_be()?;
    let pri = r.read_u16_be()?;
    let source_addr = sockaddr::read(r)?;
    let stamps = timestamp::read_three(r)?;
    let host_id = r.read_u32_be()?;
    let tags = read_tags(r)?;
    let initial_parse = r.read_u8()? != 0;
    let num_matches = r.read_u8()?;
    let num_sdata = r.read_u8()?;
    let alloc_sdata = r.read_u8()?;
    let mut sdata_handles = Vec::with_capacity(num_sdata as usize);
    for _ in 0..num_sdata {
        sdata_handles.push(Handle(r.read_u32_be()?));
    }
    let payload = nvtable_wire::read(r)?;
    Ok(LogMessage::from_raw_parts(
        rcptid,
        flags,
        pri,
        source_addr,
        stamps,
        host_id,
        tags,
        initial_parse,
        num_matches,
        alloc_sdata,
        sdata_handles,
        payload,
    ))
}

fn write_tags(w: &mut Writer, tags: &TagSet) {
    let ids: Vec<u32> = tags.iter().collect();
    w.emit_u32_be(ids.len() as u32);
    for id in ids {
        w.emit_u32_be(id);
    }
}

fn read_tags(r: &mut Reader) -> Result<TagSet, SerializeError> {
    let count = r.read_u32_be()?;
    let mut tags = TagSet::new();
    for _ in 0..count {
        tags.set(r.read_u32_be()?);
    }
    Ok(tags)
}
