//! The log message model (C3): priority, source address, timestamps, tags,
//! structured-data handle list, and the NVTable payload they wrap.
//!
//! `LogMessage` is `Arc<RefCell<LogMessageInner>>` rather than plain
//! `Rc<RefCell<_>>`: the specification calls for atomic reference counting
//! at this layer even though the `NvTable` payload inside stays non-atomic
//! (§5's split ownership model). Because `NvTable` is built on `Rc`, the
//! compiler refuses to `Send` a `LogMessage` across a thread boundary for
//! us — which is exactly right, since the specification requires messages
//! to cross threads via the serializer/deserializer (C4), never by handing
//! over the live value. `logagent`'s worker channels carry the serialized
//! bytes, not `LogMessage` itself.

use std::cell::RefCell;
use std::net::{SocketAddrV4, SocketAddrV6};
use std::sync::Arc;

use crate::errors::MessageError;
use crate::nvtable::NvTable;
use crate::registry::{Handle, HandleFlags, NameRegistry};
use crate::tags::TagSet;

/// Maximum priority value (facility << 3 | severity must stay below this).
pub const MAX_PRIORITY: u16 = 1024;

/// The three timestamps syslog-ng style pipelines carry per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampKind {
    /// Timestamp parsed out of the message body itself.
    #[default]
    Stamp,
    /// Time the transport layer actually received the bytes.
    Recvd,
    /// Time the pipeline finished processing (stamped just before sending).
    Processed,
}

/// A single `{sec, usec, gmtoff}` timestamp, matching the wire layout
/// `serialize::timestamp` will encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogStamp {
    pub sec: i64,
    pub usec: i32,
    pub gmtoff: i32,
}

/// Where a message was received from, or `None` for internally generated
/// messages. Mirrors the specification's "SockAddr" variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceAddr {
    None,
    Inet(SocketAddrV4),
    Inet6(SocketAddrV6),
    Unix(String),
}

impl Default for SourceAddr {
    fn default() -> Self {
        SourceAddr::None
    }
}

#[derive(Debug, Clone)]
struct LogMessageInner {
    rcptid: u64,
    flags: u32,
    pri: u16,
    source_addr: SourceAddr,
    stamps: [LogStamp; 3],
    host_id: u32,
    tags: TagSet,
    initial_parse: bool,
    num_matches: u8,
    /// Handles of NVTable entries carrying structured-data values. Every
    /// entry here must have `HandleFlags::SDATA` set in the registry.
    sdata_handles: Vec<Handle>,
    /// The wire format reserves a fixed slot count even when fewer are
    /// live; keep it so re-serializing an unmodified message round-trips
    /// byte-for-byte.
    alloc_sdata: u8,
    payload: NvTable,
}

/// A log message (C3): `Arc<RefCell<_>>`, cloned cheaply, copy-on-write on
/// first mutation after a clone.
#[derive(Clone)]
pub struct LogMessage {
    inner: Arc<RefCell<LogMessageInner>>,
}

impl LogMessage {
    /// Builds a fresh, empty message over a fresh NVTable payload.
    pub fn new(registry: &NameRegistry) -> Self {
        Self::with_payload(NvTable::new(registry.num_static()))
    }

    pub fn with_payload(payload: NvTable) -> Self {
        Self {
            inner: Arc::new(RefCell::new(LogMessageInner {
                rcptid: 0,
                flags: 0,
                pri: 0,
                source_addr: SourceAddr::None,
                stamps: [LogStamp::default(); 3],
                host_id: 0,
                tags: TagSet::new(),
                initial_parse: true,
                num_matches: 0,
                sdata_handles: Vec::new(),
                alloc_sdata: 0,
                payload,
            })),
        }
    }

    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Deep-copies the shared state if this message has other owners, so
    /// subsequent mutation is invisible to them.
    pub fn make_writable(&mut self) {
        if Arc::strong_count(&self.inner) > 1 {
            let mut cloned = self.inner.borrow().clone();
            cloned.payload = self.inner.borrow().payload.clone_with_extra(0);
            self.inner = Arc::new(RefCell::new(cloned));
        }
    }

    pub fn rcptid(&self) -> u64 {
        self.inner.borrow().rcptid
    }

    pub fn set_rcptid(&mut self, rcptid: u64) {
        self.make_writable();
        self.inner.borrow_mut().rcptid = rcptid;
    }

    pub fn flags(&self) -> u32 {
        self.inner.borrow().flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.make_writable();
        self.inner.borrow_mut().flags = flags;
    }

    pub fn priority(&self) -> u16 {
        self.inner.borrow().pri
    }

    /// Sets priority. Errors if `pri >= 1024` per the specification's
    /// invariant.
    pub fn set_priority(&mut self, pri: u16) -> Result<(), MessageError> {
        if pri >= MAX_PRIORITY {
            return Err(MessageError::InvalidPriority(pri));
        }
        self.make_writable();
        self.inner.borrow_mut().pri = pri;
        Ok(())
    }

    pub fn source_addr(&self) -> SourceAddr {
        self.inner.borrow().source_addr.clone()
    }

    pub fn set_source_addr(&mut self, addr: SourceAddr) {
        self.make_writable();
        self.inner.borrow_mut().source_addr = addr;
    }

    pub fn stamp(&self, kind: TimestampKind) -> LogStamp {
        self.inner.borrow().stamps[kind as usize]
    }

    pub fn set_stamp(&mut self, kind: TimestampKind, stamp: LogStamp) {
        self.make_writable();
        self.inner.borrow_mut().stamps[kind as usize] = stamp;
    }

    pub fn host_id(&self) -> u32 {
        self.inner.borrow().host_id
    }

    pub fn set_host_id(&mut self, host_id: u32) {
        self.make_writable();
        self.inner.borrow_mut().host_id = host_id;
    }

    pub fn tags(&self) -> TagSet {
        self.inner.borrow().tags.clone()
    }

    pub fn set_tag(&mut self, tag: u32) {
        self.make_writable();
        self.inner.borrow_mut().tags.set(tag);
    }

    pub fn clear_tag(&mut self, tag: u32) {
        self.make_writable();
        self.inner.borrow_mut().tags.clear(tag);
    }

    pub fn initial_parse(&self) -> bool {
        self.inner.borrow().initial_parse
    }

    pub fn set_initial_parse(&mut self, value: bool) {
        self.make_writable();
        self.inner.borrow_mut().initial_parse = value;
    }

    pub fn num_matches(&self) -> u8 {
        self.inner.borrow().num_matches
    }

    pub fn set_num_matches(&mut self, n: u8) {
        self.make_writable();
        self.inner.borrow_mut().num_matches = n;
    }

    pub fn sdata_handles(&self) -> Vec<Handle> {
        self.inner.borrow().sdata_handles.clone()
    }

    pub fn alloc_sdata(&self) -> u8 {
        self.inner.borrow().alloc_sdata
    }

    /// Registers `handle` as carrying a structured-data value. The handle
    /// must already be flagged `SDATA` in the registry; `num_sdata` (the
    /// live handle count) must never exceed `alloc_sdata` (the reserved
    /// wire slot count), matching the specification's invariant.
    pub fn add_sdata_handle(&mut self, registry: &NameRegistry, handle: Handle) -> Result<(), MessageError> {
        if !registry.is_sdata(handle) {
            registry.set_flags(handle, HandleFlags::SDATA);
        }
        self.make_writable();
        let mut inner = self.inner.borrow_mut();
        if inner.sdata_handles.contains(&handle) {
            return Ok(());
        }
        let new_len = inner.sdata_handles.len() + 1;
        if new_len > u8::MAX as usize {
            return Err(MessageError::SdataOverflow(new_len as u8, inner.alloc_sdata));
        }
        if new_len as u8 > inner.alloc_sdata {
            inner.alloc_sdata = new_len as u8;
        }
        inner.sdata_handles.push(handle);
        Ok(())
    }

    /// Sets `alloc_sdata` directly (used by the deserializer, which must
    /// preserve the producer's reserved slot count even if fewer handles
    /// are presently live).
    pub(crate) fn set_alloc_sdata_raw(&mut self, alloc_sdata: u8) -> Result<(), MessageError> {
        self.make_writable();
        let mut inner = self.inner.borrow_mut();
        if inner.sdata_handles.len() > alloc_sdata as usize {
            return Err(MessageError::SdataOverflow(inner.sdata_handles.len() as u8, alloc_sdata));
        }
        inner.alloc_sdata = alloc_sdata;
        Ok(())
    }

    pub(crate) fn set_sdata_handles_raw(&mut self, handles: Vec<Handle>) -> Result<(), MessageError> {
        if handles.len() > u8::MAX as usize {
            return Err(MessageError::SdataOverflow(handles.len() as u8, self.alloc_sdata()));
        }
        self.make_writable();
        let mut inner = self.inner.borrow_mut();
        inner.alloc_sdata = inner.alloc_sdata.max(handles.len() as u8);
        inner.sdata_handles = handles;
        Ok(())
    }

    pub fn payload(&self) -> NvTable {
        self.inner.borrow().payload.clone()
    }

    pub fn set_payload(&mut self, payload: NvTable) {
        self.make_writable();
        self.inner.borrow_mut().payload = payload;
    }

    /// Looks up a static field by its well-known registry name and returns
    /// its current value, if set.
    pub fn get_field(&self, registry: &NameRegistry, name: &str) -> Option<Vec<u8>> {
        let handle = registry.get_handle(name)?;
        self.inner.borrow().payload.get(handle)
    }

    pub fn set_field(&mut self, registry: &NameRegistry, name: &str, value: &[u8]) -> Result<(), MessageError> {
        let handle = registry.allocate_handle(name);
        self.make_writable();
        let mut inner = self.inner.borrow_mut();
        inner.payload.set(handle, name, value)?;
        Ok(())
    }

    pub(crate) fn from_raw_parts(
        rcptid: u64,
        flags: u32,
        pri: u16,
        source_addr: SourceAddr,
        stamps: [LogStamp; 3],
        host_id: u32,
        tags: TagSet,
        initial_parse: bool,
        num_matches: u8,
        alloc_sdata: u8,
        sdata_handles: Vec<Handle>,
        payload: NvTable,
    ) -> Self {
        Self {
            inner: Arc::new(RefCell::new(LogMessageInner {
                rcptid,
                flags,
                pri,
                source_addr,
                stamps,
                host_id,
                tags,
                initial_parse,
                num_matches,
                sdata_handles,
                alloc_sdata,
                payload,
            })),
        }
    }

    pub(crate) fn snapshot(&self) -> LogMessageSnapshot {
        let inner = self.inner.borrow();
        LogMessageSnapshot {
            rcptid: inner.rcptid,
            flags: inner.flags,
            pri: inner.pri,
            source_addr: inner.source_addr.clone(),
            stamps: inner.stamps,
            host_id: inner.host_id,
            tags: inner.tags.clone(),
            initial_parse: inner.initial_parse,
            num_matches: inner.num_matches,
            alloc_sdata: inner.alloc_sdata,
            sdata_handles: inner.sdata_handles.clone(),
            payload: inner.payload.clone(),
        }
    }
}

/// An owned, borrow-free view of a message's fields — what `serialize`
/// actually walks when freezing a message to bytes.
pub(crate) struct LogMessageSnapshot {
    pub rcptid: u64,
    pub flags: u32,
    pub pri: u16,
    pub source_addr: SourceAddr,
    pub stamps: [LogStamp; 3],
    pub host_id: u32,
    pub tags: TagSet,
    pub initial_parse: bool,
    pub num_matches: u8,
    pub alloc_sdata: u8,
    pub sdata_handles: Vec<Handle>,
    pub payload: NvTable,
}
