//! Process-global name ↔ handle registry (C1).
//!
//! Grounded on the teacher's `ConfigManager` (`shared: Arc<RwLock<Config>>`,
//! readers never block writers for long): this registry is a
//! `std::sync::RwLock`-guarded table, amortizing growth with an
//! append-only `Vec<Arc<str>>` name arena. Cloning an `Arc<str>` out of the
//! table costs a refcount bump, not a reallocation, so returned names stay
//! valid for the life of the process regardless of later growth — the
//! "never invalidate a returned name pointer" requirement, translated into
//! safe Rust.

use std::sync::{OnceLock, RwLock};

use rustc_hash::FxHashMap;

/// A numeric identifier for a name string. Handle `0` is reserved: it is
/// never allocated to a real name and `get_name` on it returns the literal
/// `"None"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Handle(pub u32);

impl Handle {
    pub const NONE: Handle = Handle(0);

    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

/// Per-handle flag word. Hand-rolled rather than pulling in the `bitflags`
/// crate (only `messense-llvm-bitcode-rs` in the wider retrieval pack uses
/// it, for an unrelated bitcode reader) — two flag bits don't warrant a new
/// dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleFlags(pub u16);

impl HandleFlags {
    /// This name carries structured-data (SDATA) values.
    pub const SDATA: HandleFlags = HandleFlags(0x0001);
    /// This handle participates in pattern-match substring capture.
    pub const MATCH: HandleFlags = HandleFlags(0x0002);

    #[inline]
    pub fn contains(self, other: HandleFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: HandleFlags) {
        self.0 |= other.0;
    }

    #[inline]
    pub fn remove(&mut self, other: HandleFlags) {
        self.0 &= !other.0;
    }
}

/// Static (well-known) field names pre-registered at construction time.
/// Their handle order defines `num_static`.
pub const STATIC_FIELDS: &[&str] = &["HOST", "HOST_FROM", "PROGRAM", "PID", "MESSAGE", "SOURCE", "LEGACY_MSGHDR"];

/// Handles below this value (and at least 1) are reserved for pattern-match
/// capture groups (`\1`, `\2`, ... equivalents upstream). This workspace
/// does not implement the pattern-matching engine (out of scope per the
/// specification), but the reserved range is still part of the handle
/// numbering contract so a future matcher can claim it without colliding
/// with application-registered names.
pub const MATCH_HANDLE_MAX: u32 = 255;

struct Inner {
    names: Vec<std::sync::Arc<str>>,
    flags: Vec<HandleFlags>,
    by_name: FxHashMap<std::sync::Arc<str>, u32>,
    num_static: u32,
}

/// The process-wide name registry (C1).
pub struct NameRegistry {
    inner: RwLock<Inner>,
}

impl NameRegistry {
    /// Builds a fresh registry with the static fields pre-registered.
    pub fn new() -> Self {
        let mut names = Vec::with_capacity(STATIC_FIELDS.len());
        let mut flags = Vec::with_capacity(STATIC_FIELDS.len());
        let mut by_name = FxHashMap::default();
        for (i, name) in STATIC_FIELDS.iter().enumerate() {
            let arc: std::sync::Arc<str> = std::sync::Arc::from(*name);
            by_name.insert(arc.clone(), (i + 1) as u32);
            names.push(arc);
            flags.push(HandleFlags::default());
        }
        let num_static = STATIC_FIELDS.len() as u32;
        Self {
            inner: RwLock::new(Inner {
                names,
                flags,
                by_name,
                num_static,
            }),
        }
    }

    /// The process-wide default instance, for call sites that don't thread
    /// an explicit registry through (most constructors in this crate accept
    /// `&NameRegistry` explicitly; this exists for convenience call sites
    /// like `main.rs` and tests).
    pub fn global() -> &'static NameRegistry {
        static GLOBAL: OnceLock<NameRegistry> = OnceLock::new();
        GLOBAL.get_or_init(NameRegistry::new)
    }

    /// Number of statically-numbered handles (`handle <= num_static` ⇒
    /// static slot).
    pub fn num_static(&self) -> u32 {
        self.inner.read().unwrap().num_static
    }

    /// Returns the existing handle for `name`, or allocates the next free
    /// one. Handle allocation is process-wide and monotonic.
    pub fn allocate_handle(&self, name: &str) -> Handle {
        if let Some(h) = self.get_handle(name) {
            return h;
        }
        let mut guard = self.inner.write().unwrap();
        // Re-check under the write lock: another writer may have raced us.
        if let Some(&id) = guard.by_name.get(name) {
            return Handle(id);
        }
        let arc: std::sync::Arc<str> = std::sync::Arc::from(name);
        let id = (guard.names.len() + 1) as u32;
        guard.by_name.insert(arc.clone(), id);
        guard.names.push(arc);
        guard.flags.push(HandleFlags::default());
        Handle(id)
    }

    /// Looks up the handle for `name` without allocating.
    pub fn get_handle(&self, name: &str) -> Option<Handle> {
        let guard = self.inner.read().unwrap();
        guard.by_name.get(name).map(|&id| Handle(id))
    }

    /// Returns the name (and its byte length) for `handle`, or `None` if the
    /// handle was never allocated. Handle `0` returns the literal `"None"`.
    pub fn get_name(&self, handle: Handle) -> Option<(std::sync::Arc<str>, usize)> {
        if handle.is_none() {
            let none: std::sync::Arc<str> = std::sync::Arc::from("None");
            let len = none.len();
            return Some((none, len));
        }
        let guard = self.inner.read().unwrap();
        let idx = (handle.0 - 1) as usize;
        guard.names.get(idx).map(|n| (n.clone(), n.len()))
    }

    /// Iterates every allocated `(handle, name, flags)` triple.
    pub fn iter(&self, mut callback: impl FnMut(Handle, &str, HandleFlags)) {
        let guard = self.inner.read().unwrap();
        for (i, name) in guard.names.iter().enumerate() {
            callback(Handle((i + 1) as u32), name, guard.flags[i]);
        }
    }

    pub fn is_sdata(&self, handle: Handle) -> bool {
        self.get_flags(handle).contains(HandleFlags::SDATA)
    }

    pub fn get_flags(&self, handle: Handle) -> HandleFlags {
        if handle.is_none() {
            return HandleFlags::default();
        }
        let guard = self.inner.read().unwrap();
        guard
            .flags
            .get((handle.0 - 1) as usize)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_flags(&self, handle: Handle, flags: HandleFlags) {
        if handle.is_none() {
            return;
        }
        let mut guard = self.inner.write().unwrap();
        if let Some(slot) = guard.flags.get_mut((handle.0 - 1) as usize) {
            *slot = flags;
        }
    }

    /// Reserved handle range used for pattern-match substring captures.
    pub fn is_match_handle(&self, handle: Handle) -> bool {
        handle.0 > 0 && handle.0 <= MATCH_HANDLE_MAX
    }
}

impl Default for NameRegistry {
    fn default() -> Self {
        Self::new()
    }
}
