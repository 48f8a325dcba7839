//! Extensible small-integer tag bitset attached to every `LogMessage`.
//!
//! Grounded on the teacher's `ScanCache` growable-Vec-of-slots pattern
//! (`shared/src/cache.rs`): tags are dense small integers allocated from a
//! process-global name table (mirroring the handle registry's own
//! allocate-on-first-use shape), and the per-message storage is a `Vec<u64>`
//! of bitset words that grows lazily as higher tag numbers get set.

use std::sync::{OnceLock, RwLock};

use rustc_hash::FxHashMap;

/// Process-wide tag name ↔ small-integer table, separate from the name
/// registry (C1) since tags and field names are different namespaces.
pub struct TagRegistry {
    inner: RwLock<TagRegistryInner>,
}

struct TagRegistryInner {
    names: Vec<std::sync::Arc<str>>,
    by_name: FxHashMap<std::sync::Arc<str>, u32>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TagRegistryInner {
                names: Vec::new(),
                by_name: FxHashMap::default(),
            }),
        }
    }

    pub fn global() -> &'static TagRegistry {
        static GLOBAL: OnceLock<TagRegistry> = OnceLock::new();
        GLOBAL.get_or_init(TagRegistry::new)
    }

    /// Returns the tag id for `name`, allocating a fresh one if needed.
    pub fn allocate(&self, name: &str) -> u32 {
        {
            let guard = self.inner.read().unwrap();
            if let Some(&id) = guard.by_name.get(name) {
                return id;
            }
        }
        let mut guard = self.inner.write().unwrap();
        if let Some(&id) = guard.by_name.get(name) {
            return id;
        }
        let arc: std::sync::Arc<str> = std::sync::Arc::from(name);
        let id = guard.names.len() as u32;
        guard.by_name.insert(arc.clone(), id);
        guard.names.push(arc);
        id
    }

    pub fn name_of(&self, tag: u32) -> Option<std::sync::Arc<str>> {
        self.inner.read().unwrap().names.get(tag as usize).cloned()
    }
}

impl Default for TagRegistry {
    fn default() -> Self {
        Self::new()
    }
}

const BITS_PER_WORD: u32 = 64;

/// A growable bitset of tag ids, cloned along with `LogMessage`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    words: Vec<u64>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn word_index(tag: u32) -> usize {
        (tag / BITS_PER_WORD) as usize
    }

    fn bit_mask(tag: u32) -> u64 {
        1u64 << (tag % BITS_PER_WORD)
    }

    pub fn set(&mut self, tag: u32) {
        let idx = Self::word_index(tag);
        if idx >= self.words.len() {
            self.words.resize(idx + 1, 0);
        }
        self.words[idx] |= Self::bit_mask(tag);
    }

    pub fn clear(&mut self, tag: u32) {
        if let Some(word) = self.words.get_mut(Self::word_index(tag)) {
            *word &= !Self::bit_mask(tag);
        }
    }

    pub fn is_set(&self, tag: u32) -> bool {
        self.words
            .get(Self::word_index(tag))
            .map(|w| w & Self::bit_mask(tag) != 0)
            .unwrap_or(false)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            (0..BITS_PER_WORD).filter_map(move |bit| {
                let tag = wi as u32 * BITS_PER_WORD + bit;
                (word & (1u64 << bit) != 0).then_some(tag)
            })
        })
    }

    /// Named convenience built on top of `TagRegistry::global()`.
    pub fn set_named(&mut self, name: &str) {
        self.set(TagRegistry::global().allocate(name));
    }

    pub fn is_set_named(&self, name: &str) -> bool {
        match TagRegistry::global().inner.read().unwrap().by_name.get(name) {
            Some(&id) => self.is_set(id),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_check() {
        let mut t = TagSet::new();
        t.set(3);
        t.set(70);
        assert!(t.is_set(3));
        assert!(t.is_set(70));
        assert!(!t.is_set(4));
    }

    #[test]
    fn clear_resets_bit() {
        let mut t = TagSet::new();
        t.set(5);
        t.clear(5);
        assert!(!t.is_set(5));
    }

    #[test]
    fn iter_yields_all_set_tags() {
        let mut t = TagSet::new();
        for tag in [0, 1, 63, 64, 128] {
            t.set(tag);
        }
        let mut collected: Vec<u32> = t.iter().collect();
        collected.sort_unstable();
        assert_eq!(collected, vec![0, 1, 63, 64, 128]);
    }

    #[test]
    fn registry_allocation_is_stable() {
        let reg = TagRegistry::new();
        let a = reg.allocate("important");
        let b = reg.allocate("important");
        assert_eq!(a, b);
        assert_eq!(reg.name_of(a).unwrap().as_ref(), "important");
    }
}
