//! Monitor lookup cache for objects without an embedded lock word.
//!
//! Objects whose class was not given a lock word slot are locked through a word allocated by
//! the fallback. Finding that word is a slow operation, so each thread context keeps a small
//! direct-mapped cache from object identity to [`LockWordHandle`].
//!
//! # Structure
//!
//! The cache has [`CACHE_SIZE`] lines. A line packs the object identity into its upper 32
//! bits and the handle into its lower 32 bits, so a line is read and written with a single
//! atomic operation. Concurrent resolutions of objects that map to the same line can only
//! overwrite each other's entries, never tear them; the loser simply pays for one more
//! fallback lookup later.
//!
//! An all-zero line is empty: object identities are never zero.
//!
//! # Fallback Binding
//!
//! Handles are only valid for the fallback that issued them. The first resolution binds the
//! cache to its fallback for good, and resolutions through any other fallback go straight
//! to that fallback without reading or filling a line. A thread that locks through several
//! fallbacks therefore only caches the words of the first one.
//!
//! # Example
//!
//! ```rust
//! use lockword::prelude::*;
//!
//! let registry = ThreadRegistry::new();
//! let fallback = BackoffFallback::new(registry.clone());
//! let heap = ObjectHeap::new();
//! let object = heap.allocate(ClassInfo::without_lockword("java.lang.String"));
//!
//! let cache = MonitorLookupCache::new();
//! let first = cache.resolve(&object, &fallback);
//! let second = cache.resolve(&object, &fallback);
//! assert_eq!(first, second);
//! ```

use std::{
    fmt,
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    gateway::{FallbackId, MonitorFallback},
    lockword::LockWordHandle,
    object::{ManagedObject, ObjectId},
};

/// Number of lines in a [`MonitorLookupCache`].
pub const CACHE_SIZE: usize = 32;

const INDEX_BITS: u32 = CACHE_SIZE.trailing_zeros();

/// Fixed-size, hash-indexed cache of external lock word handles.
pub struct MonitorLookupCache {
    owner: AtomicU64,
    lines: [AtomicU64; CACHE_SIZE],
}

impl MonitorLookupCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            owner: AtomicU64::new(0),
            lines: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Returns the fallback whose handles this cache holds, if any resolution happened yet.
    #[must_use]
    pub fn bound_to(&self) -> Option<FallbackId> {
        NonZeroU64::new(self.owner.load(Ordering::Acquire)).map(FallbackId)
    }

    fn bind(&self, fallback: FallbackId) -> bool {
        match self.owner.compare_exchange(0, fallback.value(), Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => true,
            Err(current) => current == fallback.value(),
        }
    }

    /// Line an object identity maps to.
    #[must_use]
    pub fn line_index(id: ObjectId) -> usize {
        let hash = u64::from(id.value()).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        (hash >> (u64::BITS - INDEX_BITS)) as usize
    }

    fn pack(id: ObjectId, handle: LockWordHandle) -> u64 {
        (u64::from(id.value()) << 32) | u64::from(handle.value())
    }

    /// Returns the cached handle for `id` without consulting the fallback.
    ///
    /// The handle belongs to the fallback reported by [`MonitorLookupCache::bound_to`].
    #[must_use]
    pub fn lookup(&self, id: ObjectId) -> Option<LockWordHandle> {
        let line = self.lines[Self::line_index(id)].load(Ordering::Acquire);
        ((line >> 32) as u32 == id.value()).then_some(LockWordHandle(line as u32))
    }

    /// Returns the handle of the external lock word of `object`.
    ///
    /// On a miss, or when the line holds another object, the handle is obtained from
    /// `fallback` and written to the line, evicting its previous occupant. If the cache is
    /// bound to a different fallback, the handle is obtained from `fallback` and not cached.
    pub fn resolve<F>(&self, object: &ManagedObject, fallback: &F) -> LockWordHandle
    where
        F: MonitorFallback + ?Sized,
    {
        let id = object.id();
        if !self.bind(fallback.instance_id()) {
            return fallback.resolve_or_create_external_slot(object);
        }
        if let Some(handle) = self.lookup(id) {
            return handle;
        }

        let handle = fallback.resolve_or_create_external_slot(object);
        self.lines[Self::line_index(id)].store(Self::pack(id, handle), Ordering::Release);
        log::trace!("monitor cache fill: {id} -> {handle}");
        handle
    }

    /// Drops the entry for `id`, if present.
    pub fn invalidate(&self, id: ObjectId) {
        let line = &self.lines[Self::line_index(id)];
        let current = line.load(Ordering::Acquire);
        if (current >> 32) as u32 == id.value() {
            // A concurrent fill of the same line wins; it is a valid entry either way.
            let _ = line.compare_exchange(current, 0, Ordering::AcqRel, Ordering::Relaxed);
        }
    }

    /// Empties every line. The cache stays bound to its fallback.
    pub fn clear(&self) {
        for line in &self.lines {
            line.store(0, Ordering::Release);
        }
    }

    /// Number of occupied lines.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| line.load(Ordering::Relaxed) != 0)
            .count()
    }
}

impl Default for MonitorLookupCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MonitorLookupCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorLookupCache")
            .field("bound_to", &self.bound_to())
            .field("occupied", &self.occupied())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        object::{ClassInfo, ObjectHeap},
        test::{colliding_ids, CountingFallback},
    };

    #[test]
    fn test_line_index_in_range() {
        for raw in 1..1000 {
            let id = ObjectId::new(raw).unwrap();
            assert!(MonitorLookupCache::line_index(id) < CACHE_SIZE);
        }
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let fallback = CountingFallback::default();
        let heap = ObjectHeap::new();
        let object = heap.allocate(ClassInfo::without_lockword("java.lang.String"));
        let cache = MonitorLookupCache::new();

        let first = cache.resolve(&object, &fallback);
        let second = cache.resolve(&object, &fallback);

        assert_eq!(first, second);
        assert_eq!(fallback.calls().resolve, 1);
        assert_eq!(cache.lookup(object.id()), Some(first));
        assert_eq!(cache.occupied(), 1);
    }

    #[test]
    fn test_eviction_re_resolves() {
        let fallback = CountingFallback::default();
        let heap = ObjectHeap::new();
        let class = ClassInfo::without_lockword("java.lang.String");
        let (a_id, b_id) = colliding_ids();
        let a = heap.allocate_with_id(a_id, class.clone());
        let b = heap.allocate_with_id(b_id, class);
        let cache = MonitorLookupCache::new();

        let a_handle = cache.resolve(&a, &fallback);
        let b_handle = cache.resolve(&b, &fallback);
        assert_ne!(a_handle, b_handle);
        assert_eq!(cache.lookup(a.id()), None);

        // The fallback hands out the same slot again, so eviction only costs a lookup.
        assert_eq!(cache.resolve(&a, &fallback), a_handle);
        assert_eq!(fallback.calls().resolve, 3);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let fallback = CountingFallback::default();
        let heap = ObjectHeap::new();
        let object = heap.allocate(ClassInfo::without_lockword("X"));
        let cache = MonitorLookupCache::new();

        cache.resolve(&object, &fallback);
        cache.invalidate(object.id());
        assert_eq!(cache.lookup(object.id()), None);

        cache.resolve(&object, &fallback);
        cache.clear();
        assert_eq!(cache.occupied(), 0);
    }

    #[test]
    fn test_other_fallback_bypasses_lines() {
        let first = CountingFallback::default();
        let second = CountingFallback::default();
        let heap = ObjectHeap::new();
        let class = ClassInfo::without_lockword("java.lang.String");
        let x = heap.allocate(class.clone());
        let y = heap.allocate(class);
        let cache = MonitorLookupCache::new();

        // Both fallbacks hand out slot 0 first, to different objects.
        let y_second = second.resolve_or_create_external_slot(&y);
        let x_first = cache.resolve(&x, &first);
        assert_eq!(x_first, y_second);
        assert_eq!(cache.bound_to(), Some(first.instance_id()));

        let x_second = cache.resolve(&x, &second);
        assert_ne!(x_second, x_first);
        assert_eq!(cache.resolve(&x, &second), x_second);
        assert_eq!(second.calls().resolve, 3);

        assert_eq!(cache.lookup(x.id()), Some(x_first));
        assert_eq!(cache.resolve(&x, &first), x_first);
        assert_eq!(first.calls().resolve, 1);
        assert_eq!(cache.occupied(), 1);
    }

    #[test]
    fn test_clear_keeps_binding() {
        let fallback = CountingFallback::default();
        let heap = ObjectHeap::new();
        let object = heap.allocate(ClassInfo::without_lockword("X"));
        let cache = MonitorLookupCache::new();
        assert_eq!(cache.bound_to(), None);

        cache.resolve(&object, &fallback);
        cache.clear();
        assert_eq!(cache.bound_to(), Some(fallback.instance_id()));
    }

    #[test]
    fn test_concurrent_fills_never_tear() {
        let fallback = Arc::new(CountingFallback::default());
        let heap = ObjectHeap::new();
        let class = ClassInfo::without_lockword("X");
        let (a_id, b_id) = colliding_ids();
        let a = heap.allocate_with_id(a_id, class.clone());
        let b = heap.allocate_with_id(b_id, class);
        let cache = Arc::new(MonitorLookupCache::new());

        let expected_a = fallback.resolve_or_create_external_slot(&a);
        let expected_b = fallback.resolve_or_create_external_slot(&b);

        let handles: Vec<_> = [a, b]
            .into_iter()
            .map(|object| {
                let cache = Arc::clone(&cache);
                let fallback = Arc::clone(&fallback);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        let _ = cache.resolve(&object, fallback.as_ref());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Whoever won the line, the entry pairs the right identity with the right handle.
        match (cache.lookup(a_id), cache.lookup(b_id)) {
            (Some(h), None) => assert_eq!(h, expected_a),
            (None, Some(h)) => assert_eq!(h, expected_b),
            other => panic!("line holds an inconsistent entry: {:?}", other),
        }
    }
}
