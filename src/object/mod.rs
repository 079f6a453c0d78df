//! Lockable heap objects.
//!
//! The protocols only need three things from an object: its identity, its class, and where
//! its lock word lives. This module provides a minimal object model carrying exactly that.
//!
//! # Lock Word Placement
//!
//! Instances of classes flagged [`ClassFlags::EMBEDDED_LOCKWORD`] carry their own
//! [`LockWordCell`]. All other instances are locked through an externally allocated word
//! that the [`crate::MonitorLookupCache`] resolves by object identity.
//!
//! # Object References
//!
//! Objects are shared as [`ObjectRef`] (`Arc<ManagedObject>`). Identities are handed out by
//! an [`ObjectHeap`] and are never reused, so they remain valid keys for the lifetime of the
//! heap (no garbage collection is simulated).
//!
//! # Example
//!
//! ```rust
//! use lockword::object::{ClassInfo, ObjectHeap};
//!
//! let heap = ObjectHeap::new();
//! let with_word = heap.allocate(ClassInfo::with_lockword("java.lang.Object"));
//! let without_word = heap.allocate(ClassInfo::without_lockword("java.lang.String"));
//!
//! assert!(with_word.embedded_lock_word().is_some());
//! assert!(without_word.embedded_lock_word().is_none());
//! assert_ne!(with_word.id(), without_word.id());
//! ```

mod class;

use std::{
    fmt,
    num::NonZeroU32,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

pub use class::{ClassFlags, ClassInfo, ClassRc};

use crate::lockword::LockWordCell;

/// Identity of a heap object.
///
/// Identities are non-zero so that `0` can mark an empty line in the lookup cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(NonZeroU32);

impl ObjectId {
    /// Creates an identity from its raw value, or `None` for zero.
    #[must_use]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    /// Returns the raw identity value.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({})", self.0)
    }
}

/// A reference-counted pointer to a [`ManagedObject`].
pub type ObjectRef = Arc<ManagedObject>;

/// A lockable heap object.
pub struct ManagedObject {
    id: ObjectId,
    class: ClassRc,
    lock_word: Option<LockWordCell>,
}

impl ManagedObject {
    /// Creates an object of `class` with identity `id`.
    ///
    /// The embedded lock word is present iff the class declares one.
    #[must_use]
    pub fn new(id: ObjectId, class: ClassRc) -> Self {
        let lock_word = class.has_embedded_lockword().then(LockWordCell::new);
        Self {
            id,
            class,
            lock_word,
        }
    }

    /// Returns the object's identity.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Returns the object's class.
    #[must_use]
    pub fn class(&self) -> &ClassRc {
        &self.class
    }

    /// Returns the embedded lock word, if the class declares one.
    #[must_use]
    pub fn embedded_lock_word(&self) -> Option<&LockWordCell> {
        self.lock_word.as_ref()
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedObject")
            .field("id", &self.id)
            .field("class", &self.class.name())
            .field("lock_word", &self.lock_word)
            .finish()
    }
}

/// Allocator of object identities.
///
/// Stands in for the runtime's allocator: it only guarantees that every object it creates
/// has a distinct identity.
#[derive(Debug)]
pub struct ObjectHeap {
    next_id: AtomicU32,
}

impl ObjectHeap {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
        }
    }

    /// Allocates a new instance of `class`.
    ///
    /// # Panics
    ///
    /// Panics once the identity space is exhausted.
    #[must_use]
    pub fn allocate(&self, class: ClassRc) -> ObjectRef {
        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = ObjectId::new(raw).expect("object identity space exhausted");
        Arc::new(ManagedObject::new(id, class))
    }

    /// Allocates an instance of `class` with a caller-chosen identity.
    ///
    /// Useful to force two objects onto the same lookup cache line. The heap does not check
    /// that `id` is unused.
    #[must_use]
    pub fn allocate_with_id(&self, id: ObjectId, class: ClassRc) -> ObjectRef {
        Arc::new(ManagedObject::new(id, class))
    }
}

impl Default for ObjectHeap {
    fn default() -> Self {
        Self::new()
    }
}
