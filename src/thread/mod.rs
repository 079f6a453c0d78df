//! Thread contexts and their registry.
//!
//! Every thread that locks objects does so through a [`ThreadContext`]. The context is passed
//! explicitly into every enter and exit call instead of being looked up from ambient
//! thread-local state, which keeps the protocols testable with simulated threads.
//!
//! # Contents of a Context
//!
//! - **Owner tag**: the bit pattern written into lock words this thread owns
//! - **Owned monitor count**: number of monitor acquisitions not yet released, recursion
//!   included
//! - **Monitor lookup cache**: per-thread cache of external lock word handles
//! - **Revocation requests**: objects whose reservation another thread wants cancelled
//!
//! # Reservation Revocation
//!
//! While a lock word is reserved for a thread, that thread updates it with plain stores.
//! No other thread may therefore write the word. A contender instead queues a revocation
//! request on the reserving thread's context; the reserving thread notices the request on
//! its next monitor operation and rewrites its own words. The [`ThreadRegistry`] is how a
//! contender finds the context behind an owner tag, and how it learns that the reserving
//! thread has detached, in which case the word may be reclaimed directly.
//!
//! # Example
//!
//! ```rust
//! use lockword::ThreadRegistry;
//!
//! let registry = ThreadRegistry::new();
//! let main = registry.attach();
//! let worker = registry.attach();
//!
//! assert_ne!(main.tag(), worker.tag());
//! assert_eq!(registry.len(), 2);
//!
//! drop(worker);
//! assert_eq!(registry.len(), 1);
//! ```

use std::{
    cell::Cell,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
};

use dashmap::DashMap;

use crate::{
    cache::MonitorLookupCache,
    lockword::OwnerTag,
    object::{ManagedObject, ObjectRef},
    Result,
};

/// State of a thread context that other threads may reach through the registry.
pub(crate) struct ThreadShared {
    tag: OwnerTag,
    revocation_pending: AtomicBool,
    revocations: Mutex<Vec<ObjectRef>>,
}

impl ThreadShared {
    fn new(tag: OwnerTag) -> Self {
        Self {
            tag,
            revocation_pending: AtomicBool::new(false),
            revocations: Mutex::new(Vec::new()),
        }
    }

    /// Asks the owning thread to cancel its reservation of `object`.
    ///
    /// Requests for an object that is already queued are merged.
    pub(crate) fn request_revocation(&self, object: &ObjectRef) -> Result<()> {
        let mut queue = lock!(self.revocations);
        if !queue.iter().any(|queued| queued.id() == object.id()) {
            queue.push(Arc::clone(object));
        }
        self.revocation_pending.store(true, Ordering::Release);
        Ok(())
    }
}

/// Registry handing out thread contexts with unique owner tags.
pub struct ThreadRegistry {
    next_index: AtomicU64,
    threads: DashMap<OwnerTag, Weak<ThreadShared>>,
}

impl ThreadRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_index: AtomicU64::new(1),
            threads: DashMap::new(),
        })
    }

    /// Creates a context for a new thread.
    ///
    /// Tags are never reused, so a word left behind by a detached thread can not be mistaken
    /// for one owned by a later thread.
    ///
    /// # Panics
    ///
    /// Panics once the owner tag space is exhausted.
    #[must_use]
    pub fn attach(self: &Arc<Self>) -> ThreadContext {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let tag = OwnerTag::from_index(index).expect("owner tag space exhausted");
        let shared = Arc::new(ThreadShared::new(tag));
        self.threads.insert(tag, Arc::downgrade(&shared));
        log::debug!("attached {tag}");

        ThreadContext {
            shared,
            registry: Arc::clone(self),
            owned_monitors: Cell::new(0),
            cache: MonitorLookupCache::new(),
        }
    }

    /// `true` while the thread owning `tag` is attached.
    #[must_use]
    pub fn is_attached(&self, tag: OwnerTag) -> bool {
        self.lookup(tag).is_some()
    }

    /// Number of attached threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// `true` if no thread is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub(crate) fn lookup(&self, tag: OwnerTag) -> Option<Arc<ThreadShared>> {
        self.threads.get(&tag).and_then(|entry| entry.upgrade())
    }

    fn detach(&self, tag: OwnerTag) {
        self.threads.remove(&tag);
        log::debug!("detached {tag}");
    }
}

impl fmt::Debug for ThreadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRegistry")
            .field("attached", &self.len())
            .finish()
    }
}

/// Per-thread locking state.
///
/// A context belongs to exactly one thread: it can be moved to the thread that uses it but
/// not shared between threads. Dropping it detaches the thread from its registry.
pub struct ThreadContext {
    shared: Arc<ThreadShared>,
    registry: Arc<ThreadRegistry>,
    owned_monitors: Cell<usize>,
    cache: MonitorLookupCache,
}

impl ThreadContext {
    /// Returns the tag written into lock words this thread owns.
    #[must_use]
    pub fn tag(&self) -> OwnerTag {
        self.shared.tag
    }

    /// Number of monitor acquisitions by this thread that have not been released.
    ///
    /// Every successful enter adds one and every successful exit subtracts one, whether or
    /// not the operation was reentrant and whether or not it took the fast path.
    #[must_use]
    pub fn owned_monitor_count(&self) -> usize {
        self.owned_monitors.get()
    }

    /// Returns this thread's monitor lookup cache.
    #[must_use]
    pub fn cache(&self) -> &MonitorLookupCache {
        &self.cache
    }

    /// Returns the registry this context was attached to.
    #[must_use]
    pub fn registry(&self) -> &Arc<ThreadRegistry> {
        &self.registry
    }

    /// `true` if another thread asked this thread to cancel one of its reservations.
    #[must_use]
    pub fn revocation_pending(&self) -> bool {
        self.shared.revocation_pending.load(Ordering::Acquire)
    }

    /// Removes and returns all queued revocation requests.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LockError`] if the request queue was poisoned.
    pub fn take_revocations(&self) -> Result<Vec<ObjectRef>> {
        let mut queue = lock!(self.shared.revocations);
        self.shared.revocation_pending.store(false, Ordering::Release);
        Ok(std::mem::take(&mut *queue))
    }

    pub(crate) fn monitor_entered(&self) {
        self.owned_monitors.set(self.owned_monitors.get() + 1);
    }

    pub(crate) fn monitor_exited(&self, object: &ManagedObject) {
        let count = self.owned_monitors.get();
        debug_assert!(
            count > 0,
            "{} released {} without holding any monitor",
            self.tag(),
            object.id()
        );
        self.owned_monitors.set(count.saturating_sub(1));
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        if self.owned_monitors.get() > 0 {
            log::warn!(
                "{} detached while holding {} monitor(s)",
                self.tag(),
                self.owned_monitors.get()
            );
        }
        self.registry.detach(self.tag());
    }
}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("tag", &self.tag())
            .field("owned_monitors", &self.owned_monitors.get())
            .field("revocation_pending", &self.revocation_pending())
            .finish()
    }
}
