//! The interface to the heavyweight monitor subsystem.
//!
//! The fast-path protocols only handle the uncontended cases. Everything else (blocking,
//! inflation, reservation cancellation, error reporting) is the responsibility of a
//! [`MonitorFallback`]. The protocols call it whenever they give up and return its result
//! unchanged.
//!
//! # Implementations
//!
//! - [`BackoffFallback`] - Self-contained fallback that waits with exponential backoff and
//!   cancels reservations cooperatively
//! - [`RecordingFallback`] - Wraps another fallback and counts the calls it receives
//!
//! # Contract
//!
//! A fallback entered on behalf of a thread must leave the lock word in a state consistent
//! with the thread holding the monitor, and an exit must leave it consistent with the thread
//! having released one level of it. The protocols maintain the thread's owned monitor count;
//! a fallback must not.
//!
//! External lock word handles only mean something to the fallback that issued them. Every
//! fallback therefore reports a [`FallbackId`], and a thread's lookup cache only holds handles
//! of a single fallback.

mod backoff;
mod recording;

pub use backoff::BackoffFallback;
pub use recording::{FallbackCalls, RecordingFallback};

use std::{
    fmt,
    num::NonZeroU64,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{
    lockword::{LockWordCell, LockWordHandle},
    object::{ManagedObject, ObjectRef},
    thread::ThreadContext,
    Result,
};

/// Identity of a fallback instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FallbackId(pub(crate) NonZeroU64);

impl FallbackId {
    /// Returns an identity that no earlier call returned.
    #[must_use]
    pub fn unique() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NonZeroU64::MIN.saturating_add(NEXT.fetch_add(1, Ordering::Relaxed)))
    }

    /// Returns the raw identity.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for FallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fallback({})", self.0)
    }
}

/// Slow-path monitor operations.
pub trait MonitorFallback: Send + Sync {
    /// Returns the identity of this fallback.
    ///
    /// Two fallbacks whose external lock word handles may refer to different words must
    /// report different identities. A wrapper that forwards
    /// [`MonitorFallback::external_slot`] reports the identity of the fallback it wraps.
    fn instance_id(&self) -> FallbackId;

    /// Acquires the monitor of `object` for `thread`, blocking as long as necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the monitor cannot be acquired, for example because the object is
    /// an instance of a value-based class.
    fn enter(&self, thread: &ThreadContext, object: &ObjectRef) -> Result<()>;

    /// Releases one level of the monitor of `object` held by `thread`.
    ///
    /// # Errors
    ///
    /// Returns an error if `thread` does not hold the monitor.
    fn exit(&self, thread: &ThreadContext, object: &ObjectRef) -> Result<()>;

    /// Returns the handle of the external lock word of `object`, allocating it on first use.
    ///
    /// Repeated calls for the same object must return the same handle.
    fn resolve_or_create_external_slot(&self, object: &ManagedObject) -> LockWordHandle;

    /// Returns the external lock word behind `handle`.
    ///
    /// # Panics
    ///
    /// May panic if `handle` was not produced by
    /// [`MonitorFallback::resolve_or_create_external_slot`] on this fallback.
    fn external_slot(&self, handle: LockWordHandle) -> &LockWordCell;
}

/// Locates the lock word of `object`.
///
/// Returns the embedded word when the object's class has one, and otherwise the external
/// word found through the calling thread's lookup cache.
pub fn lock_word_of<'a, F>(
    thread: &ThreadContext,
    object: &'a ManagedObject,
    fallback: &'a F,
) -> &'a LockWordCell
where
    F: MonitorFallback + ?Sized,
{
    match object.embedded_lock_word() {
        Some(cell) => cell,
        None => fallback.external_slot(thread.cache().resolve(object, fallback)),
    }
}
