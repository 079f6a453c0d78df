use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    gateway::{FallbackId, MonitorFallback},
    lockword::{LockWordCell, LockWordHandle},
    object::{ManagedObject, ObjectRef},
    thread::ThreadContext,
    Result,
};

/// Number of calls a [`RecordingFallback`] has forwarded, per operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FallbackCalls {
    /// Calls to [`MonitorFallback::enter`].
    pub enter: usize,
    /// Calls to [`MonitorFallback::exit`].
    pub exit: usize,
    /// Calls to [`MonitorFallback::resolve_or_create_external_slot`].
    pub resolve: usize,
}

/// A fallback that forwards to `F` and counts every call.
///
/// Calls are counted before they are forwarded, so a call that blocks inside the inner
/// fallback is already visible.
///
/// # Example
///
/// ```rust
/// use lockword::prelude::*;
///
/// let registry = ThreadRegistry::new();
/// let heap = ObjectHeap::new();
/// let protocol = MonitorProtocol::new(RecordingFallback::new(BackoffFallback::new(
///     registry.clone(),
/// )));
/// let thread = registry.attach();
/// let object = heap.allocate(ClassInfo::with_lockword("java.lang.Object"));
///
/// protocol.enter(&thread, &object, false)?;
/// protocol.exit(&thread, &object, false)?;
/// assert_eq!(protocol.fallback().calls(), FallbackCalls::default());
/// # Ok::<(), lockword::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct RecordingFallback<F> {
    inner: F,
    enter: AtomicUsize,
    exit: AtomicUsize,
    resolve: AtomicUsize,
}

impl<F> RecordingFallback<F> {
    /// Wraps `inner`.
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            enter: AtomicUsize::new(0),
            exit: AtomicUsize::new(0),
            resolve: AtomicUsize::new(0),
        }
    }

    /// Returns the wrapped fallback.
    pub fn inner(&self) -> &F {
        &self.inner
    }

    /// Returns the call counts so far.
    pub fn calls(&self) -> FallbackCalls {
        FallbackCalls {
            enter: self.enter.load(Ordering::Relaxed),
            exit: self.exit.load(Ordering::Relaxed),
            resolve: self.resolve.load(Ordering::Relaxed),
        }
    }
}

impl<F: MonitorFallback> MonitorFallback for RecordingFallback<F> {
    fn instance_id(&self) -> FallbackId {
        self.inner.instance_id()
    }

    fn enter(&self, thread: &ThreadContext, object: &ObjectRef) -> Result<()> {
        self.enter.fetch_add(1, Ordering::Relaxed);
        self.inner.enter(thread, object)
    }

    fn exit(&self, thread: &ThreadContext, object: &ObjectRef) -> Result<()> {
        self.exit.fetch_add(1, Ordering::Relaxed);
        self.inner.exit(thread, object)
    }

    fn resolve_or_create_external_slot(&self, object: &ManagedObject) -> LockWordHandle {
        self.resolve.fetch_add(1, Ordering::Relaxed);
        self.inner.resolve_or_create_external_slot(object)
    }

    fn external_slot(&self, handle: LockWordHandle) -> &LockWordCell {
        self.inner.external_slot(handle)
    }
}
