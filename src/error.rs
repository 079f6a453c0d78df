use thiserror::Error;

use crate::{lockword::OwnerTag, object::ObjectId};

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The fast path itself never produces an error: every failure surfaced to a caller of
/// [`crate::MonitorProtocol::enter`] or [`crate::MonitorProtocol::exit`] originates in the
/// [`crate::MonitorFallback`] the protocol delegated to, and is handed back unchanged.
///
/// # Error Categories
///
/// ## Precondition Violations
/// - [`Error::IllegalMonitorState`] - Locking an instance of a value-based class
///
/// ## Invariant Violations
/// - [`Error::NotOwner`] - Releasing a monitor the calling thread does not hold
/// - [`Error::RecursionLimit`] - The recursion field of the lock word is saturated
/// - [`Error::ForeignThread`] - A thread context from another registry reached the fallback
///
/// ## Fallback Limitations
/// - [`Error::InflatedMonitor`] - The fallback cannot service an inflated word
/// - [`Error::LockError`] - Internal bookkeeping lock was poisoned
///
/// # Examples
///
/// ```rust
/// use lockword::prelude::*;
///
/// let registry = ThreadRegistry::new();
/// let heap = ObjectHeap::new();
/// let protocol = MonitorProtocol::new(BackoffFallback::new(registry.clone()));
///
/// let thread = registry.attach();
/// let value = heap.allocate(ClassInfo::value_based("java.lang.Integer"));
///
/// match protocol.enter(&thread, &value, false) {
///     Err(Error::IllegalMonitorState { .. }) => println!("value-based objects cannot be locked"),
///     other => panic!("unexpected outcome: {:?}", other),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Attempted to lock an instance of a value-based class.
    ///
    /// Instances of classes flagged as value-based have no identity that a monitor could be
    /// attached to. The fast path never touches their lock word and hands them straight to
    /// the fallback, which raises this error.
    ///
    /// # Fields
    ///
    /// * `object` - Identity of the offending object
    /// * `class` - Name of the object's class
    #[error("Illegal monitor state - instances of {class} are value-based and cannot be locked ({object})")]
    IllegalMonitorState {
        /// Identity of the object that was locked
        object: ObjectId,
        /// Name of the value-based class
        class: String,
    },

    /// The calling thread released a monitor it does not own.
    ///
    /// Indicates a defect in the calling runtime: enter and exit calls must be balanced
    /// per thread and per object.
    #[error("Thread does not own the monitor of {0}")]
    NotOwner(ObjectId),

    /// Recursion limit reached.
    ///
    /// The recursion field of the lock word cannot represent another nested acquisition.
    /// The associated value is the maximum nesting depth the word can express.
    #[error("Reached the maximum monitor recursion depth - {0}")]
    RecursionLimit(usize),

    /// The lock word refers to an inflated monitor the fallback does not manage.
    ///
    /// The associated value is the monitor handle stored in the word.
    #[error("Lock word refers to inflated monitor {0:#x}, which this fallback cannot service")]
    InflatedMonitor(u64),

    /// Failed to lock target.
    ///
    /// This error occurs when internal bookkeeping (for example a revocation queue) is
    /// guarded by a mutex that has been poisoned by a panicking thread.
    #[error("Failed to lock target")]
    LockError,

    /// The thread context was attached to a registry other than the fallback's.
    ///
    /// The fallback finds reserving threads through its registry. A thread it can not find
    /// there is treated as detached, and its reserved words could be reclaimed while it
    /// still uses them.
    #[error("{0} is not attached to the fallback's thread registry")]
    ForeignThread(OwnerTag),
}

impl Error {
    /// Returns `true` for errors that signal a defect in the caller rather than a
    /// condition of the locked object.
    #[must_use]
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::NotOwner(_) | Error::RecursionLimit(_) | Error::ForeignThread(_)
        )
    }
}
