//! Lock word fast paths.
//!
//! [`MonitorProtocol`] implements monitor enter and exit directly on the lock word for the
//! uncontended cases, and hands everything else to a [`MonitorFallback`]:
//!
//! - [`MonitorProtocol::enter`] - acquire, with a bounded compare-and-swap retry on a free word
//! - [`MonitorProtocol::exit`] - release, optionally leaving the lock reserved for the caller
//! - [`MonitorProtocol::try_enter`] - fast path only, never blocks
//!
//! # Memory Ordering
//!
//! | Transition                              | Operation                  |
//! |-----------------------------------------|----------------------------|
//! | Free to owned                           | CAS, acquire on success    |
//! | Owned to owned, recursion + 1           | CAS, acquire on success    |
//! | Reserved, holds changed while held      | plain store                |
//! | Owned, recursion - 1                    | plain store                |
//! | Last hold released, normal              | CAS to free, release       |
//! | Last hold released, preserving          | release store to reserved  |
//!
//! Plain stores are only issued on words the calling thread holds or has reserved, which no
//! other thread writes.
//!
//! # Thread Accounting
//!
//! Every successful enter adds one to [`ThreadContext::owned_monitor_count`] and every
//! successful exit subtracts one, whether the operation stayed on the fast path or not. A
//! failed delegation leaves the count untouched.
//!
//! # Example
//!
//! ```rust
//! use lockword::prelude::*;
//!
//! let registry = ThreadRegistry::new();
//! let heap = ObjectHeap::new();
//! let protocol = MonitorProtocol::with_config(
//!     BackoffFallback::new(registry.clone()),
//!     LockingConfig::reserving(),
//! );
//! let thread = registry.attach();
//! let object = heap.allocate(ClassInfo::with_lockword("java.lang.Object"));
//!
//! let hint = protocol.reservation_hint(&object);
//! protocol.enter(&thread, &object, hint)?;
//! protocol.exit(&thread, &object, hint)?;
//!
//! // The lock stays biased toward the releasing thread.
//! assert_eq!(
//!     protocol.lock_state(&thread, &object),
//!     LockState::Reserved { owner: thread.tag(), holds: 0 }
//! );
//! # Ok::<(), lockword::Error>(())
//! ```

mod enter;
mod exit;

use crate::{
    config::LockingConfig,
    gateway::{lock_word_of, MonitorFallback},
    lockword::{LockState, LockWordCell},
    object::{ManagedObject, ObjectRef},
    stats::{DelegationReason, FastPathStats},
    thread::ThreadContext,
    Result,
};

/// Outcome of a fast-path attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FastPath {
    /// The operation completed on the lock word.
    Done,
    /// The operation must be handed to the fallback.
    Delegate(DelegationReason),
}

/// Monitor enter and exit over lock words.
pub struct MonitorProtocol<F: MonitorFallback> {
    fallback: F,
    config: LockingConfig,
    stats: FastPathStats,
}

impl<F: MonitorFallback> MonitorProtocol<F> {
    /// Creates a protocol delegating to `fallback`, with the default configuration.
    pub fn new(fallback: F) -> Self {
        Self::with_config(fallback, LockingConfig::default())
    }

    /// Creates a protocol delegating to `fallback`.
    pub fn with_config(fallback: F, config: LockingConfig) -> Self {
        Self {
            fallback,
            config,
            stats: FastPathStats::new(),
        }
    }

    /// Returns the fallback.
    pub fn fallback(&self) -> &F {
        &self.fallback
    }

    /// Returns the configuration.
    pub fn config(&self) -> &LockingConfig {
        &self.config
    }

    /// Returns the fast-path counters.
    pub fn stats(&self) -> &FastPathStats {
        &self.stats
    }

    /// Computes the reservation-preserving hint for `object` from the configured policy.
    pub fn reservation_hint(&self, object: &ManagedObject) -> bool {
        self.config.reservation.preserving_hint(object.class())
    }

    /// Returns `true` if `thread` currently holds the monitor of `object`.
    ///
    /// A lock reserved for `thread` but not entered is not held. For objects without an
    /// embedded word this may allocate the external word.
    pub fn holds_lock(&self, thread: &ThreadContext, object: &ManagedObject) -> bool {
        !object.class().is_value_based()
            && self.lock_state(thread, object).holder() == Some(thread.tag())
    }

    /// Decodes the current lock word of `object`.
    pub fn lock_state(&self, thread: &ThreadContext, object: &ManagedObject) -> LockState {
        self.lock_word(thread, object).load().decode()
    }

    fn lock_word<'a>(
        &'a self,
        thread: &ThreadContext,
        object: &'a ManagedObject,
    ) -> &'a LockWordCell {
        lock_word_of(thread, object, &self.fallback)
    }

    fn delegate_enter(
        &self,
        thread: &ThreadContext,
        object: &ObjectRef,
        reason: DelegationReason,
    ) -> Result<()> {
        self.stats.record_delegation(reason);
        log::trace!("{} enter {} delegated: {reason}", thread.tag(), object.id());

        self.fallback.enter(thread, object)?;
        thread.monitor_entered();
        Ok(())
    }

    fn delegate_exit(
        &self,
        thread: &ThreadContext,
        object: &ObjectRef,
        reason: DelegationReason,
    ) -> Result<()> {
        self.stats.record_delegation(reason);
        log::trace!("{} exit {} delegated: {reason}", thread.tag(), object.id());

        self.fallback.exit(thread, object)?;
        thread.monitor_exited(object);
        Ok(())
    }
}

impl<F: MonitorFallback + std::fmt::Debug> std::fmt::Debug for MonitorProtocol<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorProtocol")
            .field("fallback", &self.fallback)
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
