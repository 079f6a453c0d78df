//! Self-contained fallback without heavyweight monitors.
//!
//! [`BackoffFallback`] never inflates: it waits for contended words to become free by
//! spinning, yielding and finally sleeping, and then acquires them with the same
//! compare-and-swap the fast path uses. It owns the arena of external lock words for objects
//! without an embedded word.
//!
//! # Reservation Cancellation
//!
//! A word reserved for another thread is never written by a contender. The contender queues
//! a revocation request on the reserving thread's context and keeps waiting. The reserving
//! thread handles the request on its next delegated operation or [`BackoffFallback::safepoint`]:
//!
//! | Reserved word          | Rewritten to                    |
//! |------------------------|---------------------------------|
//! | `Reserved(T, 0)`       | `Free`                          |
//! | `Reserved(T, n > 0)`   | `Owned(T, n - 1)`               |
//!
//! Once rewritten, the word follows the normal locking rules and the contender acquires it
//! when it becomes free. A word reserved (and not held) by a thread that has since detached
//! is reclaimed by the contender directly.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;

use crate::{
    config::BackoffConfig,
    gateway::{lock_word_of, FallbackId, MonitorFallback},
    lockword::{LockState, LockWord, LockWordCell, LockWordHandle, OwnerTag, MAX_RECURSION},
    object::{ManagedObject, ObjectId, ObjectRef},
    thread::{ThreadContext, ThreadRegistry},
    Error, Result,
};

/// Spin, then yield, then sleep.
struct Backoff<'a> {
    config: &'a BackoffConfig,
    step: u32,
    sleep: Duration,
}

impl<'a> Backoff<'a> {
    fn new(config: &'a BackoffConfig) -> Self {
        Self {
            config,
            step: 0,
            sleep: Duration::from_micros(1).min(config.max_sleep),
        }
    }

    fn snooze(&mut self) {
        if self.step < self.config.spins {
            std::hint::spin_loop();
        } else if self.step < self.config.spins.saturating_add(self.config.yields) {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.sleep);
            self.sleep = (self.sleep * 2).min(self.config.max_sleep);
        }
        self.step = self.step.saturating_add(1);
    }
}

/// Fallback that waits out contention instead of inflating.
///
/// # Example
///
/// ```rust
/// use lockword::prelude::*;
///
/// let registry = ThreadRegistry::new();
/// let fallback = BackoffFallback::new(registry.clone());
/// let heap = ObjectHeap::new();
/// let thread = registry.attach();
/// let object = heap.allocate(ClassInfo::without_lockword("java.lang.String"));
///
/// fallback.enter(&thread, &object)?;
/// fallback.exit(&thread, &object)?;
/// assert_eq!(fallback.slot_count(), 1);
/// # Ok::<(), lockword::Error>(())
/// ```
pub struct BackoffFallback {
    id: FallbackId,
    registry: Arc<ThreadRegistry>,
    config: BackoffConfig,
    slots: boxcar::Vec<LockWordCell>,
    slot_index: DashMap<ObjectId, LockWordHandle>,
}

impl BackoffFallback {
    /// Creates a fallback for the threads of `registry` with the default backoff.
    #[must_use]
    pub fn new(registry: Arc<ThreadRegistry>) -> Self {
        Self::with_config(registry, BackoffConfig::default())
    }

    /// Creates a fallback for the threads of `registry`.
    #[must_use]
    pub fn with_config(registry: Arc<ThreadRegistry>, config: BackoffConfig) -> Self {
        Self {
            id: FallbackId::unique(),
            registry,
            config,
            slots: boxcar::Vec::new(),
            slot_index: DashMap::new(),
        }
    }

    /// Returns the registry used to find reserving threads.
    #[must_use]
    pub fn registry(&self) -> &Arc<ThreadRegistry> {
        &self.registry
    }

    /// Returns the backoff configuration.
    #[must_use]
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Number of external lock words allocated so far.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.count()
    }

    /// Handles the revocation requests queued for `thread`.
    ///
    /// Threads that stop performing monitor operations for a while should call this
    /// periodically, or contenders for their reserved locks keep waiting.
    ///
    /// Returns the number of reservations cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignThread`] if `thread` was attached to another registry, and
    /// [`Error::LockError`] if the request queue was poisoned.
    pub fn safepoint(&self, thread: &ThreadContext) -> Result<usize> {
        self.check_registry(thread)?;
        if !thread.revocation_pending() {
            return Ok(0);
        }

        let tag = thread.tag();
        let mut cancelled = 0;
        for object in thread.take_revocations()? {
            let slot = lock_word_of(thread, &object, self);
            let word = slot.load();
            let LockState::Reserved { owner, holds } = word.decode() else {
                continue;
            };
            if owner != tag {
                continue;
            }

            let revoked = match holds {
                0 => LockWord::FREE,
                held => LockState::Owned {
                    owner,
                    recursion: held - 1,
                }
                .encode(),
            };
            slot.store_release(revoked);

            let total = object.class().record_reservation_cancellation();
            log::debug!(
                "{tag} cancelled reservation of {} ({} cancellations on {})",
                object.id(),
                total,
                object.class().name()
            );
            cancelled += 1;
        }
        Ok(cancelled)
    }

    /// Reservations are cancelled through this fallback's registry, so a thread it can not
    /// find there would be taken for a detached one.
    fn check_registry(&self, thread: &ThreadContext) -> Result<()> {
        if Arc::ptr_eq(thread.registry(), &self.registry) {
            Ok(())
        } else {
            log::warn!("{} is not attached to the registry of {}", thread.tag(), self.id);
            Err(Error::ForeignThread(thread.tag()))
        }
    }

    fn cancel_reservation(
        &self,
        owner: OwnerTag,
        holds: u8,
        object: &ObjectRef,
        slot: &LockWordCell,
        word: LockWord,
    ) -> Result<()> {
        if let Some(reserver) = self.registry.lookup(owner) {
            return reserver.request_revocation(object);
        }

        if holds == 0 && slot.cas_acquire(word, LockWord::FREE).is_ok() {
            object.class().record_reservation_cancellation();
            log::debug!("reclaimed {} from detached {owner}", object.id());
        }
        Ok(())
    }
}

impl MonitorFallback for BackoffFallback {
    fn instance_id(&self) -> FallbackId {
        self.id
    }

    fn enter(&self, thread: &ThreadContext, object: &ObjectRef) -> Result<()> {
        self.check_registry(thread)?;
        let class = object.class();
        if class.is_value_based() {
            log::debug!("{} tried to lock value-based {}", thread.tag(), object.id());
            return Err(Error::IllegalMonitorState {
                object: object.id(),
                class: class.name().to_string(),
            });
        }

        let tag = thread.tag();
        let slot = lock_word_of(thread, object, self);
        let mut backoff = Backoff::new(&self.config);
        loop {
            // Two threads waiting on each other's reservations must keep serving requests.
            self.safepoint(thread)?;

            let word = slot.load();
            match word.decode() {
                LockState::Free => {
                    if slot.cas_acquire(word, LockWord::with_owner(tag)).is_ok() {
                        return Ok(());
                    }
                }
                LockState::Owned { owner, .. } | LockState::Reserved { owner, .. }
                    if owner == tag =>
                {
                    if word.is_recursion_saturated() {
                        return Err(Error::RecursionLimit(usize::from(MAX_RECURSION)));
                    }
                    slot.store_plain(word.increment_recursion());
                    return Ok(());
                }
                LockState::Owned { .. } => {}
                LockState::Reserved { owner, holds } => {
                    self.cancel_reservation(owner, holds, object, slot, word)?;
                }
                LockState::Inflated { monitor } => return Err(Error::InflatedMonitor(monitor)),
            }
            backoff.snooze();
        }
    }

    fn exit(&self, thread: &ThreadContext, object: &ObjectRef) -> Result<()> {
        self.safepoint(thread)?;

        let tag = thread.tag();
        let slot = lock_word_of(thread, object, self);
        let word = slot.load();
        match word.decode() {
            LockState::Owned { owner, recursion } if owner == tag => {
                if recursion > 0 {
                    slot.store_plain(word.decrement_recursion());
                } else {
                    slot.store_release(LockWord::FREE);
                }
                Ok(())
            }
            LockState::Reserved { owner, holds } if owner == tag && holds > 0 => {
                slot.store_release(word.decrement_recursion());
                Ok(())
            }
            LockState::Inflated { monitor } => Err(Error::InflatedMonitor(monitor)),
            _ => {
                log::warn!("{tag} released {} without owning it ({word})", object.id());
                Err(Error::NotOwner(object.id()))
            }
        }
    }

    fn resolve_or_create_external_slot(&self, object: &ManagedObject) -> LockWordHandle {
        if let Some(handle) = self.slot_index.get(&object.id()) {
            return *handle;
        }

        *self.slot_index.entry(object.id()).or_insert_with(|| {
            let index = self.slots.push(LockWordCell::new());
            let handle = LockWordHandle(
                u32::try_from(index).expect("external lock word arena exceeds u32 handles"),
            );
            log::trace!("allocated {handle} for {}", object.id());
            handle
        })
    }

    fn external_slot(&self, handle: LockWordHandle) -> &LockWordCell {
        match self.slots.get(handle.value() as usize) {
            Some(cell) => cell,
            None => panic!("{handle} was not allocated by this fallback"),
        }
    }
}

impl std::fmt::Debug for BackoffFallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackoffFallback")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("slots", &self.slot_count())
            .finish()
    }
}
