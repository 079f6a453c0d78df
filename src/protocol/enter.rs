use crate::{
    gateway::MonitorFallback,
    lockword::{LockState, LockWord, LockWordCell},
    object::ObjectRef,
    protocol::{FastPath, MonitorProtocol},
    stats::DelegationReason,
    thread::ThreadContext,
    Result,
};

impl<F: MonitorFallback> MonitorProtocol<F> {
    /// Acquires the monitor of `object` for `thread`.
    ///
    /// The fast path takes a free word, consumes a reservation held by `thread`, or adds a
    /// recursion level to a word `thread` already owns. Everything else is delegated to the
    /// fallback, whose result is returned unchanged. Instances of value-based classes are
    /// delegated before their lock word is looked at.
    ///
    /// `reservation_preserving` only affects exits; an enter never creates a reservation.
    /// It is accepted so that enter and exit sites can pass the same hint.
    ///
    /// # Errors
    ///
    /// Returns whatever error the fallback reports for a delegated acquisition.
    pub fn enter(
        &self,
        thread: &ThreadContext,
        object: &ObjectRef,
        reservation_preserving: bool,
    ) -> Result<()> {
        if object.class().is_value_based() {
            return self.delegate_enter(thread, object, DelegationReason::ValueBased);
        }

        match self.fast_enter(thread, self.lock_word(thread, object)) {
            FastPath::Done => {
                thread.monitor_entered();
                Ok(())
            }
            FastPath::Delegate(reason) => {
                log::trace!(
                    "{} missed fast enter on {} (preserving: {reservation_preserving})",
                    thread.tag(),
                    object.id()
                );
                self.delegate_enter(thread, object, reason)
            }
        }
    }

    /// Attempts to acquire the monitor of `object` without ever calling the fallback.
    ///
    /// Returns `false` whenever [`MonitorProtocol::enter`] would have delegated, including
    /// for instances of value-based classes. Use `enter` to learn why such an object can not
    /// be locked.
    pub fn try_enter(&self, thread: &ThreadContext, object: &ObjectRef) -> bool {
        if object.class().is_value_based() {
            return false;
        }

        match self.fast_enter(thread, self.lock_word(thread, object)) {
            FastPath::Done => {
                thread.monitor_entered();
                true
            }
            FastPath::Delegate(reason) => {
                log::trace!("{} try_enter on {} failed: {reason}", thread.tag(), object.id());
                false
            }
        }
    }

    fn fast_enter(&self, thread: &ThreadContext, slot: &LockWordCell) -> FastPath {
        if thread.revocation_pending() {
            return FastPath::Delegate(DelegationReason::RevocationPending);
        }

        let tag = thread.tag();
        let mut word = slot.load();
        let mut retries = 0;
        loop {
            match word.decode() {
                LockState::Free => match slot.cas_acquire(word, LockWord::with_owner(tag)) {
                    Ok(_) => {
                        self.stats.record_cas(true);
                        return FastPath::Done;
                    }
                    Err(observed) => {
                        self.stats.record_cas(false);
                        if retries >= self.config.spin_limit {
                            return FastPath::Delegate(DelegationReason::SpinExhausted);
                        }
                        retries += 1;
                        word = observed;
                        std::hint::spin_loop();
                    }
                },
                LockState::Reserved { owner, .. } if owner == tag => {
                    if word.is_recursion_saturated() {
                        return FastPath::Delegate(DelegationReason::RecursionSaturated);
                    }
                    slot.store_plain(word.increment_recursion());
                    self.stats.record_plain_store();
                    return FastPath::Done;
                }
                LockState::Owned { owner, .. } if owner == tag => {
                    if word.is_recursion_saturated() {
                        return FastPath::Delegate(DelegationReason::RecursionSaturated);
                    }
                    let acquired = slot.cas_acquire(word, word.increment_recursion()).is_ok();
                    self.stats.record_cas(acquired);
                    return if acquired {
                        FastPath::Done
                    } else {
                        FastPath::Delegate(DelegationReason::CasFailed)
                    };
                }
                LockState::Reserved { .. } => {
                    return FastPath::Delegate(DelegationReason::ReservedByOther)
                }
                LockState::Owned { .. } => {
                    return FastPath::Delegate(DelegationReason::OwnedByOther)
                }
                LockState::Inflated { .. } => return FastPath::Delegate(DelegationReason::Inflated),
            }
        }
    }
}
