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
    /// Releases one level of the monitor of `object` held by `thread`.
    ///
    /// Nested levels are dropped with a plain store. Releasing the last level either
    /// compare-and-swaps the word back to free or, with `reservation_preserving`, stores a
    /// word reserved for `thread` with release ordering, so its next enter needs no atomic
    /// read-modify-write. Words `thread` does not hold, inflated words and instances of
    /// value-based classes are delegated to the fallback.
    ///
    /// # Errors
    ///
    /// Returns whatever error the fallback reports for a delegated release, typically
    /// [`crate::Error::NotOwner`] when `thread` does not hold the monitor.
    pub fn exit(
        &self,
        thread: &ThreadContext,
        object: &ObjectRef,
        reservation_preserving: bool,
    ) -> Result<()> {
        if object.class().is_value_based() {
            return self.delegate_exit(thread, object, DelegationReason::ValueBased);
        }

        let slot = self.lock_word(thread, object);
        match self.fast_exit(thread, slot, reservation_preserving) {
            FastPath::Done => {
                thread.monitor_exited(object);
                Ok(())
            }
            FastPath::Delegate(reason) => self.delegate_exit(thread, object, reason),
        }
    }

    fn fast_exit(
        &self,
        thread: &ThreadContext,
        slot: &LockWordCell,
        reservation_preserving: bool,
    ) -> FastPath {
        if thread.revocation_pending() {
            return FastPath::Delegate(DelegationReason::RevocationPending);
        }

        let tag = thread.tag();
        let word = slot.load();
        match word.decode() {
            LockState::Owned { owner, recursion } if owner == tag && recursion > 0 => {
                slot.store_plain(word.decrement_recursion());
                self.stats.record_plain_store();
                FastPath::Done
            }
            LockState::Reserved { owner, holds } if owner == tag && holds > 1 => {
                slot.store_plain(word.decrement_recursion());
                self.stats.record_plain_store();
                FastPath::Done
            }
            LockState::Owned { owner, .. } | LockState::Reserved { owner, holds: 1 }
                if owner == tag =>
            {
                if reservation_preserving {
                    slot.store_release(LockWord::reserved_for(tag));
                    self.stats.record_release_store();
                    return FastPath::Done;
                }

                let released = slot.cas_release(word, LockWord::FREE).is_ok();
                self.stats.record_cas(released);
                if released {
                    FastPath::Done
                } else {
                    FastPath::Delegate(DelegationReason::CasFailed)
                }
            }
            LockState::Inflated { .. } => FastPath::Delegate(DelegationReason::Inflated),
            _ => FastPath::Delegate(DelegationReason::NotOwned),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        gateway::FallbackCalls,
        lockword::{LockState, LockWord},
        object::{ClassInfo, ObjectHeap},
        protocol::MonitorProtocol,
        stats::DelegationReason,
        test::CountingFallback,
        thread::ThreadRegistry,
    };

    #[test]
    fn test_exit_normal_frees_with_cas() {
        let registry = ThreadRegistry::new();
        let heap = ObjectHeap::new();
        let protocol = MonitorProtocol::new(CountingFallback::default());
        let thread = registry.attach();
        let object = heap.allocate(ClassInfo::with_lockword("A"));

        protocol.enter(&thread, &object, false).unwrap();
        protocol.exit(&thread, &object, false).unwrap();

        assert!(object.embedded_lock_word().unwrap().load().is_free());
        assert_eq!(thread.owned_monitor_count(), 0);
        let stats = protocol.stats().snapshot();
        assert_eq!(stats.cas_attempts, 2);
        assert_eq!(stats.release_stores, 0);
        assert_eq!(protocol.fallback().calls(), FallbackCalls::default());
    }

    #[test]
    fn test_exit_preserving_leaves_reservation() {
        let registry = ThreadRegistry::new();
        let heap = ObjectHeap::new();
        let protocol = MonitorProtocol::new(CountingFallback::default());
        let thread = registry.attach();
        let object = heap.allocate(ClassInfo::with_lockword("A"));
        let cell = object.embedded_lock_word().unwrap();

        protocol.enter(&thread, &object, true).unwrap();
        protocol.exit(&thread, &object, true).unwrap();

        assert_eq!(cell.load(), LockWord::reserved_for(thread.tag()));
        assert!(!protocol.holds_lock(&thread, &object));
        let stats = protocol.stats().snapshot();
        assert_eq!(stats.cas_attempts, 1);
        assert_eq!(stats.release_stores, 1);

        // Re-entering the reserved lock costs no read-modify-write at all.
        protocol.stats().reset();
        protocol.enter(&thread, &object, true).unwrap();
        protocol.exit(&thread, &object, true).unwrap();
        let stats = protocol.stats().snapshot();
        assert_eq!(stats.cas_attempts, 0);
        assert_eq!(stats.plain_stores, 1);
        assert_eq!(stats.release_stores, 1);
        assert_eq!(cell.load(), LockWord::reserved_for(thread.tag()));
    }

    #[test]
    fn test_reserved_recursion_round_trip() {
        let registry = ThreadRegistry::new();
        let heap = ObjectHeap::new();
        let protocol = MonitorProtocol::new(CountingFallback::default());
        let thread = registry.attach();
        let object = heap.allocate(ClassInfo::with_lockword("A"));
        let cell = object.embedded_lock_word().unwrap();
        cell.store_release(LockWord::reserved_for(thread.tag()));

        for _ in 0..3 {
            protocol.enter(&thread, &object, true).unwrap();
        }
        assert_eq!(
            cell.load().decode(),
            LockState::Reserved {
                owner: thread.tag(),
                holds: 3
            }
        );
        for _ in 0..3 {
            protocol.exit(&thread, &object, true).unwrap();
        }

        assert_eq!(cell.load(), LockWord::reserved_for(thread.tag()));
        assert_eq!(thread.owned_monitor_count(), 0);
        let stats = protocol.stats().snapshot();
        assert_eq!(stats.cas_attempts, 0);
        assert_eq!(stats.plain_stores, 5);
        assert_eq!(stats.release_stores, 1);
    }

    #[test]
    fn test_exit_normal_drops_reservation() {
        let registry = ThreadRegistry::new();
        let heap = ObjectHeap::new();
        let protocol = MonitorProtocol::new(CountingFallback::default());
        let thread = registry.attach();
        let object = heap.allocate(ClassInfo::with_lockword("A"));
        let cell = object.embedded_lock_word().unwrap();
        cell.store_release(LockWord::reserved_for(thread.tag()));

        protocol.enter(&thread, &object, false).unwrap();
        protocol.exit(&thread, &object, false).unwrap();

        assert!(cell.load().is_free());
    }

    #[test]
    fn test_exit_nested_owned_uses_plain_store() {
        let registry = ThreadRegistry::new();
        let heap = ObjectHeap::new();
        let protocol = MonitorProtocol::new(CountingFallback::default());
        let thread = registry.attach();
        let object = heap.allocate(ClassInfo::with_lockword("A"));

        protocol.enter(&thread, &object, false).unwrap();
        protocol.enter(&thread, &object, false).unwrap();
        protocol.exit(&thread, &object, false).unwrap();

        assert_eq!(
            protocol.lock_state(&thread, &object),
            LockState::Owned {
                owner: thread.tag(),
                recursion: 0
            }
        );
        assert_eq!(protocol.stats().snapshot().plain_stores, 1);
        assert_eq!(thread.owned_monitor_count(), 1);
    }

    #[test]
    fn test_exit_not_owned_delegates() {
        let registry = ThreadRegistry::new();
        let heap = ObjectHeap::new();
        let protocol = MonitorProtocol::new(CountingFallback::default());
        let owner = registry.attach();
        let thread = registry.attach();
        let free = heap.allocate(ClassInfo::with_lockword("A"));
        let foreign = heap.allocate(ClassInfo::with_lockword("B"));
        let reserved = heap.allocate(ClassInfo::with_lockword("C"));
        foreign
            .embedded_lock_word()
            .unwrap()
            .store_release(LockWord::with_owner(owner.tag()));
        reserved
            .embedded_lock_word()
            .unwrap()
            .store_release(LockWord::reserved_for(thread.tag()));

        // The stub accepts the release; a real fallback would report the caller's defect.
        thread.monitor_entered();
        thread.monitor_entered();
        thread.monitor_entered();
        protocol.exit(&thread, &free, false).unwrap();
        protocol.exit(&thread, &foreign, false).unwrap();
        protocol.exit(&thread, &reserved, true).unwrap();

        assert_eq!(protocol.stats().delegations(DelegationReason::NotOwned), 3);
        assert_eq!(protocol.stats().snapshot().word_writes(), 0);
        assert_eq!(protocol.fallback().calls().exit, 3);
        assert_eq!(
            foreign.embedded_lock_word().unwrap().load(),
            LockWord::with_owner(owner.tag())
        );
    }

    #[test]
    fn test_exit_inflated_delegates() {
        let registry = ThreadRegistry::new();
        let heap = ObjectHeap::new();
        let protocol = MonitorProtocol::new(CountingFallback::default());
        let thread = registry.attach();
        let object = heap.allocate(ClassInfo::with_lockword("A"));
        object
            .embedded_lock_word()
            .unwrap()
            .store_release(LockWord::inflated(7));

        thread.monitor_entered();
        protocol.exit(&thread, &object, false).unwrap();

        assert_eq!(protocol.stats().delegations(DelegationReason::Inflated), 1);
        assert_eq!(thread.owned_monitor_count(), 0);
    }
}
