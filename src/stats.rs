//! Fast-path instrumentation.
//!
//! [`FastPathStats`] counts the memory operations the protocols issue on lock words and why
//! they handed control to the fallback. The counters are relaxed atomics: they are
//! diagnostics, not synchronisation, and are cheap enough to stay enabled.
//!
//! # Example
//!
//! ```rust
//! use lockword::prelude::*;
//!
//! let registry = ThreadRegistry::new();
//! let heap = ObjectHeap::new();
//! let protocol = MonitorProtocol::new(BackoffFallback::new(registry.clone()));
//! let thread = registry.attach();
//! let object = heap.allocate(ClassInfo::with_lockword("java.lang.Object"));
//!
//! protocol.enter(&thread, &object, false)?;
//! protocol.exit(&thread, &object, false)?;
//!
//! let stats = protocol.stats().snapshot();
//! assert_eq!(stats.cas_attempts, 2);
//! assert_eq!(stats.total_delegations(), 0);
//! # Ok::<(), lockword::Error>(())
//! ```

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};

/// Why a protocol handed an operation to the fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumCount, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DelegationReason {
    /// The object's class is value-based.
    ValueBased,
    /// Another thread holds the lock.
    OwnedByOther,
    /// The lock is reserved for another thread.
    ReservedByOther,
    /// The word refers to a heavyweight monitor.
    Inflated,
    /// The recursion field cannot be incremented further.
    RecursionSaturated,
    /// The free-state compare-and-swap kept losing races.
    SpinExhausted,
    /// A compare-and-swap on an owned word observed an unexpected value.
    CasFailed,
    /// Another thread asked the calling thread to give up one of its reservations.
    RevocationPending,
    /// The calling thread does not hold the lock it is releasing.
    NotOwned,
}

impl fmt::Display for DelegationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

/// Counters describing fast-path behaviour.
#[derive(Debug)]
pub struct FastPathStats {
    cas_attempts: AtomicU64,
    cas_failures: AtomicU64,
    plain_stores: AtomicU64,
    release_stores: AtomicU64,
    delegations: [AtomicU64; DelegationReason::COUNT],
}

impl FastPathStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cas_attempts: AtomicU64::new(0),
            cas_failures: AtomicU64::new(0),
            plain_stores: AtomicU64::new(0),
            release_stores: AtomicU64::new(0),
            delegations: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    pub(crate) fn record_cas(&self, succeeded: bool) {
        self.cas_attempts.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.cas_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_plain_store(&self) {
        self.plain_stores.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release_store(&self) {
        self.release_stores.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delegation(&self, reason: DelegationReason) {
        self.delegations[reason as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Number of delegations recorded for `reason`.
    #[must_use]
    pub fn delegations(&self, reason: DelegationReason) -> u64 {
        self.delegations[reason as usize].load(Ordering::Relaxed)
    }

    /// Takes a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cas_attempts: self.cas_attempts.load(Ordering::Relaxed),
            cas_failures: self.cas_failures.load(Ordering::Relaxed),
            plain_stores: self.plain_stores.load(Ordering::Relaxed),
            release_stores: self.release_stores.load(Ordering::Relaxed),
            delegations: DelegationReason::iter()
                .map(|reason| (reason, self.delegations(reason)))
                .filter(|(_, count)| *count > 0)
                .collect(),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        self.cas_attempts.store(0, Ordering::Relaxed);
        self.cas_failures.store(0, Ordering::Relaxed);
        self.plain_stores.store(0, Ordering::Relaxed);
        self.release_stores.store(0, Ordering::Relaxed);
        for counter in &self.delegations {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for FastPathStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy of [`FastPathStats`] taken by [`FastPathStats::snapshot`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Compare-and-swap operations issued on lock words.
    pub cas_attempts: u64,
    /// Compare-and-swap operations that observed an unexpected word.
    pub cas_failures: u64,
    /// Unordered stores (recursion changes while held).
    pub plain_stores: u64,
    /// Release stores (exits that leave a reservation behind).
    pub release_stores: u64,
    /// Non-zero delegation counts, in declaration order of [`DelegationReason`].
    pub delegations: Vec<(DelegationReason, u64)>,
}

impl StatsSnapshot {
    /// Delegations recorded for `reason`.
    #[must_use]
    pub fn delegations_for(&self, reason: DelegationReason) -> u64 {
        self.delegations
            .iter()
            .find(|(r, _)| *r == reason)
            .map_or(0, |(_, count)| *count)
    }

    /// Delegations across all reasons.
    #[must_use]
    pub fn total_delegations(&self) -> u64 {
        self.delegations.iter().map(|(_, count)| count).sum()
    }

    /// Word mutations of any kind.
    #[must_use]
    pub fn word_writes(&self) -> u64 {
        (self.cas_attempts - self.cas_failures) + self.plain_stores + self.release_stores
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cas={} (failed {}), plain={}, release={}",
            self.cas_attempts, self.cas_failures, self.plain_stores, self.release_stores
        )?;
        for (reason, count) in &self.delegations {
            write!(f, ", {reason}={count}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = FastPathStats::new();
        stats.record_cas(true);
        stats.record_cas(false);
        stats.record_plain_store();
        stats.record_release_store();
        stats.record_delegation(DelegationReason::Inflated);
        stats.record_delegation(DelegationReason::Inflated);
        stats.record_delegation(DelegationReason::OwnedByOther);

        let snap = stats.snapshot();
        assert_eq!(snap.cas_attempts, 2);
        assert_eq!(snap.cas_failures, 1);
        assert_eq!(snap.word_writes(), 3);
        assert_eq!(snap.delegations_for(DelegationReason::Inflated), 2);
        assert_eq!(snap.delegations_for(DelegationReason::ValueBased), 0);
        assert_eq!(snap.total_delegations(), 3);
        assert_eq!(
            snap.delegations,
            vec![
                (DelegationReason::OwnedByOther, 1),
                (DelegationReason::Inflated, 2)
            ]
        );

        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_display() {
        assert_eq!(DelegationReason::ReservedByOther.to_string(), "reserved_by_other");

        let stats = FastPathStats::new();
        stats.record_delegation(DelegationReason::SpinExhausted);
        assert_eq!(
            stats.snapshot().to_string(),
            "cas=0 (failed 0), plain=0, release=0, spin_exhausted=1"
        );
    }
}
