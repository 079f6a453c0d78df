//! Locking configuration types.
//!
//! This module provides configuration for the monitor protocols and the bundled fallback.
//! The protocol takes a [`LockingConfig`]; the fallback's waiting behaviour is passed to
//! [`crate::BackoffFallback::with_config`] when the fallback is built.
//!
//! # Overview
//!
//! - [`LockingConfig`] - Top-level configuration container
//! - [`ReservationPolicy`] - Decides whether exits leave locks reserved
//! - [`BackoffConfig`] - Waiting behaviour of [`crate::BackoffFallback`]
//!
//! # Configuration Presets
//!
//! - [`LockingConfig::reserving()`] - Bias every lock toward its last owner
//! - [`LockingConfig::conservative()`] - Never reserve, short spin
//! - [`LockingConfig::default()`] - Adaptive reservation driven by contention history
//!
//! # Example
//!
//! ```rust
//! use lockword::{LockingConfig, ReservationPolicy};
//!
//! let config = LockingConfig::default()
//!     .with_spin_limit(16)
//!     .with_reservation(ReservationPolicy::Adaptive { max_cancellations: 2 });
//!
//! assert_eq!(config.spin_limit, 16);
//! ```

use std::time::Duration;

use crate::object::ClassInfo;

/// Policy deciding the reservation-preserving hint for an object.
///
/// The protocols never decide this themselves: they receive a boolean per call. This policy
/// is one way for a runtime to compute it from class-level history, in the way a JIT
/// classifies monitor sites as reserving or normal by per-class reservability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReservationPolicy {
    /// Exits always fully release the lock.
    Disabled,
    /// Exits always leave the lock reserved for the releasing thread.
    PreserveAll,
    /// Exits leave the lock reserved unless reservations on the object's class have been
    /// cancelled more than `max_cancellations` times.
    Adaptive {
        /// Cancellations tolerated before the class stops being reserved.
        max_cancellations: u32,
    },
}

impl ReservationPolicy {
    /// Computes the reservation-preserving hint for an instance of `class`.
    #[must_use]
    pub fn preserving_hint(&self, class: &ClassInfo) -> bool {
        if class.is_value_based() {
            return false;
        }
        match *self {
            ReservationPolicy::Disabled => false,
            ReservationPolicy::PreserveAll => true,
            ReservationPolicy::Adaptive { max_cancellations } => {
                class.reservation_cancellations() <= max_cancellations
            }
        }
    }
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        ReservationPolicy::Adaptive {
            max_cancellations: 4,
        }
    }
}

/// Waiting behaviour of the bundled fallback.
///
/// A contended acquisition first spins, then yields the processor, then sleeps with an
/// exponentially growing interval capped at `max_sleep`.
///
/// # Default Values
///
/// | Setting | Default Value |
/// |---------|---------------|
/// | `spins` | 64 |
/// | `yields` | 16 |
/// | `max_sleep` | 1 ms |
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Busy-wait iterations before the first yield.
    pub spins: u32,
    /// Yields before the first sleep.
    pub yields: u32,
    /// Upper bound of a single sleep.
    pub max_sleep: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            spins: 64,
            yields: 16,
            max_sleep: Duration::from_millis(1),
        }
    }
}

/// Configuration of the monitor protocols.
///
/// # Default Configuration
///
/// - free-state CAS retried up to 8 times before delegating
/// - adaptive reservation, tolerating 4 cancellations per class
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockingConfig {
    /// How many times the fast path retries a lost compare-and-swap on a free word before
    /// delegating to the fallback. Zero disables retries.
    pub spin_limit: u32,

    /// Policy used by [`crate::MonitorProtocol::reservation_hint`].
    pub reservation: ReservationPolicy,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            spin_limit: 8,
            reservation: ReservationPolicy::default(),
        }
    }
}

impl LockingConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset that reserves every lock for its last owner.
    #[must_use]
    pub fn reserving() -> Self {
        Self {
            reservation: ReservationPolicy::PreserveAll,
            ..Self::default()
        }
    }

    /// Preset that never reserves and delegates quickly under contention.
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            spin_limit: 1,
            reservation: ReservationPolicy::Disabled,
            ..Self::default()
        }
    }

    /// Sets the free-state retry limit.
    #[must_use]
    pub fn with_spin_limit(mut self, spin_limit: u32) -> Self {
        self.spin_limit = spin_limit;
        self
    }

    /// Sets the reservation policy.
    #[must_use]
    pub fn with_reservation(mut self, reservation: ReservationPolicy) -> Self {
        self.reservation = reservation;
        self
    }
}
