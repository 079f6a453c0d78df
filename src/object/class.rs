//! Class-level attributes consulted by the monitor protocols.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
};

use bitflags::bitflags;

bitflags! {
    /// Attributes of a class that influence how its instances are locked.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ClassFlags: u32 {
        /// Instances carry an embedded lock word at a fixed offset.
        const EMBEDDED_LOCKWORD = 0x0001;
        /// Instances are value-based and must never be locked.
        const VALUE_BASED = 0x0004_0000;
    }
}

/// A reference-counted pointer to a [`ClassInfo`].
pub type ClassRc = Arc<ClassInfo>;

/// Description of a class as far as locking is concerned.
///
/// Besides its static flags a class accumulates the number of times reservations on its
/// instances had to be cancelled. [`crate::ReservationPolicy::Adaptive`] uses that history to
/// stop biasing locks of classes that are regularly contended.
pub struct ClassInfo {
    name: String,
    flags: ClassFlags,
    reservation_cancellations: AtomicU32,
}

impl ClassInfo {
    /// Creates a class with the given flags.
    #[must_use]
    pub fn new(name: impl Into<String>, flags: ClassFlags) -> ClassRc {
        Arc::new(Self {
            name: name.into(),
            flags,
            reservation_cancellations: AtomicU32::new(0),
        })
    }

    /// Creates an ordinary class whose instances carry an embedded lock word.
    #[must_use]
    pub fn with_lockword(name: impl Into<String>) -> ClassRc {
        Self::new(name, ClassFlags::EMBEDDED_LOCKWORD)
    }

    /// Creates a class whose instances have no embedded lock word and are locked through
    /// the monitor lookup cache.
    #[must_use]
    pub fn without_lockword(name: impl Into<String>) -> ClassRc {
        Self::new(name, ClassFlags::empty())
    }

    /// Creates a value-based class.
    #[must_use]
    pub fn value_based(name: impl Into<String>) -> ClassRc {
        Self::new(
            name,
            ClassFlags::VALUE_BASED | ClassFlags::EMBEDDED_LOCKWORD,
        )
    }

    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the class flags.
    #[must_use]
    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    /// `true` if instances may not be locked.
    #[must_use]
    pub fn is_value_based(&self) -> bool {
        self.flags.contains(ClassFlags::VALUE_BASED)
    }

    /// `true` if instances carry an embedded lock word.
    #[must_use]
    pub fn has_embedded_lockword(&self) -> bool {
        self.flags.contains(ClassFlags::EMBEDDED_LOCKWORD)
    }

    /// Records that a reservation on an instance of this class was cancelled.
    ///
    /// Returns the updated count.
    pub fn record_reservation_cancellation(&self) -> u32 {
        self.reservation_cancellations
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1)
    }

    /// Number of reservations on instances of this class that were cancelled so far.
    #[must_use]
    pub fn reservation_cancellations(&self) -> u32 {
        self.reservation_cancellations.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field(
                "reservation_cancellations",
                &self.reservation_cancellations(),
            )
            .finish()
    }
}
