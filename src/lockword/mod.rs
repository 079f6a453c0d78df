//! Lock word encoding and decoding.
//!
//! Every lockable object carries a single 64-bit word that encodes its monitor state. This
//! module owns all bit arithmetic over that word; the rest of the crate works with the
//! logical [`LockState`] and only converts at the atomic boundary in [`LockWordCell`].
//!
//! # Layout
//!
//! ```text
//!  63                                16 15          8 7        0
//! +------------------------------------+-------------+----------+
//! |             owner tag              |  recursion  |  flags   |
//! +------------------------------------+-------------+----------+
//!
//! flags: 0x01 INFLATED, 0x04 RESERVED
//! ```
//!
//! An inflated word reuses everything above the flag byte for the handle of the heavyweight
//! monitor: `(handle << 8) | INFLATED`.
//!
//! # States
//!
//! | Word                          | State                                     |
//! |-------------------------------|-------------------------------------------|
//! | `0`                           | [`LockState::Free`]                       |
//! | `tag \| rc << 8`              | [`LockState::Owned`], recursion `rc`      |
//! | `tag \| n << 8 \| RESERVED`   | [`LockState::Reserved`], `n` holds        |
//! | `handle << 8 \| INFLATED`     | [`LockState::Inflated`]                   |
//!
//! A reserved word counts *holds* rather than recursion: `n == 0` means the word is biased
//! toward `tag` but nobody holds it, `n > 0` means `tag` holds it with a logical recursion
//! count of `n - 1`.
//!
//! # Examples
//!
//! ```rust
//! use lockword::lockword::{LockState, LockWord, OwnerTag};
//!
//! let tag = OwnerTag::from_index(1).unwrap();
//! let word = LockWord::with_owner(tag).increment_recursion();
//!
//! assert!(word.is_owned_by(tag));
//! assert_eq!(word.decode(), LockState::Owned { owner: tag, recursion: 1 });
//! assert!(word.decrement_recursion().decrement_recursion_checked().is_none());
//! ```

mod cell;

use std::fmt;

use bitflags::bitflags;

pub use cell::LockWordCell;

/// Number of low bits reserved for lock flags.
pub const FLAG_BITS: u32 = 8;

/// Bit offset of the recursion field.
pub const RECURSION_SHIFT: u32 = FLAG_BITS;

/// Width of the recursion field in bits.
pub const RECURSION_BITS: u32 = 8;

/// Mask selecting the recursion field.
pub const RECURSION_MASK: u64 = ((1 << RECURSION_BITS) - 1) << RECURSION_SHIFT;

/// Largest value the recursion field can hold.
pub const MAX_RECURSION: u8 = u8::MAX;

/// Bit offset of the owner tag.
pub const OWNER_SHIFT: u32 = RECURSION_SHIFT + RECURSION_BITS;

/// Mask selecting the owner tag.
pub const OWNER_MASK: u64 = !((1 << OWNER_SHIFT) - 1);

bitflags! {
    /// Flag bits stored in the lowest byte of a lock word.
    ///
    /// The bit positions match the flag bits of the J9 object header, so words remain
    /// recognisable in memory dumps of such a runtime.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LockFlags: u64 {
        /// The word is a reference into the heavyweight monitor subsystem.
        const INFLATED = 0x01;
        /// The word is biased toward its owner even while logically free.
        const RESERVED = 0x04;
    }
}

/// Opaque identifier of a thread context, stored in the owner bits of a lock word.
///
/// Tags are non-zero and have all bits below [`OWNER_SHIFT`] clear, so a tag can be or-ed
/// into a word without disturbing the recursion field or the flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerTag(u64);

impl OwnerTag {
    /// Creates the tag for the `index`-th thread context.
    ///
    /// Returns `None` for index `0` (reserved for "no owner") and for indices that do not
    /// fit into the owner field.
    #[must_use]
    pub fn from_index(index: u64) -> Option<Self> {
        if index == 0 || index > (OWNER_MASK >> OWNER_SHIFT) {
            return None;
        }
        Some(Self(index << OWNER_SHIFT))
    }

    /// Reconstructs a tag from the owner bits of a raw word.
    #[must_use]
    pub fn from_bits(bits: u64) -> Option<Self> {
        let owner = bits & OWNER_MASK;
        (owner != 0).then_some(Self(owner))
    }

    /// Returns the raw bit pattern of the tag.
    #[must_use]
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Returns the index this tag was created from.
    #[must_use]
    pub fn index(self) -> u64 {
        self.0 >> OWNER_SHIFT
    }
}

impl fmt::Display for OwnerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.index())
    }
}

/// Handle of an externally allocated lock word.
///
/// Produced by [`crate::MonitorFallback::resolve_or_create_external_slot`] for objects whose
/// class carries no embedded lock word, and cached by [`crate::MonitorLookupCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockWordHandle(pub u32);

impl LockWordHandle {
    /// Returns the raw handle value.
    #[must_use]
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LockWordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Slot({})", self.0)
    }
}

/// Logical monitor state decoded from a [`LockWord`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockState {
    /// Nobody owns the lock and it is not biased.
    Free,
    /// Held by `owner` with `recursion` additional nested acquisitions.
    Owned {
        /// Thread holding the lock.
        owner: OwnerTag,
        /// Nested acquisitions beyond the first.
        recursion: u8,
    },
    /// Biased toward `owner`. `holds == 0` means not currently held.
    Reserved {
        /// Thread the lock is reserved for.
        owner: OwnerTag,
        /// Number of times `owner` currently holds the lock.
        holds: u8,
    },
    /// Managed by the heavyweight monitor subsystem.
    Inflated {
        /// Handle of the heavyweight monitor.
        monitor: u64,
    },
}

impl LockState {
    /// Encodes the logical state back into a raw word.
    #[must_use]
    pub fn encode(self) -> LockWord {
        match self {
            LockState::Free => LockWord::FREE,
            LockState::Owned { owner, recursion } => {
                LockWord(owner.bits() | (u64::from(recursion) << RECURSION_SHIFT))
            }
            LockState::Reserved { owner, holds } => LockWord(
                owner.bits() | (u64::from(holds) << RECURSION_SHIFT) | LockFlags::RESERVED.bits(),
            ),
            LockState::Inflated { monitor } => LockWord::inflated(monitor),
        }
    }

    /// Returns the thread holding the lock, if any.
    ///
    /// A reserved lock with zero holds is not held by anyone.
    #[must_use]
    pub fn holder(self) -> Option<OwnerTag> {
        match self {
            LockState::Owned { owner, .. } => Some(owner),
            LockState::Reserved { owner, holds } if holds > 0 => Some(owner),
            _ => None,
        }
    }
}

/// Raw value of a lock word.
///
/// All operations are pure: atomicity is the responsibility of [`LockWordCell`] and of the
/// protocols driving it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LockWord(u64);

impl LockWord {
    /// The free word.
    pub const FREE: LockWord = LockWord(0);

    /// Wraps a raw word value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw word value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Word owned by `tag` with a recursion count of zero.
    #[must_use]
    pub fn with_owner(tag: OwnerTag) -> Self {
        Self(tag.bits())
    }

    /// Word reserved for `tag` and not currently held.
    #[must_use]
    pub fn reserved_for(tag: OwnerTag) -> Self {
        Self(tag.bits() | LockFlags::RESERVED.bits())
    }

    /// Word pointing at heavyweight monitor `handle`.
    ///
    /// # Panics
    ///
    /// Panics if the handle does not fit above the flag byte.
    #[must_use]
    pub fn inflated(handle: u64) -> Self {
        assert!(
            handle <= (u64::MAX >> FLAG_BITS),
            "monitor handle {handle:#x} does not fit into a lock word"
        );
        Self((handle << FLAG_BITS) | LockFlags::INFLATED.bits())
    }

    /// Returns the flag bits of the word.
    #[must_use]
    pub fn flags(self) -> LockFlags {
        LockFlags::from_bits_truncate(self.0)
    }

    /// `true` iff the word is zero.
    #[must_use]
    pub fn is_free(self) -> bool {
        self.0 == 0
    }

    /// `true` iff the word is a reference into the heavyweight monitor subsystem.
    #[must_use]
    pub fn is_inflated(self) -> bool {
        self.flags().contains(LockFlags::INFLATED)
    }

    /// `true` iff the reservation bit is set on a non-inflated word.
    #[must_use]
    pub fn is_reserved(self) -> bool {
        !self.is_inflated() && self.flags().contains(LockFlags::RESERVED)
    }

    /// `true` iff the owner bits equal `tag`, ignoring recursion and reservation bits.
    #[must_use]
    pub fn is_owned_by(self, tag: OwnerTag) -> bool {
        !self.is_inflated() && (self.0 & OWNER_MASK) == tag.bits()
    }

    /// `true` iff the reservation bit is set and the owner bits equal `tag`.
    #[must_use]
    pub fn is_reserved_by(self, tag: OwnerTag) -> bool {
        self.is_reserved() && self.is_owned_by(tag)
    }

    /// Returns the owner tag of a non-inflated word.
    #[must_use]
    pub fn owner(self) -> Option<OwnerTag> {
        if self.is_inflated() {
            return None;
        }
        OwnerTag::from_bits(self.0)
    }

    /// Returns the raw recursion field.
    ///
    /// For reserved words this is the hold count.
    #[must_use]
    pub fn recursion(self) -> u8 {
        ((self.0 & RECURSION_MASK) >> RECURSION_SHIFT) as u8
    }

    /// `true` iff the recursion field cannot be incremented further.
    #[must_use]
    pub fn is_recursion_saturated(self) -> bool {
        self.recursion() == MAX_RECURSION
    }

    /// Returns the heavyweight monitor handle of an inflated word.
    #[must_use]
    pub fn monitor_handle(self) -> Option<u64> {
        self.is_inflated().then_some(self.0 >> FLAG_BITS)
    }

    /// Same word with the reservation bit set.
    #[must_use]
    pub fn with_reservation(self) -> Self {
        Self(self.0 | LockFlags::RESERVED.bits())
    }

    /// Adds one to the recursion field.
    ///
    /// # Panics
    ///
    /// Panics if the field is already saturated. Callers check
    /// [`LockWord::is_recursion_saturated`] first.
    #[must_use]
    pub fn increment_recursion(self) -> Self {
        assert!(
            !self.is_recursion_saturated(),
            "lock word recursion overflow on {self}"
        );
        Self(self.0 + (1 << RECURSION_SHIFT))
    }

    /// Subtracts one from the recursion field.
    ///
    /// # Panics
    ///
    /// Panics if the field is already zero.
    #[must_use]
    pub fn decrement_recursion(self) -> Self {
        match self.decrement_recursion_checked() {
            Some(word) => word,
            None => panic!("lock word recursion underflow on {self}"),
        }
    }

    /// Subtracts one from the recursion field, or `None` if it is zero.
    #[must_use]
    pub fn decrement_recursion_checked(self) -> Option<Self> {
        (self.recursion() > 0).then(|| Self(self.0 - (1 << RECURSION_SHIFT)))
    }

    /// Decodes the word into its logical state.
    #[must_use]
    pub fn decode(self) -> LockState {
        if let Some(monitor) = self.monitor_handle() {
            return LockState::Inflated { monitor };
        }
        match self.owner() {
            None => LockState::Free,
            Some(owner) if self.is_reserved() => LockState::Reserved {
                owner,
                holds: self.recursion(),
            },
            Some(owner) => LockState::Owned {
                owner,
                recursion: self.recursion(),
            },
        }
    }
}

impl From<LockState> for LockWord {
    fn from(state: LockState) -> Self {
        state.encode()
    }
}

impl fmt::Debug for LockWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockWord({:#018x} = {:?})", self.0, self.decode())
    }
}

impl fmt::Display for LockWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(index: u64) -> OwnerTag {
        OwnerTag::from_index(index).unwrap()
    }

    #[test]
    fn test_owner_tag_bounds() {
        assert!(OwnerTag::from_index(0).is_none());
        assert!(OwnerTag::from_index(OWNER_MASK >> OWNER_SHIFT).is_some());
        assert!(OwnerTag::from_index((OWNER_MASK >> OWNER_SHIFT) + 1).is_none());

        let t = tag(3);
        assert_eq!(t.bits() & !OWNER_MASK, 0);
        assert_eq!(t.index(), 3);
        assert_eq!(t.to_string(), "Thread(3)");
    }

    #[test]
    fn test_free_word() {
        let word = LockWord::FREE;
        assert!(word.is_free());
        assert!(!word.is_inflated());
        assert!(!word.is_reserved());
        assert_eq!(word.owner(), None);
        assert_eq!(word.decode(), LockState::Free);
    }

    #[test]
    fn test_owned_word_predicates() {
        let t1 = tag(1);
        let t2 = tag(2);
        let word = LockWord::with_owner(t1).increment_recursion();

        assert!(!word.is_free());
        assert!(word.is_owned_by(t1));
        assert!(!word.is_owned_by(t2));
        assert!(!word.is_reserved_by(t1));
        assert_eq!(word.recursion(), 1);
        assert_eq!(
            word.decode(),
            LockState::Owned {
                owner: t1,
                recursion: 1
            }
        );
    }

    #[test]
    fn test_reserved_word_predicates() {
        let t1 = tag(1);
        let word = LockWord::reserved_for(t1);

        assert!(word.is_reserved_by(t1));
        assert!(!word.is_reserved_by(tag(2)));
        assert!(word.is_owned_by(t1));
        assert_eq!(word, LockWord::with_owner(t1).with_reservation());
        assert_eq!(word.decode(), LockState::Reserved { owner: t1, holds: 0 });
        assert_eq!(word.decode().holder(), None);

        let held = word.increment_recursion();
        assert_eq!(held.decode(), LockState::Reserved { owner: t1, holds: 1 });
        assert_eq!(held.decode().holder(), Some(t1));
    }

    #[test]
    fn test_inflated_word() {
        let word = LockWord::inflated(0x1234);
        assert!(word.is_inflated());
        assert!(!word.is_free());
        assert!(!word.is_reserved());
        assert_eq!(word.owner(), None);
        assert_eq!(word.monitor_handle(), Some(0x1234));
        assert_eq!(word.decode(), LockState::Inflated { monitor: 0x1234 });

        // The handle bits must never be mistaken for an owner, even when they collide.
        let collide = LockWord::inflated(tag(1).bits() >> FLAG_BITS);
        assert!(!collide.is_owned_by(tag(1)));
    }

    #[test]
    fn test_state_encoding_matches_decoding() {
        let t = tag(42);
        let states = [
            LockState::Free,
            LockState::Owned {
                owner: t,
                recursion: 0,
            },
            LockState::Owned {
                owner: t,
                recursion: MAX_RECURSION,
            },
            LockState::Reserved { owner: t, holds: 0 },
            LockState::Reserved { owner: t, holds: 17 },
            LockState::Inflated { monitor: 99 },
        ];

        for state in states {
            assert_eq!(state.encode().decode(), state);
        }
    }

    #[test]
    fn test_recursion_saturation() {
        let mut word = LockWord::with_owner(tag(1));
        for _ in 0..MAX_RECURSION {
            word = word.increment_recursion();
        }
        assert!(word.is_recursion_saturated());
        assert!(word.is_owned_by(tag(1)));
        assert_eq!(word.decrement_recursion().recursion(), MAX_RECURSION - 1);
    }

    #[test]
    #[should_panic(expected = "recursion overflow")]
    fn test_recursion_overflow_panics() {
        let word = LockState::Owned {
            owner: tag(1),
            recursion: MAX_RECURSION,
        }
        .encode();
        let _ = word.increment_recursion();
    }

    #[test]
    #[should_panic(expected = "recursion underflow")]
    fn test_recursion_underflow_panics() {
        let _ = LockWord::with_owner(tag(1)).decrement_recursion();
    }
}
