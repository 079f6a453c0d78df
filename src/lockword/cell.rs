//! Atomic storage for a single lock word.
//!
//! [`LockWordCell`] is the only place where lock words are read or written. Each mutator
//! names the memory ordering it provides so that the protocols read as the transitions they
//! implement:
//!
//! - acquiring transitions (`Free -> Owned`, owned reentry) use [`LockWordCell::cas_acquire`]
//! - the releasing transition `Owned -> Free` uses [`LockWordCell::cas_release`]
//! - the reservation-preserving exit uses [`LockWordCell::store_release`]
//! - recursion changes while the lock is held use [`LockWordCell::store_plain`]

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::lockword::LockWord;

/// Atomically accessed lock word.
#[derive(Default)]
pub struct LockWordCell {
    word: AtomicU64,
}

impl LockWordCell {
    /// Creates a free lock word.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            word: AtomicU64::new(0),
        }
    }

    /// Creates a cell holding `word`.
    #[must_use]
    pub const fn with_word(word: LockWord) -> Self {
        Self {
            word: AtomicU64::new(word.raw()),
        }
    }

    /// Reads the current word.
    ///
    /// Acquire ordering pairs with the release performed by the previous owner.
    #[must_use]
    pub fn load(&self) -> LockWord {
        LockWord::from_raw(self.word.load(Ordering::Acquire))
    }

    /// Replaces `current` with `new` if the word still equals `current`, with acquire
    /// ordering on success.
    ///
    /// # Errors
    ///
    /// Returns the word actually observed when it differed from `current`. The cell is left
    /// untouched in that case.
    pub fn cas_acquire(&self, current: LockWord, new: LockWord) -> Result<LockWord, LockWord> {
        self.word
            .compare_exchange(current.raw(), new.raw(), Ordering::Acquire, Ordering::Relaxed)
            .map(LockWord::from_raw)
            .map_err(LockWord::from_raw)
    }

    /// Replaces `current` with `new` if the word still equals `current`, with release
    /// ordering on success.
    ///
    /// # Errors
    ///
    /// Returns the word actually observed when it differed from `current`.
    pub fn cas_release(&self, current: LockWord, new: LockWord) -> Result<LockWord, LockWord> {
        self.word
            .compare_exchange(current.raw(), new.raw(), Ordering::Release, Ordering::Relaxed)
            .map(LockWord::from_raw)
            .map_err(LockWord::from_raw)
    }

    /// Stores `word` with release ordering.
    ///
    /// Only the thread the word is owned by or reserved for may call this.
    pub fn store_release(&self, word: LockWord) {
        self.word.store(word.raw(), Ordering::Release);
    }

    /// Stores `word` without ordering beyond program order.
    ///
    /// Only the thread the word is owned by or reserved for may call this, and only to
    /// change the recursion field.
    pub fn store_plain(&self, word: LockWord) {
        self.word.store(word.raw(), Ordering::Relaxed);
    }
}

impl fmt::Debug for LockWordCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LockWordCell").field(&self.load()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockword::OwnerTag;

    #[test]
    fn test_cas_success_and_failure() {
        let tag = OwnerTag::from_index(1).unwrap();
        let other = OwnerTag::from_index(2).unwrap();
        let cell = LockWordCell::new();

        assert!(cell.load().is_free());
        assert!(cell
            .cas_acquire(LockWord::FREE, LockWord::with_owner(tag))
            .is_ok());

        let observed = cell
            .cas_acquire(LockWord::FREE, LockWord::with_owner(other))
            .unwrap_err();
        assert_eq!(observed, LockWord::with_owner(tag));
        assert_eq!(cell.load(), LockWord::with_owner(tag));

        assert!(cell
            .cas_release(LockWord::with_owner(tag), LockWord::FREE)
            .is_ok());
        assert!(cell.load().is_free());
    }

    #[test]
    fn test_stores() {
        let tag = OwnerTag::from_index(5).unwrap();
        let cell = LockWordCell::with_word(LockWord::with_owner(tag));

        cell.store_plain(LockWord::with_owner(tag).increment_recursion());
        assert_eq!(cell.load().recursion(), 1);

        cell.store_release(LockWord::reserved_for(tag));
        assert!(cell.load().is_reserved_by(tag));
    }
}
