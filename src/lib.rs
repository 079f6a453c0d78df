// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # lockword
//!
//! Lightweight object monitors over a single 64-bit lock word per object, with lock
//! reservation.
//!
//! A managed runtime gives every object a monitor, yet almost all monitor operations are
//! uncontended and most are performed repeatedly by the same thread. This crate implements
//! the fast paths for those cases directly on the lock word and hands everything else to a
//! pluggable heavyweight monitor subsystem.
//!
//! ## Features
//!
//! - **Compact lock words** - owner, recursion count and state flags packed into a `u64`
//! - **Lock reservation** - a lock can stay biased toward its last owner, whose next
//!   acquisition and release then need no atomic read-modify-write
//! - **Pluggable slow path** - contention, blocking and inflation live behind
//!   [`MonitorFallback`]
//! - **External lock words** - objects without an embedded word are locked through words
//!   found via a per-thread [`MonitorLookupCache`]
//! - **Instrumentation** - [`FastPathStats`] counts every word operation and delegation
//!
//! ## Quick Start
//!
//! ```rust
//! use lockword::prelude::*;
//!
//! let registry = ThreadRegistry::new();
//! let heap = ObjectHeap::new();
//! let protocol = MonitorProtocol::new(BackoffFallback::new(registry.clone()));
//!
//! let thread = registry.attach();
//! let object = heap.allocate(ClassInfo::with_lockword("java.lang.Object"));
//!
//! protocol.enter(&thread, &object, false)?;
//! assert!(protocol.holds_lock(&thread, &object));
//! protocol.exit(&thread, &object, false)?;
//! assert_eq!(thread.owned_monitor_count(), 0);
//! # Ok::<(), lockword::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`lockword`] - Bit layout of the lock word and its atomic cell
//! - [`object`] - Minimal object and class model
//! - [`thread`] - Thread contexts and owner tags
//! - [`cache`] - Per-thread lookup of external lock words
//! - [`protocol`] - The enter and exit fast paths
//! - [`gateway`] - The slow-path interface and the bundled [`BackoffFallback`]
//! - [`config`] - Spin limits, reservation policy and backoff
//! - [`stats`] - Fast-path counters
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: delegations and cache fills at `trace`,
//! thread attachment and reservation cancellation at `debug`, and caller defects such as
//! releasing an unowned monitor at `warn`. Install any `log` implementation to see them.

#[macro_use]
pub(crate) mod macros;

pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use lockword::prelude::*;
///
/// let registry = ThreadRegistry::new();
/// let protocol = MonitorProtocol::new(BackoffFallback::new(registry.clone()));
/// assert_eq!(protocol.config(), &LockingConfig::default());
/// ```
pub mod prelude;

/// Lock word layout, encoding and atomic access.
///
/// # Key Types
///
/// - [`lockword::LockWord`] - A raw word with pure encode and decode operations
/// - [`lockword::LockState`] - The logical state a word encodes
/// - [`lockword::LockWordCell`] - The atomic cell a word lives in
/// - [`lockword::OwnerTag`] - Thread identity as stored in a word
pub mod lockword;

/// Lockable objects, their classes and an identity allocator.
pub mod object;

/// Thread contexts, owner tag assignment and reservation revocation requests.
pub mod thread;

/// Per-thread cache from object identity to external lock word.
pub mod cache;

/// Monitor enter and exit fast paths.
pub mod protocol;

/// The heavyweight monitor interface and its implementations.
pub mod gateway;

/// Configuration of the protocols and the bundled fallback.
pub mod config;

/// Fast-path counters.
pub mod stats;

/// `lockword` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `lockword` Error type
///
/// Every error originates in a [`MonitorFallback`]; the fast paths return fallback results
/// unchanged.
///
/// # Examples
///
/// ```rust
/// use lockword::prelude::*;
///
/// let registry = ThreadRegistry::new();
/// let heap = ObjectHeap::new();
/// let protocol = MonitorProtocol::new(BackoffFallback::new(registry.clone()));
/// let thread = registry.attach();
/// let object = heap.allocate(ClassInfo::with_lockword("java.lang.Object"));
///
/// match protocol.exit(&thread, &object, false) {
///     Err(Error::NotOwner(id)) => println!("{id} is not locked by this thread"),
///     Err(e) => println!("Error: {e}"),
///     Ok(()) => unreachable!(),
/// }
/// ```
pub use error::Error;

pub use cache::MonitorLookupCache;
pub use config::{BackoffConfig, LockingConfig, ReservationPolicy};
pub use gateway::{BackoffFallback, FallbackCalls, FallbackId, MonitorFallback, RecordingFallback};
pub use protocol::MonitorProtocol;
pub use stats::{DelegationReason, FastPathStats, StatsSnapshot};
pub use thread::{ThreadContext, ThreadRegistry};
