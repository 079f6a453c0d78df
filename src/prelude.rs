//! # lockword Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the lockword library. Import this module to get quick access to everything needed
//! to lock objects through the fast paths.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all lockword operations
pub use crate::Error;

/// The result type used throughout lockword
pub use crate::Result;

// ================================================================================================
// Protocols
// ================================================================================================

/// Monitor enter and exit fast paths
pub use crate::protocol::MonitorProtocol;

/// Slow-path interface and its implementations
pub use crate::gateway::{
    lock_word_of, BackoffFallback, FallbackCalls, FallbackId, MonitorFallback, RecordingFallback,
};

// ================================================================================================
// Lock Words
// ================================================================================================

/// Lock word encoding and atomic access
pub use crate::lockword::{LockState, LockWord, LockWordCell, LockWordHandle, OwnerTag};

// ================================================================================================
// Objects and Threads
// ================================================================================================

/// Object model
pub use crate::object::{
    ClassFlags, ClassInfo, ClassRc, ManagedObject, ObjectHeap, ObjectId, ObjectRef,
};

/// Thread contexts
pub use crate::thread::{ThreadContext, ThreadRegistry};

/// Per-thread lookup of external lock words
pub use crate::cache::MonitorLookupCache;

// ================================================================================================
// Configuration and Instrumentation
// ================================================================================================

/// Configuration types
pub use crate::config::{BackoffConfig, LockingConfig, ReservationPolicy};

/// Fast-path counters
pub use crate::stats::{DelegationReason, FastPathStats, StatsSnapshot};
