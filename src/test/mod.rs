//! Shared helpers for unit tests.

use dashmap::DashMap;

use crate::{
    cache::MonitorLookupCache,
    gateway::{FallbackId, MonitorFallback, RecordingFallback},
    lockword::{LockWordCell, LockWordHandle},
    object::{ManagedObject, ObjectId, ObjectRef},
    thread::ThreadContext,
    Error, Result,
};

/// Fallback that never touches a lock word.
///
/// Enter and exit succeed immediately, except that value-based objects are rejected the way
/// a real fallback rejects them. External words are allocated like [`crate::BackoffFallback`]
/// does, so objects without an embedded word can be locked.
pub struct StubFallback {
    id: FallbackId,
    slots: boxcar::Vec<LockWordCell>,
    slot_index: DashMap<ObjectId, LockWordHandle>,
}

impl Default for StubFallback {
    fn default() -> Self {
        Self {
            id: FallbackId::unique(),
            slots: boxcar::Vec::new(),
            slot_index: DashMap::new(),
        }
    }
}

impl MonitorFallback for StubFallback {
    fn instance_id(&self) -> FallbackId {
        self.id
    }

    fn enter(&self, _thread: &ThreadContext, object: &ObjectRef) -> Result<()> {
        if object.class().is_value_based() {
            return Err(Error::IllegalMonitorState {
                object: object.id(),
                class: object.class().name().to_string(),
            });
        }
        Ok(())
    }

    fn exit(&self, _thread: &ThreadContext, _object: &ObjectRef) -> Result<()> {
        Ok(())
    }

    fn resolve_or_create_external_slot(&self, object: &ManagedObject) -> LockWordHandle {
        *self
            .slot_index
            .entry(object.id())
            .or_insert_with(|| LockWordHandle(self.slots.push(LockWordCell::new()) as u32))
    }

    fn external_slot(&self, handle: LockWordHandle) -> &LockWordCell {
        &self.slots[handle.value() as usize]
    }
}

/// [`StubFallback`] with call counting.
pub type CountingFallback = RecordingFallback<StubFallback>;

/// Returns two distinct object identities that share a lookup cache line.
pub fn colliding_ids() -> (ObjectId, ObjectId) {
    let first = ObjectId::new(1).unwrap();
    let line = MonitorLookupCache::line_index(first);
    let second = (2..)
        .filter_map(ObjectId::new)
        .find(|id| MonitorLookupCache::line_index(*id) == line)
        .unwrap();
    (first, second)
}
