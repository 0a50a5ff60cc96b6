//! Reference-counted object heap
//!
//! Objects live in a slot table keyed by identity. Identities are never
//! reused, so a stale identity is always detected. The heap only does the
//! bookkeeping: finalization (releasing children, running capsule finalizers
//! and drop shims) is driven by the engine, outside the heap lock.

use rustc_hash::FxHashMap;
use tether_sdk::RawObject;

use crate::error::{EngineError, EngineResult};
use crate::object::ObjectData;

/// One heap slot
#[derive(Debug)]
pub struct Slot {
    /// Current reference count
    pub refcount: usize,
    /// Object contents
    pub data: ObjectData,
    /// Never finalized (singletons)
    pub immortal: bool,
}

/// Outcome of releasing one reference
#[derive(Debug)]
pub enum Release {
    /// References remain
    Alive,
    /// The count reached zero; the object must be finalized
    Dead,
}

/// Heap statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Objects currently alive, singletons excluded
    pub live_objects: usize,
    /// Objects allocated since creation
    pub total_allocated: usize,
    /// Objects finalized since creation
    pub total_finalized: usize,
    /// Highest number of live objects
    pub peak_live: usize,
}

/// Slot table
#[derive(Debug)]
pub struct Heap {
    slots: FxHashMap<u64, Slot>,
    next_id: u64,
    max_objects: Option<usize>,
    stats: HeapStats,
}

impl Heap {
    /// Create an empty heap
    pub fn new(max_objects: Option<usize>) -> Self {
        Self {
            slots: FxHashMap::default(),
            next_id: 1,
            max_objects,
            stats: HeapStats::default(),
        }
    }

    fn next_raw(&mut self) -> RawObject {
        let id = self.next_id;
        self.next_id += 1;
        match RawObject::from_bits(id) {
            Some(raw) => raw,
            None => tether_sdk::fail!("tether-engine: object identity space exhausted"),
        }
    }

    /// Allocate an immortal object, exempt from the object limit
    pub fn alloc_immortal(&mut self, data: ObjectData) -> RawObject {
        let raw = self.next_raw();
        self.slots.insert(
            raw.to_bits(),
            Slot {
                refcount: 1,
                data,
                immortal: true,
            },
        );
        raw
    }

    /// Allocate an object with a count of one
    pub fn alloc(&mut self, data: ObjectData) -> EngineResult<RawObject> {
        if let Some(limit) = self.max_objects {
            if self.stats.live_objects >= limit {
                return Err(EngineError::ObjectLimit(limit));
            }
        }

        let raw = self.next_raw();
        self.slots.insert(
            raw.to_bits(),
            Slot {
                refcount: 1,
                data,
                immortal: false,
            },
        );

        self.stats.live_objects += 1;
        self.stats.total_allocated += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.stats.live_objects);
        Ok(raw)
    }

    /// Slot of a live object
    pub fn get(&self, raw: RawObject) -> Option<&Slot> {
        self.slots.get(&raw.to_bits())
    }

    /// Mutable slot of a live object
    pub fn get_mut(&mut self, raw: RawObject) -> Option<&mut Slot> {
        self.slots.get_mut(&raw.to_bits())
    }

    /// Whether `raw` is alive
    pub fn contains(&self, raw: RawObject) -> bool {
        self.slots.contains_key(&raw.to_bits())
    }

    /// Acquire one reference. Returns `false` for a dead object.
    pub fn inc_ref(&mut self, raw: RawObject) -> bool {
        match self.get_mut(raw) {
            Some(slot) => {
                slot.refcount += 1;
                true
            }
            None => false,
        }
    }

    /// Release one reference. `None` for a dead object.
    pub fn dec_ref(&mut self, raw: RawObject) -> Option<Release> {
        let slot = self.get_mut(raw)?;
        if slot.immortal {
            slot.refcount = slot.refcount.saturating_sub(1);
            return Some(Release::Alive);
        }
        slot.refcount = slot.refcount.checked_sub(1)?;
        if slot.refcount == 0 {
            Some(Release::Dead)
        } else {
            Some(Release::Alive)
        }
    }

    /// Remove a dead object, returning its contents
    pub fn remove(&mut self, raw: RawObject) -> Option<ObjectData> {
        let slot = self.slots.remove(&raw.to_bits())?;
        self.stats.live_objects -= 1;
        self.stats.total_finalized += 1;
        Some(slot.data)
    }

    /// Current statistics
    pub fn stats(&self) -> HeapStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::IntValue;

    #[test]
    fn test_alloc_and_release() {
        let mut heap = Heap::new(None);
        let raw = heap.alloc(ObjectData::Int(IntValue::from(1i32))).unwrap();
        assert!(heap.inc_ref(raw));
        assert!(matches!(heap.dec_ref(raw), Some(Release::Alive)));
        assert!(matches!(heap.dec_ref(raw), Some(Release::Dead)));
        assert!(heap.remove(raw).is_some());
        assert!(!heap.contains(raw));
        assert_eq!(heap.stats().total_finalized, 1);
        assert_eq!(heap.stats().live_objects, 0);
    }

    #[test]
    fn test_identities_are_not_reused() {
        let mut heap = Heap::new(None);
        let first = heap.alloc(ObjectData::None).unwrap();
        heap.dec_ref(first);
        heap.remove(first);
        let second = heap.alloc(ObjectData::None).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_object_limit() {
        let mut heap = Heap::new(Some(2));
        heap.alloc_immortal(ObjectData::None);
        heap.alloc(ObjectData::Float(1.0)).unwrap();
        heap.alloc(ObjectData::Float(2.0)).unwrap();
        assert_eq!(
            heap.alloc(ObjectData::Float(3.0)).unwrap_err(),
            EngineError::ObjectLimit(2)
        );
        assert_eq!(heap.stats().peak_live, 2);
    }

    #[test]
    fn test_immortal_is_never_dead() {
        let mut heap = Heap::new(None);
        let raw = heap.alloc_immortal(ObjectData::Bool(true));
        assert!(matches!(heap.dec_ref(raw), Some(Release::Alive)));
        assert!(heap.contains(raw));
    }
}
