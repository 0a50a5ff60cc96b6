//! Engine - in-process foreign object runtime
//!
//! Owns the object heap, the pending-error slot, the instance type registry
//! and the parent/child link table. Every table sits behind its own lock;
//! no lock is held while user code runs (capsule finalizers, drop shims,
//! implicit conversions), so that code may call back into the engine.

mod ops;
mod runtime;

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tether_sdk::{fail, ForeignException, ForeignRuntime, Handle, RawObject, TypeKey};

use crate::error::EngineError;
use crate::heap::{Heap, HeapStats, Release};
use crate::object::ObjectData;
use crate::options::EngineOptions;
use crate::registry::{LinkTable, TypeInfo, TypeTable};

/// In-process foreign object runtime
pub struct Engine {
    /// Creation options
    options: EngineOptions,

    /// Object heap
    heap: Mutex<Heap>,

    /// Pending error slot
    error: Mutex<Option<ForeignException>>,

    /// Registered native types
    types: RwLock<TypeTable>,

    /// Parent/child lifetime links
    links: Mutex<LinkTable>,

    none: RawObject,
    true_obj: RawObject,
    false_obj: RawObject,
}

impl Engine {
    /// Create an engine with default options
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    /// Create an engine with the given options
    pub fn with_options(options: EngineOptions) -> Self {
        let mut heap = Heap::new(options.limits.max_objects);
        let none = heap.alloc_immortal(ObjectData::None);
        let true_obj = heap.alloc_immortal(ObjectData::Bool(true));
        let false_obj = heap.alloc_immortal(ObjectData::Bool(false));

        Self {
            options,
            heap: Mutex::new(heap),
            error: Mutex::new(None),
            types: RwLock::new(TypeTable::new()),
            links: Mutex::new(LinkTable::default()),
            none,
            true_obj,
            false_obj,
        }
    }

    /// Options this engine was created with
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    // ========================================================================
    // Type Registration
    // ========================================================================

    /// Register a copyable native type under a foreign type name
    pub fn register_type<T: Clone + 'static>(&self, name: &'static str) {
        self.types.write().insert(TypeInfo::copyable::<T>(name));
    }

    /// Register a native type that can be moved, adopted or referenced, but
    /// not copied
    pub fn register_opaque<T: 'static>(&self, name: &'static str) {
        self.types.write().insert(TypeInfo::new::<T>(name));
    }

    /// Register an implicit conversion into `T`, tried when loading with
    /// `convert`. Returns `false` if `T` is not registered.
    pub fn register_implicit<T: 'static>(
        &self,
        convert: for<'a> fn(&'a dyn ForeignRuntime, Handle) -> Option<T>,
    ) -> bool {
        let mut types = self.types.write();
        let Some(info) = types.get_mut(std::any::TypeId::of::<T>()) else {
            return false;
        };
        info.implicit.push(Arc::new(move |rt: &dyn ForeignRuntime, src: Handle| {
            convert(rt, src).map(|value| NonNull::from(Box::leak(Box::new(value))).cast())
        }));
        true
    }

    /// Whether `T` is registered
    pub fn is_type_registered<T: 'static>(&self) -> bool {
        self.types.read().contains(TypeKey::of::<T>())
    }

    // ========================================================================
    // Containers
    // ========================================================================

    /// New empty list
    pub fn new_list(&self) -> Option<RawObject> {
        self.alloc(ObjectData::List(Vec::new()))
    }

    /// Append to a list, acquiring a reference to `item`
    pub fn list_append(&self, list: RawObject, item: RawObject) -> bool {
        self.inc_ref(item);
        let appended = {
            let mut heap = self.heap.lock();
            match heap.get_mut(list).map(|slot| &mut slot.data) {
                Some(ObjectData::List(items)) => {
                    items.push(item);
                    true
                }
                _ => false,
            }
        };

        if !appended {
            self.dec_ref(item);
            self.set_error(EngineError::Type("list_append() requires a list".to_string()));
        }
        appended
    }

    /// New empty dict
    pub fn new_dict(&self) -> Option<RawObject> {
        self.alloc(ObjectData::Dict(Vec::new()))
    }

    /// New empty attribute bag
    pub fn new_namespace(&self) -> Option<RawObject> {
        self.alloc(ObjectData::Namespace(Default::default()))
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Current reference count, `None` once finalized
    pub fn ref_count(&self, obj: RawObject) -> Option<usize> {
        self.heap.lock().get(obj).map(|slot| slot.refcount)
    }

    /// Whether `obj` has not been finalized
    pub fn is_alive(&self, obj: RawObject) -> bool {
        self.heap.lock().contains(obj)
    }

    /// Heap statistics
    pub fn stats(&self) -> HeapStats {
        self.heap.lock().stats()
    }

    /// Number of live parent/child links
    pub fn link_count(&self) -> usize {
        self.links.lock().len()
    }

    /// Parents kept alive by `child`
    pub fn parents_of(&self, child: RawObject) -> Vec<RawObject> {
        self.links.lock().parents_of(child).to_vec()
    }

    /// Whether an instance wrapper owns its native instance. `None` for
    /// anything but an instance.
    pub fn instance_owns(&self, obj: RawObject) -> Option<bool> {
        self.data(obj, |data| match data {
            ObjectData::Instance(instance) => Some(instance.drop_fn.is_some()),
            _ => None,
        })
    }

    /// The pending error, left in place
    pub fn peek_error(&self) -> Option<ForeignException> {
        self.error.lock().clone()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Make `err` the pending error
    pub(crate) fn set_error(&self, err: EngineError) {
        *self.error.lock() = Some(err.into());
    }

    /// Allocate, recording a pending error on failure
    pub(crate) fn alloc(&self, data: ObjectData) -> Option<RawObject> {
        let result = self.heap.lock().alloc(data);
        match result {
            Ok(raw) => Some(raw),
            Err(err) => {
                log::trace!("allocation failed: {}", err);
                self.set_error(err);
                None
            }
        }
    }

    /// Allocate a container, acquiring a reference to every item on success
    pub(crate) fn alloc_container(&self, data: ObjectData) -> Option<RawObject> {
        let items = data.references();
        let raw = self.alloc(data)?;
        for item in items {
            self.inc_ref(item);
        }
        Some(raw)
    }

    /// Read an object under the heap lock. `f` must not call into the engine.
    pub(crate) fn data<R>(&self, obj: RawObject, f: impl FnOnce(&ObjectData) -> R) -> R {
        let heap = self.heap.lock();
        match heap.get(obj) {
            Some(slot) => f(&slot.data),
            None => {
                drop(heap);
                fail!("tether-engine: use of finalized object {:?}", obj)
            }
        }
    }

    /// Mutate an object under the heap lock. `f` must not call into the engine.
    pub(crate) fn data_mut<R>(&self, obj: RawObject, f: impl FnOnce(&mut ObjectData) -> R) -> R {
        let mut heap = self.heap.lock();
        match heap.get_mut(obj) {
            Some(slot) => f(&mut slot.data),
            None => {
                drop(heap);
                fail!("tether-engine: use of finalized object {:?}", obj)
            }
        }
    }

    /// Release one reference to each object, finalizing the ones that die.
    ///
    /// Iterative; long chains of containers do not recurse.
    pub(crate) fn release_all(&self, objects: Vec<RawObject>) {
        let mut pending = objects;
        while let Some(raw) = pending.pop() {
            let release = self.heap.lock().dec_ref(raw);
            match release {
                Some(Release::Alive) => {}
                Some(Release::Dead) => self.finalize(raw, &mut pending),
                None => fail!("tether-engine: release of finalized object {:?}", raw),
            }
        }
    }

    fn finalize(&self, raw: RawObject, pending: &mut Vec<RawObject>) {
        // Capsule finalizers run while the capsule can still be inspected.
        let finalizer = self.data(raw, |data| match data {
            ObjectData::Capsule(capsule) => Some(capsule.finalizer),
            _ => None,
        });
        if let Some(finalizer) = finalizer {
            finalizer(self, raw);
        }

        let removed = self.heap.lock().remove(raw);
        let Some(data) = removed else {
            return;
        };

        pending.extend(data.references());
        pending.extend(self.links.lock().remove_child(raw));

        if let ObjectData::Instance(instance) = data {
            if let Some(drop_fn) = instance.drop_fn {
                log::debug!("finalize {} instance {:?}", instance.name, raw);
                // SAFETY: owning wrappers hold a leaked `Box` of this type.
                unsafe { drop_fn(instance.value) };
            }
        }
    }

    /// Capsule payload accessor
    fn capsule_field(&self, capsule: RawObject, f: fn(&crate::object::CapsuleData) -> *mut c_void) -> *mut c_void {
        self.data(capsule, |data| match data {
            ObjectData::Capsule(capsule) => f(capsule),
            _ => std::ptr::null_mut(),
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("options", &self.options)
            .field("stats", &self.stats())
            .field("links", &self.link_count())
            .finish()
    }
}
