//! Opaque value carrier
//!
//! A capsule hands a raw native resource to the foreign runtime together with
//! the function that releases it. The destructor lives in the capsule's
//! context slot and runs once, when the runtime finalizes the capsule.

use std::ffi::c_void;
use std::ptr;

use crate::fail;
use crate::handle::{Capsule, ForeignObject, Object};
use crate::raw::RawObject;
use crate::runtime::ForeignRuntime;

/// Releases the resource stored in a capsule
pub type Destructor = unsafe fn(*mut c_void);

/// Finalizer installed on every capsule
fn capsule_free(rt: &dyn ForeignRuntime, capsule: RawObject) {
    let context = rt.capsule_context(capsule);
    if context.is_null() {
        return;
    }

    // SAFETY: the context slot only ever holds a `Destructor` stored by
    // `capsule_new`.
    let destructor = unsafe { std::mem::transmute::<*mut c_void, Destructor>(context) };
    let pointer = rt.capsule_pointer(capsule);
    log::trace!("capsule {:?}: running destructor on {:p}", capsule, pointer);

    // SAFETY: the destructor was registered for exactly this pointer.
    unsafe { destructor(pointer) }
}

/// Wrap `pointer` in a new capsule that calls `destructor` on it when
/// finalized.
///
/// Allocation failure is an invariant violation and aborts the process; the
/// destructor is never called for a capsule that was not created.
pub fn capsule_new<'rt>(
    rt: &'rt dyn ForeignRuntime,
    pointer: *mut c_void,
    destructor: Option<Destructor>,
) -> Capsule<'rt> {
    let Some(raw) = rt.capsule_new(pointer, capsule_free) else {
        fail!("tether::capsule_new(): allocation failed!");
    };

    let context = destructor.map_or(ptr::null_mut(), |destructor| destructor as *mut c_void);
    if !rt.capsule_set_context(raw, context) {
        fail!("tether::capsule_new(): could not set context!");
    }

    Capsule::from_object_unchecked(Object::steal(rt, raw))
}

unsafe fn drop_box<T>(pointer: *mut c_void) {
    drop(Box::from_raw(pointer.cast::<T>()));
}

impl<'rt> Capsule<'rt> {
    /// Hand a boxed value to the runtime; it is dropped with the capsule
    pub fn from_box<T>(rt: &'rt dyn ForeignRuntime, value: Box<T>) -> Self {
        capsule_new(rt, Box::into_raw(value).cast(), Some(drop_box::<T> as Destructor))
    }

    /// Stored pointer
    pub fn pointer(&self) -> *mut c_void {
        self.runtime().capsule_pointer(self.ptr())
    }
}
