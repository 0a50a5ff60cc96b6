//! Top-level conversions
//!
//! Casters report failure through invalid handles and `false`. These entry
//! points turn that into a [`BridgeResult`], ready for `?`.

use std::ptr::NonNull;

use crate::caster::{self, Castable, Source};
use crate::error::{error_raise, BridgeResult};
use crate::handle::{Handle, Object};
use crate::policy::RvPolicy;
use crate::raise;
use crate::runtime::ForeignRuntime;

/// Adopt a cast result, or convert the failure it left behind
fn finish<'rt>(rt: &'rt dyn ForeignRuntime, result: Handle) -> BridgeResult<Object<'rt>> {
    match Object::steal_handle(rt, result) {
        Some(object) => Ok(object),
        None if rt.err_occurred() => Err(error_raise(rt)),
        None => raise!("tether::cast(): unable to convert native type to a foreign object"),
    }
}

/// Cast an owned value
pub fn cast<'rt, T: Castable<'rt>>(
    rt: &'rt dyn ForeignRuntime,
    value: T,
    policy: RvPolicy,
) -> BridgeResult<Object<'rt>> {
    cast_source(rt, Source::value(value), policy, Handle::invalid())
}

/// Cast a borrowed value
pub fn cast_ref<'rt, T: Castable<'rt>>(
    rt: &'rt dyn ForeignRuntime,
    value: &T,
    policy: RvPolicy,
) -> BridgeResult<Object<'rt>> {
    cast_source(rt, Source::borrowed(value), policy, Handle::invalid())
}

/// Cast a native instance by pointer. A null pointer becomes `None`.
///
/// # Safety
///
/// A non-null `ptr` must satisfy [`Source::pointer`] for `policy`.
pub unsafe fn cast_ptr<'rt, T: Castable<'rt>>(
    rt: &'rt dyn ForeignRuntime,
    ptr: Option<NonNull<T>>,
    policy: RvPolicy,
    parent: Handle,
) -> BridgeResult<Object<'rt>> {
    match ptr {
        Some(ptr) => cast_source(rt, Source::pointer(ptr), policy, parent),
        None => Ok(Object::none(rt)),
    }
}

/// Cast any source, with an optional parent for `ReferenceInternal`
pub fn cast_source<'rt, T: Castable<'rt>>(
    rt: &'rt dyn ForeignRuntime,
    src: Source<'_, T>,
    policy: RvPolicy,
    parent: Handle,
) -> BridgeResult<Object<'rt>> {
    finish(rt, caster::cast_with(rt, src, policy, parent))
}

/// Load a foreign object into a native value
pub fn load<'rt, T: Castable<'rt>>(
    rt: &'rt dyn ForeignRuntime,
    src: Handle,
    convert: bool,
) -> BridgeResult<T> {
    match caster::load_with::<T>(rt, src, convert) {
        Some(value) => Ok(value),
        None => {
            let found = match src.ptr() {
                Some(raw) => rt.type_name(raw),
                None => "<invalid handle>".to_string(),
            };
            raise!(
                "tether::load(): unable to convert '{}' to '{}'",
                found,
                caster::type_name_of::<'rt, T>()
            )
        }
    }
}

/// Load a foreign object into a native value, `None` on mismatch
pub fn try_load<'rt, T: Castable<'rt>>(
    rt: &'rt dyn ForeignRuntime,
    src: Handle,
    convert: bool,
) -> Option<T> {
    caster::load_with::<T>(rt, src, convert)
}
