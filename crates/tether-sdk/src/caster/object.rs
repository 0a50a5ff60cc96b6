//! Passthrough casters for foreign handles
//!
//! No conversion happens here: `load` checks the runtime type and keeps a
//! reference to the object itself, `cast` hands out one more reference to
//! it. The return value policy has no effect since no storage is created.

use std::marker::PhantomData;

use super::{Caster, Castable, Native, Source};
use crate::error::{ForeignErrorKind, ForeignException};
use crate::handle::{Capsule, Float, ForeignObject, Handle, Int, List, Object, Str, Tuple};
use crate::policy::RvPolicy;
use crate::runtime::ForeignRuntime;

fn invalid_source(rt: &dyn ForeignRuntime) -> Handle {
    rt.err_restore(ForeignException::new(
        ForeignErrorKind::TypeError,
        "cannot cast an invalid handle",
    ));
    Handle::invalid()
}

// ============================================================================
// Borrowed
// ============================================================================

/// Caster for [`Handle`]. The loaded handle is borrowed from the source.
#[derive(Debug, Default)]
pub struct BorrowedCaster {
    value: Option<Handle>,
}

impl<'rt> Castable<'rt> for Handle {
    type Caster = BorrowedCaster;
}

impl<'rt> Caster<'rt> for BorrowedCaster {
    type Value = Handle;

    fn type_name() -> String {
        "object".to_string()
    }

    fn load(&mut self, _rt: &'rt dyn ForeignRuntime, src: Handle, _convert: bool) -> bool {
        if src.is_valid() {
            self.value = Some(src);
            true
        } else {
            false
        }
    }

    fn cast(rt: &'rt dyn ForeignRuntime, src: Source<'_, Handle>, policy: RvPolicy, _parent: Handle) -> Handle {
        let handle = src.with_value(policy, |handle| *handle);
        if !handle.is_valid() {
            return invalid_source(rt);
        }
        handle.inc_ref(rt)
    }

    fn into_value(self) -> Option<Handle> {
        self.value
    }
}

// ============================================================================
// Owning
// ============================================================================

/// Caster for owning handle types. The loaded value holds its own reference.
pub struct ObjectCaster<'rt, H> {
    value: Option<H>,
    marker: PhantomData<Object<'rt>>,
}

impl<H> Default for ObjectCaster<'_, H> {
    fn default() -> Self {
        Self {
            value: None,
            marker: PhantomData,
        }
    }
}

impl<'rt, H: ForeignObject<'rt>> Caster<'rt> for ObjectCaster<'rt, H> {
    type Value = H;

    fn type_name() -> String {
        H::NAME.to_string()
    }

    fn load(&mut self, rt: &'rt dyn ForeignRuntime, src: Handle, _convert: bool) -> bool {
        let Some(raw) = src.ptr() else {
            return false;
        };

        if !H::check(rt, raw) {
            log::trace!("load {}: got '{}'", H::NAME, rt.type_name(raw));
            return false;
        }

        self.value = Some(H::from_object_unchecked(Object::own(rt, raw)));
        true
    }

    fn cast(rt: &'rt dyn ForeignRuntime, src: Source<'_, H>, policy: RvPolicy, _parent: Handle) -> Handle {
        match src.into_native() {
            // The moved-in reference becomes the result.
            Native::Rvalue(value) => value.into_object().release(),
            Native::Lvalue(value) => value.as_object().handle().inc_ref(rt),
            Native::Pointer(ptr) => {
                // SAFETY: pointer sources are valid for the duration of the cast.
                let source = unsafe { Source::pointer(ptr) };
                source.with_value(policy, |value| value.as_object().handle().inc_ref(rt))
            }
        }
    }

    fn into_value(self) -> Option<H> {
        self.value
    }
}

macro_rules! object_castable {
    ($($name:ident),*) => {$(
        impl<'rt> Castable<'rt> for $name<'rt> {
            type Caster = ObjectCaster<'rt, $name<'rt>>;
        }
    )*};
}

object_castable!(Object, Str, Int, Float, Tuple, List, Capsule);
