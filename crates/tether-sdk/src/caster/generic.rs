//! Generic fallback caster
//!
//! Native types without a specialized caster are wrapped and unwrapped by the
//! runtime's [`TypeRegistry`]. This caster only resolves the return value
//! policy and forwards the instance pointer; allocation, copying and parent
//! links are the registry's business.

use std::mem::ManuallyDrop;
use std::ptr::NonNull;

use super::{Caster, Native, Source};
use crate::error::{ForeignErrorKind, ForeignException};
use crate::handle::{Handle, Object};
use crate::policy::RvPolicy;
use crate::runtime::{ForeignRuntime, TypeKey};

/// Caster for a type registered with the runtime's type registry.
///
/// A loaded value lives inside its foreign owner, which the caster keeps
/// alive for as long as it holds the value.
pub struct GenericCaster<'rt, T> {
    slot: Option<(Object<'rt>, NonNull<T>)>,
}

impl<T> Default for GenericCaster<'_, T> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<'rt, T: 'static> GenericCaster<'rt, T> {
    /// The loaded instance
    pub fn get(&self) -> Option<&T> {
        // SAFETY: the owner keeps the instance alive while the slot is filled.
        self.slot.as_ref().map(|(_, value)| unsafe { value.as_ref() })
    }

    /// Pointer to the loaded instance, valid while this caster is alive
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.slot.as_ref().map(|(_, value)| *value)
    }

    /// Foreign object holding the loaded instance
    pub fn owner(&self) -> Option<&Object<'rt>> {
        self.slot.as_ref().map(|(owner, _)| owner)
    }

    /// Locate an instance of `T` inside `src`
    pub fn load_instance(&mut self, rt: &'rt dyn ForeignRuntime, src: Handle, convert: bool) -> bool {
        let Some(raw) = src.ptr() else {
            return false;
        };

        match rt.types().type_get(TypeKey::of::<T>(), raw, convert) {
            Some(found) => {
                self.slot = Some((Object::steal(rt, found.owner), found.value.cast()));
                true
            }
            None => {
                log::trace!(
                    "load {}: no instance in '{}'",
                    std::any::type_name::<T>(),
                    rt.type_name(raw)
                );
                false
            }
        }
    }

    /// Wrap a native instance through the type registry.
    ///
    /// Does not require `T: Clone`; the registry refuses `Copy` for types
    /// registered without a copy shim.
    pub fn cast_instance(
        rt: &'rt dyn ForeignRuntime,
        src: Source<'_, T>,
        policy: RvPolicy,
        parent: Handle,
    ) -> Handle {
        let key = TypeKey::of::<T>();
        let types = rt.types();

        let resolved = if types.is_registered(key) {
            policy
                .resolve(src.category(), parent.is_valid())
                .map_err(|err| {
                    log::warn!("cast {}: {}", key.name(), err);
                    err.to_string()
                })
        } else {
            Err(format!("type '{}' is not registered", key.name()))
        };

        let resolved = match resolved {
            Ok(resolved) => resolved,
            Err(message) => {
                // Drops an owned or adopted value.
                src.with_value(policy, |_| ());
                rt.err_restore(ForeignException::new(ForeignErrorKind::TypeError, message));
                return Handle::invalid();
            }
        };

        let parent = match resolved {
            RvPolicy::ReferenceInternal => parent.ptr(),
            _ => None,
        };

        let result = match src.into_native() {
            Native::Pointer(ptr) => {
                // SAFETY: pointer sources satisfy the policy they are cast with.
                let result = unsafe { types.type_put(key, ptr.cast(), resolved, parent) };
                if result.is_none() && resolved == RvPolicy::TakeOwnership {
                    // SAFETY: the registry did not adopt the allocation.
                    drop(unsafe { Box::from_raw(ptr.as_ptr()) });
                }
                result
            }
            Native::Lvalue(value) => {
                // SAFETY: `Copy` only reads the instance during the call.
                unsafe { types.type_put(key, NonNull::from(value).cast(), resolved, parent) }
            }
            Native::Rvalue(value) => {
                // The registry moves out of the value on every path.
                let mut value = ManuallyDrop::new(value);
                let ptr = NonNull::from(&mut *value).cast();
                // SAFETY: `value` is never dropped here.
                unsafe { types.type_put(key, ptr, resolved, parent) }
            }
        };

        result.into()
    }
}

impl<'rt, T: Clone + 'static> Caster<'rt> for GenericCaster<'rt, T> {
    type Value = T;

    fn type_name() -> String {
        TypeKey::of::<T>().name().to_string()
    }

    fn load(&mut self, rt: &'rt dyn ForeignRuntime, src: Handle, convert: bool) -> bool {
        self.load_instance(rt, src, convert)
    }

    fn cast(rt: &'rt dyn ForeignRuntime, src: Source<'_, T>, policy: RvPolicy, parent: Handle) -> Handle {
        Self::cast_instance(rt, src, policy, parent)
    }

    fn into_value(self) -> Option<T> {
        self.get().cloned()
    }
}

/// Route a native type through [`GenericCaster`] and the runtime's type
/// registry.
///
/// ```ignore
/// #[derive(Clone)]
/// struct Point { x: f64, y: f64 }
///
/// tether_sdk::opaque!(Point);
/// ```
#[macro_export]
macro_rules! opaque {
    ($($ty:ty),* $(,)?) => {$(
        impl<'rt> $crate::caster::Castable<'rt> for $ty {
            type Caster = $crate::caster::GenericCaster<'rt, $ty>;
        }
    )*};
}
