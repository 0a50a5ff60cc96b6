//! Caster dispatch table
//!
//! A caster converts one native type to and from foreign objects. The
//! converter for a type is selected at compile time through [`Castable`];
//! [`crate::dispatch::CasterTable`] offers the same converters keyed by type
//! identity at runtime.
//!
//! # Contract
//!
//! - [`Caster::load`] fills the native value slot and returns `true`, or
//!   returns `false` without a pending error. Any reference it acquired along
//!   the way is released before it returns.
//! - [`Caster::cast`] returns a new reference, or [`Handle::invalid`] with a
//!   pending error. An invalid result never needs a release, and no partially
//!   built container is ever exposed.

mod generic;
mod number;
mod object;
mod singleton;
mod string;
mod tuple;

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::handle::Handle;
use crate::policy::{RvPolicy, ValueCategory};
use crate::runtime::ForeignRuntime;

pub use generic::GenericCaster;
pub use number::NumberCaster;
pub use object::{BorrowedCaster, ObjectCaster};
pub use singleton::{BoolCaster, UnitCaster};
pub use string::StringCaster;
pub use tuple::{Tuple1Caster, Tuple2Caster, Tuple3Caster, Tuple4Caster};

// ============================================================================
// Traits
// ============================================================================

/// Bidirectional converter for one native type
pub trait Caster<'rt>: Default {
    /// Native type produced by `load` and consumed by `cast`
    type Value;

    /// Foreign-side description of the type, for diagnostics
    fn type_name() -> String;

    /// Try to fill the value slot from `src`. With `convert`, implicit
    /// conversions between foreign types are allowed.
    fn load(&mut self, rt: &'rt dyn ForeignRuntime, src: Handle, convert: bool) -> bool;

    /// Produce a foreign object from a native value
    fn cast(
        rt: &'rt dyn ForeignRuntime,
        src: Source<'_, Self::Value>,
        policy: RvPolicy,
        parent: Handle,
    ) -> Handle;

    /// Take the loaded value
    fn into_value(self) -> Option<Self::Value>;
}

/// Native type with a caster
pub trait Castable<'rt>: Sized {
    /// The converter for this type
    type Caster: Caster<'rt, Value = Self>;
}

/// Caster selected for `T`
pub type CasterOf<'rt, T> = <T as Castable<'rt>>::Caster;

// ============================================================================
// Source
// ============================================================================

enum SourceInner<'a, T> {
    Pointer(NonNull<T>, PhantomData<&'a mut T>),
    Lvalue(&'a T),
    Rvalue(T),
}

/// Native value handed to [`Caster::cast`], tagged with its value category
pub struct Source<'a, T> {
    inner: SourceInner<'a, T>,
}

/// A [`Source`] taken apart
pub enum Native<'a, T> {
    /// Pointer to an instance whose fate the policy decides
    Pointer(NonNull<T>),
    /// Shared borrow
    Lvalue(&'a T),
    /// Owned value
    Rvalue(T),
}

impl<'a, T> Source<'a, T> {
    /// Owned value, consumed by the cast
    pub fn value(value: T) -> Self {
        Self {
            inner: SourceInner::Rvalue(value),
        }
    }

    /// Shared borrow, valid for the duration of the cast
    pub fn borrowed(value: &'a T) -> Self {
        Self {
            inner: SourceInner::Lvalue(value),
        }
    }

    /// Pointer to a native instance.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live `T`. Depending on the policy it is cast
    /// with, additionally:
    /// - `Automatic`/`TakeOwnership`: `ptr` comes from `Box::into_raw` and
    ///   the cast adopts it, whether it succeeds or not.
    /// - `Reference`/`ReferenceInternal`/`AutomaticReference`: the pointee
    ///   outlives every foreign object that refers to it.
    pub unsafe fn pointer(ptr: NonNull<T>) -> Self {
        Self {
            inner: SourceInner::Pointer(ptr, PhantomData),
        }
    }

    /// Value category of this source
    pub fn category(&self) -> ValueCategory {
        match self.inner {
            SourceInner::Pointer(..) => ValueCategory::Pointer,
            SourceInner::Lvalue(_) => ValueCategory::Lvalue,
            SourceInner::Rvalue(_) => ValueCategory::Rvalue,
        }
    }

    /// Take the source apart
    pub fn into_native(self) -> Native<'a, T> {
        match self.inner {
            SourceInner::Pointer(ptr, _) => Native::Pointer(ptr),
            SourceInner::Lvalue(value) => Native::Lvalue(value),
            SourceInner::Rvalue(value) => Native::Rvalue(value),
        }
    }

    /// Read the value for a caster that always builds a fresh foreign object.
    ///
    /// A pointer source is adopted, and dropped after reading, when `policy`
    /// asks for ownership to be taken.
    pub fn with_value<R>(self, policy: RvPolicy, f: impl FnOnce(&T) -> R) -> R {
        match self.inner {
            SourceInner::Rvalue(value) => f(&value),
            SourceInner::Lvalue(value) => f(value),
            SourceInner::Pointer(ptr, _) => {
                if matches!(policy, RvPolicy::Automatic | RvPolicy::TakeOwnership) {
                    // SAFETY: adopting policies require a `Box` allocation.
                    let owned = unsafe { Box::from_raw(ptr.as_ptr()) };
                    f(&owned)
                } else {
                    // SAFETY: the pointee is live for the duration of the cast.
                    f(unsafe { ptr.as_ref() })
                }
            }
        }
    }
}

/// Cast through the caster selected for `T`
pub(crate) fn cast_with<'rt, T: Castable<'rt>>(
    rt: &'rt dyn ForeignRuntime,
    src: Source<'_, T>,
    policy: RvPolicy,
    parent: Handle,
) -> Handle {
    <CasterOf<'rt, T> as Caster<'rt>>::cast(rt, src, policy, parent)
}

/// Load through the caster selected for `T`
pub(crate) fn load_with<'rt, T: Castable<'rt>>(
    rt: &'rt dyn ForeignRuntime,
    src: Handle,
    convert: bool,
) -> Option<T> {
    let mut caster = <CasterOf<'rt, T> as Default>::default();
    if caster.load(rt, src, convert) {
        caster.into_value()
    } else {
        None
    }
}

/// Type name reported by the caster selected for `T`
pub fn type_name_of<'rt, T: Castable<'rt>>() -> String {
    <CasterOf<'rt, T> as Caster<'rt>>::type_name()
}
