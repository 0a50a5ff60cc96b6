//! Foreign object handles
//!
//! Two flavors share one representation:
//!
//! - [`Handle`] is borrowed. Creating, copying or dropping it never touches
//!   the reference count. It may be invalid.
//! - [`Object`] is owning. It holds exactly one reference, released on drop.
//!   Moving it does not touch the count; `clone()` acquires one more.
//!
//! Switching flavors is always explicit: [`Object::handle`] borrows,
//! [`Object::steal`] adopts a reference that was already acquired,
//! [`Object::own`] acquires a new one, and [`Object::release`] gives the
//! reference up without decrementing.

use std::fmt;
use std::mem::ManuallyDrop;
use std::ops::Deref;

use crate::accessor::Accessor;
use crate::error::BridgeResult;
use crate::protocol::{self, AttrKey, ItemKey};
use crate::raw::RawObject;
use crate::runtime::{BinaryOp, CompareOp, ForeignRuntime, ObjectKind, UnaryOp};

// ============================================================================
// Borrowed Handle
// ============================================================================

/// Borrowed, possibly invalid reference to a foreign object
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Handle(Option<RawObject>);

impl Handle {
    /// Borrow `raw`
    #[inline]
    pub const fn new(raw: RawObject) -> Self {
        Self(Some(raw))
    }

    /// The invalid handle, used as the failure marker of casts
    #[inline]
    pub const fn invalid() -> Self {
        Self(None)
    }

    /// Whether this handle refers to an object
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// Raw access, without any ownership
    #[inline]
    pub const fn ptr(&self) -> Option<RawObject> {
        self.0
    }

    /// Acquire one reference. Does nothing on an invalid handle.
    #[inline]
    pub fn inc_ref(self, rt: &dyn ForeignRuntime) -> Self {
        if let Some(raw) = self.0 {
            rt.inc_ref(raw);
        }
        self
    }

    /// Release one reference. Does nothing on an invalid handle.
    #[inline]
    pub fn dec_ref(self, rt: &dyn ForeignRuntime) {
        if let Some(raw) = self.0 {
            rt.dec_ref(raw);
        }
    }

    /// Whether this is the runtime's `None` singleton
    pub fn is_none(&self, rt: &dyn ForeignRuntime) -> bool {
        self.0 == Some(rt.none())
    }
}

impl From<RawObject> for Handle {
    fn from(raw: RawObject) -> Self {
        Self::new(raw)
    }
}

impl From<Option<RawObject>> for Handle {
    fn from(raw: Option<RawObject>) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(raw) => write!(f, "Handle({:#x})", raw.to_bits()),
            None => write!(f, "Handle(invalid)"),
        }
    }
}

// ============================================================================
// Owning Object
// ============================================================================

/// Owning reference to a foreign object
pub struct Object<'rt> {
    rt: &'rt dyn ForeignRuntime,
    raw: RawObject,
}

impl<'rt> Object<'rt> {
    /// Adopt a reference that was already acquired (a "new reference")
    #[inline]
    pub fn steal(rt: &'rt dyn ForeignRuntime, raw: RawObject) -> Self {
        Self { rt, raw }
    }

    /// Acquire a new reference to `raw`
    #[inline]
    pub fn own(rt: &'rt dyn ForeignRuntime, raw: RawObject) -> Self {
        rt.inc_ref(raw);
        Self { rt, raw }
    }

    /// Adopt the reference held by a cast result, if it is valid
    #[inline]
    pub fn steal_handle(rt: &'rt dyn ForeignRuntime, handle: Handle) -> Option<Self> {
        handle.ptr().map(|raw| Self::steal(rt, raw))
    }

    /// Acquire a new reference to a borrowed handle, if it is valid
    #[inline]
    pub fn own_handle(rt: &'rt dyn ForeignRuntime, handle: Handle) -> Option<Self> {
        handle.ptr().map(|raw| Self::own(rt, raw))
    }

    /// New reference to the runtime's `None` singleton
    pub fn none(rt: &'rt dyn ForeignRuntime) -> Self {
        Self::own(rt, rt.none())
    }

    /// Borrow without touching the count
    #[inline]
    pub fn handle(&self) -> Handle {
        Handle::new(self.raw)
    }

    /// Raw access, without any ownership
    #[inline]
    pub fn ptr(&self) -> RawObject {
        self.raw
    }

    /// Runtime this object belongs to
    #[inline]
    pub fn runtime(&self) -> &'rt dyn ForeignRuntime {
        self.rt
    }

    /// Give up the reference without decrementing; the caller now owns it
    #[inline]
    pub fn release(self) -> Handle {
        Handle::new(self.into_raw())
    }

    /// Like [`Object::release`], as a raw identity
    #[inline]
    pub fn into_raw(self) -> RawObject {
        let this = ManuallyDrop::new(self);
        this.raw
    }

    /// Runtime type of this object
    pub fn kind(&self) -> ObjectKind {
        self.rt.kind(self.raw)
    }

    /// Whether this is the runtime's `None` singleton
    pub fn is_none(&self) -> bool {
        self.raw == self.rt.none()
    }

    /// Whether both refer to the same object
    pub fn is(&self, other: &Object<'_>) -> bool {
        self.raw == other.raw
    }

    // ========================================================================
    // Protocol Helpers
    // ========================================================================

    /// `len(self)`
    pub fn len(&self) -> BridgeResult<usize> {
        protocol::obj_len(self.rt, self.raw)
    }

    /// `repr(self)` as native text
    pub fn repr(&self) -> BridgeResult<String> {
        let repr = protocol::obj_repr(self.rt, self.raw)?;
        protocol::str_to_string(self.rt, repr.ptr())
    }

    /// `str(self)` as native text
    pub fn str(&self) -> BridgeResult<String> {
        let text = protocol::str_from_obj(self.rt, self.raw)?;
        protocol::str_to_string(self.rt, text.ptr())
    }

    /// Rich comparison
    pub fn compare(&self, other: &Object<'_>, op: CompareOp) -> BridgeResult<bool> {
        protocol::obj_compare(self.rt, self.raw, other.raw, op)
    }

    /// `self == other`
    pub fn eq(&self, other: &Object<'_>) -> BridgeResult<bool> {
        self.compare(other, CompareOp::Eq)
    }

    /// `-self`
    pub fn neg(&self) -> BridgeResult<Object<'rt>> {
        protocol::obj_op_1(self.rt, self.raw, |rt, a| rt.number_unary(UnaryOp::Negative, a))
    }

    /// `abs(self)`
    pub fn abs(&self) -> BridgeResult<Object<'rt>> {
        protocol::obj_op_1(self.rt, self.raw, |rt, a| rt.number_unary(UnaryOp::Absolute, a))
    }

    /// Apply a binary number operator
    pub fn binary(&self, op: BinaryOp, other: &Object<'_>) -> BridgeResult<Object<'rt>> {
        protocol::obj_op_2(self.rt, self.raw, other.raw, |rt, a, b| {
            rt.number_binary(op, a, b)
        })
    }

    /// `self + other`
    pub fn add(&self, other: &Object<'_>) -> BridgeResult<Object<'rt>> {
        self.binary(BinaryOp::Add, other)
    }

    /// Lazily resolved attribute
    pub fn attr<'k>(&self, key: impl Into<AttrKey<'k>>) -> Accessor<'rt, 'k> {
        Accessor::attr(self.clone(), key.into())
    }

    /// Lazily resolved item
    pub fn item<'k>(&self, key: impl Into<ItemKey<'k>>) -> Accessor<'rt, 'k> {
        Accessor::item(self.clone(), key.into())
    }
}

impl Clone for Object<'_> {
    fn clone(&self) -> Self {
        Self::own(self.rt, self.raw)
    }
}

impl Drop for Object<'_> {
    fn drop(&mut self) {
        self.rt.dec_ref(self.raw);
    }
}

impl fmt::Debug for Object<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({:#x})", self.raw.to_bits())
    }
}

// ============================================================================
// Typed Wrappers
// ============================================================================

/// Owning handle type with a runtime type check
pub trait ForeignObject<'rt>: Sized {
    /// Type name used in caster descriptions
    const NAME: &'static str;

    /// Whether `obj` satisfies this type
    fn check(rt: &dyn ForeignRuntime, obj: RawObject) -> bool;

    /// Wrap without checking
    fn from_object_unchecked(obj: Object<'rt>) -> Self;

    /// Wrap after checking
    fn from_object(obj: Object<'rt>) -> Result<Self, Object<'rt>> {
        if Self::check(obj.runtime(), obj.ptr()) {
            Ok(Self::from_object_unchecked(obj))
        } else {
            Err(obj)
        }
    }

    /// The wrapped owning reference
    fn as_object(&self) -> &Object<'rt>;

    /// Unwrap into the untyped owning reference
    fn into_object(self) -> Object<'rt>;
}

impl<'rt> ForeignObject<'rt> for Object<'rt> {
    const NAME: &'static str = "object";

    fn check(_rt: &dyn ForeignRuntime, _obj: RawObject) -> bool {
        true
    }

    fn from_object_unchecked(obj: Object<'rt>) -> Self {
        obj
    }

    fn as_object(&self) -> &Object<'rt> {
        self
    }

    fn into_object(self) -> Object<'rt> {
        self
    }
}

macro_rules! foreign_object {
    ($(#[$meta:meta])* $name:ident, $type_name:literal, $check:expr) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        pub struct $name<'rt>(Object<'rt>);

        impl<'rt> ForeignObject<'rt> for $name<'rt> {
            const NAME: &'static str = $type_name;

            fn check(rt: &dyn ForeignRuntime, obj: RawObject) -> bool {
                let check: fn(ObjectKind) -> bool = $check;
                check(rt.kind(obj))
            }

            fn from_object_unchecked(obj: Object<'rt>) -> Self {
                Self(obj)
            }

            fn as_object(&self) -> &Object<'rt> {
                &self.0
            }

            fn into_object(self) -> Object<'rt> {
                self.0
            }
        }

        impl<'rt> Deref for $name<'rt> {
            type Target = Object<'rt>;

            fn deref(&self) -> &Object<'rt> {
                &self.0
            }
        }

        impl<'rt> From<$name<'rt>> for Object<'rt> {
            fn from(value: $name<'rt>) -> Self {
                value.0
            }
        }
    };
}

foreign_object!(
    /// Foreign string
    Str,
    "str",
    |kind| kind == ObjectKind::Str
);

foreign_object!(
    /// Foreign integer (booleans included)
    Int,
    "int",
    ObjectKind::is_int
);

foreign_object!(
    /// Foreign float
    Float,
    "float",
    ObjectKind::is_float
);

foreign_object!(
    /// Foreign tuple
    Tuple,
    "tuple",
    |kind| kind == ObjectKind::Tuple
);

foreign_object!(
    /// Foreign list
    List,
    "list",
    |kind| kind == ObjectKind::List
);

foreign_object!(
    /// Foreign opaque carrier
    Capsule,
    "capsule",
    |kind| kind == ObjectKind::Capsule
);

impl<'rt> Str<'rt> {
    /// New string object
    pub fn new(rt: &'rt dyn ForeignRuntime, text: &str) -> BridgeResult<Self> {
        protocol::str_from_cstr(rt, text).map(Self)
    }

    /// Contents as native text
    pub fn to_native(&self) -> BridgeResult<String> {
        protocol::str_to_string(self.runtime(), self.ptr())
    }
}

impl<'rt> Tuple<'rt> {
    /// Number of items
    pub fn size(&self) -> BridgeResult<usize> {
        self.len()
    }
}
