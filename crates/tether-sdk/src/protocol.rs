//! Object protocol shim
//!
//! Error-checked wrappers over the generic operations of a [`ForeignRuntime`].
//! A failure value from the runtime (`None`, `false`) never escapes: it is
//! turned into a [`BridgeError`] through [`error_raise`]. New references
//! produced by the runtime are handed to the caller as [`Object`]s.

use crate::error::{error_raise, BridgeError, BridgeResult};
use crate::handle::{Handle, Object};
use crate::raise;
use crate::raw::RawObject;
use crate::runtime::{CompareOp, ForeignRuntime};

// ============================================================================
// Keys
// ============================================================================

/// Attribute key: a name or a string object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKey<'k> {
    /// Attribute name
    Str(&'k str),
    /// String object naming the attribute (borrowed)
    Object(RawObject),
}

impl<'k> From<&'k str> for AttrKey<'k> {
    fn from(name: &'k str) -> Self {
        AttrKey::Str(name)
    }
}

impl From<RawObject> for AttrKey<'_> {
    fn from(name: RawObject) -> Self {
        AttrKey::Object(name)
    }
}

impl From<&Object<'_>> for AttrKey<'_> {
    fn from(name: &Object<'_>) -> Self {
        AttrKey::Object(name.ptr())
    }
}

/// Item key: a position, a string or any object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKey<'k> {
    /// Integer key
    Index(isize),
    /// String key
    Str(&'k str),
    /// Arbitrary key object (borrowed)
    Object(RawObject),
}

impl From<isize> for ItemKey<'_> {
    fn from(index: isize) -> Self {
        ItemKey::Index(index)
    }
}

impl From<i32> for ItemKey<'_> {
    fn from(index: i32) -> Self {
        ItemKey::Index(index as isize)
    }
}

impl<'k> From<&'k str> for ItemKey<'k> {
    fn from(key: &'k str) -> Self {
        ItemKey::Str(key)
    }
}

impl From<RawObject> for ItemKey<'_> {
    fn from(key: RawObject) -> Self {
        ItemKey::Object(key)
    }
}

impl From<&Object<'_>> for ItemKey<'_> {
    fn from(key: &Object<'_>) -> Self {
        ItemKey::Object(key.ptr())
    }
}

// ============================================================================
// Result Routing
// ============================================================================

/// Adopt a new reference, or convert the pending error
#[inline]
fn checked<'rt>(rt: &'rt dyn ForeignRuntime, res: Option<RawObject>) -> BridgeResult<Object<'rt>> {
    match res {
        Some(raw) => Ok(Object::steal(rt, raw)),
        None => Err(error_raise(rt)),
    }
}

#[inline]
fn checked_status(rt: &dyn ForeignRuntime, ok: bool) -> BridgeResult<()> {
    if ok {
        Ok(())
    } else {
        Err(error_raise(rt))
    }
}

// ============================================================================
// Generic Operations
// ============================================================================

/// `len(obj)`
pub fn obj_len(rt: &dyn ForeignRuntime, obj: RawObject) -> BridgeResult<usize> {
    rt.object_length(obj).ok_or_else(|| error_raise(rt))
}

/// `repr(obj)`
pub fn obj_repr<'rt>(rt: &'rt dyn ForeignRuntime, obj: RawObject) -> BridgeResult<Object<'rt>> {
    checked(rt, rt.object_repr(obj))
}

/// Rich comparison reduced to a truth value
pub fn obj_compare(
    rt: &dyn ForeignRuntime,
    a: RawObject,
    b: RawObject,
    op: CompareOp,
) -> BridgeResult<bool> {
    rt.rich_compare_bool(a, b, op).ok_or_else(|| error_raise(rt))
}

/// Apply a unary operator supplied as a function of the runtime
pub fn obj_op_1<'rt, F>(rt: &'rt dyn ForeignRuntime, a: RawObject, op: F) -> BridgeResult<Object<'rt>>
where
    F: FnOnce(&'rt dyn ForeignRuntime, RawObject) -> Option<RawObject>,
{
    checked(rt, op(rt, a))
}

/// Apply a binary operator supplied as a function of the runtime
pub fn obj_op_2<'rt, F>(
    rt: &'rt dyn ForeignRuntime,
    a: RawObject,
    b: RawObject,
    op: F,
) -> BridgeResult<Object<'rt>>
where
    F: FnOnce(&'rt dyn ForeignRuntime, RawObject, RawObject) -> Option<RawObject>,
{
    checked(rt, op(rt, a, b))
}

// ============================================================================
// Attributes
// ============================================================================

fn fetch_attr(rt: &dyn ForeignRuntime, obj: RawObject, key: AttrKey<'_>) -> Option<RawObject> {
    match key {
        AttrKey::Str(name) => rt.get_attr_str(obj, name),
        AttrKey::Object(name) => rt.get_attr(obj, name),
    }
}

/// `getattr(obj, key)`
pub fn getattr<'rt>(
    rt: &'rt dyn ForeignRuntime,
    obj: RawObject,
    key: AttrKey<'_>,
) -> BridgeResult<Object<'rt>> {
    checked(rt, fetch_attr(rt, obj, key))
}

/// `getattr(obj, key, default)`.
///
/// A failed lookup is swallowed and `default` is returned as a new reference.
/// An invalid default yields `None`.
pub fn getattr_or<'rt>(
    rt: &'rt dyn ForeignRuntime,
    obj: RawObject,
    key: AttrKey<'_>,
    default: Handle,
) -> Option<Object<'rt>> {
    match fetch_attr(rt, obj, key) {
        Some(raw) => Some(Object::steal(rt, raw)),
        None => {
            rt.err_clear();
            Object::own_handle(rt, default)
        }
    }
}

/// Fetch `obj.key` into `out`, unless `out` is already filled
pub fn getattr_maybe<'rt>(
    rt: &'rt dyn ForeignRuntime,
    obj: RawObject,
    key: AttrKey<'_>,
    out: &mut Option<Object<'rt>>,
) -> BridgeResult<()> {
    if out.is_some() {
        return Ok(());
    }
    *out = Some(getattr(rt, obj, key)?);
    Ok(())
}

/// `obj.key = value`
pub fn setattr(
    rt: &dyn ForeignRuntime,
    obj: RawObject,
    key: AttrKey<'_>,
    value: RawObject,
) -> BridgeResult<()> {
    let ok = match key {
        AttrKey::Str(name) => rt.set_attr_str(obj, name, value),
        AttrKey::Object(name) => rt.set_attr(obj, name, value),
    };
    checked_status(rt, ok)
}

// ============================================================================
// Items
// ============================================================================

/// Materialize an item key as a foreign object
fn key_object<'rt>(rt: &'rt dyn ForeignRuntime, key: ItemKey<'_>) -> BridgeResult<Object<'rt>> {
    match key {
        ItemKey::Index(index) => checked(rt, rt.long_from_i64(index as i64)),
        ItemKey::Str(text) => checked(rt, rt.str_from_utf8(text.as_bytes())),
        ItemKey::Object(key) => Ok(Object::own(rt, key)),
    }
}

/// `obj[key]`
pub fn getitem<'rt>(
    rt: &'rt dyn ForeignRuntime,
    obj: RawObject,
    key: ItemKey<'_>,
) -> BridgeResult<Object<'rt>> {
    let key = key_object(rt, key)?;
    checked(rt, rt.get_item(obj, key.ptr()))
}

/// Fetch `obj[key]` into `out`, unless `out` is already filled
pub fn getitem_maybe<'rt>(
    rt: &'rt dyn ForeignRuntime,
    obj: RawObject,
    key: ItemKey<'_>,
    out: &mut Option<Object<'rt>>,
) -> BridgeResult<()> {
    if out.is_some() {
        return Ok(());
    }
    *out = Some(getitem(rt, obj, key)?);
    Ok(())
}

/// `obj[key] = value`
pub fn setitem(
    rt: &dyn ForeignRuntime,
    obj: RawObject,
    key: ItemKey<'_>,
    value: RawObject,
) -> BridgeResult<()> {
    let key = key_object(rt, key)?;
    checked_status(rt, rt.set_item(obj, key.ptr(), value))
}

// ============================================================================
// Strings
// ============================================================================

/// `str(obj)`
pub fn str_from_obj<'rt>(rt: &'rt dyn ForeignRuntime, obj: RawObject) -> BridgeResult<Object<'rt>> {
    checked(rt, rt.object_str(obj))
}

/// String object from native text
pub fn str_from_cstr<'rt>(rt: &'rt dyn ForeignRuntime, text: &str) -> BridgeResult<Object<'rt>> {
    match rt.str_from_utf8(text.as_bytes()) {
        Some(raw) => Ok(Object::steal(rt, raw)),
        None => {
            rt.err_clear();
            raise!("tether::str_from_cstr(): conversion error!")
        }
    }
}

/// String object from raw bytes, which must be valid UTF-8
pub fn str_from_cstr_and_size<'rt>(
    rt: &'rt dyn ForeignRuntime,
    bytes: &[u8],
) -> BridgeResult<Object<'rt>> {
    match rt.str_from_utf8(bytes) {
        Some(raw) => Ok(Object::steal(rt, raw)),
        None => {
            rt.err_clear();
            raise!("tether::str_from_cstr_and_size(): conversion error!")
        }
    }
}

/// Contents of a string object as native text
pub fn str_to_string(rt: &dyn ForeignRuntime, obj: RawObject) -> BridgeResult<String> {
    rt.str_as_utf8(obj).ok_or_else(|| {
        if rt.err_occurred() {
            error_raise(rt)
        } else {
            BridgeError::Raised(format!(
                "expected a 'str' object, got '{}'",
                rt.type_name(obj)
            ))
        }
    })
}

// ============================================================================
// Sequences
// ============================================================================

/// Fetch all items of a sequence of exactly `N` items.
///
/// Returns `None` without a pending error when `seq` is not a sequence, has a
/// different length, or an item cannot be fetched. Items fetched before a
/// failure are released.
pub fn seq_size_fetch<'rt, const N: usize>(
    rt: &'rt dyn ForeignRuntime,
    seq: RawObject,
) -> Option<[Object<'rt>; N]> {
    let size = match rt.sequence_size(seq) {
        Some(size) => size,
        None => {
            rt.err_clear();
            return None;
        }
    };

    if size != N {
        return None;
    }

    let mut items = Vec::with_capacity(N);
    for index in 0..N {
        match rt.sequence_get_item(seq, index) {
            Some(raw) => items.push(Object::steal(rt, raw)),
            None => {
                rt.err_clear();
                return None;
            }
        }
    }

    items.try_into().ok()
}
