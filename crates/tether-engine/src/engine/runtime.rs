//! ForeignRuntime and TypeRegistry implementations for the engine

use std::ffi::c_void;
use std::ptr::NonNull;

use tether_sdk::{
    fail, BinaryOp, CapsuleFinalizer, CompareOp, ForeignException, ForeignRuntime, InstanceRef,
    ObjectKind, RawObject, RvPolicy, TypeKey, TypeRegistry, UnaryOp,
};

use super::ops::Fetched;
use super::Engine;
use crate::error::{EngineError, EngineResult};
use crate::number::IntValue;
use crate::object::{CapsuleData, InstanceData, ObjectData};

impl Engine {
    /// Record the error of a failed operation
    fn report<T>(&self, result: EngineResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.set_error(err);
                None
            }
        }
    }

    fn produce(&self, result: EngineResult<ObjectData>) -> Option<RawObject> {
        let data = self.report(result)?;
        self.alloc_container(data)
    }

    fn fetched(&self, result: EngineResult<Fetched>) -> Option<RawObject> {
        match self.report(result)? {
            Fetched::Existing(item) => {
                self.inc_ref(item);
                Some(item)
            }
            Fetched::New(data) => self.alloc(data),
        }
    }

    fn int_of(&self, obj: RawObject) -> EngineResult<IntValue> {
        self.data(obj, |data| match data {
            ObjectData::Float(value) => IntValue::from_f64(*value).ok_or_else(|| {
                EngineError::Type("'float' object cannot be interpreted as an integer".to_string())
            }),
            other => other.as_int().ok_or_else(|| {
                EngineError::Type(format!(
                    "'{}' object cannot be interpreted as an integer",
                    other.type_name()
                ))
            }),
        })
    }

    fn long_as<T>(&self, obj: RawObject, narrow: fn(&IntValue) -> Option<T>, width: &str) -> Option<T> {
        let result = self.int_of(obj).and_then(|value| {
            narrow(&value).ok_or_else(|| {
                if value.is_negative() && width.starts_with('u') {
                    EngineError::Overflow("can't convert negative int to unsigned".to_string())
                } else {
                    EngineError::Overflow(format!("int too large to convert to {}", width))
                }
            })
        });
        self.report(result)
    }
}

impl ForeignRuntime for Engine {
    // ========================================================================
    // Reference Counting
    // ========================================================================

    fn inc_ref(&self, obj: RawObject) {
        if !self.heap.lock().inc_ref(obj) {
            fail!("tether-engine: inc_ref() of finalized object {:?}", obj);
        }
    }

    fn dec_ref(&self, obj: RawObject) {
        self.release_all(vec![obj]);
    }

    // ========================================================================
    // Error State
    // ========================================================================

    fn err_occurred(&self) -> bool {
        self.error.lock().is_some()
    }

    fn err_fetch(&self) -> Option<ForeignException> {
        self.error.lock().take()
    }

    fn err_restore(&self, exception: ForeignException) {
        *self.error.lock() = Some(exception);
    }

    // ========================================================================
    // Singletons and Introspection
    // ========================================================================

    fn none(&self) -> RawObject {
        self.none
    }

    fn boolean(&self, value: bool) -> RawObject {
        if value {
            self.true_obj
        } else {
            self.false_obj
        }
    }

    fn kind(&self, obj: RawObject) -> ObjectKind {
        self.data(obj, ObjectData::kind)
    }

    fn type_name(&self, obj: RawObject) -> String {
        self.data(obj, |data| data.type_name().to_string())
    }

    // ========================================================================
    // Construction
    // ========================================================================

    fn float_from_f64(&self, value: f64) -> Option<RawObject> {
        self.alloc(ObjectData::Float(value))
    }

    fn long_from_i64(&self, value: i64) -> Option<RawObject> {
        self.alloc(ObjectData::Int(IntValue::from(value)))
    }

    fn long_from_u64(&self, value: u64) -> Option<RawObject> {
        self.alloc(ObjectData::Int(IntValue::from(value)))
    }

    fn long_from_i128(&self, value: i128) -> Option<RawObject> {
        self.alloc(ObjectData::Int(IntValue::from(value)))
    }

    fn long_from_u128(&self, value: u128) -> Option<RawObject> {
        self.alloc(ObjectData::Int(IntValue::from(value)))
    }

    fn str_from_utf8(&self, bytes: &[u8]) -> Option<RawObject> {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.alloc(ObjectData::Str(text.to_string())),
            Err(err) => {
                self.set_error(EngineError::Unicode(err.to_string()));
                None
            }
        }
    }

    fn tuple_new(&self, len: usize) -> Option<RawObject> {
        self.alloc(ObjectData::Tuple(vec![None; len]))
    }

    fn tuple_set_item(&self, tuple: RawObject, index: usize, item: RawObject) {
        let previous = self.data_mut(tuple, |data| match data {
            ObjectData::Tuple(items) => items.get_mut(index).map(|slot| slot.replace(item)),
            _ => None,
        });
        match previous {
            Some(Some(previous)) => self.dec_ref(previous),
            Some(None) => {}
            None => fail!("tether-engine: tuple_set_item() index {} is not a tuple slot", index),
        }
    }

    fn capsule_new(&self, pointer: *mut c_void, finalizer: CapsuleFinalizer) -> Option<RawObject> {
        self.alloc(ObjectData::Capsule(CapsuleData {
            pointer,
            context: std::ptr::null_mut(),
            finalizer,
        }))
    }

    fn capsule_pointer(&self, capsule: RawObject) -> *mut c_void {
        self.capsule_field(capsule, |capsule| capsule.pointer)
    }

    fn capsule_context(&self, capsule: RawObject) -> *mut c_void {
        self.capsule_field(capsule, |capsule| capsule.context)
    }

    fn capsule_set_context(&self, capsule: RawObject, context: *mut c_void) -> bool {
        let updated = self.data_mut(capsule, |data| match data {
            ObjectData::Capsule(capsule) => {
                capsule.context = context;
                true
            }
            _ => false,
        });
        if !updated {
            self.set_error(EngineError::Type("expected a capsule".to_string()));
        }
        updated
    }

    // ========================================================================
    // Extraction
    // ========================================================================

    fn float_as_f64(&self, obj: RawObject) -> Option<f64> {
        let result = self.data(obj, |data| {
            data.as_f64().ok_or_else(|| {
                EngineError::Type(format!("must be real number, not {}", data.type_name()))
            })
        });
        self.report(result)
    }

    fn long_as_i64(&self, obj: RawObject) -> Option<i64> {
        self.long_as(obj, IntValue::to_i64, "i64")
    }

    fn long_as_u64(&self, obj: RawObject) -> Option<u64> {
        self.long_as(obj, IntValue::to_u64, "u64")
    }

    fn long_as_i128(&self, obj: RawObject) -> Option<i128> {
        self.long_as(obj, IntValue::to_i128, "i128")
    }

    fn long_as_u128(&self, obj: RawObject) -> Option<u128> {
        self.long_as(obj, IntValue::to_u128, "u128")
    }

    fn str_as_utf8(&self, obj: RawObject) -> Option<String> {
        let result = self.data(obj, |data| match data {
            ObjectData::Str(text) => Ok(text.clone()),
            other => Err(EngineError::Type(format!("expected str, got '{}'", other.type_name()))),
        });
        self.report(result)
    }

    // ========================================================================
    // Object Protocol
    // ========================================================================

    fn object_length(&self, obj: RawObject) -> Option<usize> {
        self.report(self.length(obj))
    }

    fn object_repr(&self, obj: RawObject) -> Option<RawObject> {
        self.alloc(ObjectData::Str(self.repr_of(obj)))
    }

    fn object_str(&self, obj: RawObject) -> Option<RawObject> {
        self.alloc(ObjectData::Str(self.str_of(obj)))
    }

    fn rich_compare_bool(&self, a: RawObject, b: RawObject, op: CompareOp) -> Option<bool> {
        self.report(self.compare(a, b, op))
    }

    fn number_unary(&self, op: UnaryOp, a: RawObject) -> Option<RawObject> {
        self.produce(self.unary(op, a))
    }

    fn number_binary(&self, op: BinaryOp, a: RawObject, b: RawObject) -> Option<RawObject> {
        self.produce(self.binary(op, a, b))
    }

    fn get_attr_str(&self, obj: RawObject, name: &str) -> Option<RawObject> {
        let value = self.report(self.get_attr_named(obj, name))?;
        self.inc_ref(value);
        Some(value)
    }

    fn get_attr(&self, obj: RawObject, name: RawObject) -> Option<RawObject> {
        let name = self.report(self.attr_name(name))?;
        self.get_attr_str(obj, &name)
    }

    fn set_attr_str(&self, obj: RawObject, name: &str, value: RawObject) -> bool {
        self.report(self.set_attr_named(obj, name, value)).is_some()
    }

    fn set_attr(&self, obj: RawObject, name: RawObject, value: RawObject) -> bool {
        match self.report(self.attr_name(name)) {
            Some(name) => self.set_attr_str(obj, &name, value),
            None => false,
        }
    }

    fn get_item(&self, obj: RawObject, key: RawObject) -> Option<RawObject> {
        self.fetched(self.get_item_of(obj, key))
    }

    fn set_item(&self, obj: RawObject, key: RawObject, value: RawObject) -> bool {
        self.report(self.set_item_of(obj, key, value)).is_some()
    }

    fn sequence_size(&self, obj: RawObject) -> Option<usize> {
        self.report(self.sequence_len(obj))
    }

    fn sequence_get_item(&self, obj: RawObject, index: usize) -> Option<RawObject> {
        self.fetched(self.sequence_item(obj, index))
    }

    fn types(&self) -> &dyn TypeRegistry {
        self
    }
}

// ============================================================================
// Type Registry
// ============================================================================

impl TypeRegistry for Engine {
    fn is_registered(&self, key: TypeKey) -> bool {
        self.types.read().contains(key)
    }

    unsafe fn type_put(
        &self,
        key: TypeKey,
        value: NonNull<()>,
        policy: RvPolicy,
        parent: Option<RawObject>,
    ) -> Option<RawObject> {
        let info = self
            .types
            .read()
            .get(key)
            .map(|info| (info.name, info.copy_fn, info.move_fn, info.drop_fn));
        // Values of unregistered types are left untouched.
        let Some((name, copy_fn, move_fn, drop_fn)) = info else {
            self.set_error(EngineError::Unregistered(key.name()));
            return None;
        };

        if policy == RvPolicy::ReferenceInternal && parent.is_none() {
            self.set_error(EngineError::Value(
                "reference_internal requires a parent object".to_string(),
            ));
            return None;
        }

        let (instance, owned) = match policy {
            RvPolicy::TakeOwnership => (value, true),
            RvPolicy::Copy => match copy_fn {
                Some(copy_fn) => (copy_fn(value), true),
                None => {
                    self.set_error(EngineError::Type(format!("type '{}' is not copyable", name)));
                    return None;
                }
            },
            RvPolicy::Move => (move_fn(value), true),
            RvPolicy::Reference | RvPolicy::ReferenceInternal => (value, false),
            RvPolicy::Automatic | RvPolicy::AutomaticReference => {
                fail!("tether-engine: type_put() received unresolved policy '{}'", policy)
            }
        };

        let raw = self.alloc(ObjectData::Instance(InstanceData {
            type_id: key.id(),
            name,
            value: instance,
            drop_fn: owned.then_some(drop_fn),
        }));

        let Some(raw) = raw else {
            // Copies and moved values belong to the engine; adopted boxes go
            // back to the caller.
            if matches!(policy, RvPolicy::Copy | RvPolicy::Move) {
                drop_fn(instance);
            }
            return None;
        };

        if policy == RvPolicy::ReferenceInternal {
            if let Some(parent) = parent {
                self.inc_ref(parent);
                self.links.lock().add(raw, parent);
                log::debug!("{} instance {:?} keeps parent {:?} alive", name, raw, parent);
            }
        }
        Some(raw)
    }

    fn type_get(&self, key: TypeKey, src: RawObject, convert: bool) -> Option<InstanceRef> {
        let info = self
            .types
            .read()
            .get(key)
            .map(|info| (info.name, info.drop_fn, info.implicit.clone()));
        let (name, drop_fn, implicit) = info?;

        let found = self.data(src, |data| match data {
            ObjectData::Instance(instance) if instance.type_id == key.id() => Some(instance.value),
            _ => None,
        });
        if let Some(value) = found {
            self.inc_ref(src);
            return Some(InstanceRef { owner: src, value });
        }

        if !convert {
            return None;
        }

        // Converters run without the registry lock held.
        let rt: &dyn ForeignRuntime = self;
        for converter in implicit {
            let Some(value) = converter(rt, src.into()) else {
                self.err_clear();
                continue;
            };
            let owner = self.alloc(ObjectData::Instance(InstanceData {
                type_id: key.id(),
                name,
                value,
                drop_fn: Some(drop_fn),
            }));
            match owner {
                Some(owner) => {
                    log::debug!("implicit conversion of {:?} to {}", src, name);
                    return Some(InstanceRef { owner, value });
                }
                None => {
                    // SAFETY: converters return a leaked `Box` of the registered type.
                    unsafe { drop_fn(value) };
                    self.err_clear();
                    return None;
                }
            }
        }
        None
    }
}
