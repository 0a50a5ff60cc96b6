//! Heap object representation

use std::any::TypeId;
use std::ffi::c_void;
use std::ptr::NonNull;

use rustc_hash::FxHashMap;
use tether_sdk::{CapsuleFinalizer, ObjectKind, RawObject};

use crate::number::IntValue;
use crate::registry::DropFn;

/// Capsule payload
#[derive(Debug, Clone, Copy)]
pub struct CapsuleData {
    /// Stored native pointer
    pub pointer: *mut c_void,
    /// Context slot
    pub context: *mut c_void,
    /// Called once when the capsule is finalized
    pub finalizer: CapsuleFinalizer,
}

/// Wrapped native instance
#[derive(Debug, Clone, Copy)]
pub struct InstanceData {
    /// Registered native type
    pub type_id: TypeId,
    /// Registered name, reported as the runtime type name
    pub name: &'static str,
    /// The native instance
    pub value: NonNull<()>,
    /// Drop shim, present when the wrapper owns the instance
    pub drop_fn: Option<DropFn>,
}

/// Contents of one heap object
#[derive(Debug)]
pub enum ObjectData {
    /// `None`
    None,
    /// `True` / `False`
    Bool(bool),
    /// Integer
    Int(IntValue),
    /// Float
    Float(f64),
    /// String
    Str(String),
    /// Tuple; items are unset only while the tuple is being filled
    Tuple(Vec<Option<RawObject>>),
    /// List
    List(Vec<RawObject>),
    /// Dict, in insertion order
    Dict(Vec<(RawObject, RawObject)>),
    /// Attribute bag
    Namespace(FxHashMap<String, RawObject>),
    /// Opaque carrier
    Capsule(CapsuleData),
    /// Native instance
    Instance(InstanceData),
}

impl ObjectData {
    /// Coarse runtime type
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectData::None => ObjectKind::None,
            ObjectData::Bool(_) => ObjectKind::Bool,
            ObjectData::Int(_) => ObjectKind::Int,
            ObjectData::Float(_) => ObjectKind::Float,
            ObjectData::Str(_) => ObjectKind::Str,
            ObjectData::Tuple(_) => ObjectKind::Tuple,
            ObjectData::List(_) => ObjectKind::List,
            ObjectData::Dict(_) => ObjectKind::Dict,
            ObjectData::Namespace(_) => ObjectKind::Namespace,
            ObjectData::Capsule(_) => ObjectKind::Capsule,
            ObjectData::Instance(_) => ObjectKind::Instance,
        }
    }

    /// Runtime type name, as shown in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ObjectData::None => "NoneType",
            ObjectData::Bool(_) => "bool",
            ObjectData::Int(_) => "int",
            ObjectData::Float(_) => "float",
            ObjectData::Str(_) => "str",
            ObjectData::Tuple(_) => "tuple",
            ObjectData::List(_) => "list",
            ObjectData::Dict(_) => "dict",
            ObjectData::Namespace(_) => "namespace",
            ObjectData::Capsule(_) => "capsule",
            ObjectData::Instance(instance) => instance.name,
        }
    }

    /// Integer value of ints and bools
    pub fn as_int(&self) -> Option<IntValue> {
        match self {
            ObjectData::Int(value) => Some(*value),
            ObjectData::Bool(value) => Some(IntValue::from(*value)),
            _ => None,
        }
    }

    /// Numeric value of ints, bools and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ObjectData::Float(value) => Some(*value),
            _ => self.as_int().map(|value| value.to_f64()),
        }
    }

    /// Items of tuples and lists
    pub fn as_sequence(&self) -> Option<Vec<RawObject>> {
        match self {
            ObjectData::Tuple(items) => Some(items.iter().flatten().copied().collect()),
            ObjectData::List(items) => Some(items.clone()),
            _ => None,
        }
    }

    /// Objects this one holds a reference to
    pub fn references(&self) -> Vec<RawObject> {
        match self {
            ObjectData::Tuple(items) => items.iter().flatten().copied().collect(),
            ObjectData::List(items) => items.clone(),
            ObjectData::Dict(entries) => entries.iter().flat_map(|(k, v)| [*k, *v]).collect(),
            ObjectData::Namespace(attrs) => attrs.values().copied().collect(),
            _ => Vec::new(),
        }
    }
}

/// Format a float the way a dynamic runtime's `repr` does
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// Quote a string for `repr`
pub fn quote_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for ch in text.chars() {
        match ch {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            ch => out.push(ch),
        }
    }
    out.push('\'');
    out
}
