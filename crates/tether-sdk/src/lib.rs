//! Tether SDK - value marshalling between Rust and a foreign object runtime
//!
//! This crate converts native values to and from objects of a dynamically
//! typed, reference-counted runtime, and decides who owns every value it
//! produces. It programs against the [`ForeignRuntime`] and [`TypeRegistry`]
//! traits only; `tether-engine` provides an in-process implementation.
//!
//! # Example
//!
//! ```ignore
//! use tether_sdk::{cast, load, RvPolicy};
//!
//! let obj = cast(&engine, (3i32, 4.5f64), RvPolicy::Move)?;
//! let (a, b): (i32, f64) = load(&engine, obj.handle(), false)?;
//! assert_eq!((a, b), (3, 4.5));
//! ```

#![warn(missing_docs)]

pub mod accessor;
pub mod capsule;
pub mod caster;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod policy;
pub mod protocol;
pub mod raw;
pub mod runtime;

pub use accessor::Accessor;
pub use capsule::{capsule_new, Destructor};
pub use caster::{Caster, Castable, GenericCaster, Native, Source};
pub use convert::{cast, cast_ptr, cast_ref, cast_source, load, try_load};
pub use dispatch::{builtin_casters, CasterEntry, CasterTable};
pub use error::{
    error_raise, BridgeError, BridgeResult, ForeignError, ForeignErrorKind, ForeignException,
};
pub use handle::{Capsule, Float, ForeignObject, Handle, Int, List, Object, Str, Tuple};
pub use policy::{PolicyError, RvPolicy, ValueCategory};
pub use protocol::{AttrKey, ItemKey};
pub use raw::RawObject;
pub use runtime::{
    BinaryOp, CapsuleFinalizer, CompareOp, ForeignRuntime, InstanceRef, ObjectKind, TypeKey,
    TypeRegistry, UnaryOp,
};
