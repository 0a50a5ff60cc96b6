//! ForeignRuntime trait - abstract foreign object runtime operations
//!
//! Defines the boundary contract the marshalling core consumes. A concrete
//! runtime (for example `tether-engine`) implements these traits; casters and
//! the protocol shim program against them without depending on runtime
//! internals.
//!
//! # Failure convention
//!
//! Operations that can fail report it the way a C object API would: an
//! object-producing call returns `None`, a status call returns `false`, and in
//! both cases the runtime records a pending error in its own context. The
//! pending error lives in the runtime instance passed to each call, never in a
//! process-wide global. The shim in [`crate::protocol`] turns these into
//! [`BridgeError`](crate::error::BridgeError)s.
//!
//! # References
//!
//! Every `Option<RawObject>` returned by a construction or protocol call is a
//! new reference owned by the caller. Singletons returned by
//! [`ForeignRuntime::none`] and [`ForeignRuntime::boolean`] are borrowed.

use std::any::{type_name, TypeId};
use std::ffi::c_void;
use std::fmt;
use std::ptr::NonNull;

use crate::error::ForeignException;
use crate::policy::RvPolicy;
use crate::raw::RawObject;

// ============================================================================
// Object Kinds and Operator Codes
// ============================================================================

/// Coarse runtime type of a foreign object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// The empty-value singleton
    None,
    /// One of the two boolean singletons
    Bool,
    /// Integer
    Int,
    /// Floating point number
    Float,
    /// Text string
    Str,
    /// Fixed-size ordered sequence
    Tuple,
    /// Mutable ordered sequence
    List,
    /// Key/value mapping
    Dict,
    /// Plain attribute bag
    Namespace,
    /// Opaque carrier around a native pointer
    Capsule,
    /// Wrapper around a registered native instance
    Instance,
}

impl ObjectKind {
    /// Whether an integer check passes. Booleans are integers, as in most
    /// dynamic runtimes.
    #[inline]
    pub fn is_int(self) -> bool {
        matches!(self, ObjectKind::Int | ObjectKind::Bool)
    }

    /// Whether a float check passes
    #[inline]
    pub fn is_float(self) -> bool {
        self == ObjectKind::Float
    }

    /// Whether the object supports the sequence protocol
    #[inline]
    pub fn is_sequence(self) -> bool {
        matches!(self, ObjectKind::Tuple | ObjectKind::List | ObjectKind::Str)
    }
}

/// Rich comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Operator symbol, for diagnostics
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Unary number protocol operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `-a`
    Negative,
    /// `+a`
    Positive,
    /// `abs(a)`
    Absolute,
    /// `~a`
    Invert,
}

/// Binary number protocol operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// `a - b`
    Subtract,
    /// `a * b`
    Multiply,
    /// `a / b`
    TrueDivide,
    /// `a // b`
    FloorDivide,
    /// `a % b`
    Remainder,
    /// `a & b`
    And,
    /// `a | b`
    Or,
    /// `a ^ b`
    Xor,
    /// `a << b`
    LeftShift,
    /// `a >> b`
    RightShift,
}

impl BinaryOp {
    /// Operator symbol, for diagnostics
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::TrueDivide => "/",
            BinaryOp::FloorDivide => "//",
            BinaryOp::Remainder => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::LeftShift => "<<",
            BinaryOp::RightShift => ">>",
        }
    }
}

/// Finalization callback of a capsule. Called once by the runtime when the
/// capsule's count reaches zero, while the capsule can still be inspected.
pub type CapsuleFinalizer = fn(&dyn ForeignRuntime, RawObject);

// ============================================================================
// Type Identity
// ============================================================================

/// Stable identity of a native type, used as the registry key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key of `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// Underlying type id
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified Rust type name
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

/// Instance located by [`TypeRegistry::type_get`].
#[derive(Debug, Clone, Copy)]
pub struct InstanceRef {
    /// New reference to the foreign object that keeps `value` alive. For an
    /// implicit conversion this is a freshly created temporary.
    pub owner: RawObject,
    /// Native instance inside `owner`
    pub value: NonNull<()>,
}

// ============================================================================
// Type Registry
// ============================================================================

/// External registry of native types that have no specialized caster.
///
/// Registration itself (field and method tables, constructors) is outside the
/// marshalling core; the core only asks the registry to wrap or unwrap
/// instances by [`TypeKey`].
pub trait TypeRegistry {
    /// Whether `key` has been registered
    fn is_registered(&self, key: TypeKey) -> bool;

    /// Wrap a native instance in a new foreign object.
    ///
    /// `policy` is always concrete: `Automatic` and `AutomaticReference` are
    /// resolved by the caller. `parent` is supplied for
    /// `ReferenceInternal`, which additionally links `parent` to the result.
    /// Returns `None` with a pending error on failure.
    ///
    /// # Safety
    ///
    /// `value` must point to a live instance of the type named by `key`, and
    /// the pointee must satisfy the policy:
    /// - `TakeOwnership`: allocated by `Box<T>`; the registry adopts it on
    ///   success and leaves it to the caller on failure.
    /// - `Copy`: valid for the duration of the call.
    /// - `Move`: valid for reads; the registry moves out of it on every path,
    ///   including failure, so the caller must not drop it afterwards.
    /// - `Reference`/`ReferenceInternal`: valid for as long as the returned
    ///   object can be reached.
    unsafe fn type_put(
        &self,
        key: TypeKey,
        value: NonNull<()>,
        policy: RvPolicy,
        parent: Option<RawObject>,
    ) -> Option<RawObject>;

    /// Find the native instance of type `key` inside `src`. With `convert`,
    /// the registry may build a temporary through a registered implicit
    /// conversion. Returns `None` without a pending error on mismatch.
    fn type_get(&self, key: TypeKey, src: RawObject, convert: bool) -> Option<InstanceRef>;
}

// ============================================================================
// Foreign Runtime
// ============================================================================

/// Abstract foreign object runtime.
///
/// This trait is the single entry point for everything the core does to
/// foreign objects. All calls assume exclusive access to the runtime; the
/// core performs no locking of its own.
pub trait ForeignRuntime {
    // ========================================================================
    // Reference Counting
    // ========================================================================

    /// Acquire one reference
    fn inc_ref(&self, obj: RawObject);

    /// Release one reference, finalizing the object when it was the last
    fn dec_ref(&self, obj: RawObject);

    // ========================================================================
    // Error State
    // ========================================================================

    /// Whether an error is pending
    fn err_occurred(&self) -> bool;

    /// Take the pending error, leaving none behind
    fn err_fetch(&self) -> Option<ForeignException>;

    /// Make `exception` the pending error, replacing any previous one
    fn err_restore(&self, exception: ForeignException);

    /// Discard the pending error, if any
    fn err_clear(&self) {
        let _ = self.err_fetch();
    }

    // ========================================================================
    // Singletons (borrowed)
    // ========================================================================

    /// The empty-value singleton
    fn none(&self) -> RawObject;

    /// One of the two boolean singletons
    fn boolean(&self, value: bool) -> RawObject;

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Runtime type of `obj`
    fn kind(&self, obj: RawObject) -> ObjectKind;

    /// Runtime type name of `obj`, for diagnostics
    fn type_name(&self, obj: RawObject) -> String;

    // ========================================================================
    // Construction
    // ========================================================================

    /// Float object
    fn float_from_f64(&self, value: f64) -> Option<RawObject>;

    /// Integer object from the `long` width
    fn long_from_i64(&self, value: i64) -> Option<RawObject>;

    /// Integer object from the unsigned `long` width
    fn long_from_u64(&self, value: u64) -> Option<RawObject>;

    /// Integer object from the extended width
    fn long_from_i128(&self, value: i128) -> Option<RawObject>;

    /// Integer object from the unsigned extended width
    fn long_from_u128(&self, value: u128) -> Option<RawObject>;

    /// String object decoded from UTF-8 bytes
    fn str_from_utf8(&self, bytes: &[u8]) -> Option<RawObject>;

    /// Tuple of `len` unset items
    fn tuple_new(&self, len: usize) -> Option<RawObject>;

    /// Fill item `index` of a tuple created by [`ForeignRuntime::tuple_new`].
    /// Steals the reference to `item`. Cannot fail.
    fn tuple_set_item(&self, tuple: RawObject, index: usize, item: RawObject);

    /// Opaque capsule around `pointer`
    fn capsule_new(&self, pointer: *mut c_void, finalizer: CapsuleFinalizer)
        -> Option<RawObject>;

    /// Pointer stored in a capsule
    fn capsule_pointer(&self, capsule: RawObject) -> *mut c_void;

    /// Context slot of a capsule
    fn capsule_context(&self, capsule: RawObject) -> *mut c_void;

    /// Set the context slot of a capsule
    fn capsule_set_context(&self, capsule: RawObject, context: *mut c_void) -> bool;

    // ========================================================================
    // Extraction
    // ========================================================================

    /// Float value, converting integers
    fn float_as_f64(&self, obj: RawObject) -> Option<f64>;

    /// Integer value in the `long` width
    fn long_as_i64(&self, obj: RawObject) -> Option<i64>;

    /// Integer value in the unsigned `long` width
    fn long_as_u64(&self, obj: RawObject) -> Option<u64>;

    /// Integer value in the extended width
    fn long_as_i128(&self, obj: RawObject) -> Option<i128>;

    /// Integer value in the unsigned extended width
    fn long_as_u128(&self, obj: RawObject) -> Option<u128>;

    /// Contents of a string object
    fn str_as_utf8(&self, obj: RawObject) -> Option<String>;

    // ========================================================================
    // Object Protocol
    // ========================================================================

    /// `len(obj)`
    fn object_length(&self, obj: RawObject) -> Option<usize>;

    /// `repr(obj)`
    fn object_repr(&self, obj: RawObject) -> Option<RawObject>;

    /// `str(obj)`
    fn object_str(&self, obj: RawObject) -> Option<RawObject>;

    /// Rich comparison reduced to a truth value
    fn rich_compare_bool(&self, a: RawObject, b: RawObject, op: CompareOp) -> Option<bool>;

    /// Unary number operator
    fn number_unary(&self, op: UnaryOp, a: RawObject) -> Option<RawObject>;

    /// Binary number operator
    fn number_binary(&self, op: BinaryOp, a: RawObject, b: RawObject) -> Option<RawObject>;

    /// Attribute lookup by name
    fn get_attr_str(&self, obj: RawObject, name: &str) -> Option<RawObject>;

    /// Attribute lookup by string object
    fn get_attr(&self, obj: RawObject, name: RawObject) -> Option<RawObject>;

    /// Attribute assignment by name
    fn set_attr_str(&self, obj: RawObject, name: &str, value: RawObject) -> bool;

    /// Attribute assignment by string object
    fn set_attr(&self, obj: RawObject, name: RawObject, value: RawObject) -> bool;

    /// `obj[key]`
    fn get_item(&self, obj: RawObject, key: RawObject) -> Option<RawObject>;

    /// `obj[key] = value`
    fn set_item(&self, obj: RawObject, key: RawObject, value: RawObject) -> bool;

    /// Sequence length; fails for objects that are not sequences
    fn sequence_size(&self, obj: RawObject) -> Option<usize>;

    /// Sequence item by position
    fn sequence_get_item(&self, obj: RawObject, index: usize) -> Option<RawObject>;

    // ========================================================================
    // Type Registry
    // ========================================================================

    /// Registry consulted by the generic fallback caster
    fn types(&self) -> &dyn TypeRegistry;
}
