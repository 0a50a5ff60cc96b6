//! Instance type registry and parent/child link table
//!
//! The registry maps a native type to the shims the engine needs to own its
//! instances: copy, move and drop, each erased to a function pointer over
//! `NonNull<()>`. Types registered without a copy shim cannot be wrapped with
//! the `Copy` policy.

use std::any::TypeId;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tether_sdk::{ForeignRuntime, Handle, RawObject, TypeKey};

/// Copy an instance into a new `Box`, returning the leaked allocation
pub type CopyFn = unsafe fn(NonNull<()>) -> NonNull<()>;

/// Move an instance into a new `Box`, returning the leaked allocation
pub type MoveFn = unsafe fn(NonNull<()>) -> NonNull<()>;

/// Drop a leaked `Box` allocation
pub type DropFn = unsafe fn(NonNull<()>);

/// Build a new instance from a foreign object, as a leaked `Box`
pub type ImplicitFn = Arc<dyn Fn(&dyn ForeignRuntime, Handle) -> Option<NonNull<()>> + Send + Sync>;

unsafe fn copy_shim<T: Clone>(src: NonNull<()>) -> NonNull<()> {
    let value = src.cast::<T>().as_ref().clone();
    NonNull::from(Box::leak(Box::new(value))).cast()
}

unsafe fn move_shim<T>(src: NonNull<()>) -> NonNull<()> {
    let value = ptr::read(src.cast::<T>().as_ptr());
    NonNull::from(Box::leak(Box::new(value))).cast()
}

unsafe fn drop_shim<T>(value: NonNull<()>) {
    drop(Box::from_raw(value.cast::<T>().as_ptr()));
}

/// Runtime information about a registered native type
#[derive(Clone)]
pub struct TypeInfo {
    /// Type ID
    pub type_id: TypeId,
    /// Name reported as the foreign type name
    pub name: &'static str,
    /// Copy shim, absent for types that cannot be copied
    pub copy_fn: Option<CopyFn>,
    /// Move shim
    pub move_fn: MoveFn,
    /// Drop shim
    pub drop_fn: DropFn,
    /// Implicit conversions, tried in registration order
    pub implicit: Vec<ImplicitFn>,
}

impl TypeInfo {
    /// Type info for a type without a copy shim
    pub fn new<T: 'static>(name: &'static str) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name,
            copy_fn: None,
            move_fn: move_shim::<T>,
            drop_fn: drop_shim::<T>,
            implicit: Vec::new(),
        }
    }

    /// Type info for a copyable type
    pub fn copyable<T: Clone + 'static>(name: &'static str) -> Self {
        Self {
            copy_fn: Some(copy_shim::<T>),
            ..Self::new::<T>(name)
        }
    }
}

impl std::fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("copyable", &self.copy_fn.is_some())
            .field("implicit", &self.implicit.len())
            .finish()
    }
}

/// Registered types, keyed by type ID
#[derive(Debug, Default)]
pub struct TypeTable {
    types: FxHashMap<TypeId, TypeInfo>,
}

impl TypeTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a type
    pub fn insert(&mut self, info: TypeInfo) {
        self.types.insert(info.type_id, info);
    }

    /// Type information by key
    pub fn get(&self, key: TypeKey) -> Option<&TypeInfo> {
        self.types.get(&key.id())
    }

    /// Mutable type information by type ID
    pub fn get_mut(&mut self, type_id: TypeId) -> Option<&mut TypeInfo> {
        self.types.get_mut(&type_id)
    }

    /// Check if a type is registered
    pub fn contains(&self, key: TypeKey) -> bool {
        self.types.contains_key(&key.id())
    }

    /// Get the number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ============================================================================
// Link Table
// ============================================================================

/// Parent/child lifetime links.
///
/// Each link holds one reference to the parent, released when the child is
/// finalized.
#[derive(Debug, Default)]
pub struct LinkTable {
    parents: FxHashMap<RawObject, Vec<RawObject>>,
    count: usize,
}

impl LinkTable {
    /// Record that `child` keeps `parent` alive
    pub fn add(&mut self, child: RawObject, parent: RawObject) {
        self.parents.entry(child).or_default().push(parent);
        self.count += 1;
    }

    /// Parents kept alive by `child`
    pub fn parents_of(&self, child: RawObject) -> &[RawObject] {
        self.parents.get(&child).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop every link of a finalized child, returning the parents to release
    pub fn remove_child(&mut self, child: RawObject) -> Vec<RawObject> {
        let parents = self.parents.remove(&child).unwrap_or_default();
        self.count -= parents.len();
        parents
    }

    /// Number of live links
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether there are no live links
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}
