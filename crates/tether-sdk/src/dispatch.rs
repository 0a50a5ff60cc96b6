//! Runtime caster table
//!
//! [`Castable`] selects casters at compile time. [`CasterTable`] exposes the
//! same casters behind a small interface object keyed by [`TypeId`], for
//! callers that only learn the native type at runtime.

use std::any::{Any, TypeId};

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::caster::{self, Castable, Source};
use crate::error::{ForeignErrorKind, ForeignException};
use crate::handle::Handle;
use crate::policy::RvPolicy;
use crate::runtime::ForeignRuntime;

/// Type-erased load: the loaded value, boxed
pub type LoadFn = for<'rt> fn(&'rt dyn ForeignRuntime, Handle, bool) -> Option<Box<dyn Any>>;

/// Type-erased cast of a borrowed value
pub type CastRefFn = for<'rt> fn(&'rt dyn ForeignRuntime, &dyn Any, RvPolicy, Handle) -> Handle;

/// Type-erased cast of an owned value
pub type CastOwnedFn = for<'rt> fn(&'rt dyn ForeignRuntime, Box<dyn Any>, RvPolicy, Handle) -> Handle;

/// Interface object for one native type
#[derive(Clone, Copy)]
pub struct CasterEntry {
    type_id: TypeId,
    rust_name: &'static str,
    type_name: fn() -> String,
    load: LoadFn,
    cast_ref: CastRefFn,
    cast_owned: CastOwnedFn,
}

impl CasterEntry {
    /// Entry backed by the caster selected for `T`
    pub fn of<T>() -> Self
    where
        T: 'static + for<'rt> Castable<'rt>,
    {
        Self {
            type_id: TypeId::of::<T>(),
            rust_name: std::any::type_name::<T>(),
            type_name: erased_type_name::<T>,
            load: erased_load::<T>,
            cast_ref: erased_cast_ref::<T>,
            cast_owned: erased_cast_owned::<T>,
        }
    }

    /// Native type this entry converts
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Foreign-side type description
    pub fn type_name(&self) -> String {
        (self.type_name)()
    }

    /// Try to load `src`
    pub fn load(&self, rt: &dyn ForeignRuntime, src: Handle, convert: bool) -> Option<Box<dyn Any>> {
        (self.load)(rt, src, convert)
    }

    /// Cast a borrowed value, which must be of this entry's type
    pub fn cast_ref(&self, rt: &dyn ForeignRuntime, value: &dyn Any, policy: RvPolicy, parent: Handle) -> Handle {
        (self.cast_ref)(rt, value, policy, parent)
    }

    /// Cast an owned value, which must be of this entry's type
    pub fn cast_owned(
        &self,
        rt: &dyn ForeignRuntime,
        value: Box<dyn Any>,
        policy: RvPolicy,
        parent: Handle,
    ) -> Handle {
        (self.cast_owned)(rt, value, policy, parent)
    }
}

impl std::fmt::Debug for CasterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasterEntry")
            .field("type", &self.rust_name)
            .field("name", &self.type_name())
            .finish()
    }
}

fn erased_type_name<T: 'static + for<'rt> Castable<'rt>>() -> String {
    caster::type_name_of::<'static, T>()
}

fn erased_load<'rt, T: 'static + for<'x> Castable<'x>>(
    rt: &'rt dyn ForeignRuntime,
    src: Handle,
    convert: bool,
) -> Option<Box<dyn Any>> {
    caster::load_with::<T>(rt, src, convert).map(|value| Box::new(value) as Box<dyn Any>)
}

fn type_mismatch<T>(rt: &dyn ForeignRuntime) -> Handle {
    rt.err_restore(ForeignException::new(
        ForeignErrorKind::TypeError,
        format!("caster for '{}' received a value of another type", std::any::type_name::<T>()),
    ));
    Handle::invalid()
}

fn erased_cast_ref<'rt, T: 'static + for<'x> Castable<'x>>(
    rt: &'rt dyn ForeignRuntime,
    value: &dyn Any,
    policy: RvPolicy,
    parent: Handle,
) -> Handle {
    match value.downcast_ref::<T>() {
        Some(value) => caster::cast_with::<T>(rt, Source::borrowed(value), policy, parent),
        None => type_mismatch::<T>(rt),
    }
}

fn erased_cast_owned<'rt, T: 'static + for<'x> Castable<'x>>(
    rt: &'rt dyn ForeignRuntime,
    value: Box<dyn Any>,
    policy: RvPolicy,
    parent: Handle,
) -> Handle {
    match value.downcast::<T>() {
        Ok(value) => caster::cast_with::<T>(rt, Source::value(*value), policy, parent),
        Err(_) => type_mismatch::<T>(rt),
    }
}

// ============================================================================
// Caster Table
// ============================================================================

/// Caster entries keyed by native type identity
#[derive(Debug, Default, Clone)]
pub struct CasterTable {
    entries: FxHashMap<TypeId, CasterEntry>,
}

impl CasterTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with an entry for every built-in caster
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        table
            .register::<()>()
            .register::<bool>()
            .register::<i8>()
            .register::<i16>()
            .register::<i32>()
            .register::<i64>()
            .register::<isize>()
            .register::<i128>()
            .register::<u8>()
            .register::<u16>()
            .register::<u32>()
            .register::<u64>()
            .register::<usize>()
            .register::<u128>()
            .register::<f32>()
            .register::<f64>()
            .register::<String>()
            .register::<Handle>();
        table
    }

    /// Add or replace the entry for `T`
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: 'static + for<'rt> Castable<'rt>,
    {
        self.entries.insert(TypeId::of::<T>(), CasterEntry::of::<T>());
        self
    }

    /// Entry for a type
    pub fn get(&self, type_id: TypeId) -> Option<&CasterEntry> {
        self.entries.get(&type_id)
    }

    /// Whether `T` has an entry
    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load `src` as `T` through the table. `None` when `T` has no entry or
    /// the load fails.
    pub fn load<T: 'static>(&self, rt: &dyn ForeignRuntime, src: Handle, convert: bool) -> Option<T> {
        let entry = self.get(TypeId::of::<T>())?;
        entry
            .load(rt, src, convert)
            .and_then(|value| value.downcast::<T>().ok())
            .map(|value| *value)
    }

    /// Cast a borrowed value by its dynamic type.
    ///
    /// Leaves a pending `TypeError` and returns an invalid handle when the
    /// type has no entry.
    pub fn cast(&self, rt: &dyn ForeignRuntime, value: &dyn Any, policy: RvPolicy, parent: Handle) -> Handle {
        match self.get(value.type_id()) {
            Some(entry) => entry.cast_ref(rt, value, policy, parent),
            None => {
                rt.err_restore(ForeignException::new(
                    ForeignErrorKind::TypeError,
                    "no caster registered for this native type",
                ));
                Handle::invalid()
            }
        }
    }

    /// Cast an owned value by its dynamic type
    pub fn cast_owned(
        &self,
        rt: &dyn ForeignRuntime,
        value: Box<dyn Any>,
        policy: RvPolicy,
        parent: Handle,
    ) -> Handle {
        match self.get((*value).type_id()) {
            Some(entry) => entry.cast_owned(rt, value, policy, parent),
            None => {
                rt.err_restore(ForeignException::new(
                    ForeignErrorKind::TypeError,
                    "no caster registered for this native type",
                ));
                Handle::invalid()
            }
        }
    }
}

static BUILTIN_CASTERS: Lazy<CasterTable> = Lazy::new(CasterTable::with_builtins);

/// Shared table of the built-in casters, built on first use
pub fn builtin_casters() -> &'static CasterTable {
    &BUILTIN_CASTERS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_registered() {
        let table = builtin_casters();
        assert!(table.contains::<i32>());
        assert!(table.contains::<u128>());
        assert!(table.contains::<f32>());
        assert!(table.contains::<String>());
        assert!(!table.contains::<char>());
    }

    #[test]
    fn test_entry_type_names() {
        let table = CasterTable::with_builtins();
        assert_eq!(table.get(TypeId::of::<i64>()).unwrap().type_name(), "int");
        assert_eq!(table.get(TypeId::of::<f64>()).unwrap().type_name(), "float");
        assert_eq!(table.get(TypeId::of::<bool>()).unwrap().type_name(), "bool");
        assert_eq!(table.get(TypeId::of::<()>()).unwrap().type_name(), "None");
    }

    #[test]
    fn test_register_composite() {
        let mut table = CasterTable::new();
        assert!(table.is_empty());
        table.register::<(i32, f64)>();
        let entry = table.get(TypeId::of::<(i32, f64)>()).unwrap();
        assert_eq!(entry.type_name(), "Tuple[int, float]");
        assert_eq!(table.len(), 1);
    }
}
