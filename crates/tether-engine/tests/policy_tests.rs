use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tether_engine::{Engine, EngineOptions, ResourceLimits};
use tether_sdk::{
    cast, cast_ptr, cast_ref, load, try_load, BridgeError, ForeignErrorKind, ForeignRuntime,
    GenericCaster, Handle, Object, RvPolicy,
};

/// Counts its drops
#[derive(Clone, Debug)]
struct Tracked {
    id: u32,
    drops: Arc<AtomicUsize>,
}

impl Tracked {
    fn new(id: u32) -> (Self, Arc<AtomicUsize>) {
        let drops = Arc::new(AtomicUsize::new(0));
        (
            Self {
                id,
                drops: drops.clone(),
            },
            drops,
        )
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

/// Registered without a copy shim
#[derive(Clone, Debug)]
struct Handleish(u64);

impl Handleish {
    fn token(&self) -> u64 {
        self.0
    }
}

/// Never registered
#[derive(Clone, Debug)]
struct Stray(Tracked);

tether_sdk::opaque!(Tracked, Point, Handleish, Stray);

fn engine() -> Engine {
    let engine = Engine::new();
    engine.register_type::<Tracked>("Tracked");
    engine.register_type::<Point>("Point");
    engine.register_opaque::<Handleish>("Handleish");
    engine
}

fn foreign_kind<T: std::fmt::Debug>(result: Result<T, BridgeError>) -> ForeignErrorKind {
    match result {
        Err(BridgeError::Foreign(err)) => err.kind(),
        other => panic!("expected a foreign error, got {:?}", other),
    }
}

fn loaded_ptr<T: Clone + 'static>(engine: &Engine, obj: &Object<'_>) -> Option<NonNull<T>> {
    let mut caster = GenericCaster::<T>::default();
    if caster.load_instance(engine, obj.handle(), false) {
        caster.as_ptr()
    } else {
        None
    }
}

// ============================================================================
// Owning Policy Tests
// ============================================================================

#[test]
fn test_rvalue_is_moved() {
    let engine = engine();
    let (value, drops) = Tracked::new(1);

    let obj = cast(&engine, value, RvPolicy::Automatic).unwrap();
    assert_eq!(obj.kind(), tether_sdk::ObjectKind::Instance);
    assert_eq!(engine.type_name(obj.ptr()), "Tracked");
    assert_eq!(engine.instance_owns(obj.ptr()), Some(true));
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(obj);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lvalue_is_copied() {
    let engine = engine();
    let (value, drops) = Tracked::new(2);

    let obj = cast_ref(&engine, &value, RvPolicy::Automatic).unwrap();
    assert_ne!(loaded_ptr::<Tracked>(&engine, &obj), Some(NonNull::from(&value)));
    assert_eq!(load::<Tracked>(&engine, obj.handle(), false).unwrap().id, 2);
    // The loaded clone above was dropped.
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    drop(obj);
    assert_eq!(drops.load(Ordering::SeqCst), 2);
    drop(value);
    assert_eq!(drops.load(Ordering::SeqCst), 3);
}

#[test]
fn test_copy_outlives_source() {
    let engine = engine();
    let (value, drops) = Tracked::new(12);

    let obj = cast_ref(&engine, &value, RvPolicy::Copy).unwrap();
    drop(value);
    assert_eq!(drops.load(Ordering::SeqCst), 1);

    assert_eq!(load::<Tracked>(&engine, obj.handle(), false).unwrap().id, 12);
    assert_eq!(engine.instance_owns(obj.ptr()), Some(true));
    drop(obj);
    assert_eq!(drops.load(Ordering::SeqCst), 3);
}

#[test]
fn test_take_ownership_outlives_caller() {
    let engine = engine();
    let (value, drops) = Tracked::new(13);
    let ptr = NonNull::new(Box::into_raw(Box::new(value)));

    let obj = unsafe { cast_ptr(&engine, ptr, RvPolicy::TakeOwnership, Handle::invalid()) }.unwrap();
    let loaded = loaded_ptr::<Tracked>(&engine, &obj).unwrap();
    assert_eq!(unsafe { loaded.as_ref() }.id, 13);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(obj);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_copy_of_uncopyable_type_fails() {
    let engine = engine();

    let err = cast_ref(&engine, &Handleish(7), RvPolicy::Copy).unwrap_err();
    let err = err.as_foreign().unwrap();
    assert!(err.matches(ForeignErrorKind::TypeError));
    assert_eq!(err.message(), "type 'Handleish' is not copyable");

    // Moving is fine.
    let obj = cast(&engine, Handleish(7), RvPolicy::Move).unwrap();
    assert_eq!(engine.instance_owns(obj.ptr()), Some(true));
    let loaded = loaded_ptr::<Handleish>(&engine, &obj).unwrap();
    assert_eq!(unsafe { loaded.as_ref() }.token(), 7);
}

#[test]
fn test_pointer_is_adopted() {
    let engine = engine();
    let (value, drops) = Tracked::new(3);
    let ptr = NonNull::new(Box::into_raw(Box::new(value)));

    let obj = unsafe { cast_ptr(&engine, ptr, RvPolicy::Automatic, Handle::invalid()) }.unwrap();
    assert_eq!(engine.instance_owns(obj.ptr()), Some(true));
    assert_eq!(loaded_ptr::<Tracked>(&engine, &obj), ptr);

    drop(obj);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_move_from_pointer_copies() {
    let engine = engine();
    let (mut value, drops) = Tracked::new(4);

    let obj = unsafe {
        cast_ptr(&engine, Some(NonNull::from(&mut value)), RvPolicy::Move, Handle::invalid())
    }
    .unwrap();
    assert_eq!(engine.instance_owns(obj.ptr()), Some(true));
    assert_eq!(value.id, 4);

    drop(obj);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_null_pointer_is_none() {
    let engine = engine();
    let obj = unsafe { cast_ptr::<Tracked>(&engine, None, RvPolicy::Automatic, Handle::invalid()) }.unwrap();
    assert!(obj.is_none());
}

// ============================================================================
// Reference Policy Tests
// ============================================================================

#[test]
fn test_reference_does_not_own() {
    let engine = engine();
    let (mut value, drops) = Tracked::new(5);
    let ptr = NonNull::from(&mut value);

    let obj = unsafe { cast_ptr(&engine, Some(ptr), RvPolicy::AutomaticReference, Handle::invalid()) }.unwrap();
    assert_eq!(engine.instance_owns(obj.ptr()), Some(false));
    assert_eq!(loaded_ptr::<Tracked>(&engine, &obj), Some(ptr));

    drop(obj);
    assert_eq!(drops.load(Ordering::SeqCst), 0);
}

#[test]
fn test_reference_internal_keeps_parent_alive() {
    let engine = engine();
    let mut point = Point { x: 1.0, y: 2.0 };
    let parent = Object::steal(&engine, engine.new_namespace().unwrap());
    let parent_raw = parent.ptr();

    let child = unsafe {
        cast_ptr(&engine, Some(NonNull::from(&mut point)), RvPolicy::ReferenceInternal, parent.handle())
    }
    .unwrap();
    assert_eq!(engine.link_count(), 1);
    assert_eq!(engine.parents_of(child.ptr()), vec![parent_raw]);
    assert_eq!(engine.ref_count(parent_raw), Some(2));

    drop(parent);
    assert!(engine.is_alive(parent_raw));

    drop(child);
    assert!(!engine.is_alive(parent_raw));
    assert_eq!(engine.link_count(), 0);
}

#[test]
fn test_reference_internal_requires_parent() {
    let engine = engine();
    let mut point = Point { x: 0.0, y: 0.0 };

    let result = unsafe {
        cast_ptr(&engine, Some(NonNull::from(&mut point)), RvPolicy::ReferenceInternal, Handle::invalid())
    };
    assert_eq!(foreign_kind(result), ForeignErrorKind::TypeError);
    assert_eq!(engine.link_count(), 0);
}

#[test]
fn test_reference_to_lvalue_is_refused() {
    let engine = engine();
    let point = Point { x: 0.0, y: 0.0 };

    assert_eq!(
        foreign_kind(cast_ref(&engine, &point, RvPolicy::Reference)),
        ForeignErrorKind::TypeError
    );
    assert_eq!(
        foreign_kind(cast_ref(&engine, &point, RvPolicy::TakeOwnership)),
        ForeignErrorKind::TypeError
    );
    assert_eq!(engine.stats().live_objects, 0);
}

#[test]
fn test_reference_internal_reaches_tuple_components() {
    let engine = engine();
    let mut pair = (Point { x: 1.0, y: 1.0 }, 9i32);
    let parent = Object::steal(&engine, engine.new_namespace().unwrap());

    let obj = unsafe {
        cast_ptr(&engine, Some(NonNull::from(&mut pair)), RvPolicy::ReferenceInternal, parent.handle())
    }
    .unwrap();

    let first = obj.item(0).get().unwrap();
    assert_eq!(loaded_ptr::<Point>(&engine, &first), Some(NonNull::from(&pair.0)));
    assert_eq!(engine.parents_of(first.ptr()), vec![parent.ptr()]);
    assert_eq!(load::<i32>(&engine, obj.item(1).get().unwrap().handle(), false).unwrap(), 9);
}

// ============================================================================
// Registry Failure Tests
// ============================================================================

#[test]
fn test_unregistered_type_fails() {
    let engine = engine();
    let (value, drops) = Tracked::new(6);
    let stray = Stray(value);
    assert_eq!(stray.0.id, 6);
    let ptr = NonNull::new(Box::into_raw(Box::new(stray)));

    let err = unsafe { cast_ptr(&engine, ptr, RvPolicy::TakeOwnership, Handle::invalid()) }.unwrap_err();
    let err = err.as_foreign().unwrap();
    assert!(err.matches(ForeignErrorKind::TypeError));
    assert!(err.message().ends_with("Stray' is not registered"));
    assert!(!engine.is_type_registered::<Stray>());

    // The adopted box was released.
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_allocation_failure_drops_moved_value() {
    let engine = Engine::with_options(EngineOptions::with_limits(ResourceLimits::with_object_limit(0)));
    engine.register_type::<Tracked>("Tracked");
    let (value, drops) = Tracked::new(7);

    assert_eq!(
        foreign_kind(cast(&engine, value, RvPolicy::Move)),
        ForeignErrorKind::MemoryError
    );
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn test_allocation_failure_drops_adopted_box() {
    let engine = Engine::with_options(EngineOptions::with_limits(ResourceLimits::with_object_limit(0)));
    engine.register_type::<Tracked>("Tracked");
    let (value, drops) = Tracked::new(8);
    let ptr = NonNull::new(Box::into_raw(Box::new(value)));

    let result = unsafe { cast_ptr(&engine, ptr, RvPolicy::TakeOwnership, Handle::invalid()) };
    assert_eq!(foreign_kind(result), ForeignErrorKind::MemoryError);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Load Tests
// ============================================================================

#[test]
fn test_load_wrong_instance_type() {
    let engine = engine();
    let obj = cast(&engine, Point { x: 1.0, y: 2.0 }, RvPolicy::Move).unwrap();

    assert_eq!(load::<Point>(&engine, obj.handle(), false).unwrap(), Point { x: 1.0, y: 2.0 });
    assert!(try_load::<Tracked>(&engine, obj.handle(), true).is_none());
    assert!(!engine.err_occurred());
}

#[test]
fn test_implicit_conversion() {
    let engine = engine();
    assert!(engine.register_implicit::<Point>(|rt, src| {
        let (x, y) = try_load::<(f64, f64)>(rt, src, true)?;
        Some(Point { x, y })
    }));

    let pair = cast(&engine, (3i32, 4.5f64), RvPolicy::Move).unwrap();
    let live = engine.stats().live_objects;

    assert!(try_load::<Point>(&engine, pair.handle(), false).is_none());
    assert_eq!(
        load::<Point>(&engine, pair.handle(), true).unwrap(),
        Point { x: 3.0, y: 4.5 }
    );

    // The temporary wrapper is gone.
    assert_eq!(engine.stats().live_objects, live);

    let text = cast(&engine, "no".to_string(), RvPolicy::Move).unwrap();
    assert!(try_load::<Point>(&engine, text.handle(), true).is_none());
    assert!(!engine.err_occurred());
}

#[test]
fn test_implicit_conversion_needs_registered_type() {
    let engine = Engine::new();
    assert!(!engine.register_implicit::<Point>(|_, _| None));
}
