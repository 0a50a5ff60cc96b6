use std::any::{Any, TypeId};

use tether_engine::Engine;
use tether_sdk::{builtin_casters, CasterTable, ForeignErrorKind, ForeignRuntime, Handle, Object, RvPolicy};

#[derive(Clone, Debug, PartialEq)]
struct Celsius(f64);

tether_sdk::opaque!(Celsius);

// ============================================================================
// Builtin Table Tests
// ============================================================================

#[test]
fn test_cast_by_dynamic_type() {
    let engine = Engine::new();
    let values: Vec<Box<dyn Any>> = vec![
        Box::new(7u16),
        Box::new(2.5f32),
        Box::new("hi".to_string()),
        Box::new(true),
    ];

    let reprs: Vec<String> = values
        .iter()
        .map(|value| {
            let handle =
                builtin_casters().cast(&engine, &**value, RvPolicy::Automatic, Handle::invalid());
            Object::steal_handle(&engine, handle).unwrap().repr().unwrap()
        })
        .collect();

    assert_eq!(reprs, vec!["7", "2.5", "'hi'", "True"]);
}

#[test]
fn test_load_through_table() {
    let engine = Engine::new();
    let table = builtin_casters();
    let handle = table.cast(&engine, &-12i64, RvPolicy::Move, Handle::invalid());
    let obj = Object::steal_handle(&engine, handle).unwrap();

    assert_eq!(table.load::<i64>(&engine, obj.handle(), false), Some(-12));
    assert_eq!(table.load::<i8>(&engine, obj.handle(), false), Some(-12));
    assert_eq!(table.load::<u32>(&engine, obj.handle(), true), None);
    assert_eq!(table.load::<char>(&engine, obj.handle(), true), None);
    assert!(!engine.err_occurred());
}

#[test]
fn test_cast_owned_moves_value() {
    let engine = Engine::new();
    let handle = builtin_casters().cast_owned(
        &engine,
        Box::new("owned".to_string()),
        RvPolicy::Automatic,
        Handle::invalid(),
    );

    let obj = Object::steal_handle(&engine, handle).unwrap();
    assert_eq!(obj.str().unwrap(), "owned");
}

#[test]
fn test_unknown_type_sets_error() {
    let engine = Engine::new();

    let handle = builtin_casters().cast(&engine, &'c', RvPolicy::Move, Handle::invalid());
    assert!(!handle.is_valid());

    let pending = engine.err_fetch().unwrap();
    assert_eq!(pending.kind, ForeignErrorKind::TypeError);
}

// ============================================================================
// Registration Tests
// ============================================================================

#[test]
fn test_registered_user_type() {
    let engine = Engine::new();
    engine.register_type::<Celsius>("Celsius");

    let mut table = CasterTable::with_builtins();
    table.register::<Celsius>().register::<(i32, f64)>();
    assert_eq!(table.get(TypeId::of::<(i32, f64)>()).unwrap().type_name(), "Tuple[int, float]");

    let handle = table.cast(&engine, &Celsius(21.5), RvPolicy::Automatic, Handle::invalid());
    let obj = Object::steal_handle(&engine, handle).unwrap();
    assert_eq!(engine.type_name(obj.ptr()), "Celsius");
    assert_eq!(table.load::<Celsius>(&engine, obj.handle(), false), Some(Celsius(21.5)));

    let pair = Object::steal_handle(
        &engine,
        table.cast(&engine, &(3i32, 4.5f64), RvPolicy::Copy, Handle::invalid()),
    )
    .unwrap();
    assert_eq!(pair.repr().unwrap(), "(3, 4.5)");
}
