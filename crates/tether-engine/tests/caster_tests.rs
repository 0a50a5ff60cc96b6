use tether_engine::{Engine, EngineOptions, ResourceLimits};
use tether_sdk::{
    cast, cast_ref, load, try_load, BridgeError, ForeignErrorKind, ForeignRuntime, Object, RvPolicy, Str,
};

fn raised_message<T: std::fmt::Debug>(result: Result<T, BridgeError>) -> String {
    match result {
        Err(BridgeError::Raised(message)) => message,
        other => panic!("expected a raised error, got {:?}", other),
    }
}

// ============================================================================
// Integer Tests
// ============================================================================

#[test]
fn test_int_round_trip() {
    let engine = Engine::new();

    let obj = cast(&engine, 42i32, RvPolicy::Automatic).unwrap();
    assert_eq!(obj.repr().unwrap(), "42");
    assert_eq!(load::<i32>(&engine, obj.handle(), false).unwrap(), 42);
    assert_eq!(load::<u8>(&engine, obj.handle(), false).unwrap(), 42);
    assert_eq!(load::<i128>(&engine, obj.handle(), false).unwrap(), 42);
}

#[test]
fn test_int_extremes() {
    let engine = Engine::new();

    let min = cast(&engine, i64::MIN, RvPolicy::Move).unwrap();
    assert_eq!(load::<i64>(&engine, min.handle(), false).unwrap(), i64::MIN);

    let max = cast(&engine, u64::MAX, RvPolicy::Move).unwrap();
    assert_eq!(load::<u64>(&engine, max.handle(), false).unwrap(), u64::MAX);
    assert!(try_load::<i64>(&engine, max.handle(), false).is_none());

    let wide = cast(&engine, u128::MAX, RvPolicy::Move).unwrap();
    assert_eq!(wide.repr().unwrap(), u128::MAX.to_string());
    assert_eq!(load::<u128>(&engine, wide.handle(), false).unwrap(), u128::MAX);
    assert!(try_load::<i128>(&engine, wide.handle(), false).is_none());
}

#[test]
fn test_int_narrowing_overflow() {
    let engine = Engine::new();
    let obj = cast(&engine, 300i32, RvPolicy::Move).unwrap();

    let message = raised_message(load::<i8>(&engine, obj.handle(), false));
    assert_eq!(message, "tether::load(): unable to convert 'int' to 'int'");
    assert!(!engine.err_occurred());
}

#[test]
fn test_negative_to_unsigned_fails_cleanly() {
    let engine = Engine::new();
    let obj = cast(&engine, -1i32, RvPolicy::Move).unwrap();

    assert!(try_load::<u32>(&engine, obj.handle(), true).is_none());
    assert!(try_load::<u128>(&engine, obj.handle(), true).is_none());
    assert!(!engine.err_occurred());
}

#[test]
fn test_int_from_float_requires_convert() {
    let engine = Engine::new();
    let whole = cast(&engine, 4.0f64, RvPolicy::Move).unwrap();
    let fractional = cast(&engine, 4.5f64, RvPolicy::Move).unwrap();

    assert!(try_load::<i32>(&engine, whole.handle(), false).is_none());
    assert_eq!(try_load::<i32>(&engine, whole.handle(), true), Some(4));
    assert!(try_load::<i32>(&engine, fractional.handle(), true).is_none());
    assert!(!engine.err_occurred());
}

macro_rules! assert_long_bounds {
    ($engine:expr, $($ty:ty),+ $(,)?) => {$(
        for value in [<$ty>::MIN, 0 as $ty, <$ty>::MAX] {
            let obj = cast($engine, value, RvPolicy::Move).unwrap();
            assert_eq!(load::<$ty>($engine, obj.handle(), false).unwrap(), value, "{}", stringify!($ty));
        }

        let above = cast($engine, <$ty>::MAX as i128 + 1, RvPolicy::Move).unwrap();
        assert!(try_load::<$ty>($engine, above.handle(), true).is_none(), "{} above max", stringify!($ty));
        let below = cast($engine, <$ty>::MIN as i128 - 1, RvPolicy::Move).unwrap();
        assert!(try_load::<$ty>($engine, below.handle(), true).is_none(), "{} below min", stringify!($ty));
    )+};
}

#[test]
fn test_every_integer_type_round_trips_at_bounds() {
    let engine = Engine::new();
    assert_long_bounds!(&engine, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
    assert!(!engine.err_occurred());
}

#[test]
fn test_extended_integer_bounds() {
    let engine = Engine::new();

    for value in [i128::MIN, -1, 0, i128::MAX] {
        let obj = cast(&engine, value, RvPolicy::Move).unwrap();
        assert_eq!(load::<i128>(&engine, obj.handle(), false).unwrap(), value);
    }
    for value in [0, 1, u128::MAX] {
        let obj = cast(&engine, value, RvPolicy::Move).unwrap();
        assert_eq!(load::<u128>(&engine, obj.handle(), false).unwrap(), value);
    }

    let above = cast(&engine, i128::MAX as u128 + 1, RvPolicy::Move).unwrap();
    assert!(try_load::<i128>(&engine, above.handle(), true).is_none());
    assert_eq!(load::<u128>(&engine, above.handle(), false).unwrap(), i128::MAX as u128 + 1);

    let below = cast(&engine, i128::MIN, RvPolicy::Move).unwrap();
    assert!(try_load::<u128>(&engine, below.handle(), true).is_none());
    assert!(!engine.err_occurred());
}

#[test]
fn test_every_float_type_round_trips_at_bounds() {
    let engine = Engine::new();

    for value in [f32::MIN, f32::MIN_POSITIVE, 0.0, f32::EPSILON, f32::MAX, f32::INFINITY] {
        let obj = cast(&engine, value, RvPolicy::Move).unwrap();
        assert_eq!(load::<f32>(&engine, obj.handle(), false).unwrap(), value);
    }
    for value in [f64::MIN, f64::MIN_POSITIVE, -0.0, f64::EPSILON, f64::MAX, f64::NEG_INFINITY] {
        let obj = cast(&engine, value, RvPolicy::Move).unwrap();
        assert_eq!(load::<f64>(&engine, obj.handle(), false).unwrap(), value);
    }

    let nan = cast(&engine, f32::NAN, RvPolicy::Move).unwrap();
    assert!(load::<f32>(&engine, nan.handle(), false).unwrap().is_nan());
}

// ============================================================================
// Float Tests
// ============================================================================

#[test]
fn test_float_round_trip() {
    let engine = Engine::new();

    let obj = cast(&engine, 4.5f64, RvPolicy::Move).unwrap();
    assert_eq!(obj.repr().unwrap(), "4.5");
    assert_eq!(load::<f64>(&engine, obj.handle(), false).unwrap(), 4.5);
    assert_eq!(load::<f32>(&engine, obj.handle(), false).unwrap(), 4.5);
}

#[test]
fn test_float_from_int_requires_convert() {
    let engine = Engine::new();
    let obj = cast(&engine, 3i64, RvPolicy::Move).unwrap();

    assert!(try_load::<f64>(&engine, obj.handle(), false).is_none());
    assert_eq!(try_load::<f64>(&engine, obj.handle(), true), Some(3.0));
}

#[test]
fn test_float_from_string_fails_with_convert() {
    let engine = Engine::new();
    let obj = cast(&engine, "4.5".to_string(), RvPolicy::Move).unwrap();

    assert!(try_load::<f64>(&engine, obj.handle(), true).is_none());
    assert!(!engine.err_occurred());
}

// ============================================================================
// Singleton Tests
// ============================================================================

#[test]
fn test_bool_is_strict() {
    let engine = Engine::new();

    let yes = cast(&engine, true, RvPolicy::Move).unwrap();
    assert_eq!(yes.ptr(), engine.boolean(true));
    assert_eq!(yes.repr().unwrap(), "True");
    assert_eq!(load::<bool>(&engine, yes.handle(), false).unwrap(), true);

    let one = cast(&engine, 1i32, RvPolicy::Move).unwrap();
    assert!(try_load::<bool>(&engine, one.handle(), true).is_none());

    // Booleans are integers.
    assert_eq!(load::<i32>(&engine, yes.handle(), false).unwrap(), 1);
}

#[test]
fn test_unit_is_none() {
    let engine = Engine::new();

    let none = cast(&engine, (), RvPolicy::Move).unwrap();
    assert!(none.is_none());
    assert!(load::<()>(&engine, none.handle(), false).is_ok());

    let zero = cast(&engine, 0i32, RvPolicy::Move).unwrap();
    assert!(try_load::<()>(&engine, zero.handle(), true).is_none());
}

#[test]
fn test_singletons_are_not_counted() {
    let engine = Engine::new();
    let before = engine.stats();

    for _ in 0..10 {
        drop(cast(&engine, false, RvPolicy::Move).unwrap());
        drop(cast(&engine, (), RvPolicy::Move).unwrap());
    }

    assert_eq!(engine.stats(), before);
    assert!(engine.is_alive(engine.none()));
}

// ============================================================================
// String Tests
// ============================================================================

#[test]
fn test_string_round_trip() {
    let engine = Engine::new();

    let obj = cast(&engine, "héllo wörld".to_string(), RvPolicy::Move).unwrap();
    assert_eq!(obj.kind(), tether_sdk::ObjectKind::Str);
    assert_eq!(load::<String>(&engine, obj.handle(), false).unwrap(), "héllo wörld");
    assert_eq!(obj.len().unwrap(), 11);
}

#[test]
fn test_string_load_is_strict() {
    let engine = Engine::new();
    let obj = cast(&engine, 7i32, RvPolicy::Move).unwrap();

    assert!(try_load::<String>(&engine, obj.handle(), true).is_none());
    assert!(try_load::<Str<'_>>(&engine, obj.handle(), true).is_none());
}

#[test]
fn test_cast_ref_leaves_value_usable() {
    let engine = Engine::new();
    let text = "borrowed".to_string();

    let obj = cast_ref(&engine, &text, RvPolicy::Automatic).unwrap();
    assert_eq!(obj.str().unwrap(), "borrowed");
    assert_eq!(text, "borrowed");
}

// ============================================================================
// Tuple Tests
// ============================================================================

#[test]
fn test_pair_round_trip() {
    let engine = Engine::new();

    let obj = cast(&engine, (3i32, 4.5f64), RvPolicy::Move).unwrap();
    assert_eq!(obj.repr().unwrap(), "(3, 4.5)");
    assert_eq!(load::<(i32, f64)>(&engine, obj.handle(), false).unwrap(), (3, 4.5));

    // Without conversion the float component cannot become an int.
    assert!(try_load::<(i32, i32)>(&engine, obj.handle(), false).is_none());
    assert!(try_load::<(i32, f64, i32)>(&engine, obj.handle(), true).is_none());
    assert!(!engine.err_occurred());
}

#[test]
fn test_single_tuple_repr() {
    let engine = Engine::new();
    let obj = cast(&engine, (1u8,), RvPolicy::Move).unwrap();
    assert_eq!(obj.repr().unwrap(), "(1,)");
}

#[test]
fn test_nested_tuples() {
    let engine = Engine::new();
    let value = ((1i32, 2i32), "x".to_string(), (true, ()));

    let obj = cast(&engine, value.clone(), RvPolicy::Move).unwrap();
    assert_eq!(obj.repr().unwrap(), "((1, 2), 'x', (True, None))");

    let loaded = load::<((i32, i32), String, (bool, ()))>(&engine, obj.handle(), false).unwrap();
    assert_eq!(loaded, value);
}

#[test]
fn test_tuple_load_from_list() {
    let engine = Engine::new();
    let list = Object::steal(&engine, engine.new_list().unwrap());
    let a = cast(&engine, 1i32, RvPolicy::Move).unwrap();
    let b = cast(&engine, 2i32, RvPolicy::Move).unwrap();
    assert!(engine.list_append(list.ptr(), a.ptr()));
    assert!(engine.list_append(list.ptr(), b.ptr()));

    assert_eq!(load::<(i64, i64)>(&engine, list.handle(), false).unwrap(), (1, 2));
}

#[test]
fn test_failed_component_cast_releases_built_components() {
    let options = EngineOptions::with_limits(ResourceLimits::with_object_limit(1));
    let engine = Engine::with_options(options);

    let err = cast(&engine, (1i32, 2i32), RvPolicy::Move).unwrap_err();
    assert!(err.as_foreign().unwrap().matches(ForeignErrorKind::MemoryError));
    assert_eq!(engine.stats().live_objects, 0);
    assert_eq!(engine.stats().total_finalized, 1);
}

#[test]
fn test_failed_tuple_load_releases_items() {
    let engine = Engine::new();
    let obj = cast(&engine, (1i32, "x".to_string()), RvPolicy::Move).unwrap();

    assert!(try_load::<(i32, i32)>(&engine, obj.handle(), true).is_none());
    assert!(try_load::<(String, String)>(&engine, obj.handle(), true).is_none());
    assert_eq!(engine.ref_count(obj.ptr()), Some(1));

    drop(obj);
    assert_eq!(engine.stats().live_objects, 0);
}

#[test]
fn test_nested_cast_failure_releases_every_level() {
    let options = EngineOptions::with_limits(ResourceLimits::with_object_limit(3));
    let engine = Engine::with_options(options);

    // Inner pair and its two items fit; the outer sibling does not.
    let err = cast(&engine, ((1i32, 2i32), 3i32), RvPolicy::Move).unwrap_err();
    assert!(err.as_foreign().unwrap().matches(ForeignErrorKind::MemoryError));
    assert_eq!(engine.stats().live_objects, 0);
    assert_eq!(engine.stats().total_finalized, 3);
}

#[test]
fn test_nested_load_failure_releases_every_level() {
    let engine = Engine::new();
    let obj = cast(&engine, ((1i32, "x".to_string()), 2i32), RvPolicy::Move).unwrap();
    let [inner, _] = tether_sdk::protocol::seq_size_fetch::<2>(&engine, obj.ptr()).unwrap();
    let [first, second] = tether_sdk::protocol::seq_size_fetch::<2>(&engine, inner.ptr()).unwrap();
    let counts = |engine: &Engine| {
        [inner.ptr(), first.ptr(), second.ptr()].map(|raw| engine.ref_count(raw))
    };
    let before = counts(&engine);

    assert!(try_load::<((i32, i32), i32)>(&engine, obj.handle(), true).is_none());
    assert!(try_load::<((i32, String), String)>(&engine, obj.handle(), true).is_none());
    assert_eq!(counts(&engine), before);
    assert!(!engine.err_occurred());
}

// ============================================================================
// Object Passthrough Tests
// ============================================================================

#[test]
fn test_object_cast_is_identity() {
    let engine = Engine::new();
    let obj = cast(&engine, 5i32, RvPolicy::Move).unwrap();

    let again = cast_ref(&engine, &obj, RvPolicy::Copy).unwrap();
    assert!(again.is(&obj));
    assert_eq!(engine.ref_count(obj.ptr()), Some(2));

    drop(again);
    assert_eq!(engine.ref_count(obj.ptr()), Some(1));
}

#[test]
fn test_object_load_checks_kind() {
    let engine = Engine::new();
    let text = cast(&engine, "abc".to_string(), RvPolicy::Move).unwrap();

    let loaded: Str<'_> = load(&engine, text.handle(), false).unwrap();
    assert_eq!(loaded.to_native().unwrap(), "abc");
    assert_eq!(engine.ref_count(text.ptr()), Some(2));

    let any: Object<'_> = load(&engine, text.handle(), false).unwrap();
    assert!(any.is(&text));
}
