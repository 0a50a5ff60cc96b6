//! Fixed-width numeric casters
//!
//! Integers travel through the narrowest runtime width that holds them: the
//! 64-bit `long` width for everything up to 64 bits, the 128-bit extended
//! width for `i128`/`u128`. Floats travel through `f64`.

use super::{Caster, Castable, Source};
use crate::handle::Handle;
use crate::policy::RvPolicy;
use crate::runtime::ForeignRuntime;

/// Caster for a fixed-width integer or float type
#[derive(Debug)]
pub struct NumberCaster<T> {
    value: Option<T>,
}

impl<T> Default for NumberCaster<T> {
    fn default() -> Self {
        Self { value: None }
    }
}

macro_rules! int_caster {
    ($($ty:ty => $wide:ty, $from:ident, $as:ident;)*) => {$(
        impl<'rt> Castable<'rt> for $ty {
            type Caster = NumberCaster<$ty>;
        }

        impl<'rt> Caster<'rt> for NumberCaster<$ty> {
            type Value = $ty;

            fn type_name() -> String {
                "int".to_string()
            }

            fn load(&mut self, rt: &'rt dyn ForeignRuntime, src: Handle, convert: bool) -> bool {
                let Some(raw) = src.ptr() else {
                    return false;
                };

                if !convert && !rt.kind(raw).is_int() {
                    log::trace!("load {}: '{}' is not an int", stringify!($ty), rt.type_name(raw));
                    return false;
                }

                let wide: $wide = match rt.$as(raw) {
                    Some(wide) => wide,
                    None => {
                        rt.err_clear();
                        return false;
                    }
                };

                match <$ty>::try_from(wide) {
                    Ok(value) => {
                        self.value = Some(value);
                        true
                    }
                    Err(_) => {
                        log::trace!("load {}: {} is out of range", stringify!($ty), wide);
                        false
                    }
                }
            }

            fn cast(
                rt: &'rt dyn ForeignRuntime,
                src: Source<'_, $ty>,
                policy: RvPolicy,
                _parent: Handle,
            ) -> Handle {
                let value = src.with_value(policy, |value| *value);
                rt.$from(value as $wide).into()
            }

            fn into_value(self) -> Option<$ty> {
                self.value
            }
        }
    )*};
}

int_caster! {
    i8 => i64, long_from_i64, long_as_i64;
    i16 => i64, long_from_i64, long_as_i64;
    i32 => i64, long_from_i64, long_as_i64;
    i64 => i64, long_from_i64, long_as_i64;
    isize => i64, long_from_i64, long_as_i64;
    u8 => u64, long_from_u64, long_as_u64;
    u16 => u64, long_from_u64, long_as_u64;
    u32 => u64, long_from_u64, long_as_u64;
    u64 => u64, long_from_u64, long_as_u64;
    usize => u64, long_from_u64, long_as_u64;
    i128 => i128, long_from_i128, long_as_i128;
    u128 => u128, long_from_u128, long_as_u128;
}

macro_rules! float_caster {
    ($($ty:ty),*) => {$(
        impl<'rt> Castable<'rt> for $ty {
            type Caster = NumberCaster<$ty>;
        }

        impl<'rt> Caster<'rt> for NumberCaster<$ty> {
            type Value = $ty;

            fn type_name() -> String {
                "float".to_string()
            }

            fn load(&mut self, rt: &'rt dyn ForeignRuntime, src: Handle, convert: bool) -> bool {
                let Some(raw) = src.ptr() else {
                    return false;
                };

                if !convert && !rt.kind(raw).is_float() {
                    log::trace!("load {}: '{}' is not a float", stringify!($ty), rt.type_name(raw));
                    return false;
                }

                match rt.float_as_f64(raw) {
                    Some(value) => {
                        self.value = Some(value as $ty);
                        true
                    }
                    None => {
                        rt.err_clear();
                        false
                    }
                }
            }

            fn cast(
                rt: &'rt dyn ForeignRuntime,
                src: Source<'_, $ty>,
                policy: RvPolicy,
                _parent: Handle,
            ) -> Handle {
                let value = src.with_value(policy, |value| *value);
                rt.float_from_f64(value as f64).into()
            }

            fn into_value(self) -> Option<$ty> {
                self.value
            }
        }
    )*};
}

float_caster!(f32, f64);
