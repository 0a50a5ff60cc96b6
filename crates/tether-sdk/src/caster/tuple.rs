//! Tuple casters, `(A,)` through `(A, B, C, D)`
//!
//! Loading requires a sequence of exactly the tuple's arity. Casting builds
//! every component before the foreign tuple is allocated, so a failing
//! component never leaves a partially filled container behind.

use std::marker::PhantomData;
use std::ptr::{addr_of_mut, NonNull};

use super::{cast_with, load_with, type_name_of, Caster, Castable, Native, Source};
use crate::handle::{Handle, Object};
use crate::policy::RvPolicy;
use crate::protocol::seq_size_fetch;
use crate::runtime::ForeignRuntime;

/// Move built components into a new foreign tuple
fn assemble<const N: usize>(rt: &dyn ForeignRuntime, items: [Object<'_>; N]) -> Handle {
    let Some(tuple) = rt.tuple_new(N) else {
        return Handle::invalid();
    };
    for (index, item) in items.into_iter().enumerate() {
        rt.tuple_set_item(tuple, index, item.into_raw());
    }
    Handle::new(tuple)
}

macro_rules! tuple_caster {
    ($(#[$meta:meta])* $caster:ident, $len:literal, $($name:ident : $idx:tt),+) => {
        $(#[$meta])*
        pub struct $caster<'rt, $($name),+> {
            value: Option<($($name,)+)>,
            marker: PhantomData<&'rt ()>,
        }

        impl<$($name),+> Default for $caster<'_, $($name),+> {
            fn default() -> Self {
                Self {
                    value: None,
                    marker: PhantomData,
                }
            }
        }

        impl<'rt, $($name: Castable<'rt>),+> $caster<'rt, $($name),+> {
            fn build(
                rt: &'rt dyn ForeignRuntime,
                sources: ($(Source<'_, $name>,)+),
                policy: RvPolicy,
                parent: Handle,
            ) -> Option<[Object<'rt>; $len]> {
                Some([$(
                    Object::steal_handle(rt, cast_with::<$name>(rt, sources.$idx, policy, parent))?,
                )+])
            }
        }

        impl<'rt, $($name: Castable<'rt>),+> Castable<'rt> for ($($name,)+) {
            type Caster = $caster<'rt, $($name),+>;
        }

        impl<'rt, $($name: Castable<'rt>),+> Caster<'rt> for $caster<'rt, $($name),+> {
            type Value = ($($name,)+);

            fn type_name() -> String {
                let names: [String; $len] = [$(type_name_of::<'rt, $name>()),+];
                format!("Tuple[{}]", names.join(", "))
            }

            fn load(&mut self, rt: &'rt dyn ForeignRuntime, src: Handle, convert: bool) -> bool {
                let Some(raw) = src.ptr() else {
                    return false;
                };

                let Some(items) = seq_size_fetch::<$len>(rt, raw) else {
                    log::trace!("load tuple: '{}' is not a sequence of {}", rt.type_name(raw), $len);
                    return false;
                };

                // Fetched items are released on every path when `items` drops.
                self.value = Some(($(
                    match load_with::<$name>(rt, items[$idx].handle(), convert) {
                        Some(value) => value,
                        None => return false,
                    },
                )+));
                true
            }

            fn cast(
                rt: &'rt dyn ForeignRuntime,
                src: Source<'_, Self::Value>,
                policy: RvPolicy,
                parent: Handle,
            ) -> Handle {
                let items = match src.into_native() {
                    Native::Rvalue(value) => {
                        Self::build(rt, ($(Source::value(value.$idx),)+), policy, parent)
                    }
                    Native::Lvalue(value) => {
                        Self::build(rt, ($(Source::borrowed(&value.$idx),)+), policy, parent)
                    }
                    Native::Pointer(ptr) => match policy {
                        RvPolicy::Automatic | RvPolicy::TakeOwnership => {
                            // SAFETY: adopting policies require a `Box` allocation.
                            let value = *unsafe { Box::from_raw(ptr.as_ptr()) };
                            Self::build(rt, ($(Source::value(value.$idx),)+), policy, parent)
                        }
                        RvPolicy::AutomaticReference
                        | RvPolicy::Reference
                        | RvPolicy::ReferenceInternal => {
                            let ptr = ptr.as_ptr();
                            // SAFETY: components live exactly as long as the tuple.
                            let sources = unsafe {($(
                                Source::pointer(NonNull::new_unchecked(addr_of_mut!((*ptr).$idx))),
                            )+)};
                            Self::build(rt, sources, policy, parent)
                        }
                        RvPolicy::Copy | RvPolicy::Move => {
                            // SAFETY: the pointee is live for the duration of the cast.
                            let value = unsafe { ptr.as_ref() };
                            Self::build(rt, ($(Source::borrowed(&value.$idx),)+), policy, parent)
                        }
                    },
                };

                match items {
                    Some(items) => assemble(rt, items),
                    None => Handle::invalid(),
                }
            }

            fn into_value(self) -> Option<Self::Value> {
                self.value
            }
        }
    };
}

tuple_caster!(
    /// Caster for 1-tuples
    Tuple1Caster, 1, A: 0
);
tuple_caster!(
    /// Caster for pairs
    Tuple2Caster, 2, A: 0, B: 1
);
tuple_caster!(
    /// Caster for triples
    Tuple3Caster, 3, A: 0, B: 1, C: 2
);
tuple_caster!(
    /// Caster for 4-tuples
    Tuple4Caster, 4, A: 0, B: 1, C: 2, D: 3
);
