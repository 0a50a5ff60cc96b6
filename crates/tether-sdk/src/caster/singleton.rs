//! Casters for the runtime singletons: `None`, `True` and `False`
//!
//! Loading is strict. Only the singletons themselves are accepted; there is
//! no truthiness coercion, whatever `convert` says.

use super::{Caster, Castable, Source};
use crate::handle::Handle;
use crate::policy::RvPolicy;
use crate::runtime::ForeignRuntime;

/// `()` ↔ `None`
#[derive(Debug, Default)]
pub struct UnitCaster {
    value: Option<()>,
}

impl<'rt> Castable<'rt> for () {
    type Caster = UnitCaster;
}

impl<'rt> Caster<'rt> for UnitCaster {
    type Value = ();

    fn type_name() -> String {
        "None".to_string()
    }

    fn load(&mut self, rt: &'rt dyn ForeignRuntime, src: Handle, _convert: bool) -> bool {
        if src.is_none(rt) {
            self.value = Some(());
            true
        } else {
            false
        }
    }

    fn cast(rt: &'rt dyn ForeignRuntime, src: Source<'_, ()>, policy: RvPolicy, _parent: Handle) -> Handle {
        src.with_value(policy, |_| ());
        Handle::new(rt.none()).inc_ref(rt)
    }

    fn into_value(self) -> Option<()> {
        self.value
    }
}

/// `bool` ↔ `True`/`False`
#[derive(Debug, Default)]
pub struct BoolCaster {
    value: Option<bool>,
}

impl<'rt> Castable<'rt> for bool {
    type Caster = BoolCaster;
}

impl<'rt> Caster<'rt> for BoolCaster {
    type Value = bool;

    fn type_name() -> String {
        "bool".to_string()
    }

    fn load(&mut self, rt: &'rt dyn ForeignRuntime, src: Handle, _convert: bool) -> bool {
        let Some(raw) = src.ptr() else {
            return false;
        };

        if raw == rt.boolean(true) {
            self.value = Some(true);
        } else if raw == rt.boolean(false) {
            self.value = Some(false);
        } else {
            log::trace!("load bool: '{}' is not a bool singleton", rt.type_name(raw));
            return false;
        }
        true
    }

    fn cast(rt: &'rt dyn ForeignRuntime, src: Source<'_, bool>, policy: RvPolicy, _parent: Handle) -> Handle {
        let value = src.with_value(policy, |value| *value);
        Handle::new(rt.boolean(value)).inc_ref(rt)
    }

    fn into_value(self) -> Option<bool> {
        self.value
    }
}
