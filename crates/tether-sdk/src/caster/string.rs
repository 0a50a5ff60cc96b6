//! `String` ↔ foreign `str`

use super::{Caster, Castable, Source};
use crate::handle::Handle;
use crate::policy::RvPolicy;
use crate::runtime::{ForeignRuntime, ObjectKind};

/// Caster for owned native text. Loading accepts only string objects.
#[derive(Debug, Default)]
pub struct StringCaster {
    value: Option<String>,
}

impl<'rt> Castable<'rt> for String {
    type Caster = StringCaster;
}

impl<'rt> Caster<'rt> for StringCaster {
    type Value = String;

    fn type_name() -> String {
        "str".to_string()
    }

    fn load(&mut self, rt: &'rt dyn ForeignRuntime, src: Handle, _convert: bool) -> bool {
        let Some(raw) = src.ptr() else {
            return false;
        };

        if rt.kind(raw) != ObjectKind::Str {
            log::trace!("load String: '{}' is not a str", rt.type_name(raw));
            return false;
        }

        match rt.str_as_utf8(raw) {
            Some(text) => {
                self.value = Some(text);
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
        src: Source<'_, String>,
        policy: RvPolicy,
        _parent: Handle,
    ) -> Handle {
        src.with_value(policy, |text| rt.str_from_utf8(text.as_bytes()))
            .into()
    }

    fn into_value(self) -> Option<String> {
        self.value
    }
}
