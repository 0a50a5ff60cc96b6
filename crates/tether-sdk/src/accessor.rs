//! Attribute and item accessors
//!
//! An [`Accessor`] names `base.key` or `base[key]` without fetching it. The
//! first read fetches through the caching shims and keeps the result, so a
//! lookup that is used several times is performed once.

use crate::caster::Castable;
use crate::convert;
use crate::error::BridgeResult;
use crate::handle::Object;
use crate::policy::RvPolicy;
use crate::protocol::{self, AttrKey, ItemKey};

#[derive(Debug, Clone, Copy)]
enum AccessKey<'k> {
    Attr(AttrKey<'k>),
    Item(ItemKey<'k>),
}

/// Lazily resolved `base.key` or `base[key]`
#[derive(Debug)]
pub struct Accessor<'rt, 'k> {
    base: Object<'rt>,
    key: AccessKey<'k>,
    cache: Option<Object<'rt>>,
}

impl<'rt, 'k> Accessor<'rt, 'k> {
    /// Accessor for `base.key`
    pub fn attr(base: Object<'rt>, key: AttrKey<'k>) -> Self {
        Self {
            base,
            key: AccessKey::Attr(key),
            cache: None,
        }
    }

    /// Accessor for `base[key]`
    pub fn item(base: Object<'rt>, key: ItemKey<'k>) -> Self {
        Self {
            base,
            key: AccessKey::Item(key),
            cache: None,
        }
    }

    /// Whether the value has been fetched already
    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    fn fetch(&mut self) -> BridgeResult<&Object<'rt>> {
        let rt = self.base.runtime();
        let base = self.base.ptr();
        match self.key {
            AccessKey::Attr(key) => protocol::getattr_maybe(rt, base, key, &mut self.cache)?,
            AccessKey::Item(key) => protocol::getitem_maybe(rt, base, key, &mut self.cache)?,
        }
        match &self.cache {
            Some(value) => Ok(value),
            None => unreachable!("caching fetch leaves the slot filled"),
        }
    }

    /// The value, fetched on first use
    pub fn get(&mut self) -> BridgeResult<Object<'rt>> {
        self.fetch().map(Object::clone)
    }

    /// The value, loaded into a native type
    pub fn extract<T: Castable<'rt>>(&mut self) -> BridgeResult<T> {
        let value = self.fetch()?.handle();
        convert::load::<T>(self.base.runtime(), value, true)
    }

    /// Assign a native value, cast with [`RvPolicy::Move`]
    pub fn set<T: Castable<'rt>>(&mut self, value: T) -> BridgeResult<()> {
        let rt = self.base.runtime();
        let value = convert::cast(rt, value, RvPolicy::Move)?;
        self.set_object(&value)
    }

    /// Assign a foreign object
    pub fn set_object(&mut self, value: &Object<'_>) -> BridgeResult<()> {
        let rt = self.base.runtime();
        let base = self.base.ptr();
        match self.key {
            AccessKey::Attr(key) => protocol::setattr(rt, base, key, value.ptr())?,
            AccessKey::Item(key) => protocol::setitem(rt, base, key, value.ptr())?,
        }
        self.cache = None;
        Ok(())
    }
}
