//! RawObject - identity of one foreign runtime object
//!
//! A `RawObject` is a plain, non-null object identity. It carries no
//! ownership: whether a given `RawObject` stands for a new reference or a
//! borrowed one is decided by the API that produced it, and spelled out by the
//! handle type that wraps it (see [`crate::handle`]).

use std::fmt;
use std::num::NonZeroU64;

/// Non-null identity of a foreign runtime object.
///
/// The runtime decides what the bits mean (a slot index, an address, ...).
/// The core only compares and forwards them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RawObject(NonZeroU64);

impl RawObject {
    /// Create from raw bits. Returns `None` for zero, which is never a valid
    /// object identity.
    #[inline]
    pub const fn from_bits(bits: u64) -> Option<Self> {
        match NonZeroU64::new(bits) {
            Some(bits) => Some(Self(bits)),
            None => None,
        }
    }

    /// Get raw bits
    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawObject({:#x})", self.0.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_not_an_object() {
        assert!(RawObject::from_bits(0).is_none());
    }

    #[test]
    fn test_bits_are_preserved() {
        let raw = RawObject::from_bits(0x2a).unwrap();
        assert_eq!(raw.to_bits(), 0x2a);
        assert_eq!(format!("{:?}", raw), "RawObject(0x2a)");
        assert_eq!(std::mem::size_of::<Option<RawObject>>(), 8);
    }
}
