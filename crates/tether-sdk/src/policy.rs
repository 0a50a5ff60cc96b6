//! Return value policies and their resolution
//!
//! Every native→foreign conversion carries an [`RvPolicy`]. Before the
//! generic caster hands a value to the type registry, the policy is resolved
//! against the value category of the input ([`ValueCategory`]) so that the
//! registry only ever sees one of the five concrete policies.

use std::fmt;

/// How a previously unknown native instance is handed to the foreign runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RvPolicy {
    /// Pick by value category: `TakeOwnership` for pointers, `Copy` for
    /// lvalues and `Move` for rvalues.
    #[default]
    Automatic,

    /// Like `Automatic`, but `Reference` for pointers. Meant for values passed
    /// outbound into a call of the foreign runtime rather than returned.
    AutomaticReference,

    /// Adopt the existing instance. The foreign wrapper destroys it when its
    /// count reaches zero; the native side must not destroy it as well.
    TakeOwnership,

    /// Copy-construct a new instance owned by the foreign wrapper. The two
    /// lifetimes are fully decoupled.
    Copy,

    /// Move the value into a new instance owned by the foreign wrapper. The
    /// two lifetimes are fully decoupled.
    Move,

    /// Reference the existing instance without ownership. The native side
    /// stays responsible for destruction and must keep the instance alive
    /// while the wrapper is reachable; this is not checked.
    Reference,

    /// Like `Reference`, and additionally link the wrapper (the child) to the
    /// supplied parent so that the parent is not finalized while the child is
    /// reachable.
    ReferenceInternal,
}

impl RvPolicy {
    /// Whether the registry may receive this policy
    pub fn is_concrete(self) -> bool {
        !matches!(self, RvPolicy::Automatic | RvPolicy::AutomaticReference)
    }

    /// Whether the produced wrapper owns its native instance
    pub fn is_owning(self) -> bool {
        matches!(self, RvPolicy::TakeOwnership | RvPolicy::Copy | RvPolicy::Move)
    }

    /// Resolve against the value category of the input.
    ///
    /// Rust has no moved-from state, so `Move` out of anything but an owned
    /// value degrades to `Copy`, and policies that adopt or outlive the value
    /// are refused for shared borrows.
    pub fn resolve(self, category: ValueCategory, has_parent: bool) -> Result<RvPolicy, PolicyError> {
        let resolved = match category {
            ValueCategory::Rvalue => RvPolicy::Move,
            ValueCategory::Lvalue => match self {
                RvPolicy::Automatic
                | RvPolicy::AutomaticReference
                | RvPolicy::Copy
                | RvPolicy::Move => RvPolicy::Copy,
                RvPolicy::TakeOwnership | RvPolicy::Reference | RvPolicy::ReferenceInternal => {
                    return Err(PolicyError::RequiresPointer { policy: self })
                }
            },
            ValueCategory::Pointer => match self {
                RvPolicy::Automatic => RvPolicy::TakeOwnership,
                RvPolicy::AutomaticReference => RvPolicy::Reference,
                RvPolicy::Move => RvPolicy::Copy,
                concrete => concrete,
            },
        };

        if resolved == RvPolicy::ReferenceInternal && !has_parent {
            return Err(PolicyError::MissingParent);
        }

        Ok(resolved)
    }
}

impl fmt::Display for RvPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RvPolicy::Automatic => "automatic",
            RvPolicy::AutomaticReference => "automatic_reference",
            RvPolicy::TakeOwnership => "take_ownership",
            RvPolicy::Copy => "copy",
            RvPolicy::Move => "move",
            RvPolicy::Reference => "reference",
            RvPolicy::ReferenceInternal => "reference_internal",
        };
        f.write_str(name)
    }
}

/// Shape of a native value handed to a caster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueCategory {
    /// Pointer to an instance whose fate the policy decides
    Pointer,
    /// Shared borrow, valid only for the duration of the call
    Lvalue,
    /// Owned value, consumed by the call
    Rvalue,
}

/// Policy that cannot be honoured for the given input
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Adopting or referencing requires a pointer-shaped value
    #[error("return value policy '{policy}' requires a pointer-shaped value")]
    RequiresPointer {
        /// The refused policy
        policy: RvPolicy,
    },

    /// `ReferenceInternal` was requested without a parent
    #[error("return value policy 'reference_internal' requires a parent object")]
    MissingParent,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RvPolicy; 7] = [
        RvPolicy::Automatic,
        RvPolicy::AutomaticReference,
        RvPolicy::TakeOwnership,
        RvPolicy::Copy,
        RvPolicy::Move,
        RvPolicy::Reference,
        RvPolicy::ReferenceInternal,
    ];

    #[test]
    fn test_automatic_by_category() {
        let p = RvPolicy::Automatic;
        assert_eq!(p.resolve(ValueCategory::Pointer, false), Ok(RvPolicy::TakeOwnership));
        assert_eq!(p.resolve(ValueCategory::Lvalue, false), Ok(RvPolicy::Copy));
        assert_eq!(p.resolve(ValueCategory::Rvalue, false), Ok(RvPolicy::Move));
    }

    #[test]
    fn test_automatic_reference_by_category() {
        let p = RvPolicy::AutomaticReference;
        assert_eq!(p.resolve(ValueCategory::Pointer, false), Ok(RvPolicy::Reference));
        assert_eq!(p.resolve(ValueCategory::Lvalue, false), Ok(RvPolicy::Copy));
        assert_eq!(p.resolve(ValueCategory::Rvalue, false), Ok(RvPolicy::Move));
    }

    #[test]
    fn test_rvalue_always_moves() {
        for policy in ALL {
            assert_eq!(policy.resolve(ValueCategory::Rvalue, false), Ok(RvPolicy::Move));
        }
    }

    #[test]
    fn test_resolved_policies_are_concrete() {
        for category in [ValueCategory::Pointer, ValueCategory::Lvalue, ValueCategory::Rvalue] {
            for policy in ALL {
                if let Ok(resolved) = policy.resolve(category, true) {
                    assert!(resolved.is_concrete(), "{policy} -> {resolved}");
                }
            }
        }
    }

    #[test]
    fn test_pointer_passes_concrete_policies() {
        for policy in [RvPolicy::TakeOwnership, RvPolicy::Copy, RvPolicy::Reference] {
            assert_eq!(policy.resolve(ValueCategory::Pointer, false), Ok(policy));
        }
        assert_eq!(
            RvPolicy::Move.resolve(ValueCategory::Pointer, false),
            Ok(RvPolicy::Copy)
        );
    }

    #[test]
    fn test_lvalue_refuses_adoption_and_references() {
        for policy in [RvPolicy::TakeOwnership, RvPolicy::Reference, RvPolicy::ReferenceInternal] {
            assert_eq!(
                policy.resolve(ValueCategory::Lvalue, true),
                Err(PolicyError::RequiresPointer { policy })
            );
        }
    }

    #[test]
    fn test_reference_internal_needs_parent() {
        let p = RvPolicy::ReferenceInternal;
        assert_eq!(p.resolve(ValueCategory::Pointer, false), Err(PolicyError::MissingParent));
        assert_eq!(p.resolve(ValueCategory::Pointer, true), Ok(RvPolicy::ReferenceInternal));
    }

    #[test]
    fn test_error_messages() {
        let err = RvPolicy::Reference
            .resolve(ValueCategory::Lvalue, false)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "return value policy 'reference' requires a pointer-shaped value"
        );
    }
}
