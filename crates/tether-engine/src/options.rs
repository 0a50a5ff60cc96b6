//! Engine configuration

/// Resource limits for an [`Engine`](crate::Engine)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum number of live objects, singletons excluded (None = unlimited)
    pub max_objects: Option<usize>,
}

impl ResourceLimits {
    /// Create unlimited resource limits
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Create resource limits with an object count limit
    pub fn with_object_limit(max_objects: usize) -> Self {
        Self {
            max_objects: Some(max_objects),
        }
    }
}

/// Options for creating an [`Engine`](crate::Engine)
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Resource limits
    pub limits: ResourceLimits,
}

impl EngineOptions {
    /// Options with the given limits
    pub fn with_limits(limits: ResourceLimits) -> Self {
        Self { limits }
    }
}
