//! Engine error types
//!
//! Engine internals return [`EngineError`]; at the boundary every error is
//! stored as the pending [`ForeignException`] of the engine.

use tether_sdk::{ForeignErrorKind, ForeignException};

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of an engine operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// Operation not supported by the operand types
    #[error("{0}")]
    Type(String),

    /// Right type, unacceptable value
    #[error("{0}")]
    Value(String),

    /// Integer result out of range
    #[error("{0}")]
    Overflow(String),

    /// Missing attribute
    #[error("'{type_name}' object has no attribute '{name}'")]
    Attribute {
        /// Runtime type of the object
        type_name: String,
        /// Requested attribute
        name: String,
    },

    /// Missing mapping key, carrying the key's repr
    #[error("{0}")]
    Key(String),

    /// Sequence index out of range
    #[error("{0} index out of range")]
    Index(&'static str),

    /// Division or remainder by zero
    #[error("{0}")]
    ZeroDivision(&'static str),

    /// Invalid UTF-8
    #[error("'utf-8' codec can't decode bytes: {0}")]
    Unicode(String),

    /// Live object limit reached
    #[error("object limit of {0} reached")]
    ObjectLimit(usize),

    /// Containers nested too deeply, or containing themselves
    #[error("maximum recursion depth exceeded in {0}")]
    Recursion(&'static str),

    /// Type missing from the instance registry
    #[error("type '{0}' is not registered")]
    Unregistered(&'static str),
}

impl EngineError {
    /// Exception category for this error
    pub fn kind(&self) -> ForeignErrorKind {
        match self {
            EngineError::Type(_) | EngineError::Unregistered(_) => ForeignErrorKind::TypeError,
            EngineError::Value(_) => ForeignErrorKind::ValueError,
            EngineError::Overflow(_) => ForeignErrorKind::OverflowError,
            EngineError::Attribute { .. } => ForeignErrorKind::AttributeError,
            EngineError::Key(_) => ForeignErrorKind::KeyError,
            EngineError::Index(_) => ForeignErrorKind::IndexError,
            EngineError::ZeroDivision(_) => ForeignErrorKind::ZeroDivisionError,
            EngineError::Unicode(_) => ForeignErrorKind::UnicodeDecodeError,
            EngineError::ObjectLimit(_) => ForeignErrorKind::MemoryError,
            EngineError::Recursion(_) => ForeignErrorKind::RuntimeError,
        }
    }
}

impl From<EngineError> for ForeignException {
    fn from(err: EngineError) -> Self {
        ForeignException::new(err.kind(), err.to_string())
    }
}
