//! Error bridge between the foreign runtime and native code
//!
//! There are three failure classes:
//! - conversion mismatch: a caster's `load` returns `false`, nothing is raised;
//! - bridge failure: a [`BridgeError`], propagated with `?`;
//! - invariant violation: [`fail`], which aborts the process.

use std::fmt::{self, Write as _};
use std::io::Write as _;

use crate::runtime::ForeignRuntime;

/// Result type for bridge calls
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Capacity of the stack buffer used to format diagnostics. Longer messages
/// are formatted again on the heap.
pub const RAISE_BUFFER_LEN: usize = 512;

// ============================================================================
// Foreign Exceptions
// ============================================================================

/// Category of a foreign runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForeignErrorKind {
    /// Operation applied to an object of the wrong type
    TypeError,
    /// Right type, unacceptable value
    ValueError,
    /// Number out of the representable range
    OverflowError,
    /// Missing attribute
    AttributeError,
    /// Missing mapping key
    KeyError,
    /// Sequence index out of range
    IndexError,
    /// Division or remainder by zero
    ZeroDivisionError,
    /// Bytes that are not valid UTF-8
    UnicodeDecodeError,
    /// Allocation failure
    MemoryError,
    /// Anything else
    RuntimeError,
}

impl fmt::Display for ForeignErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ForeignErrorKind::TypeError => "TypeError",
            ForeignErrorKind::ValueError => "ValueError",
            ForeignErrorKind::OverflowError => "OverflowError",
            ForeignErrorKind::AttributeError => "AttributeError",
            ForeignErrorKind::KeyError => "KeyError",
            ForeignErrorKind::IndexError => "IndexError",
            ForeignErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ForeignErrorKind::UnicodeDecodeError => "UnicodeDecodeError",
            ForeignErrorKind::MemoryError => "MemoryError",
            ForeignErrorKind::RuntimeError => "RuntimeError",
        };
        f.write_str(name)
    }
}

/// A foreign runtime error, as held in the runtime's pending-error slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignException {
    /// Error category
    pub kind: ForeignErrorKind,
    /// Human-readable message
    pub message: String,
}

impl ForeignException {
    /// Create a new exception
    pub fn new(kind: ForeignErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ForeignException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Native failure wrapping an error fetched from the foreign runtime.
///
/// Keeps the foreign exception so it can be inspected or handed back to the
/// runtime with [`ForeignError::restore`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{exception}")]
pub struct ForeignError {
    exception: ForeignException,
}

impl ForeignError {
    /// Wrap a fetched exception
    pub fn new(exception: ForeignException) -> Self {
        Self { exception }
    }

    /// Error category
    pub fn kind(&self) -> ForeignErrorKind {
        self.exception.kind
    }

    /// Error message
    pub fn message(&self) -> &str {
        &self.exception.message
    }

    /// The carried exception
    pub fn exception(&self) -> &ForeignException {
        &self.exception
    }

    /// Whether the carried exception is of `kind`
    pub fn matches(&self, kind: ForeignErrorKind) -> bool {
        self.exception.kind == kind
    }

    /// Make the carried exception pending again in `rt`
    pub fn restore(self, rt: &dyn ForeignRuntime) {
        rt.err_restore(self.exception);
    }

    /// Unwrap the carried exception
    pub fn into_exception(self) -> ForeignException {
        self.exception
    }
}

// ============================================================================
// Bridge Error
// ============================================================================

/// Recoverable failure of a bridge operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Failure raised by the bridge itself with a formatted message
    #[error("{0}")]
    Raised(String),

    /// Error that was pending in the foreign runtime
    #[error(transparent)]
    Foreign(#[from] ForeignError),
}

impl BridgeError {
    /// The carried foreign error, if this failure came from the runtime
    pub fn as_foreign(&self) -> Option<&ForeignError> {
        match self {
            BridgeError::Foreign(err) => Some(err),
            BridgeError::Raised(_) => None,
        }
    }

    /// Hand this failure to the foreign runtime as its pending error.
    ///
    /// A foreign error is restored unchanged; a raised message becomes a
    /// `RuntimeError`.
    pub fn restore(self, rt: &dyn ForeignRuntime) {
        match self {
            BridgeError::Foreign(err) => err.restore(rt),
            BridgeError::Raised(message) => {
                rt.err_restore(ForeignException::new(ForeignErrorKind::RuntimeError, message))
            }
        }
    }
}

// ============================================================================
// Diagnostic Formatting
// ============================================================================

/// Fixed-capacity formatting target. Stops accepting text once the content
/// would not fit, leaving room for a terminator.
struct StackBuffer {
    data: [u8; RAISE_BUFFER_LEN],
    len: usize,
    overflowed: bool,
}

impl StackBuffer {
    fn new() -> Self {
        Self {
            data: [0; RAISE_BUFFER_LEN],
            len: 0,
            overflowed: false,
        }
    }

    fn as_str(&self) -> &str {
        // Only whole `&str` chunks are ever copied in.
        std::str::from_utf8(&self.data[..self.len]).unwrap_or_default()
    }
}

impl fmt::Write for StackBuffer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.overflowed {
            return Ok(());
        }
        if self.len + s.len() >= RAISE_BUFFER_LEN {
            self.overflowed = true;
            return Ok(());
        }
        self.data[self.len..self.len + s.len()].copy_from_slice(s.as_bytes());
        self.len += s.len();
        Ok(())
    }
}

/// Format a diagnostic message, first into a stack buffer of
/// [`RAISE_BUFFER_LEN`] bytes and, when that is too small, on the heap.
pub fn format_diagnostic(args: fmt::Arguments<'_>) -> String {
    let mut buffer = StackBuffer::new();
    let _ = buffer.write_fmt(args);

    if !buffer.overflowed {
        return buffer.as_str().to_owned();
    }

    log::trace!("diagnostic exceeds {} bytes, formatting on the heap", RAISE_BUFFER_LEN);
    fmt::format(args)
}

/// Build a bridge failure carrying a formatted message.
///
/// Usually reached through the [`raise!`](crate::raise) macro.
pub fn raise(args: fmt::Arguments<'_>) -> BridgeError {
    BridgeError::Raised(format_diagnostic(args))
}

/// Report an internal invariant violation and abort the process.
///
/// Only for bugs in the bridging layer itself, never for conditions a caller
/// can trigger with bad input. Usually reached through the
/// [`fail!`](crate::fail) macro.
#[cold]
pub fn fail(args: fmt::Arguments<'_>) -> ! {
    let message = format_diagnostic(args);
    log::error!("critical bridge error: {}", message);

    let stderr = std::io::stderr();
    let mut stderr = stderr.lock();
    let _ = write!(stderr, "Critical tether error: {}", message);
    let _ = stderr.flush();

    std::process::abort()
}

/// Convert the runtime's pending error into a native failure.
///
/// Must only be called when the runtime reports a pending error; calling it
/// without one is an invariant violation and aborts.
pub fn error_raise(rt: &dyn ForeignRuntime) -> BridgeError {
    match rt.err_fetch() {
        Some(exception) => BridgeError::Foreign(ForeignError::new(exception)),
        None => fail(format_args!(
            "tether::error_raise() called without an error condition!"
        )),
    }
}

/// Return early with a formatted [`BridgeError::Raised`].
#[macro_export]
macro_rules! raise {
    ($($arg:tt)*) => {
        return ::core::result::Result::Err($crate::error::raise(::core::format_args!($($arg)*)).into())
    };
}

/// Abort the process with a formatted invariant violation.
#[macro_export]
macro_rules! fail {
    ($($arg:tt)*) => {
        $crate::error::fail(::core::format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raised(result: BridgeResult<()>) -> String {
        match result {
            Err(BridgeError::Raised(message)) => message,
            other => panic!("expected a raised error, got {:?}", other),
        }
    }

    #[test]
    fn test_short_message_uses_stack_buffer() {
        let message = format_diagnostic(format_args!("value {} out of range [{}, {}]", 300, 0, 255));
        assert_eq!(message, "value 300 out of range [0, 255]");
    }

    #[test]
    fn test_long_message_is_reproduced_verbatim() {
        let long = "x".repeat(RAISE_BUFFER_LEN * 3 + 7);
        let message = format_diagnostic(format_args!("prefix:{}:suffix", long));
        assert_eq!(message.len(), long.len() + "prefix::suffix".len());
        assert_eq!(message, format!("prefix:{}:suffix", long));
    }

    #[test]
    fn test_buffer_boundary() {
        // One byte is always kept free, like a C terminator.
        let fits = "a".repeat(RAISE_BUFFER_LEN - 1);
        let spills = "b".repeat(RAISE_BUFFER_LEN);
        assert_eq!(format_diagnostic(format_args!("{}", fits)), fits);
        assert_eq!(format_diagnostic(format_args!("{}", spills)), spills);
    }

    #[test]
    fn test_multibyte_message_past_buffer() {
        let text = "ü".repeat(RAISE_BUFFER_LEN);
        let message = format_diagnostic(format_args!("{}", text));
        assert_eq!(message.as_bytes(), text.as_bytes());
    }

    #[test]
    fn test_raise_macro_returns_early() {
        fn check(value: i32) -> BridgeResult<()> {
            if value < 0 {
                raise!("negative value: {}", value);
            }
            Ok(())
        }

        assert!(check(1).is_ok());
        assert_eq!(raised(check(-4)), "negative value: -4");
    }

    #[test]
    fn test_foreign_error_display() {
        let err = BridgeError::from(ForeignError::new(ForeignException::new(
            ForeignErrorKind::KeyError,
            "'missing'",
        )));
        assert_eq!(err.to_string(), "KeyError: 'missing'");
        assert!(err.as_foreign().unwrap().matches(ForeignErrorKind::KeyError));
    }
}
