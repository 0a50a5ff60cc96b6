//! Tether Engine - reference foreign object runtime
//!
//! An in-process, reference-counted object runtime implementing the
//! [`ForeignRuntime`](tether_sdk::ForeignRuntime) and
//! [`TypeRegistry`](tether_sdk::TypeRegistry) contracts of `tether-sdk`:
//! - **Heap**: slot table with identities that are never reused (`heap` module)
//! - **Objects**: None, bool, int, float, str, tuple, list, dict, namespace,
//!   capsule and native instances (`object` module)
//! - **Registry**: native type shims, implicit conversions and parent/child
//!   links (`registry` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_engine::Engine;
//! use tether_sdk::{cast, load, RvPolicy};
//!
//! let engine = Engine::new();
//! let obj = cast(&engine, (3i32, 4.5f64), RvPolicy::Move)?;
//! assert_eq!(obj.repr(), "(3, 4.5)");
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

/// Engine and its runtime trait implementations
pub mod engine;

/// Error types
pub mod error;

/// Object heap
pub mod heap;

/// Integer model
pub mod number;

/// Object representation
pub mod object;

/// Engine options
pub mod options;

/// Instance type registry and link table
pub mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use heap::HeapStats;
pub use number::IntValue;
pub use options::{EngineOptions, ResourceLimits};
