//! Capability interface onto a simulator's live object graph.
//!
//! The walker depends only on [`SimHandle`]; every simulator binding (an
//! in-memory snapshot, a dumper process, a live VPI/VHPI bridge) adapts its
//! own vocabulary to this trait.
//!
//! # Lazy children
//!
//! Some runtimes populate children on demand. Callers must invoke
//! [`SimHandle::materialize_children`] at least once before
//! [`SimHandle::enumerate_children`]; implementations must make
//! materialization idempotent.
//!
//! # Optional introspection
//!
//! `introspect_*` methods default to [`HandleError::Unsupported`]. Any error
//! from them means "unavailable" and is never fatal to discovery.

use thiserror::Error;

use crate::types::Direction;

/// Errors raised by simulator handles.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandleError {
    /// The backend does not expose this introspection.
    #[error("introspection not supported")]
    Unsupported,

    /// Children could not be materialized.
    #[error("failed to materialize children of '{name}': {reason}")]
    Materialize { name: String, reason: String },

    /// Children could not be enumerated.
    #[error("failed to enumerate children of '{name}': {reason}")]
    Enumerate { name: String, reason: String },

    /// A hierarchy snapshot could not be decoded.
    #[error("invalid hierarchy snapshot: {0}")]
    Snapshot(String),
}

/// One named node of the simulator's object graph.
pub trait SimHandle {
    /// Name of this object as reported by the runtime.
    fn name(&self) -> &str;

    /// Runtime class name (an open-ended tag, e.g. `LogicObject`).
    fn type_name(&self) -> &str;

    /// True if this object can contain named children.
    fn has_nested_children(&self) -> bool;

    /// Populate children. Idempotent; may be a no-op.
    fn materialize_children(&mut self) -> Result<(), HandleError>;

    /// Named children in runtime construction order.
    fn enumerate_children(&self) -> Result<Vec<(String, Box<dyn SimHandle + '_>)>, HandleError>;

    fn introspect_width(&self) -> Result<u32, HandleError> {
        Err(HandleError::Unsupported)
    }

    fn introspect_direction(&self) -> Result<Direction, HandleError> {
        Err(HandleError::Unsupported)
    }

    fn introspect_signedness(&self) -> Result<bool, HandleError> {
        Err(HandleError::Unsupported)
    }

    /// True if the runtime marks this object as a compile-time constant.
    fn introspect_constant(&self) -> Result<bool, HandleError> {
        Err(HandleError::Unsupported)
    }
}
