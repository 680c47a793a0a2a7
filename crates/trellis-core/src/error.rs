//! Error types for the Trellis core.

use std::fmt;

use crate::value::ValueType;

/// Errors that can occur during object-tree operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectError {
    /// The object ID is invalid or has been destroyed.
    InvalidObjectId,
    /// Attempted to set an object as its own parent/ancestor.
    CircularParentage,
    /// The operation targeted an object that is being or has been destroyed.
    Destroyed,
    /// The object's type tag lacks a capability the operation requires.
    MissingCapability {
        /// The component kind that was targeted.
        type_tag: String,
        /// The name of the missing capability flag.
        capability: &'static str,
    },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidObjectId => write!(f, "Invalid or destroyed object ID"),
            Self::CircularParentage => {
                write!(f, "Cannot set an object as its own parent or ancestor")
            }
            Self::Destroyed => write!(f, "Object is being or has been destroyed"),
            Self::MissingCapability { type_tag, capability } => {
                write!(f, "Component '{type_tag}' lacks the {capability} capability")
            }
        }
    }
}

impl std::error::Error for ObjectError {}

/// Result type for object-tree operations.
pub type ObjectResult<T> = std::result::Result<T, ObjectError>;

/// Errors that can occur while declaring or propagating bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// Declaring the binding would place a slot in a dependency cycle
    /// outside the bidirectional-pair exception.
    Cycle {
        /// The slot whose declaration was rejected.
        slot: String,
    },
    /// A propagation pass exceeded its re-queue bound and was aborted.
    Divergence {
        /// The slot that exhausted the bound.
        slot: String,
        /// How many times the slot was queued before the pass gave up.
        evaluations: usize,
    },
    /// A value did not conform to the slot's declared type.
    TypeMismatch {
        /// The slot that rejected the write.
        slot: String,
        /// The declared type.
        expected: ValueType,
        /// The type of the rejected value.
        got: ValueType,
    },
    /// The slot ID is invalid or its slot has been removed.
    UnknownSlot,
    /// A slot with this name already exists on the owning object.
    DuplicateSlot {
        /// The conflicting slot name.
        slot: String,
    },
    /// The expression shape does not fit the binding kind.
    InvalidExpression {
        /// The slot whose declaration was rejected.
        slot: String,
        /// Why the expression was rejected.
        reason: &'static str,
    },
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cycle { slot } => {
                write!(f, "Declaring '{slot}' would create a dependency cycle")
            }
            Self::Divergence { slot, evaluations } => write!(
                f,
                "Propagation diverged: '{slot}' was re-queued {evaluations} times"
            ),
            Self::TypeMismatch { slot, expected, got } => {
                write!(f, "Slot '{slot}' expects {expected}, got {got}")
            }
            Self::UnknownSlot => write!(f, "Invalid or removed slot ID"),
            Self::DuplicateSlot { slot } => {
                write!(f, "Slot '{slot}' is already declared on this object")
            }
            Self::InvalidExpression { slot, reason } => {
                write!(f, "Invalid expression for slot '{slot}': {reason}")
            }
        }
    }
}

impl std::error::Error for BindingError {}

/// Result type for binding-graph operations.
pub type BindingResult<T> = std::result::Result<T, BindingError>;
