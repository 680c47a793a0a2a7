//! Error types for the windowing layer.

use trellis_core::{BindingError, ObjectError, ObjectId};

/// Result type alias for windowing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by sessions, modality, and the runtime facade.
///
/// Every variant is local to the operation that raised it; nothing here ever
/// crosses or stops the dispatch loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A parented window was offered to a session. Owned windows belong to
    /// their parent, not to the session.
    #[error("window #{} has a parent and cannot be session-owned", window.as_raw())]
    ParentedWindow {
        /// The offending window.
        window: ObjectId,
    },

    /// A window-modal show was requested for a parentless window.
    #[error("window #{} cannot be window-modal without a parent", window.as_raw())]
    InvalidModality {
        /// The offending window.
        window: ObjectId,
    },

    /// A free root was never registered with a session and has been reaped.
    #[error("root object #{} was never registered with a session", object.as_raw())]
    UnregisteredRoot {
        /// The reaped object.
        object: ObjectId,
    },

    /// An object-tree operation failed.
    #[error(transparent)]
    Object(#[from] ObjectError),

    /// A binding-graph operation failed.
    #[error(transparent)]
    Binding(#[from] BindingError),
}

impl Error {
    /// Create a parented-window error.
    pub fn parented_window(window: ObjectId) -> Self {
        Self::ParentedWindow { window }
    }

    /// Create an invalid-modality error.
    pub fn invalid_modality(window: ObjectId) -> Self {
        Self::InvalidModality { window }
    }

    /// Create an unregistered-root error.
    pub fn unregistered_root(object: ObjectId) -> Self {
        Self::UnregisteredRoot { object }
    }
}
