//! Window show-cycle state.
//!
//! Windows are declarative objects whose kind declares the modality
//! capability; this module holds the per-window lifecycle data the runtime
//! tracks between `show` and `close`: visibility, the modality the window was
//! shown with, and the result recorded at close.
//!
//! Showing never blocks the caller. A window's result is delivered through
//! close handlers registered on the runtime, never through a return value.

use std::fmt;

/// How a visible window constrains input to the rest of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Modality {
    /// The window does not block any other window.
    #[default]
    NonModal,
    /// The window blocks its parent's subtree while visible.
    ///
    /// Other windows outside the parent's subtree still receive input.
    WindowModal,
    /// The window blocks every other window in the session while visible.
    ApplicationModal,
}

impl Modality {
    /// Check if the window is non-modal.
    pub fn is_non_modal(&self) -> bool {
        matches!(self, Modality::NonModal)
    }

    /// Check if the window blocks anything at all.
    pub fn is_modal(&self) -> bool {
        !self.is_non_modal()
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonModal => f.write_str("non-modal"),
            Self::WindowModal => f.write_str("window-modal"),
            Self::ApplicationModal => f.write_str("application-modal"),
        }
    }
}

/// The result a window was closed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CloseResult {
    /// The window was dismissed (Cancel, Escape, window closed).
    #[default]
    Rejected,
    /// The window was confirmed (OK, Accept).
    Accepted,
}

impl CloseResult {
    /// Check if the window was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, CloseResult::Accepted)
    }

    /// Check if the window was rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self, CloseResult::Rejected)
    }
}

impl From<bool> for CloseResult {
    fn from(accepted: bool) -> Self {
        if accepted {
            CloseResult::Accepted
        } else {
            CloseResult::Rejected
        }
    }
}

impl From<CloseResult> for bool {
    fn from(result: CloseResult) -> Self {
        result.is_accepted()
    }
}

/// Per-window show-cycle state tracked by the runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowState {
    /// Whether the window is currently shown.
    pub visible: bool,
    /// The modality the window is currently shown with.
    pub modality: Modality,
}
