//! Modal window management.
//!
//! [`ModalityManager`] tracks the stack of currently-visible modal windows
//! and decides whether an input event aimed at a given object should be
//! delivered or discarded. Blocked events are dropped, never queued.
//!
//! Modal windows are ordered in a stack: the most recently shown modal is on
//! top and wins. A window-modal entry blocks its parent's subtree except the
//! modal's own subtree; an application-modal entry blocks everything in the
//! session except the modal's own subtree, including modals lower in the
//! stack. Window-modal entries targeting different parents can be active
//! concurrently.
//!
//! The manager owns no windows; entries are pushed on `show` and popped on
//! `close` (or when the window is destroyed), and blocking decisions are made
//! against the object tree so that a modal never blocks itself or its own
//! descendants.

use trellis_core::{ObjectId, ObjectTree};

/// The reach of one modal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalScope {
    /// Blocks the subtree of the designated parent window.
    WindowModal {
        /// The parent whose subtree is blocked.
        parent: ObjectId,
    },
    /// Blocks every window in the session.
    ApplicationModal,
}

/// One entry on the modal stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModalEntry {
    /// The modal window.
    window: ObjectId,
    /// What the entry blocks.
    scope: ModalScope,
}

/// Tracks active modal windows and decides input blocking.
#[derive(Debug, Default)]
pub struct ModalityManager {
    /// Active modal entries, bottom to top.
    stack: Vec<ModalEntry>,
}

impl ModalityManager {
    /// Create a manager with no active modals.
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    /// Push a modal entry for a window being shown.
    ///
    /// Pushing a window that is already on the stack is a no-op; one show
    /// cycle owns one entry.
    pub fn push(&mut self, window: ObjectId, scope: ModalScope) {
        if self.stack.iter().any(|e| e.window == window) {
            return;
        }
        tracing::debug!(
            target: "trellis::modality",
            ?window,
            ?scope,
            depth = self.stack.len() + 1,
            "modal entry pushed"
        );
        self.stack.push(ModalEntry { window, scope });
    }

    /// Remove the entry for a window being closed or destroyed.
    ///
    /// Returns `true` if the window had an entry.
    pub fn pop(&mut self, window: ObjectId) -> bool {
        let Some(position) = self.stack.iter().position(|e| e.window == window) else {
            return false;
        };
        self.stack.remove(position);
        tracing::debug!(
            target: "trellis::modality",
            ?window,
            depth = self.stack.len(),
            "modal entry popped"
        );
        true
    }

    /// Whether any modal is active.
    pub fn has_modal(&self) -> bool {
        !self.stack.is_empty()
    }

    /// The topmost modal window, if any.
    pub fn active_modal(&self) -> Option<ObjectId> {
        self.stack.last().map(|e| e.window)
    }

    /// The number of active modal entries.
    pub fn modal_count(&self) -> usize {
        self.stack.len()
    }

    /// Drop every entry. Used by session shutdown and tests.
    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// Decide whether input aimed at `target` must be discarded.
    ///
    /// The stack is scanned top-down. The first entry whose modal subtree
    /// contains the target grants delivery: everything above it has already
    /// been scanned, and a modal never blocks itself or its own descendants.
    /// Otherwise an application-modal entry blocks everything, and a
    /// window-modal entry blocks its parent's subtree.
    pub fn is_blocked(&self, target: ObjectId, tree: &ObjectTree) -> bool {
        for entry in self.stack.iter().rev() {
            if tree.is_in_subtree(entry.window, target) {
                return false;
            }
            match entry.scope {
                ModalScope::ApplicationModal => return true,
                ModalScope::WindowModal { parent } => {
                    if tree.is_in_subtree(parent, target) {
                        return true;
                    }
                }
            }
        }
        false
    }
}
