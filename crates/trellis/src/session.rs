//! The session registry of top-level windows.
//!
//! A [`Session`] owns the parentless roots of the object forest. Roots live
//! exactly as long as their session membership: removing a root (which close
//! does implicitly) destroys it, and shutting the session down destroys every
//! remaining root in registration order.
//!
//! Sessions are explicit state: the host constructs one at process start (or
//! per test) and shuts it down deliberately. There is no implicit singleton.
//!
//! The session itself only tracks membership; the runtime facade performs the
//! actual destruction so that teardown also covers the binding graph and the
//! modality stack.

use trellis_core::{ObjectId, ObjectTree, Signal};

use crate::error::{Error, Result};

/// A registry of session-owned root windows.
pub struct Session {
    /// Tracked roots, in registration order.
    roots: Vec<ObjectId>,
    /// Emitted when a root is registered.
    pub window_added: Signal<ObjectId>,
    /// Emitted when a root is deregistered (close or shutdown).
    pub window_removed: Signal<ObjectId>,
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self {
            roots: Vec::new(),
            window_added: Signal::new(),
            window_removed: Signal::new(),
        }
    }

    /// Register a parentless window as a session-owned root.
    ///
    /// Fails with [`Error::ParentedWindow`] if the window is owned by a
    /// parent — owned windows live and die with their owner, not with the
    /// session. Registering a window twice is a no-op.
    pub fn add_window(&mut self, window: ObjectId, tree: &ObjectTree) -> Result<()> {
        if tree.parent(window).map_err(Error::from)?.is_some() {
            return Err(Error::parented_window(window));
        }
        if self.roots.contains(&window) {
            return Ok(());
        }
        tracing::debug!(target: "trellis::session", ?window, "root registered");
        self.roots.push(window);
        self.window_added.emit(&window);
        Ok(())
    }

    /// Deregister a root.
    ///
    /// Returns `true` if the window was tracked. The caller is responsible
    /// for destroying the object; session removal is what makes it eligible.
    pub fn remove_window(&mut self, window: ObjectId) -> bool {
        let Some(position) = self.roots.iter().position(|&w| w == window) else {
            return false;
        };
        self.roots.remove(position);
        tracing::debug!(target: "trellis::session", ?window, "root deregistered");
        self.window_removed.emit(&window);
        true
    }

    /// Whether the session tracks this window.
    pub fn contains(&self, window: ObjectId) -> bool {
        self.roots.contains(&window)
    }

    /// The tracked roots, in registration order.
    pub fn windows(&self) -> &[ObjectId] {
        &self.roots
    }

    /// The number of tracked roots.
    pub fn window_count(&self) -> usize {
        self.roots.len()
    }

    /// Drain every root in registration order, for shutdown.
    ///
    /// Each drained root is announced through
    /// [`window_removed`](Self::window_removed).
    pub fn drain_for_shutdown(&mut self) -> Vec<ObjectId> {
        let roots = std::mem::take(&mut self.roots);
        for &window in &roots {
            self.window_removed.emit(&window);
        }
        roots
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
