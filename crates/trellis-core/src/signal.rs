//! Change-notification signals.
//!
//! Signals carry the callback side of the declarative model: attribute slots
//! expose a `changed` signal, windows expose close signals, and the session
//! announces root registration through one. Handlers are invoked directly and
//! synchronously on the dispatch thread — the core is single-threaded and
//! cooperative, so there is no queued or cross-thread invocation mode here.
//! Cross-thread traffic is marshaled onto the loop before any signal fires.
//!
//! # Example
//!
//! ```
//! use trellis_core::Signal;
//!
//! let clicked = Signal::<String>::new();
//! let id = clicked.connect(|name| {
//!     println!("clicked: {name}");
//! });
//! clicked.emit(&"ok_button".to_string());
//! clicked.disconnect(id);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

new_key_type! {
    /// A unique identifier for a connected handler.
    ///
    /// Returned by [`Signal::connect`]; pass it to [`Signal::disconnect`] to
    /// remove the handler. IDs are generational, so a stale ID never removes
    /// a handler it did not create.
    pub struct HandlerId;
}

/// A signal with zero or more connected handlers.
///
/// Emitting invokes every connected handler, in connection order, with a
/// reference to the argument. Handlers registered during an emit are not
/// invoked until the next emit.
///
/// # Type Parameter
///
/// - `Args`: the argument passed to handlers. Use `()` for plain
///   notifications.
pub struct Signal<Args> {
    /// All connected handlers.
    handlers: Mutex<SlotMap<HandlerId, Arc<dyn Fn(&Args) + Send + Sync>>>,
    /// Whether emission is temporarily suppressed.
    blocked: AtomicBool,
}

impl<Args> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args> Signal<Args> {
    /// Create a new signal with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Connect a handler to this signal.
    ///
    /// Returns a [`HandlerId`] that can be used to disconnect it later.
    pub fn connect<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.handlers.lock().insert(Arc::new(handler))
    }

    /// Disconnect a handler by ID.
    ///
    /// Returns `true` if the handler was found and removed.
    pub fn disconnect(&self, id: HandlerId) -> bool {
        self.handlers.lock().remove(id).is_some()
    }

    /// Remove all handlers.
    pub fn disconnect_all(&self) {
        self.handlers.lock().clear();
    }

    /// The number of connected handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Invoke every connected handler with `args`.
    ///
    /// Handlers run synchronously, in connection order. Emission is a no-op
    /// while the signal is [blocked](Self::set_blocked).
    pub fn emit(&self, args: &Args) {
        if self.blocked.load(Ordering::Acquire) {
            return;
        }
        // Snapshot the handlers so one may disconnect (or connect) another
        // without deadlocking on the table lock.
        let snapshot: Vec<Arc<dyn Fn(&Args) + Send + Sync>> = {
            let handlers = self.handlers.lock();
            handlers.values().cloned().collect()
        };
        for handler in snapshot {
            handler(args);
        }
    }

    /// Suppress or re-enable emission.
    ///
    /// Returns the previous blocked state. Emissions attempted while blocked
    /// are dropped, not deferred.
    pub fn set_blocked(&self, blocked: bool) -> bool {
        self.blocked.swap(blocked, Ordering::AcqRel)
    }

    /// Whether emission is currently suppressed.
    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }
}

impl<Args> std::fmt::Debug for Signal<Args> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.handler_count())
            .field("blocked", &self.is_blocked())
            .finish()
    }
}

/// RAII guard that disconnects a handler when dropped.
///
/// Useful for handlers whose lifetime should track a scope rather than the
/// signal itself.
pub struct HandlerGuard<'a, Args> {
    signal: &'a Signal<Args>,
    id: Option<HandlerId>,
}

impl<'a, Args> HandlerGuard<'a, Args> {
    /// Connect `handler` and return a guard that disconnects it on drop.
    pub fn new<F>(signal: &'a Signal<Args>, handler: F) -> Self
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let id = signal.connect(handler);
        Self {
            signal,
            id: Some(id),
        }
    }

    /// Release the guard without disconnecting, returning the handler ID.
    pub fn release(mut self) -> HandlerId {
        self.id.take().expect("guard already released")
    }
}

impl<Args> Drop for HandlerGuard<'_, Args> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.signal.disconnect(id);
        }
    }
}

static_assertions::assert_impl_all!(Signal<()>: Send, Sync);
