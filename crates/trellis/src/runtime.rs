//! The runtime facade over the declarative object model.
//!
//! [`Runtime`] is what the markup-compiled layer talks to: it owns the object
//! tree, the binding graph, the session, and the modality manager, and keeps
//! them consistent across construction, mutation, and teardown. All of it is
//! single-threaded and cooperative — every operation runs to completion on
//! the loop thread, and nothing here ever blocks the caller.
//!
//! # Handlers
//!
//! User callbacks (change handlers, close handlers, input handlers) receive
//! `&mut Runtime` so they can construct, mutate, and destroy objects
//! directly. Writes made by a handler extend the propagation pass that
//! invoked it, under the same divergence counters, so runaway feedback
//! through handlers is caught the same way as runaway feedback through
//! bindings.
//!
//! # Cross-thread marshaling
//!
//! Other threads never touch the model. They clone a [`RuntimeHandle`] and
//! post [`RuntimeEvent`]s — input, deferred tasks, quit — which the loop
//! thread drains with [`Runtime::run_until_idle`], highest priority first.
//!
//! # Example
//!
//! ```
//! use trellis::{AttrSpec, Modality, Runtime};
//! use trellis_core::{Capabilities, TypeTag, Value, ValueType};
//!
//! let mut rt = Runtime::new();
//! let window = rt
//!     .construct(
//!         TypeTag::new("Window")
//!             .with_capabilities(Capabilities::HAS_MODALITY | Capabilities::IS_CONTAINER),
//!         None,
//!         vec![AttrSpec::new("title", ValueType::Str).with_initial(Value::from("Main"))],
//!     )
//!     .unwrap();
//! rt.add_window(window).unwrap();
//! rt.show(window, Modality::NonModal).unwrap();
//! assert_eq!(rt.get(window, "title").unwrap(), Value::from("Main"));
//! rt.shutdown();
//! ```

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use slotmap::SlotMap;

use trellis_core::{
    BindingGraph, BindingKind, Capabilities, Expression, HandlerId, LifecycleState, ObjectError,
    ObjectId, ObjectTree, SlotId, TypeTag, Value, ValueType, WriteOrigin,
    logging::{TreeFormatOptions, format_tree},
};

use crate::error::{Error, Result};
use crate::event::{InputEvent, InputPayload, PrioritizedEvent, RuntimeEvent, TaskEnvelope};
use crate::modality::{ModalScope, ModalityManager};
use crate::session::Session;
use crate::window::{CloseResult, Modality, WindowState};

type ChangeHandler = Arc<dyn Fn(&mut Runtime, &Value) + Send + Sync>;
type CloseHandler = Arc<dyn Fn(&mut Runtime, CloseResult) + Send + Sync>;
type InputHandler = Arc<dyn Fn(&mut Runtime, &InputPayload) + Send + Sync>;
type LayoutHandler = Arc<dyn Fn(&mut Runtime, f64, f64) + Send + Sync>;

/// One attribute to declare at construction time.
#[derive(Debug, Clone)]
pub struct AttrSpec {
    name: String,
    declared: ValueType,
    initial: Value,
}

impl AttrSpec {
    /// An attribute with the given name and declared type, initially unset.
    pub fn new(name: impl Into<String>, declared: ValueType) -> Self {
        Self {
            name: name.into(),
            declared,
            initial: Value::Empty,
        }
    }

    /// Provide an initial value, type-checked at construction.
    pub fn with_initial(mut self, value: Value) -> Self {
        self.initial = value;
        self
    }
}

/// A cloneable, thread-safe handle for posting work to the loop.
///
/// Handles never touch the model directly; they enqueue events that the loop
/// thread processes. Posting fails (returns `false`) only after the runtime
/// has been dropped.
#[derive(Clone)]
pub struct RuntimeHandle {
    sender: Sender<RuntimeEvent>,
}

impl RuntimeHandle {
    /// Post an input event for modality-gated delivery.
    pub fn post_input(&self, event: InputEvent) -> bool {
        self.sender.send(RuntimeEvent::Input(event)).is_ok()
    }

    /// Post a geometry result from the layout solver.
    pub fn post_layout_resolved(&self, target: ObjectId, width: f64, height: f64) -> bool {
        self.sender
            .send(RuntimeEvent::LayoutResolved {
                target,
                width,
                height,
            })
            .is_ok()
    }

    /// Marshal a task onto the loop thread.
    pub fn post_task<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut Runtime) + Send + 'static,
    {
        self.sender
            .send(RuntimeEvent::Task(TaskEnvelope::new(task)))
            .is_ok()
    }

    /// Ask the loop to stop.
    pub fn quit(&self) -> bool {
        self.sender.send(RuntimeEvent::Quit).is_ok()
    }

    /// Wake the loop without carrying work.
    pub fn wake(&self) -> bool {
        self.sender.send(RuntimeEvent::WakeUp).is_ok()
    }
}

static_assertions::assert_impl_all!(RuntimeHandle: Send, Sync, Clone);

/// The declarative runtime: object tree, bindings, session, and modality.
pub struct Runtime {
    tree: ObjectTree,
    graph: BindingGraph,
    session: Session,
    modality: ModalityManager,
    /// Show-cycle state for every object with the modality capability.
    windows: HashMap<ObjectId, WindowState>,
    /// Results recorded at close, inspectable after teardown.
    closed_results: HashMap<ObjectId, CloseResult>,
    /// Arena for handler identities across all handler tables.
    handler_ids: SlotMap<HandlerId, ()>,
    change_handlers: HashMap<SlotId, Vec<(HandlerId, ChangeHandler)>>,
    close_handlers: HashMap<ObjectId, Vec<(HandlerId, CloseHandler)>>,
    input_handlers: HashMap<ObjectId, Vec<(HandlerId, InputHandler)>>,
    layout_handlers: HashMap<ObjectId, Vec<(HandlerId, LayoutHandler)>>,
    /// Windows mid-close, to make re-entrant close requests no-ops.
    closing: Vec<ObjectId>,
    /// Free roots constructed this turn, awaiting session registration.
    pending_roots: Vec<ObjectId>,
    /// Errors surfaced outside a `Result` path (reaping, teardown).
    reported: Vec<Error>,
    /// Guard against re-entrant propagation from handlers.
    pumping: bool,
    sender: Sender<RuntimeEvent>,
    receiver: Receiver<RuntimeEvent>,
    /// Sequence numbers for stable event ordering.
    sequence: u64,
}

static_assertions::assert_impl_all!(Runtime: Send);

impl Runtime {
    /// Create a runtime with an empty tree and session.
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self {
            tree: ObjectTree::new(),
            graph: BindingGraph::new(),
            session: Session::new(),
            modality: ModalityManager::new(),
            windows: HashMap::new(),
            closed_results: HashMap::new(),
            handler_ids: SlotMap::with_key(),
            change_handlers: HashMap::new(),
            close_handlers: HashMap::new(),
            input_handlers: HashMap::new(),
            layout_handlers: HashMap::new(),
            closing: Vec::new(),
            pending_roots: Vec::new(),
            reported: Vec::new(),
            pumping: false,
            sender,
            receiver,
            sequence: 0,
        }
    }

    /// A cloneable handle for posting events from any thread.
    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            sender: self.sender.clone(),
        }
    }

    // =========================================================================
    // Construction and destruction
    // =========================================================================

    /// Construct a declarative object.
    ///
    /// The object is allocated in the constructing state, linked under
    /// `parent` if given (the parent must be a live container), populated
    /// with the declared attributes, and transitioned to live.
    ///
    /// A parentless object is a free root: it must be registered with the
    /// session via [`add_window`](Self::add_window) before the turn ends, or
    /// it is reported as unregistered and reaped.
    pub fn construct(
        &mut self,
        tag: TypeTag,
        parent: Option<ObjectId>,
        attrs: Vec<AttrSpec>,
    ) -> Result<ObjectId> {
        let is_window = tag.capabilities().contains(Capabilities::HAS_MODALITY);
        let id = self.tree.register(tag);

        let built = self.populate(id, parent, attrs);
        if let Err(err) = built {
            // Roll the half-built object back out.
            self.tree.destroy(id);
            self.graph.remove_object(id);
            return Err(err);
        }

        if is_window {
            self.windows.insert(id, WindowState::default());
        }
        self.tree.mark_live(id).map_err(Error::from)?;
        if parent.is_none() {
            self.pending_roots.push(id);
        }
        self.pump()?;
        Ok(id)
    }

    /// Link and populate a freshly registered object.
    fn populate(
        &mut self,
        id: ObjectId,
        parent: Option<ObjectId>,
        attrs: Vec<AttrSpec>,
    ) -> Result<()> {
        if let Some(parent_id) = parent {
            self.tree.set_parent(id, Some(parent_id))?;
        }
        for attr in attrs {
            let slot = self.graph.add_slot(id, &attr.name, attr.declared);
            if !self.tree.insert_slot(id, &attr.name, slot)? {
                self.graph.remove_slot(slot);
                return Err(Error::Binding(trellis_core::BindingError::DuplicateSlot {
                    slot: attr.name,
                }));
            }
            if !attr.initial.is_empty() {
                self.graph
                    .set_value(slot, attr.initial, WriteOrigin::External)?;
            }
        }
        Ok(())
    }

    /// Tear down an object and its whole subtree.
    ///
    /// Never fails and never panics once called: each destroyed object is
    /// deregistered from the modality stack and the session, its slots and
    /// pending propagation work are removed from the graph, and any
    /// inconsistency found along the way is logged and skipped.
    pub fn destroy(&mut self, id: ObjectId) {
        let report = self.tree.destroy(id);
        if report.is_empty() {
            return;
        }
        for gone in &report {
            self.modality.pop(gone.id);
            self.windows.remove(&gone.id);
            self.session.remove_window(gone.id);
            self.pending_roots.retain(|&r| r != gone.id);
            self.close_handlers.remove(&gone.id);
            self.input_handlers.remove(&gone.id);
            self.layout_handlers.remove(&gone.id);
            for &slot in &gone.slots {
                self.change_handlers.remove(&slot);
                self.graph.remove_slot(slot);
            }
            // Slots the tree lost track of still belong to the graph purge.
            self.graph.remove_object(gone.id);
        }
        tracing::debug!(
            target: "trellis::runtime",
            ?id,
            destroyed = report.len(),
            "object tree torn down"
        );
        if let Err(err) = self.pump() {
            tracing::warn!(
                target: "trellis::runtime",
                %err,
                "propagation error during teardown"
            );
            self.reported.push(err);
        }
    }

    // =========================================================================
    // Attributes and bindings
    // =========================================================================

    /// Resolve a slot by owner and name.
    pub fn slot_id(&self, object: ObjectId, name: &str) -> Result<SlotId> {
        self.tree
            .slot(object, name)
            .map_err(Error::from)?
            .ok_or(Error::Binding(trellis_core::BindingError::UnknownSlot))
    }

    /// Bind an attribute slot.
    ///
    /// The expression's read-set becomes the slot's dependencies; cycles
    /// outside bidirectional pairs are rejected here, before any propagation.
    pub fn declare_binding(
        &mut self,
        object: ObjectId,
        name: &str,
        expression: Option<Expression>,
        kind: BindingKind,
    ) -> Result<()> {
        let slot = self.slot_id(object, name)?;
        self.graph.declare(slot, expression, kind)?;
        self.pump()
    }

    /// Write an attribute value.
    ///
    /// Dependents are marked dirty and the propagation pass runs to
    /// quiescence before this returns, including the change handlers it
    /// triggers.
    pub fn set(&mut self, object: ObjectId, name: &str, value: Value) -> Result<()> {
        let slot = self.slot_id(object, name)?;
        self.graph.set_value(slot, value, WriteOrigin::External)?;
        self.pump()
    }

    /// Read an attribute value.
    pub fn get(&self, object: ObjectId, name: &str) -> Result<Value> {
        let slot = self.slot_id(object, name)?;
        Ok(self.graph.value(slot)?)
    }

    /// Register a change handler for an attribute.
    ///
    /// Handlers run synchronously within the propagation pass, after the
    /// slot's value settles, in the order slots were marked dirty.
    pub fn on_change<F>(&mut self, object: ObjectId, name: &str, handler: F) -> Result<HandlerId>
    where
        F: Fn(&mut Runtime, &Value) + Send + Sync + 'static,
    {
        let slot = self.slot_id(object, name)?;
        let id = self.handler_ids.insert(());
        self.change_handlers
            .entry(slot)
            .or_default()
            .push((id, Arc::new(handler)));
        Ok(id)
    }

    /// Register an input handler for an object.
    ///
    /// The handler only runs for events that pass the modality gate.
    pub fn on_input<F>(&mut self, object: ObjectId, handler: F) -> Result<HandlerId>
    where
        F: Fn(&mut Runtime, &InputPayload) + Send + Sync + 'static,
    {
        if !self.tree.is_alive(object) {
            return Err(Error::Object(ObjectError::InvalidObjectId));
        }
        let id = self.handler_ids.insert(());
        self.input_handlers
            .entry(object)
            .or_default()
            .push((id, Arc::new(handler)));
        Ok(id)
    }

    /// Register a geometry callback for a container.
    ///
    /// Invoked when the layout solver reports resolved geometry for the
    /// object; not gated on modality.
    pub fn on_layout_resolved<F>(&mut self, object: ObjectId, handler: F) -> Result<HandlerId>
    where
        F: Fn(&mut Runtime, f64, f64) + Send + Sync + 'static,
    {
        if !self.tree.is_alive(object) {
            return Err(Error::Object(ObjectError::InvalidObjectId));
        }
        let id = self.handler_ids.insert(());
        self.layout_handlers
            .entry(object)
            .or_default()
            .push((id, Arc::new(handler)));
        Ok(id)
    }

    /// Remove any handler by ID. Returns `true` if it existed.
    pub fn remove_handler(&mut self, id: HandlerId) -> bool {
        if self.handler_ids.remove(id).is_none() {
            return false;
        }
        for handlers in self.change_handlers.values_mut() {
            handlers.retain(|(h, _)| *h != id);
        }
        for handlers in self.close_handlers.values_mut() {
            handlers.retain(|(h, _)| *h != id);
        }
        for handlers in self.input_handlers.values_mut() {
            handlers.retain(|(h, _)| *h != id);
        }
        for handlers in self.layout_handlers.values_mut() {
            handlers.retain(|(h, _)| *h != id);
        }
        true
    }

    /// Run propagation to quiescence and dispatch change handlers.
    ///
    /// Re-entrant calls (from handlers) are no-ops: the outer pump picks up
    /// whatever the handler marked dirty, under the same pass counters.
    fn pump(&mut self) -> Result<()> {
        if self.pumping {
            return Ok(());
        }
        self.pumping = true;
        let outcome = loop {
            let changes = match self.graph.run_pass() {
                Ok(changes) => changes,
                Err(err) => break Err(Error::from(err)),
            };
            if changes.is_empty() {
                break Ok(());
            }
            for change in changes {
                let callbacks: Vec<ChangeHandler> = self
                    .change_handlers
                    .get(&change.slot)
                    .map(|v| v.iter().map(|(_, f)| f.clone()).collect())
                    .unwrap_or_default();
                for callback in callbacks {
                    // The handler before us may have destroyed the slot.
                    if !self.graph.contains(change.slot) {
                        break;
                    }
                    callback(self, &change.value);
                }
            }
        };
        self.graph.finish_pass();
        self.pumping = false;
        outcome
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Register a parentless window as a session-owned root.
    pub fn add_window(&mut self, window: ObjectId) -> Result<()> {
        if !self.tree.is_alive(window) {
            return Err(Error::Object(ObjectError::InvalidObjectId));
        }
        self.session.add_window(window, &self.tree)?;
        self.pending_roots.retain(|&r| r != window);
        Ok(())
    }

    /// The session registry.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Shut the session down: destroy every remaining root, in registration
    /// order, then clear the modality stack.
    pub fn shutdown(&mut self) {
        let roots = self.session.drain_for_shutdown();
        tracing::info!(
            target: "trellis::runtime",
            roots = roots.len(),
            "session shutdown"
        );
        for window in roots {
            self.destroy(window);
        }
        self.modality.clear();
    }

    // =========================================================================
    // Window lifecycle and modality
    // =========================================================================

    /// Show a window.
    ///
    /// Never suspends the caller: the modal entry is registered and control
    /// returns immediately. A window-modal show requires a parent; the
    /// window's kind must declare the modality capability. Showing an
    /// already-visible window is a no-op.
    pub fn show(&mut self, window: ObjectId, modality: Modality) -> Result<()> {
        if !self.tree.is_alive(window) {
            return Err(Error::Object(ObjectError::InvalidObjectId));
        }
        let caps = self.tree.capabilities(window)?;
        if !caps.contains(Capabilities::HAS_MODALITY) {
            return Err(Error::Object(ObjectError::MissingCapability {
                type_tag: self.tree.type_tag(window)?.name().to_string(),
                capability: "HAS_MODALITY",
            }));
        }
        if self.windows.get(&window).is_some_and(|s| s.visible) {
            return Ok(());
        }

        match modality {
            Modality::NonModal => {}
            Modality::WindowModal => {
                let Some(parent) = self.tree.parent(window)? else {
                    return Err(Error::invalid_modality(window));
                };
                self.modality.push(window, ModalScope::WindowModal { parent });
            }
            Modality::ApplicationModal => {
                self.modality.push(window, ModalScope::ApplicationModal);
            }
        }

        let state = self.windows.entry(window).or_default();
        state.visible = true;
        state.modality = modality;
        self.closed_results.remove(&window);
        tracing::info!(target: "trellis::runtime", ?window, %modality, "window shown");
        Ok(())
    }

    /// End a show-cycle without tearing the window down.
    ///
    /// The modal entry (if any) is popped and the window can be re-shown.
    pub fn hide(&mut self, window: ObjectId) -> Result<()> {
        if !self.tree.is_alive(window) {
            return Err(Error::Object(ObjectError::InvalidObjectId));
        }
        self.modality.pop(window);
        if let Some(state) = self.windows.get_mut(&window) {
            state.visible = false;
        }
        Ok(())
    }

    /// Close a window with a result.
    ///
    /// Pops the modal entry (restoring input to whatever it blocked),
    /// records the result, fires close handlers, then tears the window down:
    /// session roots leave the session, parented windows cascade out of
    /// their parent. The result is delivered only through handlers — there
    /// is no blocking return path.
    pub fn close(&mut self, window: ObjectId, result: CloseResult) -> Result<()> {
        if !self.tree.is_alive(window) {
            return Err(Error::Object(ObjectError::InvalidObjectId));
        }
        if !self.windows.contains_key(&window) {
            return Err(Error::Object(ObjectError::MissingCapability {
                type_tag: self.tree.type_tag(window)?.name().to_string(),
                capability: "HAS_MODALITY",
            }));
        }
        if self.closing.contains(&window) {
            return Ok(());
        }
        self.closing.push(window);
        self.modality.pop(window);
        if let Some(state) = self.windows.get_mut(&window) {
            state.visible = false;
        }
        self.closed_results.insert(window, result);
        tracing::info!(target: "trellis::runtime", ?window, ?result, "window closed");

        // Handlers run before teardown so they can still read attributes.
        let callbacks: Vec<CloseHandler> = self
            .close_handlers
            .get(&window)
            .map(|v| v.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();
        for callback in callbacks {
            callback(self, result);
        }

        self.destroy(window);
        self.closing.retain(|&w| w != window);
        Ok(())
    }

    /// Register a close handler for a window.
    ///
    /// This is the continuation that replaces a blocking show: the handler
    /// receives the recorded result when [`close`](Self::close) runs.
    pub fn on_close<F>(&mut self, window: ObjectId, handler: F) -> Result<HandlerId>
    where
        F: Fn(&mut Runtime, CloseResult) + Send + Sync + 'static,
    {
        if !self.tree.is_alive(window) {
            return Err(Error::Object(ObjectError::InvalidObjectId));
        }
        let id = self.handler_ids.insert(());
        self.close_handlers
            .entry(window)
            .or_default()
            .push((id, Arc::new(handler)));
        Ok(id)
    }

    /// Whether a window is currently shown.
    pub fn is_visible(&self, window: ObjectId) -> bool {
        self.windows.get(&window).is_some_and(|s| s.visible)
    }

    /// The result a window was closed with, if it has been closed.
    pub fn close_result(&self, window: ObjectId) -> Option<CloseResult> {
        self.closed_results.get(&window).copied()
    }

    /// Whether input aimed at this object would currently be discarded.
    pub fn is_input_blocked(&self, object: ObjectId) -> bool {
        self.modality.is_blocked(object, &self.tree)
    }

    /// The topmost modal window, if any.
    pub fn active_modal(&self) -> Option<ObjectId> {
        self.modality.active_modal()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Deliver one input event, consulting the modality manager first.
    ///
    /// Returns `true` if the event reached its target; blocked or dangling
    /// events are discarded, not buffered.
    pub fn dispatch_input(&mut self, event: InputEvent) -> bool {
        if !self.tree.is_alive(event.target) {
            tracing::trace!(
                target: "trellis::runtime",
                ?event,
                "input dropped: target gone"
            );
            return false;
        }
        if self.modality.is_blocked(event.target, &self.tree) {
            tracing::debug!(
                target: "trellis::runtime",
                ?event,
                "input discarded: target blocked by a modal window"
            );
            return false;
        }
        let callbacks: Vec<InputHandler> = self
            .input_handlers
            .get(&event.target)
            .map(|v| v.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();
        for callback in callbacks {
            if !self.tree.is_alive(event.target) {
                break;
            }
            callback(self, &event.payload);
        }
        true
    }

    /// Deliver a resolved-geometry callback from the layout solver.
    fn deliver_layout(&mut self, target: ObjectId, width: f64, height: f64) {
        if !self.tree.is_alive(target) {
            return;
        }
        let callbacks: Vec<LayoutHandler> = self
            .layout_handlers
            .get(&target)
            .map(|v| v.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();
        for callback in callbacks {
            if !self.tree.is_alive(target) {
                break;
            }
            callback(self, width, height);
        }
    }

    /// Defer a task to the next drain of the loop.
    pub fn post_task<F>(&self, task: F)
    where
        F: FnOnce(&mut Runtime) + Send + 'static,
    {
        let _ = self.sender.send(RuntimeEvent::Task(TaskEnvelope::new(task)));
    }

    /// Drain every posted event, highest priority first, then finish the
    /// turn. Returns `false` once a quit request has been processed.
    pub fn run_until_idle(&mut self) -> bool {
        let mut running = true;
        loop {
            let mut queue = BinaryHeap::new();
            while let Ok(event) = self.receiver.try_recv() {
                self.sequence += 1;
                queue.push(PrioritizedEvent::new(event, self.sequence));
            }
            if queue.is_empty() {
                break;
            }
            while let Some(entry) = queue.pop() {
                match entry.event {
                    RuntimeEvent::Input(event) => {
                        self.dispatch_input(event);
                    }
                    RuntimeEvent::LayoutResolved {
                        target,
                        width,
                        height,
                    } => self.deliver_layout(target, width, height),
                    RuntimeEvent::Task(task) => task.run(self),
                    RuntimeEvent::Quit => running = false,
                    RuntimeEvent::WakeUp => {}
                }
            }
        }
        self.finish_turn();
        running
    }

    /// Finish the current turn: report and reap free roots that were never
    /// registered with the session.
    pub fn finish_turn(&mut self) {
        let pending = std::mem::take(&mut self.pending_roots);
        for id in pending {
            if !self.tree.is_alive(id) || self.session.contains(id) {
                continue;
            }
            if self.tree.parent(id).ok().flatten().is_some() {
                continue;
            }
            tracing::error!(
                target: "trellis::runtime",
                ?id,
                "free root was never registered with the session; reaping"
            );
            self.reported.push(Error::unregistered_root(id));
            self.destroy(id);
        }
    }

    /// Take the errors surfaced outside a `Result` path (reaping, teardown).
    pub fn take_reported(&mut self) -> Vec<Error> {
        std::mem::take(&mut self.reported)
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The object tree, for inspection.
    pub fn tree(&self) -> &ObjectTree {
        &self.tree
    }

    /// The lifecycle state of an object.
    pub fn object_state(&self, id: ObjectId) -> Result<LifecycleState> {
        Ok(self.tree.state(id)?)
    }

    /// Render the subtree under `root` for diagnostics.
    pub fn dump_tree(&self, root: ObjectId) -> String {
        format_tree(&self.tree, root, &TreeFormatOptions::default())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_tag() -> TypeTag {
        TypeTag::new("Window").with_capabilities(
            Capabilities::HAS_MODALITY | Capabilities::HAS_TITLE | Capabilities::IS_CONTAINER,
        )
    }

    #[test]
    fn test_construct_links_and_populates() {
        let mut rt = Runtime::new();
        let window = rt
            .construct(
                window_tag(),
                None,
                vec![AttrSpec::new("title", ValueType::Str).with_initial(Value::from("Main"))],
            )
            .unwrap();
        rt.add_window(window).unwrap();

        let label = rt
            .construct(
                TypeTag::new("Label"),
                Some(window),
                vec![AttrSpec::new("text", ValueType::Str)],
            )
            .unwrap();

        assert_eq!(rt.tree().parent(label).unwrap(), Some(window));
        assert_eq!(rt.get(window, "title").unwrap(), Value::from("Main"));
        assert_eq!(rt.get(label, "text").unwrap(), Value::Empty);
        assert_eq!(rt.object_state(label).unwrap(), LifecycleState::Live);
    }

    #[test]
    fn test_duplicate_attr_rolls_back_construction() {
        let mut rt = Runtime::new();
        let err = rt
            .construct(
                window_tag(),
                None,
                vec![
                    AttrSpec::new("title", ValueType::Str),
                    AttrSpec::new("title", ValueType::Str),
                ],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Binding(trellis_core::BindingError::DuplicateSlot { .. })
        ));
    }

    #[test]
    fn test_set_propagates_and_fires_handlers_in_order() {
        let mut rt = Runtime::new();
        let window = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(window).unwrap();
        let field = rt
            .construct(
                TypeTag::new("Field"),
                Some(window),
                vec![
                    AttrSpec::new("source", ValueType::Number),
                    AttrSpec::new("echo", ValueType::Number),
                ],
            )
            .unwrap();

        let source_slot = rt.slot_id(field, "source").unwrap();
        rt.declare_binding(
            field,
            "echo",
            Some(Expression::slot(source_slot)),
            BindingKind::Forward,
        )
        .unwrap();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_a = seen.clone();
        rt.on_change(field, "source", move |_, value| {
            seen_a.lock().push(("source", value.clone()));
        })
        .unwrap();
        let seen_b = seen.clone();
        rt.on_change(field, "echo", move |_, value| {
            seen_b.lock().push(("echo", value.clone()));
        })
        .unwrap();

        rt.set(field, "source", Value::from(4)).unwrap();

        assert_eq!(rt.get(field, "echo").unwrap(), Value::from(4));
        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![
                ("source", Value::from(4)),
                ("echo", Value::from(4)),
            ]
        );
    }

    #[test]
    fn test_change_handler_may_mutate_model() {
        let mut rt = Runtime::new();
        let window = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(window).unwrap();
        let field = rt
            .construct(
                TypeTag::new("Field"),
                Some(window),
                vec![
                    AttrSpec::new("input", ValueType::Number),
                    AttrSpec::new("derived", ValueType::Number),
                ],
            )
            .unwrap();

        // The handler writes a second attribute; the write must settle
        // within the same call to `set`.
        rt.on_change(field, "input", move |rt, value| {
            let n = value.as_number().unwrap_or(0.0);
            rt.set(field, "derived", Value::Number(n * 10.0)).unwrap();
        })
        .unwrap();

        rt.set(field, "input", Value::from(3)).unwrap();
        assert_eq!(rt.get(field, "derived").unwrap(), Value::from(30));
    }

    #[test]
    fn test_destroy_cancels_pending_handler_dispatch() {
        let mut rt = Runtime::new();
        let window = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(window).unwrap();
        let a = rt
            .construct(
                TypeTag::new("Field"),
                Some(window),
                vec![AttrSpec::new("value", ValueType::Number)],
            )
            .unwrap();
        let b = rt
            .construct(
                TypeTag::new("Field"),
                Some(window),
                vec![AttrSpec::new("value", ValueType::Number)],
            )
            .unwrap();

        // a's handler destroys b before b's handler can run.
        let b_fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        rt.on_change(a, "value", move |rt, _| {
            rt.destroy(b);
        })
        .unwrap();
        let b_fired_clone = b_fired.clone();
        rt.on_change(b, "value", move |_, _| {
            b_fired_clone.store(true, std::sync::atomic::Ordering::SeqCst);
        })
        .unwrap();

        // Mark both in one turn: a first, then b.
        let slot_a = rt.slot_id(a, "value").unwrap();
        let slot_b = rt.slot_id(b, "value").unwrap();
        rt.graph
            .set_value(slot_a, Value::from(1), WriteOrigin::External)
            .unwrap();
        rt.graph
            .set_value(slot_b, Value::from(1), WriteOrigin::External)
            .unwrap();
        rt.pump().unwrap();

        assert!(!b_fired.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(rt.object_state(b).unwrap(), LifecycleState::Destroyed);
    }

    #[test]
    fn test_unregistered_root_is_reported_and_reaped() {
        let mut rt = Runtime::new();
        let orphan = rt.construct(window_tag(), None, vec![]).unwrap();
        let kept = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(kept).unwrap();

        rt.finish_turn();

        assert_eq!(rt.object_state(orphan).unwrap(), LifecycleState::Destroyed);
        assert_eq!(rt.object_state(kept).unwrap(), LifecycleState::Live);
        let reported = rt.take_reported();
        assert_eq!(reported.len(), 1);
        assert!(matches!(
            reported[0],
            Error::UnregisteredRoot { object } if object == orphan
        ));
    }

    #[test]
    fn test_show_requires_modality_capability() {
        let mut rt = Runtime::new();
        let window = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(window).unwrap();
        let label = rt
            .construct(TypeTag::new("Label"), Some(window), vec![])
            .unwrap();

        let err = rt.show(label, Modality::NonModal).unwrap_err();
        assert!(matches!(
            err,
            Error::Object(ObjectError::MissingCapability { .. })
        ));
    }

    #[test]
    fn test_window_modal_requires_parent() {
        let mut rt = Runtime::new();
        let window = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(window).unwrap();

        let err = rt.show(window, Modality::WindowModal).unwrap_err();
        assert!(matches!(err, Error::InvalidModality { .. }));
        assert!(!rt.is_visible(window));
    }

    #[test]
    fn test_close_records_result_and_destroys() {
        let mut rt = Runtime::new();
        let window = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(window).unwrap();
        rt.show(window, Modality::NonModal).unwrap();

        let observed = Arc::new(parking_lot::Mutex::new(None));
        let observed_clone = observed.clone();
        rt.on_close(window, move |_, result| {
            *observed_clone.lock() = Some(result);
        })
        .unwrap();

        rt.close(window, CloseResult::Accepted).unwrap();

        assert_eq!(*observed.lock(), Some(CloseResult::Accepted));
        assert_eq!(rt.close_result(window), Some(CloseResult::Accepted));
        assert_eq!(rt.object_state(window).unwrap(), LifecycleState::Destroyed);
        assert!(!rt.session().contains(window));
    }

    #[test]
    fn test_hide_allows_reshow() {
        let mut rt = Runtime::new();
        let window = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(window).unwrap();

        rt.show(window, Modality::ApplicationModal).unwrap();
        assert!(rt.is_visible(window));
        assert_eq!(rt.active_modal(), Some(window));

        rt.hide(window).unwrap();
        assert!(!rt.is_visible(window));
        assert_eq!(rt.active_modal(), None);

        rt.show(window, Modality::NonModal).unwrap();
        assert!(rt.is_visible(window));
        assert_eq!(rt.object_state(window).unwrap(), LifecycleState::Live);
    }

    #[test]
    fn test_blocked_input_is_discarded() {
        let mut rt = Runtime::new();
        let main = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(main).unwrap();
        let button = rt
            .construct(TypeTag::new("PushButton"), Some(main), vec![])
            .unwrap();
        let dialog = rt.construct(window_tag(), Some(main), vec![]).unwrap();

        let clicks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let clicks_clone = clicks.clone();
        rt.on_input(button, move |_, _| {
            clicks_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        })
        .unwrap();

        rt.show(dialog, Modality::ApplicationModal).unwrap();
        assert!(!rt.dispatch_input(InputEvent::activate(button)));
        assert_eq!(clicks.load(std::sync::atomic::Ordering::SeqCst), 0);

        rt.close(dialog, CloseResult::Rejected).unwrap();
        assert!(rt.dispatch_input(InputEvent::activate(button)));
        assert_eq!(clicks.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_run_until_idle_processes_posted_events() {
        let mut rt = Runtime::new();
        let window = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(window).unwrap();
        let button = rt
            .construct(TypeTag::new("PushButton"), Some(window), vec![])
            .unwrap();

        let clicks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let clicks_clone = clicks.clone();
        rt.on_input(button, move |_, _| {
            clicks_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        })
        .unwrap();

        let handle = rt.handle();
        assert!(handle.post_input(InputEvent::activate(button)));
        assert!(handle.post_task(move |rt| {
            rt.set(window, "title", Value::from("ignored")).ok();
        }));
        assert!(rt.run_until_idle());
        assert_eq!(clicks.load(std::sync::atomic::Ordering::SeqCst), 1);

        assert!(handle.quit());
        assert!(!rt.run_until_idle());
    }

    #[test]
    fn test_layout_callback_delivery() {
        let mut rt = Runtime::new();
        let window = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(window).unwrap();

        let geometry = Arc::new(parking_lot::Mutex::new(None));
        let geometry_clone = geometry.clone();
        rt.on_layout_resolved(window, move |_, w, h| {
            *geometry_clone.lock() = Some((w, h));
        })
        .unwrap();

        rt.handle().post_layout_resolved(window, 800.0, 600.0);
        rt.run_until_idle();
        assert_eq!(*geometry.lock(), Some((800.0, 600.0)));
    }

    #[test]
    fn test_shutdown_destroys_roots_in_registration_order() {
        let mut rt = Runtime::new();
        let first = rt.construct(window_tag(), None, vec![]).unwrap();
        let second = rt.construct(window_tag(), None, vec![]).unwrap();
        rt.add_window(first).unwrap();
        rt.add_window(second).unwrap();

        rt.shutdown();

        assert_eq!(rt.object_state(first).unwrap(), LifecycleState::Destroyed);
        assert_eq!(rt.object_state(second).unwrap(), LifecycleState::Destroyed);
        assert_eq!(rt.session().window_count(), 0);
        assert!(rt.active_modal().is_none());
    }
}
