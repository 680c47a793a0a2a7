//! Attribute slots and the binding graph.
//!
//! Every declarative attribute is a slot stored in an arena owned by the
//! [`BindingGraph`]. Slots are created unbound via
//! [`add_slot`](BindingGraph::add_slot) when their object is constructed and
//! bound afterwards via [`declare`](BindingGraph::declare). The graph tracks
//! which slots each slot's expression reads, marks dependents dirty on
//! writes, and drains the dirty set in dependency order during a propagation
//! pass.
//!
//! # Binding kinds
//!
//! - [`BindingKind::None`]: plain storage; never re-evaluates after the
//!   initial assignment.
//! - [`BindingKind::Static`]: the expression is evaluated exactly once, at
//!   declaration, and never again.
//! - [`BindingKind::Forward`]: the slot is recomputed whenever any slot its
//!   expression reads changes. Writes flow source to target only.
//! - [`BindingKind::Reverse`]: writes to the slot are relayed backward into
//!   its single source slot; the slot itself is never overwritten by the
//!   source.
//! - [`BindingKind::Bidirectional`]: both directions of a coupled pair, with
//!   re-entrant propagation into the most recent writer suppressed.
//!
//! # Propagation
//!
//! [`BindingGraph::run_pass`] drains the dirty queue deterministically: the
//! earliest-queued slot with no dirty dependencies goes next, and a slot is
//! evaluated at most once per pass unless a later slot re-marks it. A slot
//! queued more than `slot_count + 1` times aborts the pass with
//! [`BindingError::Divergence`], leaving every already-settled slot at its
//! last consistent value.
//!
//! Change notifications are collected per pass and handed back in
//! dirty-marking order; the caller invokes the user handlers so that handler
//! code can freely mutate the graph between segments of the same pass.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use slotmap::{SlotMap, new_key_type};

use crate::error::{BindingError, BindingResult};
use crate::object::ObjectId;
use crate::value::{Value, ValueType};

new_key_type! {
    /// A unique identifier for an attribute slot.
    ///
    /// Slot IDs are generational: after a slot is removed the ID resolves to
    /// nothing rather than aliasing a newer slot.
    pub struct SlotId;
}

/// The propagation discipline governing a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingKind {
    /// Plain storage with no expression.
    #[default]
    None,
    /// Evaluate the expression once at declaration.
    Static,
    /// Recompute the slot whenever a read dependency changes.
    Forward,
    /// Relay writes backward into the single source slot.
    Reverse,
    /// Couple the slot with a single source in both directions.
    Bidirectional,
}

/// Read-only view of the graph handed to expression evaluation.
pub struct ExprScope<'a> {
    graph: &'a BindingGraph,
}

impl ExprScope<'_> {
    /// The current value of a slot, or [`Value::Empty`] if the slot has been
    /// removed out from under the expression.
    pub fn get(&self, id: SlotId) -> Value {
        self.graph
            .slots
            .get(id)
            .map(|s| s.value.clone())
            .unwrap_or(Value::Empty)
    }
}

/// A deferred computation over other slots.
///
/// The read-set is explicit: it is what [`BindingGraph::declare`] walks to
/// insert dependency edges, mirroring how the markup compiler reports the
/// slots a source expression mentions.
#[derive(Clone)]
pub struct Expression {
    reads: Vec<SlotId>,
    eval: Arc<dyn Fn(&ExprScope<'_>) -> Value + Send + Sync>,
}

impl Expression {
    /// An expression that always yields `value`.
    pub fn constant(value: Value) -> Self {
        Self {
            reads: Vec::new(),
            eval: Arc::new(move |_: &ExprScope<'_>| value.clone()),
        }
    }

    /// An expression that relays the value of one source slot.
    pub fn slot(source: SlotId) -> Self {
        Self {
            reads: vec![source],
            eval: Arc::new(move |scope: &ExprScope<'_>| scope.get(source)),
        }
    }

    /// An arbitrary computation over the declared read-set.
    pub fn compute<F>(reads: Vec<SlotId>, f: F) -> Self
    where
        F: Fn(&ExprScope<'_>) -> Value + Send + Sync + 'static,
    {
        Self {
            reads,
            eval: Arc::new(f),
        }
    }

    /// The slots this expression reads.
    pub fn reads(&self) -> &[SlotId] {
        &self.reads
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("reads", &self.reads)
            .finish_non_exhaustive()
    }
}

/// Who performed a write, for suppression of re-entrant propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// A caller outside the graph (the runtime facade or a change handler).
    External,
    /// Propagation on behalf of another slot.
    Propagation(SlotId),
}

/// One settled change, reported in dirty-marking order.
///
/// The graph does not invoke user handlers itself; the runtime drains these
/// and dispatches, so handlers can mutate the graph between segments of the
/// same pass.
#[derive(Debug, Clone)]
pub struct SlotChange {
    /// The slot that settled.
    pub slot: SlotId,
    /// The object owning the slot.
    pub owner: ObjectId,
    /// The slot name, for dispatch and diagnostics.
    pub name: String,
    /// The settled value.
    pub value: Value,
}

/// One attribute slot.
struct Slot {
    owner: ObjectId,
    name: String,
    declared: ValueType,
    value: Value,
    kind: BindingKind,
    expression: Option<Expression>,
    /// Slots this slot's expression reads (dependencies).
    reads: Vec<SlotId>,
    /// Slots whose expressions read this slot (dependents), in declare order.
    dependents: Vec<SlotId>,
    /// For Reverse/Bidirectional: the coupled source slot.
    reverse_source: Option<SlotId>,
    /// Slots that relay their writes backward into this slot.
    reverse_targets: Vec<SlotId>,
    dirty: bool,
}

/// Bookkeeping for one propagation pass.
#[derive(Default)]
struct PassState {
    /// How many times each slot has been queued this pass.
    queue_counts: HashMap<SlotId, usize>,
}

/// The dependency graph over every attribute slot in the tree.
pub struct BindingGraph {
    slots: SlotMap<SlotId, Slot>,
    /// Dirty slots in marking order.
    dirty_queue: VecDeque<SlotId>,
    /// Settled changes not yet drained by the caller, keyed by mark sequence.
    pending_changes: Vec<(u64, SlotChange)>,
    /// Monotonic dirty-marking sequence.
    mark_seq: u64,
    /// Mark sequence per slot, for change ordering within a pass.
    slot_seq: HashMap<SlotId, u64>,
    /// The slot that most recently marked each slot dirty. Marks made before
    /// a pass opens keep their writer so suppression still applies.
    marked_by: HashMap<SlotId, SlotId>,
    /// State of the pass in flight, if any.
    pass: Option<PassState>,
}

impl BindingGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            dirty_queue: VecDeque::new(),
            pending_changes: Vec::new(),
            mark_seq: 0,
            slot_seq: HashMap::new(),
            marked_by: HashMap::new(),
            pass: None,
        }
    }

    /// The number of slots in the graph.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Whether any slot is waiting to be propagated.
    pub fn has_dirty(&self) -> bool {
        !self.dirty_queue.is_empty()
    }

    // =========================================================================
    // Slot creation and binding declaration
    // =========================================================================

    /// Create an unbound slot on `owner`.
    ///
    /// The slot starts [`Value::Empty`] with [`BindingKind::None`]. Name
    /// uniqueness within the owner is enforced by the object tree, which maps
    /// names to the IDs returned here.
    pub fn add_slot(&mut self, owner: ObjectId, name: &str, declared: ValueType) -> SlotId {
        let id = self.slots.insert(Slot {
            owner,
            name: name.to_string(),
            declared,
            value: Value::Empty,
            kind: BindingKind::None,
            expression: None,
            reads: Vec::new(),
            dependents: Vec::new(),
            reverse_source: None,
            reverse_targets: Vec::new(),
            dirty: false,
        });
        tracing::trace!(target: "trellis_core::binding", ?id, slot = name, "added slot");
        id
    }

    /// Bind an existing slot.
    ///
    /// Records the binding and inserts a dependency edge for each slot in
    /// the expression's read-set. Fails with [`BindingError::Cycle`] if the
    /// edges would place the slot in a dependency cycle outside the
    /// bidirectional-pair exception, and with
    /// [`BindingError::InvalidExpression`] if the expression shape does not
    /// fit the kind. A previous binding on the slot is replaced.
    ///
    /// Static, Forward, and Bidirectional slots are evaluated immediately;
    /// the result is type-checked against the slot's declaration and flows
    /// through the normal write path, so existing dependents observe it.
    pub fn declare(
        &mut self,
        id: SlotId,
        expression: Option<Expression>,
        kind: BindingKind,
    ) -> BindingResult<()> {
        let name = self
            .slots
            .get(id)
            .map(|s| s.name.clone())
            .ok_or(BindingError::UnknownSlot)?;

        // Validate the expression shape up front.
        match kind {
            BindingKind::None => {
                if expression.is_some() {
                    return Err(BindingError::InvalidExpression {
                        slot: name,
                        reason: "an unbound slot takes no expression",
                    });
                }
            }
            BindingKind::Static | BindingKind::Forward => {
                if expression.is_none() {
                    return Err(BindingError::InvalidExpression {
                        slot: name,
                        reason: "this binding kind requires an expression",
                    });
                }
            }
            BindingKind::Reverse | BindingKind::Bidirectional => {
                let reads = expression.as_ref().map(|e| e.reads().len()).unwrap_or(0);
                if reads != 1 {
                    return Err(BindingError::InvalidExpression {
                        slot: name,
                        reason: "this binding kind requires exactly one source slot",
                    });
                }
            }
        }

        // The edges the new binding subscribes to. Static evaluates once and
        // never re-subscribes; Reverse never pulls from its source.
        let subscribed: Vec<SlotId> = match kind {
            BindingKind::None | BindingKind::Static | BindingKind::Reverse => Vec::new(),
            BindingKind::Forward | BindingKind::Bidirectional => expression
                .as_ref()
                .map(|e| e.reads().to_vec())
                .unwrap_or_default(),
        };
        let reverse_source = match kind {
            BindingKind::Reverse | BindingKind::Bidirectional => {
                expression.as_ref().and_then(|e| e.reads().first().copied())
            }
            _ => None,
        };

        for &source in &subscribed {
            if !self.slots.contains_key(source) {
                return Err(BindingError::UnknownSlot);
            }
            // One bidirectional declaration couples a pair; a matching
            // declaration from the other side is the only permitted 2-cycle.
            let coupled_pair = kind == BindingKind::Bidirectional
                && self.slots.get(source).is_some_and(|s| {
                    s.kind == BindingKind::Bidirectional && s.reads == [id]
                });
            if !coupled_pair && self.reads_transitively(source, id) {
                return Err(BindingError::Cycle { slot: name });
            }
        }
        if let Some(source) = reverse_source {
            if !self.slots.contains_key(source) {
                return Err(BindingError::UnknownSlot);
            }
        }

        self.unwire(id);

        for &source in &subscribed {
            self.slots[source].dependents.push(id);
            self.slots[id].reads.push(source);
        }
        if let Some(source) = reverse_source {
            self.slots[source].reverse_targets.push(id);
        }
        {
            let slot = &mut self.slots[id];
            slot.kind = kind;
            slot.expression = expression;
            slot.reverse_source = reverse_source;
        }

        // Initial evaluation, where the kind calls for one.
        if matches!(
            kind,
            BindingKind::Static | BindingKind::Forward | BindingKind::Bidirectional
        ) {
            let initial = self.evaluate(id);
            let origin = match reverse_source {
                Some(source) => WriteOrigin::Propagation(source),
                None => WriteOrigin::External,
            };
            if let Err(err) = self.set_value(id, initial, origin) {
                // A rejected initial value un-declares the binding; the slot
                // keeps its previous value and kind.
                self.unwire(id);
                if let Some(slot) = self.slots.get_mut(id) {
                    slot.kind = BindingKind::None;
                    slot.expression = None;
                }
                return Err(err);
            }
        }

        tracing::trace!(
            target: "trellis_core::binding",
            ?id,
            slot = %self.slots[id].name,
            ?kind,
            "declared binding"
        );
        Ok(())
    }

    /// Remove the edges of a slot's current binding, leaving the slot itself.
    fn unwire(&mut self, id: SlotId) {
        let (reads, reverse_source) = {
            let slot = &mut self.slots[id];
            (
                std::mem::take(&mut slot.reads),
                slot.reverse_source.take(),
            )
        };
        for read in reads {
            if let Some(source) = self.slots.get_mut(read) {
                source.dependents.retain(|&d| d != id);
            }
        }
        if let Some(source) = reverse_source {
            if let Some(source_slot) = self.slots.get_mut(source) {
                source_slot.reverse_targets.retain(|&t| t != id);
            }
        }
    }

    /// Whether `start`'s expression reads `needle`, transitively.
    fn reads_transitively(&self, start: SlotId, needle: SlotId) -> bool {
        let mut stack = vec![start];
        let mut seen = vec![start];
        while let Some(current) = stack.pop() {
            if current == needle {
                return true;
            }
            if let Some(slot) = self.slots.get(current) {
                for &read in &slot.reads {
                    if !seen.contains(&read) {
                        seen.push(read);
                        stack.push(read);
                    }
                }
            }
        }
        false
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// The current value of a slot.
    pub fn value(&self, id: SlotId) -> BindingResult<Value> {
        self.slots
            .get(id)
            .map(|s| s.value.clone())
            .ok_or(BindingError::UnknownSlot)
    }

    /// The binding kind of a slot.
    pub fn kind(&self, id: SlotId) -> BindingResult<BindingKind> {
        self.slots
            .get(id)
            .map(|s| s.kind)
            .ok_or(BindingError::UnknownSlot)
    }

    /// The object owning a slot.
    pub fn owner(&self, id: SlotId) -> BindingResult<ObjectId> {
        self.slots
            .get(id)
            .map(|s| s.owner)
            .ok_or(BindingError::UnknownSlot)
    }

    /// Whether the slot still exists.
    pub fn contains(&self, id: SlotId) -> bool {
        self.slots.contains_key(id)
    }

    // =========================================================================
    // Writes and propagation
    // =========================================================================

    /// Assign `value` to a slot.
    ///
    /// The write is type-checked against the slot's declaration. If the value
    /// actually changes, dependents are marked dirty in marking order, a
    /// change record is queued, and — for Reverse/Bidirectional slots — the
    /// value is relayed backward into the coupled source unless that source
    /// was itself the writer.
    pub fn set_value(
        &mut self,
        id: SlotId,
        value: Value,
        origin: WriteOrigin,
    ) -> BindingResult<()> {
        if !self.slots.contains_key(id) {
            return Err(BindingError::UnknownSlot);
        }
        self.check_type(id, &value)?;

        let slot = &mut self.slots[id];
        if slot.value == value {
            return Ok(());
        }
        slot.value = value.clone();

        // Queue the change record under this slot's marking sequence so the
        // caller observes handler order by dirty-marking, not by settle.
        let seq = match self.slot_seq.get(&id).copied() {
            Some(seq) => seq,
            None => {
                self.mark_seq += 1;
                self.slot_seq.insert(id, self.mark_seq);
                self.mark_seq
            }
        };
        let (owner, name) = {
            let slot = &self.slots[id];
            (slot.owner, slot.name.clone())
        };
        self.pending_changes.push((
            seq,
            SlotChange {
                slot: id,
                owner,
                name,
                value: value.clone(),
            },
        ));

        // Mark dependents, skipping the slot that just wrote us.
        let suppressed = match origin {
            WriteOrigin::Propagation(writer) => Some(writer),
            WriteOrigin::External => None,
        };
        let dependents = self.slots[id].dependents.clone();
        for dependent in dependents {
            if Some(dependent) == suppressed {
                continue;
            }
            self.mark_dirty(dependent, id)?;
        }

        // Backward relay for Reverse/Bidirectional targets.
        if let Some(source) = self.slots[id].reverse_source {
            if Some(source) != suppressed && self.slots.contains_key(source) {
                self.set_value(source, value, WriteOrigin::Propagation(id))?;
            }
        }

        Ok(())
    }

    /// Mark a slot dirty on behalf of `marker`.
    ///
    /// Unbound, static, and reverse slots never re-evaluate from their
    /// sources, so they are never queued.
    fn mark_dirty(&mut self, id: SlotId, marker: SlotId) -> BindingResult<()> {
        let Some(slot) = self.slots.get_mut(id) else {
            return Ok(());
        };
        if matches!(
            slot.kind,
            BindingKind::None | BindingKind::Static | BindingKind::Reverse
        ) {
            return Ok(());
        }
        self.marked_by.insert(id, marker);
        if slot.dirty {
            return Ok(());
        }
        slot.dirty = true;
        self.mark_seq += 1;
        self.slot_seq.insert(id, self.mark_seq);
        self.dirty_queue.push_back(id);

        if let Some(pass) = self.pass.as_mut() {
            let count = pass.queue_counts.entry(id).or_insert(0);
            *count += 1;
            let evaluations = *count;
            if evaluations > self.slots.len() + 1 {
                let name = self.slots[id].name.clone();
                self.abort_pass();
                return Err(BindingError::Divergence { slot: name, evaluations });
            }
        }
        Ok(())
    }

    /// Drain the dirty queue, evaluating each slot in dependency order.
    ///
    /// Starts a pass if none is in flight; a pass stays open (keeping its
    /// divergence counters and suppression state) until
    /// [`finish_pass`](Self::finish_pass), so handler-driven writes between
    /// segments extend the same pass. Returns the changes settled so far, in
    /// dirty-marking order.
    pub fn run_pass(&mut self) -> BindingResult<Vec<SlotChange>> {
        if self.pass.is_none() {
            let mut pass = PassState::default();
            // Entries queued before the pass opened count toward the bound.
            for &id in &self.dirty_queue {
                *pass.queue_counts.entry(id).or_insert(0) += 1;
            }
            self.pass = Some(pass);
        }

        while let Some(next) = self.pick_ready() {
            let Some(slot) = self.slots.get_mut(next) else {
                continue;
            };
            if !slot.dirty {
                continue;
            }
            slot.dirty = false;

            let value = self.evaluate(next);
            let writer = self.marked_by.get(&next).copied();
            let origin = match writer {
                Some(writer) => WriteOrigin::Propagation(writer),
                None => WriteOrigin::External,
            };
            self.write_settled(next, value, origin)?;
        }

        Ok(self.drain_changes())
    }

    /// Close the pass in flight, clearing its counters.
    pub fn finish_pass(&mut self) {
        self.pass = None;
        self.slot_seq.clear();
        self.marked_by.clear();
    }

    /// Pick the next dirty slot: the earliest-queued slot with no dirty
    /// dependency, falling back to the queue front for coupled pairs.
    fn pick_ready(&mut self) -> Option<SlotId> {
        if self.dirty_queue.is_empty() {
            return None;
        }
        let position = self
            .dirty_queue
            .iter()
            .position(|&id| {
                self.slots
                    .get(id)
                    .map(|slot| {
                        slot.reads
                            .iter()
                            .all(|&read| self.slots.get(read).map(|r| !r.dirty).unwrap_or(true))
                    })
                    .unwrap_or(true)
            })
            .unwrap_or(0);
        self.dirty_queue.remove(position)
    }

    /// Evaluate a slot's expression against the current graph.
    fn evaluate(&self, id: SlotId) -> Value {
        let Some(slot) = self.slots.get(id) else {
            return Value::Empty;
        };
        let Some(expression) = slot.expression.clone() else {
            return slot.value.clone();
        };
        let scope = ExprScope { graph: self };
        (expression.eval)(&scope)
    }

    /// Write a freshly evaluated value during a pass.
    ///
    /// Divergence aborts the pass; a mid-pass type mismatch leaves the slot
    /// at its last consistent value and the pass moves on.
    fn write_settled(
        &mut self,
        id: SlotId,
        value: Value,
        origin: WriteOrigin,
    ) -> BindingResult<()> {
        match self.set_value(id, value, origin) {
            Ok(()) => Ok(()),
            Err(err @ BindingError::Divergence { .. }) => Err(err),
            Err(err) => {
                tracing::warn!(
                    target: "trellis_core::binding",
                    ?id,
                    %err,
                    "skipping inconsistent write during propagation"
                );
                Ok(())
            }
        }
    }

    /// Abandon the pass: drop all pending work, keep settled values.
    fn abort_pass(&mut self) {
        for &id in &self.dirty_queue {
            if let Some(slot) = self.slots.get_mut(id) {
                slot.dirty = false;
            }
        }
        self.dirty_queue.clear();
        self.pending_changes.clear();
        self.pass = None;
        self.slot_seq.clear();
        self.marked_by.clear();
    }

    /// Take the settled changes, in dirty-marking order.
    fn drain_changes(&mut self) -> Vec<SlotChange> {
        self.pending_changes.sort_by_key(|(seq, _)| *seq);
        self.pending_changes
            .drain(..)
            .map(|(_, change)| change)
            .collect()
    }

    fn check_type(&self, id: SlotId, value: &Value) -> BindingResult<()> {
        let slot = self.slots.get(id).ok_or(BindingError::UnknownSlot)?;
        if value.conforms_to(slot.declared) {
            Ok(())
        } else {
            Err(BindingError::TypeMismatch {
                slot: slot.name.clone(),
                expected: slot.declared,
                got: value.value_type(),
            })
        }
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Remove a slot and every edge touching it.
    ///
    /// Pending dirty entries for the slot are cancelled: no propagation ever
    /// targets a removed slot.
    pub fn remove_slot(&mut self, id: SlotId) {
        if !self.slots.contains_key(id) {
            return;
        }
        self.unwire(id);
        let Some(slot) = self.slots.remove(id) else {
            return;
        };
        for dependent in slot.dependents {
            if let Some(target) = self.slots.get_mut(dependent) {
                target.reads.retain(|&r| r != id);
            }
        }
        for target in slot.reverse_targets {
            if let Some(target_slot) = self.slots.get_mut(target) {
                target_slot.reverse_source = None;
            }
        }
        self.dirty_queue.retain(|&d| d != id);
        self.pending_changes.retain(|(_, change)| change.slot != id);
        self.slot_seq.remove(&id);
        self.marked_by.remove(&id);
        tracing::trace!(target: "trellis_core::binding", ?id, slot = %slot.name, "removed slot");
    }

    /// Remove every slot owned by `owner`.
    pub fn remove_object(&mut self, owner: ObjectId) {
        let owned: Vec<SlotId> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.owner == owner)
            .map(|(id, _)| id)
            .collect();
        for id in owned {
            self.remove_slot(id);
        }
    }
}

impl Default for BindingGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectTree, TypeTag};

    fn owner(tree: &mut ObjectTree) -> ObjectId {
        tree.register(TypeTag::new("Field"))
    }

    /// Drain propagation to quiescence, panicking on divergence.
    fn settle(graph: &mut BindingGraph) -> Vec<SlotChange> {
        let changes = graph.run_pass().expect("propagation diverged");
        graph.finish_pass();
        changes
    }

    #[test]
    fn test_unbound_slot_stores_and_notifies() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let slot = graph.add_slot(obj, "text", ValueType::Str);
        graph
            .set_value(slot, Value::from("hello"), WriteOrigin::External)
            .unwrap();

        assert_eq!(graph.value(slot).unwrap(), Value::from("hello"));
        let changes = settle(&mut graph);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name, "text");
        assert_eq!(changes[0].value, Value::from("hello"));
    }

    #[test]
    fn test_unchanged_write_is_silent() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let slot = graph.add_slot(obj, "flag", ValueType::Bool);
        graph
            .set_value(slot, Value::Bool(true), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);

        graph
            .set_value(slot, Value::Bool(true), WriteOrigin::External)
            .unwrap();
        assert!(settle(&mut graph).is_empty());
    }

    #[test]
    fn test_type_mismatch_rejected_and_value_unchanged() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let slot = graph.add_slot(obj, "count", ValueType::Number);
        graph
            .set_value(slot, Value::from(3), WriteOrigin::External)
            .unwrap();

        let err = graph
            .set_value(slot, Value::from("three"), WriteOrigin::External)
            .unwrap_err();
        assert!(matches!(err, BindingError::TypeMismatch { .. }));
        assert_eq!(graph.value(slot).unwrap(), Value::from(3));
    }

    #[test]
    fn test_static_evaluates_once() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let source = graph.add_slot(obj, "source", ValueType::Number);
        graph
            .set_value(source, Value::from(10), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);

        let frozen = graph.add_slot(obj, "frozen", ValueType::Number);
        graph
            .declare(frozen, Some(Expression::slot(source)), BindingKind::Static)
            .unwrap();
        assert_eq!(graph.value(frozen).unwrap(), Value::from(10));

        // Mutating the source never touches the static slot again.
        graph
            .set_value(source, Value::from(99), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(frozen).unwrap(), Value::from(10));
    }

    #[test]
    fn test_forward_tracks_source_but_not_back() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let source = graph.add_slot(obj, "source", ValueType::Number);
        let target = graph.add_slot(obj, "target", ValueType::Number);
        graph
            .declare(target, Some(Expression::slot(source)), BindingKind::Forward)
            .unwrap();

        graph
            .set_value(source, Value::from(5), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(target).unwrap(), Value::from(5));

        // Writing the target directly never affects the source.
        graph
            .set_value(target, Value::from(42), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(source).unwrap(), Value::from(5));

        // The next source change overwrites the direct write.
        graph
            .set_value(source, Value::from(7), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(target).unwrap(), Value::from(7));
    }

    #[test]
    fn test_forward_computed_expression() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let a = graph.add_slot(obj, "a", ValueType::Number);
        let b = graph.add_slot(obj, "b", ValueType::Number);
        let sum = graph.add_slot(obj, "sum", ValueType::Number);
        graph
            .declare(
                sum,
                Some(Expression::compute(vec![a, b], move |scope| {
                    let left = scope.get(a).as_number().unwrap_or(0.0);
                    let right = scope.get(b).as_number().unwrap_or(0.0);
                    Value::Number(left + right)
                })),
                BindingKind::Forward,
            )
            .unwrap();

        graph.set_value(a, Value::from(2), WriteOrigin::External).unwrap();
        graph.set_value(b, Value::from(3), WriteOrigin::External).unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(sum).unwrap(), Value::from(5));
    }

    #[test]
    fn test_reverse_relays_writes_backward_only() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let model = graph.add_slot(obj, "model", ValueType::Number);
        let field = graph.add_slot(obj, "field", ValueType::Number);
        graph
            .declare(field, Some(Expression::slot(model)), BindingKind::Reverse)
            .unwrap();

        // Writes to the target land in the source.
        graph
            .set_value(field, Value::from(7), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(model).unwrap(), Value::from(7));

        // Source changes never overwrite the target.
        graph
            .set_value(model, Value::from(50), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(field).unwrap(), Value::from(7));
    }

    #[test]
    fn test_bidirectional_converges_from_either_side() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let model = graph.add_slot(obj, "model", ValueType::Number);
        let view = graph.add_slot(obj, "view", ValueType::Number);
        graph
            .declare(view, Some(Expression::slot(model)), BindingKind::Bidirectional)
            .unwrap();

        graph
            .set_value(model, Value::from(1), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(view).unwrap(), Value::from(1));

        graph
            .set_value(view, Value::from(2), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(model).unwrap(), Value::from(2));
        assert_eq!(graph.value(view).unwrap(), Value::from(2));
    }

    #[test]
    fn test_bidirectional_initializes_from_source() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let model = graph.add_slot(obj, "model", ValueType::Str);
        graph
            .set_value(model, Value::from("seed"), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);

        let view = graph.add_slot(obj, "view", ValueType::Str);
        graph
            .declare(view, Some(Expression::slot(model)), BindingKind::Bidirectional)
            .unwrap();
        assert_eq!(graph.value(view).unwrap(), Value::from("seed"));
    }

    #[test]
    fn test_cycle_rejected_at_declare() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let a = graph.add_slot(obj, "a", ValueType::Number);
        let b = graph.add_slot(obj, "b", ValueType::Number);
        let c = graph.add_slot(obj, "c", ValueType::Number);

        graph
            .declare(b, Some(Expression::slot(a)), BindingKind::Forward)
            .unwrap();
        graph
            .declare(c, Some(Expression::slot(b)), BindingKind::Forward)
            .unwrap();

        // Closing the loop a <- c is rejected before any propagation.
        let err = graph
            .declare(a, Some(Expression::slot(c)), BindingKind::Forward)
            .unwrap_err();
        assert_eq!(
            err,
            BindingError::Cycle {
                slot: "a".to_string()
            }
        );
        // The rejected declaration left no edges behind.
        assert_eq!(graph.kind(a).unwrap(), BindingKind::None);
    }

    #[test]
    fn test_mutual_bidirectional_pair_is_permitted() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let left = graph.add_slot(obj, "left", ValueType::Number);
        let right = graph.add_slot(obj, "right", ValueType::Number);

        graph
            .declare(right, Some(Expression::slot(left)), BindingKind::Bidirectional)
            .unwrap();
        // The mirror declaration is the coupled pair, not a rejected cycle.
        graph
            .declare(left, Some(Expression::slot(right)), BindingKind::Bidirectional)
            .unwrap();

        graph
            .set_value(left, Value::from(4), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(right).unwrap(), Value::from(4));

        graph
            .set_value(right, Value::from(9), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        assert_eq!(graph.value(left).unwrap(), Value::from(9));
    }

    #[test]
    fn test_divergence_bound_stops_runaway_feedback() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let a = graph.add_slot(obj, "a", ValueType::Number);
        let b = graph.add_slot(obj, "b", ValueType::Number);
        graph
            .declare(b, Some(Expression::slot(a)), BindingKind::Forward)
            .unwrap();

        // A feedback handler that bumps the source every time the target
        // settles never converges; the requeue bound must stop it within
        // one pass.
        graph
            .set_value(a, Value::from(0), WriteOrigin::External)
            .unwrap();
        let result = loop {
            let changes = match graph.run_pass() {
                Ok(changes) => changes,
                Err(err) => break Err(err),
            };
            if changes.is_empty() {
                break Ok(());
            }
            let mut feedback = Ok(());
            for change in &changes {
                if change.slot == b {
                    let n = change.value.as_number().unwrap_or(0.0);
                    feedback = graph.set_value(a, Value::Number(n + 1.0), WriteOrigin::External);
                    if feedback.is_err() {
                        break;
                    }
                }
            }
            if let Err(err) = feedback {
                break Err(err);
            }
        };
        graph.finish_pass();

        assert!(matches!(result, Err(BindingError::Divergence { .. })));
        // The graph is quiescent after the abort.
        assert!(!graph.has_dirty());
    }

    #[test]
    fn test_changes_arrive_in_marking_order() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let a = graph.add_slot(obj, "a", ValueType::Number);
        let b = graph.add_slot(obj, "b", ValueType::Number);
        let c = graph.add_slot(obj, "c", ValueType::Number);
        graph
            .declare(b, Some(Expression::slot(a)), BindingKind::Forward)
            .unwrap();
        graph
            .declare(c, Some(Expression::slot(b)), BindingKind::Forward)
            .unwrap();

        graph
            .set_value(a, Value::from(1), WriteOrigin::External)
            .unwrap();
        let changes = settle(&mut graph);
        let names: Vec<&str> = changes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_object_cancels_pending_work() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);
        let other = owner(&mut tree);

        let source = graph.add_slot(other, "source", ValueType::Number);
        let doomed = graph.add_slot(obj, "doomed", ValueType::Number);
        graph
            .declare(doomed, Some(Expression::slot(source)), BindingKind::Forward)
            .unwrap();

        graph
            .set_value(source, Value::from(1), WriteOrigin::External)
            .unwrap();
        // `doomed` is dirty; removing its owner cancels the pending work.
        graph.remove_object(obj);
        let changes = settle(&mut graph);
        assert!(changes.iter().all(|n| n.slot != doomed));
        assert!(!graph.contains(doomed));
        assert_eq!(graph.value(source).unwrap(), Value::from(1));
    }

    #[test]
    fn test_removed_source_reads_as_empty() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let source = graph.add_slot(obj, "source", ValueType::Any);
        let target = graph.add_slot(obj, "target", ValueType::Any);
        graph
            .declare(target, Some(Expression::slot(source)), BindingKind::Forward)
            .unwrap();

        graph
            .set_value(source, Value::from("x"), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        graph.remove_slot(source);

        // A later evaluation of the orphaned expression yields Empty rather
        // than dangling.
        assert_eq!(graph.evaluate(target), Value::Empty);
    }

    #[test]
    fn test_reverse_requires_single_source() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let a = graph.add_slot(obj, "a", ValueType::Number);
        let b = graph.add_slot(obj, "b", ValueType::Number);
        let fan_in = graph.add_slot(obj, "fan_in", ValueType::Number);

        let err = graph
            .declare(
                fan_in,
                Some(Expression::compute(vec![a, b], |_| Value::Empty)),
                BindingKind::Reverse,
            )
            .unwrap_err();
        assert!(matches!(err, BindingError::InvalidExpression { .. }));
    }

    #[test]
    fn test_rebinding_replaces_edges() {
        let mut tree = ObjectTree::new();
        let mut graph = BindingGraph::new();
        let obj = owner(&mut tree);

        let first = graph.add_slot(obj, "first", ValueType::Number);
        let second = graph.add_slot(obj, "second", ValueType::Number);
        let target = graph.add_slot(obj, "target", ValueType::Number);

        graph
            .declare(target, Some(Expression::slot(first)), BindingKind::Forward)
            .unwrap();
        graph
            .declare(target, Some(Expression::slot(second)), BindingKind::Forward)
            .unwrap();

        graph
            .set_value(first, Value::from(1), WriteOrigin::External)
            .unwrap();
        graph
            .set_value(second, Value::from(2), WriteOrigin::External)
            .unwrap();
        settle(&mut graph);
        // Only the second binding is live.
        assert_eq!(graph.value(target).unwrap(), Value::from(2));
    }
}
