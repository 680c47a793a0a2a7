//! The declarative object tree.
//!
//! Every instantiated component — a window, a container, a control — is a
//! [`DeclarativeObject`] node in an arena-backed ownership tree:
//!
//! - Stable identities via arena storage ([`ObjectId`])
//! - Parent-child ownership with depth-first cascade destruction
//! - Lifecycle states observable for the whole life of the process
//! - Capability-tagged component kinds instead of a class hierarchy
//!
//! Parent links are non-owning lookups into the arena; the child list is the
//! sole ownership edge. Attribute slots are stored in the binding graph and
//! referenced here by [`SlotId`] only.
//!
//! # Key Types
//!
//! - [`ObjectTree`] - The arena holding every object
//! - [`ObjectId`] - Stable identifier for one object
//! - [`TypeTag`] / [`Capabilities`] - Component kind and what it can do
//! - [`LifecycleState`] - Where an object is in its life

use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;

use slotmap::{SlotMap, new_key_type};

use crate::binding::SlotId;
use crate::error::{ObjectError, ObjectResult};

new_key_type! {
    /// A unique identifier for a declarative object.
    ///
    /// `ObjectId`s are stable handles that remain valid for the lifetime of
    /// the process; after destruction they resolve to a tombstone in the
    /// [`LifecycleState::Destroyed`] state rather than dangling.
    pub struct ObjectId;
}

impl ObjectId {
    /// Convert the ObjectId to a raw u64 value.
    ///
    /// Useful for interop with layers that need a numeric identity (the
    /// rendering backend tags input events this way). The raw value can be
    /// converted back using [`ObjectId::from_raw`].
    #[inline]
    pub fn as_raw(self) -> u64 {
        use slotmap::Key;
        self.data().as_ffi()
    }

    /// Create an ObjectId from a raw u64 value.
    ///
    /// Note: this does not check that the object exists in any tree.
    #[inline]
    pub fn from_raw(raw: u64) -> Option<Self> {
        let key_data = slotmap::KeyData::from_ffi(raw);
        Some(Self::from(key_data))
    }
}

/// What a component kind is able to do.
///
/// Capabilities replace deep widget inheritance: behavior is dispatched via
/// explicit checks against this set, never via a class hierarchy.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No capabilities.
    pub const NONE: Self = Self(0);
    /// The component carries a user-visible title attribute.
    pub const HAS_TITLE: Self = Self(1 << 0);
    /// The component is a top-level window that can be shown, possibly modal.
    pub const HAS_MODALITY: Self = Self(1 << 1);
    /// The component may own child components.
    pub const IS_CONTAINER: Self = Self(1 << 2);

    /// Whether every flag in `other` is present in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flags are set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();
        if self.contains(Self::HAS_TITLE) {
            flags.push("HAS_TITLE");
        }
        if self.contains(Self::HAS_MODALITY) {
            flags.push("HAS_MODALITY");
        }
        if self.contains(Self::IS_CONTAINER) {
            flags.push("IS_CONTAINER");
        }
        if flags.is_empty() {
            f.write_str("NONE")
        } else {
            f.write_str(&flags.join(" | "))
        }
    }
}

/// The kind of a component: a name plus the capability set it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeTag {
    name: String,
    capabilities: Capabilities,
}

impl TypeTag {
    /// Create a tag for a component kind with no capabilities.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: Capabilities::NONE,
        }
    }

    /// Add capabilities to the tag.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = self.capabilities | capabilities;
        self
    }

    /// The component kind name (e.g. `"Window"`, `"PushButton"`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The capability set this kind declares.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

/// Where an object is in its life.
///
/// States advance monotonically; `Destroyed` is terminal and the tombstone
/// remains queryable for the rest of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Allocated, attributes still being declared.
    Constructing,
    /// Fully constructed and participating in binding propagation.
    Live,
    /// Teardown has begun; the subtree is on its way out.
    Destroying,
    /// Torn down. The object holds no children and no slots.
    Destroyed,
}

/// Internal per-object storage.
struct ObjectData {
    /// Instance name for lookup and debugging (distinct from the kind name).
    name: String,
    /// The component kind.
    tag: TypeTag,
    /// Parent object, if owned (non-owning back-reference).
    parent: Option<ObjectId>,
    /// Child objects, in order (the owning edges).
    children: Vec<ObjectId>,
    /// Attribute slots by name; the slots themselves live in the graph.
    slots: HashMap<String, SlotId>,
    /// Lifecycle state.
    state: LifecycleState,
}

/// An object and the slots it owned, as reported by [`ObjectTree::destroy`].
///
/// Destruction reports are consumed by the runtime to purge the binding
/// graph, session, and modality stack for each torn-down object.
#[derive(Debug)]
pub struct DestroyedObject {
    /// The destroyed object.
    pub id: ObjectId,
    /// The slots it owned at teardown time.
    pub slots: Vec<SlotId>,
}

/// The arena of declarative objects and their ownership relations.
///
/// All mutation happens on the dispatch thread; the tree is deliberately a
/// plain single-writer structure. Shared access is mediated by the runtime's
/// handle, not by this type.
pub struct ObjectTree {
    objects: SlotMap<ObjectId, ObjectData>,
}

impl ObjectTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            objects: SlotMap::with_key(),
        }
    }

    /// Allocate a new object in the `Constructing` state.
    ///
    /// The object has no parent and no slots yet; callers link and populate
    /// it, then call [`mark_live`](Self::mark_live).
    pub fn register(&mut self, tag: TypeTag) -> ObjectId {
        let kind = tag.name.clone();
        let id = self.objects.insert(ObjectData {
            name: String::new(),
            tag,
            parent: None,
            children: Vec::new(),
            slots: HashMap::new(),
            state: LifecycleState::Constructing,
        });
        tracing::trace!(target: "trellis_core::object", ?id, %kind, "registered object");
        id
    }

    /// Transition a constructing object to `Live`.
    pub fn mark_live(&mut self, id: ObjectId) -> ObjectResult<()> {
        let data = self.data_mut(id)?;
        if data.state != LifecycleState::Constructing {
            return Err(ObjectError::Destroyed);
        }
        data.state = LifecycleState::Live;
        Ok(())
    }

    /// Whether `id` resolves to an object (live or tombstoned).
    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// Whether `id` resolves to an object that has not begun destruction.
    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.objects.get(id).is_some_and(|d| {
            matches!(d.state, LifecycleState::Constructing | LifecycleState::Live)
        })
    }

    /// The lifecycle state of an object.
    pub fn state(&self, id: ObjectId) -> ObjectResult<LifecycleState> {
        self.objects
            .get(id)
            .map(|d| d.state)
            .ok_or(ObjectError::InvalidObjectId)
    }

    /// The component kind of an object.
    pub fn type_tag(&self, id: ObjectId) -> ObjectResult<&TypeTag> {
        self.objects
            .get(id)
            .map(|d| &d.tag)
            .ok_or(ObjectError::InvalidObjectId)
    }

    /// The capability set of an object's kind.
    pub fn capabilities(&self, id: ObjectId) -> ObjectResult<Capabilities> {
        self.type_tag(id).map(TypeTag::capabilities)
    }

    /// The instance name of an object.
    pub fn object_name(&self, id: ObjectId) -> ObjectResult<&str> {
        self.objects
            .get(id)
            .map(|d| d.name.as_str())
            .ok_or(ObjectError::InvalidObjectId)
    }

    /// Set the instance name of an object.
    pub fn set_object_name(&mut self, id: ObjectId, name: impl Into<String>) -> ObjectResult<()> {
        self.data_mut(id).map(|d| d.name = name.into())
    }

    // =========================================================================
    // Ownership
    // =========================================================================

    /// Set the parent of an object.
    ///
    /// Handles removal from the old parent and appending to the new parent's
    /// child list. Passing `None` makes the object a free root. The new
    /// parent must be alive, must declare [`Capabilities::IS_CONTAINER`], and
    /// must not be a descendant of `id`.
    pub fn set_parent(&mut self, id: ObjectId, new_parent: Option<ObjectId>) -> ObjectResult<()> {
        if !self.is_alive(id) {
            return Err(if self.contains(id) {
                ObjectError::Destroyed
            } else {
                ObjectError::InvalidObjectId
            });
        }

        if let Some(parent_id) = new_parent {
            if !self.is_alive(parent_id) {
                return Err(if self.contains(parent_id) {
                    ObjectError::Destroyed
                } else {
                    ObjectError::InvalidObjectId
                });
            }
            let parent_caps = self.capabilities(parent_id)?;
            if !parent_caps.contains(Capabilities::IS_CONTAINER) {
                return Err(ObjectError::MissingCapability {
                    type_tag: self.type_tag(parent_id)?.name().to_string(),
                    capability: "IS_CONTAINER",
                });
            }
            if self.is_ancestor_of(id, parent_id)? {
                return Err(ObjectError::CircularParentage);
            }
        }

        let old_parent = self.objects.get(id).and_then(|d| d.parent);
        if let Some(old_parent_id) = old_parent {
            if let Some(parent_data) = self.objects.get_mut(old_parent_id) {
                parent_data.children.retain(|&child| child != id);
            }
        }

        if let Some(data) = self.objects.get_mut(id) {
            data.parent = new_parent;
        }

        if let Some(parent_id) = new_parent {
            if let Some(parent_data) = self.objects.get_mut(parent_id) {
                parent_data.children.push(id);
            }
        }

        Ok(())
    }

    /// The parent of an object, if it has one.
    pub fn parent(&self, id: ObjectId) -> ObjectResult<Option<ObjectId>> {
        self.objects
            .get(id)
            .map(|d| d.parent)
            .ok_or(ObjectError::InvalidObjectId)
    }

    /// The children of an object, in order.
    pub fn children(&self, id: ObjectId) -> ObjectResult<&[ObjectId]> {
        self.objects
            .get(id)
            .map(|d| d.children.as_slice())
            .ok_or(ObjectError::InvalidObjectId)
    }

    /// All ancestors of an object, immediate parent first.
    pub fn ancestors(&self, id: ObjectId) -> ObjectResult<Vec<ObjectId>> {
        if !self.contains(id) {
            return Err(ObjectError::InvalidObjectId);
        }
        let mut result = Vec::new();
        let mut current = self.objects.get(id).and_then(|d| d.parent);
        while let Some(current_id) = current {
            result.push(current_id);
            current = self.objects.get(current_id).and_then(|d| d.parent);
        }
        Ok(result)
    }

    /// Check if `potential_ancestor` is an ancestor of `id`.
    pub fn is_ancestor_of(
        &self,
        potential_ancestor: ObjectId,
        id: ObjectId,
    ) -> ObjectResult<bool> {
        let mut current = Some(id);
        while let Some(current_id) = current {
            if current_id == potential_ancestor {
                return Ok(true);
            }
            current = self.objects.get(current_id).and_then(|d| d.parent);
        }
        Ok(false)
    }

    /// Whether `id` lies inside the subtree rooted at `root` (inclusive).
    pub fn is_in_subtree(&self, root: ObjectId, id: ObjectId) -> bool {
        id == root || self.is_ancestor_of(root, id).unwrap_or(false)
    }

    /// Find a direct child by instance name.
    pub fn find_child_by_name(&self, id: ObjectId, name: &str) -> ObjectResult<Option<ObjectId>> {
        let children = self.children(id)?;
        for &child_id in children {
            if let Some(data) = self.objects.get(child_id) {
                if data.name == name {
                    return Ok(Some(child_id));
                }
            }
        }
        Ok(None)
    }

    /// Depth-first pre-order traversal: the node, then each child subtree.
    pub fn depth_first_preorder(&self, id: ObjectId) -> ObjectResult<Vec<ObjectId>> {
        let mut result = Vec::new();
        self.preorder_recursive(id, &mut result)?;
        Ok(result)
    }

    fn preorder_recursive(&self, id: ObjectId, result: &mut Vec<ObjectId>) -> ObjectResult<()> {
        let data = self.objects.get(id).ok_or(ObjectError::InvalidObjectId)?;
        result.push(id);
        for &child_id in &data.children {
            self.preorder_recursive(child_id, result)?;
        }
        Ok(())
    }

    /// Depth-first post-order traversal: child subtrees, then the node.
    ///
    /// This is the destruction order.
    pub fn depth_first_postorder(&self, id: ObjectId) -> ObjectResult<Vec<ObjectId>> {
        let mut result = Vec::new();
        self.postorder_recursive(id, &mut result)?;
        Ok(result)
    }

    fn postorder_recursive(&self, id: ObjectId, result: &mut Vec<ObjectId>) -> ObjectResult<()> {
        let data = self.objects.get(id).ok_or(ObjectError::InvalidObjectId)?;
        for &child_id in &data.children {
            self.postorder_recursive(child_id, result)?;
        }
        result.push(id);
        Ok(())
    }

    /// Iterate over all live root objects (objects with no parent).
    pub fn root_objects(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.objects
            .iter()
            .filter(|(_, data)| {
                data.parent.is_none()
                    && matches!(
                        data.state,
                        LifecycleState::Constructing | LifecycleState::Live
                    )
            })
            .map(|(id, _)| id)
    }

    /// The number of objects that have not been destroyed.
    pub fn live_count(&self) -> usize {
        self.objects
            .values()
            .filter(|d| !matches!(d.state, LifecycleState::Destroyed))
            .count()
    }

    // =========================================================================
    // Slots
    // =========================================================================

    /// Record a named slot on an object.
    ///
    /// Returns `false` if a slot with this name already exists (names are
    /// unique within one owner).
    pub fn insert_slot(&mut self, id: ObjectId, name: &str, slot: SlotId) -> ObjectResult<bool> {
        let data = self.data_mut(id)?;
        if data.slots.contains_key(name) {
            return Ok(false);
        }
        data.slots.insert(name.to_string(), slot);
        Ok(true)
    }

    /// Look up a slot by name.
    pub fn slot(&self, id: ObjectId, name: &str) -> ObjectResult<Option<SlotId>> {
        self.objects
            .get(id)
            .map(|d| d.slots.get(name).copied())
            .ok_or(ObjectError::InvalidObjectId)
    }

    /// The names of all slots on an object.
    pub fn slot_names(&self, id: ObjectId) -> ObjectResult<Vec<&str>> {
        self.objects
            .get(id)
            .map(|d| d.slots.keys().map(String::as_str).collect())
            .ok_or(ObjectError::InvalidObjectId)
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Tear down an object and every descendant, depth-first.
    ///
    /// Returns the destruction report in post-order (children before
    /// parents) so callers can purge slots and deregistrations per object.
    /// Destroying an unknown or already-destroyed object returns an empty
    /// report; destruction is idempotent and never fails.
    ///
    /// The whole subtree is moved to `Destroying` before the first object is
    /// finalized, so destruction is never observable as partial: either the
    /// root has not begun, or every descendant is on its way out.
    #[tracing::instrument(skip(self), target = "trellis_core::object", level = "trace")]
    pub fn destroy(&mut self, id: ObjectId) -> Vec<DestroyedObject> {
        let Some(data) = self.objects.get(id) else {
            return Vec::new();
        };
        if matches!(
            data.state,
            LifecycleState::Destroying | LifecycleState::Destroyed
        ) {
            return Vec::new();
        }

        let order = match self.depth_first_postorder(id) {
            Ok(order) => order,
            Err(_) => {
                // A dangling child edge mid-teardown; salvage the node itself.
                tracing::warn!(
                    target: "trellis_core::object",
                    ?id,
                    "inconsistent subtree during destruction, tearing down root only"
                );
                vec![id]
            }
        };
        tracing::trace!(
            target: "trellis_core::object",
            ?id,
            descendant_count = order.len() - 1,
            "destroying object tree"
        );

        // Detach from the owner before the subtree starts going down.
        if let Some(parent_id) = self.objects.get(id).and_then(|d| d.parent) {
            if let Some(parent_data) = self.objects.get_mut(parent_id) {
                parent_data.children.retain(|&child| child != id);
            }
        }

        for &member in &order {
            if let Some(data) = self.objects.get_mut(member) {
                data.state = LifecycleState::Destroying;
            }
        }

        let mut report = Vec::with_capacity(order.len());
        for member in order {
            if let Some(data) = self.objects.get_mut(member) {
                let slots = data.slots.drain().map(|(_, slot)| slot).collect();
                data.children.clear();
                data.parent = None;
                data.state = LifecycleState::Destroyed;
                report.push(DestroyedObject { id: member, slots });
            }
        }
        report
    }

    fn data_mut(&mut self, id: ObjectId) -> ObjectResult<&mut ObjectData> {
        self.objects.get_mut(id).ok_or(ObjectError::InvalidObjectId)
    }
}

impl Default for ObjectTree {
    fn default() -> Self {
        Self::new()
    }
}
