//! Core systems for Trellis.
//!
//! This crate provides the foundational components of the Trellis declarative
//! object model:
//!
//! - **Object Tree**: arena-backed parent-child ownership with lifecycle
//!   states and depth-first cascade destruction
//! - **Binding Graph**: attribute slots with static, forward, reverse, and
//!   bidirectional bindings, propagated in deterministic dependency order
//! - **Value Model**: a closed, type-checked sum type for attribute values
//! - **Signals**: direct, synchronous change-notification plumbing
//! - **Logging**: `tracing` targets and object-tree debug visualization
//!
//! The windowing layer — sessions, modality, the runtime facade — lives in
//! the `trellis` crate and is built on top of these types.
//!
//! # Binding Example
//!
//! ```
//! use trellis_core::{
//!     BindingGraph, BindingKind, Expression, ObjectTree, TypeTag, Value, ValueType, WriteOrigin,
//! };
//!
//! let mut tree = ObjectTree::new();
//! let mut graph = BindingGraph::new();
//!
//! let field = tree.register(TypeTag::new("Field"));
//! let source = graph.add_slot(field, "source", ValueType::Number);
//! let mirror = graph.add_slot(field, "mirror", ValueType::Number);
//! graph
//!     .declare(mirror, Some(Expression::slot(source)), BindingKind::Forward)
//!     .unwrap();
//!
//! graph
//!     .set_value(source, Value::from(3), WriteOrigin::External)
//!     .unwrap();
//! graph.run_pass().unwrap();
//! graph.finish_pass();
//!
//! assert_eq!(graph.value(mirror).unwrap(), Value::from(3));
//! ```
//!
//! # Ownership Example
//!
//! ```
//! use trellis_core::{Capabilities, LifecycleState, ObjectTree, TypeTag};
//!
//! let mut tree = ObjectTree::new();
//! let window = tree.register(
//!     TypeTag::new("Window").with_capabilities(Capabilities::IS_CONTAINER),
//! );
//! let button = tree.register(TypeTag::new("PushButton"));
//! tree.set_parent(button, Some(window)).unwrap();
//!
//! // Destroying the window takes the button with it, child first.
//! let report = tree.destroy(window);
//! assert_eq!(report.len(), 2);
//! assert_eq!(tree.state(button).unwrap(), LifecycleState::Destroyed);
//! ```

pub mod binding;
mod error;
pub mod logging;
pub mod object;
pub mod signal;
pub mod value;

pub use binding::{
    BindingGraph, BindingKind, ExprScope, Expression, SlotChange, SlotId, WriteOrigin,
};
pub use error::{BindingError, BindingResult, ObjectError, ObjectResult};
pub use logging::{TreeFormatOptions, TreeStyle, format_tree};
pub use object::{
    Capabilities, DestroyedObject, LifecycleState, ObjectId, ObjectTree, TypeTag,
};
pub use signal::{HandlerGuard, HandlerId, Signal};
pub use value::{Value, ValueType};
