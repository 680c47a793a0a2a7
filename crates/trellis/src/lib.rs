//! Trellis: a declarative UI object model.
//!
//! This crate carries the windowing layer of the model — everything above the
//! object tree and binding graph provided by `trellis-core`:
//!
//! - **Session**: the explicit registry owning top-level windows; removing a
//!   root destroys it, shutdown destroys them all in registration order
//! - **Modality**: the stack of visible modal windows and the input-blocking
//!   decisions it implies; blocked events are discarded, never queued
//! - **Window lifecycle**: show/close cycles with accepted/rejected results
//!   delivered through continuations, never through a blocking return
//! - **Runtime**: the facade the markup-compiled layer drives — construct,
//!   destroy, bind, read, write, and route input — plus the event loop seam
//!   that marshals cross-thread work onto the single dispatch thread
//!
//! # End-to-end Example
//!
//! ```
//! use trellis::{AttrSpec, CloseResult, Modality, Runtime};
//! use trellis_core::{Capabilities, TypeTag, Value, ValueType};
//!
//! let mut rt = Runtime::new();
//! let window_kind = TypeTag::new("Window")
//!     .with_capabilities(Capabilities::HAS_MODALITY | Capabilities::IS_CONTAINER);
//!
//! let main = rt.construct(window_kind.clone(), None, vec![]).unwrap();
//! rt.add_window(main).unwrap();
//!
//! // A confirm dialog owned by the main window, shown application-modal.
//! let dialog = rt
//!     .construct(
//!         window_kind,
//!         Some(main),
//!         vec![AttrSpec::new("title", ValueType::Str).with_initial(Value::from("Confirm"))],
//!     )
//!     .unwrap();
//! rt.show(dialog, Modality::ApplicationModal).unwrap();
//!
//! // `show` returned immediately; the result arrives via a close handler.
//! rt.on_close(dialog, |_, result| {
//!     assert!(result.is_accepted());
//! })
//! .unwrap();
//!
//! assert!(rt.is_input_blocked(main));
//! rt.close(dialog, CloseResult::Accepted).unwrap();
//! assert!(!rt.is_input_blocked(main));
//! ```

pub mod error;
pub mod event;
pub mod modality;
pub mod runtime;
pub mod session;
pub mod window;

pub use error::{Error, Result};
pub use event::{EventPriority, InputEvent, InputPayload, RuntimeEvent};
pub use modality::{ModalScope, ModalityManager};
pub use runtime::{AttrSpec, Runtime, RuntimeHandle};
pub use session::Session;
pub use window::{CloseResult, Modality, WindowState};

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::event::{InputEvent, InputPayload};
    pub use crate::runtime::{AttrSpec, Runtime, RuntimeHandle};
    pub use crate::window::{CloseResult, Modality};
    pub use trellis_core::{
        BindingKind, Capabilities, Expression, LifecycleState, ObjectId, TypeTag, Value, ValueType,
    };
}
