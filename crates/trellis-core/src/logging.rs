//! Logging and debugging facilities.
//!
//! Trellis uses the `tracing` crate for instrumentation. To see logs, install
//! a subscriber in the host application:
//!
//! ```ignore
//! tracing_subscriber::fmt::init();
//! ```
//!
//! This module also provides debug visualization for the declarative object
//! tree, used in teardown diagnostics and tests:
//!
//! ```
//! use trellis_core::logging::{TreeFormatOptions, format_tree};
//! use trellis_core::{ObjectTree, TypeTag};
//!
//! let mut tree = ObjectTree::new();
//! let root = tree.register(TypeTag::new("Window"));
//! let dump = format_tree(&tree, root, &TreeFormatOptions::default());
//! assert!(dump.contains("Window"));
//! ```

use std::fmt::Write as _;

use crate::object::{ObjectId, ObjectTree};

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "trellis_core";
    /// Object tree target.
    pub const OBJECT: &str = "trellis_core::object";
    /// Binding graph target.
    pub const BINDING: &str = "trellis_core::binding";
    /// Session registry target.
    pub const SESSION: &str = "trellis::session";
    /// Modality manager target.
    pub const MODALITY: &str = "trellis::modality";
    /// Runtime dispatch target.
    pub const RUNTIME: &str = "trellis::runtime";
}

/// Style options for object tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
}

/// Configuration for object tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show object IDs.
    pub show_ids: bool,
    /// Whether to show lifecycle states.
    pub show_states: bool,
    /// Whether to list slot names.
    pub show_slots: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_states: true,
            show_slots: false,
            max_depth: None,
        }
    }
}

/// Render the subtree under `root` as an indented tree.
///
/// Unknown IDs render as a single `<invalid>` line rather than failing;
/// this is a diagnostic surface and stays total.
pub fn format_tree(tree: &ObjectTree, root: ObjectId, options: &TreeFormatOptions) -> String {
    let mut output = String::new();
    format_node(tree, root, options, "", true, 0, &mut output);
    output
}

fn format_node(
    tree: &ObjectTree,
    id: ObjectId,
    options: &TreeFormatOptions,
    prefix: &str,
    is_last: bool,
    depth: usize,
    output: &mut String,
) {
    let (branch, continuation) = match (depth, options.style) {
        (0, _) => ("", ""),
        (_, TreeStyle::Unicode) if is_last => ("└─ ", "   "),
        (_, TreeStyle::Unicode) => ("├─ ", "│  "),
        (_, TreeStyle::Ascii) if is_last => ("`- ", "   "),
        (_, TreeStyle::Ascii) => ("|- ", "|  "),
    };

    let Ok(tag) = tree.type_tag(id) else {
        let _ = writeln!(output, "{prefix}{branch}<invalid>");
        return;
    };

    let _ = write!(output, "{prefix}{branch}{}", tag.name());
    if let Ok(name) = tree.object_name(id) {
        if !name.is_empty() {
            let _ = write!(output, " '{name}'");
        }
    }
    if options.show_ids {
        let _ = write!(output, " #{}", id.as_raw());
    }
    if options.show_states {
        if let Ok(state) = tree.state(id) {
            let _ = write!(output, " [{state:?}]");
        }
    }
    if options.show_slots {
        if let Ok(mut names) = tree.slot_names(id) {
            names.sort_unstable();
            if !names.is_empty() {
                let _ = write!(output, " {{{}}}", names.join(", "));
            }
        }
    }
    output.push('\n');

    if let Some(max) = options.max_depth {
        if depth >= max {
            return;
        }
    }

    let children: Vec<ObjectId> = tree.children(id).map(<[_]>::to_vec).unwrap_or_default();
    let child_prefix = format!("{prefix}{continuation}");
    for (index, child) in children.iter().enumerate() {
        let last = index + 1 == children.len();
        format_node(tree, *child, options, &child_prefix, last, depth + 1, output);
    }
}
