//! Events dispatched through the runtime loop.
//!
//! Everything that reaches the declarative model from outside — input from
//! the rendering backend, geometry results from the layout solver, tasks
//! marshaled from other threads — arrives as a [`RuntimeEvent`] and is
//! processed to completion on the loop thread, highest priority first.

use std::fmt;

use trellis_core::ObjectId;

use crate::runtime::Runtime;

/// Priority levels for runtime events.
/// Higher priority events are processed first within the same turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum EventPriority {
    /// Lowest priority - deferred tasks, background work.
    Low = 0,
    /// Normal priority - layout results, wake-ups.
    #[default]
    Normal = 1,
    /// High priority - user input.
    High = 2,
    /// Critical priority - shutdown.
    Critical = 3,
}

/// The payload of one user-input event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputPayload {
    /// The primary activation gesture (a click, Enter, Space).
    Activate,
    /// A pointer interaction at window-relative coordinates.
    Pointer {
        /// Horizontal position.
        x: f64,
        /// Vertical position.
        y: f64,
    },
    /// A key press, as a backend keycode.
    Key {
        /// The backend keycode.
        code: u32,
    },
}

/// An input event from the rendering backend, tagged with its target.
///
/// Delivery is gated on the modality manager: events aimed at a blocked
/// object are discarded, not buffered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputEvent {
    /// The object the backend resolved the event to.
    pub target: ObjectId,
    /// What happened.
    pub payload: InputPayload,
}

impl InputEvent {
    /// An activation aimed at `target`.
    pub fn activate(target: ObjectId) -> Self {
        Self {
            target,
            payload: InputPayload::Activate,
        }
    }
}

/// A deferred task marshaled onto the loop thread.
pub struct TaskEnvelope(Box<dyn FnOnce(&mut Runtime) + Send>);

impl TaskEnvelope {
    /// Wrap a task for posting.
    pub fn new<F>(task: F) -> Self
    where
        F: FnOnce(&mut Runtime) + Send + 'static,
    {
        Self(Box::new(task))
    }

    /// Run the task on the loop thread.
    pub(crate) fn run(self, runtime: &mut Runtime) {
        (self.0)(runtime)
    }
}

impl fmt::Debug for TaskEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskEnvelope")
    }
}

/// Events processed by the runtime loop.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// An input event to route through the modality manager.
    Input(InputEvent),

    /// The layout solver finished resolving a container's geometry.
    LayoutResolved {
        /// The container whose geometry settled.
        target: ObjectId,
        /// Resolved width in pixels.
        width: f64,
        /// Resolved height in pixels.
        height: f64,
    },

    /// Execute a deferred task.
    Task(TaskEnvelope),

    /// Request to stop the loop.
    Quit,

    /// Wake the loop without carrying work.
    WakeUp,
}

impl RuntimeEvent {
    /// Get the priority of this event.
    pub fn priority(&self) -> EventPriority {
        match self {
            Self::Quit => EventPriority::Critical,
            Self::Input(_) => EventPriority::High,
            Self::LayoutResolved { .. } => EventPriority::Normal,
            Self::WakeUp => EventPriority::Normal,
            Self::Task(_) => EventPriority::Low,
        }
    }
}

/// A wrapper for prioritized events used in the internal queue.
#[derive(Debug)]
pub(crate) struct PrioritizedEvent {
    pub event: RuntimeEvent,
    pub priority: EventPriority,
    /// Sequence number for stable ordering of same-priority events.
    pub sequence: u64,
}

impl PrioritizedEvent {
    pub fn new(event: RuntimeEvent, sequence: u64) -> Self {
        let priority = event.priority();
        Self {
            event,
            priority,
            sequence,
        }
    }
}

impl PartialEq for PrioritizedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for PrioritizedEvent {}

impl PartialOrd for PrioritizedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first, then lower sequence (older) first.
        // Note: BinaryHeap is a max-heap, so higher priority must be "greater".
        match self.priority.cmp(&other.priority) {
            std::cmp::Ordering::Equal => other.sequence.cmp(&self.sequence),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn test_priorities() {
        assert_eq!(RuntimeEvent::Quit.priority(), EventPriority::Critical);
        assert_eq!(
            RuntimeEvent::Task(TaskEnvelope::new(|_| {})).priority(),
            EventPriority::Low
        );
        assert_eq!(RuntimeEvent::WakeUp.priority(), EventPriority::Normal);
    }

    #[test]
    fn test_heap_orders_by_priority_then_age() {
        let mut heap = BinaryHeap::new();
        heap.push(PrioritizedEvent::new(
            RuntimeEvent::Task(TaskEnvelope::new(|_| {})),
            0,
        ));
        heap.push(PrioritizedEvent::new(RuntimeEvent::WakeUp, 1));
        heap.push(PrioritizedEvent::new(RuntimeEvent::WakeUp, 2));
        heap.push(PrioritizedEvent::new(RuntimeEvent::Quit, 3));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.sequence)).collect();
        // Quit first, then the wake-ups oldest-first, the task last.
        assert_eq!(order, vec![3, 1, 2, 0]);
    }
}
