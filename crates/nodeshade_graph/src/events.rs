// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural events and the observer bus that delivers them.
//!
//! The graph records events into an outbox while it mutates; the editor
//! drains that outbox after each operation and hands every event to the
//! bus. Observers reacting to an event may mutate the graph again, which
//! only appends to the outbox, so no graph operation is ever re-entered.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// Observer key: the identity node of the UI node that listens
pub type ObserverId = NodeId;

/// Event published on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphEvent {
    /// An external edge was created
    LinkCreated {
        /// Edge source (the consuming input pin)
        from: NodeId,
        /// Edge target (the producing output pin)
        to: NodeId,
    },
    /// An external edge was erased
    LinkDeleted {
        /// Edge source (the consuming input pin)
        from: NodeId,
        /// Edge target (the producing output pin)
        to: NodeId,
    },
    /// A shader was reloaded and its bindings may have changed
    ShaderUpdated {
        /// Shader index
        index: i32,
    },
}

/// Ordered set of observers
#[derive(Debug, Default, Clone)]
pub struct EventBus {
    observers: Vec<ObserverId>,
}

impl EventBus {
    /// Create a new bus with no observers
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an observer. Attaching twice is a no-op.
    pub fn attach(&mut self, observer: ObserverId) -> bool {
        if self.observers.contains(&observer) {
            tracing::warn!("Observer {observer} is already attached");
            return false;
        }
        self.observers.push(observer);
        true
    }

    /// Detach an observer. Detaching an unknown observer is a no-op.
    pub fn detach(&mut self, observer: ObserverId) -> bool {
        let Some(position) = self.observers.iter().position(|o| *o == observer) else {
            tracing::warn!("Observer {observer} is not attached");
            return false;
        };
        self.observers.remove(position);
        true
    }

    /// Whether an observer is attached
    pub fn is_attached(&self, observer: ObserverId) -> bool {
        self.observers.contains(&observer)
    }

    /// Attached observers in attachment order
    pub fn observers(&self) -> &[ObserverId] {
        &self.observers
    }

    /// Deliver `event` to every observer, in attachment order
    pub fn notify<F>(&self, event: &GraphEvent, mut deliver: F)
    where
        F: FnMut(ObserverId, &GraphEvent),
    {
        for observer in &self.observers {
            deliver(*observer, event);
        }
    }

    /// Drop every observer
    pub fn clear(&mut self) {
        self.observers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_is_idempotent() {
        let mut bus = EventBus::new();
        assert!(bus.attach(NodeId(1)));
        assert!(!bus.attach(NodeId(1)));
        assert_eq!(bus.observers(), &[NodeId(1)]);
    }

    #[test]
    fn test_detach_unknown_is_noop() {
        let mut bus = EventBus::new();
        bus.attach(NodeId(1));
        assert!(!bus.detach(NodeId(2)));
        assert!(bus.detach(NodeId(1)));
        assert!(bus.observers().is_empty());
    }

    #[test]
    fn test_notify_in_attachment_order() {
        let mut bus = EventBus::new();
        bus.attach(NodeId(3));
        bus.attach(NodeId(1));
        bus.attach(NodeId(2));

        let event = GraphEvent::ShaderUpdated { index: 0 };
        let mut seen = Vec::new();
        bus.notify(&event, |observer, e| {
            assert_eq!(*e, event);
            seen.push(observer);
        });
        assert_eq!(seen, vec![NodeId(3), NodeId(1), NodeId(2)]);
    }
}
