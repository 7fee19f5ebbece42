// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edge definitions for the graph.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for an edge.
///
/// Edge ids are drawn from the same counter as node ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u32);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Edge classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EdgeKind {
    /// Wiring between a UI node's pins and its identity node
    Internal = 0,
    /// User-drawn link between two UI nodes' pins
    External = 1,
}

impl EdgeKind {
    /// Integer tag used by the text format
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Look up a kind from its integer tag
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Internal),
            1 => Some(Self::External),
            _ => None,
        }
    }
}

/// A directed edge between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge ID
    pub id: EdgeId,
    /// Source node
    pub from: NodeId,
    /// Target node
    pub to: NodeId,
    /// Edge kind
    pub kind: EdgeKind,
}

impl Edge {
    /// Check if this edge touches a specific node
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.from == node_id || self.to == node_id
    }

    /// Whether this is a user-drawn link
    pub fn is_external(&self) -> bool {
        self.kind == EdgeKind::External
    }
}
