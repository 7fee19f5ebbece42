// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and directed edges.
//!
//! Every node id has an entry in three side tables (the node record, its
//! out-degree and its outgoing neighbor list). Edges are keyed by their own
//! id. Node and edge ids come from one monotonically increasing counter and
//! are never reused.

use crate::edge::{Edge, EdgeId, EdgeKind};
use crate::events::GraphEvent;
use crate::id_map::IdMap;
use crate::node::{Node, NodeId};
use std::collections::{HashSet, VecDeque};

/// Structural errors: references to ids that do not exist (or already do)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Edge not found
    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// Id already in use
    #[error("Id already in use: {0}")]
    DuplicateId(u32),

    /// Every id below `u32::MAX` has been issued
    #[error("Id space exhausted")]
    IdSpaceExhausted,
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

/// A directed graph over stable integer ids
#[derive(Debug, Clone, Default)]
pub struct Graph {
    next_id: u32,
    nodes: IdMap<NodeId, Node>,
    out_degree: IdMap<NodeId, usize>,
    neighbors: IdMap<NodeId, Vec<NodeId>>,
    edges: IdMap<EdgeId, Edge>,
    /// Events recorded by mutations, waiting to be dispatched
    outbox: VecDeque<GraphEvent>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// `u32::MAX` is never issued, so the counter itself cannot wrap
    fn allocate_id(&mut self) -> Result<u32> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(GraphError::IdSpaceExhausted)?;
        Ok(id)
    }

    /// Counter value after restoring `id`
    fn successor(id: u32) -> Result<u32> {
        id.checked_add(1).ok_or(GraphError::IdSpaceExhausted)
    }

    /// Add a node, returning its freshly issued id
    pub fn create_node(&mut self, node: Node) -> Result<NodeId> {
        let id = NodeId(self.allocate_id()?);
        let (_, inserted) = self.nodes.insert(id, node);
        debug_assert!(inserted, "node id {id} issued twice");
        self.out_degree.insert(id, 0);
        self.neighbors.insert(id, Vec::new());
        Ok(id)
    }

    /// Add a directed edge between two existing nodes
    pub fn create_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> Result<EdgeId> {
        if !self.nodes.contains(from) {
            return Err(GraphError::NodeNotFound(from));
        }
        if !self.nodes.contains(to) {
            return Err(GraphError::NodeNotFound(to));
        }

        let id = EdgeId(self.allocate_id()?);
        self.edges.insert(id, Edge { id, from, to, kind });
        if let Some(neighbors) = self.neighbors.get_mut(from) {
            neighbors.push(to);
        }
        if let Some(degree) = self.out_degree.get_mut(from) {
            *degree += 1;
        }

        if kind == EdgeKind::External {
            tracing::debug!("Link {id} created: {from} -> {to}");
            self.outbox.push_back(GraphEvent::LinkCreated { from, to });
        }
        Ok(id)
    }

    /// Remove a node and every edge touching it
    pub fn erase_node(&mut self, id: NodeId) -> Result<Node> {
        if !self.nodes.contains(id) {
            return Err(GraphError::NodeNotFound(id));
        }

        let touching: Vec<EdgeId> = self
            .edges
            .values()
            .iter()
            .filter(|e| e.contains(id))
            .map(|e| e.id)
            .collect();
        for edge_id in touching {
            self.erase_edge(edge_id)?;
        }

        self.out_degree.erase(id);
        self.neighbors.erase(id);
        self.nodes.remove(id).ok_or(GraphError::NodeNotFound(id))
    }

    /// Remove an edge.
    ///
    /// Only the first matching entry is removed from the source's neighbor
    /// list, so parallel edges are erased one per call.
    pub fn erase_edge(&mut self, id: EdgeId) -> Result<Edge> {
        let edge = self.edges.remove(id).ok_or(GraphError::EdgeNotFound(id))?;

        if let Some(degree) = self.out_degree.get_mut(edge.from) {
            *degree = degree.saturating_sub(1);
        }
        if let Some(neighbors) = self.neighbors.get_mut(edge.from) {
            if let Some(position) = neighbors.iter().position(|n| *n == edge.to) {
                neighbors.remove(position);
            }
        }

        if edge.is_external() {
            tracing::debug!("Link {id} deleted: {} -> {}", edge.from, edge.to);
            self.outbox.push_back(GraphEvent::LinkDeleted {
                from: edge.from,
                to: edge.to,
            });
        }
        Ok(edge)
    }

    /// Get a node by ID
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Set a node's scalar value
    pub fn set_node_value(&mut self, id: NodeId, value: f32) -> Result<()> {
        let node = self.nodes.get_mut(id).ok_or(GraphError::NodeNotFound(id))?;
        node.value = value;
        Ok(())
    }

    /// Whether a node exists
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    /// Whether an edge exists
    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edges.contains(id)
    }

    /// Get an edge by ID
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Iterate nodes in id order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes.iter()
    }

    /// Iterate edges in id order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.values().iter()
    }

    /// Edges leaving a node
    pub fn edges_from(&self, id: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges().filter(move |e| e.from == id)
    }

    /// Edges entering a node
    pub fn edges_to(&self, id: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges().filter(move |e| e.to == id)
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Outgoing neighbors of a node, in edge creation order
    pub fn neighbors(&self, id: NodeId) -> &[NodeId] {
        self.neighbors.get(id).map_or(&[], Vec::as_slice)
    }

    /// Number of outgoing edges. Zero on a pin means "unlinked".
    pub fn num_edges_from_node(&self, id: NodeId) -> usize {
        self.out_degree.get(id).copied().unwrap_or(0)
    }

    /// Next id the graph will issue
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Pop the oldest undelivered event
    pub fn take_event(&mut self) -> Option<GraphEvent> {
        self.outbox.pop_front()
    }

    /// Queue an event for delivery with the structural ones
    pub fn push_event(&mut self, event: GraphEvent) {
        self.outbox.push_back(event);
    }

    /// Whether events are waiting for delivery
    pub fn has_pending_events(&self) -> bool {
        !self.outbox.is_empty()
    }

    /// Drop every node, edge and pending event and reset the id counter
    pub fn clear(&mut self) {
        self.next_id = 0;
        self.nodes.clear();
        self.out_degree.clear();
        self.neighbors.clear();
        self.edges.clear();
        self.outbox.clear();
    }

    /// Re-insert a node under a previously issued id
    pub fn restore_node(&mut self, id: NodeId, node: Node) -> Result<()> {
        let next = Self::successor(id.0)?;
        let (_, inserted) = self.nodes.insert(id, node);
        if !inserted {
            return Err(GraphError::DuplicateId(id.0));
        }
        self.out_degree.insert(id, 0);
        self.neighbors.insert(id, Vec::new());
        self.next_id = self.next_id.max(next);
        Ok(())
    }

    /// Re-insert an edge under a previously issued id, without events
    pub fn restore_edge(&mut self, edge: Edge) -> Result<()> {
        if !self.nodes.contains(edge.from) {
            return Err(GraphError::NodeNotFound(edge.from));
        }
        if !self.nodes.contains(edge.to) {
            return Err(GraphError::NodeNotFound(edge.to));
        }
        let next = Self::successor(edge.id.0)?;
        let (_, inserted) = self.edges.insert(edge.id, edge);
        if !inserted {
            return Err(GraphError::DuplicateId(edge.id.0));
        }
        if let Some(neighbors) = self.neighbors.get_mut(edge.from) {
            neighbors.push(edge.to);
        }
        if let Some(degree) = self.out_degree.get_mut(edge.from) {
            *degree += 1;
        }
        self.next_id = self.next_id.max(next);
        Ok(())
    }

    /// Raise the id counter. Never lowers it.
    pub fn set_next_id(&mut self, next_id: u32) {
        self.next_id = self.next_id.max(next_id);
    }

    /// Whether a cycle is reachable from `root` along outgoing edges
    pub fn has_cycle_from(&self, root: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut temp_mark = HashSet::new();
        self.visit(root, &mut visited, &mut temp_mark)
    }

    /// Whether `to` can be reached from `from` along outgoing edges
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if visited.insert(current) {
                stack.extend_from_slice(self.neighbors(current));
            }
        }
        false
    }

    fn visit(
        &self,
        node_id: NodeId,
        visited: &mut HashSet<NodeId>,
        temp_mark: &mut HashSet<NodeId>,
    ) -> bool {
        if temp_mark.contains(&node_id) {
            return true;
        }
        if visited.contains(&node_id) {
            return false;
        }

        temp_mark.insert(node_id);
        for neighbor in self.neighbors(node_id) {
            if self.visit(*neighbor, visited, temp_mark) {
                return true;
            }
        }
        temp_mark.remove(&node_id);
        visited.insert(node_id);

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use proptest::prelude::*;

    fn value_node(graph: &mut Graph) -> NodeId {
        graph.create_node(Node::new(NodeType::Value)).unwrap()
    }

    #[test]
    fn test_ids_are_never_reused() {
        let mut graph = Graph::new();
        let a = value_node(&mut graph);
        let b = value_node(&mut graph);
        graph.erase_node(a).unwrap();
        let c = value_node(&mut graph);
        assert_ne!(c, a);
        assert_ne!(c, b);
        assert!(!graph.contains_node(a));
    }

    #[test]
    fn test_edges_share_the_id_counter() {
        let mut graph = Graph::new();
        let a = value_node(&mut graph);
        let b = value_node(&mut graph);
        let e = graph.create_edge(a, b, EdgeKind::Internal).unwrap();
        let c = value_node(&mut graph);
        assert_eq!((a.0, b.0, e.0, c.0), (0, 1, 2, 3));
    }

    #[test]
    fn test_create_edge_requires_nodes() {
        let mut graph = Graph::new();
        let a = value_node(&mut graph);
        let result = graph.create_edge(a, NodeId(42), EdgeKind::Internal);
        assert_eq!(result, Err(GraphError::NodeNotFound(NodeId(42))));
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.num_edges_from_node(a), 0);
    }

    #[test]
    fn test_cascade_deletion() {
        let mut graph = Graph::new();
        let a = value_node(&mut graph);
        let b = value_node(&mut graph);
        let c = value_node(&mut graph);
        graph.create_edge(a, b, EdgeKind::Internal).unwrap();
        graph.create_edge(a, c, EdgeKind::Internal).unwrap();
        graph.create_edge(b, c, EdgeKind::External).unwrap();
        graph.create_edge(c, a, EdgeKind::Internal).unwrap();

        graph.erase_node(c).unwrap();

        assert!(graph.edges().all(|e| !e.contains(c)));
        assert_eq!(graph.num_edges_from_node(a), 1);
        assert_eq!(graph.neighbors(a), &[b]);
        assert_eq!(graph.num_edges_from_node(b), 0);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_erase_missing_edge_fails_cleanly() {
        let mut graph = Graph::new();
        let a = value_node(&mut graph);
        let b = value_node(&mut graph);
        graph.create_edge(a, b, EdgeKind::External).unwrap();
        while graph.take_event().is_some() {}

        let result = graph.erase_edge(EdgeId(99));
        assert_eq!(result, Err(GraphError::EdgeNotFound(EdgeId(99))));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.num_edges_from_node(a), 1);
        assert!(!graph.has_pending_events());
    }

    #[test]
    fn test_parallel_edges_are_erased_one_at_a_time() {
        let mut graph = Graph::new();
        let a = value_node(&mut graph);
        let b = value_node(&mut graph);
        let first = graph.create_edge(a, b, EdgeKind::Internal).unwrap();
        graph.create_edge(a, b, EdgeKind::Internal).unwrap();
        assert_eq!(graph.neighbors(a), &[b, b]);

        graph.erase_edge(first).unwrap();
        assert_eq!(graph.neighbors(a), &[b]);
        assert_eq!(graph.num_edges_from_node(a), 1);
    }

    #[test]
    fn test_only_external_edges_emit_events() {
        let mut graph = Graph::new();
        let a = value_node(&mut graph);
        let b = value_node(&mut graph);
        let internal = graph.create_edge(a, b, EdgeKind::Internal).unwrap();
        assert!(!graph.has_pending_events());

        let external = graph.create_edge(b, a, EdgeKind::External).unwrap();
        assert_eq!(graph.take_event(), Some(GraphEvent::LinkCreated { from: b, to: a }));

        graph.erase_edge(internal).unwrap();
        assert!(!graph.has_pending_events());
        graph.erase_edge(external).unwrap();
        assert_eq!(graph.take_event(), Some(GraphEvent::LinkDeleted { from: b, to: a }));
    }

    #[test]
    fn test_restore_rejects_duplicates_and_raises_counter() {
        let mut graph = Graph::new();
        graph.restore_node(NodeId(5), Node::new(NodeType::Add)).unwrap();
        assert_eq!(graph.next_id(), 6);
        assert_eq!(
            graph.restore_node(NodeId(5), Node::new(NodeType::Add)),
            Err(GraphError::DuplicateId(5))
        );
        let fresh = value_node(&mut graph);
        assert_eq!(fresh, NodeId(6));
    }

    #[test]
    fn test_id_space_exhaustion_is_an_error() {
        let mut graph = Graph::new();
        let a = value_node(&mut graph);
        let top = NodeId(u32::MAX);
        assert_eq!(
            graph.restore_node(top, Node::new(NodeType::Value)),
            Err(GraphError::IdSpaceExhausted)
        );
        assert!(!graph.contains_node(top));
        let edge = Edge {
            id: EdgeId(u32::MAX),
            from: a,
            to: a,
            kind: EdgeKind::Internal,
        };
        assert_eq!(graph.restore_edge(edge), Err(GraphError::IdSpaceExhausted));
        assert_eq!(graph.edge_count(), 0);

        graph.set_next_id(u32::MAX - 1);
        assert_eq!(graph.create_node(Node::new(NodeType::Value)), Ok(NodeId(u32::MAX - 1)));
        assert_eq!(
            graph.create_node(Node::new(NodeType::Value)),
            Err(GraphError::IdSpaceExhausted)
        );
        assert_eq!(graph.next_id(), u32::MAX);
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = Graph::new();
        let a = value_node(&mut graph);
        let b = value_node(&mut graph);
        let c = value_node(&mut graph);
        graph.create_edge(a, b, EdgeKind::Internal).unwrap();
        graph.create_edge(b, c, EdgeKind::Internal).unwrap();
        graph.create_edge(a, c, EdgeKind::Internal).unwrap();
        assert!(!graph.has_cycle_from(a));

        graph.create_edge(c, a, EdgeKind::Internal).unwrap();
        assert!(graph.has_cycle_from(a));
    }

    #[derive(Debug, Clone)]
    enum Op {
        AddNode,
        AddEdge(usize, usize),
        EraseNode(usize),
        EraseEdge(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::AddNode),
            (0usize..64, 0usize..64).prop_map(|(a, b)| Op::AddEdge(a, b)),
            (0usize..64).prop_map(Op::EraseNode),
            (0usize..64).prop_map(Op::EraseEdge),
        ]
    }

    #[test]
    fn test_reaches() {
        let mut graph = Graph::new();
        let a = value_node(&mut graph);
        let b = value_node(&mut graph);
        let c = value_node(&mut graph);
        graph.create_edge(a, b, EdgeKind::Internal).unwrap();
        graph.create_edge(b, c, EdgeKind::Internal).unwrap();

        assert!(graph.reaches(a, c));
        assert!(graph.reaches(b, b));
        assert!(!graph.reaches(c, a));
    }

    proptest! {
        #[test]
        fn prop_ids_stable_and_degrees_consistent(ops in proptest::collection::vec(op(), 1..80)) {
            let mut graph = Graph::new();
            let mut issued: HashSet<u32> = HashSet::new();
            let mut erased: Vec<NodeId> = Vec::new();

            for op in ops {
                let live: Vec<NodeId> = graph.nodes().map(|(id, _)| id).collect();
                let edge_ids: Vec<EdgeId> = graph.edges().map(|e| e.id).collect();
                match op {
                    Op::AddNode => {
                        let id = value_node(&mut graph);
                        prop_assert!(issued.insert(id.0));
                    }
                    Op::AddEdge(a, b) if !live.is_empty() => {
                        let from = live[a % live.len()];
                        let to = live[b % live.len()];
                        let id = graph.create_edge(from, to, EdgeKind::External).unwrap();
                        prop_assert!(issued.insert(id.0));
                    }
                    Op::EraseNode(i) if !live.is_empty() => {
                        let id = live[i % live.len()];
                        graph.erase_node(id).unwrap();
                        erased.push(id);
                    }
                    Op::EraseEdge(i) if !edge_ids.is_empty() => {
                        graph.erase_edge(edge_ids[i % edge_ids.len()]).unwrap();
                    }
                    _ => {}
                }

                for id in &erased {
                    prop_assert!(!graph.contains_node(*id));
                    prop_assert!(graph.edges().all(|e| !e.contains(*id)));
                }
                for (id, _) in graph.nodes() {
                    let outgoing = graph.edges_from(id).count();
                    prop_assert_eq!(graph.num_edges_from_node(id), outgoing);
                    prop_assert_eq!(graph.neighbors(id).len(), outgoing);
                }
            }
        }
    }
}
