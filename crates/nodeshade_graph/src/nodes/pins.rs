// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pin allocation and value plumbing shared by the node kinds.

use super::NodeContext;
use crate::edge::EdgeKind;
use crate::graph::{Graph, GraphError};
use crate::node::{Direction, Node, NodeId, NodeType};
use crate::value::{Value, ValueKind};
use crate::value_store::ValueStore;

/// Allocate the identity node
pub(crate) fn create_identity(ctx: &mut NodeContext<'_>, node_type: NodeType) -> Result<NodeId, GraphError> {
    ctx.graph.create_node(Node::new(node_type))
}

fn pin_node(value: &Value, direction: Direction) -> Node {
    Node::pin(value.kind().node_type(), direction).with_value(value.scalar().unwrap_or(0.0))
}

/// Allocate an input pin wired `identity -> pin`, with its value box
pub(crate) fn create_input(
    ctx: &mut NodeContext<'_>,
    identity: NodeId,
    value: Value,
) -> Result<NodeId, GraphError> {
    let pin = ctx.graph.create_node(pin_node(&value, Direction::In))?;
    ctx.graph.create_edge(identity, pin, EdgeKind::Internal)?;
    ctx.values.store(pin, value);
    Ok(pin)
}

/// Allocate an output pin wired `pin -> identity`, with its value box
pub(crate) fn create_output(
    ctx: &mut NodeContext<'_>,
    identity: NodeId,
    value: Value,
) -> Result<NodeId, GraphError> {
    let pin = ctx.graph.create_node(pin_node(&value, Direction::Out))?;
    ctx.graph.create_edge(pin, identity, EdgeKind::Internal)?;
    ctx.values.store(pin, value);
    Ok(pin)
}

/// Store a pin value, mirroring scalars into the graph node
pub(crate) fn write_pin(graph: &mut Graph, values: &mut ValueStore, pin: NodeId, value: Value) {
    if let Some(scalar) = value.scalar() {
        if let Some(node) = graph.node_mut(pin) {
            node.value = scalar;
        }
    }
    values.store(pin, value);
}

/// Producer linked to an input pin, if any
pub(crate) fn upstream(graph: &Graph, pin: NodeId) -> Option<NodeId> {
    if graph.num_edges_from_node(pin) == 0 {
        return None;
    }
    graph.neighbors(pin).first().copied()
}

/// Copy the linked producer's value into an input pin.
///
/// Unlinked pins keep their locally entered value.
pub(crate) fn pull_input(ctx: &mut NodeContext<'_>, pin: NodeId) {
    let Some(source) = upstream(ctx.graph, pin) else {
        return;
    };
    let Some(value) = ctx.values.try_get(source).copied() else {
        return;
    };
    let kind = ctx
        .values
        .try_get(pin)
        .map(Value::kind)
        .unwrap_or_else(|| value.kind());

    match value.coerce(kind) {
        Some(value) => write_pin(ctx.graph, ctx.values, pin, value),
        None => tracing::debug!("Pin {pin} cannot take {} from {source}", value.kind()),
    }
}

/// Re-register a pin box after loading.
///
/// Scalar pins recover their value from the graph node; other kinds start
/// from `fallback`.
pub(crate) fn reload_pin(ctx: &mut NodeContext<'_>, pin: NodeId, fallback: Value) {
    let scalar = ctx.graph.node(pin).map_or(0.0, |n| n.value);
    let value = match fallback.kind() {
        ValueKind::F32 => Value::F32(scalar),
        ValueKind::I32 => Value::I32(scalar as i32),
        _ => fallback,
    };
    ctx.values.store(pin, value);
}

/// Erase graph nodes (cascading their edges) and their boxes
pub(crate) fn erase_owned(
    ctx: &mut NodeContext<'_>,
    ids: impl IntoIterator<Item = NodeId>,
) -> Result<(), GraphError> {
    for id in ids {
        ctx.values.remove(id);
        ctx.graph.erase_node(id)?;
    }
    Ok(())
}
