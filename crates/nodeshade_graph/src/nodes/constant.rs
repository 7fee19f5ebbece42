// SPDX-License-Identifier: MIT OR Apache-2.0
//! Constant value nodes: Scalar, Vector2/3/4 and Matrix4x4.

use super::pins;
use super::{NodeContext, UiNodeKind, UiNodeOps};
use crate::evaluation::{EvalError, EvalFrame};
use crate::graph::GraphError;
use crate::node::{NodeId, NodeType};
use crate::persist::{PersistError, RecordReader, RecordWriter};
use crate::value::{Value, ValueKind};
use crate::value_store::ValueStore;

/// A node whose single output holds a user-entered value
#[derive(Debug, Clone)]
pub struct ConstantNode {
    kind: UiNodeKind,
    id: NodeId,
    output: NodeId,
    /// Value read from disk, registered by `on_load`
    loaded: Value,
}

fn layout(kind: UiNodeKind) -> (ValueKind, NodeType) {
    match kind {
        UiNodeKind::Vector2 => (ValueKind::Vec2, NodeType::Float2),
        UiNodeKind::Vector3 => (ValueKind::Vec3, NodeType::Float3),
        UiNodeKind::Vector4 => (ValueKind::Vec4, NodeType::Float4),
        UiNodeKind::Matrix4x4 => (ValueKind::Mat4, NodeType::Matrix4x4),
        _ => (ValueKind::F32, NodeType::Float),
    }
}

impl ConstantNode {
    /// Allocate the node in the graph
    pub fn create(ctx: &mut NodeContext<'_>, kind: UiNodeKind) -> Result<Self, GraphError> {
        let (value_kind, node_type) = layout(kind);
        let initial = value_kind.default_value();
        let id = pins::create_identity(ctx, node_type)?;
        let output = pins::create_output(ctx, id, initial)?;
        Ok(Self {
            kind,
            id,
            output,
            loaded: initial,
        })
    }

    /// Read `<id> output <components...>`
    pub fn deserialize(reader: &mut RecordReader<'_>, kind: UiNodeKind) -> Result<Self, PersistError> {
        let (value_kind, _) = layout(kind);
        Ok(Self {
            kind,
            id: reader.id()?,
            output: reader.id()?,
            loaded: reader.value(value_kind)?,
        })
    }

    /// Value pin
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Current value
    pub fn value(&self, values: &ValueStore) -> Value {
        values.try_get(self.output).copied().unwrap_or(self.loaded)
    }
}

impl UiNodeOps for ConstantNode {
    fn kind(&self) -> UiNodeKind {
        self.kind
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn inputs(&self) -> Vec<NodeId> {
        Vec::new()
    }

    fn outputs(&self) -> Vec<NodeId> {
        vec![self.output]
    }

    fn on_load(&mut self, ctx: &mut NodeContext<'_>) {
        pins::write_pin(ctx.graph, ctx.values, self.output, self.loaded);
    }

    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError> {
        let value = self.value(frame.values());
        frame.push(value);
        Ok(())
    }

    fn serialize(&self, values: &ValueStore, out: &mut RecordWriter) {
        out.id(self.id).id(self.output).value(&self.value(values));
    }
}
