// SPDX-License-Identifier: MIT OR Apache-2.0
//! Arithmetic and clock nodes.

use super::pins;
use super::{NodeContext, Timer, UiNodeKind, UiNodeOps};
use crate::evaluation::{EvalError, EvalFrame};
use crate::graph::GraphError;
use crate::node::{NodeId, NodeType};
use crate::persist::{PersistError, RecordReader, RecordWriter};
use crate::value::{Value, ValueError};
use crate::value_store::ValueStore;

/// Binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `left + right`
    Add,
    /// `left * right`
    Multiply,
}

impl BinaryOp {
    fn node_type(self) -> NodeType {
        match self {
            Self::Add => NodeType::Add,
            Self::Multiply => NodeType::Multiply,
        }
    }

    /// Apply the operation
    pub fn apply(self, lhs: Value, rhs: Value) -> Result<Value, ValueError> {
        match self {
            Self::Add => lhs.add(rhs),
            Self::Multiply => lhs.mul(rhs),
        }
    }
}

/// Add or Multiply node: `left`, `right` in, `output` out
#[derive(Debug, Clone)]
pub struct BinaryOpNode {
    op: BinaryOp,
    id: NodeId,
    left: NodeId,
    right: NodeId,
    output: NodeId,
}

impl BinaryOpNode {
    /// Allocate the node in the graph
    pub fn create(ctx: &mut NodeContext<'_>, op: BinaryOp) -> Result<Self, GraphError> {
        let id = pins::create_identity(ctx, op.node_type())?;
        let left = pins::create_input(ctx, id, Value::F32(0.0))?;
        let right = pins::create_input(ctx, id, Value::F32(0.0))?;
        let output = pins::create_output(ctx, id, Value::F32(0.0))?;
        Ok(Self {
            op,
            id,
            left,
            right,
            output,
        })
    }

    /// Read `<id> left right output`
    pub fn deserialize(reader: &mut RecordReader<'_>, op: BinaryOp) -> Result<Self, PersistError> {
        Ok(Self {
            op,
            id: reader.id()?,
            left: reader.id()?,
            right: reader.id()?,
            output: reader.id()?,
        })
    }

    /// Operation
    pub fn op(&self) -> BinaryOp {
        self.op
    }

    /// Left operand pin
    pub fn left(&self) -> NodeId {
        self.left
    }

    /// Right operand pin
    pub fn right(&self) -> NodeId {
        self.right
    }

    /// Result pin
    pub fn output(&self) -> NodeId {
        self.output
    }
}

impl UiNodeOps for BinaryOpNode {
    fn kind(&self) -> UiNodeKind {
        match self.op {
            BinaryOp::Add => UiNodeKind::Add,
            BinaryOp::Multiply => UiNodeKind::Multiply,
        }
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn inputs(&self) -> Vec<NodeId> {
        vec![self.left, self.right]
    }

    fn outputs(&self) -> Vec<NodeId> {
        vec![self.output]
    }

    fn on_load(&mut self, ctx: &mut NodeContext<'_>) {
        for pin in self.pins() {
            pins::reload_pin(ctx, pin, Value::F32(0.0));
        }
    }

    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError> {
        let [lhs, rhs] = frame.pop_array::<2>()?;
        let result = self.op.apply(lhs, rhs).map_err(|e| frame.value_error(e))?;
        frame.output(self.output, result);
        Ok(())
    }

    fn serialize(&self, _values: &ValueStore, out: &mut RecordWriter) {
        out.id(self.id).id(self.left).id(self.right).id(self.output);
    }
}

/// `|sin(input)|`
#[derive(Debug, Clone)]
pub struct SineNode {
    id: NodeId,
    input: NodeId,
    output: NodeId,
}

impl SineNode {
    /// Allocate the node in the graph
    pub fn create(ctx: &mut NodeContext<'_>) -> Result<Self, GraphError> {
        let id = pins::create_identity(ctx, NodeType::Sine)?;
        let input = pins::create_input(ctx, id, Value::F32(0.0))?;
        let output = pins::create_output(ctx, id, Value::F32(0.0))?;
        Ok(Self { id, input, output })
    }

    /// Read `<id> input output`
    pub fn deserialize(reader: &mut RecordReader<'_>) -> Result<Self, PersistError> {
        Ok(Self {
            id: reader.id()?,
            input: reader.id()?,
            output: reader.id()?,
        })
    }

    /// Result pin
    pub fn output(&self) -> NodeId {
        self.output
    }
}

impl UiNodeOps for SineNode {
    fn kind(&self) -> UiNodeKind {
        UiNodeKind::Sine
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn inputs(&self) -> Vec<NodeId> {
        vec![self.input]
    }

    fn outputs(&self) -> Vec<NodeId> {
        vec![self.output]
    }

    fn on_load(&mut self, ctx: &mut NodeContext<'_>) {
        pins::reload_pin(ctx, self.input, Value::F32(0.0));
        pins::reload_pin(ctx, self.output, Value::F32(0.0));
    }

    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError> {
        let [x] = frame.pop_array::<1>()?;
        frame.output(self.output, x.abs_sin());
        Ok(())
    }

    fn serialize(&self, _values: &ValueStore, out: &mut RecordWriter) {
        out.id(self.id).id(self.input).id(self.output);
    }
}

/// Animation clock
#[derive(Debug, Clone)]
pub struct TimeNode {
    id: NodeId,
    output: NodeId,
}

impl TimeNode {
    /// Allocate the node in the graph
    pub fn create(ctx: &mut NodeContext<'_>) -> Result<Self, GraphError> {
        let id = pins::create_identity(ctx, NodeType::Time)?;
        let output = pins::create_output(ctx, id, Value::F32(0.0))?;
        Ok(Self { id, output })
    }

    /// Read `<id> output`
    pub fn deserialize(reader: &mut RecordReader<'_>) -> Result<Self, PersistError> {
        Ok(Self {
            id: reader.id()?,
            output: reader.id()?,
        })
    }

    /// Clock pin
    pub fn output(&self) -> NodeId {
        self.output
    }
}

impl UiNodeOps for TimeNode {
    fn kind(&self) -> UiNodeKind {
        UiNodeKind::Time
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
        pins::reload_pin(ctx, self.output, Value::F32(0.0));
    }

    fn on_update(&mut self, ctx: &mut NodeContext<'_>, timer: &Timer) {
        pins::write_pin(ctx.graph, ctx.values, self.output, Value::F32(timer.elapsed));
    }

    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError> {
        let time = frame.time();
        frame.output(self.output, Value::F32(time));
        Ok(())
    }

    fn serialize(&self, _values: &ValueStore, out: &mut RecordWriter) {
        out.id(self.id).id(self.output);
    }
}
