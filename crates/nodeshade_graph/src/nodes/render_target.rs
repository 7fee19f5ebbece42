// SPDX-License-Identifier: MIT OR Apache-2.0
//! Render target sink.

use super::pins;
use super::{NodeContext, UiNodeKind, UiNodeOps};
use crate::evaluation::{EvalError, EvalFrame};
use crate::events::GraphEvent;
use crate::graph::GraphError;
use crate::node::{NodeId, NodeType};
use crate::persist::{PersistError, RecordReader, RecordWriter};
use crate::value::Value;
use crate::value_store::ValueStore;

/// Final render texture. Ready once a nonzero value reaches its input.
#[derive(Debug, Clone)]
pub struct RenderTargetNode {
    id: NodeId,
    input: NodeId,
    ready: bool,
}

impl RenderTargetNode {
    /// Allocate the node in the graph
    pub fn create(ctx: &mut NodeContext<'_>) -> Result<Self, GraphError> {
        let id = pins::create_identity(ctx, NodeType::RenderTarget)?;
        let input = pins::create_input(ctx, id, Value::F32(0.0))?;
        Ok(Self {
            id,
            input,
            ready: false,
        })
    }

    /// Read `<id> input`
    pub fn deserialize(reader: &mut RecordReader<'_>) -> Result<Self, PersistError> {
        Ok(Self {
            id: reader.id()?,
            input: reader.id()?,
            ready: false,
        })
    }

    /// Input pin
    pub fn input(&self) -> NodeId {
        self.input
    }

    /// Whether the last evaluation produced a frame
    pub fn ready(&self) -> bool {
        self.ready
    }

    /// Forget the last frame
    pub fn invalidate(&mut self) {
        self.ready = false;
    }
}

impl UiNodeOps for RenderTargetNode {
    fn kind(&self) -> UiNodeKind {
        UiNodeKind::RenderTarget
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn inputs(&self) -> Vec<NodeId> {
        vec![self.input]
    }

    fn outputs(&self) -> Vec<NodeId> {
        Vec::new()
    }

    fn on_load(&mut self, ctx: &mut NodeContext<'_>) {
        pins::reload_pin(ctx, self.input, Value::F32(0.0));
        self.ready = false;
    }

    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError> {
        let [input] = frame.pop_array::<1>()?;
        self.ready = input.is_nonzero();
        frame.set_ready(self.ready);
        Ok(())
    }

    fn observes_events(&self) -> bool {
        true
    }

    fn on_event(&mut self, event: &GraphEvent, _ctx: &mut NodeContext<'_>) {
        if let GraphEvent::ShaderUpdated { index } = event {
            tracing::debug!("Render target {} invalidated by shader {index}", self.id);
            self.invalidate();
        }
    }

    fn serialize(&self, _values: &ValueStore, out: &mut RecordWriter) {
        out.id(self.id).id(self.input);
    }
}
