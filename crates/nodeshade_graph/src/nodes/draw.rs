// SPDX-License-Identifier: MIT OR Apache-2.0
//! Draw node with a shader-driven pin schema.
//!
//! Besides its fixed `shader` and `model` inputs, a draw node exposes one
//! input pin per binding variable reflected from the linked shader. Linking
//! a shader builds those pins, unlinking tears them down, and a reload of
//! the bound shader re-syncs them when the reflected list changed.

use super::pins;
use super::{NodeContext, Timer, UiNodeKind, UiNodeOps};
use crate::evaluation::{EvalError, EvalFrame};
use crate::events::GraphEvent;
use crate::graph::GraphError;
use crate::node::{NodeId, NodeType};
use crate::persist::{PersistError, RecordReader, RecordWriter};
use crate::services::{DrawCall, ShaderBinding};
use crate::value::{HlslType, Value, INVALID_INDEX};
use crate::value_store::ValueStore;

/// One dynamic input created from a reflected binding variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawBinding {
    /// Input pin
    pub pin: NodeId,
    /// Variable name
    pub name: String,
    /// Variable type
    pub hlsl_type: HlslType,
}

/// Draw call node
#[derive(Debug, Clone)]
pub struct DrawNode {
    id: NodeId,
    shader: NodeId,
    model: NodeId,
    output: NodeId,
    color: [f32; 3],
    bindings: Vec<DrawBinding>,
    bound_shader: i32,
}

impl DrawNode {
    /// Allocate the node in the graph
    pub fn create(ctx: &mut NodeContext<'_>) -> Result<Self, GraphError> {
        let id = pins::create_identity(ctx, NodeType::Draw)?;
        let shader = pins::create_input(ctx, id, Value::I32(INVALID_INDEX))?;
        let model = pins::create_input(ctx, id, Value::I32(INVALID_INDEX))?;
        let output = pins::create_output(ctx, id, Value::F32(0.0))?;
        Ok(Self {
            id,
            shader,
            model,
            output,
            color: [0.0; 3],
            bindings: Vec::new(),
            bound_shader: INVALID_INDEX,
        })
    }

    /// Read `<id> model shader output count r g b` and the binding lines
    pub fn deserialize(reader: &mut RecordReader<'_>) -> Result<Self, PersistError> {
        let id = reader.id()?;
        let model = reader.id()?;
        let shader = reader.id()?;
        let output = reader.id()?;
        let count = reader.usize()?;
        let color = reader.floats::<3>()?;

        let mut bindings = Vec::new();
        for _ in 0..count {
            reader.next_line()?;
            let pin = reader.id()?;
            let name = reader.word()?;
            let type_name = reader.word()?;
            let hlsl_type = HlslType::parse(&type_name)
                .ok_or_else(|| reader.error(format!("unknown binding type '{type_name}'")))?;
            bindings.push(DrawBinding {
                pin,
                name,
                hlsl_type,
            });
        }

        Ok(Self {
            id,
            shader,
            model,
            output,
            color,
            bindings,
            bound_shader: INVALID_INDEX,
        })
    }

    /// Shader index pin
    pub fn shader_pin(&self) -> NodeId {
        self.shader
    }

    /// Model index pin
    pub fn model_pin(&self) -> NodeId {
        self.model
    }

    /// Ready sentinel pin
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Dynamic binding inputs, in reflection order
    pub fn bindings(&self) -> &[DrawBinding] {
        &self.bindings
    }

    /// Shader the binding pins were built from
    pub fn bound_shader(&self) -> i32 {
        self.bound_shader
    }

    /// Clear color, as entered
    pub fn color(&self) -> [f32; 3] {
        self.color
    }

    /// Set the clear color. Channels are clamped at evaluation.
    pub fn set_color(&mut self, color: [f32; 3]) {
        self.color = color;
    }

    fn teardown(&mut self, ctx: &mut NodeContext<'_>) {
        let stale = self.bindings.drain(..).map(|b| b.pin).collect::<Vec<_>>();
        if let Err(e) = pins::erase_owned(ctx, stale) {
            tracing::warn!("Draw node {}: failed to erase binding pins: {e}", self.id);
        }
    }

    /// Match the binding pins to the reflection data of `shader`.
    ///
    /// Pins are rebuilt only when the reflected names or types changed, so
    /// links into existing binding pins survive a reload.
    fn sync_bindings(&mut self, ctx: &mut NodeContext<'_>, shader: i32) {
        let vars = if shader < 0 {
            Vec::new()
        } else {
            ctx.services.shaders.bindings(shader).unwrap_or_else(|e| {
                tracing::warn!("Draw node {}: no reflection for shader {shader}: {e}", self.id);
                Vec::new()
            })
        };

        let reflected: Vec<(String, HlslType)> = vars
            .into_iter()
            .filter_map(|var| match HlslType::parse(&var.type_name) {
                Some(hlsl) => Some((var.name, hlsl)),
                None => {
                    tracing::warn!(
                        "Draw node {}: skipping binding '{}' of unsupported type '{}'",
                        self.id,
                        var.name,
                        var.type_name
                    );
                    None
                }
            })
            .collect();

        self.bound_shader = shader;
        let unchanged = reflected.len() == self.bindings.len()
            && reflected
                .iter()
                .zip(&self.bindings)
                .all(|((name, hlsl), b)| *name == b.name && *hlsl == b.hlsl_type);
        if unchanged {
            return;
        }

        self.teardown(ctx);
        for (name, hlsl_type) in reflected {
            match pins::create_input(ctx, self.id, hlsl_type.value_kind().default_value()) {
                Ok(pin) => self.bindings.push(DrawBinding {
                    pin,
                    name,
                    hlsl_type,
                }),
                Err(e) => {
                    tracing::warn!("Draw node {}: failed to create pin '{name}': {e}", self.id);
                }
            }
        }
        tracing::debug!(
            "Draw node {} bound to shader {shader} with {} bindings",
            self.id,
            self.bindings.len()
        );
    }
}

impl UiNodeOps for DrawNode {
    fn kind(&self) -> UiNodeKind {
        UiNodeKind::Draw
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn inputs(&self) -> Vec<NodeId> {
        let mut inputs = vec![self.shader, self.model];
        inputs.extend(self.bindings.iter().map(|b| b.pin));
        inputs
    }

    fn outputs(&self) -> Vec<NodeId> {
        vec![self.output]
    }

    fn on_load(&mut self, ctx: &mut NodeContext<'_>) {
        pins::reload_pin(ctx, self.shader, Value::I32(INVALID_INDEX));
        pins::reload_pin(ctx, self.model, Value::I32(INVALID_INDEX));
        pins::reload_pin(ctx, self.output, Value::F32(0.0));
        for binding in &self.bindings {
            pins::reload_pin(ctx, binding.pin, binding.hlsl_type.value_kind().default_value());
        }
        self.bound_shader = ctx.values.get_i32(self.shader).unwrap_or(INVALID_INDEX);
    }

    fn on_update(&mut self, ctx: &mut NodeContext<'_>, _timer: &Timer) {
        for pin in self.inputs() {
            pins::pull_input(ctx, pin);
        }
        if pins::upstream(ctx.graph, self.shader).is_none() {
            return;
        }
        let shader = ctx.values.get_i32(self.shader).unwrap_or(INVALID_INDEX);
        if shader != self.bound_shader {
            self.sync_bindings(ctx, shader);
        }
    }

    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError> {
        let popped = frame.pop_n(2 + self.bindings.len())?;
        let index = |v: &Value| v.as_index().unwrap_or(INVALID_INDEX);
        let shader = index(&popped[0]);
        let model = index(&popped[1]);

        let mut bindings = Vec::with_capacity(self.bindings.len());
        for (binding, value) in self.bindings.iter().zip(&popped[2..]) {
            bindings.push(ShaderBinding {
                name: binding.name.clone(),
                hlsl_type: binding.hlsl_type,
                value: frame.expect(*value, binding.hlsl_type.value_kind())?,
            });
        }

        let call = DrawCall {
            vertex_shader: shader,
            pixel_shader: shader,
            model,
            color: self.color.map(|c| c.clamp(0.0, 1.0)),
            bindings,
        };
        let ready = call.is_complete();
        if ready {
            frame.submit(call);
        }
        frame.output(self.output, Value::F32(if ready { 1.0 } else { 0.0 }));
        Ok(())
    }

    fn observes_events(&self) -> bool {
        true
    }

    fn on_event(&mut self, event: &GraphEvent, ctx: &mut NodeContext<'_>) {
        match *event {
            GraphEvent::LinkCreated { from, to } if from == self.shader => {
                let shader = ctx
                    .values
                    .try_get(to)
                    .and_then(Value::as_index)
                    .unwrap_or(INVALID_INDEX);
                pins::write_pin(ctx.graph, ctx.values, self.shader, Value::I32(shader));
                self.sync_bindings(ctx, shader);
            }
            GraphEvent::LinkDeleted { from, .. } if from == self.shader => {
                pins::write_pin(ctx.graph, ctx.values, self.shader, Value::I32(INVALID_INDEX));
                self.teardown(ctx);
                self.bound_shader = INVALID_INDEX;
            }
            GraphEvent::ShaderUpdated { index } if index >= 0 && index == self.bound_shader => {
                self.sync_bindings(ctx, index);
            }
            _ => {}
        }
    }

    fn serialize(&self, _values: &ValueStore, out: &mut RecordWriter) {
        out.id(self.id)
            .id(self.model)
            .id(self.shader)
            .id(self.output)
            .u32(self.bindings.len() as u32)
            .floats(&self.color);
        for binding in &self.bindings {
            out.new_line()
                .id(binding.pin)
                .word(&binding.name)
                .word(binding.hlsl_type.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::services::{
        BindingVar, MemoryAssetStore, MemoryShaderLibrary, RecordingRenderer, Services,
    };
    use crate::value::ValueKind;

    fn services() -> Services {
        let mut shaders = MemoryShaderLibrary::new();
        shaders.declare(
            "lit.hlsl",
            vec![
                BindingVar::new("world", "float4x4"),
                BindingVar::new("tint", "float3"),
                BindingVar::new("albedo", "texture"),
                BindingVar::new("weird", "double"),
            ],
        );
        Services::new(
            Box::new(shaders),
            Box::new(MemoryAssetStore::new()),
            Box::new(RecordingRenderer::new()),
        )
    }

    #[test]
    fn test_link_events_drive_binding_pins() {
        let mut graph = Graph::new();
        let mut values = ValueStore::new();
        let mut services = services();
        let mut ctx = NodeContext {
            graph: &mut graph,
            values: &mut values,
            services: &mut services,
        };

        let mut draw = DrawNode::create(&mut ctx).unwrap();
        let base_nodes = ctx.graph.node_count();
        let source = ctx.graph.create_node(crate::node::Node::new(NodeType::Int)).unwrap();
        ctx.values.store(source, Value::I32(1));

        let linked = GraphEvent::LinkCreated {
            from: draw.shader_pin(),
            to: source,
        };
        draw.on_event(&linked, &mut ctx);
        assert_eq!(draw.bound_shader(), 1);
        let kinds: Vec<ValueKind> = draw
            .bindings()
            .iter()
            .map(|b| ctx.values.get(b.pin).unwrap().kind())
            .collect();
        assert_eq!(kinds, vec![ValueKind::Mat4, ValueKind::Vec3, ValueKind::I32]);
        assert_eq!(draw.inputs().len(), 5);

        // Same reflection: pins survive
        let pins_before = draw.inputs();
        draw.on_event(&GraphEvent::ShaderUpdated { index: 1 }, &mut ctx);
        assert_eq!(draw.inputs(), pins_before);

        let unlinked = GraphEvent::LinkDeleted {
            from: draw.shader_pin(),
            to: source,
        };
        draw.on_event(&unlinked, &mut ctx);
        assert!(draw.bindings().is_empty());
        assert_eq!(draw.inputs().len(), 2);
        assert_eq!(draw.bound_shader(), INVALID_INDEX);
        assert_eq!(ctx.graph.node_count(), base_nodes + 1);
    }

    #[test]
    fn test_record_lists_model_before_shader_and_color_last() {
        let mut graph = Graph::new();
        let mut values = ValueStore::new();
        let mut services = services();
        let mut ctx = NodeContext {
            graph: &mut graph,
            values: &mut values,
            services: &mut services,
        };

        let mut draw = DrawNode::create(&mut ctx).unwrap();
        draw.set_color([0.5, 0.25, 1.0]);
        let mut out = RecordWriter::new();
        draw.serialize(ctx.values, &mut out);
        let text = out.finish();

        let expected = format!(
            "{} {} {} {} 0 0.5 0.25 1",
            draw.id(),
            draw.model_pin(),
            draw.shader_pin(),
            draw.output()
        );
        assert_eq!(text.trim_end(), expected);

        let mut reader = RecordReader::new(&text);
        reader.next_line().unwrap();
        let restored = DrawNode::deserialize(&mut reader).unwrap();
        assert_eq!(restored.model_pin(), draw.model_pin());
        assert_eq!(restored.shader_pin(), draw.shader_pin());
        assert_eq!(restored.color(), [0.5, 0.25, 1.0]);
    }

    #[test]
    fn test_unrelated_events_are_ignored() {
        let mut graph = Graph::new();
        let mut values = ValueStore::new();
        let mut services = services();
        let mut ctx = NodeContext {
            graph: &mut graph,
            values: &mut values,
            services: &mut services,
        };

        let mut draw = DrawNode::create(&mut ctx).unwrap();
        let event = GraphEvent::LinkCreated {
            from: draw.model_pin(),
            to: draw.output(),
        };
        draw.on_event(&event, &mut ctx);
        draw.on_event(&GraphEvent::ShaderUpdated { index: 1 }, &mut ctx);
        assert!(draw.bindings().is_empty());
        assert_eq!(draw.bound_shader(), INVALID_INDEX);
    }
}
