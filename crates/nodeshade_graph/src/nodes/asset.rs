// SPDX-License-Identifier: MIT OR Apache-2.0
//! Asset reference nodes: Model, Texture, Shader and Primitive.
//!
//! Each node exposes a single `I32` output holding the index the
//! collaborator handed back. Failed loads never abort the frame: models and
//! textures keep [`INVALID_INDEX`], shaders fall back to the default shader.

use super::pins;
use super::{NodeContext, UiNodeKind, UiNodeOps};
use crate::evaluation::{EvalError, EvalFrame};
use crate::graph::GraphError;
use crate::node::{NodeId, NodeType};
use crate::persist::{PersistError, RecordReader, RecordWriter};
use crate::services::PrimitiveShape;
use crate::value::{Value, INVALID_INDEX};
use crate::value_store::ValueStore;

/// Which collaborator resolves the path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    /// Mesh from the asset store
    Model,
    /// Texture from the asset store
    Texture,
    /// Shader from the shader provider
    Shader,
}

impl AssetKind {
    fn node_type(self) -> NodeType {
        match self {
            Self::Model => NodeType::Model,
            Self::Texture => NodeType::Texture,
            Self::Shader => NodeType::Shader,
        }
    }

    fn ui_kind(self) -> UiNodeKind {
        match self {
            Self::Model => UiNodeKind::Model,
            Self::Texture => UiNodeKind::Texture,
            Self::Shader => UiNodeKind::Shader,
        }
    }

    /// Resolve `path` to an index, applying the fallback policy
    fn resolve(self, ctx: &mut NodeContext<'_>, path: Option<&str>) -> i32 {
        let services = &mut *ctx.services;
        let Some(path) = path else {
            return match self {
                Self::Shader => services.shaders.default_shader(),
                _ => INVALID_INDEX,
            };
        };

        let loaded = match self {
            Self::Model => services.assets.load_model(path),
            Self::Texture => services.assets.load_texture(path),
            Self::Shader => services.shaders.load_shader(path),
        };
        match loaded {
            Ok(index) => index,
            Err(e) if self == Self::Shader => {
                let fallback = services.shaders.default_shader();
                tracing::warn!("Failed to load shader '{path}': {e}; using default {fallback}");
                fallback
            }
            Err(e) => {
                tracing::warn!("Failed to load {self:?} '{path}': {e}");
                INVALID_INDEX
            }
        }
    }
}

/// Model, Texture or Shader node
#[derive(Debug, Clone)]
pub struct AssetNode {
    asset: AssetKind,
    id: NodeId,
    output: NodeId,
    path: Option<String>,
}

impl AssetNode {
    /// Allocate the node in the graph
    pub fn create(ctx: &mut NodeContext<'_>, asset: AssetKind) -> Result<Self, GraphError> {
        let id = pins::create_identity(ctx, asset.node_type())?;
        let index = asset.resolve(ctx, None);
        let output = pins::create_output(ctx, id, Value::I32(index))?;
        Ok(Self {
            asset,
            id,
            output,
            path: None,
        })
    }

    /// Read `<id> output <path>`
    pub fn deserialize(reader: &mut RecordReader<'_>, asset: AssetKind) -> Result<Self, PersistError> {
        Ok(Self {
            asset,
            id: reader.id()?,
            output: reader.id()?,
            path: reader.text()?,
        })
    }

    /// Which collaborator resolves the path
    pub fn asset(&self) -> AssetKind {
        self.asset
    }

    /// Index pin
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Source path, if set
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Point the node at a new path and resolve it. Returns the new index.
    pub fn set_path(&mut self, ctx: &mut NodeContext<'_>, path: Option<String>) -> i32 {
        self.path = path;
        self.refresh(ctx)
    }

    fn refresh(&mut self, ctx: &mut NodeContext<'_>) -> i32 {
        let index = self.asset.resolve(ctx, self.path.as_deref());
        pins::write_pin(ctx.graph, ctx.values, self.output, Value::I32(index));
        index
    }
}

impl UiNodeOps for AssetNode {
    fn kind(&self) -> UiNodeKind {
        self.asset.ui_kind()
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
        self.refresh(ctx);
    }

    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError> {
        let index = frame
            .values()
            .try_get(self.output)
            .copied()
            .unwrap_or(Value::I32(INVALID_INDEX));
        frame.push(index);
        Ok(())
    }

    fn serialize(&self, _values: &ValueStore, out: &mut RecordWriter) {
        out.id(self.id).id(self.output).text(self.path.as_deref());
    }
}

/// Built-in mesh node
#[derive(Debug, Clone)]
pub struct PrimitiveNode {
    id: NodeId,
    output: NodeId,
    shape: PrimitiveShape,
}

impl PrimitiveNode {
    /// Allocate the node in the graph
    pub fn create(ctx: &mut NodeContext<'_>) -> Result<Self, GraphError> {
        let id = pins::create_identity(ctx, NodeType::Primitive)?;
        let shape = PrimitiveShape::default();
        let index = Self::resolve(ctx, shape);
        let output = pins::create_output(ctx, id, Value::I32(index))?;
        Ok(Self { id, output, shape })
    }

    /// Read `<id> output shape`
    pub fn deserialize(reader: &mut RecordReader<'_>) -> Result<Self, PersistError> {
        let id = reader.id()?;
        let output = reader.id()?;
        let tag = reader.u32()?;
        let shape = PrimitiveShape::from_tag(tag)
            .ok_or_else(|| reader.error(format!("unknown primitive shape {tag}")))?;
        Ok(Self { id, output, shape })
    }

    /// Index pin
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Current shape
    pub fn shape(&self) -> PrimitiveShape {
        self.shape
    }

    /// Switch to another built-in mesh. Returns the new index.
    pub fn set_shape(&mut self, ctx: &mut NodeContext<'_>, shape: PrimitiveShape) -> i32 {
        self.shape = shape;
        let index = Self::resolve(ctx, shape);
        pins::write_pin(ctx.graph, ctx.values, self.output, Value::I32(index));
        index
    }

    fn resolve(ctx: &mut NodeContext<'_>, shape: PrimitiveShape) -> i32 {
        ctx.services.assets.primitive(shape).unwrap_or_else(|e| {
            tracing::warn!("Failed to create primitive {shape:?}: {e}");
            INVALID_INDEX
        })
    }
}

impl UiNodeOps for PrimitiveNode {
    fn kind(&self) -> UiNodeKind {
        UiNodeKind::Primitive
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
        self.set_shape(ctx, self.shape);
    }

    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError> {
        let index = frame
            .values()
            .try_get(self.output)
            .copied()
            .unwrap_or(Value::I32(INVALID_INDEX));
        frame.push(index);
        Ok(())
    }

    fn serialize(&self, _values: &ValueStore, out: &mut RecordWriter) {
        out.id(self.id).id(self.output).u32(self.shape.tag());
    }
}
