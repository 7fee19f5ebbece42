// SPDX-License-Identifier: MIT OR Apache-2.0
//! UI node catalog.
//!
//! A UI node is one visual node of the editor. It owns an identity graph
//! node plus one graph node per pin, wired with internal edges:
//! inputs point away from the identity (`identity -> pin`), outputs point
//! toward it (`pin -> identity`). External links are stored from the
//! consuming input pin to the producing output pin, so a depth-first walk
//! from the sink reaches producers after their consumers.
//!
//! Each kind implements [`UiNodeOps`]; [`UiNode`] is the closed sum type
//! the editor stores and dispatches through.

pub mod asset;
pub mod constant;
pub mod draw;
pub mod math;
pub(crate) mod pins;
pub mod render_target;
pub mod scene;

pub use asset::{AssetKind, AssetNode, PrimitiveNode};
pub use constant::ConstantNode;
pub use draw::{DrawBinding, DrawNode};
pub use math::{BinaryOp, BinaryOpNode, SineNode, TimeNode};
pub use render_target::RenderTargetNode;
pub use scene::{CameraNode, TransformNode};

use crate::evaluation::{EvalError, EvalFrame};
use crate::events::GraphEvent;
use crate::graph::{Graph, GraphError};
use crate::node::NodeId;
use crate::persist::{PersistError, RecordReader, RecordWriter};
use crate::services::Services;
use crate::value_store::ValueStore;
use serde::{Deserialize, Serialize};

/// UI node kind, with its persistence tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum UiNodeKind {
    /// `left + right`
    Add = 0,
    /// `left * right`
    Multiply = 1,
    /// `|sin(input)|`
    Sine = 2,
    /// Animation clock
    Time = 3,
    /// Constant float
    Scalar = 4,
    /// Constant 2D vector
    Vector2 = 5,
    /// Constant 3D vector
    Vector3 = 6,
    /// Constant 4D vector
    Vector4 = 7,
    /// Constant matrix
    Matrix4x4 = 8,
    /// Model loaded from a path
    Model = 9,
    /// Texture loaded from a path
    Texture = 10,
    /// Shader loaded from a path
    Shader = 11,
    /// View-projection from a camera
    Camera = 12,
    /// Translation/rotation/scale matrix
    Transform = 13,
    /// Built-in mesh
    Primitive = 14,
    /// Draw call with shader-driven bindings
    Draw = 15,
    /// Final render texture
    RenderTarget = 16,
}

impl UiNodeKind {
    /// Every kind, in tag order
    pub const ALL: [UiNodeKind; 17] = [
        UiNodeKind::Add,
        UiNodeKind::Multiply,
        UiNodeKind::Sine,
        UiNodeKind::Time,
        UiNodeKind::Scalar,
        UiNodeKind::Vector2,
        UiNodeKind::Vector3,
        UiNodeKind::Vector4,
        UiNodeKind::Matrix4x4,
        UiNodeKind::Model,
        UiNodeKind::Texture,
        UiNodeKind::Shader,
        UiNodeKind::Camera,
        UiNodeKind::Transform,
        UiNodeKind::Primitive,
        UiNodeKind::Draw,
        UiNodeKind::RenderTarget,
    ];

    /// Integer tag used by the text format
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Look up a kind from its integer tag
    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Display name
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Multiply => "Multiply",
            Self::Sine => "Sine",
            Self::Time => "Time",
            Self::Scalar => "Scalar",
            Self::Vector2 => "Vector2",
            Self::Vector3 => "Vector3",
            Self::Vector4 => "Vector4",
            Self::Matrix4x4 => "Matrix4x4",
            Self::Model => "Model",
            Self::Texture => "Texture",
            Self::Shader => "Shader",
            Self::Camera => "Camera",
            Self::Transform => "Transform",
            Self::Primitive => "Primitive",
            Self::Draw => "Draw",
            Self::RenderTarget => "Render Target",
        }
    }
}

/// Frame clock handed to `on_update`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timer {
    /// Seconds since the editor started
    pub elapsed: f32,
    /// Seconds since the previous frame
    pub delta: f32,
}

impl Timer {
    /// Advance by `delta` seconds
    pub fn advance(&mut self, delta: f32) {
        self.delta = delta;
        self.elapsed += delta;
    }
}

/// Mutable state reachable from lifecycle hooks
pub struct NodeContext<'a> {
    /// The graph
    pub graph: &'a mut Graph,
    /// Value boxes
    pub values: &'a mut ValueStore,
    /// External collaborators
    pub services: &'a mut Services,
}

/// Lifecycle hooks shared by every UI node kind
pub trait UiNodeOps {
    /// Kind of this node
    fn kind(&self) -> UiNodeKind;

    /// Identity graph node
    fn id(&self) -> NodeId;

    /// Input pins, in evaluation order
    fn inputs(&self) -> Vec<NodeId>;

    /// Output pins
    fn outputs(&self) -> Vec<NodeId>;

    /// Every pin this node owns
    fn pins(&self) -> Vec<NodeId> {
        let mut pins = self.inputs();
        pins.extend(self.outputs());
        pins
    }

    /// Re-register value boxes after deserialization
    fn on_load(&mut self, ctx: &mut NodeContext<'_>);

    /// Pull upstream values into linked input pins
    fn on_update(&mut self, ctx: &mut NodeContext<'_>, _timer: &Timer) {
        for pin in self.inputs() {
            pins::pull_input(ctx, pin);
        }
    }

    /// Pop inputs, compute, write outputs and push the result
    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError>;

    /// Erase every owned graph node and value box
    fn on_delete(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), GraphError> {
        pins::erase_owned(ctx, self.pins())?;
        pins::erase_owned(ctx, [self.id()])
    }

    /// Whether this node listens on the event bus
    fn observes_events(&self) -> bool {
        false
    }

    /// React to a bus event
    fn on_event(&mut self, _event: &GraphEvent, _ctx: &mut NodeContext<'_>) {}

    /// Write the kind-specific fields
    fn serialize(&self, values: &ValueStore, out: &mut RecordWriter);
}

/// Any UI node
#[derive(Debug, Clone)]
pub enum UiNode {
    /// Add or Multiply
    Binary(BinaryOpNode),
    /// Sine
    Sine(SineNode),
    /// Time
    Time(TimeNode),
    /// Scalar, Vector2/3/4, Matrix4x4
    Constant(ConstantNode),
    /// Model, Texture, Shader
    Asset(AssetNode),
    /// Primitive
    Primitive(PrimitiveNode),
    /// Camera
    Camera(CameraNode),
    /// Transform
    Transform(TransformNode),
    /// Draw
    Draw(DrawNode),
    /// Render target
    RenderTarget(RenderTargetNode),
}

macro_rules! dispatch {
    ($self:expr, $node:ident => $body:expr) => {
        match $self {
            UiNode::Binary($node) => $body,
            UiNode::Sine($node) => $body,
            UiNode::Time($node) => $body,
            UiNode::Constant($node) => $body,
            UiNode::Asset($node) => $body,
            UiNode::Primitive($node) => $body,
            UiNode::Camera($node) => $body,
            UiNode::Transform($node) => $body,
            UiNode::Draw($node) => $body,
            UiNode::RenderTarget($node) => $body,
        }
    };
}

impl UiNode {
    /// Allocate a new node of `kind` in the graph
    pub fn create(kind: UiNodeKind, ctx: &mut NodeContext<'_>) -> Result<Self, GraphError> {
        let node = match kind {
            UiNodeKind::Add => Self::Binary(BinaryOpNode::create(ctx, BinaryOp::Add)?),
            UiNodeKind::Multiply => Self::Binary(BinaryOpNode::create(ctx, BinaryOp::Multiply)?),
            UiNodeKind::Sine => Self::Sine(SineNode::create(ctx)?),
            UiNodeKind::Time => Self::Time(TimeNode::create(ctx)?),
            UiNodeKind::Scalar
            | UiNodeKind::Vector2
            | UiNodeKind::Vector3
            | UiNodeKind::Vector4
            | UiNodeKind::Matrix4x4 => Self::Constant(ConstantNode::create(ctx, kind)?),
            UiNodeKind::Model => Self::Asset(AssetNode::create(ctx, AssetKind::Model)?),
            UiNodeKind::Texture => Self::Asset(AssetNode::create(ctx, AssetKind::Texture)?),
            UiNodeKind::Shader => Self::Asset(AssetNode::create(ctx, AssetKind::Shader)?),
            UiNodeKind::Camera => Self::Camera(CameraNode::create(ctx)?),
            UiNodeKind::Transform => Self::Transform(TransformNode::create(ctx)?),
            UiNodeKind::Primitive => Self::Primitive(PrimitiveNode::create(ctx)?),
            UiNodeKind::Draw => Self::Draw(DrawNode::create(ctx)?),
            UiNodeKind::RenderTarget => Self::RenderTarget(RenderTargetNode::create(ctx)?),
        };
        tracing::debug!("Created {} node {}", kind.display_name(), node.id());
        Ok(node)
    }

    /// Read the kind-specific fields of a `uin` record
    pub fn deserialize(kind: UiNodeKind, reader: &mut RecordReader<'_>) -> Result<Self, PersistError> {
        let node = match kind {
            UiNodeKind::Add => Self::Binary(BinaryOpNode::deserialize(reader, BinaryOp::Add)?),
            UiNodeKind::Multiply => {
                Self::Binary(BinaryOpNode::deserialize(reader, BinaryOp::Multiply)?)
            }
            UiNodeKind::Sine => Self::Sine(SineNode::deserialize(reader)?),
            UiNodeKind::Time => Self::Time(TimeNode::deserialize(reader)?),
            UiNodeKind::Scalar
            | UiNodeKind::Vector2
            | UiNodeKind::Vector3
            | UiNodeKind::Vector4
            | UiNodeKind::Matrix4x4 => Self::Constant(ConstantNode::deserialize(reader, kind)?),
            UiNodeKind::Model => Self::Asset(AssetNode::deserialize(reader, AssetKind::Model)?),
            UiNodeKind::Texture => {
                Self::Asset(AssetNode::deserialize(reader, AssetKind::Texture)?)
            }
            UiNodeKind::Shader => Self::Asset(AssetNode::deserialize(reader, AssetKind::Shader)?),
            UiNodeKind::Camera => Self::Camera(CameraNode::deserialize(reader)?),
            UiNodeKind::Transform => Self::Transform(TransformNode::deserialize(reader)?),
            UiNodeKind::Primitive => Self::Primitive(PrimitiveNode::deserialize(reader)?),
            UiNodeKind::Draw => Self::Draw(DrawNode::deserialize(reader)?),
            UiNodeKind::RenderTarget => Self::RenderTarget(RenderTargetNode::deserialize(reader)?),
        };
        Ok(node)
    }

    /// Get the draw node, if this is one
    pub fn as_draw(&self) -> Option<&DrawNode> {
        match self {
            Self::Draw(node) => Some(node),
            _ => None,
        }
    }

    /// Get the render target, if this is one
    pub fn as_render_target(&self) -> Option<&RenderTargetNode> {
        match self {
            Self::RenderTarget(node) => Some(node),
            _ => None,
        }
    }
}

impl UiNodeOps for UiNode {
    fn kind(&self) -> UiNodeKind {
        dispatch!(self, node => node.kind())
    }

    fn id(&self) -> NodeId {
        dispatch!(self, node => node.id())
    }

    fn inputs(&self) -> Vec<NodeId> {
        dispatch!(self, node => node.inputs())
    }

    fn outputs(&self) -> Vec<NodeId> {
        dispatch!(self, node => node.outputs())
    }

    fn pins(&self) -> Vec<NodeId> {
        dispatch!(self, node => node.pins())
    }

    fn on_load(&mut self, ctx: &mut NodeContext<'_>) {
        dispatch!(self, node => node.on_load(ctx))
    }

    fn on_update(&mut self, ctx: &mut NodeContext<'_>, timer: &Timer) {
        dispatch!(self, node => node.on_update(ctx, timer))
    }

    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError> {
        dispatch!(self, node => node.on_eval(frame))
    }

    fn on_delete(&mut self, ctx: &mut NodeContext<'_>) -> Result<(), GraphError> {
        dispatch!(self, node => node.on_delete(ctx))
    }

    fn observes_events(&self) -> bool {
        dispatch!(self, node => node.observes_events())
    }

    fn on_event(&mut self, event: &GraphEvent, ctx: &mut NodeContext<'_>) {
        dispatch!(self, node => node.on_event(event, ctx))
    }

    fn serialize(&self, values: &ValueStore, out: &mut RecordWriter) {
        dispatch!(self, node => node.serialize(values, out))
    }
}
