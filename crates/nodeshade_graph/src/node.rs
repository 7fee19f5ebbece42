// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node records stored in the graph.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for a graph node (identity nodes and pins alike)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Operation or payload type carried by a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    /// Untyped scalar value
    Value = 0,
    /// Addition
    Add = 1,
    /// Multiplication
    Multiply = 2,
    /// Draw call
    Draw = 3,
    /// Absolute sine
    Sine = 4,
    /// Animation clock
    Time = 5,
    /// Render target sink
    RenderTarget = 6,
    /// Built-in mesh
    Primitive = 7,
    /// Shader program
    Shader = 8,
    /// RGBA color
    Color = 9,
    /// 32-bit float
    Float = 10,
    /// 2-component vector
    Float2 = 11,
    /// 3-component vector
    Float3 = 12,
    /// 4-component vector
    Float4 = 13,
    /// 4x4 matrix
    Float4x4 = 14,
    /// 32-bit integer
    Int = 15,
    /// Loaded model
    Model = 16,
    /// Loaded texture
    Texture = 17,
    /// Camera
    Camera = 18,
    /// Translation/rotation/scale transform
    Transform = 19,
    /// Constant matrix
    Matrix4x4 = 20,
}

impl NodeType {
    const ALL: [NodeType; 21] = [
        NodeType::Value,
        NodeType::Add,
        NodeType::Multiply,
        NodeType::Draw,
        NodeType::Sine,
        NodeType::Time,
        NodeType::RenderTarget,
        NodeType::Primitive,
        NodeType::Shader,
        NodeType::Color,
        NodeType::Float,
        NodeType::Float2,
        NodeType::Float3,
        NodeType::Float4,
        NodeType::Float4x4,
        NodeType::Int,
        NodeType::Model,
        NodeType::Texture,
        NodeType::Camera,
        NodeType::Transform,
        NodeType::Matrix4x4,
    ];

    /// Integer tag used by the text format
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Look up a type from its integer tag
    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Diagnostic name
    pub fn name(self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Add => "add",
            Self::Multiply => "multiply",
            Self::Draw => "draw",
            Self::Sine => "sine",
            Self::Time => "time",
            Self::RenderTarget => "render_target",
            Self::Primitive => "primitive",
            Self::Shader => "shader",
            Self::Color => "color",
            Self::Float => "float",
            Self::Float2 => "float2",
            Self::Float3 => "float3",
            Self::Float4 => "float4",
            Self::Float4x4 => "float4x4",
            Self::Int => "int",
            Self::Model => "model",
            Self::Texture => "texture",
            Self::Camera => "camera",
            Self::Transform => "transform",
            Self::Matrix4x4 => "matrix4x4",
        }
    }
}

/// Whether a node is a pin, and which way it faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// Identity node (not a pin)
    #[default]
    None = 0,
    /// Input pin
    In = 1,
    /// Output pin
    Out = 2,
}

impl Direction {
    /// Integer tag used by the text format
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Look up a direction from its integer tag
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::In),
            2 => Some(Self::Out),
            _ => None,
        }
    }

    /// Whether this is a pin direction
    pub fn is_pin(self) -> bool {
        self != Self::None
    }
}

/// A node record in the graph.
///
/// `value` is the only payload carried by the graph itself; richer
/// payloads live in the [`ValueStore`](crate::ValueStore) under the same id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Operation or payload type
    pub node_type: NodeType,
    /// Pin direction, `None` for identity nodes
    pub direction: Direction,
    /// Scalar value
    pub value: f32,
}

impl Node {
    /// Create an identity node
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            direction: Direction::None,
            value: 0.0,
        }
    }

    /// Create a pin node
    pub fn pin(node_type: NodeType, direction: Direction) -> Self {
        Self {
            node_type,
            direction,
            value: 0.0,
        }
    }

    /// Set the scalar value
    pub fn with_value(mut self, value: f32) -> Self {
        self.value = value;
        self
    }

    /// Diagnostic type name
    pub fn type_name(&self) -> &'static str {
        self.node_type.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tags_are_stable() {
        for tag in 0..21 {
            let node_type = NodeType::from_tag(tag).unwrap();
            assert_eq!(node_type.tag(), tag);
        }
        assert_eq!(NodeType::from_tag(21), None);
        assert_eq!(NodeType::Matrix4x4.tag(), 20);
    }

    #[test]
    fn test_direction_tags() {
        assert_eq!(Direction::from_tag(Direction::Out.tag()), Some(Direction::Out));
        assert_eq!(Direction::from_tag(3), None);
        assert!(!Direction::None.is_pin());
    }
}
