// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed payloads carried by pins.

use crate::node::NodeType;
use glam::{Mat4, Vec4};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index value meaning "no asset"
pub const INVALID_INDEX: i32 = -1;

/// Payload type of a value box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// 32-bit float
    F32,
    /// 32-bit integer (also asset indices)
    I32,
    /// 2D vector
    Vec2,
    /// 3D vector
    Vec3,
    /// 4D vector / color
    Vec4,
    /// 4x4 matrix, row-major
    Mat4,
}

impl ValueKind {
    /// Number of 32-bit components in a constant buffer
    pub fn component_count(self) -> usize {
        match self {
            Self::Mat4 => 16,
            Self::Vec4 => 4,
            Self::Vec3 => 3,
            Self::Vec2 => 2,
            Self::F32 | Self::I32 => 1,
        }
    }

    /// Graph node type used for pins of this kind
    pub fn node_type(self) -> NodeType {
        match self {
            Self::F32 => NodeType::Float,
            Self::I32 => NodeType::Int,
            Self::Vec2 => NodeType::Float2,
            Self::Vec3 => NodeType::Float3,
            Self::Vec4 => NodeType::Float4,
            Self::Mat4 => NodeType::Float4x4,
        }
    }

    /// Payload kind for a pin node type
    pub fn from_node_type(node_type: NodeType) -> Option<Self> {
        match node_type {
            NodeType::Value | NodeType::Float => Some(Self::F32),
            NodeType::Int => Some(Self::I32),
            NodeType::Float2 => Some(Self::Vec2),
            NodeType::Float3 => Some(Self::Vec3),
            NodeType::Float4 | NodeType::Color => Some(Self::Vec4),
            NodeType::Float4x4 => Some(Self::Mat4),
            _ => None,
        }
    }

    /// Zero value of this kind (`INVALID_INDEX` for integers)
    pub fn default_value(self) -> Value {
        match self {
            Self::F32 => Value::F32(0.0),
            Self::I32 => Value::I32(INVALID_INDEX),
            Self::Vec2 => Value::Vec2([0.0; 2]),
            Self::Vec3 => Value::Vec3([0.0; 3]),
            Self::Vec4 => Value::Vec4([0.0; 4]),
            Self::Mat4 => Value::Mat4(Mat4::IDENTITY.to_cols_array()),
        }
    }

    /// Check if a value of this kind can feed a pin of another kind
    pub fn can_feed(self, target: ValueKind) -> bool {
        if self == target {
            return true;
        }

        match (self, target) {
            // Numeric conversions
            (Self::I32, Self::F32) | (Self::F32, Self::I32) => true,
            // Scalar broadcast and vector widening
            (Self::F32, Self::Vec2 | Self::Vec3 | Self::Vec4) => true,
            (Self::Vec2, Self::Vec3 | Self::Vec4) => true,
            (Self::Vec3, Self::Vec4) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::F32 => "float",
            Self::I32 => "int",
            Self::Vec2 => "float2",
            Self::Vec3 => "float3",
            Self::Vec4 => "float4",
            Self::Mat4 => "float4x4",
        };
        f.write_str(name)
    }
}

/// Shader binding variable type as reported by reflection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HlslType {
    /// `float`
    Float,
    /// `float2`
    Float2,
    /// `float3`
    Float3,
    /// `float4`
    Float4,
    /// `float4x4`
    Float4x4,
    /// `int`
    Int,
    /// Texture slot, bound by index
    Texture,
}

impl HlslType {
    /// Parse a reflected type name
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "float" => Some(Self::Float),
            "float2" => Some(Self::Float2),
            "float3" => Some(Self::Float3),
            "float4" => Some(Self::Float4),
            "float4x4" => Some(Self::Float4x4),
            "int" => Some(Self::Int),
            "texture" => Some(Self::Texture),
            _ => None,
        }
    }

    /// Reflected type name
    pub fn name(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Float2 => "float2",
            Self::Float3 => "float3",
            Self::Float4 => "float4",
            Self::Float4x4 => "float4x4",
            Self::Int => "int",
            Self::Texture => "texture",
        }
    }

    /// Kind of the value box backing a binding of this type
    pub fn value_kind(self) -> ValueKind {
        match self {
            Self::Float => ValueKind::F32,
            Self::Float2 => ValueKind::Vec2,
            Self::Float3 => ValueKind::Vec3,
            Self::Float4 => ValueKind::Vec4,
            Self::Float4x4 => ValueKind::Mat4,
            Self::Int | Self::Texture => ValueKind::I32,
        }
    }

    /// Constant buffer component count
    pub fn component_count(self) -> usize {
        self.value_kind().component_count()
    }
}

/// Error from arithmetic on mismatched kinds
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot {op} {lhs} and {rhs}")]
pub struct ValueError {
    /// Operation name
    pub op: &'static str,
    /// Left operand kind
    pub lhs: ValueKind,
    /// Right operand kind
    pub rhs: ValueKind,
}

/// A typed payload
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 32-bit float
    F32(f32),
    /// 32-bit integer
    I32(i32),
    /// 2D vector
    Vec2([f32; 2]),
    /// 3D vector
    Vec3([f32; 3]),
    /// 4D vector
    Vec4([f32; 4]),
    /// 4x4 matrix, row-major
    Mat4([f32; 16]),
}

impl Value {
    /// Get the kind of this value
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::F32(_) => ValueKind::F32,
            Self::I32(_) => ValueKind::I32,
            Self::Vec2(_) => ValueKind::Vec2,
            Self::Vec3(_) => ValueKind::Vec3,
            Self::Vec4(_) => ValueKind::Vec4,
            Self::Mat4(_) => ValueKind::Mat4,
        }
    }

    /// Scalar reading of a float or integer
    pub fn scalar(&self) -> Option<f32> {
        match self {
            Self::F32(v) => Some(*v),
            Self::I32(v) => Some(*v as f32),
            _ => None,
        }
    }

    /// Integer reading of a scalar, used for asset indices
    pub fn as_index(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            Self::F32(v) => Some(*v as i32),
            _ => None,
        }
    }

    /// Whether any component is nonzero
    pub fn is_nonzero(&self) -> bool {
        match self {
            Self::F32(v) => *v != 0.0,
            Self::I32(v) => *v != 0,
            Self::Vec2(v) => v.iter().any(|c| *c != 0.0),
            Self::Vec3(v) => v.iter().any(|c| *c != 0.0),
            Self::Vec4(v) => v.iter().any(|c| *c != 0.0),
            Self::Mat4(v) => v.iter().any(|c| *c != 0.0),
        }
    }

    /// Flattened components in constant buffer order
    pub fn components(&self) -> Vec<f32> {
        match self {
            Self::F32(v) => vec![*v],
            Self::I32(v) => vec![*v as f32],
            Self::Vec2(v) => v.to_vec(),
            Self::Vec3(v) => v.to_vec(),
            Self::Vec4(v) => v.to_vec(),
            Self::Mat4(v) => v.to_vec(),
        }
    }

    /// Convert to another kind when [`ValueKind::can_feed`] allows it
    pub fn coerce(self, target: ValueKind) -> Option<Value> {
        if self.kind() == target {
            return Some(self);
        }
        if !self.kind().can_feed(target) {
            return None;
        }

        let coerced = match (self, target) {
            (Self::I32(v), ValueKind::F32) => Self::F32(v as f32),
            (Self::F32(v), ValueKind::I32) => Self::I32(v as i32),
            (Self::F32(v), ValueKind::Vec2) => Self::Vec2([v; 2]),
            (Self::F32(v), ValueKind::Vec3) => Self::Vec3([v; 3]),
            (Self::F32(v), ValueKind::Vec4) => Self::Vec4([v; 4]),
            (Self::Vec2([x, y]), ValueKind::Vec3) => Self::Vec3([x, y, 0.0]),
            (Self::Vec2([x, y]), ValueKind::Vec4) => Self::Vec4([x, y, 0.0, 0.0]),
            (Self::Vec3([x, y, z]), ValueKind::Vec4) => Self::Vec4([x, y, z, 0.0]),
            _ => return None,
        };
        Some(coerced)
    }

    /// Apply `f` to every component. Integers become floats.
    pub fn map(self, f: impl Fn(f32) -> f32) -> Value {
        match self {
            Self::F32(v) => Self::F32(f(v)),
            Self::I32(v) => Self::F32(f(v as f32)),
            Self::Vec2(v) => Self::Vec2(v.map(f)),
            Self::Vec3(v) => Self::Vec3(v.map(f)),
            Self::Vec4(v) => Self::Vec4(v.map(f)),
            Self::Mat4(v) => Self::Mat4(v.map(f)),
        }
    }

    fn zip(self, rhs: Value, op: &'static str, f: impl Fn(f32, f32) -> f32) -> Result<Value, ValueError> {
        let result = match (self, rhs) {
            (Self::Vec2(a), Self::Vec2(b)) => Self::Vec2(std::array::from_fn(|i| f(a[i], b[i]))),
            (Self::Vec3(a), Self::Vec3(b)) => Self::Vec3(std::array::from_fn(|i| f(a[i], b[i]))),
            (Self::Vec4(a), Self::Vec4(b)) => Self::Vec4(std::array::from_fn(|i| f(a[i], b[i]))),
            (Self::Mat4(a), Self::Mat4(b)) => Self::Mat4(std::array::from_fn(|i| f(a[i], b[i]))),
            (lhs, rhs) => match (lhs.scalar(), rhs.scalar()) {
                (Some(a), Some(b)) => Self::F32(f(a, b)),
                (Some(a), None) => rhs.map(|x| f(a, x)),
                (None, Some(b)) => lhs.map(|x| f(x, b)),
                (None, None) => {
                    return Err(ValueError {
                        op,
                        lhs: lhs.kind(),
                        rhs: rhs.kind(),
                    })
                }
            },
        };
        Ok(result)
    }

    /// Component-wise sum with scalar broadcast
    pub fn add(self, rhs: Value) -> Result<Value, ValueError> {
        if let (Self::I32(a), Self::I32(b)) = (self, rhs) {
            return Ok(Self::I32(a.wrapping_add(b)));
        }
        self.zip(rhs, "add", |a, b| a + b)
    }

    /// Product: matrix product for matrices and matrix/vector pairs,
    /// component-wise otherwise
    pub fn mul(self, rhs: Value) -> Result<Value, ValueError> {
        match (self, rhs) {
            (Self::I32(a), Self::I32(b)) => Ok(Self::I32(a.wrapping_mul(b))),
            (Self::Mat4(a), Self::Mat4(b)) => {
                Ok(Self::Mat4(to_row_major(from_row_major(&a) * from_row_major(&b))))
            }
            (Self::Mat4(m), Self::Vec4(v)) => {
                Ok(Self::Vec4((from_row_major(&m) * Vec4::from_array(v)).to_array()))
            }
            (Self::Vec4(v), Self::Mat4(m)) => {
                Ok(Self::Vec4((from_row_major(&m).transpose() * Vec4::from_array(v)).to_array()))
            }
            (lhs, rhs) => lhs.zip(rhs, "multiply", |a, b| a * b),
        }
    }

    /// Absolute sine of every component
    pub fn abs_sin(self) -> Value {
        self.map(|x| x.sin().abs())
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::F32(0.0)
    }
}

/// Build a matrix from row-major storage
pub fn from_row_major(m: &[f32; 16]) -> Mat4 {
    Mat4::from_cols_array(m).transpose()
}

/// Flatten a matrix into row-major storage
pub fn to_row_major(m: Mat4) -> [f32; 16] {
    m.transpose().to_cols_array()
}
