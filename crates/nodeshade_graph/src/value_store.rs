// SPDX-License-Identifier: MIT OR Apache-2.0
//! Side table of typed value boxes, addressed by pin id.

use crate::id_map::IdMap;
use crate::node::NodeId;
use crate::value::{Value, ValueKind};

/// Value store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No box registered for the pin
    #[error("No value registered for pin {0}")]
    NotFound(NodeId),

    /// Box holds a different kind
    #[error("Pin {pin} holds {found}, expected {expected}")]
    TypeMismatch {
        /// Pin id
        pin: NodeId,
        /// Requested kind
        expected: ValueKind,
        /// Stored kind
        found: ValueKind,
    },
}

/// Result type for value store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Pin id to value box mapping
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    values: IdMap<NodeId, Value>,
}

macro_rules! typed_getter {
    ($(#[$doc:meta])* $name:ident, $variant:ident, $kind:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(&self, pin: NodeId) -> Result<$ty> {
            match self.get(pin)? {
                Value::$variant(v) => Ok(*v),
                other => Err(StoreError::TypeMismatch {
                    pin,
                    expected: ValueKind::$kind,
                    found: other.kind(),
                }),
            }
        }
    };
}

impl ValueStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a box for a pin, replacing whatever was there
    pub fn store(&mut self, pin: NodeId, value: Value) {
        match self.values.get_mut(pin) {
            Some(slot) => *slot = value,
            None => {
                self.values.insert(pin, value);
            }
        }
    }

    /// Get the box for a pin
    pub fn get(&self, pin: NodeId) -> Result<&Value> {
        self.values.get(pin).ok_or(StoreError::NotFound(pin))
    }

    /// Get the box for a pin, if any
    pub fn try_get(&self, pin: NodeId) -> Option<&Value> {
        self.values.get(pin)
    }

    /// Discard the box for a pin
    pub fn remove(&mut self, pin: NodeId) -> Option<Value> {
        self.values.remove(pin)
    }

    /// Whether a pin has a box
    pub fn contains(&self, pin: NodeId) -> bool {
        self.values.contains(pin)
    }

    /// Number of registered boxes
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drop every box
    pub fn clear(&mut self) {
        self.values.clear();
    }

    typed_getter!(
        /// Read a float box
        get_f32, F32, F32, f32
    );
    typed_getter!(
        /// Read an integer box
        get_i32, I32, I32, i32
    );
    typed_getter!(
        /// Read a 2D vector box
        get_vec2, Vec2, Vec2, [f32; 2]
    );
    typed_getter!(
        /// Read a 3D vector box
        get_vec3, Vec3, Vec3, [f32; 3]
    );
    typed_getter!(
        /// Read a 4D vector box
        get_vec4, Vec4, Vec4, [f32; 4]
    );
    typed_getter!(
        /// Read a matrix box
        get_mat4, Mat4, Mat4, [f32; 16]
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_writer_wins() {
        let mut store = ValueStore::new();
        store.store(NodeId(1), Value::F32(1.0));
        store.store(NodeId(1), Value::Vec2([2.0, 3.0]));
        assert_eq!(store.get(NodeId(1)), Ok(&Value::Vec2([2.0, 3.0])));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_missing_pin() {
        let store = ValueStore::new();
        assert_eq!(store.get(NodeId(4)), Err(StoreError::NotFound(NodeId(4))));
    }

    #[test]
    fn test_typed_access_reports_mismatch() {
        let mut store = ValueStore::new();
        store.store(NodeId(2), Value::I32(5));
        assert_eq!(store.get_i32(NodeId(2)), Ok(5));
        assert_eq!(
            store.get_f32(NodeId(2)),
            Err(StoreError::TypeMismatch {
                pin: NodeId(2),
                expected: ValueKind::F32,
                found: ValueKind::I32,
            })
        );
    }
}
