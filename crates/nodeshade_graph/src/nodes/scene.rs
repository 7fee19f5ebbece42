// SPDX-License-Identifier: MIT OR Apache-2.0
//! Scene matrix nodes: Camera and Transform.
//!
//! Both produce a row-major `Mat4`. Vector inputs are coerced to `Vec3`, so
//! a scalar broadcast or a wider vector are rejected with a type mismatch.

use super::pins;
use super::{NodeContext, UiNodeKind, UiNodeOps};
use crate::evaluation::{EvalError, EvalFrame};
use crate::graph::GraphError;
use crate::node::{NodeId, NodeType};
use crate::persist::{PersistError, RecordReader, RecordWriter};
use crate::value::{to_row_major, Value, ValueKind};
use crate::value_store::ValueStore;
use glam::{EulerRot, Mat4, Quat, Vec3};

fn vec3(frame: &EvalFrame<'_>, value: Value) -> Result<Vec3, EvalError> {
    match frame.expect(value, ValueKind::Vec3)? {
        Value::Vec3(v) => Ok(Vec3::from_array(v)),
        other => Err(EvalError::TypeMismatch {
            node: frame.node(),
            expected: ValueKind::Vec3,
            found: other.kind(),
        }),
    }
}

fn stored_vec3(values: &ValueStore, pin: NodeId, fallback: [f32; 3]) -> [f32; 3] {
    values.get_vec3(pin).unwrap_or(fallback)
}

/// Perspective camera producing `projection * view`
#[derive(Debug, Clone)]
pub struct CameraNode {
    id: NodeId,
    position: NodeId,
    target: NodeId,
    output: NodeId,
    /// Vertical field of view in degrees
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
    loaded_position: [f32; 3],
    loaded_target: [f32; 3],
}

impl CameraNode {
    const DEFAULT_POSITION: [f32; 3] = [0.0, 0.0, 5.0];

    /// Allocate the node in the graph
    pub fn create(ctx: &mut NodeContext<'_>) -> Result<Self, GraphError> {
        let id = pins::create_identity(ctx, NodeType::Camera)?;
        let position = pins::create_input(ctx, id, Value::Vec3(Self::DEFAULT_POSITION))?;
        let target = pins::create_input(ctx, id, Value::Vec3([0.0; 3]))?;
        let output = pins::create_output(ctx, id, ValueKind::Mat4.default_value())?;
        Ok(Self {
            id,
            position,
            target,
            output,
            fov_y: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 100.0,
            loaded_position: Self::DEFAULT_POSITION,
            loaded_target: [0.0; 3],
        })
    }

    /// Read `<id> position target output fov aspect near far px py pz tx ty tz`
    pub fn deserialize(reader: &mut RecordReader<'_>) -> Result<Self, PersistError> {
        Ok(Self {
            id: reader.id()?,
            position: reader.id()?,
            target: reader.id()?,
            output: reader.id()?,
            fov_y: reader.f32()?,
            aspect: reader.f32()?,
            near: reader.f32()?,
            far: reader.f32()?,
            loaded_position: reader.floats::<3>()?,
            loaded_target: reader.floats::<3>()?,
        })
    }

    /// Eye position pin
    pub fn position(&self) -> NodeId {
        self.position
    }

    /// Look-at target pin
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// View-projection pin
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Set the projection parameters
    pub fn set_lens(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.fov_y = fov_y;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
    }

    /// Compute `projection * view` for an eye and target
    pub fn view_projection(&self, eye: Vec3, target: Vec3) -> Mat4 {
        let projection =
            Mat4::perspective_rh(self.fov_y.to_radians(), self.aspect, self.near, self.far);
        projection * Mat4::look_at_rh(eye, target, Vec3::Y)
    }
}

impl UiNodeOps for CameraNode {
    fn kind(&self) -> UiNodeKind {
        UiNodeKind::Camera
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn inputs(&self) -> Vec<NodeId> {
        vec![self.position, self.target]
    }

    fn outputs(&self) -> Vec<NodeId> {
        vec![self.output]
    }

    fn on_load(&mut self, ctx: &mut NodeContext<'_>) {
        ctx.values.store(self.position, Value::Vec3(self.loaded_position));
        ctx.values.store(self.target, Value::Vec3(self.loaded_target));
        let matrix = self.view_projection(
            Vec3::from_array(self.loaded_position),
            Vec3::from_array(self.loaded_target),
        );
        ctx.values.store(self.output, Value::Mat4(to_row_major(matrix)));
    }

    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError> {
        let [eye, target] = frame.pop_array::<2>()?;
        let eye = vec3(frame, eye)?;
        let target = vec3(frame, target)?;
        let matrix = self.view_projection(eye, target);
        frame.output(self.output, Value::Mat4(to_row_major(matrix)));
        Ok(())
    }

    fn serialize(&self, values: &ValueStore, out: &mut RecordWriter) {
        out.id(self.id)
            .id(self.position)
            .id(self.target)
            .id(self.output)
            .f32(self.fov_y)
            .f32(self.aspect)
            .f32(self.near)
            .f32(self.far)
            .floats(&stored_vec3(values, self.position, self.loaded_position))
            .floats(&stored_vec3(values, self.target, self.loaded_target));
    }
}

/// Translation, XYZ Euler rotation (radians) and scale to a world matrix
#[derive(Debug, Clone)]
pub struct TransformNode {
    id: NodeId,
    translation: NodeId,
    rotation: NodeId,
    scale: NodeId,
    output: NodeId,
    loaded: [[f32; 3]; 3],
}

impl TransformNode {
    const IDENTITY: [[f32; 3]; 3] = [[0.0; 3], [0.0; 3], [1.0; 3]];

    /// Allocate the node in the graph
    pub fn create(ctx: &mut NodeContext<'_>) -> Result<Self, GraphError> {
        let [t, r, s] = Self::IDENTITY;
        let id = pins::create_identity(ctx, NodeType::Transform)?;
        let translation = pins::create_input(ctx, id, Value::Vec3(t))?;
        let rotation = pins::create_input(ctx, id, Value::Vec3(r))?;
        let scale = pins::create_input(ctx, id, Value::Vec3(s))?;
        let output = pins::create_output(ctx, id, ValueKind::Mat4.default_value())?;
        Ok(Self {
            id,
            translation,
            rotation,
            scale,
            output,
            loaded: Self::IDENTITY,
        })
    }

    /// Read `<id> translation rotation scale output tx ty tz rx ry rz sx sy sz`
    pub fn deserialize(reader: &mut RecordReader<'_>) -> Result<Self, PersistError> {
        Ok(Self {
            id: reader.id()?,
            translation: reader.id()?,
            rotation: reader.id()?,
            scale: reader.id()?,
            output: reader.id()?,
            loaded: [reader.floats::<3>()?, reader.floats::<3>()?, reader.floats::<3>()?],
        })
    }

    /// Translation pin
    pub fn translation(&self) -> NodeId {
        self.translation
    }

    /// Rotation pin
    pub fn rotation(&self) -> NodeId {
        self.rotation
    }

    /// Scale pin
    pub fn scale(&self) -> NodeId {
        self.scale
    }

    /// World matrix pin
    pub fn output(&self) -> NodeId {
        self.output
    }

    /// Compose `translation * rotation * scale`
    pub fn compose(translation: Vec3, rotation: Vec3, scale: Vec3) -> Mat4 {
        let rotation = Quat::from_euler(EulerRot::XYZ, rotation.x, rotation.y, rotation.z);
        Mat4::from_scale_rotation_translation(scale, rotation, translation)
    }
}

impl UiNodeOps for TransformNode {
    fn kind(&self) -> UiNodeKind {
        UiNodeKind::Transform
    }

    fn id(&self) -> NodeId {
        self.id
    }

    fn inputs(&self) -> Vec<NodeId> {
        vec![self.translation, self.rotation, self.scale]
    }

    fn outputs(&self) -> Vec<NodeId> {
        vec![self.output]
    }

    fn on_load(&mut self, ctx: &mut NodeContext<'_>) {
        let [t, r, s] = self.loaded;
        ctx.values.store(self.translation, Value::Vec3(t));
        ctx.values.store(self.rotation, Value::Vec3(r));
        ctx.values.store(self.scale, Value::Vec3(s));
        let matrix = Self::compose(Vec3::from_array(t), Vec3::from_array(r), Vec3::from_array(s));
        ctx.values.store(self.output, Value::Mat4(to_row_major(matrix)));
    }

    fn on_eval(&mut self, frame: &mut EvalFrame<'_>) -> Result<(), EvalError> {
        let [t, r, s] = frame.pop_array::<3>()?;
        let matrix = Self::compose(vec3(frame, t)?, vec3(frame, r)?, vec3(frame, s)?);
        frame.output(self.output, Value::Mat4(to_row_major(matrix)));
        Ok(())
    }

    fn serialize(&self, values: &ValueStore, out: &mut RecordWriter) {
        let [t, r, s] = self.loaded;
        out.id(self.id)
            .id(self.translation)
            .id(self.rotation)
            .id(self.scale)
            .id(self.output)
            .floats(&stored_vec3(values, self.translation, t))
            .floats(&stored_vec3(values, self.rotation, r))
            .floats(&stored_vec3(values, self.scale, s));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{Evaluator, NodeEvaluator};
    use crate::graph::Graph;
    use crate::services::Services;
    use crate::value::from_row_major;
    use glam::Vec4;

    struct Only<'n, N>(&'n mut N);

    impl<N: UiNodeOps> NodeEvaluator for Only<'_, N> {
        fn evaluate(&mut self, node_id: NodeId, frame: &mut EvalFrame<'_>) -> Result<bool, EvalError> {
            if node_id != self.0.id() {
                return Ok(false);
            }
            self.0.on_eval(frame)?;
            Ok(true)
        }
    }

    fn eval_output<N: UiNodeOps>(
        graph: &Graph,
        values: &mut ValueStore,
        node: &mut N,
    ) -> Result<Mat4, EvalError> {
        let root = node.outputs()[0];
        let report = Evaluator::default().evaluate(graph, values, root, 0.0, &mut Only(node))?;
        match report.top {
            Some(Value::Mat4(m)) => Ok(from_row_major(&m)),
            other => panic!("expected a matrix, got {other:?}"),
        }
    }

    #[test]
    fn test_transform_translation_lands_in_last_column() {
        let mut graph = Graph::new();
        let mut values = ValueStore::new();
        let mut services = Services::headless();
        let mut ctx = NodeContext {
            graph: &mut graph,
            values: &mut values,
            services: &mut services,
        };
        let mut transform = TransformNode::create(&mut ctx).unwrap();
        ctx.values.store(transform.translation(), Value::Vec3([1.0, 2.0, 3.0]));
        ctx.values.store(transform.scale(), Value::Vec3([2.0, 2.0, 2.0]));

        let matrix = eval_output(&graph, &mut values, &mut transform).unwrap();
        let stored = values.get_mat4(transform.output()).unwrap();
        assert_eq!([stored[3], stored[7], stored[11]], [1.0, 2.0, 3.0]);
        assert_eq!(matrix.transform_point3(Vec3::ONE), Vec3::new(3.0, 4.0, 5.0));
    }

    #[test]
    fn test_transform_rejects_wide_vectors() {
        let mut graph = Graph::new();
        let mut values = ValueStore::new();
        let mut services = Services::headless();
        let mut ctx = NodeContext {
            graph: &mut graph,
            values: &mut values,
            services: &mut services,
        };
        let mut transform = TransformNode::create(&mut ctx).unwrap();
        ctx.values.store(transform.rotation(), Value::Mat4([0.0; 16]));

        let err = eval_output(&graph, &mut values, &mut transform).unwrap_err();
        assert!(matches!(
            err,
            EvalError::TypeMismatch {
                expected: ValueKind::Vec3,
                found: ValueKind::Mat4,
                ..
            }
        ));
    }

    #[test]
    fn test_camera_centers_target() {
        let mut graph = Graph::new();
        let mut values = ValueStore::new();
        let mut services = Services::headless();
        let mut ctx = NodeContext {
            graph: &mut graph,
            values: &mut values,
            services: &mut services,
        };
        let mut camera = CameraNode::create(&mut ctx).unwrap();
        ctx.values.store(camera.target(), Value::Vec3([1.0, 0.0, 0.0]));

        let matrix = eval_output(&graph, &mut values, &mut camera).unwrap();
        let clip = matrix * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!((clip.x / clip.w).abs() < 1e-5);
        assert!((clip.y / clip.w).abs() < 1e-5);
        assert!(clip.w > 0.0);
    }
}
