// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph evaluation and execution.
//!
//! Evaluation is a depth-first walk from the root along outgoing edges,
//! recording the visit order, followed by a reverse replay of that order
//! against a single value stack. Shared sub-expressions are expanded once
//! per consumer, so every consumer finds its own copy of the value on the
//! stack. Side effects are not repeated: a draw node reduced once per
//! consumer still queues a single draw call per walk.

use crate::graph::{Graph, GraphError};
use crate::node::{NodeId, NodeType};
use crate::services::DrawCall;
use crate::value::{Value, ValueError, ValueKind};
use crate::value_store::ValueStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Evaluation tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalSettings {
    /// Upper bound on nodes visited by one walk
    pub max_visits: usize,
    /// Multiplier applied to frame time before it reaches the clock
    pub time_scale: f32,
}

impl Default for EvalSettings {
    fn default() -> Self {
        Self {
            max_visits: 1 << 16,
            time_scale: 1.0,
        }
    }
}

impl EvalSettings {
    /// Parse settings from RON
    pub fn from_ron(text: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(text)
    }

    /// Render settings as pretty RON
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }
}

/// Error during evaluation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    /// No root node designated
    #[error("No root node to evaluate")]
    MissingRoot,

    /// Structural violation
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Graph contains a cycle reachable from the root
    #[error("Graph contains a cycle reachable from node {0}")]
    CycleDetected(NodeId),

    /// The walk visited more nodes than allowed
    #[error("Evaluation exceeded {0} node visits")]
    VisitLimitExceeded(usize),

    /// Value stack underflow
    #[error("Malformed graph at node {node} ({node_type:?}): needs {expected} values, stack has {available}")]
    MalformedGraph {
        /// Node being reduced
        node: NodeId,
        /// Its type
        node_type: NodeType,
        /// Values required
        expected: usize,
        /// Values available
        available: usize,
    },

    /// Operands of incompatible kinds
    #[error("Node {node}: {source}")]
    Value {
        /// Node being reduced
        node: NodeId,
        /// Arithmetic failure
        #[source]
        source: ValueError,
    },

    /// Operand of the wrong kind
    #[error("Node {node} expected {expected}, got {found}")]
    TypeMismatch {
        /// Node being reduced
        node: NodeId,
        /// Expected kind
        expected: ValueKind,
        /// Actual kind
        found: ValueKind,
    },

    /// Identity node of a kind that only a UI node can evaluate
    #[error("Node {0} ({1:?}) has no evaluator")]
    Unowned(NodeId, NodeType),
}

/// Outcome of one evaluation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalReport {
    /// Value left on top of the stack
    pub top: Option<Value>,
    /// Render target state, if a render target was reduced
    pub ready: Option<bool>,
    /// Draw calls queued during the walk
    pub draw_calls: Vec<DrawCall>,
    /// Number of visited nodes
    pub visited: usize,
}

/// View of the evaluation state handed to one node's reduction
pub struct EvalFrame<'a> {
    node: NodeId,
    node_type: NodeType,
    time: f32,
    stack: &'a mut Vec<Value>,
    values: &'a mut ValueStore,
    draw_calls: &'a mut Vec<DrawCall>,
    submitted: &'a mut HashSet<NodeId>,
    ready: &'a mut Option<bool>,
}

impl<'a> EvalFrame<'a> {
    /// Node being reduced
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Clock value for this evaluation
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Push a value
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pop `n` values, returned in push order.
    ///
    /// Nothing is popped when fewer than `n` values are available.
    pub fn pop_n(&mut self, n: usize) -> Result<Vec<Value>, EvalError> {
        let available = self.stack.len();
        if available < n {
            return Err(EvalError::MalformedGraph {
                node: self.node,
                node_type: self.node_type,
                expected: n,
                available,
            });
        }
        Ok(self.stack.split_off(available - n))
    }

    /// Pop a fixed number of values, returned in push order
    pub fn pop_array<const N: usize>(&mut self) -> Result<[Value; N], EvalError> {
        let popped = self.pop_n(N)?;
        Ok(std::array::from_fn(|i| popped[i]))
    }

    /// Read-only view of the value store
    pub fn values(&self) -> &ValueStore {
        self.values
    }

    /// Store an output box and push the value
    pub fn output(&mut self, pin: NodeId, value: Value) {
        self.values.store(pin, value);
        self.stack.push(value);
    }

    /// Queue a draw call for submission after a successful walk.
    ///
    /// Only the first call from each node is kept.
    pub fn submit(&mut self, call: DrawCall) {
        if self.submitted.insert(self.node) {
            self.draw_calls.push(call);
        } else {
            tracing::trace!("Node {} already queued a draw call", self.node);
        }
    }

    /// Record the render target state
    pub fn set_ready(&mut self, ready: bool) {
        *self.ready = Some(ready);
    }

    /// Coerce a popped operand or fail with a type mismatch
    pub fn expect(&self, value: Value, kind: ValueKind) -> Result<Value, EvalError> {
        value.coerce(kind).ok_or(EvalError::TypeMismatch {
            node: self.node,
            expected: kind,
            found: value.kind(),
        })
    }

    /// Wrap an arithmetic error with the current node
    pub fn value_error(&self, source: ValueError) -> EvalError {
        EvalError::Value {
            node: self.node,
            source,
        }
    }
}

/// Trait for evaluating identity nodes owned by UI nodes
pub trait NodeEvaluator {
    /// Reduce `node_id`. Returns `false` when nothing owns the node.
    fn evaluate(&mut self, node_id: NodeId, frame: &mut EvalFrame<'_>) -> Result<bool, EvalError>;
}

/// Evaluator for bare graphs: built-in reductions only
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinOnly;

impl NodeEvaluator for BuiltinOnly {
    fn evaluate(&mut self, _node_id: NodeId, _frame: &mut EvalFrame<'_>) -> Result<bool, EvalError> {
        Ok(false)
    }
}

/// Depth-first stack evaluator
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    settings: EvalSettings,
}

impl Evaluator {
    /// Create an evaluator
    pub fn new(settings: EvalSettings) -> Self {
        Self { settings }
    }

    /// Current settings
    pub fn settings(&self) -> &EvalSettings {
        &self.settings
    }

    /// Nodes in visitation order, starting with `root`
    pub fn visit_order(&self, graph: &Graph, root: NodeId) -> Result<Vec<NodeId>, EvalError> {
        if !graph.contains_node(root) {
            return Err(GraphError::NodeNotFound(root).into());
        }
        if graph.has_cycle_from(root) {
            return Err(EvalError::CycleDetected(root));
        }

        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(current) = stack.pop() {
            if order.len() == self.settings.max_visits {
                return Err(EvalError::VisitLimitExceeded(self.settings.max_visits));
            }
            order.push(current);
            stack.extend_from_slice(graph.neighbors(current));
        }
        Ok(order)
    }

    /// Evaluate the graph from `root`.
    ///
    /// Draw calls are only returned when the whole walk succeeds.
    pub fn evaluate(
        &self,
        graph: &Graph,
        values: &mut ValueStore,
        root: NodeId,
        time: f32,
        owners: &mut dyn NodeEvaluator,
    ) -> Result<EvalReport, EvalError> {
        let order = self.visit_order(graph, root)?;

        let mut stack: Vec<Value> = Vec::new();
        let mut draw_calls = Vec::new();
        let mut submitted = HashSet::new();
        let mut ready = None;

        for &id in order.iter().rev() {
            let node = *graph.node(id).ok_or(GraphError::NodeNotFound(id))?;

            if node.direction.is_pin() || node.node_type == NodeType::Value {
                if graph.num_edges_from_node(id) == 0 {
                    let value = values.try_get(id).copied().unwrap_or(Value::F32(node.value));
                    stack.push(value);
                }
                continue;
            }

            let mut frame = EvalFrame {
                node: id,
                node_type: node.node_type,
                time,
                stack: &mut stack,
                values: &mut *values,
                draw_calls: &mut draw_calls,
                submitted: &mut submitted,
                ready: &mut ready,
            };
            if !owners.evaluate(id, &mut frame)? {
                reduce_builtin(&mut frame, node.value)?;
            }
        }

        if stack.len() > 1 {
            tracing::warn!("Evaluation left {} values on the stack", stack.len());
        }

        Ok(EvalReport {
            top: stack.last().copied(),
            ready,
            draw_calls,
            visited: order.len(),
        })
    }
}

/// Built-in reduction for identity nodes that no UI node owns
fn reduce_builtin(frame: &mut EvalFrame<'_>, scalar: f32) -> Result<(), EvalError> {
    match frame.node_type {
        NodeType::Add => {
            let [lhs, rhs] = frame.pop_array::<2>()?;
            let sum = lhs.add(rhs).map_err(|e| frame.value_error(e))?;
            frame.push(sum);
        }
        NodeType::Multiply => {
            let [lhs, rhs] = frame.pop_array::<2>()?;
            let product = lhs.mul(rhs).map_err(|e| frame.value_error(e))?;
            frame.push(product);
        }
        NodeType::Sine => {
            let [x] = frame.pop_array::<1>()?;
            frame.push(x.abs_sin());
        }
        NodeType::Time => {
            let time = frame.time();
            frame.push(Value::F32(time));
        }
        NodeType::Draw => {
            let [vs, ps, model, r, g, b] = frame.pop_array::<6>()?;
            let index = |v: Value| v.as_index().unwrap_or(crate::value::INVALID_INDEX);
            let channel = |v: Value| v.scalar().unwrap_or(0.0).clamp(0.0, 1.0);
            let call = DrawCall {
                vertex_shader: index(vs),
                pixel_shader: index(ps),
                model: index(model),
                color: [channel(r), channel(g), channel(b)],
                bindings: Vec::new(),
            };
            let ready = call.is_complete();
            if ready {
                frame.submit(call);
            }
            frame.push(Value::F32(if ready { 1.0 } else { 0.0 }));
        }
        NodeType::RenderTarget => {
            let [input] = frame.pop_array::<1>()?;
            frame.set_ready(input.is_nonzero());
        }
        NodeType::Camera | NodeType::Transform => {
            return Err(EvalError::Unowned(frame.node(), frame.node_type));
        }
        _ => {
            let value = frame.values().try_get(frame.node()).copied();
            frame.push(value.unwrap_or(Value::F32(scalar)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeKind;
    use crate::node::{Direction, Node};
    use proptest::prelude::*;

    fn value(graph: &mut Graph, v: f32) -> NodeId {
        graph.create_node(Node::new(NodeType::Value).with_value(v)).unwrap()
    }

    fn op(graph: &mut Graph, node_type: NodeType, inputs: &[NodeId]) -> NodeId {
        let id = graph.create_node(Node::new(node_type)).unwrap();
        for input in inputs {
            graph.create_edge(id, *input, EdgeKind::Internal).unwrap();
        }
        id
    }

    fn eval(graph: &Graph, root: NodeId, time: f32) -> Result<EvalReport, EvalError> {
        Evaluator::default().evaluate(graph, &mut ValueStore::new(), root, time, &mut BuiltinOnly)
    }

    #[test]
    fn test_binary_operand_order() {
        let mut graph = Graph::new();
        let lhs = value(&mut graph, 2.0);
        let rhs = value(&mut graph, 3.0);
        let product = op(&mut graph, NodeType::Multiply, &[lhs, rhs]);
        let three = value(&mut graph, 3.0);
        let sum = op(&mut graph, NodeType::Add, &[product, three]);

        let report = eval(&graph, sum, 0.0).unwrap();
        assert_eq!(report.top, Some(Value::F32(9.0)));
    }

    #[test]
    fn test_linked_value_is_a_pass_through() {
        let mut graph = Graph::new();
        let four = value(&mut graph, 4.0);
        let sine = op(&mut graph, NodeType::Sine, &[four]);
        // A pin with an outgoing edge contributes nothing of its own
        let pin = graph.create_node(Node::pin(NodeType::Float, Direction::In).with_value(100.0)).unwrap();
        graph.create_edge(pin, sine, EdgeKind::External).unwrap();
        let root = op(&mut graph, NodeType::Sine, &[pin]);

        let report = eval(&graph, root, 0.0).unwrap();
        let expected = 4.0f32.sin().abs().sin().abs();
        assert_eq!(report.top, Some(Value::F32(expected)));
    }

    #[test]
    fn test_time_fan_out_pushes_one_clock_value() {
        let mut graph = Graph::new();
        let time = graph.create_node(Node::new(NodeType::Time)).unwrap();
        let one = value(&mut graph, 1.0);
        let two = value(&mut graph, 2.0);
        let first = op(&mut graph, NodeType::Add, &[time, one]);
        let second = op(&mut graph, NodeType::Add, &[time, two]);
        let root = op(&mut graph, NodeType::Multiply, &[first, second]);

        let report = eval(&graph, root, 0.5).unwrap();
        assert_eq!(report.top, Some(Value::F32(1.5 * 2.5)));
    }

    #[test]
    fn test_render_target_readiness() {
        let mut graph = Graph::new();
        let zero = value(&mut graph, 0.0);
        let target = op(&mut graph, NodeType::RenderTarget, &[zero]);
        assert_eq!(eval(&graph, target, 0.0).unwrap().ready, Some(false));

        graph.set_node_value(zero, 1.0).unwrap();
        assert_eq!(eval(&graph, target, 0.0).unwrap().ready, Some(true));
    }

    #[test]
    fn test_bare_draw_pops_six_and_clamps_color() {
        let mut graph = Graph::new();
        let inputs: Vec<NodeId> = [0.0, 1.0, 2.0, 1.5, -0.5, 0.25]
            .into_iter()
            .map(|v| value(&mut graph, v))
            .collect();
        let draw = op(&mut graph, NodeType::Draw, &inputs);
        let target = op(&mut graph, NodeType::RenderTarget, &[draw]);

        let report = eval(&graph, target, 0.0).unwrap();
        assert_eq!(report.ready, Some(true));
        assert_eq!(report.draw_calls.len(), 1);
        let call = &report.draw_calls[0];
        assert_eq!((call.vertex_shader, call.pixel_shader, call.model), (0, 1, 2));
        assert_eq!(call.color, [1.0, 0.0, 0.25]);
    }

    #[test]
    fn test_shared_draw_queues_one_call() {
        let mut graph = Graph::new();
        let inputs: Vec<NodeId> = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0]
            .into_iter()
            .map(|v| value(&mut graph, v))
            .collect();
        let draw = op(&mut graph, NodeType::Draw, &inputs);
        let both = op(&mut graph, NodeType::Add, &[draw, draw]);
        let target = op(&mut graph, NodeType::RenderTarget, &[both]);

        let report = eval(&graph, target, 0.0).unwrap();
        assert_eq!(report.ready, Some(true));
        assert_eq!(report.draw_calls.len(), 1);
    }

    #[test]
    fn test_underflow_is_malformed_and_discards_draws() {
        let mut graph = Graph::new();
        let inputs: Vec<NodeId> = (0..6).map(|_| value(&mut graph, 0.0)).collect();
        let first = op(&mut graph, NodeType::Draw, &inputs);
        let extra = value(&mut graph, 1.0);
        // The first draw reduces fine, the second finds only two values
        let second = op(&mut graph, NodeType::Draw, &[first, extra]);

        let error = eval(&graph, second, 0.0).unwrap_err();
        assert_eq!(
            error,
            EvalError::MalformedGraph {
                node: second,
                node_type: NodeType::Draw,
                expected: 6,
                available: 2,
            }
        );
    }

    #[test]
    fn test_cycles_are_rejected() {
        let mut graph = Graph::new();
        let a = graph.create_node(Node::new(NodeType::Sine)).unwrap();
        let b = graph.create_node(Node::new(NodeType::Sine)).unwrap();
        graph.create_edge(a, b, EdgeKind::Internal).unwrap();
        graph.create_edge(b, a, EdgeKind::Internal).unwrap();
        assert_eq!(eval(&graph, a, 0.0), Err(EvalError::CycleDetected(a)));
    }

    #[test]
    fn test_visit_limit() {
        let mut graph = Graph::new();
        let leaf = value(&mut graph, 1.0);
        let mut top = leaf;
        // Each level doubles the expanded size
        for _ in 0..12 {
            top = op(&mut graph, NodeType::Add, &[top, top]);
        }
        let evaluator = Evaluator::new(EvalSettings {
            max_visits: 1000,
            ..EvalSettings::default()
        });
        let result = evaluator.evaluate(&graph, &mut ValueStore::new(), top, 0.0, &mut BuiltinOnly);
        assert_eq!(result, Err(EvalError::VisitLimitExceeded(1000)));
    }

    #[test]
    fn test_settings_ron_round_trip() {
        let settings = EvalSettings {
            max_visits: 42,
            time_scale: 0.5,
        };
        let text = settings.to_ron().unwrap();
        assert_eq!(EvalSettings::from_ron(&text).unwrap(), settings);
        assert_eq!(EvalSettings::from_ron("()").unwrap(), EvalSettings::default());
    }

    /// Expression tree used to build random DAGs with shared sub-expressions
    #[derive(Debug, Clone)]
    enum Expr {
        Leaf(i8),
        Time,
        Add(usize, usize),
        Mul(usize, usize),
        Sine(usize),
    }

    fn reference(exprs: &[Expr], index: usize, time: f32) -> f32 {
        match exprs[index] {
            Expr::Leaf(v) => f32::from(v),
            Expr::Time => time,
            Expr::Add(a, b) => reference(exprs, a, time) + reference(exprs, b, time),
            Expr::Mul(a, b) => reference(exprs, a, time) * reference(exprs, b, time),
            Expr::Sine(a) => reference(exprs, a, time).sin().abs(),
        }
    }

    fn dag() -> impl Strategy<Value = Vec<Expr>> {
        proptest::collection::vec((0u8..5, any::<i8>(), any::<usize>(), any::<usize>()), 1..14)
            .prop_map(|raw| {
                let mut exprs = Vec::with_capacity(raw.len());
                for (i, (tag, leaf, a, b)) in raw.into_iter().enumerate() {
                    let expr = if i == 0 {
                        Expr::Leaf(leaf)
                    } else {
                        match tag {
                            0 => Expr::Leaf(leaf),
                            1 => Expr::Time,
                            2 => Expr::Add(a % i, b % i),
                            3 => Expr::Mul(a % i, b % i),
                            _ => Expr::Sine(a % i),
                        }
                    };
                    exprs.push(expr);
                }
                exprs
            })
    }

    proptest! {
        #[test]
        fn prop_stack_walk_matches_recursive_reference(exprs in dag(), time in -4.0f32..4.0) {
            let mut graph = Graph::new();
            let mut ids = Vec::with_capacity(exprs.len());
            for expr in &exprs {
                let id = match *expr {
                    Expr::Leaf(v) => value(&mut graph, f32::from(v)),
                    Expr::Time => graph.create_node(Node::new(NodeType::Time)).unwrap(),
                    Expr::Add(a, b) => op(&mut graph, NodeType::Add, &[ids[a], ids[b]]),
                    Expr::Mul(a, b) => op(&mut graph, NodeType::Multiply, &[ids[a], ids[b]]),
                    Expr::Sine(a) => op(&mut graph, NodeType::Sine, &[ids[a]]),
                };
                ids.push(id);
            }
            let root = *ids.last().unwrap();

            let evaluator = Evaluator::new(EvalSettings { max_visits: usize::MAX, ..EvalSettings::default() });
            let mut values = ValueStore::new();
            let first = evaluator.evaluate(&graph, &mut values, root, time, &mut BuiltinOnly).unwrap();
            let second = evaluator.evaluate(&graph, &mut values, root, time, &mut BuiltinOnly).unwrap();
            prop_assert_eq!(&first, &second);

            let expected = reference(&exprs, exprs.len() - 1, time);
            let Some(Value::F32(actual)) = first.top else {
                return Err(TestCaseError::fail("no scalar result"));
            };
            prop_assert!(
                actual == expected || (actual.is_nan() && expected.is_nan()),
                "walk produced {} but reference is {}", actual, expected
            );
        }
    }
}
