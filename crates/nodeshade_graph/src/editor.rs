// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editor facade tying the graph, value store, UI nodes and event bus together.
//!
//! All structural edits go through [`Editor`]. Graph mutations only record
//! events; the editor drains them after each operation and delivers them to
//! the attached UI nodes. Handlers may edit the graph again, which queues
//! further events for the same drain loop.

use crate::edge::{EdgeId, EdgeKind};
use crate::evaluation::{EvalError, EvalFrame, EvalReport, EvalSettings, Evaluator, NodeEvaluator};
use crate::events::{EventBus, GraphEvent};
use crate::graph::{Graph, GraphError};
use crate::node::{Direction, NodeId};
use crate::nodes::{pins, NodeContext, Timer, UiNode, UiNodeKind, UiNodeOps};
use crate::persist::{self, LoadedDocument, PersistError};
use crate::services::{AssetError, PrimitiveShape, Services};
use crate::value::{Value, ValueKind};
use crate::value_store::{StoreError, ValueStore};
use indexmap::IndexMap;
use std::path::Path;

/// Events delivered per drain before the rest are dropped
const MAX_EVENTS_PER_DRAIN: usize = 1 << 12;

/// Error when linking two pins
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Not a pin node
    #[error("Node {0} is not a pin")]
    NotAPin(NodeId),

    /// Pin without an owning UI node
    #[error("Pin {0} has no owning node")]
    Unowned(NodeId),

    /// Both pins are inputs or both are outputs
    #[error("Pins {0} and {1} have the same direction")]
    DirectionMismatch(NodeId, NodeId),

    /// Both pins belong to the same UI node
    #[error("Pins {0} and {1} belong to the same node")]
    SameNode(NodeId, NodeId),

    /// The output kind cannot feed the input kind
    #[error("Cannot feed {output} into {input}")]
    Incompatible {
        /// Producing pin kind
        output: ValueKind,
        /// Consuming pin kind
        input: ValueKind,
    },

    /// The input already has a producer
    #[error("Input pin {0} is already linked")]
    PinAlreadyLinked(NodeId),

    /// The link would close a cycle
    #[error("Linking {input} to {output} would create a cycle")]
    WouldCycle {
        /// Consuming pin
        input: NodeId,
        /// Producing pin
        output: NodeId,
    },

    /// Edge is internal wiring, not a user link
    #[error("Edge {0} is not a link")]
    NotALink(EdgeId),
}

/// Editor errors
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// No UI node with this identity
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// The node exists but is of another kind
    #[error("Node {node} is a {found:?}, not a {expected}")]
    WrongKind {
        /// Node identity
        node: NodeId,
        /// What the operation needs
        expected: &'static str,
        /// What the node is
        found: UiNodeKind,
    },

    /// Link rejected
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Structural error
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Value box error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Evaluation error
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// Save or load error
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Collaborator error
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Result type for editor operations
pub type Result<T> = std::result::Result<T, EditorError>;

impl NodeEvaluator for IndexMap<NodeId, UiNode> {
    fn evaluate(&mut self, node_id: NodeId, frame: &mut EvalFrame<'_>) -> std::result::Result<bool, EvalError> {
        match self.get_mut(&node_id) {
            Some(node) => {
                node.on_eval(frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// A node graph document with its collaborators
#[derive(Debug)]
pub struct Editor {
    graph: Graph,
    values: ValueStore,
    bus: EventBus,
    nodes: IndexMap<NodeId, UiNode>,
    root: Option<NodeId>,
    services: Services,
    evaluator: Evaluator,
    clock: Timer,
}

impl Editor {
    /// Create an empty editor
    pub fn new(services: Services) -> Self {
        Self::with_settings(services, EvalSettings::default())
    }

    /// Create an empty editor with custom evaluation settings
    pub fn with_settings(services: Services, settings: EvalSettings) -> Self {
        Self {
            graph: Graph::new(),
            values: ValueStore::new(),
            bus: EventBus::new(),
            nodes: IndexMap::new(),
            root: None,
            services,
            evaluator: Evaluator::new(settings),
            clock: Timer::default(),
        }
    }

    /// The graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The value boxes
    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    /// The event bus
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Collaborators
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Mutable collaborators
    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }

    /// Evaluation root
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Frame clock
    pub fn clock(&self) -> Timer {
        self.clock
    }

    /// Get a UI node by identity
    pub fn node(&self, id: NodeId) -> Option<&UiNode> {
        self.nodes.get(&id)
    }

    /// UI nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &UiNode> + '_ {
        self.nodes.values()
    }

    /// Number of UI nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// UI node owning a pin (or the node itself, given an identity)
    pub fn owner_of(&self, pin: NodeId) -> Option<NodeId> {
        if self.nodes.contains_key(&pin) {
            return Some(pin);
        }
        self.nodes
            .values()
            .find(|node| node.pins().contains(&pin))
            .map(UiNodeOps::id)
    }

    /// Create a UI node. The first render target becomes the root.
    pub fn add_node(&mut self, kind: UiNodeKind) -> Result<NodeId> {
        let node = {
            let mut ctx = NodeContext {
                graph: &mut self.graph,
                values: &mut self.values,
                services: &mut self.services,
            };
            UiNode::create(kind, &mut ctx)?
        };

        let id = node.id();
        if node.observes_events() {
            self.bus.attach(id);
        }
        if kind == UiNodeKind::RenderTarget && self.root.is_none() {
            self.root = Some(id);
        }
        self.nodes.insert(id, node);
        self.drain_events();
        Ok(id)
    }

    /// Delete a UI node, its pins and every link touching them
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let mut node = self
            .nodes
            .shift_remove(&id)
            .ok_or(EditorError::UnknownNode(id))?;
        if node.observes_events() {
            self.bus.detach(id);
        }
        if self.root == Some(id) {
            self.root = None;
        }

        let mut ctx = NodeContext {
            graph: &mut self.graph,
            values: &mut self.values,
            services: &mut self.services,
        };
        let result = node.on_delete(&mut ctx);
        self.drain_events();
        tracing::debug!("Removed {} node {id}", node.kind().display_name());
        result.map_err(Into::into)
    }

    /// Use another node as the evaluation root
    pub fn set_root(&mut self, root: Option<NodeId>) -> Result<()> {
        if let Some(id) = root {
            if !self.graph.contains_node(id) {
                return Err(GraphError::NodeNotFound(id).into());
            }
        }
        self.root = root;
        Ok(())
    }

    fn pin_kind(&self, pin: NodeId) -> Result<ValueKind> {
        Ok(self.values.get(pin)?.kind())
    }

    /// Link an output pin to an input pin, in either argument order.
    ///
    /// The edge is stored from the input to the output.
    pub fn link(&mut self, a: NodeId, b: NodeId) -> Result<EdgeId> {
        let node_a = self.graph.node(a).ok_or(GraphError::NodeNotFound(a))?;
        let node_b = self.graph.node(b).ok_or(GraphError::NodeNotFound(b))?;
        for (id, node) in [(a, node_a), (b, node_b)] {
            if !node.direction.is_pin() {
                return Err(LinkError::NotAPin(id).into());
            }
        }
        if node_a.direction == node_b.direction {
            return Err(LinkError::DirectionMismatch(a, b).into());
        }
        let (input, output) = if node_a.direction == Direction::In {
            (a, b)
        } else {
            (b, a)
        };

        let input_owner = self.owner_of(input).ok_or(LinkError::Unowned(input))?;
        let output_owner = self.owner_of(output).ok_or(LinkError::Unowned(output))?;
        if input_owner == output_owner {
            return Err(LinkError::SameNode(input, output).into());
        }

        let input_kind = self.pin_kind(input)?;
        let output_kind = self.pin_kind(output)?;
        if !output_kind.can_feed(input_kind) {
            return Err(LinkError::Incompatible {
                output: output_kind,
                input: input_kind,
            }
            .into());
        }
        if self.graph.num_edges_from_node(input) > 0 {
            return Err(LinkError::PinAlreadyLinked(input).into());
        }
        if self.graph.reaches(output, input) {
            return Err(LinkError::WouldCycle { input, output }.into());
        }

        let edge = self.graph.create_edge(input, output, EdgeKind::External)?;
        self.drain_events();
        Ok(edge)
    }

    /// Remove a user link
    pub fn unlink(&mut self, edge: EdgeId) -> Result<()> {
        let found = self.graph.edge(edge).ok_or(GraphError::EdgeNotFound(edge))?;
        if !found.is_external() {
            return Err(LinkError::NotALink(edge).into());
        }
        self.graph.erase_edge(edge)?;
        self.drain_events();
        Ok(())
    }

    /// Link feeding an input pin, if any
    pub fn link_into(&self, input: NodeId) -> Option<EdgeId> {
        self.graph
            .edges_from(input)
            .find(|e| e.is_external())
            .map(|e| e.id)
    }

    /// Set a pin's locally entered value, coerced to the pin's kind
    pub fn set_pin_value(&mut self, pin: NodeId, value: Value) -> Result<()> {
        let expected = self.pin_kind(pin)?;
        let coerced = value.coerce(expected).ok_or(StoreError::TypeMismatch {
            pin,
            expected,
            found: value.kind(),
        })?;
        pins::write_pin(&mut self.graph, &mut self.values, pin, coerced);
        Ok(())
    }

    /// Current value of a pin
    pub fn pin_value(&self, pin: NodeId) -> Result<Value> {
        Ok(*self.values.get(pin)?)
    }

    fn with_node<T>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut UiNode, &mut NodeContext<'_>) -> Option<T>,
        expected: &'static str,
    ) -> Result<T> {
        let node = self.nodes.get_mut(&id).ok_or(EditorError::UnknownNode(id))?;
        let mut ctx = NodeContext {
            graph: &mut self.graph,
            values: &mut self.values,
            services: &mut self.services,
        };
        let found = node.kind();
        let result = f(node, &mut ctx).ok_or(EditorError::WrongKind {
            node: id,
            expected,
            found,
        });
        self.drain_events();
        result
    }

    /// Point a Model, Texture or Shader node at a path. Returns the resolved index.
    pub fn set_asset_path(&mut self, id: NodeId, path: Option<String>) -> Result<i32> {
        self.with_node(
            id,
            |node, ctx| match node {
                UiNode::Asset(asset) => Some(asset.set_path(ctx, path)),
                _ => None,
            },
            "asset node",
        )
    }

    /// Switch a Primitive node's mesh. Returns the resolved index.
    pub fn set_primitive_shape(&mut self, id: NodeId, shape: PrimitiveShape) -> Result<i32> {
        self.with_node(
            id,
            |node, ctx| match node {
                UiNode::Primitive(primitive) => Some(primitive.set_shape(ctx, shape)),
                _ => None,
            },
            "primitive node",
        )
    }

    /// Set a Draw node's clear color
    pub fn set_draw_color(&mut self, id: NodeId, color: [f32; 3]) -> Result<()> {
        self.with_node(
            id,
            |node, _| match node {
                UiNode::Draw(draw) => {
                    draw.set_color(color);
                    Some(())
                }
                _ => None,
            },
            "draw node",
        )
    }

    /// Set a Camera node's projection
    pub fn set_camera_lens(&mut self, id: NodeId, fov_y: f32, aspect: f32, near: f32, far: f32) -> Result<()> {
        self.with_node(
            id,
            |node, _| match node {
                UiNode::Camera(camera) => {
                    camera.set_lens(fov_y, aspect, near, far);
                    Some(())
                }
                _ => None,
            },
            "camera node",
        )
    }

    /// Recompile a shader and tell the observers
    pub fn reload_shader(&mut self, index: i32) -> Result<()> {
        self.services.shaders.reload(index)?;
        self.graph.push_event(GraphEvent::ShaderUpdated { index });
        self.drain_events();
        Ok(())
    }

    /// Advance the clock and run `on_update` on every node in insertion order
    pub fn update(&mut self, dt: f32) {
        self.clock.advance(dt * self.evaluator.settings().time_scale);

        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            let mut ctx = NodeContext {
                graph: &mut self.graph,
                values: &mut self.values,
                services: &mut self.services,
            };
            node.on_update(&mut ctx, &self.clock);
            self.drain_events();
        }
    }

    /// Evaluate from the root and submit the draw calls.
    ///
    /// A failed walk clears the root render target's ready flag.
    pub fn evaluate(&mut self) -> Result<EvalReport> {
        let root = self.root.ok_or(EvalError::MissingRoot)?;
        let result = self.evaluator.evaluate(
            &self.graph,
            &mut self.values,
            root,
            self.clock.elapsed,
            &mut self.nodes,
        );
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                if let Some(UiNode::RenderTarget(target)) = self.nodes.get_mut(&root) {
                    target.invalidate();
                }
                return Err(e.into());
            }
        };

        for call in &report.draw_calls {
            if let Err(e) = self.services.renderer.render_to_texture(call) {
                tracing::warn!("Render of model {} failed: {e}", call.model);
            }
        }
        Ok(report)
    }

    /// One frame: update, then evaluate
    pub fn frame(&mut self, dt: f32) -> Result<EvalReport> {
        self.update(dt);
        self.evaluate()
    }

    /// Deliver queued graph events to the observers
    fn drain_events(&mut self) {
        let Self {
            graph,
            values,
            bus,
            nodes,
            services,
            ..
        } = self;

        let mut delivered = 0;
        while let Some(event) = graph.take_event() {
            delivered += 1;
            if delivered > MAX_EVENTS_PER_DRAIN {
                let mut dropped = 1;
                while graph.take_event().is_some() {
                    dropped += 1;
                }
                tracing::warn!("Event storm: dropped {dropped} events after {MAX_EVENTS_PER_DRAIN}");
                return;
            }

            bus.notify(&event, |observer, event| {
                if let Some(node) = nodes.get_mut(&observer) {
                    let mut ctx = NodeContext {
                        graph: &mut *graph,
                        values: &mut *values,
                        services: &mut *services,
                    };
                    node.on_event(event, &mut ctx);
                }
            });
        }
    }

    /// Drop every node and link and reset the clock
    pub fn clear(&mut self) {
        self.graph.clear();
        self.values.clear();
        self.bus.clear();
        self.nodes.clear();
        self.root = None;
        self.clock = Timer::default();
    }

    /// Serialize the document
    pub fn save_to_string(&self) -> String {
        persist::write_document(&self.graph, &self.values, self.nodes.values(), self.root)
    }

    /// Replace the document with a serialized one.
    ///
    /// On error the current document is left untouched.
    pub fn load_from_str(&mut self, text: &str) -> Result<()> {
        let LoadedDocument {
            mut graph,
            root,
            nodes,
        } = persist::read_document(text)?;

        let mut values = ValueStore::new();
        let mut bus = EventBus::new();
        let mut table = IndexMap::with_capacity(nodes.len());
        {
            let mut ctx = NodeContext {
                graph: &mut graph,
                values: &mut values,
                services: &mut self.services,
            };
            for mut node in nodes {
                node.on_load(&mut ctx);
                if node.observes_events() {
                    bus.attach(node.id());
                }
                table.insert(node.id(), node);
            }
        }
        while graph.take_event().is_some() {}

        let root = root.or_else(|| {
            table
                .values()
                .find(|n: &&UiNode| n.kind() == UiNodeKind::RenderTarget)
                .map(UiNodeOps::id)
        });
        tracing::debug!(
            "Loaded {} nodes, {} edges, {} UI nodes",
            graph.node_count(),
            graph.edge_count(),
            table.len()
        );

        self.graph = graph;
        self.values = values;
        self.bus = bus;
        self.nodes = table;
        self.root = root;
        self.clock = Timer::default();
        Ok(())
    }

    /// Save the document to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.save_to_string()).map_err(PersistError::from)?;
        tracing::info!("Saved graph to {}", path.display());
        Ok(())
    }

    /// Load a document from a file
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path).map_err(PersistError::from)?;
        self.load_from_str(&text)?;
        tracing::info!("Loaded graph from {}", path.display());
        Ok(())
    }
}
