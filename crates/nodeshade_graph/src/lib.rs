// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph engine for the `NodeShade` shader editor.
//!
//! This crate provides the data model and evaluation core behind the
//! editor's shader-construction graphs:
//! - A directed graph with stable integer ids and Internal/External edges
//! - A value store holding each pin's typed payload
//! - A catalog of UI nodes (math, constants, assets, camera, draw, render target)
//! - A depth-first stack evaluator producing draw calls
//! - An event bus for link and shader-reload notifications
//!
//! ## Architecture
//!
//! Each UI node owns one identity graph node plus one graph node per pin.
//! Linking two pins adds an External edge; the [`Editor`] turns the graph's
//! recorded events into bus notifications, which let a draw node grow and
//! shrink its inputs to match the linked shader's bindings. Evaluation walks
//! from the render target, so only reachable nodes are reduced.

pub mod edge;
pub mod editor;
pub mod evaluation;
pub mod events;
pub mod graph;
pub mod id_map;
pub mod node;
pub mod nodes;
pub mod persist;
pub mod services;
pub mod value;
pub mod value_store;

pub use edge::{Edge, EdgeId, EdgeKind};
pub use editor::{Editor, EditorError, LinkError};
pub use evaluation::{EvalError, EvalReport, EvalSettings, Evaluator};
pub use events::{EventBus, GraphEvent};
pub use graph::{Graph, GraphError};
pub use id_map::IdMap;
pub use node::{Direction, Node, NodeId, NodeType};
pub use nodes::{UiNode, UiNodeKind, UiNodeOps};
pub use persist::PersistError;
pub use services::{
    AssetStore, BindingVar, DrawCall, MemoryAssetStore, MemoryShaderLibrary, PrimitiveShape,
    RecordingRenderer, Renderer, Services, ShaderProvider,
};
pub use value::{HlslType, Value, ValueKind, INVALID_INDEX};
pub use value_store::{StoreError, ValueStore};
