// SPDX-License-Identifier: MIT OR Apache-2.0
//! Headless host: loads or builds a graph and runs it frame by frame.

use crate::config::{ConfigError, HostConfig};
use nodeshade_graph::nodes::DrawNode;
use nodeshade_graph::{
    Editor, EditorError, EvalReport, MemoryAssetStore, MemoryShaderLibrary, NodeId,
    RecordingRenderer, Services, UiNodeKind, UiNodeOps, ValueKind,
};

/// Host errors
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Bad configuration
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Editor operation failed
    #[error("Editor error: {0}")]
    Editor(#[from] EditorError),
}

/// Build in-memory collaborators from the declared shaders and assets
pub fn build_services(config: &HostConfig) -> Services {
    let mut shaders = MemoryShaderLibrary::new();
    for decl in &config.shaders {
        let index = shaders.declare(decl.path.clone(), decl.bindings.clone());
        tracing::debug!("Declared shader {index}: {}", decl.path);
    }

    let mut assets = MemoryAssetStore::new();
    for path in config.models.iter().chain(&config.textures) {
        assets.declare(path.clone());
    }

    Services::new(
        Box::new(shaders),
        Box::new(assets),
        Box::new(RecordingRenderer::new()),
    )
}

fn output_of(editor: &Editor, id: NodeId) -> Result<NodeId, EditorError> {
    editor
        .node(id)
        .and_then(|n| n.outputs().first().copied())
        .ok_or(EditorError::UnknownNode(id))
}

fn draw_node(editor: &Editor, id: NodeId) -> Result<&DrawNode, EditorError> {
    editor
        .node(id)
        .and_then(|n| n.as_draw())
        .ok_or(EditorError::UnknownNode(id))
}

/// Producer kind feeding a binding of `kind`
fn feeder_for(kind: ValueKind, name: &str) -> UiNodeKind {
    match kind {
        ValueKind::F32 => UiNodeKind::Sine,
        ValueKind::I32 => UiNodeKind::Texture,
        ValueKind::Vec2 => UiNodeKind::Vector2,
        ValueKind::Vec3 => UiNodeKind::Vector3,
        ValueKind::Vec4 => UiNodeKind::Vector4,
        ValueKind::Mat4 if name.to_ascii_lowercase().contains("view") => UiNodeKind::Camera,
        ValueKind::Mat4 => UiNodeKind::Transform,
    }
}

/// Build a demo graph: shader and primitive into a draw node feeding the
/// render target, with one producer per reflected binding.
pub fn build_demo(editor: &mut Editor, config: &HostConfig) -> Result<(), EditorError> {
    let shader = editor.add_node(UiNodeKind::Shader)?;
    let shader_path = config.shaders.first().map(|s| s.path.clone());
    editor.set_asset_path(shader, shader_path)?;

    let model = match config.models.first() {
        Some(path) => {
            let model = editor.add_node(UiNodeKind::Model)?;
            editor.set_asset_path(model, Some(path.clone()))?;
            model
        }
        None => editor.add_node(UiNodeKind::Primitive)?,
    };

    let draw = editor.add_node(UiNodeKind::Draw)?;
    editor.set_draw_color(draw, [0.2, 0.4, 0.8])?;
    let target = editor.add_node(UiNodeKind::RenderTarget)?;

    let (shader_pin, model_pin) = {
        let node = draw_node(editor, draw)?;
        (node.shader_pin(), node.model_pin())
    };
    editor.link(shader_pin, output_of(editor, shader)?)?;
    editor.link(model_pin, output_of(editor, model)?)?;

    let mut time = None;
    let bindings = draw_node(editor, draw)?.bindings().to_vec();
    for binding in bindings {
        let kind = binding.hlsl_type.value_kind();
        let feeder = editor.add_node(feeder_for(kind, &binding.name))?;
        match editor.node(feeder).map(UiNodeOps::kind) {
            Some(UiNodeKind::Sine) => {
                let clock = match time {
                    Some(clock) => clock,
                    None => {
                        let node = editor.add_node(UiNodeKind::Time)?;
                        let clock = output_of(editor, node)?;
                        time = Some(clock);
                        clock
                    }
                };
                let input = editor
                    .node(feeder)
                    .and_then(|n| n.inputs().first().copied())
                    .ok_or(EditorError::UnknownNode(feeder))?;
                editor.link(input, clock)?;
            }
            Some(UiNodeKind::Texture) => {
                let path = config.textures.first().cloned();
                editor.set_asset_path(feeder, path)?;
            }
            _ => {}
        }
        editor.link(binding.pin, output_of(editor, feeder)?)?;
    }

    let sentinel = output_of(editor, draw)?;
    let input = editor
        .node(target)
        .and_then(|n| n.inputs().first().copied())
        .ok_or(EditorError::UnknownNode(target))?;
    editor.link(input, sentinel)?;

    tracing::info!(
        "Built demo graph: {} UI nodes, {} graph nodes",
        editor.node_count(),
        editor.graph().node_count()
    );
    Ok(())
}

/// A configured editor ready to run
pub struct Host {
    config: HostConfig,
    editor: Editor,
}

impl Host {
    /// Build the editor and load (or build) the graph
    pub fn new(config: HostConfig) -> Result<Self, HostError> {
        let mut editor = Editor::with_settings(build_services(&config), config.eval.clone());
        match &config.graph_path {
            Some(path) => editor.load(path)?,
            None => build_demo(&mut editor, &config)?,
        }
        Ok(Self { config, editor })
    }

    /// The editor
    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    /// Run the configured number of frames, returning the last report
    pub fn run(&mut self) -> Result<Option<EvalReport>, HostError> {
        let mut last = None;
        for frame in 0..self.config.frames {
            match self.editor.frame(self.config.frame_dt) {
                Ok(report) => {
                    tracing::info!(
                        "Frame {frame}: ready={:?}, {} draw calls, {} nodes visited",
                        report.ready,
                        report.draw_calls.len(),
                        report.visited
                    );
                    for call in &report.draw_calls {
                        tracing::debug!(
                            "  model {} shader {} color {:?} constants {:?}",
                            call.model,
                            call.pixel_shader,
                            call.color,
                            call.constants()
                        );
                    }
                    last = Some(report);
                }
                Err(e) => tracing::error!("Frame {frame} failed: {e}"),
            }
        }

        if let Some(path) = &self.config.save_path {
            self.editor.save(path)?;
        }
        Ok(last)
    }
}
