// SPDX-License-Identifier: MIT OR Apache-2.0
//! External collaborators consumed by the node catalog.
//!
//! Shader reflection, asset loading and rendering are black boxes behind
//! traits. An [`Services`] bundle is handed to every lifecycle hook, so
//! nodes never reach for global state. The in-memory implementations back
//! the headless host and the tests.

use crate::value::{HlslType, Value, INVALID_INDEX};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Asset, shader and render failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetError {
    /// Nothing known under this path
    #[error("Asset not found: {0}")]
    NotFound(String),

    /// Index does not name a loaded asset
    #[error("Invalid asset index: {0}")]
    InvalidIndex(i32),

    /// The collaborator rejected the request
    #[error("{0}")]
    Rejected(String),
}

/// Result type for collaborator calls
pub type Result<T> = std::result::Result<T, AssetError>;

/// A reflected shader binding variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingVar {
    /// Variable name
    pub name: String,
    /// HLSL type name as reported by reflection
    pub type_name: String,
}

impl BindingVar {
    /// Create a new binding variable
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Loaded model description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Source path
    pub path: String,
}

/// Built-in meshes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PrimitiveShape {
    /// Unit cube
    #[default]
    Cube = 0,
    /// Unit plane
    Plane = 1,
    /// Unit sphere
    Sphere = 2,
}

impl PrimitiveShape {
    /// Integer tag used by the text format
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Look up a shape from its integer tag
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Cube),
            1 => Some(Self::Plane),
            2 => Some(Self::Sphere),
            _ => None,
        }
    }

    /// Pseudo-path under which the mesh is registered
    pub fn path(self) -> &'static str {
        match self {
            Self::Cube => "primitive:cube",
            Self::Plane => "primitive:plane",
            Self::Sphere => "primitive:sphere",
        }
    }
}

/// One shader binding resolved for a draw call
#[derive(Debug, Clone, PartialEq)]
pub struct ShaderBinding {
    /// Variable name
    pub name: String,
    /// Variable type
    pub hlsl_type: HlslType,
    /// Current value
    pub value: Value,
}

/// Everything the renderer needs to draw one model into the render texture
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Vertex stage shader index
    pub vertex_shader: i32,
    /// Pixel stage shader index
    pub pixel_shader: i32,
    /// Model index
    pub model: i32,
    /// Clear color, each channel in `[0, 1]`
    pub color: [f32; 3],
    /// Bindings in reflection order
    pub bindings: Vec<ShaderBinding>,
}

impl DrawCall {
    /// Whether every index names an asset
    pub fn is_complete(&self) -> bool {
        self.vertex_shader >= 0 && self.pixel_shader >= 0 && self.model >= 0
    }

    /// Constant buffer contents: every binding's components, in order
    pub fn constants(&self) -> Vec<f32> {
        self.bindings
            .iter()
            .flat_map(|b| b.value.components())
            .collect()
    }
}

/// Shader compilation and reflection
pub trait ShaderProvider {
    /// Load (or look up) a shader, returning its index
    fn load_shader(&mut self, path: &str) -> Result<i32>;

    /// Index of the fallback shader
    fn default_shader(&self) -> i32;

    /// Reflected binding variables, in declaration order
    fn bindings(&self, shader: i32) -> Result<Vec<BindingVar>>;

    /// Recompile a shader in place
    fn reload(&mut self, shader: i32) -> Result<()>;
}

/// Mesh and texture loading
pub trait AssetStore {
    /// Load a model, returning its index
    fn load_model(&mut self, path: &str) -> Result<i32>;

    /// Get a loaded model
    fn model(&self, index: i32) -> Option<&ModelRecord>;

    /// Load a texture, returning its index
    fn load_texture(&mut self, path: &str) -> Result<i32>;

    /// Get (creating on first use) a built-in mesh
    fn primitive(&mut self, shape: PrimitiveShape) -> Result<i32>;
}

/// Render-to-texture backend
pub trait Renderer {
    /// Draw into the render texture. Blocking.
    fn render_to_texture(&mut self, call: &DrawCall) -> Result<()>;
}

/// Collaborators handed to UI node hooks
pub struct Services {
    /// Shader reflection provider
    pub shaders: Box<dyn ShaderProvider>,
    /// Asset store
    pub assets: Box<dyn AssetStore>,
    /// Renderer
    pub renderer: Box<dyn Renderer>,
}

impl Services {
    /// Bundle collaborators
    pub fn new(
        shaders: Box<dyn ShaderProvider>,
        assets: Box<dyn AssetStore>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self {
            shaders,
            assets,
            renderer,
        }
    }

    /// In-memory collaborators with nothing declared
    pub fn headless() -> Self {
        Self::new(
            Box::new(MemoryShaderLibrary::new()),
            Box::new(MemoryAssetStore::new()),
            Box::new(RecordingRenderer::new()),
        )
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::headless()
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct ShaderEntry {
    path: String,
    bindings: Vec<BindingVar>,
    revision: u32,
}

/// Shader library whose reflection data is declared up front
#[derive(Debug, Clone)]
pub struct MemoryShaderLibrary {
    shaders: Vec<ShaderEntry>,
}

impl MemoryShaderLibrary {
    /// Path of the built-in fallback shader
    pub const DEFAULT_PATH: &'static str = "default";

    /// Create a library holding only the binding-less default shader
    pub fn new() -> Self {
        Self {
            shaders: vec![ShaderEntry {
                path: Self::DEFAULT_PATH.to_string(),
                bindings: Vec::new(),
                revision: 0,
            }],
        }
    }

    /// Declare a shader and its reflected bindings, replacing any previous
    /// declaration under the same path
    pub fn declare(&mut self, path: impl Into<String>, bindings: Vec<BindingVar>) -> i32 {
        let path = path.into();
        if let Some(index) = self.shaders.iter().position(|s| s.path == path) {
            self.shaders[index].bindings = bindings;
            return index as i32;
        }
        self.shaders.push(ShaderEntry {
            path,
            bindings,
            revision: 0,
        });
        (self.shaders.len() - 1) as i32
    }

    /// How many times a shader was reloaded
    pub fn revision(&self, shader: i32) -> Option<u32> {
        self.entry(shader).map(|s| s.revision)
    }

    fn entry(&self, shader: i32) -> Option<&ShaderEntry> {
        usize::try_from(shader).ok().and_then(|i| self.shaders.get(i))
    }
}

impl Default for MemoryShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderProvider for MemoryShaderLibrary {
    fn load_shader(&mut self, path: &str) -> Result<i32> {
        self.shaders
            .iter()
            .position(|s| s.path == path)
            .map(|i| i as i32)
            .ok_or_else(|| AssetError::NotFound(path.to_string()))
    }

    fn default_shader(&self) -> i32 {
        0
    }

    fn bindings(&self, shader: i32) -> Result<Vec<BindingVar>> {
        self.entry(shader)
            .map(|s| s.bindings.clone())
            .ok_or(AssetError::InvalidIndex(shader))
    }

    fn reload(&mut self, shader: i32) -> Result<()> {
        let entry = usize::try_from(shader)
            .ok()
            .and_then(|i| self.shaders.get_mut(i))
            .ok_or(AssetError::InvalidIndex(shader))?;
        entry.revision += 1;
        Ok(())
    }
}

/// Asset store that "loads" any declared path
#[derive(Debug, Clone, Default)]
pub struct MemoryAssetStore {
    available: Vec<String>,
    models: Vec<ModelRecord>,
    textures: Vec<String>,
    index_by_path: HashMap<String, i32>,
}

impl MemoryAssetStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a path loadable
    pub fn declare(&mut self, path: impl Into<String>) {
        let path = path.into();
        if !self.available.contains(&path) {
            self.available.push(path);
        }
    }

    /// Number of loaded textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

impl AssetStore for MemoryAssetStore {
    fn load_model(&mut self, path: &str) -> Result<i32> {
        if let Some(index) = self.index_by_path.get(path) {
            return Ok(*index);
        }
        if !self.available.iter().any(|p| p == path) {
            return Err(AssetError::NotFound(path.to_string()));
        }
        self.models.push(ModelRecord {
            path: path.to_string(),
        });
        let index = (self.models.len() - 1) as i32;
        self.index_by_path.insert(path.to_string(), index);
        Ok(index)
    }

    fn model(&self, index: i32) -> Option<&ModelRecord> {
        usize::try_from(index).ok().and_then(|i| self.models.get(i))
    }

    fn load_texture(&mut self, path: &str) -> Result<i32> {
        if let Some(index) = self.textures.iter().position(|t| t == path) {
            return Ok(index as i32);
        }
        if !self.available.iter().any(|p| p == path) {
            return Err(AssetError::NotFound(path.to_string()));
        }
        self.textures.push(path.to_string());
        Ok((self.textures.len() - 1) as i32)
    }

    fn primitive(&mut self, shape: PrimitiveShape) -> Result<i32> {
        self.declare(shape.path());
        self.load_model(shape.path())
    }
}

/// Renderer that only logs and counts what it is asked to draw
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    calls: Vec<DrawCall>,
}

impl RecordingRenderer {
    /// Create a new renderer
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw calls received so far
    pub fn calls(&self) -> &[DrawCall] {
        &self.calls
    }
}

impl Renderer for RecordingRenderer {
    fn render_to_texture(&mut self, call: &DrawCall) -> Result<()> {
        if !call.is_complete() {
            return Err(AssetError::InvalidIndex(INVALID_INDEX));
        }
        tracing::debug!(
            "Render model {} with shaders {}/{} ({} constants)",
            call.model,
            call.vertex_shader,
            call.pixel_shader,
            call.constants().len()
        );
        self.calls.push(call.clone());
        Ok(())
    }
}
