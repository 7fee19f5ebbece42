// SPDX-License-Identifier: MIT OR Apache-2.0
//! Host configuration, stored as RON.

use nodeshade_graph::{BindingVar, EvalSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current config format version
pub const CONFIG_FORMAT_VERSION: u32 = 1;

/// Config errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid RON for [`HostConfig`]
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serialization failed
    #[error("Serialize error: {0}")]
    Serialize(#[from] ron::Error),

    /// Written by a newer host
    #[error("Config version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest version this host reads
        supported: u32,
    },
}

/// A shader made available to the in-memory shader library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderDecl {
    /// Path the Shader node refers to
    pub path: String,
    /// Reflected binding variables, in declaration order
    #[serde(default)]
    pub bindings: Vec<BindingVar>,
}

/// Settings for one headless run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Config format version
    pub version: u32,
    /// Number of frames to run
    pub frames: u32,
    /// Seconds per frame
    pub frame_dt: f32,
    /// Graph document to load. A demo graph is built when unset.
    pub graph_path: Option<PathBuf>,
    /// Where to save the graph after the run
    pub save_path: Option<PathBuf>,
    /// Default log filter, overridden by `RUST_LOG`
    pub log_filter: String,
    /// Evaluator settings
    pub eval: EvalSettings,
    /// Shaders known to the shader library
    pub shaders: Vec<ShaderDecl>,
    /// Loadable model paths
    pub models: Vec<String>,
    /// Loadable texture paths
    pub textures: Vec<String>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_FORMAT_VERSION,
            frames: 3,
            frame_dt: 1.0 / 60.0,
            graph_path: None,
            save_path: None,
            log_filter: "nodeshade=info,nodeshade_graph=info".to_string(),
            eval: EvalSettings::default(),
            shaders: Vec::new(),
            models: Vec::new(),
            textures: Vec::new(),
        }
    }
}

impl HostConfig {
    /// Parse a config
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: HostConfig = ron::from_str(text)?;
        if config.version > CONFIG_FORMAT_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
                supported: CONFIG_FORMAT_VERSION,
            });
        }
        Ok(config)
    }

    /// Serialize to pretty RON
    pub fn to_ron(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, pretty)?)
    }

    /// Load a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }
}
