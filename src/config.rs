use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{backend::OptimizerOptions, builder::uniforms::LayoutRule, ir::Capability};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AddressingModel {
    #[default]
    Logical,
    Physical32,
    Physical64,
    PhysicalStorageBuffer64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MemoryModel {
    Simple,
    #[default]
    GLSL450,
    OpenCL,
    Vulkan,
}

impl fmt::Display for AddressingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl fmt::Display for MemoryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Settings for one module builder.
///
/// ```toml
/// addressing_model = "Logical"
/// memory_model = "GLSL450"
/// capabilities = ["Shader"]
/// uniform_layout = "Std140"
///
/// [optimizer]
/// strip_debug_info = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub addressing_model: AddressingModel,
    pub memory_model: MemoryModel,
    /// Capabilities declared up front. Types needing more add them on use.
    pub capabilities: Vec<Capability>,
    /// How uniform member offsets are computed.
    pub uniform_layout: LayoutRule,
    /// Written in the module header.
    pub generator: String,
    pub optimizer: OptimizerOptions,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            addressing_model: AddressingModel::default(),
            memory_model: MemoryModel::default(),
            capabilities: vec![Capability::Shader],
            uniform_layout: LayoutRule::default(),
            generator: "Shader Builder; 0".to_string(),
            optimizer: OptimizerOptions::default(),
        }
    }
}

impl BuilderConfig {
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }
}
