//! Compile configuration, loaded from JSON. Every field has a default so a
//! partial (or empty) file is valid.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::shader_model::BackendKind;
use crate::shader_model::nodes::AoSetup;
use crate::shader_model::nodes::ao::MAX_KERNEL_SIZE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileConfig {
    pub backend: BackendKind,
    /// Length of the light arrays; fixed at build time.
    pub max_lights: u32,
    pub ao: AoConfig,
    /// Run emitted Vulkan GLSL through naga.
    pub validate: bool,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Vulkan,
            max_lights: 4,
            ao: AoConfig::default(),
            validate: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AoConfig {
    pub setup: AoSetup,
    pub kernel_size: u32,
}

impl Default for AoConfig {
    fn default() -> Self {
        Self {
            setup: AoSetup::Forward,
            kernel_size: 16,
        }
    }
}

pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<CompileConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config json at {}", path.display()))?;
    let config: CompileConfig =
        serde_json::from_str(&text).context("failed to parse config json")?;
    if config.ao.kernel_size > MAX_KERNEL_SIZE {
        log::warn!(
            "ao.kernelSize {} exceeds {MAX_KERNEL_SIZE}; clamping",
            config.ao.kernel_size
        );
    }
    Ok(config)
}
