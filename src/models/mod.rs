//! Ready-made shader models built from the node library.

pub mod ambient_occlusion;
pub mod shadowed_lights;
pub mod textured;

use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};

use crate::config::CompileConfig;
use crate::shader_model::ShaderModel;
use crate::shader_model::nodes::{AoSettings, AoSetup};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelKind {
    Textured,
    ShadowedLights,
    AoForward,
    AoDeferred,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Textured,
        ModelKind::ShadowedLights,
        ModelKind::AoForward,
        ModelKind::AoDeferred,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Textured => "textured",
            ModelKind::ShadowedLights => "shadowed-lights",
            ModelKind::AoForward => "ao-forward",
            ModelKind::AoDeferred => "ao-deferred",
        }
    }

    /// Build an uncompiled model. `ao-forward` / `ao-deferred` override the
    /// setup from `config`; the kernel size is taken from it either way.
    pub fn build(self, config: &CompileConfig) -> ShaderModel {
        let ao = |setup: AoSetup| {
            let settings = AoSettings::default();
            settings.set_kernel_size(config.ao.kernel_size);
            ambient_occlusion::ambient_occlusion(setup, settings)
        };
        match self {
            ModelKind::Textured => textured::textured_quad(),
            ModelKind::ShadowedLights => shadowed_lights::shadowed_lights(config.max_lights),
            ModelKind::AoForward => ao(AoSetup::Forward),
            ModelKind::AoDeferred => ao(AoSetup::Deferred),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|k| k.label()).collect();
                anyhow!("unknown model '{s}' (supported: {})", known.join(", "))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.label().parse::<ModelKind>().unwrap(), kind);
        }
        assert!("phong".parse::<ModelKind>().is_err());
    }
}
