//! Texture bindings and sampling.

use glam::Vec2;

use crate::shader_model::codegen::CodeGenerator;
use crate::shader_model::error::Result;
use crate::shader_model::node::{Dependencies, NodeId, ShaderNode};
use crate::shader_model::stage_graph::SetupContext;
use crate::shader_model::types::{GlslType, TextureDim};
use crate::shader_model::value::{NodeIo, ShaderValue};

/// Declares a 2D sampler binding, optionally an array of them.
pub struct Texture2dNode {
    texture_name: String,
    array_len: Option<u32>,
    pub output: NodeIo,
}

impl Texture2dNode {
    pub fn new(id: NodeId, texture_name: impl Into<String>) -> Self {
        Self::with_array_len(id, texture_name, None)
    }

    pub fn array(id: NodeId, texture_name: impl Into<String>, len: u32) -> Self {
        Self::with_array_len(id, texture_name, Some(len))
    }

    fn with_array_len(id: NodeId, texture_name: impl Into<String>, array_len: Option<u32>) -> Self {
        let texture_name = texture_name.into();
        let output = NodeIo::new(
            ShaderValue::uniform(texture_name.clone(), GlslType::Sampler2d, array_len),
            id,
        );
        Self {
            texture_name,
            array_len,
            output,
        }
    }

    pub fn texture_name(&self) -> &str {
        &self.texture_name
    }
}

impl ShaderNode for Texture2dNode {
    fn name(&self) -> &str {
        "texture2d"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        ctx.add_sampler(&self.texture_name, TextureDim::Tex2d, self.array_len)?;
        Ok(())
    }
}

const PREMULTIPLY_ALPHA: &str = "
    vec4 premultiplyAlpha(vec4 color) {
        return vec4(color.rgb * color.a, color.a);
    }
";

/// Samples a 2D texture. Depends on the texture node so the sampler binding
/// is declared before the sampling expression references it.
pub struct Texture2dSamplerNode {
    premultiply: bool,
    pub texture: NodeIo,
    pub tex_coord: NodeIo,
    pub output: NodeIo,
}

impl Texture2dSamplerNode {
    pub fn new(id: NodeId, texture: NodeIo, premultiply: bool) -> Self {
        Self {
            premultiply,
            texture,
            tex_coord: ShaderValue::const_vec2(Vec2::ZERO).into(),
            output: NodeIo::new(
                ShaderValue::computed(id.var_name("sampleTex", "color"), GlslType::Vec4F),
                id,
            ),
        }
    }
}

impl ShaderNode for Texture2dSamplerNode {
    fn name(&self) -> &str {
        "texture2dSampler"
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.texture).depends_on(&self.tex_coord);
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        let sample = generator.sample_texture_2d(self.texture.name(), &self.tex_coord.ref2f()?);
        if self.premultiply {
            generator.append_function("premultiplyAlpha", PREMULTIPLY_ALPHA);
            generator.append_main(format!(
                "{} = premultiplyAlpha({sample});",
                self.output.declare()?
            ));
        } else {
            generator.append_main(format!("{} = {sample};", self.output.declare()?));
        }
        Ok(())
    }
}
