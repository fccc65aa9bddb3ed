//! Backend formatting callbacks. Nodes and the section builder never hard-code
//! platform syntax; they ask the backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::binding::{PushConstantLayout, SamplerBinding, UniformBlockLayout};
use super::codegen::InterfaceDirection;
use super::interface::InterfaceSlot;
use super::stage_graph::{AttributeBinding, ColorOutput};
use super::types::ShaderStage;
use super::uniform::MemberLayout;

pub trait ShaderBackend {
    fn kind(&self) -> BackendKind;

    /// Version line plus whatever must precede every declaration.
    fn preamble(&self, stage: ShaderStage) -> String;

    fn vertex_input(&self, attribute: &AttributeBinding) -> String;

    fn interface_var(&self, slot: &InterfaceSlot, direction: InterfaceDirection) -> String;

    fn color_output(&self, output: &ColorOutput) -> String;

    fn uniform_block(&self, block: &UniformBlockLayout) -> String;

    /// All push constants of one stage.
    fn push_constants(&self, stage: ShaderStage, members: &[PushConstantLayout]) -> String;

    fn sampler(&self, sampler: &SamplerBinding) -> String;

    /// Operand naming a 2D texture (or element `index` of a texture array)
    /// as accepted by `texture()` and `textureSize()`.
    fn texture_2d(&self, texture: &str, index: Option<u32>) -> String {
        match index {
            Some(i) => format!("{texture}[{i}]"),
            None => texture.to_string(),
        }
    }

    fn sample_texture_2d(&self, texture: &str, coord: &str) -> String {
        format!("texture({texture}, {coord})")
    }

    fn texture_size_2d(&self, texture: &str, lod: &str) -> String {
        format!("textureSize({texture}, {lod})")
    }
}

/// Target selected by configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Vulkan,
    #[serde(rename = "opengl")]
    OpenGl,
    #[serde(rename = "webgl2")]
    WebGl2,
}

impl BackendKind {
    pub fn backend(self) -> &'static dyn ShaderBackend {
        match self {
            BackendKind::Vulkan => &VulkanGlsl,
            BackendKind::OpenGl => &DesktopGlsl,
            BackendKind::WebGl2 => &WebGlsl,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Vulkan => "vulkan",
            BackendKind::OpenGl => "opengl",
            BackendKind::WebGl2 => "webgl2",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vulkan" | "vk" => Ok(BackendKind::Vulkan),
            "opengl" | "gl" => Ok(BackendKind::OpenGl),
            "webgl2" | "webgl" => Ok(BackendKind::WebGl2),
            other => Err(format!("unknown backend `{other}` (expected vulkan, opengl or webgl2)")),
        }
    }
}

fn flat(slot: &InterfaceSlot) -> &'static str {
    if slot.is_flat() { "flat " } else { "" }
}

fn member_decl(m: &MemberLayout) -> String {
    match m.array_len {
        Some(len) => format!("    {} {}[{len}];", m.ty, m.name),
        None => format!("    {} {};", m.ty, m.name),
    }
}

fn block_body(block: &UniformBlockLayout) -> String {
    block
        .members
        .iter()
        .map(member_decl)
        .collect::<Vec<_>>()
        .join("\n")
}

fn sampler_decl(sampler: &SamplerBinding) -> String {
    let ty = sampler.dim.sampler_type();
    match sampler.array_len {
        Some(len) => format!("uniform {ty} {}[{len}];", sampler.name),
        None => format!("uniform {ty} {};", sampler.name),
    }
}

/// Name of the shared sampler object paired with a separate texture binding.
pub fn sampler_object_name(texture: &str) -> String {
    format!("{texture}Sampler")
}

/// Name of one element of a texture array once split into single bindings.
pub fn texture_element_name(texture: &str, index: u32) -> String {
    format!("{texture}_{index}")
}

fn plain_push_constants(members: &[PushConstantLayout]) -> String {
    members
        .iter()
        .map(|p| format!("uniform {} {};", p.ty, p.name))
        .collect::<Vec<_>>()
        .join("\n")
}

fn located_interface_var(slot: &InterfaceSlot, direction: InterfaceDirection) -> String {
    format!(
        "layout(location = {}) {}{} {};",
        slot.slot,
        flat(slot),
        direction.keyword(),
        slot.var
    )
}

/// Vulkan-flavoured GLSL 4.50: descriptor set / binding qualifiers and a
/// push-constant block. Textures and samplers are separate objects; an array
/// of `n` textures becomes `n` single bindings followed by one shared sampler.
#[derive(Clone, Copy, Debug, Default)]
pub struct VulkanGlsl;

impl ShaderBackend for VulkanGlsl {
    fn kind(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn preamble(&self, _stage: ShaderStage) -> String {
        "#version 450".to_string()
    }

    fn vertex_input(&self, a: &AttributeBinding) -> String {
        format!("layout(location = {}) in {} {};", a.location, a.ty, a.name)
    }

    fn interface_var(&self, slot: &InterfaceSlot, direction: InterfaceDirection) -> String {
        located_interface_var(slot, direction)
    }

    fn color_output(&self, output: &ColorOutput) -> String {
        format!("layout(location = {}) out vec4 {};", output.location, output.name)
    }

    fn uniform_block(&self, block: &UniformBlockLayout) -> String {
        format!(
            "layout(std140, set = 0, binding = {}) uniform {} {{\n{}\n}};",
            block.binding,
            block.name,
            block_body(block)
        )
    }

    fn push_constants(&self, stage: ShaderStage, members: &[PushConstantLayout]) -> String {
        let block = if stage == ShaderStage::VERTEX {
            "VertexPushConstants"
        } else {
            "FragmentPushConstants"
        };
        let body = members
            .iter()
            .map(|p| format!("    layout(offset = {}) {} {};", p.offset, p.ty, p.name))
            .collect::<Vec<_>>()
            .join("\n");
        format!("layout(push_constant) uniform {block} {{\n{body}\n}};")
    }

    fn sampler(&self, sampler: &SamplerBinding) -> String {
        let ty = sampler.dim.texture_type();
        let mut lines = match sampler.array_len {
            Some(len) => (0..len)
                .map(|i| {
                    format!(
                        "layout(set = 0, binding = {}) uniform {ty} {};",
                        sampler.binding + i,
                        texture_element_name(&sampler.name, i)
                    )
                })
                .collect::<Vec<_>>(),
            None => vec![format!(
                "layout(set = 0, binding = {}) uniform {ty} {};",
                sampler.binding, sampler.name
            )],
        };
        lines.push(format!(
            "layout(set = 0, binding = {}) uniform sampler {};",
            sampler.sampler_binding,
            sampler_object_name(&sampler.name)
        ));
        lines.join("\n")
    }

    fn texture_2d(&self, texture: &str, index: Option<u32>) -> String {
        let image = match index {
            Some(i) => texture_element_name(texture, i),
            None => texture.to_string(),
        };
        format!("sampler2D({image}, {})", sampler_object_name(texture))
    }
}

/// Desktop OpenGL 4.1 core: std140 blocks bound by the host, push constants
/// lowered to plain uniforms.
#[derive(Clone, Copy, Debug, Default)]
pub struct DesktopGlsl;

impl ShaderBackend for DesktopGlsl {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenGl
    }

    fn preamble(&self, _stage: ShaderStage) -> String {
        "#version 410 core".to_string()
    }

    fn vertex_input(&self, a: &AttributeBinding) -> String {
        format!("layout(location = {}) in {} {};", a.location, a.ty, a.name)
    }

    fn interface_var(&self, slot: &InterfaceSlot, direction: InterfaceDirection) -> String {
        located_interface_var(slot, direction)
    }

    fn color_output(&self, output: &ColorOutput) -> String {
        format!("layout(location = {}) out vec4 {};", output.location, output.name)
    }

    fn uniform_block(&self, block: &UniformBlockLayout) -> String {
        format!(
            "layout(std140) uniform {} {{\n{}\n}};",
            block.name,
            block_body(block)
        )
    }

    fn push_constants(&self, _stage: ShaderStage, members: &[PushConstantLayout]) -> String {
        plain_push_constants(members)
    }

    fn sampler(&self, sampler: &SamplerBinding) -> String {
        sampler_decl(sampler)
    }
}

/// WebGL2 / GLSL ES 3.00. Interface variables are matched by name, so they
/// carry no location and are emitted in slot order.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebGlsl;

impl ShaderBackend for WebGlsl {
    fn kind(&self) -> BackendKind {
        BackendKind::WebGl2
    }

    fn preamble(&self, _stage: ShaderStage) -> String {
        [
            "#version 300 es",
            "precision highp float;",
            "precision highp int;",
            "precision highp sampler3D;",
        ]
        .join("\n")
    }

    fn vertex_input(&self, a: &AttributeBinding) -> String {
        format!("layout(location = {}) in {} {};", a.location, a.ty, a.name)
    }

    fn interface_var(&self, slot: &InterfaceSlot, direction: InterfaceDirection) -> String {
        format!("{}{} {};", flat(slot), direction.keyword(), slot.var)
    }

    fn color_output(&self, output: &ColorOutput) -> String {
        format!("layout(location = {}) out vec4 {};", output.location, output.name)
    }

    fn uniform_block(&self, block: &UniformBlockLayout) -> String {
        format!(
            "layout(std140) uniform {} {{\n{}\n}};",
            block.name,
            block_body(block)
        )
    }

    fn push_constants(&self, _stage: ShaderStage, members: &[PushConstantLayout]) -> String {
        plain_push_constants(members)
    }

    fn sampler(&self, sampler: &SamplerBinding) -> String {
        sampler_decl(sampler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader_model::interface::InterfaceVar;
    use crate::shader_model::types::{GlslType, TextureDim};

    fn int_slot() -> InterfaceSlot {
        InterfaceSlot {
            slot: 2,
            var: InterfaceVar::new("ifMaterialId", GlslType::Int),
        }
    }

    #[test]
    fn integer_varyings_are_flat_everywhere() {
        for kind in [BackendKind::Vulkan, BackendKind::OpenGl, BackendKind::WebGl2] {
            let decl = kind.backend().interface_var(&int_slot(), InterfaceDirection::Out);
            assert!(decl.contains("flat out int ifMaterialId;"), "{kind}: {decl}");
        }
    }

    #[test]
    fn webgl_drops_interface_locations() {
        let decl = WebGlsl.interface_var(&int_slot(), InterfaceDirection::In);
        assert_eq!(decl, "flat in int ifMaterialId;");
        let decl = VulkanGlsl.interface_var(&int_slot(), InterfaceDirection::In);
        assert_eq!(decl, "layout(location = 2) flat in int ifMaterialId;");
    }

    #[test]
    fn push_constants_lower_per_backend() {
        let members = vec![PushConstantLayout {
            name: "uStrength".to_string(),
            stage: ShaderStage::FRAGMENT,
            ty: GlslType::Float,
            offset: 4,
            size: 4,
        }];
        assert_eq!(
            VulkanGlsl.push_constants(ShaderStage::FRAGMENT, &members),
            "layout(push_constant) uniform FragmentPushConstants {\n    layout(offset = 4) float uStrength;\n};"
        );
        assert_eq!(
            DesktopGlsl.push_constants(ShaderStage::FRAGMENT, &members),
            "uniform float uStrength;"
        );
    }

    #[test]
    fn sampler_arrays_keep_length() {
        let sampler = SamplerBinding {
            name: "depthTextures".to_string(),
            stage: ShaderStage::FRAGMENT,
            dim: TextureDim::Tex2d,
            array_len: Some(2),
            binding: 3,
            sampler_binding: 5,
        };
        assert_eq!(
            VulkanGlsl.sampler(&sampler),
            "layout(set = 0, binding = 3) uniform texture2D depthTextures_0;\n\
             layout(set = 0, binding = 4) uniform texture2D depthTextures_1;\n\
             layout(set = 0, binding = 5) uniform sampler depthTexturesSampler;"
        );
        assert_eq!(WebGlsl.sampler(&sampler), "uniform sampler2D depthTextures[2];");
    }

    #[test]
    fn vulkan_samples_through_combined_constructor() {
        assert_eq!(
            VulkanGlsl.sample_texture_2d(&VulkanGlsl.texture_2d("tColor", None), "uv"),
            "texture(sampler2D(tColor, tColorSampler), uv)"
        );
        assert_eq!(
            VulkanGlsl.texture_size_2d(&VulkanGlsl.texture_2d("depthTextures", Some(1)), "0"),
            "textureSize(sampler2D(depthTextures_1, depthTexturesSampler), 0)"
        );
        assert_eq!(DesktopGlsl.texture_2d("depthTextures", Some(1)), "depthTextures[1]");
        assert_eq!(WebGlsl.texture_2d("tColor", None), "tColor");
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("WebGL2".parse::<BackendKind>().unwrap(), BackendKind::WebGl2);
        assert_eq!("gl".parse::<BackendKind>().unwrap(), BackendKind::OpenGl);
        assert!("metal".parse::<BackendKind>().is_err());
        let kind: BackendKind = serde_json::from_str("\"opengl\"").unwrap();
        assert_eq!(kind, BackendKind::OpenGl);
    }
}
