//! Textured mesh: one texture-coordinate channel threaded from the vertex
//! stage into a fragment-side texture lookup.

use crate::shader_model::nodes::{
    AttributeNode, CameraNode, ColorOutputNode, PositionOutputNode, Texture2dNode,
    Texture2dSamplerNode, TransformKind, VertexTransformNode,
};
use crate::shader_model::{Attribute, GlslType, InterfaceVar, ShaderModel};

pub const TEX_COORD_INTERFACE: &str = "ifTexCoords";
pub const COLOR_TEXTURE: &str = "tColor";
pub const COLOR_OUTPUT: &str = "outColor";

pub fn textured_quad() -> ShaderModel {
    let mut model = ShaderModel::new("textured");

    let vs = model.vertex_stage();
    let positions = vs.add_node(|id| AttributeNode::new(id, Attribute::POSITIONS));
    let tex_coords = vs.add_node(|id| AttributeNode::new(id, Attribute::TEXTURE_COORDS));
    let camera = vs.add_node(CameraNode::new);
    let clip = {
        let input = positions.borrow().output.clone();
        let mvp = camera.borrow().mvp_matrix.clone();
        vs.add_node(|id| VertexTransformNode::new(id, TransformKind::Clip, input, mvp))
    };
    let position_out = vs.add_node(PositionOutputNode::new);
    position_out.borrow_mut().input = clip.borrow().output.clone();

    let uv_input = tex_coords.borrow().output.clone();
    let uv = model.stage_interface(
        InterfaceVar::new(TEX_COORD_INTERFACE, GlslType::Vec2F),
        uv_input,
    );

    let fs = model.fragment_stage();
    let texture = fs.add_node(|id| Texture2dNode::new(id, COLOR_TEXTURE));
    let sampler = {
        let texture = texture.borrow().output.clone();
        fs.add_node(|id| Texture2dSamplerNode::new(id, texture, false))
    };
    sampler.borrow_mut().tex_coord = uv;
    let color_out = fs.add_node(|id| ColorOutputNode::new(id, COLOR_OUTPUT));
    color_out.borrow_mut().input = sampler.borrow().output.clone();

    model
}
