//! Full-screen SSAO pass, reading either a forward depth pre-pass or a
//! deferred G-buffer.

use crate::shader_model::nodes::{
    AoNode, AoSettings, AoSetup, AoUniformsNode, AttributeNode, ColorOutputNode,
    FullScreenQuadPositionNode, PositionOutputNode, SplitNode, Texture2dNode,
    Texture2dSamplerNode, UnprojectPosNode,
};
use crate::shader_model::{Attribute, GlslType, InterfaceVar, NodeIo, ShaderModel, StageGraph};

pub const SCREEN_POS_INTERFACE: &str = "ifScreenPos";
pub const NOISE_TEXTURE: &str = "noiseTex";
/// Forward: view-space normal in rgb, linear depth in a.
pub const NORMAL_DEPTH_TEXTURE: &str = "normalDepthTex";
/// Deferred: view-space positions.
pub const POSITION_TEXTURE: &str = "positionTex";
/// Deferred: view-space normals.
pub const NORMAL_TEXTURE: &str = "normalTex";
pub const COLOR_OUTPUT: &str = "outColor";

pub fn ambient_occlusion(setup: AoSetup, settings: AoSettings) -> ShaderModel {
    let name = match setup {
        AoSetup::Forward => "ao-forward",
        AoSetup::Deferred => "ao-deferred",
    };
    let mut model = ShaderModel::new(name);

    let vs = model.vertex_stage();
    let tex_coords = vs.add_node(|id| AttributeNode::new(id, Attribute::TEXTURE_COORDS));
    let uv_input = tex_coords.borrow().output.clone();
    let quad = vs.add_node(FullScreenQuadPositionNode::new);
    quad.borrow_mut().tex_coord = uv_input.clone();
    let position_out = vs.add_node(PositionOutputNode::new);
    position_out.borrow_mut().input = quad.borrow().output.clone();

    let screen_pos = model.stage_interface(
        InterfaceVar::new(SCREEN_POS_INTERFACE, GlslType::Vec2F),
        uv_input,
    );

    let fs = model.fragment_stage();
    let with_inv_proj = setup.needs_inverse_projection();
    let uniforms = fs.add_node(|id| AoUniformsNode::new(id, with_inv_proj, settings));
    let handles = uniforms.borrow().handles.clone();
    let noise = texture(fs, NOISE_TEXTURE);

    let (depth_tex, depth_component, origin, normal) = match setup {
        AoSetup::Forward => {
            let normal_depth = texture(fs, NORMAL_DEPTH_TEXTURE);
            let sample = sample(fs, &normal_depth, &screen_pos);
            let normal = split(fs, &sample, "xyz");
            let depth = split(fs, &sample, "a");
            let unproject = fs.add_node(|id| UnprojectPosNode::new(id, handles.clone()));
            {
                let mut unproject = unproject.borrow_mut();
                unproject.depth = depth;
                unproject.screen_pos = screen_pos.clone();
            }
            let origin = unproject.borrow().output.clone();
            (normal_depth, "a", origin, normal)
        }
        AoSetup::Deferred => {
            let positions = texture(fs, POSITION_TEXTURE);
            let normals = texture(fs, NORMAL_TEXTURE);
            let position_sample = sample(fs, &positions, &screen_pos);
            let normal_sample = sample(fs, &normals, &screen_pos);
            let origin = split(fs, &position_sample, "xyz");
            let normal = split(fs, &normal_sample, "xyz");
            (positions, "z", origin, normal)
        }
    };

    let ao = fs.add_node(|id| AoNode::new(id, handles, noise, depth_tex, depth_component));
    {
        let mut ao = ao.borrow_mut();
        ao.screen_pos = screen_pos;
        ao.origin = origin;
        ao.normal = normal;
    }
    let color_out = fs.add_node(|id| ColorOutputNode::new(id, COLOR_OUTPUT));
    color_out.borrow_mut().input = ao.borrow().output.clone();

    model
}

fn texture(fs: &mut StageGraph, name: &str) -> NodeIo {
    let node = fs.add_node(|id| Texture2dNode::new(id, name));
    let output = node.borrow().output.clone();
    output
}

fn sample(fs: &mut StageGraph, texture: &NodeIo, coord: &NodeIo) -> NodeIo {
    let node = fs.add_node(|id| Texture2dSamplerNode::new(id, texture.clone(), false));
    node.borrow_mut().tex_coord = coord.clone();
    let output = node.borrow().output.clone();
    output
}

fn split(fs: &mut StageGraph, input: &NodeIo, channels: &str) -> NodeIo {
    let node = fs.add_node(|id| SplitNode::new(id, input.clone(), channels));
    let output = node.borrow().output.clone();
    output
}
