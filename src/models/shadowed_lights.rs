//! Lambert-lit mesh with one shadow map per light. The light-space position
//! array is the only array-typed stage interface channel.

use glam::Vec4;

use crate::shader_model::nodes::{
    AttributeNode, CameraNode, ColorOutputNode, LambertNode, NormalizeNode, PositionOutputNode,
    ShadowedLights, TransformKind, VertexTransformNode,
};
use crate::shader_model::{Attribute, GlslType, InterfaceVar, ShaderModel, ShaderValue};

pub const FRAG_POS_INTERFACE: &str = "ifFragPos";
pub const NORMAL_INTERFACE: &str = "ifNormal";
pub const COLOR_OUTPUT: &str = "outColor";

pub fn shadowed_lights(max_lights: u32) -> ShaderModel {
    let mut model = ShaderModel::new("shadowed-lights");

    let vs = model.vertex_stage();
    let positions = vs.add_node(|id| AttributeNode::new(id, Attribute::POSITIONS));
    let normals = vs.add_node(|id| AttributeNode::new(id, Attribute::NORMALS));
    let camera = vs.add_node(CameraNode::new);
    let (position_io, normal_io) = (
        positions.borrow().output.clone(),
        normals.borrow().output.clone(),
    );
    let (model_matrix, mvp) = {
        let camera = camera.borrow();
        (camera.model_matrix.clone(), camera.mvp_matrix.clone())
    };

    let clip = {
        let (input, mvp) = (position_io.clone(), mvp.clone());
        vs.add_node(|id| VertexTransformNode::new(id, TransformKind::Clip, input, mvp))
    };
    let position_out = vs.add_node(PositionOutputNode::new);
    position_out.borrow_mut().input = clip.borrow().output.clone();

    let world_pos = {
        let (input, m) = (position_io.clone(), model_matrix.clone());
        vs.add_node(|id| VertexTransformNode::new(id, TransformKind::Point, input, m))
    };
    let world_normal = {
        let m = model_matrix.clone();
        vs.add_node(|id| VertexTransformNode::new(id, TransformKind::Direction, normal_io, m))
    };
    let world_pos = world_pos.borrow().output.clone();
    let world_normal = world_normal.borrow().output.clone();

    let frag_pos = model.stage_interface(
        InterfaceVar::new(FRAG_POS_INTERFACE, GlslType::Vec3F),
        world_pos,
    );
    let frag_normal = model.stage_interface(
        InterfaceVar::new(NORMAL_INTERFACE, GlslType::Vec3F),
        world_normal,
    );

    let lights = ShadowedLights::add_to(&mut model, max_lights);
    {
        let mut vertex = lights.vertex.borrow_mut();
        vertex.position = position_io;
        vertex.model_matrix = Some(model_matrix);
    }
    let (calls, light_count) = {
        let fragment = lights.fragment.borrow();
        (fragment.calls(), fragment.light_count.clone())
    };

    let fs = model.fragment_stage();
    let normal = fs.add_node(|id| NormalizeNode::new(id, frag_normal));
    let lambert = fs.add_node(|id| LambertNode::new(id, calls, light_count));
    {
        let mut lambert = lambert.borrow_mut();
        lambert.frag_pos = frag_pos;
        lambert.normal = normal.borrow().output.clone();
        lambert.albedo = ShaderValue::const_vec4(Vec4::new(0.8, 0.8, 0.8, 1.0)).into();
    }
    let color_out = fs.add_node(|id| ColorOutputNode::new(id, COLOR_OUTPUT));
    color_out.borrow_mut().input = lambert.borrow().output.clone();

    model
}
