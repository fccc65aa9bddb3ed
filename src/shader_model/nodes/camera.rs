//! Camera uniforms and point / direction transforms.

use crate::shader_model::binding::UniformBlock;
use crate::shader_model::codegen::CodeGenerator;
use crate::shader_model::error::Result;
use crate::shader_model::node::{Dependencies, NodeId, ShaderNode};
use crate::shader_model::stage_graph::SetupContext;
use crate::shader_model::types::GlslType;
use crate::shader_model::uniform::Uniform;
use crate::shader_model::value::{NodeIo, ShaderValue};

pub const CAMERA_BLOCK: &str = "CameraUniforms";

/// Model, view, projection and combined MVP matrices, refreshed per draw.
pub struct CameraNode {
    model: Uniform,
    view: Uniform,
    proj: Uniform,
    mvp: Uniform,
    pub model_matrix: NodeIo,
    pub view_matrix: NodeIo,
    pub proj_matrix: NodeIo,
    pub mvp_matrix: NodeIo,
}

impl CameraNode {
    pub fn new(id: NodeId) -> Self {
        let model = Uniform::mat4("uModel");
        let view = Uniform::mat4("uView");
        let proj = Uniform::mat4("uProj");
        let mvp = Uniform::mat4("uMvp");
        Self {
            model_matrix: NodeIo::new(model.value(), id),
            view_matrix: NodeIo::new(view.value(), id),
            proj_matrix: NodeIo::new(proj.value(), id),
            mvp_matrix: NodeIo::new(mvp.value(), id),
            model,
            view,
            proj,
            mvp,
        }
    }
}

impl ShaderNode for CameraNode {
    fn name(&self) -> &str {
        "camera"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        let (model, view, proj, mvp) = (
            self.model.clone(),
            self.view.clone(),
            self.proj.clone(),
            self.mvp.clone(),
        );
        let block = UniformBlock::new(CAMERA_BLOCK)
            .member(&self.model)
            .member(&self.view)
            .member(&self.proj)
            .member(&self.mvp)
            .on_update(move |draw, w| {
                w.set_mat4(&model, draw.model)?;
                w.set_mat4(&view, draw.camera.view)?;
                w.set_mat4(&proj, draw.camera.proj)?;
                w.set_mat4(&mvp, draw.mvp())
            });
        ctx.add_uniform_block(block)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformKind {
    /// w = 1, translation applies.
    Point,
    /// w = 0, translation is ignored.
    Direction,
    /// w = 1, keeps the homogeneous result as a vec4.
    Clip,
}

/// Transforms a vec3 by a mat4, as a point, a direction or into clip space.
pub struct VertexTransformNode {
    kind: TransformKind,
    pub input: NodeIo,
    pub matrix: NodeIo,
    pub output: NodeIo,
}

impl VertexTransformNode {
    pub fn new(id: NodeId, kind: TransformKind, input: NodeIo, matrix: NodeIo) -> Self {
        let ty = match kind {
            TransformKind::Clip => GlslType::Vec4F,
            TransformKind::Point | TransformKind::Direction => GlslType::Vec3F,
        };
        Self {
            kind,
            input,
            matrix,
            output: NodeIo::new(ShaderValue::computed(id.var_name("transform", "out"), ty), id),
        }
    }
}

impl ShaderNode for VertexTransformNode {
    fn name(&self) -> &str {
        "vertexTransform"
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.input).depends_on(&self.matrix);
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        let matrix = self.matrix.ref_as(GlslType::Mat4F)?;
        let transformed = match self.kind {
            TransformKind::Point => format!("({matrix} * {}).xyz", self.input.ref4f()?),
            TransformKind::Direction => format!("({matrix} * {}).xyz", self.input.ref4f_dir()?),
            TransformKind::Clip => format!("{matrix} * {}", self.input.ref4f()?),
        };
        generator.append_main(format!("{} = {transformed};", self.output.declare()?));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader_model::backend::BackendKind;
    use crate::shader_model::model::ShaderModel;
    use crate::shader_model::nodes::basic::{AttributeNode, PositionOutputNode};
    use crate::shader_model::types::Attribute;

    #[test]
    fn clip_transform_keeps_w() {
        let mut model = ShaderModel::new("clip");
        let vs = model.vertex_stage();
        let pos = vs.add_node(|id| AttributeNode::new(id, Attribute::POSITIONS));
        let camera = vs.add_node(CameraNode::new);
        let pos_io = pos.borrow().output.clone();
        let mvp = camera.borrow().mvp_matrix.clone();
        let clip = vs.add_node(|id| VertexTransformNode::new(id, TransformKind::Clip, pos_io, mvp));
        let clip_io = clip.borrow().output.clone();
        let out = vs.add_node(PositionOutputNode::new);
        out.borrow_mut().input = clip_io;

        let compiled = model.compile(BackendKind::Vulkan).unwrap();
        let src = compiled.vertex_source();
        assert!(src.contains("vec4 transform2_out = uMvp * vec4(attrib_positions, 1.0);"), "{src}");
        assert!(src.contains("gl_Position = transform2_out;"), "{src}");
        assert_eq!(compiled.layout().uniform_blocks[0].name, CAMERA_BLOCK);
    }

    #[test]
    fn direction_transform_drops_translation() {
        let mut model = ShaderModel::new("dir");
        let vs = model.vertex_stage();
        let normal = vs.add_node(|id| AttributeNode::new(id, Attribute::NORMALS));
        let camera = vs.add_node(CameraNode::new);
        let normal_io = normal.borrow().output.clone();
        let m = camera.borrow().model_matrix.clone();
        vs.add_node(|id| VertexTransformNode::new(id, TransformKind::Direction, normal_io, m));

        let compiled = model.compile(BackendKind::Vulkan).unwrap();
        assert!(
            compiled
                .vertex_source()
                .contains("vec3 transform2_out = (uModel * vec4(attrib_normals, 0.0)).xyz;")
        );
    }
}
