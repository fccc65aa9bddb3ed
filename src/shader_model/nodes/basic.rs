//! Basic building blocks: attributes, stage outputs, swizzles and math.

use glam::{Vec3, Vec4};

use crate::shader_model::codegen::CodeGenerator;
use crate::shader_model::error::{Result, ShaderGraphError};
use crate::shader_model::node::{Dependencies, NodeId, ShaderNode};
use crate::shader_model::stage_graph::SetupContext;
use crate::shader_model::types::{Attribute, GlslType, ScalarKind, ShaderStage};
use crate::shader_model::uniform::PushConstant;
use crate::shader_model::value::{NodeIo, ShaderValue};

/// Reads one mesh attribute.
pub struct AttributeNode {
    attribute: Attribute,
    pub output: NodeIo,
}

impl AttributeNode {
    pub fn new(id: NodeId, attribute: Attribute) -> Self {
        let output = NodeIo::new(
            ShaderValue::stage_input(attribute.name.to_string(), attribute.ty, None),
            id,
        );
        Self { attribute, output }
    }
}

impl ShaderNode for AttributeNode {
    fn name(&self) -> &str {
        "attribute"
    }

    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::VERTEX
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        ctx.add_attribute(&self.attribute)?;
        Ok(())
    }
}

/// Writes the clip-space vertex position.
pub struct PositionOutputNode {
    pub input: NodeIo,
}

impl PositionOutputNode {
    pub fn new(_id: NodeId) -> Self {
        Self {
            input: ShaderValue::const_vec4(Vec4::ZERO).into(),
        }
    }
}

impl ShaderNode for PositionOutputNode {
    fn name(&self) -> &str {
        "positionOutput"
    }

    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::VERTEX
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.input);
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        generator.append_main(format!("gl_Position = {};", self.input.ref4f()?));
        Ok(())
    }
}

/// Writes a fragment color output. Locations follow registration order.
pub struct ColorOutputNode {
    target: String,
    pub input: NodeIo,
}

impl ColorOutputNode {
    pub fn new(_id: NodeId, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            input: ShaderValue::const_vec4(Vec4::new(1.0, 0.0, 1.0, 1.0)).into(),
        }
    }
}

impl ShaderNode for ColorOutputNode {
    fn name(&self) -> &str {
        "colorOutput"
    }

    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::FRAGMENT
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.input);
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        ctx.add_color_output(&self.target)?;
        Ok(())
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        generator.append_main(format!("{} = {};", self.target, self.input.ref4f()?));
        Ok(())
    }
}

/// Maps [0, 1] texture coordinates to a clip-space quad covering the screen.
pub struct FullScreenQuadPositionNode {
    pub tex_coord: NodeIo,
    pub output: NodeIo,
}

impl FullScreenQuadPositionNode {
    pub fn new(id: NodeId) -> Self {
        Self {
            tex_coord: ShaderValue::const_vec4(Vec4::ZERO).into(),
            output: NodeIo::new(
                ShaderValue::computed(id.var_name("quadPos", "out"), GlslType::Vec4F),
                id,
            ),
        }
    }
}

impl ShaderNode for FullScreenQuadPositionNode {
    fn name(&self) -> &str {
        "fullScreenQuadPos"
    }

    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::VERTEX
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.tex_coord);
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        generator.append_main(format!(
            "{} = vec4({} * 2.0 - 1.0, 0.0, 1.0);",
            self.output.declare()?,
            self.tex_coord.ref2f()?
        ));
        Ok(())
    }
}

fn swizzle_index(c: char) -> Option<(usize, usize)> {
    const SETS: [&str; 3] = ["xyzw", "rgba", "stpq"];
    SETS.iter()
        .enumerate()
        .find_map(|(set, chars)| chars.find(c).map(|i| (set, i)))
}

/// Selects components of a vector, e.g. `xyz` or `a`.
pub struct SplitNode {
    channels: String,
    pub input: NodeIo,
    pub output: NodeIo,
}

impl SplitNode {
    pub fn new(id: NodeId, input: NodeIo, channels: impl Into<String>) -> Self {
        let channels = channels.into();
        let kind = input.ty().scalar_kind().unwrap_or(ScalarKind::Float);
        let ty = GlslType::vector(kind, channels.len()).unwrap_or(GlslType::Float);
        Self {
            output: NodeIo::new(ShaderValue::computed(id.var_name("split", "out"), ty), id),
            channels,
            input,
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = || ShaderGraphError::InvalidSwizzle {
            channels: self.channels.clone(),
        };
        let components = self.input.ty().components().ok_or_else(invalid)?;
        if self.channels.is_empty() || self.channels.len() > 4 {
            return Err(invalid());
        }
        let mut set = None;
        for c in self.channels.chars() {
            let (c_set, index) = swizzle_index(c).ok_or_else(invalid)?;
            if index >= components || set.is_some_and(|s| s != c_set) {
                return Err(invalid());
            }
            set = Some(c_set);
        }
        Ok(())
    }
}

impl ShaderNode for SplitNode {
    fn name(&self) -> &str {
        "split"
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.input);
    }

    fn setup(&mut self, _ctx: &mut SetupContext<'_>) -> Result<()> {
        self.validate()
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        generator.append_main(format!(
            "{} = {}.{};",
            self.output.declare()?,
            self.input.name(),
            self.channels
        ));
        Ok(())
    }
}

/// Builds a vec4 from a vec3 and a scalar.
pub struct CombineXyzWNode {
    pub xyz: NodeIo,
    pub w: NodeIo,
    pub output: NodeIo,
}

impl CombineXyzWNode {
    pub fn new(id: NodeId) -> Self {
        Self {
            xyz: ShaderValue::const_vec3(Vec3::ZERO).into(),
            w: ShaderValue::const_float(1.0).into(),
            output: NodeIo::new(
                ShaderValue::computed(id.var_name("combine", "out"), GlslType::Vec4F),
                id,
            ),
        }
    }
}

impl ShaderNode for CombineXyzWNode {
    fn name(&self) -> &str {
        "combineXyzW"
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.xyz).depends_on(&self.w);
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        generator.append_main(format!(
            "{} = vec4({}, {});",
            self.output.declare()?,
            self.xyz.ref3f()?,
            self.w.ref1f()?
        ));
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOp {
    fn symbol(self) -> &'static str {
        match self {
            MathOp::Add => "+",
            MathOp::Subtract => "-",
            MathOp::Multiply => "*",
            MathOp::Divide => "/",
        }
    }

    fn node_name(self) -> &'static str {
        match self {
            MathOp::Add => "add",
            MathOp::Subtract => "subtract",
            MathOp::Multiply => "multiply",
            MathOp::Divide => "divide",
        }
    }
}

/// Component-wise binary operation; both operands are read as the output type.
pub struct MathNode {
    op: MathOp,
    pub left: NodeIo,
    pub right: NodeIo,
    pub output: NodeIo,
}

impl MathNode {
    pub fn new(id: NodeId, op: MathOp, ty: GlslType) -> Self {
        let neutral = match op {
            MathOp::Add | MathOp::Subtract => 0.0,
            MathOp::Multiply | MathOp::Divide => 1.0,
        };
        Self {
            op,
            left: ShaderValue::const_float(neutral).into(),
            right: ShaderValue::const_float(neutral).into(),
            output: NodeIo::new(ShaderValue::computed(id.var_name(op.node_name(), "out"), ty), id),
        }
    }
}

impl ShaderNode for MathNode {
    fn name(&self) -> &str {
        self.op.node_name()
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.left).depends_on(&self.right);
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        let ty = self.output.ty();
        generator.append_main(format!(
            "{} = {} {} {};",
            self.output.declare()?,
            self.left.ref_as(ty)?,
            self.op.symbol(),
            self.right.ref_as(ty)?
        ));
        Ok(())
    }
}

pub struct NormalizeNode {
    pub input: NodeIo,
    pub output: NodeIo,
}

impl NormalizeNode {
    pub fn new(id: NodeId, input: NodeIo) -> Self {
        Self {
            input,
            output: NodeIo::new(
                ShaderValue::computed(id.var_name("normalize", "out"), GlslType::Vec3F),
                id,
            ),
        }
    }
}

impl ShaderNode for NormalizeNode {
    fn name(&self) -> &str {
        "normalize"
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.input);
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        generator.append_main(format!(
            "{} = normalize({});",
            self.output.declare()?,
            self.input.ref3f()?
        ));
        Ok(())
    }
}

/// Gamma-encodes the rgb part of a color, alpha passes through.
pub struct GammaNode {
    pub input: NodeIo,
    pub gamma: NodeIo,
    pub output: NodeIo,
}

impl GammaNode {
    pub fn new(id: NodeId, input: NodeIo) -> Self {
        Self {
            input,
            gamma: ShaderValue::const_float(2.2).into(),
            output: NodeIo::new(
                ShaderValue::computed(id.var_name("gamma", "out"), GlslType::Vec4F),
                id,
            ),
        }
    }
}

impl ShaderNode for GammaNode {
    fn name(&self) -> &str {
        "gamma"
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.input).depends_on(&self.gamma);
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        let color = self.input.ref4f()?;
        generator.append_main(format!(
            "{} = vec4(pow({color}.rgb, vec3(1.0 / {})), {color}.a);",
            self.output.declare()?,
            self.gamma.ref1f()?
        ));
        Ok(())
    }
}

/// Exposes a push constant as a value. Updating the constant's cell changes
/// the value for subsequent draws without touching any uniform block.
pub struct PushConstantNode {
    push_constant: PushConstant,
    pub output: NodeIo,
}

impl PushConstantNode {
    pub fn new(id: NodeId, push_constant: PushConstant) -> Self {
        let output = NodeIo::new(push_constant.uniform().value(), id);
        Self {
            push_constant,
            output,
        }
    }

    pub fn push_constant(&self) -> &PushConstant {
        &self.push_constant
    }
}

impl ShaderNode for PushConstantNode {
    fn name(&self) -> &str {
        "pushConstant"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        ctx.add_push_constant(&self.push_constant)?;
        Ok(())
    }
}
