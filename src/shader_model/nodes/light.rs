//! Multi-light uniforms, shadowed lights and Lambert diffuse lighting.
//!
//! Shadowed lights span both stages: a vertex node projects the position into
//! each light's clip space and writes one array channel, a fragment node
//! reads that channel and turns it into per-light shadow factors. The two are
//! independent node instances sharing one [`StageChannel`].

use std::cell::RefCell;
use std::f32::consts::PI;
use std::rc::Rc;

use glam::{Vec2, Vec3};

use crate::draw::{DrawContext, LightType};
use crate::shader_model::binding::UniformBlock;
use crate::shader_model::codegen::CodeGenerator;
use crate::shader_model::error::{Result, ShaderGraphError, UpdateError};
use crate::shader_model::interface::{InterfaceVar, StageChannel};
use crate::shader_model::model::ShaderModel;
use crate::shader_model::node::{Dependencies, NodeId, ShaderNode};
use crate::shader_model::stage_graph::SetupContext;
use crate::shader_model::types::{GlslType, ShaderStage};
use crate::shader_model::uniform::{BlockWriter, Uniform};
use crate::shader_model::value::{NodeIo, ShaderValue, fmt_glsl_f32};

use super::texture::Texture2dNode;

pub const LIGHTS_BLOCK: &str = "Lights";
pub const SHADOW_BLOCK: &str = "ShadowLightSpace";
pub const SHADOW_INTERFACE: &str = "ifPosLightSpace";
pub const DEPTH_TEXTURES: &str = "depthTextures";

/// Poisson-disc offsets for shadow map filtering, in texels / 1.5.
const SHADOW_OFFSETS: [Vec2; 9] = [
    Vec2::new(-0.9420, -0.3990),
    Vec2::new(0.9456, -0.7689),
    Vec2::new(-0.0942, -0.9294),
    Vec2::new(0.3450, 0.2939),
    Vec2::new(-0.9159, 0.4577),
    Vec2::new(-0.8154, -0.8791),
    Vec2::new(-0.3828, 0.2768),
    Vec2::new(0.9748, 0.7565),
    Vec2::new(0.4432, -0.9751),
];

/// The `Lights` block: positions (type in w), colors (intensity in w),
/// directions (cosine of the half spot angle in w) and the active count.
struct LightUniforms {
    max_lights: u32,
    positions: Uniform,
    colors: Uniform,
    directions: Uniform,
    count: Uniform,
}

impl LightUniforms {
    fn new(max_lights: u32) -> Self {
        Self {
            max_lights,
            positions: Uniform::vec4_array("lightPositions", max_lights),
            colors: Uniform::vec4_array("lightColors", max_lights),
            directions: Uniform::vec4_array("lightDirections", max_lights),
            count: Uniform::int("lightCount"),
        }
    }

    fn block(&self) -> UniformBlock {
        let (positions, colors, directions, count) = (
            self.positions.clone(),
            self.colors.clone(),
            self.directions.clone(),
            self.count.clone(),
        );
        let max_lights = self.max_lights;
        UniformBlock::new(LIGHTS_BLOCK)
            .member(&self.positions)
            .member(&self.colors)
            .member(&self.directions)
            .member(&self.count)
            .on_update(move |draw, w| {
                write_lights(draw, w, max_lights, [&positions, &colors, &directions, &count])
            })
    }

    fn append_functions(&self, generator: &mut CodeGenerator<'_>) {
        let (pos, color, dir) = (
            self.positions.name(),
            self.colors.name(),
            self.directions.name(),
        );
        let directional = fmt_glsl_f32(LightType::Directional.encoded());
        let point = fmt_glsl_f32(LightType::Point.encoded());

        generator.append_function(
            "light_getFragToLight",
            format!(
                "
                vec3 light_getFragToLight(int idx, vec3 fragPos) {{
                    if ({pos}[idx].w == {directional}) {{
                        return -{dir}[idx].xyz;
                    }}
                    return {pos}[idx].xyz - fragPos;
                }}
                "
            ),
        );
        generator.append_function(
            "light_getRadiance",
            format!(
                "
                vec3 light_getRadiance(int idx, vec3 fragToLight, float innerAngle) {{
                    if ({pos}[idx].w == {directional}) {{
                        return {color}[idx].rgb * {color}[idx].w;
                    }}
                    float dist = length(fragToLight);
                    if ({pos}[idx].w == {point}) {{
                        return {color}[idx].rgb * {color}[idx].w / (dist * dist);
                    }}
                    vec3 lightDir = -normalize(fragToLight);
                    float spotAng = {dir}[idx].w;
                    float innerAng = spotAng + (1.0 - spotAng) * (1.0 - innerAngle);
                    float ang = dot(lightDir, {dir}[idx].xyz);
                    float angVal = cos(clamp((innerAng - ang) / (innerAng - spotAng), 0.0, 1.0) * {pi}) * 0.5 + 0.5;
                    return {color}[idx].rgb * {color}[idx].w / (dist * dist) * angVal;
                }}
                ",
                pi = fmt_glsl_f32(PI)
            ),
        );
    }
}

/// Writes at most `max_lights` lights, one member at a time in block order.
/// A draw without lights only sets the count to zero.
fn write_lights(
    draw: &DrawContext,
    w: &mut BlockWriter<'_>,
    max_lights: u32,
    [positions, colors, directions, count]: [&Uniform; 4],
) -> std::result::Result<(), UpdateError> {
    let active = &draw.lights[..draw.lights.len().min(max_lights as usize)];
    for (i, light) in active.iter().enumerate() {
        w.set_vec4_at(positions, i as u32, light.position.extend(light.ty.encoded()))?;
    }
    for (i, light) in active.iter().enumerate() {
        w.set_vec4_at(colors, i as u32, light.color)?;
    }
    for (i, light) in active.iter().enumerate() {
        let cos_half = (light.spot_angle / 2.0).to_radians().cos();
        w.set_vec4_at(directions, i as u32, light.direction.extend(cos_half))?;
    }
    w.set_int(count, active.len() as i32)
}

/// Call expressions for the shared light routines, as seen from `main`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LightCalls {
    shadowed: bool,
}

impl LightCalls {
    pub fn frag_to_light(&self, idx: &str, frag_pos: &str) -> String {
        format!("light_getFragToLight({idx}, {frag_pos})")
    }

    /// Radiance of light `idx`; shadowed lights scale it by the shadow factor
    /// computed in `main`.
    pub fn radiance(&self, idx: &str, frag_to_light: &str, inner_angle: &str) -> String {
        let call = format!("light_getRadiance({idx}, {frag_to_light}, {inner_angle})");
        if self.shadowed {
            format!("({call} * shadowFacs[{idx}])")
        } else {
            call
        }
    }
}

/// Unshadowed light array.
pub struct MultiLightNode {
    lights: LightUniforms,
    pub light_count: NodeIo,
}

impl MultiLightNode {
    pub fn new(id: NodeId, max_lights: u32) -> Self {
        let lights = LightUniforms::new(max_lights);
        let light_count = NodeIo::new(lights.count.value(), id);
        Self {
            lights,
            light_count,
        }
    }

    pub fn calls(&self) -> LightCalls {
        LightCalls { shadowed: false }
    }
}

impl ShaderNode for MultiLightNode {
    fn name(&self) -> &str {
        "multiLight"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        ctx.add_uniform_block(self.lights.block())?;
        Ok(())
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        self.lights.append_functions(generator);
        Ok(())
    }
}

/// Vertex half of a shadowed light array: one light-space position per light.
pub struct ShadowedLightVertexNode {
    max_lights: u32,
    channel: StageChannel,
    light_mvp: Uniform,
    pub position: NodeIo,
    pub model_matrix: Option<NodeIo>,
}

impl ShadowedLightVertexNode {
    pub fn new(_id: NodeId, max_lights: u32) -> Self {
        Self {
            max_lights,
            channel: StageChannel::new(InterfaceVar::array(
                SHADOW_INTERFACE,
                GlslType::Vec4F,
                max_lights,
            )),
            light_mvp: Uniform::mat4_array("lightMvp", max_lights),
            position: ShaderValue::const_vec3(Vec3::ZERO).into(),
            model_matrix: None,
        }
    }

    /// The channel a fragment-side reader registers against.
    pub fn channel(&self) -> StageChannel {
        self.channel.clone()
    }
}

impl ShaderNode for ShadowedLightVertexNode {
    fn name(&self) -> &str {
        "shadowedLightVertex"
    }

    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::VERTEX
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.position);
        if let Some(model) = &self.model_matrix {
            deps.depends_on(model);
        }
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        if self.model_matrix.is_none() {
            return Err(ShaderGraphError::UnconnectedInput {
                input: "model_matrix".to_string(),
            });
        }
        self.channel.allocate(ctx)?;

        let light_mvp = self.light_mvp.clone();
        let max_lights = self.max_lights as usize;
        let block = UniformBlock::new(SHADOW_BLOCK)
            .member(&self.light_mvp)
            .on_update(move |draw, w| {
                for (i, light) in draw.lights.iter().take(max_lights).enumerate() {
                    w.set_mat4_at(&light_mvp, i as u32, light.light_mvp)?;
                }
                Ok(())
            });
        ctx.add_uniform_block(block)?;
        Ok(())
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        let model = self
            .model_matrix
            .as_ref()
            .ok_or_else(|| ShaderGraphError::UnconnectedInput {
                input: "model_matrix".to_string(),
            })?;
        let model = model.ref_as(GlslType::Mat4F)?;
        let position = self.position.ref4f()?;
        let target = &self.channel.var().name;
        for i in 0..self.max_lights {
            generator.append_main(format!(
                "{target}[{i}] = {}[{i}] * ({model} * {position});",
                self.light_mvp.name()
            ));
        }
        Ok(())
    }
}

/// Fragment half of a shadowed light array: light uniforms plus one
/// filtered shadow factor per light.
pub struct ShadowedLightFragmentNode {
    lights: LightUniforms,
    channel: StageChannel,
    pub depth_textures: NodeIo,
    pub light_count: NodeIo,
}

impl ShadowedLightFragmentNode {
    /// `max_lights` is this reader's own expectation of the channel length; a
    /// mismatch with the writer fails the compile.
    pub fn new(id: NodeId, channel: StageChannel, max_lights: u32, depth_textures: NodeIo) -> Self {
        let lights = LightUniforms::new(max_lights);
        let light_count = NodeIo::new(lights.count.value(), id);
        Self {
            lights,
            channel,
            depth_textures,
            light_count,
        }
    }

    pub fn calls(&self) -> LightCalls {
        LightCalls { shadowed: true }
    }

    fn expected_channel(&self) -> InterfaceVar {
        InterfaceVar::array(SHADOW_INTERFACE, GlslType::Vec4F, self.lights.max_lights)
    }
}

impl ShaderNode for ShadowedLightFragmentNode {
    fn name(&self) -> &str {
        "shadowedLightFragment"
    }

    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::FRAGMENT
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.depth_textures);
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        ctx.add_uniform_block(self.lights.block())?;
        self.channel.register_input(ctx, self.expected_channel())?;
        Ok(())
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        self.lights.append_functions(generator);

        // Samplers in an array cannot be indexed dynamically on every target,
        // so the factors are computed here, unrolled, and read by index later.
        let n = self.lights.max_lights;
        let textures = self.depth_textures.name();
        let input = SHADOW_INTERFACE;
        let size = generator.texture_size_2d(textures, Some(0), "0");
        generator.append_main(format!(
            "
            float shadowFacs[{n}];
            ivec2 shadowMapSize = {size};
            float shadowDx = 1.5 / float(shadowMapSize.x);
            float shadowDy = 1.5 / float(shadowMapSize.y);
            vec4 shadowProjPos;
            vec3 shadowCoord;
            "
        ));
        for i in 0..n {
            generator.append_main(format!(
                "
                shadowProjPos = {input}[{i}];
                shadowCoord = shadowProjPos.xyz / shadowProjPos.w;
                shadowFacs[{i}] = 0.0;
                "
            ));
            for off in SHADOW_OFFSETS {
                let coord = format!(
                    "shadowCoord.xy + vec2(shadowDx * {}, shadowDy * {})",
                    fmt_glsl_f32(off.x),
                    fmt_glsl_f32(off.y)
                );
                let sample = generator.sample_texture_2d_at(textures, i, &coord);
                generator.append_main(format!(
                    "shadowFacs[{i}] += step(shadowCoord.z - 0.001, {sample}.x);"
                ));
            }
            generator.append_main(format!(
                "shadowFacs[{i}] /= {};",
                fmt_glsl_f32(SHADOW_OFFSETS.len() as f32)
            ));
        }
        Ok(())
    }
}

/// Both halves of a shadowed light array plus its depth texture binding.
pub struct ShadowedLights {
    pub vertex: Rc<RefCell<ShadowedLightVertexNode>>,
    pub fragment: Rc<RefCell<ShadowedLightFragmentNode>>,
    pub depth_textures: Rc<RefCell<Texture2dNode>>,
}

impl ShadowedLights {
    pub fn add_to(model: &mut ShaderModel, max_lights: u32) -> Self {
        let vertex = model
            .vertex_stage()
            .add_node(|id| ShadowedLightVertexNode::new(id, max_lights));
        let channel = vertex.borrow().channel();

        let fragment_stage = model.fragment_stage();
        let depth_textures =
            fragment_stage.add_node(|id| Texture2dNode::array(id, DEPTH_TEXTURES, max_lights));
        let textures = depth_textures.borrow().output.clone();
        let fragment = fragment_stage
            .add_node(|id| ShadowedLightFragmentNode::new(id, channel, max_lights, textures));

        Self {
            vertex,
            fragment,
            depth_textures,
        }
    }
}

/// Diffuse lighting over every active light.
pub struct LambertNode {
    calls: LightCalls,
    spot_inner_angle: f32,
    pub light_count: NodeIo,
    pub frag_pos: NodeIo,
    pub normal: NodeIo,
    pub albedo: NodeIo,
    pub output: NodeIo,
}

impl LambertNode {
    pub fn new(id: NodeId, calls: LightCalls, light_count: NodeIo) -> Self {
        Self {
            calls,
            spot_inner_angle: 0.8,
            light_count,
            frag_pos: ShaderValue::const_vec3(Vec3::ZERO).into(),
            normal: ShaderValue::const_vec3(Vec3::Z).into(),
            albedo: ShaderValue::const_vec4(glam::Vec4::ONE).into(),
            output: NodeIo::new(
                ShaderValue::computed(id.var_name("lambert", "color"), GlslType::Vec4F),
                id,
            ),
        }
    }

    /// Fraction of the spot cone lit at full strength before the falloff
    /// starts. Defaults to 0.8.
    pub fn with_spot_inner_angle(mut self, spot_inner_angle: f32) -> Self {
        self.spot_inner_angle = spot_inner_angle;
        self
    }
}

impl ShaderNode for LambertNode {
    fn name(&self) -> &str {
        "lambert"
    }

    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::FRAGMENT
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on_all([&self.light_count, &self.frag_pos, &self.normal, &self.albedo]);
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        let diffuse = format!("{}_diffuse", self.output.name());
        let to_light = format!("{}_toLight", self.output.name());
        let normal = self.normal.ref3f()?;
        let albedo = self.albedo.ref4f()?;
        generator.append_main(format!(
            "
            vec3 {diffuse} = vec3(0.0);
            for (int i = 0; i < {count}; i++) {{
                vec3 {to_light} = {frag_to_light};
                vec3 radiance = {radiance};
                {diffuse} += radiance * max(dot({normal}, normalize({to_light})), 0.0);
            }}
            {out} = vec4({albedo}.rgb * {diffuse}, {albedo}.a);
            ",
            count = self.light_count.ref1i()?,
            frag_to_light = self.calls.frag_to_light("i", &self.frag_pos.ref3f()?),
            radiance = self.calls.radiance("i", &to_light, &fmt_glsl_f32(self.spot_inner_angle)),
            out = self.output.declare()?,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::Light;
    use crate::shader_model::uniform::std140_layout;
    use glam::Vec4;

    fn run_update(lights: Vec<Light>, max_lights: u32) -> (Vec<u8>, Vec<crate::shader_model::uniform::MemberLayout>) {
        let uniforms = LightUniforms::new(max_lights);
        let members = [
            uniforms.positions.clone(),
            uniforms.colors.clone(),
            uniforms.directions.clone(),
            uniforms.count.clone(),
        ];
        let (layout, size) = std140_layout(&members);
        let mut data = vec![0u8; size as usize];
        let draw = DrawContext::default().with_lights(lights);
        let mut w = BlockWriter::new(LIGHTS_BLOCK, &layout, &mut data);
        write_lights(&draw, &mut w, max_lights, [&members[0], &members[1], &members[2], &members[3]]).unwrap();
        (data, layout)
    }

    fn count_of(data: &[u8], layout: &[crate::shader_model::uniform::MemberLayout]) -> i32 {
        let offset = layout[3].offset as usize;
        i32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
    }

    #[test]
    fn zero_lights_degrade_to_zero_contribution() {
        let (data, layout) = run_update(Vec::new(), 4);
        assert_eq!(count_of(&data, &layout), 0);
        assert!(data.iter().all(|b| *b == 0));
    }

    #[test]
    fn light_count_is_clamped_to_array_length() {
        let lights = vec![Light::point(Vec3::ONE, Vec4::ONE); 6];
        let (data, layout) = run_update(lights, 4);
        assert_eq!(count_of(&data, &layout), 4);
    }

    #[test]
    fn unshadowed_lambert_defines_light_routines_once() {
        use crate::shader_model::backend::BackendKind;

        let mut model = ShaderModel::new("lambert");
        let fragment = model.fragment_stage();
        let lights = fragment.add_node(|id| MultiLightNode::new(id, 2));
        let (calls, count) = {
            let lights = lights.borrow();
            (lights.calls(), lights.light_count.clone())
        };
        let first = fragment.add_node(|id| LambertNode::new(id, calls, count.clone()));
        let second = fragment.add_node(|id| LambertNode::new(id, calls, count));
        second.borrow_mut().albedo = first.borrow().output.clone();

        let compiled = model.compile(BackendKind::Vulkan).unwrap();
        let source = compiled.fragment_source();
        assert_eq!(source.matches("vec3 light_getRadiance(").count(), 1, "{source}");
        assert_eq!(source.matches("vec3 light_getFragToLight(").count(), 1, "{source}");
        assert!(!source.contains("shadowFacs"), "{source}");
        assert!(source.contains("vec4 lightPositions[2];"), "{source}");
        assert_eq!(compiled.layout().uniform_blocks[0].name, LIGHTS_BLOCK);
    }

    #[test]
    fn spot_inner_angle_reaches_the_radiance_call() {
        use crate::shader_model::backend::BackendKind;

        let compile = |inner: Option<f32>| {
            let mut model = ShaderModel::new("spot");
            let fragment = model.fragment_stage();
            let lights = fragment.add_node(|id| MultiLightNode::new(id, 1));
            let (calls, count) = {
                let lights = lights.borrow();
                (lights.calls(), lights.light_count.clone())
            };
            fragment.add_node(|id| match inner {
                Some(inner) => LambertNode::new(id, calls, count).with_spot_inner_angle(inner),
                None => LambertNode::new(id, calls, count),
            });
            model.compile(BackendKind::Vulkan).unwrap().fragment_source().to_string()
        };

        let default = compile(None);
        assert!(default.contains("_toLight, 0.8)"), "{default}");
        let narrow = compile(Some(0.25));
        assert!(narrow.contains("_toLight, 0.25)"), "{narrow}");
        assert!(!narrow.contains("_toLight, 0.8)"), "{narrow}");
    }

    #[test]
    fn shadowed_radiance_is_scaled_by_shadow_factor() {
        let calls = LightCalls { shadowed: true };
        assert_eq!(
            calls.radiance("i", "v", "0.8"),
            "(light_getRadiance(i, v, 0.8) * shadowFacs[i])"
        );
        assert_eq!(
            LightCalls { shadowed: false }.frag_to_light("2", "p"),
            "light_getFragToLight(2, p)"
        );
    }
}
