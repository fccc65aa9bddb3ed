//! Screen-space ambient occlusion: uniforms, position reconstruction and
//! kernel evaluation, plus generation of the sample kernel and noise texture.

use std::f32::consts::PI;
use std::sync::Arc;

use glam::{IVec2, Vec2, Vec3};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::shader_model::binding::UniformBlock;
use crate::shader_model::codegen::CodeGenerator;
use crate::shader_model::error::{Result, ShaderGraphError};
use crate::shader_model::node::{Dependencies, NodeId, ShaderNode};
use crate::shader_model::stage_graph::SetupContext;
use crate::shader_model::types::{GlslType, ShaderStage};
use crate::shader_model::uniform::{ParamCell, Uniform};
use crate::shader_model::value::{NodeIo, ShaderValue};

pub const MAX_KERNEL_SIZE: u32 = 64;
pub const AO_BLOCK: &str = "AoUniforms";
pub const NOISE_SIZE: u32 = 4;

/// Where view-space positions come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AoSetup {
    /// Normals and linear depth from a depth pre-pass; positions are
    /// reconstructed with the inverse projection.
    #[default]
    Forward,
    /// Positions and normals read from G-buffer textures.
    Deferred,
}

impl AoSetup {
    pub fn needs_inverse_projection(self) -> bool {
        self == AoSetup::Forward
    }
}

/// Runtime tunables, readable from the render thread without locking.
#[derive(Clone, Debug)]
pub struct AoSettings {
    radius: ParamCell,
    strength: ParamCell,
    power: ParamCell,
    bias: ParamCell,
    kernel_range: ParamCell,
    kernel: Arc<[Vec3]>,
}

impl Default for AoSettings {
    fn default() -> Self {
        let settings = Self {
            radius: ParamCell::with_f32(1.0),
            strength: ParamCell::with_f32(1.25),
            power: ParamCell::with_f32(1.5),
            bias: ParamCell::with_f32(0.05),
            kernel_range: ParamCell::default(),
            kernel: generate_kernel(MAX_KERNEL_SIZE as usize).into(),
        };
        settings.set_kernel_range(0, 16);
        settings
    }
}

impl AoSettings {
    /// Sample radius in view units; negative values scale with distance.
    pub fn set_radius(&self, radius: f32) {
        self.radius.set_f32(radius);
    }

    pub fn radius(&self) -> f32 {
        self.radius.f32()
    }

    pub fn set_strength(&self, strength: f32) {
        self.strength.set_f32(strength);
    }

    pub fn strength(&self) -> f32 {
        self.strength.f32()
    }

    pub fn set_power(&self, power: f32) {
        self.power.set_f32(power);
    }

    pub fn power(&self) -> f32 {
        self.power.f32()
    }

    pub fn set_bias(&self, bias: f32) {
        self.bias.set_f32(bias);
    }

    pub fn bias(&self) -> f32 {
        self.bias.f32()
    }

    /// Evaluate kernel samples `[start, start + n)`, clamped to the kernel.
    pub fn set_kernel_range(&self, start: i32, n: i32) {
        let from = start.clamp(0, MAX_KERNEL_SIZE as i32);
        let to = (from + n.max(0)).min(MAX_KERNEL_SIZE as i32);
        self.kernel_range.set_ivec2(IVec2::new(from, to));
    }

    pub fn kernel_range(&self) -> IVec2 {
        self.kernel_range.ivec2()
    }

    pub fn set_kernel_size(&self, n: u32) {
        self.set_kernel_range(0, n.min(MAX_KERNEL_SIZE) as i32);
    }

    pub fn kernel_size(&self) -> u32 {
        let range = self.kernel_range();
        (range.y - range.x).max(0) as u32
    }

    pub fn kernel(&self) -> &[Vec3] {
        &self.kernel
    }
}

/// Van der Corput radical inverse in base 2.
pub fn radical_inverse(bits: u32) -> f32 {
    bits.reverse_bits() as f32 * 2.328_306_4e-10
}

pub fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse(i))
}

/// Hemisphere kernel around +z, cosine weighted, with sample lengths
/// growing quadratically and shuffled so any prefix covers all scales.
pub fn generate_kernel(n: usize) -> Vec<Vec3> {
    let mut rng = Pcg32::seed_from_u64(17);
    let mut scales: Vec<f32> = (0..n)
        .map(|i| {
            let f = (i as f32 / n as f32).powi(2);
            0.1 + f * (1.0 - 0.1)
        })
        .collect();
    scales.shuffle(&mut rng);

    (0..n)
        .map(|i| {
            let xi = hammersley(i as u32, n as u32);
            let phi = 2.0 * PI * xi.x;
            let cos_theta = (1.0 - xi.y).sqrt();
            let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
            let k = Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);
            k.normalize_or(Vec3::Z) * scales[i]
        })
        .collect()
}

/// 4x4 RGBA8 texture of random rotation vectors in the xy plane, tiled
/// across the screen to rotate the kernel per pixel.
pub fn noise_texture_data() -> Vec<u8> {
    let texels = (NOISE_SIZE * NOISE_SIZE) as usize;
    let mut rng = Pcg32::seed_from_u64(29);
    let mut angles: Vec<f32> = (0..texels).map(|i| PI * i as f32 / 8.0).collect();
    angles.shuffle(&mut rng);

    let to_unorm = |v: f32| ((v * 0.5 + 0.5) * 255.0) as u8;
    angles
        .iter()
        .flat_map(|a| [to_unorm(a.cos()), to_unorm(a.sin()), 0, 255])
        .collect()
}

/// Uniform handles of the AO block, as read by the other AO nodes.
#[derive(Clone, Debug)]
pub struct AoHandles {
    pub kernel: NodeIo,
    pub proj: NodeIo,
    pub inv_proj: Option<NodeIo>,
    pub noise_scale: NodeIo,
    pub radius: NodeIo,
    pub strength: NodeIo,
    pub power: NodeIo,
    pub bias: NodeIo,
    pub kernel_range: NodeIo,
}

/// Registers the AO block. `uInvProj` is only a member when positions must
/// be reconstructed from depth.
pub struct AoUniformsNode {
    with_inv_proj: bool,
    settings: AoSettings,
    kernel: Uniform,
    proj: Uniform,
    inv_proj: Uniform,
    noise_scale: Uniform,
    radius: Uniform,
    strength: Uniform,
    power: Uniform,
    bias: Uniform,
    kernel_range: Uniform,
    pub handles: AoHandles,
}

impl AoUniformsNode {
    pub fn new(id: NodeId, with_inv_proj: bool, settings: AoSettings) -> Self {
        let kernel = Uniform::vec3_array("uKernel", MAX_KERNEL_SIZE);
        let proj = Uniform::mat4("uProj");
        let inv_proj = Uniform::mat4("uInvProj");
        let noise_scale = Uniform::vec2("uNoiseScale");
        let radius = Uniform::float("uRadius");
        let strength = Uniform::float("uStrength");
        let power = Uniform::float("uPower");
        let bias = Uniform::float("uBias");
        let kernel_range = Uniform::ivec2("uKernelRange");
        let io = |u: &Uniform| NodeIo::new(u.value(), id);
        let handles = AoHandles {
            kernel: io(&kernel),
            proj: io(&proj),
            inv_proj: with_inv_proj.then(|| io(&inv_proj)),
            noise_scale: io(&noise_scale),
            radius: io(&radius),
            strength: io(&strength),
            power: io(&power),
            bias: io(&bias),
            kernel_range: io(&kernel_range),
        };
        Self {
            with_inv_proj,
            settings,
            kernel,
            proj,
            inv_proj,
            noise_scale,
            radius,
            strength,
            power,
            bias,
            kernel_range,
            handles,
        }
    }
}

impl ShaderNode for AoUniformsNode {
    fn name(&self) -> &str {
        "aoUniforms"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        let with_inv_proj = self.with_inv_proj;
        let settings = self.settings.clone();
        let (kernel, proj, inv_proj, noise_scale) = (
            self.kernel.clone(),
            self.proj.clone(),
            self.inv_proj.clone(),
            self.noise_scale.clone(),
        );
        let (radius, strength, power, bias, kernel_range) = (
            self.radius.clone(),
            self.strength.clone(),
            self.power.clone(),
            self.bias.clone(),
            self.kernel_range.clone(),
        );

        let block = UniformBlock::new(AO_BLOCK)
            .member(&self.kernel)
            .member(&self.proj)
            .member_if(with_inv_proj, &self.inv_proj)
            .member(&self.noise_scale)
            .member(&self.radius)
            .member(&self.strength)
            .member(&self.power)
            .member(&self.bias)
            .member(&self.kernel_range)
            .on_update(move |draw, w| {
                for (i, k) in settings.kernel().iter().enumerate() {
                    w.set_vec3_at(&kernel, i as u32, *k)?;
                }
                w.set_mat4(&proj, draw.camera.proj)?;
                if with_inv_proj {
                    w.set_mat4(&inv_proj, draw.camera.inv_proj)?;
                }
                let [width, height] = draw.viewport;
                let noise = NOISE_SIZE as f32;
                w.set_vec2(&noise_scale, Vec2::new(width as f32 / noise, height as f32 / noise))?;
                w.set_float(&radius, settings.radius())?;
                w.set_float(&strength, settings.strength())?;
                w.set_float(&power, settings.power())?;
                w.set_float(&bias, settings.bias())?;
                w.set_ivec2(&kernel_range, settings.kernel_range())
            });
        ctx.add_uniform_block(block)?;
        Ok(())
    }
}

/// Reconstructs a view-space position from screen position and linear depth.
pub struct UnprojectPosNode {
    ao: AoHandles,
    pub depth: NodeIo,
    pub screen_pos: NodeIo,
    pub output: NodeIo,
}

impl UnprojectPosNode {
    pub fn new(id: NodeId, ao: AoHandles) -> Self {
        Self {
            ao,
            depth: ShaderValue::const_float(1.0).into(),
            screen_pos: ShaderValue::const_vec2(Vec2::ZERO).into(),
            output: NodeIo::new(
                ShaderValue::computed(id.var_name("unproject", "position"), GlslType::Vec3F),
                id,
            ),
        }
    }

    fn inv_proj(&self) -> Result<&NodeIo> {
        self.ao
            .inv_proj
            .as_ref()
            .ok_or_else(|| ShaderGraphError::UnconnectedInput {
                input: "uInvProj".to_string(),
            })
    }
}

impl ShaderNode for UnprojectPosNode {
    fn name(&self) -> &str {
        "unprojectPos"
    }

    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::FRAGMENT
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.ao.proj)
            .depends_on(&self.depth)
            .depends_on(&self.screen_pos);
    }

    fn setup(&mut self, _ctx: &mut SetupContext<'_>) -> Result<()> {
        self.inv_proj()?;
        Ok(())
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        let out = self.output.name();
        generator.append_main(format!(
            "
            vec4 {out}_proj = vec4({screen} * 2.0 - vec2(1.0), 1.0, 1.0);
            vec4 {out}_view = {inv_proj} * {out}_proj;
            {decl} = {out}_view.xyz / {out}_view.w;
            {out} *= ({depth} / {out}.z);
            ",
            screen = self.screen_pos.ref2f()?,
            inv_proj = self.inv_proj()?.name(),
            decl = self.output.declare()?,
            depth = self.depth.ref1f()?,
        ));
        Ok(())
    }
}

/// Evaluates the occlusion kernel around a view-space position.
pub struct AoNode {
    ao: AoHandles,
    depth_component: &'static str,
    pub noise_tex: NodeIo,
    pub depth_tex: NodeIo,
    pub screen_pos: NodeIo,
    pub origin: NodeIo,
    pub normal: NodeIo,
    pub output: NodeIo,
}

impl AoNode {
    /// `depth_component` selects the channel of `depth_tex` that holds
    /// view-space depth.
    pub fn new(
        id: NodeId,
        ao: AoHandles,
        noise_tex: NodeIo,
        depth_tex: NodeIo,
        depth_component: &'static str,
    ) -> Self {
        Self {
            ao,
            depth_component,
            noise_tex,
            depth_tex,
            screen_pos: ShaderValue::const_vec2(Vec2::ZERO).into(),
            origin: ShaderValue::const_vec3(Vec3::ZERO).into(),
            normal: ShaderValue::const_vec3(Vec3::Y).into(),
            output: NodeIo::new(
                ShaderValue::computed(id.var_name("ao", "color"), GlslType::Vec4F),
                id,
            ),
        }
    }
}

impl ShaderNode for AoNode {
    fn name(&self) -> &str {
        "aoNode"
    }

    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::FRAGMENT
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on_all([
            &self.ao.kernel,
            &self.noise_tex,
            &self.depth_tex,
            &self.screen_pos,
            &self.origin,
            &self.normal,
        ]);
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        let ao = &self.ao;
        let out = self.output.name();
        let origin = self.origin.ref3f()?;
        let normal = self.normal.ref3f()?;
        let range = ao.kernel_range.name();
        let noise = generator.sample_texture_2d(self.noise_tex.name(), &format!("{out}_noiseCoord"));
        let depth = generator.sample_texture_2d(self.depth_tex.name(), "sampleProj.xy");
        generator.append_main(format!(
            "
            {decl} = vec4(1.0, 0.0, 0.0, 1.0);
            float {out}_linDist = -{origin}.z;
            if ({out}_linDist > 0.0) {{
                float occlFac = 1.0;
                float sampleR = {radius};
                if (sampleR < 0.0) {{
                    sampleR *= -{out}_linDist;
                }}
                if ({out}_linDist < sampleR * 200.0) {{
                    vec2 {out}_noiseCoord = {screen} * {noise_scale};
                    vec3 rotVec = {noise}.xyz * 2.0 - 1.0;
                    vec3 tangent = normalize(rotVec - {normal} * dot(rotVec, {normal}));
                    vec3 bitangent = cross({normal}, tangent);
                    mat3 tbn = mat3(tangent, bitangent, {normal});

                    float occlusion = 0.0;
                    float bias = {bias} * sampleR;
                    for (int i = {range}.x; i < {range}.y; i++) {{
                        vec3 kernel = tbn * {kernel}[i];
                        vec3 samplePos = {origin} + kernel * sampleR;

                        vec4 sampleProj = {proj} * vec4(samplePos, 1.0);
                        sampleProj.xyz /= sampleProj.w;
                        sampleProj.xy = sampleProj.xy * 0.5 + 0.5;

                        if (sampleProj.x > 0.0 && sampleProj.x < 1.0 && sampleProj.y > 0.0 && sampleProj.y < 1.0 && sampleProj.z > 0.0) {{
                            float sampleDepth = {depth}.{component};
                            float rangeCheck = 1.0 - smoothstep(0.0, 1.0, abs({origin}.z - sampleDepth) / (4.0 * sampleR));
                            float occlusionInc = clamp((sampleDepth - (samplePos.z + bias)) * 10.0, 0.0, 1.0);
                            occlusion += occlusionInc * rangeCheck;
                        }}
                    }}
                    occlusion /= float(max({range}.y - {range}.x, 1));
                    float distFac = 1.0 - smoothstep(sampleR * 150.0, sampleR * 200.0, {out}_linDist);
                    occlFac = pow(clamp(1.0 - occlusion * distFac * {strength}, 0.0, 1.0), {power});
                }}
                {out} = vec4(occlFac, 0.0, 0.0, 0.0);
            }}
            ",
            decl = self.output.declare()?,
            radius = ao.radius.name(),
            screen = self.screen_pos.ref2f()?,
            noise_scale = ao.noise_scale.name(),
            bias = ao.bias.name(),
            kernel = ao.kernel.name(),
            proj = ao.proj.name(),
            component = self.depth_component,
            strength = ao.strength.name(),
            power = ao.power.name(),
        ));
        Ok(())
    }
}
