//! Resource binding set of a stage: uniform blocks, push constants and
//! sampler bindings, plus the serializable layout handed to the render
//! backend.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::error::{Result, ShaderGraphError, UpdateError};
use super::types::{GlslType, ShaderStage, TextureDim};
use super::uniform::{BlockWriter, MemberLayout, ParamCell, PushConstant, Uniform, std140_layout};
use crate::draw::DrawContext;

/// Per-draw update routine of a uniform block. Runs on the render thread and
/// must not allocate, block or do I/O.
pub type UpdateFn =
    dyn Fn(&DrawContext, &mut BlockWriter<'_>) -> std::result::Result<(), UpdateError>
        + Send
        + Sync;

/// Builder for a uniform block. Member order is registration order.
pub struct UniformBlock {
    name: String,
    members: Vec<Uniform>,
    update: Option<Arc<UpdateFn>>,
}

impl UniformBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            update: None,
        }
    }

    pub fn member(mut self, uniform: &Uniform) -> Self {
        self.members.push(uniform.clone());
        self
    }

    /// Add `uniform` only when `condition` holds. The flag is fixed at build
    /// time; it decides the declaration and the CPU layout alike.
    pub fn member_if(self, condition: bool, uniform: &Uniform) -> Self {
        if condition { self.member(uniform) } else { self }
    }

    pub fn on_update<F>(mut self, update: F) -> Self
    where
        F: Fn(&DrawContext, &mut BlockWriter<'_>) -> std::result::Result<(), UpdateError>
            + Send
            + Sync
            + 'static,
    {
        self.update = Some(Arc::new(update));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for UniformBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniformBlock")
            .field("name", &self.name)
            .field("members", &self.members)
            .field("has_update", &self.update.is_some())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UniformBlockLayout {
    pub name: String,
    pub stage: ShaderStage,
    pub binding: u32,
    pub members: Vec<MemberLayout>,
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PushConstantLayout {
    pub name: String,
    pub stage: ShaderStage,
    pub ty: GlslType,
    pub offset: u32,
    pub size: u32,
}

/// A sampled texture. It reserves one binding per texture element starting at
/// `binding`, then `sampler_binding` for the sampler object of backends that
/// keep the two apart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SamplerBinding {
    pub name: String,
    pub stage: ShaderStage,
    pub dim: TextureDim,
    pub array_len: Option<u32>,
    pub binding: u32,
    pub sampler_binding: u32,
}

/// Binding contract of a compiled model, both stages merged in registration
/// order (vertex first).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BindingLayout {
    pub uniform_blocks: Vec<UniformBlockLayout>,
    pub push_constants: Vec<PushConstantLayout>,
    pub push_constant_size: u32,
    pub samplers: Vec<SamplerBinding>,
}

/// Model-wide counters, so binding numbers and push-constant offsets never
/// collide between stages of one pipeline.
#[derive(Debug, Default)]
pub(crate) struct BindingCounters {
    next_binding: u32,
    push_constant_offset: u32,
}

impl BindingCounters {
    fn next_binding(&mut self) -> u32 {
        self.reserve_bindings(1)
    }

    fn reserve_bindings(&mut self, count: u32) -> u32 {
        let first = self.next_binding;
        self.next_binding += count;
        first
    }

    pub(crate) fn push_constant_size(&self) -> u32 {
        self.push_constant_offset
    }
}

pub(crate) struct RegisteredBlock {
    pub layout: UniformBlockLayout,
    pub update: Arc<UpdateFn>,
}

pub(crate) struct RegisteredPushConstant {
    pub layout: PushConstantLayout,
    pub cell: ParamCell,
}

/// Everything the nodes of one stage registered, in first-registration order.
#[derive(Default)]
pub(crate) struct BindingSet {
    blocks: Vec<RegisteredBlock>,
    push_constants: Vec<RegisteredPushConstant>,
    samplers: Vec<SamplerBinding>,
}

impl BindingSet {
    fn check_name(&self, name: &str, stage: ShaderStage) -> Result<()> {
        let taken = self.blocks.iter().any(|b| b.layout.name == name)
            || self.push_constants.iter().any(|p| p.layout.name == name)
            || self.samplers.iter().any(|s| s.name == name);
        if taken {
            return Err(ShaderGraphError::DuplicateBinding {
                name: name.to_string(),
                stage,
            });
        }
        Ok(())
    }

    pub(crate) fn add_block(
        &mut self,
        block: UniformBlock,
        stage: ShaderStage,
        counters: &mut BindingCounters,
    ) -> Result<u32> {
        self.check_name(&block.name, stage)?;
        for (i, m) in block.members.iter().enumerate() {
            if block.members[..i].iter().any(|prev| prev.name() == m.name()) {
                return Err(ShaderGraphError::DuplicateBlockMember {
                    block: block.name.clone(),
                    member: m.name().to_string(),
                });
            }
        }
        let Some(update) = block.update else {
            return Err(ShaderGraphError::MissingUpdateRoutine { block: block.name });
        };

        let (members, size) = std140_layout(&block.members);
        let binding = counters.next_binding();
        log::debug!(
            "{stage}: uniform block `{}` at binding {binding}, {} members, {size} bytes",
            block.name,
            members.len()
        );
        self.blocks.push(RegisteredBlock {
            layout: UniformBlockLayout {
                name: block.name,
                stage,
                binding,
                members,
                size,
            },
            update,
        });
        Ok(binding)
    }

    pub(crate) fn add_push_constant(
        &mut self,
        pc: &PushConstant,
        stage: ShaderStage,
        counters: &mut BindingCounters,
    ) -> Result<u32> {
        let uniform = pc.uniform();
        self.check_name(uniform.name(), stage)?;
        let Some((align, size)) = PushConstant::std430_align_size(uniform.ty()) else {
            return Err(ShaderGraphError::UnsupportedPushConstant {
                name: uniform.name().to_string(),
                ty: uniform.ty(),
            });
        };
        let offset = PushConstant::round_offset(counters.push_constant_offset, align);
        counters.push_constant_offset = offset + size;
        self.push_constants.push(RegisteredPushConstant {
            layout: PushConstantLayout {
                name: uniform.name().to_string(),
                stage,
                ty: uniform.ty(),
                offset,
                size,
            },
            cell: pc.cell().clone(),
        });
        Ok(offset)
    }

    pub(crate) fn add_sampler(
        &mut self,
        name: &str,
        dim: TextureDim,
        array_len: Option<u32>,
        stage: ShaderStage,
        counters: &mut BindingCounters,
    ) -> Result<u32> {
        self.check_name(name, stage)?;
        let textures = array_len.unwrap_or(1);
        let binding = counters.reserve_bindings(textures + 1);
        let sampler_binding = binding + textures;
        log::debug!(
            "{stage}: texture `{name}` at binding {binding} ({textures} elements), sampler at {sampler_binding}"
        );
        self.samplers.push(SamplerBinding {
            name: name.to_string(),
            stage,
            dim,
            array_len,
            binding,
            sampler_binding,
        });
        Ok(binding)
    }

    pub(crate) fn blocks(&self) -> &[RegisteredBlock] {
        &self.blocks
    }

    pub(crate) fn push_constants(&self) -> &[RegisteredPushConstant] {
        &self.push_constants
    }

    pub(crate) fn samplers(&self) -> &[SamplerBinding] {
        &self.samplers
    }
}
