//! The model driver and the compiled artifact.
//!
//! A [`ShaderModel`] owns one vertex and one fragment [`StageGraph`].
//! `compile` runs the declare pass on both stages, verifies the stage
//! interface and dry-runs every update routine, and only then runs the emit
//! pass. Nothing is emitted for a model with a configuration error.

use std::sync::Arc;

use serde::Serialize;

use super::backend::BackendKind;
use super::binding::{BindingCounters, BindingLayout, UpdateFn};
use super::error::{Result, ShaderGraphError, UpdateError};
use super::interface::{
    InterfaceSlot, InterfaceVar, StageChannel, StageInterfaceConsumer, StageInterfaceProducer,
    verify_link,
};
use super::stage_graph::{AttributeBinding, StageGraph};
use super::types::ShaderStage;
use super::uniform::{BlockWriter, ParamCell};
use super::value::NodeIo;
use crate::draw::DrawContext;

pub struct ShaderModel {
    name: String,
    vertex: StageGraph,
    fragment: StageGraph,
}

impl ShaderModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vertex: StageGraph::new(ShaderStage::VERTEX),
            fragment: StageGraph::new(ShaderStage::FRAGMENT),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_stage(&mut self) -> &mut StageGraph {
        &mut self.vertex
    }

    pub fn fragment_stage(&mut self) -> &mut StageGraph {
        &mut self.fragment
    }

    /// Thread `input` from the vertex stage to the fragment stage through a
    /// new interface channel. Returns the fragment-side handle.
    pub fn stage_interface(&mut self, var: InterfaceVar, input: NodeIo) -> NodeIo {
        let channel = StageChannel::new(var);
        let producer = channel.clone();
        self.vertex
            .add_node(|id| StageInterfaceProducer::new(id, producer, input));
        let consumer = self
            .fragment
            .add_node(|id| StageInterfaceConsumer::new(id, channel));
        let output = consumer.borrow().output.clone();
        output
    }

    /// Run the two-pass compile for `backend` and produce the immutable
    /// artifact.
    pub fn compile(mut self, backend: BackendKind) -> Result<CompiledShader> {
        let mut counters = BindingCounters::default();

        self.vertex.run_setup(&mut counters)?;
        self.fragment.run_setup(&mut counters)?;
        verify_link(&self.vertex, &self.fragment)?;
        self.dry_run_update_routines()?;

        let target = backend.backend();
        let vertex_source = self.vertex.run_emit(target)?;
        let fragment_source = self.fragment.run_emit(target)?;

        let mut layout = BindingLayout {
            push_constant_size: counters.push_constant_size(),
            ..BindingLayout::default()
        };
        let mut updaters = Vec::new();
        let mut push_constant_cells = Vec::new();
        for stage in [&self.vertex, &self.fragment] {
            let bindings = stage.bindings();
            for block in bindings.blocks() {
                layout.uniform_blocks.push(block.layout.clone());
                updaters.push(Arc::clone(&block.update));
            }
            for pc in bindings.push_constants() {
                layout.push_constants.push(pc.layout.clone());
                push_constant_cells.push(pc.cell.clone());
            }
            layout.samplers.extend(bindings.samplers().iter().cloned());
        }

        let compiled = CompiledShader {
            name: self.name,
            backend,
            vertex_source,
            fragment_source,
            attributes: self.vertex.attributes().to_vec(),
            interface: self.vertex.outputs().to_vec(),
            interface_slot_count: self.vertex.interface_slot_count(),
            layout,
            updaters,
            push_constant_cells,
        };
        log::info!(
            "compiled shader `{}` for {backend}: {} uniform blocks, {} samplers, {} interface slots",
            compiled.name,
            compiled.layout.uniform_blocks.len(),
            compiled.layout.samplers.len(),
            compiled.interface_slot_count
        );
        Ok(compiled)
    }

    /// Run every update routine once against a synthetic draw so writes to
    /// unregistered members or out of member order fail the compile.
    fn dry_run_update_routines(&self) -> Result<()> {
        let draw = DrawContext::dry_run();
        for stage in [&self.vertex, &self.fragment] {
            for block in stage.bindings().blocks() {
                let mut staging = vec![0u8; block.layout.size as usize];
                let mut writer =
                    BlockWriter::new(&block.layout.name, &block.layout.members, &mut staging);
                (block.update)(&draw, &mut writer).map_err(|source| {
                    ShaderGraphError::UpdateContract {
                        block: block.layout.name.clone(),
                        source,
                    }
                })?;
            }
        }
        Ok(())
    }
}

/// The compiled artifact handed to the render backend. Immutable; safe to
/// share with the render thread.
pub struct CompiledShader {
    name: String,
    backend: BackendKind,
    vertex_source: String,
    fragment_source: String,
    attributes: Vec<AttributeBinding>,
    interface: Vec<InterfaceSlot>,
    interface_slot_count: u32,
    layout: BindingLayout,
    updaters: Vec<Arc<UpdateFn>>,
    push_constant_cells: Vec<ParamCell>,
}

/// Serializable summary of a [`CompiledShader`], written next to the sources.
#[derive(Debug, Serialize)]
pub struct ShaderManifest<'a> {
    pub name: &'a str,
    pub backend: BackendKind,
    pub attributes: &'a [AttributeBinding],
    pub interface: &'a [InterfaceSlot],
    pub interface_slot_count: u32,
    pub bindings: &'a BindingLayout,
}

impl CompiledShader {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    pub fn source(&self, stage: ShaderStage) -> &str {
        if stage == ShaderStage::FRAGMENT {
            &self.fragment_source
        } else {
            &self.vertex_source
        }
    }

    pub fn attributes(&self) -> &[AttributeBinding] {
        &self.attributes
    }

    pub fn interface(&self) -> &[InterfaceSlot] {
        &self.interface
    }

    pub fn interface_slot_count(&self) -> u32 {
        self.interface_slot_count
    }

    pub fn layout(&self) -> &BindingLayout {
        &self.layout
    }

    pub fn manifest(&self) -> ShaderManifest<'_> {
        ShaderManifest {
            name: &self.name,
            backend: self.backend,
            attributes: &self.attributes,
            interface: &self.interface,
            interface_slot_count: self.interface_slot_count,
            bindings: &self.layout,
        }
    }

    /// One zeroed staging buffer per uniform block, sized to its std140 layout.
    pub fn create_staging_buffers(&self) -> Vec<Vec<u8>> {
        self.layout
            .uniform_blocks
            .iter()
            .map(|b| vec![0u8; b.size as usize])
            .collect()
    }

    /// Refresh block `index` for one draw. The buffer is zero-filled first,
    /// so members the routine skips read as zero.
    ///
    /// Panics if `index` is not a block index of this shader.
    pub fn update_block(
        &self,
        index: usize,
        draw: &DrawContext,
        staging: &mut Vec<u8>,
    ) -> std::result::Result<(), UpdateError> {
        let block = &self.layout.uniform_blocks[index];
        staging.resize(block.size as usize, 0);
        let mut writer = BlockWriter::new(&block.name, &block.members, staging);
        let result = (self.updaters[index])(draw, &mut writer);
        if result.is_err() {
            staging.fill(0);
        }
        result
    }

    /// Refresh every block before a draw. Failing blocks are logged and left
    /// zero-filled; the draw goes on. Returns the number of failed blocks.
    pub fn update_uniforms(&self, draw: &DrawContext, staging: &mut [Vec<u8>]) -> usize {
        let mut failed = 0;
        for (index, buffer) in staging.iter_mut().enumerate().take(self.updaters.len()) {
            if let Err(e) = self.update_block(index, draw, buffer) {
                log::warn!("shader `{}`: {e}; block left zero-filled", self.name);
                failed += 1;
            }
        }
        failed
    }

    /// Current push-constant values, packed at their offsets.
    pub fn encode_push_constants(&self, out: &mut Vec<u8>) {
        out.clear();
        out.resize(self.layout.push_constant_size as usize, 0);
        for (pc, cell) in self.layout.push_constants.iter().zip(&self.push_constant_cells) {
            let raw = cell.raw();
            let bytes: &[u8] = bytemuck::cast_slice(&raw);
            let start = pc.offset as usize;
            let len = pc.size as usize;
            out[start..start + len].copy_from_slice(&bytes[..len]);
        }
    }
}
