//! Stage interface allocation: numbered channels that carry values from the
//! vertex stage to the fragment stage.
//!
//! The producing stage owns one monotonic slot counter. A producer node
//! allocates the next free slot during its setup; the consumer registers an
//! input at the same slot with its own expected contract. The driver then
//! verifies both sides agree before any text is emitted.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use super::codegen::CodeGenerator;
use super::error::{Result, ShaderGraphError};
use super::node::{Dependencies, NodeId, ShaderNode};
use super::stage_graph::{SetupContext, StageGraph};
use super::types::{GlslType, ShaderStage};
use super::value::{NodeIo, ShaderValue};

/// The contract of one interface channel: name, element type and optional
/// fixed array length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InterfaceVar {
    pub name: String,
    pub ty: GlslType,
    pub array_len: Option<u32>,
}

impl InterfaceVar {
    pub fn new(name: impl Into<String>, ty: GlslType) -> Self {
        Self {
            name: name.into(),
            ty,
            array_len: None,
        }
    }

    /// An array channel: one slot, `len` elements. The length is a build-time
    /// contract, independent of how many elements are active at draw time.
    pub fn array(name: impl Into<String>, ty: GlslType, len: u32) -> Self {
        Self {
            name: name.into(),
            ty,
            array_len: Some(len),
        }
    }

    /// Locations this channel occupies.
    pub fn location_count(&self) -> u32 {
        self.ty.location_count() * self.array_len.unwrap_or(1)
    }
}

impl fmt::Display for InterfaceVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.array_len {
            Some(len) => write!(f, "{} {}[{len}]", self.ty, self.name),
            None => write!(f, "{} {}", self.ty, self.name),
        }
    }
}

/// A channel bound to its slot in one stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InterfaceSlot {
    pub slot: u32,
    pub var: InterfaceVar,
}

impl InterfaceSlot {
    /// Integer channels cannot be interpolated.
    pub fn is_flat(&self) -> bool {
        self.var.ty.is_int()
    }
}

#[derive(Debug)]
struct ChannelState {
    var: InterfaceVar,
    slot: Cell<Option<u32>>,
}

/// The contract shared by a producer node and a consumer node in different
/// stages. The producer allocates, the consumer reads the allocated slot.
#[derive(Clone, Debug)]
pub struct StageChannel {
    state: Rc<ChannelState>,
}

impl StageChannel {
    pub fn new(var: InterfaceVar) -> Self {
        Self {
            state: Rc::new(ChannelState {
                var,
                slot: Cell::new(None),
            }),
        }
    }

    pub fn var(&self) -> &InterfaceVar {
        &self.state.var
    }

    /// Producer side: take the next free output slot of the producing stage.
    pub fn allocate(&self, ctx: &mut SetupContext<'_>) -> Result<u32> {
        if self.state.slot.get().is_some() {
            return Err(ShaderGraphError::ChannelAllocatedTwice {
                name: self.state.var.name.clone(),
            });
        }
        let slot = ctx.allocate_output(self.state.var.clone())?;
        self.state.slot.set(Some(slot));
        Ok(slot)
    }

    /// Consumer side: the slot the producer allocated.
    pub fn slot(&self) -> Result<u32> {
        self.state
            .slot
            .get()
            .ok_or_else(|| ShaderGraphError::ChannelNotAllocated {
                name: self.state.var.name.clone(),
            })
    }

    /// Consumer side: register `expected` as an input at the producer's slot.
    pub fn register_input(&self, ctx: &mut SetupContext<'_>, expected: InterfaceVar) -> Result<u32> {
        let slot = self.slot()?;
        ctx.register_input(slot, expected)?;
        Ok(slot)
    }
}

/// Check that every input of `consumer` matches an output of `producer` at the
/// same slot with identical name, type and array length.
pub fn verify_link(producer: &StageGraph, consumer: &StageGraph) -> Result<()> {
    for input in consumer.inputs() {
        let Some(output) = producer.outputs().iter().find(|o| o.slot == input.slot) else {
            return Err(ShaderGraphError::UnmatchedInterfaceInput {
                name: input.var.name.clone(),
                slot: input.slot,
            });
        };
        if output.var != input.var {
            return Err(ShaderGraphError::InterfaceMismatch {
                slot: input.slot,
                consumer: input.var.clone(),
                producer: output.var.clone(),
            });
        }
    }
    Ok(())
}

/// Vertex-side half of a plain value channel: assigns its input to the
/// interface output.
pub struct StageInterfaceProducer {
    id: NodeId,
    channel: StageChannel,
    pub input: NodeIo,
}

impl StageInterfaceProducer {
    pub fn new(id: NodeId, channel: StageChannel, input: NodeIo) -> Self {
        Self { id, channel, input }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

impl ShaderNode for StageInterfaceProducer {
    fn name(&self) -> &str {
        "stageInterfaceOut"
    }

    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::VERTEX
    }

    fn declare_dependencies(&self, deps: &mut Dependencies) {
        deps.depends_on(&self.input);
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        self.channel.allocate(ctx)?;
        Ok(())
    }

    fn generate_code(&self, generator: &mut CodeGenerator<'_>) -> Result<()> {
        let var = self.channel.var();
        match var.array_len {
            Some(len) => {
                for i in 0..len {
                    generator.append_main(format!("{}[{i}] = {}[{i}];", var.name, self.input.name()));
                }
            }
            None => {
                generator.append_main(format!("{} = {};", var.name, self.input.ref_as(var.ty)?));
            }
        }
        Ok(())
    }
}

/// Fragment-side half of a plain value channel: exposes the interface input as
/// a value handle.
pub struct StageInterfaceConsumer {
    channel: StageChannel,
    expected: InterfaceVar,
    pub output: NodeIo,
}

impl StageInterfaceConsumer {
    /// Consumer expecting exactly the producer's contract.
    pub fn new(id: NodeId, channel: StageChannel) -> Self {
        let expected = channel.var().clone();
        Self::with_contract(id, channel, expected)
    }

    /// Consumer with its own expected contract, checked against the producer
    /// when the model is compiled.
    pub fn with_contract(id: NodeId, channel: StageChannel, expected: InterfaceVar) -> Self {
        let output = NodeIo::new(
            ShaderValue::stage_input(expected.name.clone(), expected.ty, expected.array_len),
            id,
        );
        Self {
            channel,
            expected,
            output,
        }
    }
}

impl ShaderNode for StageInterfaceConsumer {
    fn name(&self) -> &str {
        "stageInterfaceIn"
    }

    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::FRAGMENT
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<()> {
        self.channel.register_input(ctx, self.expected.clone())?;
        Ok(())
    }
}
