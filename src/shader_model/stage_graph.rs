//! Stage graph: the node arena of one program stage, its scheduler and the
//! interface / binding state its nodes register during the declare pass.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::Serialize;

use super::backend::ShaderBackend;
use super::binding::{BindingCounters, BindingSet, UniformBlock};
use super::codegen::{CodeGenerator, StageSections, assemble_stage};
use super::error::{Result, ShaderGraphError};
use super::interface::{InterfaceSlot, InterfaceVar};
use super::node::{Dependencies, NodeId, ShaderNode};
use super::types::{Attribute, GlslType, ShaderStage, TextureDim};
use super::uniform::PushConstant;
use crate::graph::dependency_order;

/// A vertex attribute bound to its input location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttributeBinding {
    pub name: String,
    pub ty: GlslType,
    pub location: u32,
}

/// A fragment color output bound to its location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ColorOutput {
    pub name: String,
    pub location: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Building,
    SetUp,
    Emitted,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Building => "building",
            Phase::SetUp => "set up",
            Phase::Emitted => "emitted",
        }
    }
}

/// Interface and binding state registered by the nodes of one stage.
pub(crate) struct StageResources {
    stage: ShaderStage,
    outputs: Vec<InterfaceSlot>,
    inputs: Vec<InterfaceSlot>,
    next_slot: u32,
    attributes: Vec<AttributeBinding>,
    next_attribute_location: u32,
    color_outputs: Vec<ColorOutput>,
    bindings: BindingSet,
}

impl StageResources {
    fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            outputs: Vec::new(),
            inputs: Vec::new(),
            next_slot: 0,
            attributes: Vec::new(),
            next_attribute_location: 0,
            color_outputs: Vec::new(),
            bindings: BindingSet::default(),
        }
    }

    fn name_taken(&self, name: &str) -> bool {
        self.outputs.iter().chain(&self.inputs).any(|s| s.var.name == name)
    }
}

/// Handed to [`ShaderNode::setup`]. Everything a node may register during the
/// declare pass goes through here.
pub struct SetupContext<'a> {
    resources: &'a mut StageResources,
    counters: &'a mut BindingCounters,
}

impl SetupContext<'_> {
    pub fn stage(&self) -> ShaderStage {
        self.resources.stage
    }

    /// Allocate the next free interface output slot. Slots advance by the
    /// number of locations the variable occupies, so they are never reused.
    pub fn allocate_output(&mut self, var: InterfaceVar) -> Result<u32> {
        let res = &mut *self.resources;
        if res.name_taken(&var.name) {
            return Err(ShaderGraphError::DuplicateInterfaceName {
                stage: res.stage,
                name: var.name,
            });
        }
        let slot = res.next_slot;
        res.next_slot += var.location_count();
        log::debug!("{}: interface output `{var}` at slot {slot}", res.stage);
        res.outputs.push(InterfaceSlot { slot, var });
        Ok(slot)
    }

    /// Register an interface input at a slot allocated by the producing stage.
    /// Registering the same contract again is a no-op; a differing contract at
    /// a taken slot is an error.
    pub fn register_input(&mut self, slot: u32, var: InterfaceVar) -> Result<()> {
        let res = &mut *self.resources;
        if let Some(existing) = res.inputs.iter().find(|s| s.slot == slot) {
            if existing.var == var {
                return Ok(());
            }
            return Err(ShaderGraphError::DuplicateInterfaceSlot {
                stage: res.stage,
                slot,
                existing: existing.var.clone(),
                requested: var,
            });
        }
        if res.name_taken(&var.name) {
            return Err(ShaderGraphError::DuplicateInterfaceName {
                stage: res.stage,
                name: var.name,
            });
        }
        log::debug!("{}: interface input `{var}` at slot {slot}", res.stage);
        res.inputs.push(InterfaceSlot { slot, var });
        Ok(())
    }

    /// Bind a vertex attribute, reusing the location if it is already bound.
    pub fn add_attribute(&mut self, attribute: &Attribute) -> Result<u32> {
        let res = &mut *self.resources;
        if let Some(existing) = res.attributes.iter().find(|a| a.name == attribute.name) {
            if existing.ty != attribute.ty {
                return Err(ShaderGraphError::DuplicateInterfaceName {
                    stage: res.stage,
                    name: existing.name.clone(),
                });
            }
            return Ok(existing.location);
        }
        let location = res.next_attribute_location;
        res.next_attribute_location += attribute.ty.location_count();
        res.attributes.push(AttributeBinding {
            name: attribute.name.to_string(),
            ty: attribute.ty,
            location,
        });
        Ok(location)
    }

    pub fn add_color_output(&mut self, name: &str) -> Result<u32> {
        let res = &mut *self.resources;
        if res.color_outputs.iter().any(|c| c.name == name) {
            return Err(ShaderGraphError::DuplicateInterfaceName {
                stage: res.stage,
                name: name.to_string(),
            });
        }
        let location = res.color_outputs.len() as u32;
        res.color_outputs.push(ColorOutput {
            name: name.to_string(),
            location,
        });
        Ok(location)
    }

    pub fn add_uniform_block(&mut self, block: UniformBlock) -> Result<u32> {
        let stage = self.resources.stage;
        self.resources.bindings.add_block(block, stage, self.counters)
    }

    pub fn add_push_constant(&mut self, push_constant: &PushConstant) -> Result<u32> {
        let stage = self.resources.stage;
        self.resources
            .bindings
            .add_push_constant(push_constant, stage, self.counters)
    }

    pub fn add_sampler(&mut self, name: &str, dim: TextureDim, array_len: Option<u32>) -> Result<u32> {
        let stage = self.resources.stage;
        self.resources
            .bindings
            .add_sampler(name, dim, array_len, stage, self.counters)
    }
}

static NEXT_GRAPH: AtomicU32 = AtomicU32::new(0);

/// All nodes of one program stage.
pub struct StageGraph {
    stage: ShaderStage,
    graph: u32,
    nodes: Vec<Rc<RefCell<dyn ShaderNode>>>,
    order: Vec<usize>,
    phase: Phase,
    resources: StageResources,
}

impl StageGraph {
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            stage,
            graph: NEXT_GRAPH.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            order: Vec::new(),
            phase: Phase::Building,
            resources: StageResources::new(stage),
        }
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Register a node. `make` receives the node's identity so the node can
    /// tag its output handles; the returned handle is used to wire inputs
    /// afterwards.
    pub fn add_node<N, F>(&mut self, make: F) -> Rc<RefCell<N>>
    where
        N: ShaderNode + 'static,
        F: FnOnce(NodeId) -> N,
    {
        let id = NodeId::new(self.stage, self.graph, self.nodes.len() as u32);
        let node = Rc::new(RefCell::new(make(id)));
        let erased: Rc<RefCell<dyn ShaderNode>> = node.clone();
        self.nodes.push(erased);
        node
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn outputs(&self) -> &[InterfaceSlot] {
        &self.resources.outputs
    }

    pub fn inputs(&self) -> &[InterfaceSlot] {
        &self.resources.inputs
    }

    pub fn attributes(&self) -> &[AttributeBinding] {
        &self.resources.attributes
    }

    pub fn color_outputs(&self) -> &[ColorOutput] {
        &self.resources.color_outputs
    }

    /// Value of the output slot counter: the number of interface locations
    /// this stage produces.
    pub fn interface_slot_count(&self) -> u32 {
        self.resources.next_slot
    }

    pub(crate) fn bindings(&self) -> &BindingSet {
        &self.resources.bindings
    }

    fn node_name(&self, index: usize) -> String {
        self.nodes[index].borrow().name().to_string()
    }

    fn expect_phase(&self, expected: Phase) -> Result<()> {
        if self.phase != expected {
            return Err(ShaderGraphError::InvalidPhase {
                stage: self.stage,
                found: self.phase.label(),
                expected: expected.label(),
            });
        }
        Ok(())
    }

    /// Node indices in generation order: dependencies first, ties broken by
    /// registration order.
    pub fn schedule(&self) -> Result<Vec<usize>> {
        let mut edges = Vec::with_capacity(self.nodes.len());
        for (index, node) in self.nodes.iter().enumerate() {
            let node = node.borrow();
            let mut deps = Dependencies::new();
            node.declare_dependencies(&mut deps);

            let mut targets = Vec::with_capacity(deps.edges().len());
            for dep in deps.edges() {
                if dep.stage() != self.stage {
                    return Err(ShaderGraphError::CrossStageDependency {
                        node: node.name().to_string(),
                        stage: self.stage,
                        dependency_stage: dep.stage(),
                    });
                }
                let target = dep.index() as usize;
                if dep.graph() != self.graph || target >= self.nodes.len() || target == index {
                    return Err(ShaderGraphError::MissingDependency {
                        node: node.name().to_string(),
                        stage: self.stage,
                        dependency: dep.index(),
                    });
                }
                targets.push(target);
            }
            edges.push(targets);
        }

        dependency_order(&edges).map_err(|cycle| ShaderGraphError::DependencyCycle {
            node: self.node_name(cycle.node),
            stage: self.stage,
        })
    }

    /// Declare pass: check stage masks, schedule, then run every node's setup
    /// in generation order.
    pub(crate) fn run_setup(&mut self, counters: &mut BindingCounters) -> Result<()> {
        self.expect_phase(Phase::Building)?;

        for node in &self.nodes {
            let node = node.borrow();
            if !node.allowed_stages().intersects(self.stage) {
                return Err(ShaderGraphError::StageNotAllowed {
                    node: node.name().to_string(),
                    stage: self.stage,
                });
            }
        }

        self.order = self.schedule()?;
        log::debug!("{}: generation order {:?}", self.stage, self.order);

        let mut ctx = SetupContext {
            resources: &mut self.resources,
            counters,
        };
        for &index in &self.order {
            let mut node = self.nodes[index].borrow_mut();
            let stage = ctx.stage();
            node.setup(&mut ctx).map_err(|e| e.in_node(node.name(), stage))?;
        }
        self.phase = Phase::SetUp;
        Ok(())
    }

    /// Emit pass: run every node's code generation in the order the declare
    /// pass established, then assemble the stage source.
    pub(crate) fn run_emit(&mut self, backend: &dyn ShaderBackend) -> Result<String> {
        self.expect_phase(Phase::SetUp)?;

        let mut generator = CodeGenerator::new(backend, self.stage);
        for &index in &self.order {
            let node = self.nodes[index].borrow();
            node.generate_code(&mut generator)
                .map_err(|e| e.in_node(node.name(), self.stage))?;
        }
        self.phase = Phase::Emitted;

        let (functions, main) = generator.into_sections();
        let res = &self.resources;
        Ok(assemble_stage(
            backend,
            StageSections {
                stage: self.stage,
                attributes: &res.attributes,
                inputs: &res.inputs,
                outputs: &res.outputs,
                color_outputs: &res.color_outputs,
                bindings: &res.bindings,
                functions: &functions,
                main: &main,
            },
        ))
    }
}

impl fmt::Debug for StageGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageGraph")
            .field("stage", &self.stage)
            .field("nodes", &self.nodes.len())
            .field("phase", &self.phase)
            .finish()
    }
}
