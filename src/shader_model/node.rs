//! The shader node capability interface.
//!
//! Every node type implements [`ShaderNode`]. A node goes through
//! Created -> Wired -> SetUp -> Emitted: inputs are wired by the graph author
//! after construction, `declare_dependencies` reports the edges, `setup` runs
//! once in the declare pass and `generate_code` once in the emit pass.

use super::codegen::CodeGenerator;
use super::error::Result;
use super::stage_graph::SetupContext;
use super::types::ShaderStage;
use super::value::NodeIo;

/// Identity of a node inside its stage graph. Assigned monotonically at
/// registration; used for deterministic ordering and unique value names only.
/// `graph` tells apart stage graphs of the same stage in different models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    stage: ShaderStage,
    graph: u32,
    index: u32,
}

impl NodeId {
    pub(crate) fn new(stage: ShaderStage, graph: u32, index: u32) -> Self {
        Self { stage, graph, index }
    }

    pub fn stage(self) -> ShaderStage {
        self.stage
    }

    pub(crate) fn graph(self) -> u32 {
        self.graph
    }

    pub fn index(self) -> u32 {
        self.index
    }

    /// Unique variable name for a value owned by this node.
    pub fn var_name(self, node_name: &str, field: &str) -> String {
        format!("{node_name}{}_{field}", self.index)
    }
}

/// Dependency edges reported by a node before scheduling.
#[derive(Debug, Default)]
pub struct Dependencies {
    edges: Vec<NodeId>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Depend on whichever node owns `io`. Unowned values (constants) add no edge.
    pub fn depends_on(&mut self, io: &NodeIo) -> &mut Self {
        if let Some(node) = io.node() {
            self.edges.push(node);
        }
        self
    }

    pub fn depends_on_all<'a>(&mut self, ios: impl IntoIterator<Item = &'a NodeIo>) -> &mut Self {
        for io in ios {
            self.depends_on(io);
        }
        self
    }

    /// Depend on a node directly, e.g. the provider of a sampled texture.
    pub fn depends_on_node(&mut self, node: NodeId) -> &mut Self {
        self.edges.push(node);
        self
    }

    pub fn edges(&self) -> &[NodeId] {
        &self.edges
    }
}

/// A unit of shading logic.
pub trait ShaderNode {
    fn name(&self) -> &str;

    /// Stages this node may be generated in.
    fn allowed_stages(&self) -> ShaderStage {
        ShaderStage::ALL
    }

    /// Report one edge per wired input, including implicit ones such as the
    /// texture node behind a sampling expression.
    fn declare_dependencies(&self, _deps: &mut Dependencies) {}

    /// Declare pass. Registers interface slots and resource bindings.
    fn setup(&mut self, _ctx: &mut SetupContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Emit pass. Runs after every node of the model finished `setup`.
    fn generate_code(&self, _generator: &mut CodeGenerator<'_>) -> Result<()> {
        Ok(())
    }
}
