//! Node-graph shader model: typed values, nodes, stage graphs, the stage
//! interface allocator, resource bindings, code generation and the driver.

pub mod backend;
pub mod binding;
pub mod codegen;
pub mod error;
pub mod interface;
pub mod model;
pub mod node;
pub mod nodes;
pub mod stage_graph;
pub mod types;
pub mod uniform;
pub mod validation;
pub mod value;

pub use backend::{BackendKind, ShaderBackend};
pub use binding::{BindingLayout, UniformBlock};
pub use codegen::CodeGenerator;
pub use error::{Result, ShaderGraphError, UpdateError};
pub use interface::{InterfaceVar, StageChannel};
pub use model::{CompiledShader, ShaderModel};
pub use node::{Dependencies, NodeId, ShaderNode};
pub use stage_graph::{SetupContext, StageGraph};
pub use types::{Attribute, GlslType, ShaderStage, TextureDim};
pub use uniform::{BlockWriter, ParamCell, PushConstant, Uniform};
pub use value::{NodeIo, ShaderValue};
