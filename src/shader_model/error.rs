//! Error types of the shader model.
//!
//! `ShaderGraphError` covers everything detected while building and compiling
//! a model (declare pass and earlier). `UpdateError` covers per-draw uniform
//! writes and is never fatal for a frame.

use thiserror::Error;

use super::interface::InterfaceVar;
use super::types::{GlslType, ShaderStage};

pub type Result<T, E = ShaderGraphError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ShaderGraphError {
    #[error("node `{node}` is not allowed in the {stage} stage")]
    StageNotAllowed { node: String, stage: ShaderStage },

    #[error(
        "node `{node}` ({stage} stage) depends on node #{dependency}, which is not registered \
         in this stage graph"
    )]
    MissingDependency {
        node: String,
        stage: ShaderStage,
        dependency: u32,
    },

    #[error(
        "node `{node}` ({stage} stage) reads a value produced in the {dependency_stage} stage; \
         values cross stages only through a stage interface"
    )]
    CrossStageDependency {
        node: String,
        stage: ShaderStage,
        dependency_stage: ShaderStage,
    },

    #[error("dependency cycle in the {stage} stage involving node `{node}`")]
    DependencyCycle { node: String, stage: ShaderStage },

    #[error(
        "interface slot {slot} registered twice in the {stage} stage with differing contracts: \
         `{existing}` vs `{requested}`"
    )]
    DuplicateInterfaceSlot {
        stage: ShaderStage,
        slot: u32,
        existing: InterfaceVar,
        requested: InterfaceVar,
    },

    #[error("interface name `{name}` is declared twice in the {stage} stage")]
    DuplicateInterfaceName { stage: ShaderStage, name: String },

    #[error("interface slot {slot}: consumer expects `{consumer}` but producer declares `{producer}`")]
    InterfaceMismatch {
        slot: u32,
        consumer: InterfaceVar,
        producer: InterfaceVar,
    },

    #[error("interface input `{name}` at slot {slot} has no producer")]
    UnmatchedInterfaceInput { name: String, slot: u32 },

    #[error("stage interface `{name}` was consumed before the producing stage allocated its slot")]
    ChannelNotAllocated { name: String },

    #[error("stage interface `{name}` was allocated twice")]
    ChannelAllocatedTwice { name: String },

    #[error("cannot read `{value}` ({from}) as {to}")]
    InvalidCoercion {
        value: String,
        from: GlslType,
        to: GlslType,
    },

    #[error(
        "`{value}` is read before its producing node declared it; the reader is missing a \
         dependency on that node"
    )]
    ReadBeforeDeclaration { value: String },

    #[error("constant value `{value}` has no declaration statement")]
    ConstantDeclaration { value: String },

    #[error("stage input `{value}` is declared globally and has no declaration statement")]
    StageInputDeclaration { value: String },

    #[error("uniform block `{block}` declares member `{member}` twice")]
    DuplicateBlockMember { block: String, member: String },

    #[error("uniform block `{block}` has no update routine")]
    MissingUpdateRoutine { block: String },

    #[error("binding `{name}` is registered twice in the {stage} stage")]
    DuplicateBinding { name: String, stage: ShaderStage },

    #[error("push constant `{name}` has unsupported type {ty}")]
    UnsupportedPushConstant { name: String, ty: GlslType },

    #[error("invalid swizzle `{channels}`")]
    InvalidSwizzle { channels: String },

    #[error("input `{input}` is not connected")]
    UnconnectedInput { input: String },

    #[error("update routine of uniform block `{block}` violates its layout")]
    UpdateContract {
        block: String,
        #[source]
        source: UpdateError,
    },

    #[error("{stage} stage graph is {found}, expected {expected}")]
    InvalidPhase {
        stage: ShaderStage,
        found: &'static str,
        expected: &'static str,
    },

    #[error("{stage} stage, node `{node}`")]
    Node {
        node: String,
        stage: ShaderStage,
        #[source]
        source: Box<ShaderGraphError>,
    },
}

impl ShaderGraphError {
    /// Attach node / stage identity to an error raised from inside a node.
    pub(crate) fn in_node(self, node: &str, stage: ShaderStage) -> Self {
        match self {
            e @ (ShaderGraphError::StageNotAllowed { .. } | ShaderGraphError::Node { .. }) => e,
            other => ShaderGraphError::Node {
                node: node.to_string(),
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, skipping node context wrappers.
    pub fn root(&self) -> &ShaderGraphError {
        match self {
            ShaderGraphError::Node { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Contract violations of a per-draw update routine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error("block `{block}` has no member `{member}`")]
    UnknownMember { block: String, member: String },

    #[error("block `{block}`: member `{member}` written after `{previous}`, out of declaration order")]
    OutOfOrder {
        block: String,
        member: String,
        previous: String,
    },

    #[error("block `{block}`: member `{member}` is {expected}, write supplied {found}")]
    TypeMismatch {
        block: String,
        member: String,
        expected: GlslType,
        found: GlslType,
    },

    #[error("block `{block}`: index {index} out of range for `{member}` (length {len})")]
    IndexOutOfRange {
        block: String,
        member: String,
        index: u32,
        len: u32,
    },
}
