//! Built-in node library.

pub mod ao;
pub mod basic;
pub mod camera;
pub mod light;
pub mod texture;

pub use ao::{AoNode, AoSettings, AoSetup, AoUniformsNode, UnprojectPosNode};
pub use basic::{
    AttributeNode, ColorOutputNode, CombineXyzWNode, FullScreenQuadPositionNode, GammaNode,
    MathNode, MathOp, NormalizeNode, PositionOutputNode, PushConstantNode, SplitNode,
};
pub use camera::{CameraNode, TransformKind, VertexTransformNode};
pub use light::{LambertNode, LightCalls, MultiLightNode, ShadowedLights};
pub use texture::{Texture2dNode, Texture2dSamplerNode};
