//! Core type definitions shared by the shader model: GLSL types, stage masks
//! and vertex attributes.

use std::borrow::Cow;
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// GLSL value type of a shader-side value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GlslType {
    Float,
    Vec2F,
    Vec3F,
    Vec4F,
    Int,
    Vec2I,
    Vec3I,
    Vec4I,
    Mat2F,
    Mat3F,
    Mat4F,
    Sampler2d,
    Sampler3d,
    SamplerCube,
}

/// Scalar component kind of a vector / scalar type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    Float,
    Int,
}

impl GlslType {
    /// Returns the GLSL type name for this value type.
    pub fn glsl(self) -> &'static str {
        match self {
            GlslType::Float => "float",
            GlslType::Vec2F => "vec2",
            GlslType::Vec3F => "vec3",
            GlslType::Vec4F => "vec4",
            GlslType::Int => "int",
            GlslType::Vec2I => "ivec2",
            GlslType::Vec3I => "ivec3",
            GlslType::Vec4I => "ivec4",
            GlslType::Mat2F => "mat2",
            GlslType::Mat3F => "mat3",
            GlslType::Mat4F => "mat4",
            GlslType::Sampler2d => "sampler2D",
            GlslType::Sampler3d => "sampler3D",
            GlslType::SamplerCube => "samplerCube",
        }
    }

    /// Vector or scalar type with `n` components of the given kind.
    pub fn vector(kind: ScalarKind, n: usize) -> Option<GlslType> {
        match (kind, n) {
            (ScalarKind::Float, 1) => Some(GlslType::Float),
            (ScalarKind::Float, 2) => Some(GlslType::Vec2F),
            (ScalarKind::Float, 3) => Some(GlslType::Vec3F),
            (ScalarKind::Float, 4) => Some(GlslType::Vec4F),
            (ScalarKind::Int, 1) => Some(GlslType::Int),
            (ScalarKind::Int, 2) => Some(GlslType::Vec2I),
            (ScalarKind::Int, 3) => Some(GlslType::Vec3I),
            (ScalarKind::Int, 4) => Some(GlslType::Vec4I),
            _ => None,
        }
    }

    /// Component count for scalars and vectors, `None` for matrices and samplers.
    pub fn components(self) -> Option<usize> {
        match self {
            GlslType::Float | GlslType::Int => Some(1),
            GlslType::Vec2F | GlslType::Vec2I => Some(2),
            GlslType::Vec3F | GlslType::Vec3I => Some(3),
            GlslType::Vec4F | GlslType::Vec4I => Some(4),
            _ => None,
        }
    }

    pub fn scalar_kind(self) -> Option<ScalarKind> {
        match self {
            GlslType::Float | GlslType::Vec2F | GlslType::Vec3F | GlslType::Vec4F => {
                Some(ScalarKind::Float)
            }
            GlslType::Int | GlslType::Vec2I | GlslType::Vec3I | GlslType::Vec4I => {
                Some(ScalarKind::Int)
            }
            _ => None,
        }
    }

    pub fn is_int(self) -> bool {
        self.scalar_kind() == Some(ScalarKind::Int)
    }

    /// Column count of square float matrices.
    pub fn matrix_columns(self) -> Option<usize> {
        match self {
            GlslType::Mat2F => Some(2),
            GlslType::Mat3F => Some(3),
            GlslType::Mat4F => Some(4),
            _ => None,
        }
    }

    pub fn is_sampler(self) -> bool {
        matches!(
            self,
            GlslType::Sampler2d | GlslType::Sampler3d | GlslType::SamplerCube
        )
    }

    /// Number of vertex-input / interface locations consumed by one value of this type.
    pub fn location_count(self) -> u32 {
        self.matrix_columns().unwrap_or(1) as u32
    }

    /// Tightly packed byte size (vertex attribute size).
    pub fn byte_size(self) -> u32 {
        match (self.components(), self.matrix_columns()) {
            (Some(n), _) => 4 * n as u32,
            (None, Some(c)) => 4 * (c * c) as u32,
            _ => 0,
        }
    }

    /// (alignment, size) of a single non-array member under std140 rules.
    pub fn std140_align_size(self) -> (u32, u32) {
        match self {
            GlslType::Float | GlslType::Int => (4, 4),
            GlslType::Vec2F | GlslType::Vec2I => (8, 8),
            GlslType::Vec3F | GlslType::Vec3I => (16, 12),
            GlslType::Vec4F | GlslType::Vec4I => (16, 16),
            GlslType::Mat2F => (16, 32),
            GlslType::Mat3F => (16, 48),
            GlslType::Mat4F => (16, 64),
            GlslType::Sampler2d | GlslType::Sampler3d | GlslType::SamplerCube => (0, 0),
        }
    }
}

impl fmt::Display for GlslType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.glsl())
    }
}

bitflags! {
    /// Stage mask. A node's allowed stages must intersect the stage it is
    /// generated in.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ShaderStage: u32 {
        const VERTEX = 1;
        const FRAGMENT = 1 << 1;
        const ALL = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

impl ShaderStage {
    pub fn label(self) -> &'static str {
        if self == ShaderStage::VERTEX {
            "vertex"
        } else if self == ShaderStage::FRAGMENT {
            "fragment"
        } else if self == ShaderStage::ALL {
            "all"
        } else {
            "none"
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A per-vertex mesh attribute consumed by the vertex stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Attribute {
    pub name: Cow<'static, str>,
    pub ty: GlslType,
}

impl Attribute {
    pub const POSITIONS: Attribute = Attribute::predefined("attrib_positions", GlslType::Vec3F);
    pub const NORMALS: Attribute = Attribute::predefined("attrib_normals", GlslType::Vec3F);
    pub const TANGENTS: Attribute = Attribute::predefined("attrib_tangents", GlslType::Vec4F);
    pub const TEXTURE_COORDS: Attribute =
        Attribute::predefined("attrib_texture_coords", GlslType::Vec2F);
    pub const COLORS: Attribute = Attribute::predefined("attrib_colors", GlslType::Vec4F);
    pub const JOINTS: Attribute = Attribute::predefined("attrib_joints", GlslType::Vec4I);
    pub const WEIGHTS: Attribute = Attribute::predefined("attrib_weights", GlslType::Vec4F);
    pub const EMISSIVE_COLOR: Attribute =
        Attribute::predefined("attrib_emissive_color", GlslType::Vec3F);
    pub const METAL_ROUGH: Attribute = Attribute::predefined("attrib_metal_rough", GlslType::Vec2F);

    const fn predefined(name: &'static str, ty: GlslType) -> Self {
        Self {
            name: Cow::Borrowed(name),
            ty,
        }
    }

    pub fn custom(name: impl Into<String>, ty: GlslType) -> Self {
        Self {
            name: Cow::Owned(name.into()),
            ty,
        }
    }
}

/// Dimensionality of a sampled texture binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextureDim {
    Tex2d,
    Tex3d,
    Cube,
}

impl TextureDim {
    pub fn sampler_type(self) -> GlslType {
        match self {
            TextureDim::Tex2d => GlslType::Sampler2d,
            TextureDim::Tex3d => GlslType::Sampler3d,
            TextureDim::Cube => GlslType::SamplerCube,
        }
    }

    /// Separate image type used where textures and samplers are split.
    pub fn texture_type(self) -> &'static str {
        match self {
            TextureDim::Tex2d => "texture2D",
            TextureDim::Tex3d => "texture3D",
            TextureDim::Cube => "textureCube",
        }
    }
}
