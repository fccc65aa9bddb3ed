//! Typed shader-side values and the handles nodes use to pass them around.

use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use glam::{IVec2, Vec2, Vec3, Vec4};

use super::error::{Result, ShaderGraphError};
use super::node::NodeId;
use super::types::{GlslType, ScalarKind};

/// How a value comes to exist in generated source. Fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    /// A literal expression; never declared.
    Constant,
    /// Produced by a node's main-body statement; must be declared before first read.
    Computed,
    /// Member of a uniform block, push constant or sampler binding.
    Uniform,
    /// Vertex attribute or interface input, declared globally by the stage.
    StageInput,
}

/// Fill semantics when a read widens a vector to four components.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Semantics {
    /// Implicit w = 1.
    Point,
    /// Implicit w = 0.
    Direction,
}

/// A named, typed value in generated shader source.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderValue {
    name: String,
    kind: ValueKind,
    ty: GlslType,
    array_len: Option<u32>,
}

impl ShaderValue {
    fn new(name: impl Into<String>, kind: ValueKind, ty: GlslType, array_len: Option<u32>) -> Self {
        Self {
            name: name.into(),
            kind,
            ty,
            array_len,
        }
    }

    pub fn constant(expr: impl Into<String>, ty: GlslType) -> Self {
        Self::new(expr, ValueKind::Constant, ty, None)
    }

    pub fn const_float(v: f32) -> Self {
        Self::constant(fmt_glsl_f32(v), GlslType::Float)
    }

    pub fn const_int(v: i32) -> Self {
        Self::constant(v.to_string(), GlslType::Int)
    }

    pub fn const_vec2(v: Vec2) -> Self {
        Self::constant(
            format!("vec2({}, {})", fmt_glsl_f32(v.x), fmt_glsl_f32(v.y)),
            GlslType::Vec2F,
        )
    }

    pub fn const_vec3(v: Vec3) -> Self {
        Self::constant(
            format!(
                "vec3({}, {}, {})",
                fmt_glsl_f32(v.x),
                fmt_glsl_f32(v.y),
                fmt_glsl_f32(v.z)
            ),
            GlslType::Vec3F,
        )
    }

    pub fn const_vec4(v: Vec4) -> Self {
        Self::constant(
            format!(
                "vec4({}, {}, {}, {})",
                fmt_glsl_f32(v.x),
                fmt_glsl_f32(v.y),
                fmt_glsl_f32(v.z),
                fmt_glsl_f32(v.w)
            ),
            GlslType::Vec4F,
        )
    }

    pub fn const_ivec2(v: IVec2) -> Self {
        Self::constant(format!("ivec2({}, {})", v.x, v.y), GlslType::Vec2I)
    }

    pub fn computed(name: impl Into<String>, ty: GlslType) -> Self {
        Self::new(name, ValueKind::Computed, ty, None)
    }

    pub fn computed_array(name: impl Into<String>, ty: GlslType, len: u32) -> Self {
        Self::new(name, ValueKind::Computed, ty, Some(len))
    }

    pub fn uniform(name: impl Into<String>, ty: GlslType, array_len: Option<u32>) -> Self {
        Self::new(name, ValueKind::Uniform, ty, array_len)
    }

    pub fn stage_input(name: impl Into<String>, ty: GlslType, array_len: Option<u32>) -> Self {
        Self::new(name, ValueKind::StageInput, ty, array_len)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn ty(&self) -> GlslType {
        self.ty
    }

    pub fn array_len(&self) -> Option<u32> {
        self.array_len
    }

    /// The one-time declaration of a computed or uniform-backed value, e.g.
    /// `vec3 unproject2_position`. Computed values are declared by their
    /// producing node as the left-hand side of their first assignment.
    pub fn declare(&self) -> Result<String> {
        match self.kind {
            ValueKind::Computed | ValueKind::Uniform => Ok(match self.array_len {
                Some(len) => format!("{} {}[{len}]", self.ty.glsl(), self.name),
                None => format!("{} {}", self.ty.glsl(), self.name),
            }),
            ValueKind::Constant => Err(ShaderGraphError::ConstantDeclaration {
                value: self.name.clone(),
            }),
            ValueKind::StageInput => Err(ShaderGraphError::StageInputDeclaration {
                value: self.name.clone(),
            }),
        }
    }

    /// A read expression of this value coerced to `target`.
    ///
    /// Narrowing swizzles, widening fills with zeros and a fourth component
    /// chosen by `semantics`, scalars splat, and int/float conversions wrap
    /// the expression in a constructor.
    pub fn reference(&self, target: GlslType, semantics: Semantics) -> Result<String> {
        if self.ty == target {
            return Ok(self.name.clone());
        }
        let invalid = || ShaderGraphError::InvalidCoercion {
            value: self.name.clone(),
            from: self.ty,
            to: target,
        };
        if self.array_len.is_some() {
            return Err(invalid());
        }

        match (self.ty.scalar_kind(), target.scalar_kind()) {
            (Some(from_kind), Some(to_kind)) => {
                let from_n = self.ty.components().ok_or_else(invalid)?;
                let to_n = target.components().ok_or_else(invalid)?;
                let shaped = reshape(&self.name, from_kind, from_n, to_n, semantics);
                if from_kind == to_kind {
                    Ok(shaped)
                } else {
                    Ok(format!("{}({shaped})", target.glsl()))
                }
            }
            _ if self.ty.matrix_columns().is_some() && target.matrix_columns().is_some() => {
                Ok(format!("{}({})", target.glsl(), self.name))
            }
            _ => Err(invalid()),
        }
    }

    pub fn ref_as(&self, target: GlslType) -> Result<String> {
        self.reference(target, Semantics::Point)
    }

    pub fn ref1f(&self) -> Result<String> {
        self.ref_as(GlslType::Float)
    }

    pub fn ref2f(&self) -> Result<String> {
        self.ref_as(GlslType::Vec2F)
    }

    pub fn ref3f(&self) -> Result<String> {
        self.ref_as(GlslType::Vec3F)
    }

    /// Four-component read with point semantics (w = 1 when widened).
    pub fn ref4f(&self) -> Result<String> {
        self.ref_as(GlslType::Vec4F)
    }

    /// Four-component read with direction semantics (w = 0 when widened).
    pub fn ref4f_dir(&self) -> Result<String> {
        self.reference(GlslType::Vec4F, Semantics::Direction)
    }

    pub fn ref1i(&self) -> Result<String> {
        self.ref_as(GlslType::Int)
    }

    pub fn ref2i(&self) -> Result<String> {
        self.ref_as(GlslType::Vec2I)
    }
}

impl fmt::Display for ShaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn reshape(name: &str, kind: ScalarKind, from: usize, to: usize, semantics: Semantics) -> String {
    let (zero, one) = match kind {
        ScalarKind::Float => ("0.0", "1.0"),
        ScalarKind::Int => ("0", "1"),
    };
    let w = match semantics {
        Semantics::Point => one,
        Semantics::Direction => zero,
    };
    let ty_of = |n: usize| GlslType::vector(kind, n).map(GlslType::glsl).unwrap_or("float");

    if from == to {
        name.to_string()
    } else if from > to {
        format!("{name}.{}", &"xyzw"[..to])
    } else if from == 1 && to < 4 {
        format!("{}({name})", ty_of(to))
    } else if from == 1 {
        format!("{}({}({name}), {w})", ty_of(4), ty_of(3))
    } else {
        let fill: Vec<&str> = (from..to).map(|i| if i == 3 { w } else { zero }).collect();
        format!("{}({name}, {})", ty_of(to), fill.join(", "))
    }
}

/// Format a float as a GLSL literal. Always keeps a decimal point so the
/// literal stays a float under GLSL ES rules.
pub fn fmt_glsl_f32(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let s = v.to_string();
    if s.contains('.') { s } else { format!("{s}.0") }
}

/// A value handle as seen by the graph: the value plus the node that owns it.
///
/// Handles are cheap to clone and many nodes may read the same handle; reading
/// never transfers ownership. Clones share one declaration flag: a computed
/// value owned by a node can only be read once its owner emitted the
/// declaration, so a read through an undeclared dependency fails the compile
/// instead of producing source that reads before it declares.
#[derive(Clone, Debug)]
pub struct NodeIo {
    value: ShaderValue,
    node: Option<NodeId>,
    declared: Rc<Cell<bool>>,
}

impl NodeIo {
    pub fn new(value: ShaderValue, node: NodeId) -> Self {
        Self {
            value,
            node: Some(node),
            declared: Rc::new(Cell::new(false)),
        }
    }

    /// A handle without owner, e.g. a constant default for an unwired input.
    pub fn unowned(value: ShaderValue) -> Self {
        Self {
            value,
            node: None,
            declared: Rc::new(Cell::new(false)),
        }
    }

    pub fn node(&self) -> Option<NodeId> {
        self.node
    }

    pub fn value(&self) -> &ShaderValue {
        &self.value
    }

    /// Declaration statement of the value; marks it readable for every clone
    /// of this handle.
    pub fn declare(&self) -> Result<String> {
        let declaration = self.value.declare()?;
        self.declared.set(true);
        Ok(declaration)
    }

    fn check_readable(&self) -> Result<()> {
        let owned_computed = self.node.is_some() && self.value.kind() == ValueKind::Computed;
        if owned_computed && !self.declared.get() {
            return Err(ShaderGraphError::ReadBeforeDeclaration {
                value: self.value.name().to_string(),
            });
        }
        Ok(())
    }

    pub fn reference(&self, target: GlslType, semantics: Semantics) -> Result<String> {
        self.check_readable()?;
        self.value.reference(target, semantics)
    }

    pub fn ref_as(&self, target: GlslType) -> Result<String> {
        self.reference(target, Semantics::Point)
    }

    pub fn ref1f(&self) -> Result<String> {
        self.ref_as(GlslType::Float)
    }

    pub fn ref2f(&self) -> Result<String> {
        self.ref_as(GlslType::Vec2F)
    }

    pub fn ref3f(&self) -> Result<String> {
        self.ref_as(GlslType::Vec3F)
    }

    pub fn ref4f(&self) -> Result<String> {
        self.ref_as(GlslType::Vec4F)
    }

    pub fn ref4f_dir(&self) -> Result<String> {
        self.reference(GlslType::Vec4F, Semantics::Direction)
    }

    pub fn ref1i(&self) -> Result<String> {
        self.ref_as(GlslType::Int)
    }

    pub fn ref2i(&self) -> Result<String> {
        self.ref_as(GlslType::Vec2I)
    }
}

impl PartialEq for NodeIo {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.node == other.node
    }
}

impl Deref for NodeIo {
    type Target = ShaderValue;

    fn deref(&self) -> &ShaderValue {
        &self.value
    }
}

impl From<ShaderValue> for NodeIo {
    fn from(value: ShaderValue) -> Self {
        Self::unowned(value)
    }
}

impl fmt::Display for NodeIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value.name())
    }
}
