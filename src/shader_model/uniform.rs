//! Uniform declarations, CPU-side staging layout and the per-draw block writer.
//!
//! Member order is the contract here: the order members are registered in a
//! block is the order they are declared in GLSL, the order their std140
//! offsets are assigned, and the only order an update routine may write them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{IVec2, Mat3, Mat4, Vec2, Vec3, Vec4};
use serde::Serialize;

use super::error::UpdateError;
use super::types::GlslType;
use super::value::ShaderValue;

/// Declaration of a GPU-visible uniform value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uniform {
    name: String,
    ty: GlslType,
    array_len: Option<u32>,
}

impl Uniform {
    pub fn new(name: impl Into<String>, ty: GlslType, array_len: Option<u32>) -> Self {
        Self {
            name: name.into(),
            ty,
            array_len,
        }
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, GlslType::Float, None)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, GlslType::Int, None)
    }

    pub fn vec2(name: impl Into<String>) -> Self {
        Self::new(name, GlslType::Vec2F, None)
    }

    pub fn vec4(name: impl Into<String>) -> Self {
        Self::new(name, GlslType::Vec4F, None)
    }

    pub fn ivec2(name: impl Into<String>) -> Self {
        Self::new(name, GlslType::Vec2I, None)
    }

    pub fn mat3(name: impl Into<String>) -> Self {
        Self::new(name, GlslType::Mat3F, None)
    }

    pub fn mat4(name: impl Into<String>) -> Self {
        Self::new(name, GlslType::Mat4F, None)
    }

    pub fn vec3_array(name: impl Into<String>, len: u32) -> Self {
        Self::new(name, GlslType::Vec3F, Some(len))
    }

    pub fn vec4_array(name: impl Into<String>, len: u32) -> Self {
        Self::new(name, GlslType::Vec4F, Some(len))
    }

    pub fn mat4_array(name: impl Into<String>, len: u32) -> Self {
        Self::new(name, GlslType::Mat4F, Some(len))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> GlslType {
        self.ty
    }

    pub fn array_len(&self) -> Option<u32> {
        self.array_len
    }

    /// The uniform-backed value handle reading this uniform.
    pub fn value(&self) -> ShaderValue {
        ShaderValue::uniform(self.name.clone(), self.ty, self.array_len)
    }
}

impl fmt::Display for Uniform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// std140 placement of one block member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemberLayout {
    pub name: String,
    pub ty: GlslType,
    pub array_len: Option<u32>,
    pub offset: u32,
    /// Byte distance between array elements; the element size for non-arrays.
    pub stride: u32,
    pub size: u32,
}

fn round_up(v: u32, align: u32) -> u32 {
    if align == 0 { v } else { v.div_ceil(align) * align }
}

/// Lay members out under std140 rules, in the given order. Returns the member
/// layouts and the block size (rounded up to 16 bytes).
pub fn std140_layout(members: &[Uniform]) -> (Vec<MemberLayout>, u32) {
    let mut offset = 0u32;
    let mut out = Vec::with_capacity(members.len());
    for m in members {
        let (align, size) = m.ty.std140_align_size();
        let (align, stride, size) = match m.array_len {
            Some(len) => {
                let stride = round_up(size, 16);
                (16, stride, stride * len)
            }
            None => (align, size, size),
        };
        offset = round_up(offset, align);
        out.push(MemberLayout {
            name: m.name.clone(),
            ty: m.ty,
            array_len: m.array_len,
            offset,
            stride,
            size,
        });
        offset += size;
    }
    (out, round_up(offset, 16))
}

/// Lock-free shared storage for up to four 32-bit components. Used for push
/// constant values and for tunables read by update routines, so per-draw reads
/// never block or allocate.
#[derive(Clone, Debug, Default)]
pub struct ParamCell {
    bits: Arc<[AtomicU32; 4]>,
}

impl ParamCell {
    pub fn with_f32(v: f32) -> Self {
        let cell = Self::default();
        cell.set_f32(v);
        cell
    }

    pub fn with_i32(v: i32) -> Self {
        let cell = Self::default();
        cell.set_i32(v);
        cell
    }

    pub fn set_f32(&self, v: f32) {
        self.bits[0].store(v.to_bits(), Ordering::Relaxed);
    }

    pub fn f32(&self) -> f32 {
        f32::from_bits(self.bits[0].load(Ordering::Relaxed))
    }

    pub fn set_i32(&self, v: i32) {
        self.bits[0].store(v as u32, Ordering::Relaxed);
    }

    pub fn i32(&self) -> i32 {
        self.bits[0].load(Ordering::Relaxed) as i32
    }

    pub fn set_vec2(&self, v: Vec2) {
        self.bits[0].store(v.x.to_bits(), Ordering::Relaxed);
        self.bits[1].store(v.y.to_bits(), Ordering::Relaxed);
    }

    pub fn vec2(&self) -> Vec2 {
        Vec2::new(
            f32::from_bits(self.bits[0].load(Ordering::Relaxed)),
            f32::from_bits(self.bits[1].load(Ordering::Relaxed)),
        )
    }

    pub fn set_ivec2(&self, v: IVec2) {
        self.bits[0].store(v.x as u32, Ordering::Relaxed);
        self.bits[1].store(v.y as u32, Ordering::Relaxed);
    }

    pub fn ivec2(&self) -> IVec2 {
        IVec2::new(
            self.bits[0].load(Ordering::Relaxed) as i32,
            self.bits[1].load(Ordering::Relaxed) as i32,
        )
    }

    pub fn set_vec4(&self, v: Vec4) {
        for (slot, c) in self.bits.iter().zip(v.to_array()) {
            slot.store(c.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn raw(&self) -> [u32; 4] {
        [
            self.bits[0].load(Ordering::Relaxed),
            self.bits[1].load(Ordering::Relaxed),
            self.bits[2].load(Ordering::Relaxed),
            self.bits[3].load(Ordering::Relaxed),
        ]
    }
}

/// A small per-draw tunable, cheaper to update than a uniform block member.
#[derive(Clone, Debug)]
pub struct PushConstant {
    uniform: Uniform,
    cell: ParamCell,
}

impl PushConstant {
    /// A zero-initialised push constant of any declared type. Only scalars and
    /// vectors are accepted when registered.
    pub fn new(uniform: Uniform) -> Self {
        Self {
            uniform,
            cell: ParamCell::default(),
        }
    }

    pub fn float(name: impl Into<String>, initial: f32) -> Self {
        Self {
            uniform: Uniform::float(name),
            cell: ParamCell::with_f32(initial),
        }
    }

    pub fn int(name: impl Into<String>, initial: i32) -> Self {
        Self {
            uniform: Uniform::int(name),
            cell: ParamCell::with_i32(initial),
        }
    }

    pub fn vec2(name: impl Into<String>, initial: Vec2) -> Self {
        let cell = ParamCell::default();
        cell.set_vec2(initial);
        Self {
            uniform: Uniform::vec2(name),
            cell,
        }
    }

    pub fn uniform(&self) -> &Uniform {
        &self.uniform
    }

    pub fn cell(&self) -> &ParamCell {
        &self.cell
    }

    pub fn set_f32(&self, v: f32) {
        self.cell.set_f32(v);
    }

    pub fn set_i32(&self, v: i32) {
        self.cell.set_i32(v);
    }

    /// (alignment, size) under std430 rules; `None` for unsupported types.
    pub(crate) fn std430_align_size(ty: GlslType) -> Option<(u32, u32)> {
        match ty {
            GlslType::Float | GlslType::Int => Some((4, 4)),
            GlslType::Vec2F | GlslType::Vec2I => Some((8, 8)),
            GlslType::Vec3F | GlslType::Vec3I => Some((16, 12)),
            GlslType::Vec4F | GlslType::Vec4I => Some((16, 16)),
            _ => None,
        }
    }

    pub(crate) fn round_offset(offset: u32, align: u32) -> u32 {
        round_up(offset, align)
    }
}

/// Writes one block's values into its staging buffer during a draw update.
///
/// Members must be written in declaration order. Writing the same member
/// repeatedly (array elements) is fine, going back to an earlier one is not.
/// Members that are never written keep the zero fill.
pub struct BlockWriter<'a> {
    block: &'a str,
    members: &'a [MemberLayout],
    data: &'a mut [u8],
    cursor: usize,
}

impl<'a> BlockWriter<'a> {
    pub(crate) fn new(block: &'a str, members: &'a [MemberLayout], data: &'a mut [u8]) -> Self {
        data.fill(0);
        Self {
            block,
            members,
            data,
            cursor: 0,
        }
    }

    fn locate(
        &mut self,
        uniform: &Uniform,
        supplied: GlslType,
        index: Option<u32>,
    ) -> Result<usize, UpdateError> {
        let Some(member_index) = self.members.iter().position(|m| m.name == uniform.name) else {
            return Err(UpdateError::UnknownMember {
                block: self.block.to_string(),
                member: uniform.name.clone(),
            });
        };
        let member = &self.members[member_index];
        if member.ty != supplied {
            return Err(UpdateError::TypeMismatch {
                block: self.block.to_string(),
                member: member.name.clone(),
                expected: member.ty,
                found: supplied,
            });
        }
        if member_index < self.cursor {
            return Err(UpdateError::OutOfOrder {
                block: self.block.to_string(),
                member: member.name.clone(),
                previous: self.members[self.cursor].name.clone(),
            });
        }

        let element = match (index, member.array_len) {
            (None, _) => 0,
            (Some(i), Some(len)) if i < len => i,
            (Some(i), len) => {
                return Err(UpdateError::IndexOutOfRange {
                    block: self.block.to_string(),
                    member: member.name.clone(),
                    index: i,
                    len: len.unwrap_or(1),
                });
            }
        };
        self.cursor = member_index;
        Ok((member.offset + element * member.stride) as usize)
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn write(
        &mut self,
        uniform: &Uniform,
        ty: GlslType,
        index: Option<u32>,
        bytes: &[u8],
    ) -> Result<(), UpdateError> {
        let offset = self.locate(uniform, ty, index)?;
        self.put(offset, bytes);
        Ok(())
    }

    pub fn set_float(&mut self, u: &Uniform, v: f32) -> Result<(), UpdateError> {
        self.write(u, GlslType::Float, None, bytemuck::bytes_of(&v))
    }

    pub fn set_int(&mut self, u: &Uniform, v: i32) -> Result<(), UpdateError> {
        self.write(u, GlslType::Int, None, bytemuck::bytes_of(&v))
    }

    pub fn set_vec2(&mut self, u: &Uniform, v: Vec2) -> Result<(), UpdateError> {
        self.write(u, GlslType::Vec2F, None, bytemuck::bytes_of(&v))
    }

    pub fn set_ivec2(&mut self, u: &Uniform, v: IVec2) -> Result<(), UpdateError> {
        self.write(u, GlslType::Vec2I, None, bytemuck::bytes_of(&v))
    }

    pub fn set_vec4(&mut self, u: &Uniform, v: Vec4) -> Result<(), UpdateError> {
        self.write(u, GlslType::Vec4F, None, bytemuck::bytes_of(&v))
    }

    pub fn set_mat3(&mut self, u: &Uniform, m: Mat3) -> Result<(), UpdateError> {
        let padded = mat3_std140(m);
        self.write(u, GlslType::Mat3F, None, bytemuck::cast_slice(&padded))
    }

    pub fn set_mat4(&mut self, u: &Uniform, m: Mat4) -> Result<(), UpdateError> {
        self.write(u, GlslType::Mat4F, None, bytemuck::bytes_of(&m))
    }

    pub fn set_vec3_at(&mut self, u: &Uniform, index: u32, v: Vec3) -> Result<(), UpdateError> {
        self.write(u, GlslType::Vec3F, Some(index), bytemuck::bytes_of(&v))
    }

    pub fn set_vec4_at(&mut self, u: &Uniform, index: u32, v: Vec4) -> Result<(), UpdateError> {
        self.write(u, GlslType::Vec4F, Some(index), bytemuck::bytes_of(&v))
    }

    pub fn set_mat4_at(&mut self, u: &Uniform, index: u32, m: Mat4) -> Result<(), UpdateError> {
        self.write(u, GlslType::Mat4F, Some(index), bytemuck::bytes_of(&m))
    }
}

fn mat3_std140(m: Mat3) -> [f32; 12] {
    let c = m.to_cols_array();
    [
        c[0], c[1], c[2], 0.0, c[3], c[4], c[5], 0.0, c[6], c[7], c[8], 0.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ao_like_members(with_inv_proj: bool) -> Vec<Uniform> {
        let mut members = vec![
            Uniform::vec3_array("uKernel", 4),
            Uniform::mat4("uProj"),
        ];
        if with_inv_proj {
            members.push(Uniform::mat4("uInvProj"));
        }
        members.push(Uniform::vec2("uNoiseScale"));
        members.push(Uniform::float("uRadius"));
        members.push(Uniform::ivec2("uKernelRange"));
        members
    }

    #[test]
    fn std140_offsets_follow_registration_order() {
        let (layout, size) = std140_layout(&ao_like_members(true));
        let offsets: Vec<(&str, u32)> = layout.iter().map(|m| (m.name.as_str(), m.offset)).collect();
        assert_eq!(
            offsets,
            vec![
                ("uKernel", 0),
                ("uProj", 64),
                ("uInvProj", 128),
                ("uNoiseScale", 192),
                ("uRadius", 200),
                ("uKernelRange", 208),
            ]
        );
        assert_eq!(layout[0].stride, 16);
        assert_eq!(size, 224);
    }

    #[test]
    fn conditional_member_removes_exactly_one_entry() {
        let (with, _) = std140_layout(&ao_like_members(true));
        let (without, _) = std140_layout(&ao_like_members(false));
        let with_names: Vec<&str> = with.iter().map(|m| m.name.as_str()).filter(|n| *n != "uInvProj").collect();
        let without_names: Vec<&str> = without.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(with_names, without_names);
    }

    #[test]
    fn writer_rejects_out_of_order_and_unknown_members() {
        let members = ao_like_members(false);
        let (layout, size) = std140_layout(&members);
        let mut data = vec![0u8; size as usize];
        let mut w = BlockWriter::new("ao", &layout, &mut data);

        w.set_mat4(&members[1], Mat4::IDENTITY).unwrap();
        let err = w.set_vec3_at(&members[0], 0, Vec3::X).unwrap_err();
        assert!(matches!(err, UpdateError::OutOfOrder { .. }));

        let err = w.set_float(&Uniform::float("uMissing"), 1.0).unwrap_err();
        assert!(matches!(err, UpdateError::UnknownMember { .. }));

        let err = w.set_vec4(&Uniform::vec4("uRadius"), Vec4::ONE).unwrap_err();
        assert!(matches!(err, UpdateError::TypeMismatch { .. }));
    }

    #[test]
    fn writer_places_array_elements_at_stride() {
        let members = vec![Uniform::vec3_array("k", 3), Uniform::float("r")];
        let (layout, size) = std140_layout(&members);
        let mut data = vec![0xffu8; size as usize];
        {
            let mut w = BlockWriter::new("b", &layout, &mut data);
            w.set_vec3_at(&members[0], 2, Vec3::new(1.0, 2.0, 3.0)).unwrap();
            w.set_vec3_at(&members[0], 0, Vec3::splat(9.0)).unwrap();
            assert!(matches!(
                w.set_vec3_at(&members[0], 3, Vec3::ZERO),
                Err(UpdateError::IndexOutOfRange { .. })
            ));
            w.set_float(&members[1], 0.5).unwrap();
        }
        let floats: &[f32] = bytemuck::cast_slice(&data);
        assert_eq!(&floats[8..11], &[1.0, 2.0, 3.0]);
        assert_eq!(floats[0], 9.0);
        // untouched element stays zero-filled
        assert_eq!(&floats[4..7], &[0.0, 0.0, 0.0]);
        assert_eq!(floats[12], 0.5);
    }

    #[test]
    fn param_cell_round_trips_values() {
        let cell = ParamCell::with_f32(1.5);
        assert_eq!(cell.f32(), 1.5);
        cell.set_ivec2(IVec2::new(3, -4));
        assert_eq!(cell.ivec2(), IVec2::new(3, -4));
    }

    fn member_strategy() -> impl Strategy<Value = Uniform> {
        let types = prop_oneof![
            Just(GlslType::Float),
            Just(GlslType::Int),
            Just(GlslType::Vec2F),
            Just(GlslType::Vec3F),
            Just(GlslType::Vec4F),
            Just(GlslType::Mat3F),
            Just(GlslType::Mat4F),
        ];
        (types, proptest::option::of(1u32..5))
            .prop_map(|(ty, len)| Uniform::new("m", ty, len))
    }

    proptest! {
        #[test]
        fn members_never_overlap_and_are_aligned(
            raw in proptest::collection::vec(member_strategy(), 1..10),
            keep in proptest::collection::vec(any::<bool>(), 10),
        ) {
            let members: Vec<Uniform> = raw
                .into_iter()
                .enumerate()
                .filter(|(i, _)| keep[*i] || *i == 0)
                .map(|(i, m)| Uniform::new(format!("m{i}"), m.ty(), m.array_len()))
                .collect();
            let (layout, size) = std140_layout(&members);

            prop_assert_eq!(layout.len(), members.len());
            let mut end = 0;
            for (m, decl) in layout.iter().zip(&members) {
                prop_assert_eq!(&m.name, decl.name());
                prop_assert!(m.offset >= end);
                let (align, _) = m.ty.std140_align_size();
                let align = if m.array_len.is_some() { 16 } else { align };
                prop_assert_eq!(m.offset % align, 0);
                end = m.offset + m.size;
            }
            prop_assert!(size >= end);
            prop_assert_eq!(size % 16, 0);
        }
    }
}
