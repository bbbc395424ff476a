//! Name-addressed uniform blocks.
//!
//! Every program declares its uniform struct as an ordered list of named fields.
//! The layout resolves names to byte offsets once, when the program is created;
//! that map is the per-program location cache. Engine code writes uniforms by
//! name through a [`UniformBinder`], which quietly ignores names the program does
//! not declare. The same scene code can therefore drive programs with different
//! feature sets (with or without point lights, fog, material maps, ...).
//!
//! Layout rule: every scalar and vector takes one 16 byte slot, a `mat4` takes 64
//! bytes, and arrays are arrays of 16 byte slots. In WGSL that means declaring
//! scalars as `vec4<f32>` and reading `.x`, so CPU and GPU offsets always agree.

use std::collections::HashMap;

use cgmath::{Matrix4, Point3, Vector2, Vector3, Vector4};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformKind {
    pub const fn size(self) -> usize {
        match self {
            UniformKind::Mat4 => 64,
            _ => 16,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat4([[f32; 4]; 4]),
}

impl UniformValue {
    fn write_into(&self, dst: &mut [u8]) -> bool {
        let src: &[f32] = match self {
            UniformValue::Float(v) => std::slice::from_ref(v),
            UniformValue::Vec2(v) => v,
            UniformValue::Vec3(v) => v,
            UniformValue::Vec4(v) => v,
            UniformValue::Mat4(m) => m.as_flattened(),
        };
        let bytes: &[u8] = bytemuck::cast_slice(src);
        if bytes.len() > dst.len() {
            return false;
        }
        dst[..bytes.len()].copy_from_slice(bytes);
        true
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        UniformValue::Float(v)
    }
}
impl From<[f32; 2]> for UniformValue {
    fn from(v: [f32; 2]) -> Self {
        UniformValue::Vec2(v)
    }
}
impl From<[f32; 3]> for UniformValue {
    fn from(v: [f32; 3]) -> Self {
        UniformValue::Vec3(v)
    }
}
impl From<[f32; 4]> for UniformValue {
    fn from(v: [f32; 4]) -> Self {
        UniformValue::Vec4(v)
    }
}
impl From<Vector2<f32>> for UniformValue {
    fn from(v: Vector2<f32>) -> Self {
        UniformValue::Vec2(v.into())
    }
}
impl From<Vector3<f32>> for UniformValue {
    fn from(v: Vector3<f32>) -> Self {
        UniformValue::Vec3(v.into())
    }
}
impl From<Point3<f32>> for UniformValue {
    fn from(v: Point3<f32>) -> Self {
        UniformValue::Vec3(v.into())
    }
}
impl From<Vector4<f32>> for UniformValue {
    fn from(v: Vector4<f32>) -> Self {
        UniformValue::Vec4(v.into())
    }
}
impl From<Matrix4<f32>> for UniformValue {
    fn from(m: Matrix4<f32>) -> Self {
        UniformValue::Mat4(m.into())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UniformSlot {
    pub offset: usize,
    pub kind: UniformKind,
}

#[derive(Clone, Debug, Default)]
pub struct UniformLayout {
    slots: HashMap<String, UniformSlot>,
    size: usize,
}

impl UniformLayout {
    pub fn builder() -> UniformLayoutBuilder {
        UniformLayoutBuilder::default()
    }

    pub fn slot(&self, name: &str) -> Option<UniformSlot> {
        self.slots.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Size of the block in bytes. Never zero, wgpu rejects empty bindings.
    pub fn size(&self) -> usize {
        self.size.max(16)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[derive(Default)]
pub struct UniformLayoutBuilder {
    slots: HashMap<String, UniformSlot>,
    offset: usize,
}

impl UniformLayoutBuilder {
    fn push(mut self, name: &str, kind: UniformKind) -> Self {
        self.slots.insert(
            name.to_string(),
            UniformSlot {
                offset: self.offset,
                kind,
            },
        );
        self.offset += kind.size();
        self
    }

    pub fn float(self, name: &str) -> Self {
        self.push(name, UniformKind::Float)
    }

    pub fn vec2(self, name: &str) -> Self {
        self.push(name, UniformKind::Vec2)
    }

    pub fn vec3(self, name: &str) -> Self {
        self.push(name, UniformKind::Vec3)
    }

    pub fn vec4(self, name: &str) -> Self {
        self.push(name, UniformKind::Vec4)
    }

    pub fn mat4(self, name: &str) -> Self {
        self.push(name, UniformKind::Mat4)
    }

    /// `array<vec4<f32>, len>`; elements are addressed as `name[i]`, the bare
    /// name aliases element 0.
    pub fn vec4_array(mut self, name: &str, len: usize) -> Self {
        self.slots.insert(
            name.to_string(),
            UniformSlot {
                offset: self.offset,
                kind: UniformKind::Vec4,
            },
        );
        for i in 0..len {
            self = self.push(&format!("{name}[{i}]"), UniformKind::Vec4);
        }
        self
    }

    pub fn build(self) -> UniformLayout {
        UniformLayout {
            slots: self.slots,
            size: self.offset,
        }
    }
}

/// CPU mirror of one program's uniform buffer.
#[derive(Clone, Debug)]
pub struct UniformBlock {
    bytes: Vec<u8>,
    writes: usize,
}

impl UniformBlock {
    pub fn new(layout: &UniformLayout) -> Self {
        Self {
            bytes: vec![0; layout.size()],
            writes: 0,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of successful writes since creation.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    pub fn read_vec4(&self, layout: &UniformLayout, name: &str) -> Option<[f32; 4]> {
        let slot = layout.slot(name)?;
        let bytes = self.bytes.get(slot.offset..slot.offset + 16)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }
}

/// Lookup-and-maybe-set over one program's block.
pub struct UniformBinder<'a> {
    layout: &'a UniformLayout,
    block: &'a mut UniformBlock,
}

impl<'a> UniformBinder<'a> {
    pub fn new(layout: &'a UniformLayout, block: &'a mut UniformBlock) -> Self {
        Self { layout, block }
    }

    /// Returns `false` when the program has no such uniform; nothing is written then.
    pub fn set(&mut self, name: &str, value: impl Into<UniformValue>) -> bool {
        let Some(slot) = self.layout.slot(name) else {
            return false;
        };
        let end = slot.offset + slot.kind.size();
        let written = value.into().write_into(&mut self.block.bytes[slot.offset..end]);
        if written {
            self.block.writes += 1;
        }
        written
    }

    /// Writes `name[index]`.
    pub fn set_indexed(&mut self, name: &str, index: usize, value: impl Into<UniformValue>) -> bool {
        self.set(&format!("{name}[{index}]"), value)
    }

    pub fn has(&self, name: &str) -> bool {
        self.layout.contains(name)
    }

    pub fn layout(&self) -> &UniformLayout {
        self.layout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> UniformLayout {
        UniformLayout::builder()
            .mat4("uViewProj")
            .vec3("uCameraPos")
            .float("uRoughness")
            .vec4_array("uLights", 4)
            .build()
    }

    #[test]
    fn offsets_follow_slot_rule() {
        let layout = layout();
        assert_eq!(layout.slot("uViewProj").unwrap().offset, 0);
        assert_eq!(layout.slot("uCameraPos").unwrap().offset, 64);
        assert_eq!(layout.slot("uRoughness").unwrap().offset, 80);
        assert_eq!(layout.slot("uLights[0]").unwrap().offset, 96);
        assert_eq!(layout.slot("uLights[3]").unwrap().offset, 144);
        assert_eq!(layout.slot("uLights").unwrap().offset, 96);
        assert_eq!(layout.size(), 160);
    }

    #[test]
    fn absent_names_are_skipped() {
        let layout = layout();
        let mut block = UniformBlock::new(&layout);
        let mut binder = UniformBinder::new(&layout, &mut block);
        assert!(!binder.set("uFogColor", [1.0, 0.0, 0.0]));
        assert!(binder.set("uRoughness", 0.5));
        assert_eq!(block.write_count(), 1);
        assert_eq!(block.read_vec4(&layout, "uRoughness"), Some([0.5, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn oversize_values_do_not_spill() {
        let layout = layout();
        let mut block = UniformBlock::new(&layout);
        let mut binder = UniformBinder::new(&layout, &mut block);
        assert!(!binder.set("uRoughness", Matrix4::<f32>::from_scale(2.0)));
        assert_eq!(block.read_vec4(&layout, "uLights[0]"), Some([0.0; 4]));
    }
}
