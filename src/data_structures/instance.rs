//! Node transforms and their GPU instance representation.
//!
//! Per-instance data is one column-major 4x4 model matrix. Instanced programs
//! read it as four `vec4` attributes, `aInstanceMatrix0..3`.

use cgmath::{EuclideanSpace, One, Transform as _};

/// Position, rotation (as quaternion) and scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Transform {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn with_rotation(mut self, rotation: cgmath::Quaternion<f32>) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = cgmath::Vector3::new(scale, scale, scale);
        self
    }

    pub fn with_nonuniform_scale(mut self, scale: cgmath::Vector3<f32>) -> Self {
        self.scale = scale;
        self
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    pub fn to_raw(&self) -> InstanceRaw {
        InstanceRaw {
            model: self.to_matrix().into(),
        }
    }

    pub fn transform_point(&self, point: cgmath::Point3<f32>) -> cgmath::Point3<f32> {
        self.to_matrix().transform_point(point)
    }

    pub fn origin(&self) -> cgmath::Point3<f32> {
        cgmath::Point3::from_vec(self.position)
    }
}

impl From<cgmath::Vector3<f32>> for Transform {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        Transform {
            position,
            ..Default::default()
        }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

/**
 * The raw instance is the actual data stored on the GPU
 */
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
}

/// Names of the per-instance attributes an instanced program must declare.
pub const INSTANCE_ATTRIBUTES: [&str; 4] = [
    "aInstanceMatrix0",
    "aInstanceMatrix1",
    "aInstanceMatrix2",
    "aInstanceMatrix3",
];

impl InstanceRaw {
    /// Instance-rate buffer layout. A mat4 takes up four vertex slots, one per column.
    pub fn desc(first_location: u32) -> [wgpu::VertexAttribute; 4] {
        use std::mem;
        let column = |i: u32| wgpu::VertexAttribute {
            offset: (mem::size_of::<[f32; 4]>() * i as usize) as wgpu::BufferAddress,
            shader_location: first_location + i,
            format: wgpu::VertexFormat::Float32x4,
        };
        [column(0), column(1), column(2), column(3)]
    }

    pub const STRIDE: wgpu::BufferAddress =
        std::mem::size_of::<InstanceRaw>() as wgpu::BufferAddress;
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Rotation3;

    #[test]
    fn matrix_applies_scale_then_rotation_then_translation() {
        let t = Transform::from(cgmath::Vector3::new(10.0, 0.0, 0.0))
            .with_rotation(cgmath::Quaternion::from_angle_y(cgmath::Deg(90.0)))
            .with_scale(2.0);
        let p = t.transform_point(cgmath::Point3::new(1.0, 0.0, 0.0));
        assert!((p.x - 10.0).abs() < 1e-5);
        assert!((p.z + 2.0).abs() < 1e-5);
    }

    #[test]
    fn raw_instance_is_sixteen_floats() {
        assert_eq!(std::mem::size_of::<InstanceRaw>(), 16 * 4);
    }
}
