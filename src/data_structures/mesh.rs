//! Mesh geometry, CPU side and GPU side.
//!
//! [`MeshData`] keeps the CPU copy of the geometry. Besides being the upload
//! source it is read by the leaf spawner, which walks trunk vertices in world
//! space. [`Mesh`] is the immutable GPU-resident version shared by handle.

use cgmath::InnerSpace;
use wgpu::util::DeviceExt;

/// The vertex layout every mesh uses. Programs pick the attributes they need
/// by name, see [`MeshVertex::attribute`].
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
}

impl MeshVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], tex_coords: [f32; 2]) -> Self {
        Self {
            position,
            tex_coords,
            normal,
            ..Default::default()
        }
    }

    /// Offset and format of a named vertex attribute.
    pub fn attribute(name: &str) -> Option<(wgpu::BufferAddress, wgpu::VertexFormat)> {
        use std::mem::size_of;
        let f = |n: usize| (size_of::<f32>() * n) as wgpu::BufferAddress;
        match name {
            "aPosition" => Some((0, wgpu::VertexFormat::Float32x3)),
            "aTexCoord" => Some((f(3), wgpu::VertexFormat::Float32x2)),
            "aNormal" => Some((f(5), wgpu::VertexFormat::Float32x3)),
            "aTangent" => Some((f(8), wgpu::VertexFormat::Float32x3)),
            "aBitangent" => Some((f(11), wgpu::VertexFormat::Float32x3)),
            _ => None,
        }
    }

    pub const STRIDE: wgpu::BufferAddress = std::mem::size_of::<MeshVertex>() as wgpu::BufferAddress;
}

/// Index storage. 16 bit indices are used whenever every vertex is addressable
/// with them.
#[derive(Clone, Debug, PartialEq)]
pub enum IndexData {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl IndexData {
    pub fn from_indices(indices: Vec<u32>, vertex_count: usize) -> Self {
        if vertex_count <= u16::MAX as usize + 1 {
            IndexData::U16(indices.into_iter().map(|i| i as u16).collect())
        } else {
            IndexData::U32(indices)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexData::U16(v) => v.len(),
            IndexData::U32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<u32> {
        match self {
            IndexData::U16(v) => v.get(i).map(|&i| i as u32),
            IndexData::U32(v) => v.get(i).copied(),
        }
    }

    pub fn format(&self) -> wgpu::IndexFormat {
        match self {
            IndexData::U16(_) => wgpu::IndexFormat::Uint16,
            IndexData::U32(_) => wgpu::IndexFormat::Uint32,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(v) => bytemuck::cast_slice(v),
            IndexData::U32(v) => bytemuck::cast_slice(v),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}

#[derive(Clone, Debug)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<MeshVertex>,
    pub indices: IndexData,
}

impl MeshData {
    /// Builds a triangle list and derives tangents from the UVs.
    pub fn new(name: &str, vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        let mut vertices = vertices;
        compute_tangents(&mut vertices, &indices);
        let indices = IndexData::from_indices(indices, vertices.len());
        Self {
            name: name.to_string(),
            vertices,
            indices,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn positions(&self) -> impl Iterator<Item = cgmath::Point3<f32>> + '_ {
        self.vertices.iter().map(|v| v.position.into())
    }

    /// Unit quad in the XY plane, facing +Z. Used for billboards and leaves.
    pub fn quad() -> Self {
        let n = [0.0, 0.0, 1.0];
        let vertices = vec![
            MeshVertex::new([-0.5, -0.5, 0.0], n, [0.0, 1.0]),
            MeshVertex::new([0.5, -0.5, 0.0], n, [1.0, 1.0]),
            MeshVertex::new([0.5, 0.5, 0.0], n, [1.0, 0.0]),
            MeshVertex::new([-0.5, 0.5, 0.0], n, [0.0, 0.0]),
        ];
        Self::new("quad", vertices, vec![0, 1, 2, 0, 2, 3])
    }

    /// Clip-space quad covering the viewport.
    pub fn fullscreen() -> Self {
        let n = [0.0, 0.0, 1.0];
        let vertices = vec![
            MeshVertex::new([-1.0, -1.0, 0.0], n, [0.0, 1.0]),
            MeshVertex::new([1.0, -1.0, 0.0], n, [1.0, 1.0]),
            MeshVertex::new([1.0, 1.0, 0.0], n, [1.0, 0.0]),
            MeshVertex::new([-1.0, 1.0, 0.0], n, [0.0, 0.0]),
        ];
        Self::new("fullscreen", vertices, vec![0, 1, 2, 0, 2, 3])
    }
}

/// Per-triangle tangent frames, averaged over the triangles sharing a vertex.
fn compute_tangents(vertices: &mut [MeshVertex], indices: &[u32]) {
    let mut triangles_included = vec![0u32; vertices.len()];
    for c in indices.chunks_exact(3) {
        let [i0, i1, i2] = [c[0] as usize, c[1] as usize, c[2] as usize];
        if i0 >= vertices.len() || i1 >= vertices.len() || i2 >= vertices.len() {
            continue;
        }
        let (v0, v1, v2) = (vertices[i0], vertices[i1], vertices[i2]);

        let pos0: cgmath::Vector3<f32> = v0.position.into();
        let pos1: cgmath::Vector3<f32> = v1.position.into();
        let pos2: cgmath::Vector3<f32> = v2.position.into();
        let uv0: cgmath::Vector2<f32> = v0.tex_coords.into();
        let uv1: cgmath::Vector2<f32> = v1.tex_coords.into();
        let uv2: cgmath::Vector2<f32> = v2.tex_coords.into();

        let delta_pos1 = pos1 - pos0;
        let delta_pos2 = pos2 - pos0;
        let delta_uv1 = uv1 - uv0;
        let delta_uv2 = uv2 - uv0;

        let det = delta_uv1.x * delta_uv2.y - delta_uv1.y * delta_uv2.x;
        if det.abs() < f32::EPSILON {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (delta_pos1 * delta_uv2.y - delta_pos2 * delta_uv1.y) * r;
        // Flipped for right-handed normal maps with wgpu's texture coordinates.
        let bitangent = (delta_pos2 * delta_uv1.x - delta_pos1 * delta_uv2.x) * -r;

        for i in [i0, i1, i2] {
            let v = &mut vertices[i];
            v.tangent = (tangent + cgmath::Vector3::from(v.tangent)).into();
            v.bitangent = (bitangent + cgmath::Vector3::from(v.bitangent)).into();
            triangles_included[i] += 1;
        }
    }

    for (v, n) in vertices.iter_mut().zip(triangles_included) {
        if n == 0 {
            continue;
        }
        let t = cgmath::Vector3::from(v.tangent);
        let b = cgmath::Vector3::from(v.bitangent);
        if t.magnitude2() > 0.0 {
            v.tangent = t.normalize().into();
        }
        if b.magnitude2() > 0.0 {
            v.bitangent = b.normalize().into();
        }
    }
}

/// GPU-resident geometry plus the CPU copy it was built from.
#[derive(Debug)]
pub struct Mesh {
    pub data: MeshData,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_format: wgpu::IndexFormat,
    pub num_elements: u32,
}

impl Mesh {
    pub fn upload(device: &wgpu::Device, data: MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Vertex Buffer", data.name)),
            contents: bytemuck::cast_slice(&data.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        // wgpu wants buffer sizes aligned to 4 bytes, odd u16 counts need a pad.
        let mut index_bytes = data.indices.as_bytes().to_vec();
        index_bytes.resize(index_bytes.len().next_multiple_of(4), 0);
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Index Buffer", data.name)),
            contents: &index_bytes,
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            index_format: data.indices.format(),
            num_elements: data.indices.len() as u32,
            data,
            vertex_buffer,
            index_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_meshes_use_16_bit_indices() {
        let quad = MeshData::quad();
        assert_eq!(quad.indices.format(), wgpu::IndexFormat::Uint16);
        assert_eq!(quad.indices.len(), 6);
    }

    #[test]
    fn large_meshes_use_32_bit_indices() {
        let indices = IndexData::from_indices(vec![0, 1, 70_000], 70_001);
        assert_eq!(indices.format(), wgpu::IndexFormat::Uint32);
        assert_eq!(indices.get(2), Some(70_000));
    }

    #[test]
    fn quad_tangent_follows_u_axis() {
        let quad = MeshData::quad();
        for v in &quad.vertices {
            assert!((v.tangent[0] - 1.0).abs() < 1e-5, "{:?}", v.tangent);
        }
    }
}
