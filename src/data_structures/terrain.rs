//! Procedural height field.
//!
//! Heights are never stored. [`Terrain::height`] is a pure function of the
//! parameters and the query point, and [`Terrain::generate_mesh`] calls that same
//! function for every grid vertex, so anything snapped to the ground later
//! lands exactly on the rendered surface.

use cgmath::InnerSpace;

use crate::data_structures::mesh::{MeshData, MeshVertex};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainParams {
    pub seed: u32,
    /// Noise frequency in cycles per world unit.
    pub scale: f32,
    /// Peak height in world units.
    pub amplitude: f32,
    pub octaves: u32,
    /// Amplitude factor between octaves.
    pub persistence: f32,
    /// Centre of the flat area, in (x, z).
    pub origin: [f32; 2],
    /// Inside this radius the ground is exactly level.
    pub flat_radius: f32,
    /// Beyond this radius the noise is at full amplitude.
    pub max_distance: f32,
    pub falloff_power: f32,
    /// Side length of the generated square mesh.
    pub size: f32,
    /// Grid cells per side.
    pub resolution: u32,
    /// UV repeats across the whole mesh.
    pub uv_tiling: f32,
}

impl Default for TerrainParams {
    fn default() -> Self {
        Self {
            seed: 1337,
            scale: 0.02,
            amplitude: 12.0,
            octaves: 5,
            persistence: 0.6,
            origin: [0.0, 0.0],
            flat_radius: 8.0,
            max_distance: 60.0,
            falloff_power: 2.0,
            size: 400.0,
            resolution: 200,
            uv_tiling: 40.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Terrain {
    pub params: TerrainParams,
}

impl Terrain {
    pub fn new(params: TerrainParams) -> Self {
        Self { params }
    }

    pub fn height(&self, x: f32, z: f32) -> f32 {
        height(x, z, &self.params)
    }

    /// Surface normal from central differences of [`Terrain::height`]. The
    /// mesh uses face-averaged normals instead, so the two agree only
    /// approximately.
    pub fn normal_at(&self, x: f32, z: f32) -> cgmath::Vector3<f32> {
        let p = &self.params;
        let eps = (p.size / p.resolution.max(1) as f32).max(1e-3);
        let dx = self.height(x + eps, z) - self.height(x - eps, z);
        let dz = self.height(x, z + eps) - self.height(x, z - eps);
        cgmath::Vector3::new(-dx, 2.0 * eps, -dz).normalize()
    }

    /// Regular grid of `resolution`² cells centred on the origin.
    pub fn generate_mesh(&self) -> MeshData {
        let p = &self.params;
        let cells = p.resolution.max(1);
        let side = cells + 1;
        let step = p.size / cells as f32;
        let start_x = p.origin[0] - p.size * 0.5;
        let start_z = p.origin[1] - p.size * 0.5;

        let mut vertices = Vec::with_capacity((side * side) as usize);
        for j in 0..side {
            for i in 0..side {
                let x = start_x + i as f32 * step;
                let z = start_z + j as f32 * step;
                let u = i as f32 / cells as f32 * p.uv_tiling;
                let v = j as f32 / cells as f32 * p.uv_tiling;
                vertices.push(MeshVertex::new(
                    [x, self.height(x, z), z],
                    [0.0, 0.0, 0.0],
                    [u, v],
                ));
            }
        }

        let mut indices = Vec::with_capacity((cells * cells * 6) as usize);
        for j in 0..cells {
            for i in 0..cells {
                let a = j * side + i;
                let b = a + 1;
                let c = a + side;
                let d = c + 1;
                // counter-clockwise seen from above
                indices.extend_from_slice(&[a, c, b, b, c, d]);
            }
        }

        let mut normals = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
        for tri in indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            let pa: cgmath::Vector3<f32> = vertices[a].position.into();
            let pb: cgmath::Vector3<f32> = vertices[b].position.into();
            let pc: cgmath::Vector3<f32> = vertices[c].position.into();
            let face = (pb - pa).cross(pc - pa);
            if face.magnitude2() > 0.0 {
                let face = face.normalize();
                for i in [a, b, c] {
                    normals[i] += face;
                }
            }
        }
        for (vertex, normal) in vertices.iter_mut().zip(normals) {
            vertex.normal = if normal.magnitude2() > 0.0 {
                normal.normalize().into()
            } else {
                [0.0, 1.0, 0.0]
            };
        }

        MeshData::new("terrain", vertices, indices)
    }
}

pub fn height(x: f32, z: f32, params: &TerrainParams) -> f32 {
    let d = ((x - params.origin[0]).powi(2) + (z - params.origin[1]).powi(2)).sqrt();
    let falloff = distance_falloff(d, params.flat_radius, params.max_distance, params.falloff_power);
    if falloff == 0.0 {
        return 0.0;
    }
    let noise = fractal_noise(
        x * params.scale,
        z * params.scale,
        params.octaves,
        params.persistence,
        params.seed,
    );
    noise * params.amplitude * falloff
}

/// 0 inside `flat_radius`, `t^power` on the ramp, 1 from `max_distance` on.
pub fn distance_falloff(distance: f32, flat_radius: f32, max_distance: f32, power: f32) -> f32 {
    if distance <= flat_radius {
        0.0
    } else if distance >= max_distance {
        1.0
    } else {
        ((distance - flat_radius) / (max_distance - flat_radius)).powf(power)
    }
}

/// Sum of `octaves` layers of value noise at doubling frequency, divided by the
/// total amplitude so the result stays in [-1, 1].
pub fn fractal_noise(x: f32, z: f32, octaves: u32, persistence: f32, seed: u32) -> f32 {
    let mut total = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    let mut norm = 0.0;
    for octave in 0..octaves.max(1) {
        total += value_noise(x * frequency, z * frequency, seed.wrapping_add(octave)) * amplitude;
        norm += amplitude;
        amplitude *= persistence;
        frequency *= 2.0;
    }
    if norm > 0.0 {
        (total / norm).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Smoothly interpolated lattice noise in [-1, 1].
pub fn value_noise(x: f32, z: f32, seed: u32) -> f32 {
    let x0 = x.floor();
    let z0 = z.floor();
    let (ix, iz) = (x0 as i32, z0 as i32);
    let fx = smooth(x - x0);
    let fz = smooth(z - z0);

    let v00 = lattice(ix, iz, seed);
    let v10 = lattice(ix.wrapping_add(1), iz, seed);
    let v01 = lattice(ix, iz.wrapping_add(1), seed);
    let v11 = lattice(ix.wrapping_add(1), iz.wrapping_add(1), seed);

    let a = v00 + (v10 - v00) * fx;
    let b = v01 + (v11 - v01) * fx;
    a + (b - a) * fz
}

fn smooth(t: f32) -> f32 {
    t * t * (3.0 - 2.0 * t)
}

fn lattice(ix: i32, iz: i32, seed: u32) -> f32 {
    let mut h = (ix as u32)
        .wrapping_mul(0x27d4_eb2d)
        .wrapping_add((iz as u32).wrapping_mul(0x1656_67b1))
        .wrapping_add(seed.wrapping_mul(0x9e37_79b9));
    h ^= h >> 15;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    (h as f32 / u32::MAX as f32) * 2.0 - 1.0
}
