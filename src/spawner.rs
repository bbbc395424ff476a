//! Deterministic tree and leaf placement.
//!
//! Two independent generators drive the pass: one for where things go, one for
//! how big and how tilted they are. The same seeds, terrain and camera always
//! give the same forest, and changing a size parameter never moves a tree.

use std::f32::consts::TAU;

use cgmath::{InnerSpace, MetricSpace, Rotation3};

use crate::{
    camera::Camera,
    data_structures::{
        MaterialId, MeshId, NodeId,
        instance::Transform,
        mesh::MeshData,
        node::Node,
        scene::Scene,
        terrain::Terrain,
    },
};

/// Numerical Recipes linear congruential generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    pub const MULTIPLIER: u32 = 1_664_525;
    pub const INCREMENT: u32 = 1_013_904_223;

    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(Self::INCREMENT);
        self.state
    }

    /// Uniform in [0, 1), from the top 24 bits.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    pub fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next_f32()
    }

    /// Uniform in [-magnitude, magnitude).
    pub fn symmetric(&mut self, magnitude: f32) -> f32 {
        self.range(-magnitude, magnitude)
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnerConfig {
    pub count: usize,
    /// Candidates tried per tree before giving up on it.
    pub max_attempts: usize,
    pub placement_seed: u32,
    pub size_seed: u32,
    /// Distance band in front of the camera, in world units.
    pub near: f32,
    pub far: f32,
    /// (x, z) of the campfire.
    pub fire_position: [f32; 2],
    pub fire_exclusion_radius: f32,
    pub camera_exclusion_radius: f32,
    pub size_range: (f32, f32),
    /// Widens (> 1) or narrows the horizontal field of view used for placement.
    pub fov_margin: f32,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            count: 120,
            max_attempts: 30,
            placement_seed: 42,
            size_seed: 7,
            near: 6.0,
            far: 90.0,
            fire_position: [0.0, 0.0],
            fire_exclusion_radius: 5.0,
            camera_exclusion_radius: 3.0,
            size_range: (0.7, 1.4),
            fov_margin: 1.15,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeafConfig {
    /// Chance of a leaf on a trunk vertex right next to the camera.
    pub near_probability: f32,
    /// No leaves on vertices farther than this from the camera.
    pub max_distance: f32,
    /// Only trunk vertices at least this high (mesh space) carry leaves.
    pub min_height: f32,
    pub size: f32,
    /// Radians.
    pub max_tilt: f32,
    /// Radians.
    pub max_roll: f32,
}

impl Default for LeafConfig {
    fn default() -> Self {
        Self {
            near_probability: 0.35,
            max_distance: 80.0,
            min_height: 1.5,
            size: 0.6,
            max_tilt: 0.35,
            max_roll: 0.5,
        }
    }
}

/// What a tree is made of.
#[derive(Clone, Copy, Debug)]
pub struct TreeAssets<'a> {
    pub trunk_mesh: MeshId,
    /// CPU copy of the trunk, walked for leaf placement.
    pub trunk_data: &'a MeshData,
    pub trunk_material: Option<MaterialId>,
    pub leaf_mesh: MeshId,
    pub leaf_material: Option<MaterialId>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Forest {
    pub trunks: Vec<NodeId>,
    pub leaves: Vec<NodeId>,
}

#[derive(Clone, Debug)]
pub struct TreeSpawner {
    pub config: SpawnerConfig,
    placement: Lcg,
    size: Lcg,
}

impl TreeSpawner {
    pub fn new(config: SpawnerConfig) -> Self {
        Self {
            config,
            placement: Lcg::new(config.placement_seed),
            size: Lcg::new(config.size_seed),
        }
    }

    /// Trunk transforms inside the camera's horizontal view, snapped to the
    /// ground. Trees whose every attempt was rejected are dropped, so fewer
    /// than `count` may come back.
    pub fn place_trunks(&mut self, camera: &Camera, terrain: &Terrain) -> Vec<Transform> {
        let cfg = self.config;
        let eye = camera.position();
        let forward = camera.forward();
        let flat = cgmath::Vector2::new(forward.x, forward.z);
        let flat = if flat.magnitude2() > 1e-8 {
            flat.normalize()
        } else {
            cgmath::Vector2::new(0.0, -1.0)
        };
        let heading = flat.y.atan2(flat.x);
        let half_fov = camera.half_horizontal_fov() * cfg.fov_margin;
        let fire = cgmath::Vector2::new(cfg.fire_position[0], cfg.fire_position[1]);
        let camera_xz = cgmath::Vector2::new(eye.x, eye.z);

        let mut trunks = Vec::with_capacity(cfg.count);
        let mut rejected = 0;
        for _ in 0..cfg.count {
            let mut placed = None;
            for _ in 0..cfg.max_attempts {
                // distance is uniform, not area-uniform, so far rows aren't denser
                let distance = self.placement.range(cfg.near, cfg.far);
                let angle = heading + self.placement.symmetric(half_fov);
                let xz = camera_xz + cgmath::Vector2::new(angle.cos(), angle.sin()) * distance;
                if xz.distance(fire) < cfg.fire_exclusion_radius
                    || xz.distance(camera_xz) < cfg.camera_exclusion_radius
                {
                    rejected += 1;
                    continue;
                }
                placed = Some(xz);
                break;
            }
            let Some(xz) = placed else {
                continue;
            };
            let scale = self.size.range(cfg.size_range.0, cfg.size_range.1);
            let yaw = self.size.range(0.0, TAU);
            trunks.push(
                Transform::from(cgmath::Vector3::new(xz.x, terrain.height(xz.x, xz.y), xz.y))
                    .with_rotation(cgmath::Quaternion::from_angle_y(cgmath::Rad(yaw)))
                    .with_scale(scale),
            );
        }
        log::debug!(
            "placed {} of {} trees, {rejected} candidates rejected",
            trunks.len(),
            cfg.count
        );
        trunks
    }

    /// Leaf transforms on the vertices of every trunk. The chance of a leaf
    /// falls linearly from `near_probability` at the camera to zero at
    /// `max_distance`.
    pub fn place_leaves(
        &mut self,
        leaves: &LeafConfig,
        trunk: &MeshData,
        trunks: &[Transform],
        camera_pos: cgmath::Point3<f32>,
    ) -> Vec<Transform> {
        let mut placed = Vec::new();
        for transform in trunks {
            for local in trunk.positions() {
                if local.y < leaves.min_height {
                    continue;
                }
                let world = transform.transform_point(local);
                let falloff = 1.0 - world.distance(camera_pos) / leaves.max_distance;
                let probability = leaves.near_probability * falloff.max(0.0);
                if self.placement.next_f32() >= probability {
                    continue;
                }
                let yaw = self.size.range(0.0, TAU);
                let tilt = self.size.symmetric(leaves.max_tilt);
                let roll = self.size.symmetric(leaves.max_roll);
                let rotation = cgmath::Quaternion::from_angle_y(cgmath::Rad(yaw))
                    * cgmath::Quaternion::from_angle_x(cgmath::Rad(tilt))
                    * cgmath::Quaternion::from_angle_z(cgmath::Rad(roll));
                placed.push(
                    Transform::from(cgmath::Vector3::new(world.x, world.y, world.z))
                        .with_rotation(rotation)
                        .with_scale(leaves.size),
                );
            }
        }
        placed
    }

    /// Places trunks and leaves and adds them to `scene` as static nodes.
    pub fn spawn(
        &mut self,
        scene: &mut Scene,
        terrain: &Terrain,
        assets: TreeAssets<'_>,
        leaves: &LeafConfig,
    ) -> Forest {
        let trunks = self.place_trunks(&scene.camera, terrain);
        let leaf_transforms =
            self.place_leaves(leaves, assets.trunk_data, &trunks, scene.camera.position());

        let forest = Forest {
            trunks: trunks
                .into_iter()
                .map(|t| scene.add(Node::new(assets.trunk_mesh, assets.trunk_material, t).into_static()))
                .collect(),
            leaves: leaf_transforms
                .into_iter()
                .map(|t| scene.add(Node::new(assets.leaf_mesh, assets.leaf_material, t).into_static()))
                .collect(),
        };
        log::info!(
            "forest: {} trunks, {} leaves",
            forest.trunks.len(),
            forest.leaves.len()
        );
        forest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        camera::CameraConfig,
        data_structures::{mesh::MeshVertex, terrain::TerrainParams},
    };

    fn camera() -> Camera {
        Camera::new(
            cgmath::Point3::new(0.0, 2.0, 12.0),
            cgmath::Point3::new(0.0, 2.0, 0.0),
            16.0 / 9.0,
            CameraConfig::default(),
        )
    }

    #[test]
    fn lcg_matches_reference_sequence() {
        let mut rng = Lcg::new(0);
        assert_eq!(rng.next_u32(), 1_013_904_223);
        assert_eq!(rng.next_u32(), 1_196_435_762);
        let mut rng = Lcg::new(99);
        for _ in 0..1000 {
            let v = rng.next_f32();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn same_seeds_same_forest() {
        let terrain = Terrain::new(TerrainParams::default());
        let a = TreeSpawner::new(SpawnerConfig::default()).place_trunks(&camera(), &terrain);
        let b = TreeSpawner::new(SpawnerConfig::default()).place_trunks(&camera(), &terrain);
        assert!(!a.is_empty());
        assert_eq!(a, b);

        let c = TreeSpawner::new(SpawnerConfig {
            placement_seed: 43,
            ..Default::default()
        })
        .place_trunks(&camera(), &terrain);
        assert_ne!(a, c);
    }

    #[test]
    fn trunks_respect_exclusions_and_ground() {
        let terrain = Terrain::new(TerrainParams::default());
        let camera = camera();
        let config = SpawnerConfig {
            fire_position: [0.0, 0.0],
            fire_exclusion_radius: 10.0,
            ..Default::default()
        };
        let trunks = TreeSpawner::new(config).place_trunks(&camera, &terrain);
        let eye = camera.position();
        for t in &trunks {
            let p = t.position;
            let fire = (p.x * p.x + p.z * p.z).sqrt();
            assert!(fire >= config.fire_exclusion_radius, "{p:?}");
            let d = ((p.x - eye.x).powi(2) + (p.z - eye.z).powi(2)).sqrt();
            assert!(d >= config.near - 1e-3 && d <= config.far + 1e-3, "{p:?}");
            assert_eq!(p.y, terrain.height(p.x, p.z));
            assert!(t.scale.x >= config.size_range.0 && t.scale.x <= config.size_range.1);
        }
    }

    #[test]
    fn trunks_stay_in_front_of_camera() {
        let terrain = Terrain::new(TerrainParams::default());
        let camera = camera();
        let trunks = TreeSpawner::new(SpawnerConfig::default()).place_trunks(&camera, &terrain);
        let eye = camera.position();
        // camera looks down -z
        assert!(trunks.iter().all(|t| t.position.z < eye.z));
    }

    #[test]
    fn leaves_thin_out_with_distance() {
        let vertices = (0..200)
            .map(|i| MeshVertex::new([0.0, 2.0 + i as f32 * 0.01, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0]))
            .collect();
        let trunk = MeshData::new("trunk", vertices, vec![0, 1, 2]);
        let leaves = LeafConfig {
            near_probability: 1.0,
            max_distance: 50.0,
            ..Default::default()
        };
        let eye = cgmath::Point3::new(0.0, 2.0, 0.0);
        let near = [Transform::from(cgmath::Vector3::new(0.0, 0.0, 0.0))];
        let far = [Transform::from(cgmath::Vector3::new(60.0, 0.0, 0.0))];

        let mut spawner = TreeSpawner::new(SpawnerConfig::default());
        let close = spawner.place_leaves(&leaves, &trunk, &near, eye);
        let distant = spawner.place_leaves(&leaves, &trunk, &far, eye);
        assert!(close.len() > 150, "{}", close.len());
        assert!(distant.is_empty());
        assert!(close.iter().all(|t| (t.scale.x - leaves.size).abs() < 1e-6));
    }
}
