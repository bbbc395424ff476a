//! Engine data structures: resources, nodes, instance groups and the scene.
//!
//! - `arena` holds generational handles, used instead of shared pointers
//! - `mesh`, `material` and `texture` are the shared resources nodes reference
//! - `instance` and `node` describe placed objects
//! - `instance_group` batches nodes that share a (mesh, material) pair
//! - `billboard` holds camera-facing sprites, including fires that drive a light
//! - `scene` owns nodes, lights, billboards, fog and the sky
//! - `terrain` and `skybox` are the procedural ground and the day-night sky

pub mod arena;
pub mod billboard;
pub mod instance;
pub mod instance_group;
pub mod material;
pub mod mesh;
pub mod node;
pub mod scene;
pub mod skybox;
pub mod terrain;
pub mod texture;

use arena::Handle;

pub type MeshId = Handle<mesh::Mesh>;
pub type MaterialId = Handle<material::Material>;
pub type TextureId = Handle<texture::Texture>;
pub type NodeId = Handle<node::Node>;
pub type LightId = Handle<scene::PointLight>;
