//! Scene nodes: a transform, simple kinematics and a (mesh, material) pair.

use cgmath::{InnerSpace, Rotation3, Zero};

use crate::data_structures::{
    MaterialId, MeshId,
    instance::{InstanceRaw, Transform},
    instance_group::GroupKey,
};

/// A placed object. Owned by the [`Scene`](crate::data_structures::scene::Scene)
/// that created it.
///
/// The mesh and material are fixed for the node's lifetime: the scene files each
/// node under the instance group for exactly that pair, so swapping either means
/// removing the node and adding a new one.
#[derive(Clone, Debug)]
pub struct Node {
    pub transform: Transform,
    /// Units per second.
    pub linear_velocity: cgmath::Vector3<f32>,
    /// Rotation axis scaled by radians per second.
    pub angular_velocity: cgmath::Vector3<f32>,
    /// Static nodes are skipped by [`Node::integrate`].
    pub is_static: bool,
    mesh: MeshId,
    material: Option<MaterialId>,
}

impl Node {
    pub fn new(mesh: MeshId, material: Option<MaterialId>, transform: Transform) -> Self {
        Self {
            transform,
            linear_velocity: cgmath::Vector3::zero(),
            angular_velocity: cgmath::Vector3::zero(),
            is_static: false,
            mesh,
            material,
        }
    }

    pub fn with_velocity(mut self, linear: cgmath::Vector3<f32>) -> Self {
        self.linear_velocity = linear;
        self
    }

    pub fn with_angular_velocity(mut self, angular: cgmath::Vector3<f32>) -> Self {
        self.angular_velocity = angular;
        self
    }

    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn mesh(&self) -> MeshId {
        self.mesh
    }

    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }

    pub fn key(&self) -> GroupKey {
        GroupKey {
            mesh: self.mesh,
            material: self.material,
        }
    }

    pub fn model_matrix(&self) -> cgmath::Matrix4<f32> {
        self.transform.to_matrix()
    }

    pub fn to_raw(&self) -> InstanceRaw {
        self.transform.to_raw()
    }

    /// Explicit Euler step. Returns whether the transform changed.
    pub fn integrate(&mut self, dt: f32) -> bool {
        if self.is_static || dt <= 0.0 {
            return false;
        }
        let mut moved = false;
        if self.linear_velocity != cgmath::Vector3::zero() {
            self.transform.position += self.linear_velocity * dt;
            moved = true;
        }
        let speed = self.angular_velocity.magnitude();
        if speed > f32::EPSILON {
            let axis = self.angular_velocity / speed;
            let step = cgmath::Quaternion::from_axis_angle(axis, cgmath::Rad(speed * dt));
            self.transform.rotation = (step * self.transform.rotation).normalize();
            moved = true;
        }
        moved
    }
}
