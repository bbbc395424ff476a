//! Batches of nodes that share one mesh and one material.
//!
//! A group owns the per-instance buffer for its members and turns the whole
//! batch into a single instanced draw. Programs that don't declare the
//! `aInstanceMatrix0..3` inputs still render correctly through a slower
//! per-node loop that feeds `uModel` instead.

use crate::{
    data_structures::{
        MaterialId, MeshId, NodeId,
        arena::Arena,
        instance::InstanceRaw,
        material::Material,
        node::Node,
    },
    pipelines::ProgramId,
    render::GraphicsContext,
};

/// Identity of a group. Built from arena handles, so two materials with equal
/// fields still end up in different groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub mesh: MeshId,
    pub material: Option<MaterialId>,
}

/// CPU copy of the model matrices plus the GPU buffer they were last uploaded to.
#[derive(Debug, Default)]
pub struct InstanceBuffer {
    raw: Vec<InstanceRaw>,
    dirty: bool,
    gpu: Option<wgpu::Buffer>,
}

impl InstanceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the contents. Only an actual change marks the buffer for upload.
    pub fn rebuild(&mut self, instances: impl Iterator<Item = InstanceRaw>) {
        let next: Vec<InstanceRaw> = instances.collect();
        if next != self.raw {
            self.raw = next;
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn as_slice(&self) -> &[InstanceRaw] {
        &self.raw
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn gpu(&self) -> Option<&wgpu::Buffer> {
        self.gpu.as_ref()
    }

    /// Size in bytes the GPU buffer needs for the current contents.
    pub fn byte_len(&self) -> wgpu::BufferAddress {
        self.raw.len() as wgpu::BufferAddress * InstanceRaw::STRIDE
    }

    pub fn set_gpu(&mut self, buffer: wgpu::Buffer) {
        self.gpu = Some(buffer);
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }
}

/// Which of the two draw paths a group took in a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawPath {
    Instanced,
    PerNode(usize),
    Skipped,
}

#[derive(Debug)]
pub struct InstanceGroup {
    key: GroupKey,
    nodes: Vec<NodeId>,
    buffer: InstanceBuffer,
    warned_fallback: bool,
}

impl InstanceGroup {
    pub fn new(key: GroupKey) -> Self {
        Self {
            key,
            nodes: Vec::new(),
            buffer: InstanceBuffer::new(),
            warned_fallback: false,
        }
    }

    pub fn key(&self) -> GroupKey {
        self.key
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Panics if the node belongs to a different (mesh, material) pair.
    pub fn add_node(&mut self, id: NodeId, node: &Node) {
        assert_eq!(
            node.key(),
            self.key,
            "node {id:?} does not belong in instance group {:?}",
            self.key
        );
        self.nodes.push(id);
    }

    /// Panics on a key mismatch. Returns whether the node was a member.
    pub fn remove_node(&mut self, id: NodeId, node: &Node) -> bool {
        assert_eq!(
            node.key(),
            self.key,
            "node {id:?} cannot be removed from instance group {:?}",
            self.key
        );
        match self.nodes.iter().position(|n| *n == id) {
            Some(i) => {
                self.nodes.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn instances(&self) -> &InstanceBuffer {
        &self.buffer
    }

    /// Draws every member. Shared uniforms (lights, fog, ...) must already be
    /// set on `program`.
    pub fn draw_instanced(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        program: ProgramId,
        nodes: &Arena<Node>,
        view_proj: cgmath::Matrix4<f32>,
        camera_pos: cgmath::Point3<f32>,
    ) -> DrawPath {
        self.buffer
            .rebuild(self.nodes.iter().filter_map(|id| nodes.get(*id)).map(Node::to_raw));
        if self.buffer.is_empty() {
            log::debug!("instance group {:?} has nothing to draw", self.key);
            return DrawPath::Skipped;
        }
        if !ctx.use_program(program) {
            return DrawPath::Skipped;
        }

        let material = self
            .key
            .material
            .and_then(|id| ctx.material(id))
            .unwrap_or_else(Material::neutral);
        {
            let mut uniforms = ctx.uniforms();
            uniforms.set("uViewProj", view_proj);
            uniforms.set("uCameraPos", camera_pos);
            material.bind(&mut uniforms);
        }
        ctx.bind_textures(&material.texture_bindings());

        let instanced = ctx
            .interface()
            .is_some_and(|interface| interface.supports_instancing());
        if instanced {
            ctx.upload_instances(&mut self.buffer);
            ctx.draw(self.key.mesh, Some(&self.buffer));
            return DrawPath::Instanced;
        }

        if !self.warned_fallback {
            log::warn!(
                "program {program:?} has no instancing inputs, drawing {} nodes of {:?} one by one",
                self.buffer.len(),
                self.key
            );
            self.warned_fallback = true;
        }
        for raw in self.buffer.as_slice() {
            ctx.uniforms()
                .set("uModel", crate::pipelines::uniform::UniformValue::Mat4(raw.model));
            ctx.draw(self.key.mesh, None);
        }
        DrawPath::PerNode(self.buffer.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{
        arena::{Handle, RawHandle},
        instance::Transform,
    };

    fn handle<T>(index: u32) -> Handle<T> {
        Handle::from_raw(RawHandle {
            index,
            generation: 0,
        })
    }

    fn key(mesh: u32, material: u32) -> GroupKey {
        GroupKey {
            mesh: handle(mesh),
            material: Some(handle(material)),
        }
    }

    #[test]
    fn members_are_added_and_removed() {
        let k = key(0, 0);
        let node = Node::new(k.mesh, k.material, Transform::new());
        let mut group = InstanceGroup::new(k);
        group.add_node(handle(1), &node);
        group.add_node(handle(2), &node);
        assert!(group.remove_node(handle(1), &node));
        assert!(!group.remove_node(handle(1), &node));
        assert_eq!(group.nodes(), &[handle(2)]);
    }

    #[test]
    #[should_panic(expected = "does not belong")]
    fn mismatched_node_panics() {
        let mut group = InstanceGroup::new(key(0, 0));
        let stranger = Node::new(handle(0), Some(handle(1)), Transform::new());
        group.add_node(handle(1), &stranger);
    }

    #[test]
    fn unchanged_contents_stay_clean() {
        let mut buffer = InstanceBuffer::new();
        let raw = Transform::new().to_raw();
        buffer.rebuild(std::iter::once(raw));
        assert!(buffer.is_dirty());
        buffer.mark_clean();
        buffer.rebuild(std::iter::once(raw));
        assert!(!buffer.is_dirty());
        assert_eq!(buffer.byte_len(), InstanceRaw::STRIDE);
    }
}
