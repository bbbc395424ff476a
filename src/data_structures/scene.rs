//! The scene: nodes filed into instance groups, lights, billboards, fog and sky.
//!
//! Groups live in a `Vec` in creation order with a side index keyed by
//! [`GroupKey`], so drawing always walks groups in the order they first
//! appeared.

use std::collections::HashMap;

use cgmath::InnerSpace;

use crate::{
    camera::{Camera, InputState},
    data_structures::{
        LightId, MaterialId, MeshId, NodeId,
        arena::Arena,
        billboard::{Billboard, FireBillboard},
        instance::Transform,
        instance_group::{DrawPath, GroupKey, InstanceGroup},
        node::Node,
        skybox::Skybox,
    },
    pipelines::{ProgramId, uniform::UniformBinder},
    render::GraphicsContext,
};

/// Point light slots every lit program declares.
pub const MAX_POINT_LIGHTS: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    pub position: cgmath::Vector3<f32>,
    /// Linear RGB.
    pub color: [f32; 3],
    pub intensity: f32,
    pub constant: f32,
    pub linear: f32,
    pub quadratic: f32,
}

impl PointLight {
    pub fn new(position: cgmath::Vector3<f32>, color: [f32; 3], intensity: f32) -> Self {
        Self {
            position,
            color,
            intensity,
            constant: 1.0,
            linear: 0.09,
            quadratic: 0.032,
        }
    }

    pub fn with_attenuation(mut self, constant: f32, linear: f32, quadratic: f32) -> Self {
        self.constant = constant;
        self.linear = linear;
        self.quadratic = quadratic;
        self
    }

    fn slot(&self) -> LightSlot {
        LightSlot {
            position: [self.position.x, self.position.y, self.position.z, 1.0],
            color: [self.color[0], self.color[1], self.color[2], self.intensity],
            attenuation: [self.constant, self.linear, self.quadratic, 0.0],
        }
    }
}

/// One point light as uploaded. Inactive slots are all zeros.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LightSlot {
    /// xyz, w = 1 when active.
    pub position: [f32; 4],
    /// rgb, w = intensity.
    pub color: [f32; 4],
    /// constant, linear, quadratic.
    pub attenuation: [f32; 4],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Towards the light.
    pub direction: cgmath::Vector3<f32>,
    pub color: [f32; 3],
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: cgmath::Vector3::new(0.3, 0.8, 0.5).normalize(),
            color: [1.0, 0.97, 0.9],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fog {
    pub color: [f32; 3],
    pub start: f32,
    pub end: f32,
    pub density: f32,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            color: [0.62, 0.7, 0.8],
            start: 30.0,
            end: 220.0,
            density: 0.012,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub nodes: usize,
    pub groups: usize,
    pub instances: usize,
    pub lights: usize,
    pub billboards: usize,
}

/// What [`Scene::render`] did, per group in draw order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub sky: bool,
    pub groups: Vec<DrawPath>,
    pub billboards: usize,
}

pub struct Scene {
    pub camera: Camera,
    pub skybox: Option<Skybox>,
    /// Flat ambient term, kept above zero so unlit faces aren't pure black.
    pub ambient: [f32; 3],
    pub fog: Fog,
    /// Used when there is no skybox.
    pub fallback_light: DirectionalLight,
    nodes: Arena<Node>,
    groups: Vec<InstanceGroup>,
    group_index: HashMap<GroupKey, usize>,
    lights: Arena<PointLight>,
    // upload order; arena slots get reused
    light_order: Vec<LightId>,
    billboards: Vec<Billboard>,
    fires: Vec<FireBillboard>,
    program: ProgramId,
    material_programs: HashMap<MaterialId, ProgramId>,
    billboard_renderer: Option<(ProgramId, MeshId)>,
    time: f32,
}

impl Scene {
    /// `program` draws every group that has no material specific program.
    pub fn new(camera: Camera, program: ProgramId) -> Self {
        Self {
            camera,
            skybox: None,
            ambient: [0.18, 0.2, 0.24],
            fog: Fog::default(),
            fallback_light: DirectionalLight::default(),
            nodes: Arena::new(),
            groups: Vec::new(),
            group_index: HashMap::new(),
            lights: Arena::new(),
            light_order: Vec::new(),
            billboards: Vec::new(),
            fires: Vec::new(),
            program,
            material_programs: HashMap::new(),
            billboard_renderer: None,
            time: 0.0,
        }
    }

    pub fn with_skybox(mut self, skybox: Skybox) -> Self {
        self.skybox = Some(skybox);
        self
    }

    pub fn set_program(&mut self, program: ProgramId) {
        self.program = program;
    }

    /// Groups using `material` are drawn with `program` instead of the default.
    pub fn set_material_program(&mut self, material: MaterialId, program: ProgramId) {
        self.material_programs.insert(material, program);
    }

    pub fn set_billboard_renderer(&mut self, program: ProgramId, quad: MeshId) {
        self.billboard_renderer = Some((program, quad));
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn add(&mut self, node: Node) -> NodeId {
        let key = node.key();
        let id = self.nodes.insert(node);
        let index = match self.group_index.get(&key) {
            Some(index) => *index,
            None => {
                self.groups.push(InstanceGroup::new(key));
                let index = self.groups.len() - 1;
                self.group_index.insert(key, index);
                index
            }
        };
        if let Some(node) = self.nodes.get(id) {
            self.groups[index].add_node(id, node);
        }
        id
    }

    /// Removes a node and drops its group once it is empty.
    pub fn remove(&mut self, id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        let key = node.key();
        if let Some(&index) = self.group_index.get(&key) {
            let group = &mut self.groups[index];
            group.remove_node(id, &node);
            if group.is_empty() {
                self.groups.remove(index);
                self.group_index.remove(&key);
                for i in self.group_index.values_mut() {
                    if *i > index {
                        *i -= 1;
                    }
                }
            }
        }
        Some(node)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Mesh and material can't change through this, only state.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// The owning group picks up the change on its next draw.
    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) => {
                node.transform = transform;
                true
            }
            None => false,
        }
    }

    pub fn nodes(&self) -> &Arena<Node> {
        &self.nodes
    }

    pub fn groups(&self) -> &[InstanceGroup] {
        &self.groups
    }

    pub fn group(&self, key: GroupKey) -> Option<&InstanceGroup> {
        self.group_index.get(&key).map(|i| &self.groups[*i])
    }

    pub fn instance_count(&self) -> usize {
        self.groups.iter().map(InstanceGroup::instance_count).sum()
    }

    /// Any number of lights can be registered; the first
    /// [`MAX_POINT_LIGHTS`] still alive, in the order they were added, are
    /// uploaded.
    pub fn add_light(&mut self, light: PointLight) -> LightId {
        if self.lights.len() == MAX_POINT_LIGHTS {
            log::warn!("more than {MAX_POINT_LIGHTS} point lights, the rest are ignored");
        }
        let id = self.lights.insert(light);
        self.light_order.push(id);
        id
    }

    pub fn remove_light(&mut self, id: LightId) -> Option<PointLight> {
        let light = self.lights.remove(id)?;
        self.light_order.retain(|l| *l != id);
        Some(light)
    }

    pub fn light(&self, id: LightId) -> Option<&PointLight> {
        self.lights.get(id)
    }

    pub fn light_mut(&mut self, id: LightId) -> Option<&mut PointLight> {
        self.lights.get_mut(id)
    }

    pub fn add_billboard(&mut self, billboard: Billboard) -> usize {
        self.billboards.push(billboard);
        self.billboards.len() - 1
    }

    pub fn add_fire(&mut self, fire: FireBillboard) -> usize {
        self.fires.push(fire);
        self.fires.len() - 1
    }

    pub fn billboards(&self) -> &[Billboard] {
        &self.billboards
    }

    pub fn fires(&self) -> &[FireBillboard] {
        &self.fires
    }

    /// Always [`MAX_POINT_LIGHTS`] entries.
    pub fn point_light_slots(&self) -> [LightSlot; MAX_POINT_LIGHTS] {
        let mut slots = [LightSlot::default(); MAX_POINT_LIGHTS];
        let active = self.light_order.iter().filter_map(|id| self.lights.get(*id));
        for (slot, light) in slots.iter_mut().zip(active) {
            *slot = light.slot();
        }
        slots
    }

    /// Direction and colour of the sun or moon, or the fallback light.
    pub fn active_light(&self) -> (cgmath::Vector3<f32>, [f32; 3]) {
        match &self.skybox {
            Some(sky) => (sky.light_direction(), sky.light_color()),
            None => (self.fallback_light.direction, self.fallback_light.color),
        }
    }

    /// Per-frame shared uniforms. Writes all light slots, inactive ones as zeros.
    pub fn set_scene_uniforms(&self, uniforms: &mut UniformBinder<'_>) {
        let (direction, color) = self.active_light();
        uniforms.set("uViewProj", self.camera.view_proj());
        uniforms.set("uCameraPos", self.camera.position());
        uniforms.set("uTime", self.time);
        uniforms.set("uAmbientColor", self.ambient);
        uniforms.set("uLightDirection", direction);
        uniforms.set("uLightColor", color);

        uniforms.set(
            "uPointLightCount",
            self.lights.len().min(MAX_POINT_LIGHTS) as f32,
        );
        for (i, slot) in self.point_light_slots().iter().enumerate() {
            uniforms.set_indexed("uPointLightPositions", i, slot.position);
            uniforms.set_indexed("uPointLightColors", i, slot.color);
            uniforms.set_indexed("uPointLightAttenuation", i, slot.attenuation);
        }

        uniforms.set("uFogColor", self.fog.color);
        uniforms.set("uFogStart", self.fog.start);
        uniforms.set("uFogEnd", self.fog.end);
        uniforms.set("uFogDensity", self.fog.density);
    }

    /// Integrates nodes, animates billboards and fires, then moves the camera
    /// and the sky.
    pub fn update(&mut self, dt: f32, input: &mut InputState) {
        self.time += dt;
        for (_, node) in self.nodes.iter_mut() {
            node.integrate(dt);
        }
        for billboard in &mut self.billboards {
            billboard.advance(dt);
        }
        for fire in &mut self.fires {
            fire.billboard.advance(dt);
            if let Some(light) = fire.light.and_then(|id| self.lights.get_mut(id)) {
                light.intensity = fire.intensity_at(self.time);
            }
        }
        self.camera.update(dt, input);
        if let Some(sky) = &mut self.skybox {
            sky.advance(dt);
        }
    }

    fn group_program(&self, key: GroupKey) -> ProgramId {
        key.material
            .and_then(|m| self.material_programs.get(&m).copied())
            .unwrap_or(self.program)
    }

    /// Every program this frame will use, in first-use order.
    fn programs(&self) -> Vec<ProgramId> {
        let mut programs = Vec::new();
        let sky = self.skybox.as_ref().and_then(Skybox::program);
        let groups = self.groups.iter().map(|g| self.group_program(g.key()));
        let billboards = self.billboard_renderer.map(|(p, _)| p);
        for program in sky.into_iter().chain(groups).chain(billboards) {
            if !programs.contains(&program) {
                programs.push(program);
            }
        }
        programs
    }

    /// Sky first, then every instance group, then billboards and fires.
    pub fn render(&mut self, ctx: &mut dyn GraphicsContext) -> RenderSummary {
        for program in self.programs() {
            if ctx.use_program(program) {
                self.set_scene_uniforms(&mut ctx.uniforms());
            }
        }

        let mut summary = RenderSummary::default();
        if let Some(sky) = &self.skybox {
            summary.sky = sky.draw(ctx, &self.camera);
        }

        let view_proj = self.camera.view_proj();
        let camera_pos = self.camera.position();
        let programs: Vec<ProgramId> = self.groups.iter().map(|g| self.group_program(g.key())).collect();
        for (group, program) in self.groups.iter_mut().zip(programs) {
            summary
                .groups
                .push(group.draw_instanced(ctx, program, &self.nodes, view_proj, camera_pos));
        }

        if let Some((program, quad)) = self.billboard_renderer {
            let sprites = self
                .billboards
                .iter()
                .chain(self.fires.iter().map(|f| &f.billboard));
            for billboard in sprites {
                if billboard.draw(ctx, program, quad, &self.camera) {
                    summary.billboards += 1;
                }
            }
        }
        summary
    }

    pub fn stats(&self) -> SceneStats {
        SceneStats {
            nodes: self.nodes.len(),
            groups: self.groups.len(),
            instances: self.instance_count(),
            lights: self.lights.len(),
            billboards: self.billboards.len() + self.fires.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        camera::CameraConfig,
        data_structures::arena::{Handle, RawHandle},
        pipelines::{ProgramDesc, uniform::UniformBlock},
    };

    fn handle<T>(index: u32) -> Handle<T> {
        Handle::from_raw(RawHandle {
            index,
            generation: 0,
        })
    }

    fn scene() -> Scene {
        let camera = Camera::new(
            cgmath::Point3::new(0.0, 2.0, 10.0),
            cgmath::Point3::new(0.0, 0.0, 0.0),
            16.0 / 9.0,
            CameraConfig::default(),
        );
        Scene::new(camera, handle(0))
    }

    fn at(x: f32) -> Transform {
        Transform::from(cgmath::Vector3::new(x, 0.0, 0.0))
    }

    #[test]
    fn nodes_share_groups_by_mesh_and_material() {
        let mut scene = scene();
        let (mesh, other_mesh) = (handle(1), handle(2));
        let material = Some(handle(1));
        for i in 0..10 {
            scene.add(Node::new(mesh, material, at(i as f32)));
        }
        scene.add(Node::new(other_mesh, material, at(0.0)));
        scene.add(Node::new(mesh, None, at(0.0)));

        assert_eq!(scene.groups().len(), 3);
        let key = GroupKey { mesh, material };
        assert_eq!(scene.group(key).map(InstanceGroup::instance_count), Some(10));
        assert_eq!(scene.instance_count(), 12);
    }

    #[test]
    fn removing_last_member_drops_group_and_keeps_order() {
        let mut scene = scene();
        let a = scene.add(Node::new(handle(1), None, at(0.0)));
        let b = scene.add(Node::new(handle(2), None, at(0.0)));
        let c = scene.add(Node::new(handle(3), None, at(0.0)));

        assert!(scene.remove(a).is_some());
        assert!(scene.remove(a).is_none());
        let meshes: Vec<MeshId> = scene.groups().iter().map(|g| g.key().mesh).collect();
        assert_eq!(meshes, vec![handle(2), handle(3)]);
        assert!(scene.group(GroupKey { mesh: handle(3), material: None }).is_some());

        scene.remove(b);
        scene.remove(c);
        assert_eq!(scene.stats(), SceneStats::default());
    }

    #[test]
    fn every_light_slot_is_written() {
        let mut scene = scene();
        scene.add_light(PointLight::new(cgmath::Vector3::new(1.0, 2.0, 3.0), [1.0, 0.5, 0.2], 3.0));
        let layout = ProgramDesc::lit("lit.wgsl").interface.uniforms;
        let mut block = UniformBlock::new(&layout);
        {
            let mut uniforms = UniformBinder::new(&layout, &mut block);
            for i in 0..MAX_POINT_LIGHTS {
                uniforms.set_indexed("uPointLightColors", i, [9.0, 9.0, 9.0, 9.0]);
            }
        }
        scene.set_scene_uniforms(&mut UniformBinder::new(&layout, &mut block));

        assert_eq!(
            block.read_vec4(&layout, "uPointLightCount"),
            Some([1.0, 0.0, 0.0, 0.0])
        );
        assert_eq!(
            block.read_vec4(&layout, "uPointLightColors[0]"),
            Some([1.0, 0.5, 0.2, 3.0])
        );
        for i in 1..MAX_POINT_LIGHTS {
            let name = format!("uPointLightColors[{i}]");
            assert_eq!(block.read_vec4(&layout, &name), Some([0.0; 4]), "{name}");
        }
    }

    #[test]
    fn extra_lights_are_kept_but_not_uploaded() {
        let mut scene = scene();
        let ids: Vec<LightId> = (0..20)
            .map(|i| scene.add_light(PointLight::new(cgmath::Vector3::new(i as f32, 0.0, 0.0), [1.0; 3], 1.0)))
            .collect();
        assert_eq!(scene.stats().lights, 20);
        let slots = scene.point_light_slots();
        assert_eq!(slots.len(), MAX_POINT_LIGHTS);
        assert_eq!(slots[15].position[0], 15.0);
        assert!(scene.light(ids[19]).is_some());
    }

    #[test]
    fn reused_light_slots_upload_in_insertion_order() {
        let mut scene = scene();
        let at = |x: f32| PointLight::new(cgmath::Vector3::new(x, 0.0, 0.0), [1.0; 3], 1.0);
        let first = scene.add_light(at(0.0));
        scene.add_light(at(1.0));
        scene.remove_light(first);
        scene.add_light(at(2.0));
        let slots = scene.point_light_slots();
        assert_eq!(slots[0].position[0], 1.0);
        assert_eq!(slots[1].position[0], 2.0);
        assert_eq!(slots[2], LightSlot::default());
    }

    #[test]
    fn fires_drive_their_light() {
        let mut scene = scene();
        let light = scene.add_light(PointLight::new(cgmath::Vector3::new(0.0, 1.0, 0.0), [1.0, 0.6, 0.2], 2.0));
        let fire = FireBillboard::new(Billboard::new(cgmath::Vector3::new(0.0, 1.0, 0.0), [1.0, 1.5]), 2.0)
            .with_light(light);
        let expected = fire.intensity_at(0.4);
        scene.add_fire(fire);
        scene.update(0.4, &mut InputState::default());
        let intensity = scene.light(light).map(|l| l.intensity).unwrap_or_default();
        assert!((intensity - expected).abs() < 1e-5);
    }

    #[test]
    fn active_light_follows_sky() {
        let mut scene = scene();
        assert_eq!(scene.active_light().0, scene.fallback_light.direction);
        let mut sky = Skybox::default();
        sky.set_cycle_time(0.5);
        scene.skybox = Some(sky);
        assert!(scene.active_light().0.y > 0.99);
    }
}
