#![allow(dead_code)]

use std::collections::HashMap;

use grove_ngin::{
    camera::{Camera, CameraConfig},
    data_structures::{
        MaterialId, MeshId, TextureId,
        arena::{Arena, Handle, RawHandle},
        instance_group::InstanceBuffer,
        material::Material,
    },
    pipelines::{
        ProgramDesc, ProgramId, ProgramInterface,
        uniform::{UniformBinder, UniformBlock, UniformLayout},
    },
    render::GraphicsContext,
};

/// Handle that doesn't point into any real arena. Good enough for meshes,
/// which the recording context never resolves.
pub(crate) fn handle<T>(index: u32) -> Handle<T> {
    Handle::from_raw(RawHandle {
        index,
        generation: 0,
    })
}

pub(crate) fn camera() -> Camera {
    Camera::new(
        cgmath::Point3::new(0.0, 2.0, 12.0),
        cgmath::Point3::new(0.0, 1.0, 0.0),
        16.0 / 9.0,
        CameraConfig::default(),
    )
}

/// One draw as the GPU would have seen it.
#[derive(Clone, Debug)]
pub(crate) struct RecordedDraw {
    pub(crate) program: ProgramId,
    pub(crate) label: String,
    pub(crate) mesh: MeshId,
    /// `None` for draws without instance data.
    pub(crate) instances: Option<usize>,
    pub(crate) textures: HashMap<String, TextureId>,
    pub(crate) uniforms: UniformBlock,
}

impl RecordedDraw {
    pub(crate) fn read(&self, layout: &UniformLayout, name: &str) -> Option<[f32; 4]> {
        self.uniforms.read_vec4(layout, name)
    }
}

/// [`GraphicsContext`] that records draws instead of encoding them. Uniform
/// blocks persist per program, the same way they do in the frame encoder.
#[derive(Default)]
pub(crate) struct RecordingContext {
    programs: HashMap<ProgramId, (String, ProgramInterface)>,
    next_program: u32,
    pub(crate) materials: Arena<Material>,
    blocks: HashMap<ProgramId, UniformBlock>,
    current: Option<ProgramId>,
    bound: HashMap<String, TextureId>,
    empty_layout: UniformLayout,
    empty_block: Option<UniformBlock>,
    pub(crate) draws: Vec<RecordedDraw>,
    pub(crate) uploads: usize,
}

impl RecordingContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_program(&mut self, desc: &ProgramDesc) -> ProgramId {
        let id = handle(self.next_program);
        self.next_program += 1;
        self.programs
            .insert(id, (desc.label.clone(), desc.interface.clone()));
        id
    }

    pub(crate) fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.insert(material)
    }

    pub(crate) fn layout(&self, program: ProgramId) -> &UniformLayout {
        &self.programs[&program].1.uniforms
    }

    pub(crate) fn labels(&self) -> Vec<&str> {
        self.draws.iter().map(|d| d.label.as_str()).collect()
    }

    pub(crate) fn draws_of(&self, program: ProgramId) -> impl Iterator<Item = &RecordedDraw> {
        self.draws.iter().filter(move |d| d.program == program)
    }

    pub(crate) fn clear(&mut self) {
        self.draws.clear();
    }
}

impl GraphicsContext for RecordingContext {
    fn use_program(&mut self, program: ProgramId) -> bool {
        let known = self.programs.contains_key(&program);
        self.current = known.then_some(program);
        known
    }

    fn interface(&self) -> Option<&ProgramInterface> {
        self.current
            .and_then(|id| self.programs.get(&id))
            .map(|(_, interface)| interface)
    }

    fn uniforms(&mut self) -> UniformBinder<'_> {
        match self.current.and_then(|id| self.programs.get(&id).map(|p| (id, p))) {
            Some((id, (_, interface))) => {
                let layout = &interface.uniforms;
                let block = self
                    .blocks
                    .entry(id)
                    .or_insert_with(|| UniformBlock::new(layout));
                UniformBinder::new(layout, block)
            }
            None => {
                let block = self
                    .empty_block
                    .get_or_insert_with(|| UniformBlock::new(&self.empty_layout));
                UniformBinder::new(&self.empty_layout, block)
            }
        }
    }

    fn material(&self, id: MaterialId) -> Option<Material> {
        self.materials.get(id).cloned()
    }

    fn bind_textures(&mut self, bindings: &[(&str, Option<TextureId>)]) {
        for (slot, texture) in bindings {
            match texture {
                Some(id) => {
                    self.bound.insert(slot.to_string(), *id);
                }
                None => {
                    self.bound.remove(*slot);
                }
            }
        }
    }

    fn upload_instances(&mut self, instances: &mut InstanceBuffer) {
        if instances.is_dirty() {
            self.uploads += 1;
        }
        instances.mark_clean();
    }

    fn draw(&mut self, mesh: MeshId, instances: Option<&InstanceBuffer>) {
        let Some(id) = self.current else {
            return;
        };
        let (label, interface) = &self.programs[&id];
        let uniforms = self
            .blocks
            .entry(id)
            .or_insert_with(|| UniformBlock::new(&interface.uniforms))
            .clone();
        let textures = interface
            .textures
            .iter()
            .filter_map(|slot| self.bound.get(slot).map(|t| (slot.clone(), *t)))
            .collect();
        self.draws.push(RecordedDraw {
            program: id,
            label: label.clone(),
            mesh,
            instances: instances.map(InstanceBuffer::len),
            textures,
            uniforms,
        });
    }
}

/// Headless device for the GPU tests. `None` when the machine has no adapter.
#[cfg(feature = "integration-tests")]
pub(crate) fn headless_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    futures::executor::block_on(async {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::new_without_display_handle());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions::default())
            .await
            .ok()?;
        adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .ok()
    })
}
