//! Draw submission.
//!
//! Scene code never touches wgpu directly. It talks to a [`GraphicsContext`],
//! which follows the classic bind, set uniforms, draw sequence:
//!
//! 1. [`GraphicsContext::use_program`] makes a program current
//! 2. [`GraphicsContext::uniforms`] writes into that program's uniform block by name
//! 3. [`GraphicsContext::bind_textures`] assigns textures to named slots
//! 4. [`GraphicsContext::draw`] snapshots the current state and records a draw
//!
//! [`FrameEncoder`] is the wgpu implementation. Every draw copies the program's
//! uniform block into a per-frame ring buffer and is replayed with a dynamic
//! offset when the frame is finished, so later uniform writes never clobber
//! earlier draws.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::{
    context::Resources,
    data_structures::{
        MaterialId, MeshId, TextureId,
        arena::Arena,
        instance::{InstanceRaw, Transform},
        instance_group::InstanceBuffer,
        material::Material,
        texture::Texture,
    },
    pipelines::{
        ProgramId, ProgramInterface,
        uniform::{UniformBinder, UniformBlock, UniformLayout},
    },
};

pub trait GraphicsContext {
    /// Makes `program` current. Returns `false` for unknown programs, in which
    /// case following draws are dropped until another program is used.
    fn use_program(&mut self, program: ProgramId) -> bool;

    /// Interface of the current program.
    fn interface(&self) -> Option<&ProgramInterface>;

    /// Uniform writer for the current program. Writes to names the program does
    /// not declare are ignored.
    fn uniforms(&mut self) -> UniformBinder<'_>;

    fn material(&self, id: MaterialId) -> Option<Material>;

    /// Binds textures to named slots. `None` unbinds the slot, which then
    /// samples the default white texture.
    fn bind_textures(&mut self, bindings: &[(&str, Option<TextureId>)]);

    /// Makes sure the GPU copy of `instances` is current.
    fn upload_instances(&mut self, instances: &mut InstanceBuffer);

    /// Draws `mesh` with the current program state. With `instances` the
    /// draw covers every instance in the buffer.
    fn draw(&mut self, mesh: MeshId, instances: Option<&InstanceBuffer>);
}

/// Engine-owned GPU objects that outlive a single frame.
#[derive(Debug, Default)]
pub struct ResourceCache {
    default_white: Option<TextureId>,
    uniform_ring: Option<wgpu::Buffer>,
    uniform_groups: HashMap<ProgramId, wgpu::BindGroup>,
    texture_groups: HashMap<(ProgramId, Vec<TextureId>), wgpu::BindGroup>,
    identity_instance: Option<wgpu::Buffer>,
}

impl ResourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The 1x1 white texture, created on first use.
    pub fn default_white(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        textures: &mut Arena<Texture>,
    ) -> TextureId {
        if let Some(id) = self.default_white.filter(|id| textures.contains(*id)) {
            return id;
        }
        let id = textures.insert(Texture::create_solid(
            device,
            queue,
            [255, 255, 255, 255],
            "default white",
        ));
        self.default_white = Some(id);
        id
    }

    pub fn has_default_white(&self) -> bool {
        self.default_white.is_some()
    }

    /// Drops texture bind groups. Needed whenever a texture behind an existing
    /// handle is replaced, e.g. the framebuffer colour target on resize.
    pub fn invalidate_textures(&mut self) {
        self.texture_groups.clear();
    }

    /// Releases everything, including the default white texture.
    pub fn destroy(&mut self, textures: &mut Arena<Texture>) {
        if let Some(id) = self.default_white.take() {
            textures.remove(id);
        }
        self.uniform_ring = None;
        self.uniform_groups.clear();
        self.texture_groups.clear();
        self.identity_instance = None;
    }

    fn identity_instance(&mut self, device: &wgpu::Device) -> wgpu::Buffer {
        self.identity_instance
            .get_or_insert_with(|| {
                device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("identity instance"),
                    contents: bytemuck::cast_slice(&[Transform::new().to_raw()]),
                    usage: wgpu::BufferUsages::VERTEX,
                })
            })
            .clone()
    }
}

/// Where a [`FrameEncoder`] renders to.
pub struct RenderTarget<'a> {
    pub color: &'a wgpu::TextureView,
    pub depth: Option<&'a wgpu::TextureView>,
    /// Clear colour, or `None` to keep what is already there.
    pub clear: Option<wgpu::Color>,
}

/// Counters for one finished frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: usize,
    pub instances: usize,
}

struct PendingDraw {
    program: ProgramId,
    mesh: MeshId,
    uniform_offset: u32,
    textures: Vec<TextureId>,
    instances: Option<(wgpu::Buffer, u32)>,
}

pub struct FrameEncoder<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    resources: &'a Resources,
    cache: &'a mut ResourceCache,
    target: RenderTarget<'a>,
    white: TextureId,
    alignment: usize,
    current: Option<ProgramId>,
    blocks: HashMap<ProgramId, UniformBlock>,
    bound: HashMap<String, TextureId>,
    empty_layout: UniformLayout,
    empty_block: UniformBlock,
    staging: Vec<u8>,
    draws: Vec<PendingDraw>,
}

impl<'a> FrameEncoder<'a> {
    /// `white` must be a live texture, see [`ResourceCache::default_white`].
    pub fn new(
        device: &'a wgpu::Device,
        queue: &'a wgpu::Queue,
        resources: &'a Resources,
        cache: &'a mut ResourceCache,
        white: TextureId,
        target: RenderTarget<'a>,
    ) -> Self {
        let empty_layout = UniformLayout::default();
        let empty_block = UniformBlock::new(&empty_layout);
        Self {
            device,
            queue,
            resources,
            cache,
            target,
            white,
            alignment: device.limits().min_uniform_buffer_offset_alignment.max(16) as usize,
            current: None,
            blocks: HashMap::new(),
            bound: HashMap::new(),
            empty_layout,
            empty_block,
            staging: Vec::new(),
            draws: Vec::new(),
        }
    }

    /// Writes the uniform ring, builds missing bind groups and encodes one
    /// render pass with every recorded draw.
    pub fn finish(self) -> FrameStats {
        let Self {
            device,
            queue,
            resources,
            cache,
            target,
            staging,
            draws,
            ..
        } = self;

        if !staging.is_empty() {
            let needed = staging.len() as wgpu::BufferAddress;
            let too_small = cache
                .uniform_ring
                .as_ref()
                .is_none_or(|ring| ring.size() < needed);
            if too_small {
                let size = needed.next_power_of_two().max(64 * 1024);
                log::debug!("growing uniform ring to {size} bytes");
                cache.uniform_ring = Some(device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("uniform ring"),
                    size,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }));
                cache.uniform_groups.clear();
            }
            if let Some(ring) = &cache.uniform_ring {
                queue.write_buffer(ring, 0, &staging);
            }
        }

        for draw in &draws {
            let Some(program) = resources.programs.get(draw.program) else {
                continue;
            };
            if let Some(ring) = &cache.uniform_ring {
                cache.uniform_groups.entry(draw.program).or_insert_with(|| {
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(&format!("{} uniforms", program.label)),
                        layout: &program.uniform_layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: ring,
                                offset: 0,
                                size: std::num::NonZeroU64::new(
                                    program.interface.uniforms.size() as u64,
                                ),
                            }),
                        }],
                    })
                });
            }
            if let Some(layout) = &program.texture_layout {
                let key = (draw.program, draw.textures.clone());
                if !cache.texture_groups.contains_key(&key) {
                    let textures: Vec<&Texture> = draw
                        .textures
                        .iter()
                        .filter_map(|id| resources.textures.get(*id))
                        .collect();
                    let entries: Vec<wgpu::BindGroupEntry> = textures
                        .iter()
                        .enumerate()
                        .flat_map(|(slot, texture)| {
                            [
                                wgpu::BindGroupEntry {
                                    binding: slot as u32 * 2,
                                    resource: wgpu::BindingResource::TextureView(&texture.view),
                                },
                                wgpu::BindGroupEntry {
                                    binding: slot as u32 * 2 + 1,
                                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                                },
                            ]
                        })
                        .collect();
                    let group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(&format!("{} textures", program.label)),
                        layout,
                        entries: &entries,
                    });
                    cache.texture_groups.insert(key, group);
                }
            }
        }

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        let mut stats = FrameStats::default();
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.color,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: match target.clear {
                            Some(color) => wgpu::LoadOp::Clear(color),
                            None => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: target.depth.map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: if target.clear.is_some() {
                                wgpu::LoadOp::Clear(1.0)
                            } else {
                                wgpu::LoadOp::Load
                            },
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            for draw in &draws {
                let (Some(program), Some(mesh), Some(uniforms)) = (
                    resources.programs.get(draw.program),
                    resources.meshes.get(draw.mesh),
                    cache.uniform_groups.get(&draw.program),
                ) else {
                    continue;
                };
                pass.set_pipeline(&program.pipeline);
                pass.set_bind_group(0, uniforms, &[draw.uniform_offset]);
                if program.texture_layout.is_some() {
                    let key = (draw.program, draw.textures.clone());
                    if let Some(group) = cache.texture_groups.get(&key) {
                        pass.set_bind_group(1, group, &[]);
                    }
                }
                pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                let count = match &draw.instances {
                    Some((buffer, count)) => {
                        pass.set_vertex_buffer(1, buffer.slice(..));
                        *count
                    }
                    None => 1,
                };
                pass.set_index_buffer(mesh.index_buffer.slice(..), mesh.index_format);
                pass.draw_indexed(0..mesh.num_elements, 0, 0..count);
                stats.draw_calls += 1;
                stats.instances += count as usize;
            }
        }
        queue.submit(std::iter::once(encoder.finish()));
        stats
    }

    fn current_program(&self) -> Option<(ProgramId, &'a crate::pipelines::ShaderProgram)> {
        let resources = self.resources;
        let id = self.current?;
        resources.programs.get(id).map(|program| (id, program))
    }
}

impl GraphicsContext for FrameEncoder<'_> {
    fn use_program(&mut self, program: ProgramId) -> bool {
        if self.resources.programs.contains(program) {
            self.current = Some(program);
            true
        } else {
            log::warn!("use_program with unknown program {program:?}");
            self.current = None;
            false
        }
    }

    fn interface(&self) -> Option<&ProgramInterface> {
        self.current_program().map(|(_, program)| &program.interface)
    }

    fn uniforms(&mut self) -> UniformBinder<'_> {
        match self.current_program() {
            Some((id, program)) => {
                let layout = &program.interface.uniforms;
                let block = self
                    .blocks
                    .entry(id)
                    .or_insert_with(|| UniformBlock::new(layout));
                UniformBinder::new(layout, block)
            }
            None => UniformBinder::new(&self.empty_layout, &mut self.empty_block),
        }
    }

    fn material(&self, id: MaterialId) -> Option<Material> {
        self.resources.materials.get(id).cloned()
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
        if instances.is_empty() {
            return;
        }
        let needed = instances.byte_len();
        let fits = instances.gpu().is_some_and(|buffer| buffer.size() >= needed);
        if !fits {
            let buffer = self
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Instance Buffer"),
                    contents: bytemuck::cast_slice(instances.as_slice()),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                });
            instances.set_gpu(buffer);
        } else if instances.is_dirty() {
            if let Some(buffer) = instances.gpu() {
                self.queue
                    .write_buffer(buffer, 0, bytemuck::cast_slice(instances.as_slice()));
            }
        }
        instances.mark_clean();
    }

    fn draw(&mut self, mesh: MeshId, instances: Option<&InstanceBuffer>) {
        let Some((id, program)) = self.current_program() else {
            log::debug!("draw of {mesh:?} without a program");
            return;
        };
        if !self.resources.meshes.contains(mesh) {
            log::warn!("draw with unknown mesh {mesh:?}");
            return;
        }

        let uniform_offset = self.staging.len();
        let layout = &program.interface.uniforms;
        let block = self
            .blocks
            .entry(id)
            .or_insert_with(|| UniformBlock::new(layout));
        self.staging.extend_from_slice(block.bytes());
        self.staging
            .resize(self.staging.len().next_multiple_of(self.alignment), 0);

        let textures = program
            .interface
            .textures
            .iter()
            .map(|slot| {
                self.bound
                    .get(slot)
                    .copied()
                    .filter(|t| self.resources.textures.contains(*t))
                    .unwrap_or(self.white)
            })
            .collect();

        let instances = if program.interface.supports_instancing() {
            match instances.and_then(|buf| buf.gpu().map(|gpu| (gpu.clone(), buf.len() as u32))) {
                Some(instanced) => Some(instanced),
                None => Some((self.cache.identity_instance(self.device), 1)),
            }
        } else {
            None
        };

        self.draws.push(PendingDraw {
            program: id,
            mesh,
            uniform_offset: uniform_offset as u32,
            textures,
            instances,
        });
    }
}
