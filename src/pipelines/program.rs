//! Shader programs.
//!
//! A program is a WGSL module with `vs_main`/`fs_main` entry points plus a
//! declared interface: the uniform fields it reads (in block order), the vertex
//! attributes it consumes and the texture slots it samples. Engine code only
//! ever talks to programs through those names.
//!
//! Bindings:
//! - group 0, binding 0: the uniform block, bound with a dynamic offset
//! - group 1, bindings 2i / 2i+1: texture and sampler for texture slot i
//!
//! Vertex attributes have fixed locations, see [`attribute_location`].

use std::num::NonZeroU64;

use crate::{
    data_structures::{
        instance::{INSTANCE_ATTRIBUTES, InstanceRaw},
        material,
        mesh::MeshVertex,
        scene::MAX_POINT_LIGHTS,
        texture::Texture,
    },
    error::{EngineError, EngineResult},
    pipelines::uniform::{UniformLayout, UniformLayoutBuilder},
};

const MESH_ATTRIBUTES: [&str; 5] = ["aPosition", "aTexCoord", "aNormal", "aTangent", "aBitangent"];

/// Shader location of a named vertex input. Mesh attributes take 0..5, the
/// instance matrix columns 5..9.
pub fn attribute_location(name: &str) -> Option<u32> {
    MESH_ATTRIBUTES
        .iter()
        .chain(INSTANCE_ATTRIBUTES.iter())
        .position(|a| *a == name)
        .map(|i| i as u32)
}

/// What a program declares it reads.
#[derive(Clone, Debug, Default)]
pub struct ProgramInterface {
    pub uniforms: UniformLayout,
    pub attributes: Vec<String>,
    pub textures: Vec<String>,
}

impl ProgramInterface {
    /// True when all four instance matrix columns are declared.
    pub fn supports_instancing(&self) -> bool {
        INSTANCE_ATTRIBUTES.iter().all(|a| self.has_attribute(a))
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a == name)
    }

    pub fn texture_slot(&self, name: &str) -> Option<usize> {
        self.textures.iter().position(|t| t == name)
    }
}

/// Which colour target a program renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetFormat {
    /// The engine's offscreen framebuffer.
    Offscreen,
    /// The window surface, used by the post-process blit.
    Surface,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthMode {
    /// Depth test and write.
    Opaque,
    /// Depth test, no write. Blended geometry.
    ReadOnly,
    /// Always passes, never writes. Drawn before everything else.
    Background,
    /// Pass has no depth attachment.
    None,
}

#[derive(Clone, Debug)]
pub struct ProgramDesc {
    pub label: String,
    /// Asset path of the WGSL source.
    pub path: String,
    pub interface: ProgramInterface,
    pub target: TargetFormat,
    pub blend: Option<wgpu::BlendState>,
    pub depth: DepthMode,
    pub cull: Option<wgpu::Face>,
}

fn scene_block() -> UniformLayoutBuilder {
    UniformLayout::builder()
        .mat4("uViewProj")
        .mat4("uModel")
        .vec3("uCameraPos")
        .float("uTime")
        .vec3("uAmbientColor")
        .vec3("uLightDirection")
        .vec3("uLightColor")
        .float("uPointLightCount")
        .vec4_array("uPointLightPositions", MAX_POINT_LIGHTS)
        .vec4_array("uPointLightColors", MAX_POINT_LIGHTS)
        .vec4_array("uPointLightAttenuation", MAX_POINT_LIGHTS)
        .vec3("uFogColor")
        .float("uFogStart")
        .float("uFogEnd")
        .float("uFogDensity")
}

fn material_block(builder: UniformLayoutBuilder) -> UniformLayoutBuilder {
    builder
        .vec3("uColor")
        .vec3("uEmission")
        .float("uRoughness")
        .float("uMetallic")
        .vec2("uTiling")
        .float("uAlphaCutoff")
        .float("uHasNormalMap")
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl ProgramDesc {
    fn new(label: &str, path: &str, interface: ProgramInterface) -> Self {
        Self {
            label: label.to_string(),
            path: path.to_string(),
            interface,
            target: TargetFormat::Offscreen,
            blend: Some(wgpu::BlendState::REPLACE),
            depth: DepthMode::Opaque,
            cull: Some(wgpu::Face::Back),
        }
    }

    /// Instanced, lit, fogged surfaces with the four material maps.
    pub fn lit(path: &str) -> Self {
        let mut attributes = names(&MESH_ATTRIBUTES);
        attributes.extend(names(&INSTANCE_ATTRIBUTES));
        Self::new(
            "lit",
            path,
            ProgramInterface {
                uniforms: material_block(scene_block()).build(),
                attributes,
                textures: names(&[
                    material::ALBEDO_MAP,
                    material::NORMAL_MAP,
                    material::ROUGHNESS_MAP,
                    material::EMISSION_MAP,
                ]),
            },
        )
    }

    /// Same interface as [`ProgramDesc::lit`] without the instance inputs.
    /// Groups drawn with it go through the per-node path.
    pub fn lit_single(path: &str) -> Self {
        let mut desc = Self::lit(path);
        desc.label = "lit_single".to_string();
        desc.interface
            .attributes
            .retain(|a| !INSTANCE_ATTRIBUTES.contains(&a.as_str()));
        desc
    }

    /// Two-sided, alpha-tested leaves.
    pub fn foliage(path: &str) -> Self {
        let mut desc = Self::lit(path);
        desc.label = "foliage".to_string();
        desc.cull = None;
        desc
    }

    pub fn sky(path: &str) -> Self {
        let mut desc = Self::new(
            "sky",
            path,
            ProgramInterface {
                uniforms: UniformLayout::builder()
                    .mat4("uInvViewProj")
                    .vec3("uCameraPos")
                    .vec3("uSunDirection")
                    .float("uSunIntensity")
                    .float("uTurbidity")
                    .vec3("uLightDirection")
                    .vec3("uLightColor")
                    .vec3("uFogColor")
                    .build(),
                attributes: names(&["aPosition"]),
                textures: Vec::new(),
            },
        );
        desc.depth = DepthMode::Background;
        desc.cull = None;
        desc
    }

    /// Camera-facing sprites, alpha blended, optionally animated from a sheet.
    pub fn billboard(path: &str) -> Self {
        let mut desc = Self::new(
            "billboard",
            path,
            ProgramInterface {
                uniforms: scene_block()
                    .vec3("uCameraRight")
                    .vec3("uCameraUp")
                    .vec3("uBillboardCenter")
                    .vec2("uBillboardSize")
                    .vec4("uSpriteFrame")
                    .vec3("uColor")
                    .float("uAlphaCutoff")
                    .build(),
                attributes: names(&["aPosition", "aTexCoord"]),
                textures: names(&[material::ALBEDO_MAP]),
            },
        );
        desc.blend = Some(wgpu::BlendState::ALPHA_BLENDING);
        desc.depth = DepthMode::ReadOnly;
        desc.cull = None;
        desc
    }

    /// Post-process blit of the offscreen framebuffer onto the surface.
    pub fn quad(path: &str) -> Self {
        let mut desc = Self::new(
            "quad",
            path,
            ProgramInterface {
                uniforms: UniformLayout::builder().float("uExposure").build(),
                attributes: names(&["aPosition", "aTexCoord"]),
                textures: names(&["uTexture"]),
            },
        );
        desc.target = TargetFormat::Surface;
        desc.depth = DepthMode::None;
        desc.cull = None;
        desc
    }
}

/// A compiled program.
#[derive(Debug)]
pub struct ShaderProgram {
    pub label: String,
    pub interface: ProgramInterface,
    pub pipeline: wgpu::RenderPipeline,
    pub uniform_layout: wgpu::BindGroupLayout,
    pub texture_layout: Option<wgpu::BindGroupLayout>,
    pub depth: DepthMode,
}

impl ShaderProgram {
    pub fn new(
        device: &wgpu::Device,
        desc: &ProgramDesc,
        source: &str,
        offscreen_format: wgpu::TextureFormat,
        surface_format: wgpu::TextureFormat,
    ) -> EngineResult<Self> {
        for name in &desc.interface.attributes {
            if attribute_location(name).is_none() {
                return Err(EngineError::ShaderCompile {
                    path: desc.path.clone(),
                    message: format!("unknown vertex attribute {name}"),
                });
            }
        }

        let scope = device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&desc.path),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let uniform_size = desc.interface.uniforms.size() as u64;
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some(&format!("{} uniform layout", desc.label)),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(uniform_size),
                },
                count: None,
            }],
        });

        let texture_layout = (!desc.interface.textures.is_empty()).then(|| {
            let entries: Vec<_> = (0..desc.interface.textures.len() as u32)
                .flat_map(|slot| {
                    [
                        wgpu::BindGroupLayoutEntry {
                            binding: slot * 2,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Texture {
                                multisampled: false,
                                view_dimension: wgpu::TextureViewDimension::D2,
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            },
                            count: None,
                        },
                        wgpu::BindGroupLayoutEntry {
                            binding: slot * 2 + 1,
                            visibility: wgpu::ShaderStages::FRAGMENT,
                            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                            count: None,
                        },
                    ]
                })
                .collect();
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&format!("{} texture layout", desc.label)),
                entries: &entries,
            })
        });

        let mut bind_group_layouts = vec![Some(&uniform_layout)];
        if let Some(layout) = &texture_layout {
            bind_group_layouts.push(Some(layout));
        }
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(&format!("{} pipeline layout", desc.label)),
            bind_group_layouts: &bind_group_layouts,
            immediate_size: 0,
        });

        let mesh_attributes: Vec<wgpu::VertexAttribute> = desc
            .interface
            .attributes
            .iter()
            .filter_map(|name| {
                let (offset, format) = MeshVertex::attribute(name)?;
                Some(wgpu::VertexAttribute {
                    offset,
                    format,
                    shader_location: attribute_location(name)?,
                })
            })
            .collect();
        let instance_attributes = InstanceRaw::desc(MESH_ATTRIBUTES.len() as u32);
        let mut buffers = vec![wgpu::VertexBufferLayout {
            array_stride: MeshVertex::STRIDE,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &mesh_attributes,
        }];
        if desc.interface.supports_instancing() {
            buffers.push(wgpu::VertexBufferLayout {
                array_stride: InstanceRaw::STRIDE,
                step_mode: wgpu::VertexStepMode::Instance,
                attributes: &instance_attributes,
            });
        }

        let color_format = match desc.target {
            TargetFormat::Offscreen => offscreen_format,
            TargetFormat::Surface => surface_format,
        };
        let pipeline = mk_render_pipeline(device, &layout, color_format, desc, &buffers, &module);

        let error = pop_validation_scope(scope);
        if let Some(message) = error {
            return Err(EngineError::ShaderCompile {
                path: desc.path.clone(),
                message,
            });
        }
        log::info!("compiled program {} from {}", desc.label, desc.path);

        Ok(Self {
            label: desc.label.clone(),
            interface: desc.interface.clone(),
            pipeline,
            uniform_layout,
            texture_layout,
            depth: desc.depth,
        })
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn pop_validation_scope(scope: wgpu::ErrorScopeGuard) -> Option<String> {
    futures::executor::block_on(scope.pop()).map(|e| e.to_string())
}

// Browsers resolve error scopes asynchronously; errors still reach the
// uncaptured error handler.
#[cfg(target_arch = "wasm32")]
fn pop_validation_scope(scope: wgpu::ErrorScopeGuard) -> Option<String> {
    drop(scope.pop());
    None
}

fn mk_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    color_format: wgpu::TextureFormat,
    desc: &ProgramDesc,
    vertex_layouts: &[wgpu::VertexBufferLayout],
    module: &wgpu::ShaderModule,
) -> wgpu::RenderPipeline {
    let depth_stencil = match desc.depth {
        DepthMode::None => None,
        mode => Some(wgpu::DepthStencilState {
            format: Texture::DEPTH_FORMAT,
            depth_write_enabled: Some(mode == DepthMode::Opaque),
            depth_compare: Some(match mode {
                DepthMode::Background => wgpu::CompareFunction::Always,
                DepthMode::ReadOnly => wgpu::CompareFunction::LessEqual,
                _ => wgpu::CompareFunction::Less,
            }),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        cache: None,
        label: Some(&desc.label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: vertex_layouts,
            compilation_options: Default::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: desc.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: desc.cull,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview_mask: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lit_programs_are_instanced() {
        assert!(ProgramDesc::lit("lit.wgsl").interface.supports_instancing());
        assert!(ProgramDesc::foliage("foliage.wgsl").interface.supports_instancing());
        assert!(!ProgramDesc::lit_single("lit.wgsl").interface.supports_instancing());
        assert!(!ProgramDesc::billboard("billboard.wgsl").interface.supports_instancing());
    }

    #[test]
    fn instance_columns_follow_mesh_attributes() {
        assert_eq!(attribute_location("aPosition"), Some(0));
        assert_eq!(attribute_location("aBitangent"), Some(4));
        assert_eq!(attribute_location("aInstanceMatrix0"), Some(5));
        assert_eq!(attribute_location("aInstanceMatrix3"), Some(8));
        assert_eq!(attribute_location("aColor"), None);
    }

    #[test]
    fn lit_block_has_sixteen_light_slots() {
        let lit = ProgramDesc::lit("lit.wgsl");
        let uniforms = &lit.interface.uniforms;
        assert!(uniforms.contains("uPointLightPositions[15]"));
        assert!(!uniforms.contains("uPointLightPositions[16]"));
        assert_eq!(lit.interface.texture_slot(material::NORMAL_MAP), Some(1));
    }
}
