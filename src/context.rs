//! The engine: GPU handles, resource tables, the main framebuffer and the
//! per-context caches.
//!
//! A frame looks like this:
//!
//! ```ignore
//! engine.update()?;                             // clear the framebuffer
//! scene.update(dt, &mut engine.input);
//! scene.camera.set_aspect(engine.aspect());
//! let mut frame = engine.begin_frame()?;
//! scene.render(&mut frame);
//! frame.finish();
//! engine.present(&surface_view);                // post-process blit
//! ```

use crate::{
    camera::InputState,
    data_structures::{
        MaterialId, MeshId, TextureId,
        arena::Arena,
        material::Material,
        mesh::{Mesh, MeshData},
        texture::Texture,
    },
    error::{EngineError, EngineResult},
    pipelines::{
        ProgramDesc, ProgramId, ShaderProgram,
        framebuffer::{FrameBuffer, FullscreenQuad},
    },
    render::{FrameEncoder, FrameStats, RenderTarget, ResourceCache},
    resources::{AssetHandles, LoadedAssets, load_string},
};

/// Resource tables. Everything a node, group or draw references lives here.
#[derive(Debug, Default)]
pub struct Resources {
    pub meshes: Arena<Mesh>,
    pub materials: Arena<Material>,
    pub textures: Arena<Texture>,
    pub programs: Arena<ShaderProgram>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Fraction of the device-pixel resolution rendered offscreen, 0.1 to 1.0.
    pub resolution_scale: f32,
    pub clear_color: wgpu::Color,
    pub offscreen_format: wgpu::TextureFormat,
    pub exposure: f32,
    pub quad_shader: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolution_scale: 1.0,
            clear_color: wgpu::Color {
                r: 0.05,
                g: 0.06,
                b: 0.08,
                a: 1.0,
            },
            offscreen_format: wgpu::TextureFormat::Rgba16Float,
            exposure: 1.0,
            quad_shader: "shaders/quad.wgsl".to_string(),
        }
    }
}

pub struct Engine {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface_format: wgpu::TextureFormat,
    pub resources: Resources,
    pub config: EngineConfig,
    /// Forwarded window and device input, consumed by the camera.
    pub input: InputState,
    cache: ResourceCache,
    framebuffer: FrameBuffer,
    quad: FullscreenQuad,
    surface_size: [u32; 2],
    pixel_ratio: f64,
}

impl Engine {
    /// Loads the post-process program and allocates the framebuffer.
    /// `size` is the canvas size in logical pixels.
    pub async fn create(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        size: [u32; 2],
        pixel_ratio: f64,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        let source =
            load_string(&config.quad_shader)
                .await
                .map_err(|e| EngineError::ShaderLoad {
                    path: config.quad_shader.clone(),
                    reason: format!("{e:#}"),
                })?;
        Self::with_quad_source(device, queue, surface_format, size, pixel_ratio, config, &source)
    }

    /// [`Engine::create`] with the post-process source already in hand.
    pub fn with_quad_source(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
        size: [u32; 2],
        pixel_ratio: f64,
        mut config: EngineConfig,
        quad_source: &str,
    ) -> EngineResult<Self> {
        config.resolution_scale = config.resolution_scale.clamp(0.1, 1.0);
        let mut resources = Resources::default();
        let program = ShaderProgram::new(
            &device,
            &ProgramDesc::quad(&config.quad_shader),
            quad_source,
            config.offscreen_format,
            surface_format,
        )?;
        let quad = FullscreenQuad {
            program: resources.programs.insert(program),
            mesh: resources
                .meshes
                .insert(Mesh::upload(&device, MeshData::fullscreen())),
        };
        let target = scaled_size(size, pixel_ratio, config.resolution_scale);
        let framebuffer =
            FrameBuffer::new(&device, &mut resources.textures, target, config.offscreen_format)?;
        log::info!(
            "engine ready, framebuffer {}x{} ({:?})",
            target[0],
            target[1],
            config.offscreen_format
        );

        Ok(Self {
            device,
            queue,
            surface_format,
            resources,
            config,
            input: InputState::default(),
            cache: ResourceCache::new(),
            framebuffer,
            quad,
            surface_size: size,
            pixel_ratio,
        })
    }

    /// Clears the main framebuffer for a new frame. Fails with
    /// [`EngineError::FramebufferIncomplete`] after [`Engine::destroy`] until
    /// [`Engine::init`] runs.
    pub fn update(&mut self) -> EngineResult<()> {
        let frame = self.encoder(Some(self.config.clear_color))?;
        frame.finish();
        Ok(())
    }

    /// Encoder for scene draws into the main framebuffer.
    pub fn begin_frame(&mut self) -> EngineResult<FrameEncoder<'_>> {
        self.encoder(None)
    }

    fn encoder(&mut self, clear: Option<wgpu::Color>) -> EngineResult<FrameEncoder<'_>> {
        let white = self
            .cache
            .default_white(&self.device, &self.queue, &mut self.resources.textures);
        let color = self
            .framebuffer
            .color()
            .and_then(|id| self.resources.textures.get(id))
            .map(|texture| &texture.view);
        let (Some(color), Some(depth)) = (color, self.framebuffer.depth_view()) else {
            let [width, height] = self.framebuffer.size();
            return Err(EngineError::FramebufferIncomplete { width, height });
        };
        Ok(FrameEncoder::new(
            &self.device,
            &self.queue,
            &self.resources,
            &mut self.cache,
            white,
            RenderTarget {
                color,
                depth: Some(depth),
                clear,
            },
        ))
    }

    /// Blits the framebuffer onto `view` through the post-process quad.
    pub fn present(&mut self, view: &wgpu::TextureView) -> FrameStats {
        let white = self
            .cache
            .default_white(&self.device, &self.queue, &mut self.resources.textures);
        let mut frame = FrameEncoder::new(
            &self.device,
            &self.queue,
            &self.resources,
            &mut self.cache,
            white,
            RenderTarget {
                color: view,
                depth: None,
                clear: Some(wgpu::Color::BLACK),
            },
        );
        self.framebuffer
            .render(&mut frame, &self.quad, self.config.exposure);
        frame.finish()
    }

    /// `width`/`height` in logical pixels. Reallocates the framebuffer at the
    /// scaled device-pixel size.
    pub fn resize(&mut self, width: u32, height: u32, pixel_ratio: f64) -> EngineResult<()> {
        self.surface_size = [width, height];
        self.pixel_ratio = pixel_ratio;
        self.reallocate()
    }

    pub fn set_resolution_scale(&mut self, scale: f32) -> EngineResult<()> {
        self.config.resolution_scale = scale.clamp(0.1, 1.0);
        self.reallocate()
    }

    fn reallocate(&mut self) -> EngineResult<()> {
        let target = scaled_size(self.surface_size, self.pixel_ratio, self.config.resolution_scale);
        self.framebuffer
            .resize(&self.device, &mut self.resources.textures, target)?;
        self.cache.invalidate_textures();
        Ok(())
    }

    /// Width over height of the canvas, what the camera projection should use.
    pub fn aspect(&self) -> f32 {
        let [w, h] = self.surface_size;
        w.max(1) as f32 / h.max(1) as f32
    }

    pub fn framebuffer(&self) -> &FrameBuffer {
        &self.framebuffer
    }

    /// The fullscreen mesh the post-process pass uses; the sky can share it.
    pub fn fullscreen_mesh(&self) -> MeshId {
        self.quad.mesh
    }

    /// Releases the framebuffer and the cached GPU objects. Resources added by
    /// the caller stay alive.
    pub fn destroy(&mut self) {
        self.framebuffer.destroy(&mut self.resources.textures);
        self.cache.destroy(&mut self.resources.textures);
        log::debug!("engine GPU state released");
    }

    /// Brings the framebuffer back after [`Engine::destroy`].
    pub fn init(&mut self) -> EngineResult<()> {
        let target = scaled_size(self.surface_size, self.pixel_ratio, self.config.resolution_scale);
        self.framebuffer
            .init(&self.device, &mut self.resources.textures, target)
    }

    pub fn add_mesh(&mut self, data: MeshData) -> MeshId {
        self.resources.meshes.insert(Mesh::upload(&self.device, data))
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.resources.materials.insert(material)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.resources.materials.get_mut(id)
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        self.resources.textures.insert(texture)
    }

    pub fn add_program(&mut self, desc: &ProgramDesc, source: &str) -> EngineResult<ProgramId> {
        let program = ShaderProgram::new(
            &self.device,
            desc,
            source,
            self.config.offscreen_format,
            self.surface_format,
        )?;
        Ok(self.resources.programs.insert(program))
    }

    /// Second half of scene setup: turns loaded CPU data into GPU resources.
    pub fn upload(&mut self, assets: LoadedAssets) -> AssetHandles {
        let mut handles = AssetHandles {
            shaders: assets.shaders,
            ..Default::default()
        };
        for (path, data) in assets.meshes {
            let id = self.add_mesh(data);
            handles.meshes.insert(path, id);
        }
        for (path, (image, options)) in assets.images {
            let texture = Texture::from_image(&self.device, &self.queue, &image, Some(&path), options);
            let id = self.add_texture(texture);
            handles.textures.insert(path, id);
        }
        handles
    }
}

/// Device-pixel size of the offscreen target for a logical canvas size.
pub fn scaled_size(size: [u32; 2], pixel_ratio: f64, scale: f32) -> [u32; 2] {
    let factor = pixel_ratio.max(0.0) * scale.clamp(0.1, 1.0) as f64;
    size.map(|v| ((v as f64 * factor).round() as u32).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_size_applies_pixel_ratio_and_scale() {
        assert_eq!(scaled_size([800, 600], 2.0, 0.5), [800, 600]);
        assert_eq!(scaled_size([800, 600], 1.0, 1.0), [800, 600]);
        assert_eq!(scaled_size([800, 600], 1.0, 0.01), [80, 60]);
        assert_eq!(scaled_size([800, 600], 1.0, 7.0), [800, 600]);
        assert_eq!(scaled_size([0, 0], 1.0, 1.0), [1, 1]);
    }
}
