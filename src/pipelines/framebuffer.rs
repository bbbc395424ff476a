//! The main offscreen render target and the quad that blits it to the screen.
//!
//! The colour target lives in the engine's texture table so the post-process
//! program can bind it like any other texture. On resize the texture behind the
//! handle is replaced in place, the handle itself never changes.

use crate::{
    data_structures::{MeshId, TextureId, arena::Arena, texture::Texture},
    error::{EngineError, EngineResult},
    pipelines::ProgramId,
    render::GraphicsContext,
};

/// Texture slot the quad program samples.
pub const QUAD_TEXTURE: &str = "uTexture";

#[derive(Debug)]
pub struct FrameBuffer {
    color: Option<TextureId>,
    depth: Option<Texture>,
    size: [u32; 2],
    format: wgpu::TextureFormat,
}

impl FrameBuffer {
    pub fn new(
        device: &wgpu::Device,
        textures: &mut Arena<Texture>,
        size: [u32; 2],
        format: wgpu::TextureFormat,
    ) -> EngineResult<Self> {
        let mut framebuffer = Self {
            color: None,
            depth: None,
            size,
            format,
        };
        framebuffer.init(device, textures, size)?;
        Ok(framebuffer)
    }

    /// (Re)allocates both targets at `size`.
    pub fn init(
        &mut self,
        device: &wgpu::Device,
        textures: &mut Arena<Texture>,
        size: [u32; 2],
    ) -> EngineResult<()> {
        let max = device.limits().max_texture_dimension_2d;
        if size[0] == 0 || size[1] == 0 || size[0] > max || size[1] > max {
            return Err(EngineError::FramebufferIncomplete {
                width: size[0],
                height: size[1],
            });
        }

        let color = Texture::create_render_target(device, size, self.format, "main framebuffer");
        match self.color.filter(|id| textures.contains(*id)) {
            Some(id) => {
                textures.replace(id, color);
            }
            None => self.color = Some(textures.insert(color)),
        }
        self.depth = Some(Texture::create_depth_texture(device, size, "main framebuffer depth"));
        self.size = size;
        log::debug!("framebuffer allocated at {}x{}", size[0], size[1]);
        Ok(())
    }

    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        textures: &mut Arena<Texture>,
        size: [u32; 2],
    ) -> EngineResult<()> {
        if size == self.size && self.is_alive() {
            return Ok(());
        }
        self.init(device, textures, size)
    }

    /// Releases both targets. [`FrameBuffer::init`] brings them back.
    pub fn destroy(&mut self, textures: &mut Arena<Texture>) {
        if let Some(id) = self.color.take() {
            textures.remove(id);
        }
        self.depth = None;
    }

    pub fn is_alive(&self) -> bool {
        self.color.is_some() && self.depth.is_some()
    }

    pub fn color(&self) -> Option<TextureId> {
        self.color
    }

    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth.as_ref().map(|depth| &depth.view)
    }

    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Draws the colour target through `quad`. Skipped while destroyed.
    pub fn render(&self, ctx: &mut dyn GraphicsContext, quad: &FullscreenQuad, exposure: f32) -> bool {
        let Some(color) = self.color else {
            return false;
        };
        quad.draw(ctx, exposure, color)
    }
}

/// Post-process program plus the fullscreen triangle pair it runs over.
#[derive(Clone, Copy, Debug)]
pub struct FullscreenQuad {
    pub program: ProgramId,
    pub mesh: MeshId,
}

impl FullscreenQuad {
    pub fn draw(&self, ctx: &mut dyn GraphicsContext, exposure: f32, texture: TextureId) -> bool {
        if !ctx.use_program(self.program) {
            return false;
        }
        ctx.uniforms().set("uExposure", exposure);
        ctx.bind_textures(&[(QUAD_TEXTURE, Some(texture))]);
        ctx.draw(self.mesh, None);
        true
    }
}
