//! Camera-facing sprites.

use cgmath::InnerSpace;

use crate::{
    camera::Camera,
    data_structures::{LightId, MeshId, TextureId, material},
    pipelines::ProgramId,
    render::GraphicsContext,
};

/// Sprite sheet playback. Frames are laid out row by row, left to right.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpriteAnimation {
    pub columns: u32,
    pub rows: u32,
    pub frames: u32,
    pub fps: f32,
    elapsed: f32,
}

impl SpriteAnimation {
    pub fn new(columns: u32, rows: u32, fps: f32) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        Self {
            columns,
            rows,
            frames: columns * rows,
            fps,
            elapsed: 0.0,
        }
    }

    /// Uses fewer frames than the sheet has cells.
    pub fn with_frames(mut self, frames: u32) -> Self {
        self.frames = frames.clamp(1, self.columns * self.rows);
        self
    }

    pub fn advance(&mut self, dt: f32) {
        if self.fps > 0.0 {
            // keep elapsed bounded so long sessions don't lose precision
            let period = self.frames as f32 / self.fps;
            self.elapsed = (self.elapsed + dt).rem_euclid(period);
        }
    }

    pub fn frame(&self) -> u32 {
        ((self.elapsed * self.fps) as u32).min(self.frames - 1)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Billboard {
    pub position: cgmath::Vector3<f32>,
    /// Width and height in world units.
    pub size: [f32; 2],
    pub texture: Option<TextureId>,
    pub color: [f32; 3],
    pub alpha_cutoff: f32,
    pub sprite: Option<SpriteAnimation>,
}

impl Billboard {
    pub fn new(position: cgmath::Vector3<f32>, size: [f32; 2]) -> Self {
        Self {
            position,
            size,
            texture: None,
            color: [1.0, 1.0, 1.0],
            alpha_cutoff: 0.05,
            sprite: None,
        }
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn with_sprite(mut self, sprite: SpriteAnimation) -> Self {
        self.sprite = Some(sprite);
        self
    }

    pub fn advance(&mut self, dt: f32) {
        if let Some(sprite) = &mut self.sprite {
            sprite.advance(dt);
        }
    }

    /// `[frame, columns, rows, 0]`; a still image is frame 0 of a 1x1 sheet.
    pub fn sprite_frame(&self) -> [f32; 4] {
        match &self.sprite {
            Some(s) => [s.frame() as f32, s.columns as f32, s.rows as f32, 0.0],
            None => [0.0, 1.0, 1.0, 0.0],
        }
    }

    pub fn draw(
        &self,
        ctx: &mut dyn GraphicsContext,
        program: ProgramId,
        mesh: MeshId,
        camera: &Camera,
    ) -> bool {
        if !ctx.use_program(program) {
            return false;
        }
        let right = camera.right();
        let up = right.cross(camera.forward()).normalize();
        {
            let mut uniforms = ctx.uniforms();
            uniforms.set("uViewProj", camera.view_proj());
            uniforms.set("uCameraPos", camera.position());
            uniforms.set("uCameraRight", right);
            uniforms.set("uCameraUp", up);
            uniforms.set("uBillboardCenter", self.position);
            uniforms.set("uBillboardSize", self.size);
            uniforms.set("uSpriteFrame", self.sprite_frame());
            uniforms.set("uColor", self.color);
            uniforms.set("uAlphaCutoff", self.alpha_cutoff);
        }
        ctx.bind_textures(&[(material::ALBEDO_MAP, self.texture)]);
        ctx.draw(mesh, None);
        true
    }
}

/// A billboard that drives a flickering point light.
#[derive(Clone, Debug, PartialEq)]
pub struct FireBillboard {
    pub billboard: Billboard,
    pub light: Option<LightId>,
    pub base_intensity: f32,
    /// Relative flicker amplitude, 0 for a steady light.
    pub flicker: f32,
    pub phase: f32,
}

impl FireBillboard {
    pub fn new(billboard: Billboard, base_intensity: f32) -> Self {
        Self {
            billboard,
            light: None,
            base_intensity,
            flicker: 0.25,
            phase: 0.0,
        }
    }

    pub fn with_light(mut self, light: LightId) -> Self {
        self.light = Some(light);
        self
    }

    pub fn with_phase(mut self, phase: f32) -> Self {
        self.phase = phase;
        self
    }

    /// Light intensity at scene time `time`. Two detuned sines, so it's
    /// deterministic but doesn't look periodic.
    pub fn intensity_at(&self, time: f32) -> f32 {
        let wobble = 0.6 * (time * 9.1 + self.phase).sin()
            + 0.4 * (time * 23.7 + self.phase * 1.3).sin();
        (self.base_intensity * (1.0 + self.flicker * wobble)).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sprite_frames_loop() {
        let mut sprite = SpriteAnimation::new(4, 2, 8.0);
        assert_eq!(sprite.frames, 8);
        sprite.advance(0.3);
        assert_eq!(sprite.frame(), 2);
        sprite.advance(1.0);
        assert_eq!(sprite.frame(), 2);
        let partial = SpriteAnimation::new(4, 2, 8.0).with_frames(5);
        assert_eq!(partial.frames, 5);
    }

    #[test]
    fn flicker_stays_near_base() {
        let fire = FireBillboard::new(Billboard::new(cgmath::Vector3::new(0.0, 0.0, 0.0), [1.0, 1.0]), 4.0);
        for i in 0..100 {
            let intensity = fire.intensity_at(i as f32 * 0.05);
            assert!((3.0..=5.0).contains(&intensity), "{intensity}");
        }
        assert_eq!(fire.intensity_at(1.5), fire.intensity_at(1.5));
    }
}
