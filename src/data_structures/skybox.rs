//! Day-night sky.
//!
//! Everything is derived from one cycle time `t` in [0, 1): 0 is midnight, 0.25
//! sunrise, 0.5 noon, 0.75 sunset. The skybox is also the only thing in the
//! engine that knows the time of day. The scene asks it for the active
//! directional light and gets either the sun or the moon.
//!
//! Units: elevation is in half-turns (angle = elevation * PI, so 0.5 is the
//! zenith), azimuth in turns (angle = azimuth * TAU). Light directions point
//! from the surface towards the light.

use std::f32::consts::{PI, TAU};

use cgmath::{InnerSpace, SquareMatrix};

use crate::{
    camera::Camera,
    data_structures::MeshId,
    pipelines::ProgramId,
    render::GraphicsContext,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SkyConfig {
    /// Seconds for one full cycle. Zero pauses [`Skybox::advance`].
    pub day_length_seconds: f32,
    pub initial_time: f32,
    /// Sun elevation above which the sun is the active light.
    pub sun_threshold: f32,
    /// The moon is never lower than this (y of the unit direction).
    pub moon_min_height: f32,
    pub sun_color: [f32; 3],
    pub horizon_color: [f32; 3],
    pub moon_color: [f32; 3],
}

impl Default for SkyConfig {
    fn default() -> Self {
        Self {
            day_length_seconds: 240.0,
            initial_time: 0.35,
            sun_threshold: 0.02,
            moon_min_height: 0.2,
            sun_color: [1.0, 0.96, 0.88],
            horizon_color: [1.0, 0.55, 0.3],
            moon_color: [0.28, 0.34, 0.5],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Skybox {
    pub config: SkyConfig,
    time: f32,
    renderer: Option<(ProgramId, MeshId)>,
}

impl Skybox {
    pub fn new(config: SkyConfig) -> Self {
        let mut sky = Self {
            config,
            time: 0.0,
            renderer: None,
        };
        sky.set_cycle_time(config.initial_time);
        sky
    }

    /// Attaches the sky program and a fullscreen mesh. Without them the skybox
    /// still drives the scene light, it just isn't drawn.
    pub fn with_renderer(mut self, program: ProgramId, fullscreen: MeshId) -> Self {
        self.renderer = Some((program, fullscreen));
        self
    }

    pub fn program(&self) -> Option<ProgramId> {
        self.renderer.map(|(program, _)| program)
    }

    pub fn cycle_time(&self) -> f32 {
        self.time
    }

    /// Wraps any value into [0, 1).
    pub fn set_cycle_time(&mut self, t: f32) {
        let wrapped = if t.is_finite() { t.rem_euclid(1.0) } else { 0.0 };
        // rem_euclid can round up to exactly 1.0 for tiny negative inputs
        self.time = if wrapped >= 1.0 { 0.0 } else { wrapped };
    }

    pub fn advance(&mut self, dt: f32) {
        if self.config.day_length_seconds > 0.0 {
            self.set_cycle_time(self.time + dt / self.config.day_length_seconds);
        }
    }

    /// In half-turns: 0.5 at noon, -0.5 at midnight.
    pub fn sun_elevation(&self) -> f32 {
        ((self.time - 0.25) * TAU).sin() * 0.5
    }

    /// In turns, sweeping east to west over the day.
    pub fn sun_azimuth(&self) -> f32 {
        0.75 - self.time
    }

    pub fn sun_direction(&self) -> cgmath::Vector3<f32> {
        let elevation = self.sun_elevation() * PI;
        let azimuth = self.sun_azimuth() * TAU;
        cgmath::Vector3::new(
            elevation.cos() * azimuth.cos(),
            elevation.sin(),
            elevation.cos() * azimuth.sin(),
        )
    }

    /// Full strength once the sun is well up, a short ramp around the horizon
    /// and dark through the night.
    pub fn sun_intensity(&self) -> f32 {
        let e = self.sun_elevation();
        if e >= 0.1 {
            1.0
        } else if e >= 0.0 {
            0.2 + 0.8 * (e / 0.1)
        } else if e > -0.1 {
            0.2 * (1.0 + e / 0.1)
        } else {
            0.0
        }
    }

    /// Haze: about 2 with a high sun, up to 10 at the horizon.
    pub fn turbidity(&self) -> f32 {
        let height = (self.sun_elevation().abs() / 0.25).min(1.0);
        2.0 + 8.0 * (1.0 - height).powi(2)
    }

    pub fn is_day(&self) -> bool {
        self.sun_elevation() > self.config.sun_threshold
    }

    /// Direction towards the active light.
    pub fn light_direction(&self) -> cgmath::Vector3<f32> {
        let sun = self.sun_direction();
        if self.is_day() {
            return sun;
        }
        let moon = -sun;
        let min = self.config.moon_min_height;
        if moon.y >= min {
            return moon;
        }
        let horizontal = cgmath::Vector2::new(moon.x, moon.z);
        let horizontal = if horizontal.magnitude2() > 0.0 {
            horizontal.normalize()
        } else {
            cgmath::Vector2::new(1.0, 0.0)
        } * (1.0 - min * min).sqrt();
        cgmath::Vector3::new(horizontal.x, min, horizontal.y).normalize()
    }

    /// Colour of the active light, already scaled by its intensity.
    pub fn light_color(&self) -> [f32; 3] {
        if !self.is_day() {
            return self.config.moon_color;
        }
        // warmer as the sun gets close to the horizon
        let warm = (1.0 - self.sun_elevation() / 0.25).clamp(0.0, 1.0);
        let intensity = self.sun_intensity();
        let [s, h] = [self.config.sun_color, self.config.horizon_color];
        [
            (s[0] + (h[0] - s[0]) * warm) * intensity,
            (s[1] + (h[1] - s[1]) * warm) * intensity,
            (s[2] + (h[2] - s[2]) * warm) * intensity,
        ]
    }

    /// Fullscreen pass with the sky program. Must run before any scene
    /// geometry; the program neither writes nor tests depth.
    pub fn draw(&self, ctx: &mut dyn GraphicsContext, camera: &Camera) -> bool {
        let Some((program, mesh)) = self.renderer else {
            return false;
        };
        if !ctx.use_program(program) {
            return false;
        }
        let inverse = camera
            .view_proj()
            .invert()
            .unwrap_or_else(cgmath::Matrix4::identity);
        {
            let mut uniforms = ctx.uniforms();
            uniforms.set("uInvViewProj", inverse);
            uniforms.set("uCameraPos", camera.position());
            uniforms.set("uSunDirection", self.sun_direction());
            uniforms.set("uSunIntensity", self.sun_intensity());
            uniforms.set("uTurbidity", self.turbidity());
        }
        ctx.draw(mesh, None);
        true
    }
}

impl Default for Skybox {
    fn default() -> Self {
        Self::new(SkyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(t: f32) -> Skybox {
        let mut sky = Skybox::default();
        sky.set_cycle_time(t);
        sky
    }

    #[test]
    fn noon_is_zenith_and_sunlit() {
        let sky = at(0.5);
        assert!((sky.sun_elevation() - 0.5).abs() < 1e-6);
        for t in [0.0, 0.1, 0.3, 0.45, 0.55, 0.8] {
            assert!(at(t).sun_elevation() < sky.sun_elevation());
        }
        assert!(sky.is_day());
        let dir = sky.light_direction();
        assert!((dir - sky.sun_direction()).magnitude() < 1e-6);
        assert!(dir.y > 0.99);
    }

    #[test]
    fn night_light_is_moon_above_horizon() {
        for t in [0.0, 0.1, 0.24, 0.76, 0.9] {
            let sky = at(t);
            assert!(!sky.is_day(), "t={t}");
            let dir = sky.light_direction();
            assert!(dir.y >= sky.config.moon_min_height - 1e-5, "t={t} {dir:?}");
            assert!((dir.magnitude() - 1.0).abs() < 1e-5);
            assert_eq!(sky.light_color(), sky.config.moon_color);
        }
    }

    #[test]
    fn cycle_time_wraps() {
        assert!((at(1.25).cycle_time() - 0.25).abs() < 1e-6);
        assert!((at(-0.25).cycle_time() - 0.75).abs() < 1e-6);
        assert_eq!(at(f32::NAN).cycle_time(), 0.0);
        assert!(at(-1e-9).cycle_time() < 1.0);
    }

    #[test]
    fn haze_peaks_at_horizon() {
        assert!(at(0.25).turbidity() > at(0.5).turbidity());
        assert!((at(0.25).turbidity() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn advance_follows_day_length() {
        let mut sky = Skybox::new(SkyConfig {
            day_length_seconds: 100.0,
            initial_time: 0.0,
            ..Default::default()
        });
        sky.advance(25.0);
        assert!((sky.cycle_time() - 0.25).abs() < 1e-6);
        sky.config.day_length_seconds = 0.0;
        sky.advance(25.0);
        assert!((sky.cycle_time() - 0.25).abs() < 1e-6);
    }
}
