//! Surface descriptions.
//!
//! A [`Material`] is a bundle of optional texture maps plus scalar parameters.
//! Materials are shared by handle; the scene never merges two materials even if
//! their fields are equal.

use crate::{data_structures::TextureId, pipelines::uniform::UniformBinder};

/// Texture slot names, in binding order.
pub const ALBEDO_MAP: &str = "uAlbedoMap";
pub const NORMAL_MAP: &str = "uNormalMap";
pub const ROUGHNESS_MAP: &str = "uRoughnessMap";
pub const EMISSION_MAP: &str = "uEmissionMap";

#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    /// Linear RGB multiplier for the albedo map.
    pub color: [f32; 3],
    pub emission: [f32; 3],
    pub roughness: f32,
    pub metallic: f32,
    /// UV repeat count, applied before sampling any map.
    pub tiling: [f32; 2],
    /// Fragments with albedo alpha below this are discarded. 0 disables.
    pub alpha_cutoff: f32,
    pub albedo_map: Option<TextureId>,
    pub normal_map: Option<TextureId>,
    pub roughness_map: Option<TextureId>,
    pub emission_map: Option<TextureId>,
}

impl Default for Material {
    fn default() -> Self {
        Self::neutral()
    }
}

impl Material {
    /// White, non-emissive, mid-rough dielectric with no maps.
    pub fn neutral() -> Self {
        Self {
            name: "neutral".to_string(),
            color: [1.0, 1.0, 1.0],
            emission: [0.0, 0.0, 0.0],
            roughness: 0.5,
            metallic: 0.0,
            tiling: [1.0, 1.0],
            alpha_cutoff: 0.0,
            albedo_map: None,
            normal_map: None,
            roughness_map: None,
            emission_map: None,
        }
    }

    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::neutral()
        }
    }

    pub fn with_color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }

    pub fn with_emission(mut self, emission: [f32; 3]) -> Self {
        self.emission = emission;
        self
    }

    pub fn with_roughness(mut self, roughness: f32) -> Self {
        self.roughness = roughness.clamp(0.0, 1.0);
        self
    }

    pub fn with_metallic(mut self, metallic: f32) -> Self {
        self.metallic = metallic.clamp(0.0, 1.0);
        self
    }

    pub fn with_tiling(mut self, u: f32, v: f32) -> Self {
        self.tiling = [u, v];
        self
    }

    pub fn with_alpha_cutoff(mut self, cutoff: f32) -> Self {
        self.alpha_cutoff = cutoff;
        self
    }

    pub fn with_albedo_map(mut self, texture: TextureId) -> Self {
        self.albedo_map = Some(texture);
        self
    }

    pub fn with_normal_map(mut self, texture: TextureId) -> Self {
        self.normal_map = Some(texture);
        self
    }

    pub fn with_roughness_map(mut self, texture: TextureId) -> Self {
        self.roughness_map = Some(texture);
        self
    }

    pub fn with_emission_map(mut self, texture: TextureId) -> Self {
        self.emission_map = Some(texture);
        self
    }

    /// Writes the scalar parameters. Programs that lack a given uniform simply
    /// don't receive it.
    pub fn bind(&self, uniforms: &mut UniformBinder<'_>) {
        uniforms.set("uColor", self.color);
        uniforms.set("uEmission", self.emission);
        uniforms.set("uRoughness", self.roughness);
        uniforms.set("uMetallic", self.metallic);
        uniforms.set("uTiling", self.tiling);
        uniforms.set("uAlphaCutoff", self.alpha_cutoff);
        uniforms.set(
            "uHasNormalMap",
            if self.normal_map.is_some() { 1.0 } else { 0.0 },
        );
    }

    /// Slot name to texture. `None` entries are served by the white fallback.
    pub fn texture_bindings(&self) -> [(&'static str, Option<TextureId>); 4] {
        [
            (ALBEDO_MAP, self.albedo_map),
            (NORMAL_MAP, self.normal_map),
            (ROUGHNESS_MAP, self.roughness_map),
            (EMISSION_MAP, self.emission_map),
        ]
    }
}
