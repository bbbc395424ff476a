//! grove-ngin
//!
//! An embeddable real-time 3D engine built around automatic GPU instancing.
//! Nodes that share a mesh and a material are drawn with one instanced call,
//! the ground is procedural, trees are scattered deterministically in front of
//! the camera and a day-night sky drives the scene's main light.
//!
//! High-level modules
//! - `camera`: first-person camera and the input state that drives it
//! - `context`: the [`context::Engine`] with its resource tables and framebuffer
//! - `data_structures`: meshes, materials, nodes, instance groups, scene, terrain and sky
//! - `pipelines`: program compilation, the uniform binder and the framebuffer
//! - `render`: the [`render::GraphicsContext`] seam and its wgpu implementation
//! - `resources`: async asset loading
//! - `spawner`: tree and leaf placement
//! - `flow`: a bundled winit host
//! - `forest`: the reference scene
//!

pub mod camera;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod forest;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod spawner;

pub use error::{EngineError, EngineResult};

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use wgpu;
pub use winit::event::{DeviceEvent, WindowEvent};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Browser entry point, runs the reference scene on the `canvas` element.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    flow::run(
        "grove",
        context::EngineConfig::default(),
        Box::new(forest::setup),
    )
    .map_err(|e| JsValue::from_str(&e.to_string()))
}
