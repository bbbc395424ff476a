//! Setup-fatal errors.
//!
//! Everything in here aborts scene construction. Soft-missing uniforms and
//! textures never show up as errors; they are substituted silently by the
//! uniform binder and the default texture cache.

use crate::data_structures::arena::RawHandle;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no compatible graphics adapter: {0}")]
    AdapterUnavailable(String),
    #[error("failed to create device: {0}")]
    DeviceUnavailable(String),
    #[error("shader {path} could not be loaded: {reason}")]
    ShaderLoad { path: String, reason: String },
    #[error("shader {path} failed to compile: {message}")]
    ShaderCompile { path: String, message: String },
    #[error("framebuffer {width}x{height} is incomplete")]
    FramebufferIncomplete { width: u32, height: u32 },
    #[error("mesh {path} could not be loaded: {reason}")]
    MeshLoad { path: String, reason: String },
    #[error("texture {path} could not be loaded: {reason}")]
    TextureLoad { path: String, reason: String },
    #[error("asset {0} was not part of the loaded manifest")]
    MissingAsset(String),
    #[error("stale or unknown {kind} handle {handle:?}")]
    UnknownResource { kind: &'static str, handle: RawHandle },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
