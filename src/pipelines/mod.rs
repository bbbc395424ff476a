//! Programs and the GPU objects built around them.
//!
//! - `uniform` resolves uniform names to offsets and writes them by name
//! - `program` compiles a WGSL module into a pipeline plus its declared interface
//! - `framebuffer` is the offscreen target and the fullscreen post-process quad

pub mod framebuffer;
pub mod program;
pub mod uniform;

pub use program::{ProgramDesc, ProgramInterface, ShaderProgram};

pub type ProgramId = crate::data_structures::arena::Handle<ShaderProgram>;
