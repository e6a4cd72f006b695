//! Live multi-pass shader renderer for shadelive.
//!
//! ```text
//!   shader file ──▶ ShaderSourceAnalyzer ──▶ ShaderCompiler ──▶ ResourceGenerationManager
//!                      (schema, textures)       (SPIR-V)                 │ publish
//!                                                                        ▼
//!   UniformStore ── pack_for_epoch ──────────────────────────▶ RenderLoopDriver ──▶ surface
//! ```
//!
//! `ResourceGenerationManager` assembles a complete [`ResourceGeneration`]
//! off the render thread and swaps it in atomically with the matching uniform
//! table. `RenderLoopDriver` renders whatever generation is current, either
//! on the display callback (vsync) or on its own thread (free running).
//! Everything GPU specific sits behind [`GpuBackend`]; [`gpu::WgpuBackend`]
//! is the implementation the preview window uses.

mod backend;
mod compile;
mod driver;
mod error;
mod frame;
mod generation;
pub mod gpu;
mod textures;
mod window;

#[cfg(test)]
mod testing;

pub use backend::{GpuBackend, PassLayout, Viewport};
pub use compile::{
    fragment_entry_points, pass_entry_points, BoxedShaderCompiler, ShaderCompiler, ShaderProgram,
    ShellCompiler,
};
pub use driver::{DriverMode, RenderLoopDriver};
pub use error::{BufferAllocationError, CompileError, ReloadError, TextureLoadError};
pub use frame::{FrameStats, FrameUniforms};
pub use generation::{
    GenerationSlot, ReloadObserver, ReloadState, ResourceGeneration, ResourceGenerationManager,
    SharedReloadObserver,
};
pub use textures::{decode_image, load_textures, load_textures_with, TextureBatch, TextureImage};
pub use window::{PreviewConfig, PreviewManager, PreviewWindow};
