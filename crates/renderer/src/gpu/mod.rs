//! wgpu implementation of the renderer's GPU seam.
//!
//! - `context` owns instance/device/surface wiring and reconfigures the
//!   swapchain when the window resizes.
//! - `pipeline` holds the layouts, sampler and shared shader modules, and
//!   builds full-screen pipelines for pass and present entry points.
//! - `backend` implements `GpuBackend` on top of both, turning wgpu error
//!   scopes into reload errors.

mod backend;
mod context;
mod pipeline;

pub use backend::{WgpuBackend, WgpuPipeline, WgpuTexture};
pub(crate) use context::GpuContext;
