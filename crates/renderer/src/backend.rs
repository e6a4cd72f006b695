//! The GPU operations the reload pipeline and render loop need.
//!
//! Binding contract seen by user passes:
//!
//! ```text
//!   group 0  binding 0            frame uniforms (resolution, time, frame, date)
//!            binding 1            user uniforms (packed by the uniform store)
//!   group 1  binding 0            sampler
//!            binding 1..=P        pass targets 0..P (unwritten ones are a 1x1 placeholder)
//!            binding P+1..        texture assets in declaration order
//! ```
//!
//! The present pipeline uses group 1 binding 0 (sampler) and binding 1 (the
//! last pass target).

use crate::compile::ShaderProgram;
use crate::error::{BufferAllocationError, CompileError};
use crate::textures::TextureImage;

/// Pass target size in physical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }
}

/// Shape of group 1 for a user pass pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassLayout {
    pub pass_count: usize,
    pub texture_count: usize,
}

impl PassLayout {
    /// Number of texture bindings after the sampler.
    pub fn input_count(&self) -> usize {
        self.pass_count + self.texture_count
    }
}

pub trait GpuBackend: Send + Sync + 'static {
    type Module: Send + Sync + 'static;
    type Pipeline: Send + Sync + 'static;
    type Texture: Send + Sync + 'static;
    type Buffer: Send + Sync + 'static;
    type Bindings: Send + Sync + 'static;
    type Encoder;
    /// Presentation target handed to the render loop by the display callback.
    type Surface;

    fn create_module(&self, program: &ShaderProgram) -> Result<Self::Module, CompileError>;

    fn create_pass_pipeline(
        &self,
        module: &Self::Module,
        entry_point: &str,
        layout: PassLayout,
    ) -> Result<Self::Pipeline, CompileError>;

    fn create_present_pipeline(&self) -> Result<Self::Pipeline, CompileError>;

    fn create_render_target(
        &self,
        viewport: Viewport,
        label: &str,
    ) -> Result<Self::Texture, BufferAllocationError>;

    /// 1x1 texture bound wherever a pass must not read a target.
    fn create_placeholder(&self) -> Result<Self::Texture, BufferAllocationError>;

    fn upload_texture(&self, image: &TextureImage) -> Result<Self::Texture, BufferAllocationError>;

    fn create_uniform_buffer(
        &self,
        size: u64,
        label: &str,
    ) -> Result<Self::Buffer, BufferAllocationError>;

    fn write_buffer(&self, buffer: &Self::Buffer, bytes: &[u8]);

    /// Group 0: frame uniforms at binding 0, user uniforms at binding 1.
    fn create_frame_bindings(
        &self,
        frame: &Self::Buffer,
        user: &Self::Buffer,
    ) -> Self::Bindings;

    /// Group 1 for `pipeline`: the sampler followed by `inputs` in binding order.
    fn create_input_bindings(
        &self,
        pipeline: &Self::Pipeline,
        inputs: &[&Self::Texture],
    ) -> Self::Bindings;

    fn begin_frame(&self) -> Self::Encoder;

    fn encode_pass(
        &self,
        encoder: &mut Self::Encoder,
        pipeline: &Self::Pipeline,
        frame: &Self::Bindings,
        inputs: &Self::Bindings,
        target: &Self::Texture,
    );

    fn encode_present(
        &self,
        encoder: &mut Self::Encoder,
        pipeline: &Self::Pipeline,
        frame: &Self::Bindings,
        inputs: &Self::Bindings,
        surface: &Self::Surface,
    );

    fn submit(&self, encoder: Self::Encoder);

    /// Blocks until submitted work has retired.
    fn wait_idle(&self);
}
