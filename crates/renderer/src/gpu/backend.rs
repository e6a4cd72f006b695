use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::backend::{GpuBackend, PassLayout, Viewport};
use crate::compile::ShaderProgram;
use crate::error::{BufferAllocationError, CompileError};
use crate::textures::TextureImage;

use super::pipeline::{self, PipelineLayouts, TARGET_FORMAT};

pub struct WgpuPipeline {
    pipeline: wgpu::RenderPipeline,
    input_layout: wgpu::BindGroupLayout,
}

pub struct WgpuTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// [`GpuBackend`] over a wgpu device. The display surface is the view of the
/// swapchain image acquired for the current frame.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    layouts: PipelineLayouts,
    surface_format: wgpu::TextureFormat,
}

impl WgpuBackend {
    pub(crate) fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        surface_format: wgpu::TextureFormat,
    ) -> Self {
        let layouts = PipelineLayouts::new(&device);
        Self {
            device,
            queue,
            layouts,
            surface_format,
        }
    }

    /// Runs `build` inside an error scope and reports what the scope caught.
    fn scoped<T>(&self, filter: wgpu::ErrorFilter, build: impl FnOnce() -> T) -> (T, Option<String>) {
        self.device.push_error_scope(filter);
        let value = build();
        let error = pollster::block_on(self.device.pop_error_scope()).map(|err| err.to_string());
        (value, error)
    }

    fn texture(
        &self,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        data: Option<&[u8]>,
    ) -> Result<WgpuTexture, BufferAllocationError> {
        let descriptor = wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: match data {
                Some(_) => wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                None => {
                    wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT
                }
            },
            view_formats: &[],
        };
        let (texture, error) = self.scoped(wgpu::ErrorFilter::OutOfMemory, || match data {
            Some(bytes) => self.device.create_texture_with_data(
                &self.queue,
                &descriptor,
                TextureDataOrder::LayerMajor,
                bytes,
            ),
            None => self.device.create_texture(&descriptor),
        });
        if let Some(reason) = error {
            return Err(BufferAllocationError::new(label, reason));
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTexture {
            _texture: texture,
            view,
        })
    }

    fn pipeline(
        &self,
        label: &str,
        texture_count: usize,
        fragment: &wgpu::ShaderModule,
        entry_point: &str,
        format: wgpu::TextureFormat,
    ) -> Result<WgpuPipeline, CompileError> {
        let input_layout = pipeline::input_layout(&self.device, texture_count);
        let (pipeline, error) = self.scoped(wgpu::ErrorFilter::Validation, || {
            pipeline::fullscreen_pipeline(
                &self.device,
                label,
                &self.layouts,
                &input_layout,
                fragment,
                entry_point,
                format,
            )
        });
        match error {
            Some(reason) => Err(CompileError::Gpu(format!("{entry_point}: {reason}"))),
            None => Ok(WgpuPipeline {
                pipeline,
                input_layout,
            }),
        }
    }

    fn draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        pipeline: &WgpuPipeline,
        frame: &wgpu::BindGroup,
        inputs: &wgpu::BindGroup,
        view: &wgpu::TextureView,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            occlusion_query_set: None,
            timestamp_writes: None,
        });
        render_pass.set_pipeline(&pipeline.pipeline);
        render_pass.set_bind_group(0, frame, &[]);
        render_pass.set_bind_group(1, inputs, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

impl GpuBackend for WgpuBackend {
    type Module = wgpu::ShaderModule;
    type Pipeline = WgpuPipeline;
    type Texture = WgpuTexture;
    type Buffer = wgpu::Buffer;
    type Bindings = wgpu::BindGroup;
    type Encoder = wgpu::CommandEncoder;
    type Surface = wgpu::TextureView;

    fn create_module(&self, program: &ShaderProgram) -> Result<wgpu::ShaderModule, CompileError> {
        if program.spirv.is_empty() || program.spirv.len() % 4 != 0 {
            return Err(CompileError::InvalidModule(format!(
                "module is {} bytes, not a whole number of words",
                program.spirv.len()
            )));
        }
        let (module, error) = self.scoped(wgpu::ErrorFilter::Validation, || {
            self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("user passes"),
                source: wgpu::util::make_spirv(&program.spirv),
            })
        });
        match error {
            Some(reason) => Err(CompileError::Gpu(reason)),
            None => Ok(module),
        }
    }

    fn create_pass_pipeline(
        &self,
        module: &wgpu::ShaderModule,
        entry_point: &str,
        layout: PassLayout,
    ) -> Result<WgpuPipeline, CompileError> {
        self.pipeline(
            entry_point,
            layout.input_count(),
            module,
            entry_point,
            TARGET_FORMAT,
        )
    }

    fn create_present_pipeline(&self) -> Result<WgpuPipeline, CompileError> {
        self.pipeline(
            "present",
            1,
            &self.layouts.present_module,
            "main",
            self.surface_format,
        )
    }

    fn create_render_target(
        &self,
        viewport: Viewport,
        label: &str,
    ) -> Result<WgpuTexture, BufferAllocationError> {
        self.texture(label, viewport.width, viewport.height, TARGET_FORMAT, None)
    }

    fn create_placeholder(&self) -> Result<WgpuTexture, BufferAllocationError> {
        self.texture(
            "placeholder",
            1,
            1,
            wgpu::TextureFormat::Rgba8Unorm,
            Some(&[0, 0, 0, 0]),
        )
    }

    fn upload_texture(&self, image: &TextureImage) -> Result<WgpuTexture, BufferAllocationError> {
        let label = image.path.display().to_string();
        self.texture(
            &label,
            image.width,
            image.height,
            wgpu::TextureFormat::Rgba8Unorm,
            Some(&image.rgba),
        )
    }

    fn create_uniform_buffer(
        &self,
        size: u64,
        label: &str,
    ) -> Result<wgpu::Buffer, BufferAllocationError> {
        let (buffer, error) = self.scoped(wgpu::ErrorFilter::OutOfMemory, || {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: size.max(16),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        match error {
            Some(reason) => Err(BufferAllocationError::new(label, reason)),
            None => Ok(buffer),
        }
    }

    fn write_buffer(&self, buffer: &wgpu::Buffer, bytes: &[u8]) {
        self.queue.write_buffer(buffer, 0, bytes);
    }

    fn create_frame_bindings(&self, frame: &wgpu::Buffer, user: &wgpu::Buffer) -> wgpu::BindGroup {
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame bind group"),
            layout: &self.layouts.frame_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: user.as_entire_binding(),
                },
            ],
        })
    }

    fn create_input_bindings(
        &self,
        pipeline: &WgpuPipeline,
        inputs: &[&WgpuTexture],
    ) -> wgpu::BindGroup {
        let views: Vec<&wgpu::TextureView> = inputs.iter().map(|texture| &texture.view).collect();
        self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("pass input bind group"),
            layout: &pipeline.input_layout,
            entries: &pipeline::input_entries(&self.layouts.sampler, &views),
        })
    }

    fn begin_frame(&self) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            })
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &WgpuPipeline,
        frame: &wgpu::BindGroup,
        inputs: &wgpu::BindGroup,
        target: &WgpuTexture,
    ) {
        self.draw(encoder, "pass", pipeline, frame, inputs, &target.view);
    }

    fn encode_present(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &WgpuPipeline,
        frame: &wgpu::BindGroup,
        inputs: &wgpu::BindGroup,
        surface: &wgpu::TextureView,
    ) {
        self.draw(encoder, "present", pipeline, frame, inputs, surface);
    }

    fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(Some(encoder.finish()));
    }

    fn wait_idle(&self) {
        if let Err(err) = self.device.poll(wgpu::PollType::Wait) {
            tracing::warn!(error = %err, "waiting for GPU work failed");
        }
    }
}
