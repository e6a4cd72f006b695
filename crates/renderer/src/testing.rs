//! Recording backend and fixtures shared by the generation and driver tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use shaderschema::{FileDependencySet, ShaderSourceAnalyzer};
use tempfile::TempDir;
use uniforms::UniformStore;

use crate::backend::{GpuBackend, PassLayout, Viewport};
use crate::compile::{pass_entry_points, BoxedShaderCompiler, ShaderCompiler, ShaderProgram};
use crate::error::{BufferAllocationError, CompileError};
use crate::generation::{ReloadObserver, ResourceGenerationManager};
use crate::textures::TextureImage;

#[derive(Debug)]
pub(crate) struct FakeTexture {
    pub id: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug)]
pub(crate) struct FakePipeline {
    pub entry_point: String,
    pub layout: Option<PassLayout>,
}

#[derive(Debug)]
pub(crate) struct FakeBuffer {
    pub label: String,
    pub size: u64,
}

#[derive(Debug)]
pub(crate) struct FakeBindings {
    pub inputs: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Output {
    Target(u64),
    Surface(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct EncodedPass {
    pub entry_point: String,
    pub inputs: Vec<u64>,
    pub output: Output,
}

#[derive(Debug, Default)]
pub(crate) struct FakeEncoder {
    passes: Vec<EncodedPass>,
}

/// Hands out ids and records every write and submitted frame.
#[derive(Debug, Default)]
pub(crate) struct FakeBackend {
    next_id: AtomicU64,
    modules: AtomicUsize,
    waits: AtomicUsize,
    writes: Mutex<Vec<(String, usize)>>,
    frames: Mutex<Vec<Vec<EncodedPass>>>,
}

impl FakeBackend {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn texture(&self, width: u32, height: u32) -> FakeTexture {
        FakeTexture {
            id: self.next_id(),
            width,
            height,
        }
    }

    pub fn modules(&self) -> usize {
        self.modules.load(Ordering::SeqCst)
    }

    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }

    pub fn writes_to(&self, label: &str) -> usize {
        self.writes
            .lock()
            .iter()
            .filter(|(buffer, _)| buffer == label)
            .count()
    }

    pub fn frames(&self) -> Vec<Vec<EncodedPass>> {
        self.frames.lock().clone()
    }
}

impl GpuBackend for FakeBackend {
    type Module = ();
    type Pipeline = FakePipeline;
    type Texture = FakeTexture;
    type Buffer = FakeBuffer;
    type Bindings = FakeBindings;
    type Encoder = FakeEncoder;
    type Surface = String;

    fn create_module(&self, _program: &ShaderProgram) -> Result<(), CompileError> {
        self.modules.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_pass_pipeline(
        &self,
        _module: &(),
        entry_point: &str,
        layout: PassLayout,
    ) -> Result<FakePipeline, CompileError> {
        Ok(FakePipeline {
            entry_point: entry_point.to_string(),
            layout: Some(layout),
        })
    }

    fn create_present_pipeline(&self) -> Result<FakePipeline, CompileError> {
        Ok(FakePipeline {
            entry_point: "present".into(),
            layout: None,
        })
    }

    fn create_render_target(
        &self,
        viewport: Viewport,
        _label: &str,
    ) -> Result<FakeTexture, BufferAllocationError> {
        Ok(self.texture(viewport.width, viewport.height))
    }

    fn create_placeholder(&self) -> Result<FakeTexture, BufferAllocationError> {
        Ok(self.texture(1, 1))
    }

    fn upload_texture(&self, image: &TextureImage) -> Result<FakeTexture, BufferAllocationError> {
        Ok(self.texture(image.width, image.height))
    }

    fn create_uniform_buffer(
        &self,
        size: u64,
        label: &str,
    ) -> Result<FakeBuffer, BufferAllocationError> {
        Ok(FakeBuffer {
            label: label.to_string(),
            size,
        })
    }

    fn write_buffer(&self, buffer: &FakeBuffer, bytes: &[u8]) {
        assert!(bytes.len() as u64 <= buffer.size, "write overflows {}", buffer.label);
        self.writes.lock().push((buffer.label.clone(), bytes.len()));
    }

    fn create_frame_bindings(&self, _frame: &FakeBuffer, _user: &FakeBuffer) -> FakeBindings {
        FakeBindings { inputs: Vec::new() }
    }

    fn create_input_bindings(
        &self,
        pipeline: &FakePipeline,
        inputs: &[&FakeTexture],
    ) -> FakeBindings {
        if let Some(layout) = pipeline.layout {
            assert_eq!(layout.input_count(), inputs.len());
        }
        FakeBindings {
            inputs: inputs.iter().map(|texture| texture.id).collect(),
        }
    }

    fn begin_frame(&self) -> FakeEncoder {
        FakeEncoder::default()
    }

    fn encode_pass(
        &self,
        encoder: &mut FakeEncoder,
        pipeline: &FakePipeline,
        _frame: &FakeBindings,
        inputs: &FakeBindings,
        target: &FakeTexture,
    ) {
        encoder.passes.push(EncodedPass {
            entry_point: pipeline.entry_point.clone(),
            inputs: inputs.inputs.clone(),
            output: Output::Target(target.id),
        });
    }

    fn encode_present(
        &self,
        encoder: &mut FakeEncoder,
        pipeline: &FakePipeline,
        _frame: &FakeBindings,
        inputs: &FakeBindings,
        surface: &String,
    ) {
        encoder.passes.push(EncodedPass {
            entry_point: pipeline.entry_point.clone(),
            inputs: inputs.inputs.clone(),
            output: Output::Surface(surface.clone()),
        });
    }

    fn submit(&self, encoder: FakeEncoder) {
        self.frames.lock().push(encoder.passes);
    }

    fn wait_idle(&self) {
        self.waits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Treats every `passN` word in the source as an entry point.
pub(crate) struct ScanningCompiler;

impl ShaderCompiler for ScanningCompiler {
    fn compile(&self, _source_path: &Path, source: &str) -> Result<ShaderProgram, CompileError> {
        let names: Vec<String> = source
            .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
            .filter(|word| word.starts_with("pass") && word.len() > 4)
            .map(str::to_string)
            .collect();
        Ok(ShaderProgram {
            spirv: Vec::new(),
            passes: pass_entry_points(&names)?,
            warnings: String::new(),
        })
    }
}

/// Signals when a compile starts and blocks until the test releases it.
pub(crate) struct GatedCompiler {
    entered: Sender<()>,
    gate: Receiver<()>,
}

impl GatedCompiler {
    pub fn new() -> (Self, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded();
        (
            Self {
                entered: entered_tx,
                gate: gate_rx,
            },
            entered_rx,
            gate_tx,
        )
    }
}

impl ShaderCompiler for GatedCompiler {
    fn compile(&self, source_path: &Path, source: &str) -> Result<ShaderProgram, CompileError> {
        let _ = self.entered.send(());
        let _ = self.gate.recv();
        ScanningCompiler.compile(source_path, source)
    }
}

#[derive(Default)]
pub(crate) struct RecordingObserver {
    pub failures: Mutex<Vec<String>>,
    pub successes: Mutex<Vec<(u64, usize)>>,
    pub dependency_updates: AtomicUsize,
}

impl ReloadObserver for RecordingObserver {
    fn dependencies_changed(&self, _dependencies: &FileDependencySet) {
        self.dependency_updates.fetch_add(1, Ordering::SeqCst);
    }

    fn reload_failed(&self, diagnostic: &str) {
        self.failures.lock().push(diagnostic.to_string());
    }

    fn reload_succeeded(&self, generation: u64, pass_count: usize) {
        self.successes.lock().push((generation, pass_count));
    }
}

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub backend: Arc<FakeBackend>,
    pub store: Arc<UniformStore>,
    pub manager: ResourceGenerationManager<FakeBackend>,
}

impl Fixture {
    pub fn new(source: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("shader.slang"), source).expect("write shader");
        let backend = Arc::new(FakeBackend::default());
        let store = Arc::new(UniformStore::default());
        let manager = ResourceGenerationManager::new(
            backend.clone(),
            ShaderSourceAnalyzer::passthrough(),
            Box::new(ScanningCompiler),
            store.clone(),
            dir.path().join("shader.slang"),
            Viewport::new(64, 32),
        );
        Self {
            dir,
            backend,
            store,
            manager,
        }
    }

    pub fn shader_path(&self) -> PathBuf {
        self.dir.path().join("shader.slang")
    }

    pub fn write_shader(&self, source: &str) {
        fs::write(self.shader_path(), source).expect("write shader");
    }

    pub fn write_png(&self, name: &str) {
        image::RgbaImage::from_pixel(2, 2, image::Rgba([10, 20, 30, 255]))
            .save(self.dir.path().join(name))
            .expect("write png");
    }

    pub fn manager_with(&self, compiler: BoxedShaderCompiler) -> ResourceGenerationManager<FakeBackend> {
        ResourceGenerationManager::new(
            self.backend.clone(),
            ShaderSourceAnalyzer::passthrough(),
            compiler,
            self.store.clone(),
            self.shader_path(),
            Viewport::new(64, 32),
        )
    }
}
