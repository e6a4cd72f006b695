//! Double-buffered GPU resources and the reload workflow that replaces them.
//!
//! ```text
//!   request_reload ─▶ worker ─▶ analyze ─▶ compile ─▶ load textures ─▶ assemble
//!                                  │          │             │              │
//!                                  └──────────┴──── failure ┴──────────────┴─▶ Failed (previous generation stays)
//!                                                                          │
//!                                      store lock: install uniform table + swap slot ─▶ Idle(n+1)
//! ```
//!
//! A published [`ResourceGeneration`] is never mutated. Frames hold an `Arc`
//! to the generation they started with, so a swap never frees resources that
//! an in-flight frame still uses.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use shaderschema::{FileDependencySet, ShaderSourceAnalyzer};
use uniforms::{packed_size, read_persisted_entries, UniformStore, UniformTable};

use crate::backend::{GpuBackend, PassLayout, Viewport};
use crate::compile::BoxedShaderCompiler;
use crate::error::{BufferAllocationError, ReloadError};
use crate::frame::FrameUniforms;
use crate::textures::load_textures;

/// Everything one shader version needs to render at one viewport size.
pub struct ResourceGeneration<B: GpuBackend> {
    id: u64,
    viewport: Viewport,
    schema_epoch: u64,
    pub(crate) shared: Arc<SharedResources<B>>,
    pub(crate) targets: Vec<B::Texture>,
    pub(crate) pass_inputs: Vec<B::Bindings>,
    pub(crate) present_inputs: B::Bindings,
}

/// Size-independent resources; shared between a generation and the ones
/// derived from it by a resize.
pub(crate) struct SharedResources<B: GpuBackend> {
    pub(crate) shader_path: PathBuf,
    pub(crate) pipelines: Vec<B::Pipeline>,
    pub(crate) present: B::Pipeline,
    pub(crate) textures: Vec<B::Texture>,
    pub(crate) placeholder: B::Texture,
    pub(crate) frame_buffer: B::Buffer,
    pub(crate) uniform_buffer: B::Buffer,
    pub(crate) frame_bindings: B::Bindings,
}

impl<B: GpuBackend> ResourceGeneration<B> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Uniform store epoch whose layout the user uniform buffer matches.
    pub fn schema_epoch(&self) -> u64 {
        self.schema_epoch
    }

    pub fn pass_count(&self) -> usize {
        self.shared.pipelines.len()
    }

    pub fn texture_count(&self) -> usize {
        self.shared.textures.len()
    }

    pub fn shader_path(&self) -> &Path {
        &self.shared.shader_path
    }
}

/// The single "current generation" reference shared by the manager and the
/// render loop.
pub struct GenerationSlot<B: GpuBackend>(Arc<RwLock<Option<Arc<ResourceGeneration<B>>>>>);

impl<B: GpuBackend> Clone for GenerationSlot<B> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<B: GpuBackend> Default for GenerationSlot<B> {
    fn default() -> Self {
        Self(Arc::new(RwLock::new(None)))
    }
}

impl<B: GpuBackend> GenerationSlot<B> {
    pub fn load(&self) -> Option<Arc<ResourceGeneration<B>>> {
        self.0.read().clone()
    }

    fn publish(&self, generation: Arc<ResourceGeneration<B>>) {
        *self.0.write() = Some(generation);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadState {
    Idle { generation: Option<u64> },
    Compiling,
    Assembling,
    Failed { last_good: Option<u64>, error: String },
}

/// Callbacks for UI and file watching. Called from the reload thread.
pub trait ReloadObserver: Send + Sync {
    fn dependencies_changed(&self, _dependencies: &FileDependencySet) {}
    fn reload_failed(&self, _diagnostic: &str) {}
    fn reload_succeeded(&self, _generation: u64, _pass_count: usize) {}
}

pub type SharedReloadObserver = Arc<dyn ReloadObserver>;

enum WorkerMessage {
    Reload,
    Stop,
}

struct ReloadWorker {
    requests: Sender<WorkerMessage>,
    join: Option<JoinHandle<()>>,
}

struct ManagerInner<B: GpuBackend> {
    backend: Arc<B>,
    analyzer: ShaderSourceAnalyzer,
    compiler: BoxedShaderCompiler,
    store: Arc<UniformStore>,
    observers: RwLock<Vec<SharedReloadObserver>>,
    shader_path: Mutex<PathBuf>,
    slot: GenerationSlot<B>,
    state: Mutex<ReloadState>,
    reload_lock: Mutex<()>,
    dependencies: Mutex<FileDependencySet>,
    viewport: Mutex<Viewport>,
    resize_pending: AtomicBool,
    next_id: AtomicU64,
}

/// Owns the current generation and serializes reloads.
pub struct ResourceGenerationManager<B: GpuBackend> {
    inner: Arc<ManagerInner<B>>,
    worker: Option<ReloadWorker>,
}

impl<B: GpuBackend> ResourceGenerationManager<B> {
    pub fn new(
        backend: Arc<B>,
        analyzer: ShaderSourceAnalyzer,
        compiler: BoxedShaderCompiler,
        store: Arc<UniformStore>,
        shader_path: impl Into<PathBuf>,
        viewport: Viewport,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                backend,
                analyzer,
                compiler,
                store,
                observers: RwLock::new(Vec::new()),
                shader_path: Mutex::new(shader_path.into()),
                slot: GenerationSlot::default(),
                state: Mutex::new(ReloadState::Idle { generation: None }),
                reload_lock: Mutex::new(()),
                dependencies: Mutex::new(FileDependencySet::new()),
                viewport: Mutex::new(viewport),
                resize_pending: AtomicBool::new(false),
                next_id: AtomicU64::new(1),
            }),
            worker: None,
        }
    }

    /// Moves reload requests onto a dedicated thread. Requests that arrive
    /// while a reload runs collapse into one follow-up reload.
    pub fn with_worker(mut self) -> Self {
        let (requests, receiver) = crossbeam_channel::unbounded();
        let inner = self.inner.clone();
        let spawned = thread::Builder::new()
            .name("shader-reload".into())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    if matches!(message, WorkerMessage::Stop) {
                        break;
                    }
                    let mut coalesced = 0usize;
                    let mut stop = false;
                    for extra in receiver.try_iter() {
                        match extra {
                            WorkerMessage::Reload => coalesced += 1,
                            WorkerMessage::Stop => stop = true,
                        }
                    }
                    if coalesced > 0 {
                        tracing::debug!(coalesced, "coalesced pending reload requests");
                    }
                    let _ = inner.reload();
                    if stop {
                        break;
                    }
                }
                tracing::debug!("reload worker stopped");
            });
        match spawned {
            Ok(join) => {
                self.worker = Some(ReloadWorker {
                    requests,
                    join: Some(join),
                });
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to spawn reload worker; reloading inline")
            }
        }
        self
    }

    pub fn add_observer(&self, observer: SharedReloadObserver) {
        self.inner.observers.write().push(observer);
    }

    pub fn request_reload(&self) {
        match &self.worker {
            Some(worker) => {
                let _ = worker.requests.send(WorkerMessage::Reload);
            }
            None => {
                let _ = self.inner.reload();
            }
        }
    }

    /// Runs a reload on the calling thread and waits for it.
    pub fn reload_now(&self) -> Result<u64, ReloadError> {
        self.inner.reload()
    }

    /// Switches to another shader file and reloads it.
    pub fn open(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::info!(shader = %path.display(), "opening shader");
        *self.inner.shader_path.lock() = path;
        self.request_reload();
    }

    /// Rebuilds the size-dependent resources. Returns whether a new generation
    /// was published; during a reload the resize is applied when it finishes.
    pub fn resize(&self, width: u32, height: u32) -> Result<bool, ReloadError> {
        let viewport = Viewport::new(width, height);
        {
            let mut current = self.inner.viewport.lock();
            if *current == viewport {
                return Ok(false);
            }
            *current = viewport;
        }
        self.inner.resize_pending.store(true, Ordering::SeqCst);
        self.inner.apply_pending_resize()
    }

    pub fn current(&self) -> Option<Arc<ResourceGeneration<B>>> {
        self.inner.slot.load()
    }

    pub fn slot(&self) -> GenerationSlot<B> {
        self.inner.slot.clone()
    }

    pub fn state(&self) -> ReloadState {
        self.inner.state.lock().clone()
    }

    pub fn last_error(&self) -> Option<String> {
        match &*self.inner.state.lock() {
            ReloadState::Failed { error, .. } => Some(error.clone()),
            _ => None,
        }
    }

    pub fn dependencies(&self) -> FileDependencySet {
        self.inner.dependencies.lock().clone()
    }

    pub fn shader_path(&self) -> PathBuf {
        self.inner.shader_path.lock().clone()
    }

    pub fn viewport(&self) -> Viewport {
        *self.inner.viewport.lock()
    }

    pub fn store(&self) -> &Arc<UniformStore> {
        &self.inner.store
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }
}

impl<B: GpuBackend> Drop for ResourceGenerationManager<B> {
    fn drop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            let _ = worker.requests.send(WorkerMessage::Stop);
            if let Some(handle) = worker.join.take() {
                let _ = handle.join();
            }
        }
    }
}

impl<B: GpuBackend> ManagerInner<B> {
    fn reload(&self) -> Result<u64, ReloadError> {
        let result = {
            let _guard = self.reload_lock.lock();
            self.reload_locked()
        };
        if let Err(err) = self.apply_pending_resize() {
            tracing::warn!(error = %err, "failed to apply deferred resize");
        }
        result
    }

    /// Whoever holds the reload lock checks the flag again after releasing
    /// it, so a resize requested mid-reload is never dropped.
    fn apply_pending_resize(&self) -> Result<bool, ReloadError> {
        let mut published = false;
        while self.resize_pending.load(Ordering::SeqCst) {
            let Some(_guard) = self.reload_lock.try_lock() else {
                return Ok(published);
            };
            published |= self.rebuild_for_viewport()?;
        }
        Ok(published)
    }

    fn reload_locked(&self) -> Result<u64, ReloadError> {
        let path = self.shader_path.lock().clone();
        tracing::info!(shader = %path.display(), "reloading shader");
        self.set_state(ReloadState::Compiling);
        self.store.flush_all();

        let analysis = match self.analyzer.analyze(&path) {
            Ok(analysis) => analysis,
            Err(failure) => {
                self.report_dependencies(failure.dependencies);
                return Err(self.fail(failure.error.into()));
            }
        };
        self.report_dependencies(analysis.dependencies.clone());

        let schema = analysis.schema().map_err(|err| self.fail(err.into()))?;
        let program = self
            .compiler
            .compile(&analysis.source_path, &analysis.preprocessed)
            .map_err(|err| self.fail(err.into()))?;
        if !program.warnings.is_empty() {
            tracing::warn!(shader = %path.display(), warnings = %program.warnings, "shader compiled with warnings");
        }

        let images = load_textures(&analysis.textures()).map_err(|err| self.fail(err.into()))?;
        self.set_state(ReloadState::Assembling);

        let layout_size = {
            let staged = UniformTable::from_schema(&schema, &UniformTable::new(), &[]);
            packed_size(staged.variables()) as u64
        };
        let backend = &*self.backend;
        let assemble = || -> Result<SharedResources<B>, ReloadError> {
            let module = backend.create_module(&program)?;
            let layout = PassLayout {
                pass_count: program.pass_count(),
                texture_count: images.len(),
            };
            let pipelines = program
                .passes
                .iter()
                .map(|entry| backend.create_pass_pipeline(&module, entry, layout))
                .collect::<Result<Vec<_>, _>>()?;
            let present = backend.create_present_pipeline()?;
            let textures = images
                .iter()
                .map(|image| backend.upload_texture(image))
                .collect::<Result<Vec<_>, _>>()?;
            let placeholder = backend.create_placeholder()?;
            let frame_buffer = backend.create_uniform_buffer(FrameUniforms::SIZE, "frame uniforms")?;
            let uniform_buffer = backend.create_uniform_buffer(layout_size, "user uniforms")?;
            let frame_bindings = backend.create_frame_bindings(&frame_buffer, &uniform_buffer);
            Ok(SharedResources {
                shader_path: analysis.source_path.clone(),
                pipelines,
                present,
                textures,
                placeholder,
                frame_buffer,
                uniform_buffer,
                frame_bindings,
            })
        };
        let shared = Arc::new(assemble().map_err(|err| self.fail(err))?);
        let viewport = *self.viewport.lock();
        let (targets, pass_inputs, present_inputs) =
            build_targets(backend, &shared, viewport).map_err(|err| self.fail(err.into()))?;

        let persisted = match self.store.persist_path() {
            Some(file) => read_persisted_entries(&file).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring unreadable uniform file");
                Vec::new()
            }),
            None => Vec::new(),
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let pass_count = shared.pipelines.len();
        self.store.install_schema(&schema, &persisted, |schema_epoch| {
            self.slot.publish(Arc::new(ResourceGeneration {
                id,
                viewport,
                schema_epoch,
                shared,
                targets,
                pass_inputs,
                present_inputs,
            }));
        });
        self.set_state(ReloadState::Idle {
            generation: Some(id),
        });
        tracing::info!(
            generation = id,
            passes = pass_count,
            uniforms = schema.declarations.len(),
            width = viewport.width,
            height = viewport.height,
            "published resource generation"
        );
        for observer in self.observers.read().iter() {
            observer.reload_succeeded(id, pass_count);
        }
        Ok(id)
    }

    /// Caller holds the reload lock.
    fn rebuild_for_viewport(&self) -> Result<bool, ReloadError> {
        self.resize_pending.store(false, Ordering::SeqCst);
        let Some(current) = self.slot.load() else {
            return Ok(false);
        };
        let viewport = *self.viewport.lock();
        if current.viewport == viewport {
            return Ok(false);
        }
        let (targets, pass_inputs, present_inputs) =
            build_targets(&*self.backend, &current.shared, viewport)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.slot.publish(Arc::new(ResourceGeneration {
            id,
            viewport,
            schema_epoch: current.schema_epoch,
            shared: current.shared.clone(),
            targets,
            pass_inputs,
            present_inputs,
        }));
        {
            let mut state = self.state.lock();
            match &mut *state {
                ReloadState::Idle { generation } => *generation = Some(id),
                ReloadState::Failed { last_good, .. } => *last_good = Some(id),
                ReloadState::Compiling | ReloadState::Assembling => {}
            }
        }
        tracing::debug!(
            generation = id,
            width = viewport.width,
            height = viewport.height,
            "resized resource generation"
        );
        Ok(true)
    }

    fn set_state(&self, state: ReloadState) {
        *self.state.lock() = state;
    }

    fn report_dependencies(&self, dependencies: FileDependencySet) {
        for observer in self.observers.read().iter() {
            observer.dependencies_changed(&dependencies);
        }
        *self.dependencies.lock() = dependencies;
    }

    fn fail(&self, error: ReloadError) -> ReloadError {
        let diagnostic = error.diagnostic();
        let last_good = self.slot.load().map(|generation| generation.id);
        tracing::warn!(?last_good, error = %diagnostic, "shader reload failed");
        self.set_state(ReloadState::Failed {
            last_good,
            error: diagnostic.clone(),
        });
        for observer in self.observers.read().iter() {
            observer.reload_failed(&diagnostic);
        }
        error
    }
}

type TargetSet<B> = (
    Vec<<B as GpuBackend>::Texture>,
    Vec<<B as GpuBackend>::Bindings>,
    <B as GpuBackend>::Bindings,
);

/// Pass `i` reads targets `0..i`; its own and later targets are bound to the
/// placeholder so no pass samples the texture it renders into.
fn build_targets<B: GpuBackend>(
    backend: &B,
    shared: &SharedResources<B>,
    viewport: Viewport,
) -> Result<TargetSet<B>, BufferAllocationError> {
    let pass_count = shared.pipelines.len();
    let targets = (0..pass_count)
        .map(|pass| backend.create_render_target(viewport, &format!("pass{pass} target")))
        .collect::<Result<Vec<_>, _>>()?;

    let pass_inputs = shared
        .pipelines
        .iter()
        .enumerate()
        .map(|(pass, pipeline)| {
            let mut inputs: Vec<&B::Texture> =
                Vec::with_capacity(pass_count + shared.textures.len());
            for slot in 0..pass_count {
                inputs.push(if slot < pass {
                    &targets[slot]
                } else {
                    &shared.placeholder
                });
            }
            inputs.extend(shared.textures.iter());
            backend.create_input_bindings(pipeline, &inputs)
        })
        .collect();
    let last = targets.last().unwrap_or(&shared.placeholder);
    let present_inputs = backend.create_input_bindings(&shared.present, &[last]);
    Ok((targets, pass_inputs, present_inputs))
}
