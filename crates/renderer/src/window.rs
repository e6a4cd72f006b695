//! Interactive preview window.
//!
//! ```text
//!   PreviewWindow::spawn ─▶ window thread ─▶ GpuContext ─▶ WgpuBackend
//!          ▲                      │                           │
//!          │ ready(manager)       ├─▶ ResourceGenerationManager (reload worker)
//!          │                      └─▶ RenderLoopDriver ◀── RedrawRequested
//!   callers: request_reload / refresh / shutdown via EventLoopProxy
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use shaderschema::ShaderSourceAnalyzer;
use uniforms::UniformStore;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop, EventLoopBuilder, EventLoopProxy};
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::backend::Viewport;
use crate::compile::BoxedShaderCompiler;
use crate::driver::{DriverMode, RenderLoopDriver};
use crate::generation::{ReloadObserver, ResourceGenerationManager, SharedReloadObserver};
use crate::gpu::{GpuContext, WgpuBackend};

/// Manager type the preview window drives.
pub type PreviewManager = ResourceGenerationManager<WgpuBackend>;

const TITLE_REFRESH: Duration = Duration::from_millis(500);

pub struct PreviewConfig {
    pub title: String,
    pub size: (u32, u32),
    pub mode: DriverMode,
    pub shader_path: PathBuf,
    pub analyzer: ShaderSourceAnalyzer,
    pub compiler: BoxedShaderCompiler,
    pub store: Arc<UniformStore>,
    pub observers: Vec<SharedReloadObserver>,
}

#[derive(Debug)]
enum WindowCommand {
    Redraw,
    Status(Option<String>),
    Shutdown,
}

/// Forwards reload outcomes to the window title.
struct TitleObserver {
    proxy: Mutex<EventLoopProxy<WindowCommand>>,
}

impl ReloadObserver for TitleObserver {
    fn reload_failed(&self, diagnostic: &str) {
        let first_line = diagnostic.lines().next().unwrap_or_default().to_string();
        let _ = self
            .proxy
            .lock()
            .send_event(WindowCommand::Status(Some(first_line)));
    }

    fn reload_succeeded(&self, _generation: u64, _pass_count: usize) {
        let _ = self.proxy.lock().send_event(WindowCommand::Status(None));
    }
}

/// Handle to the preview window thread.
pub struct PreviewWindow {
    proxy: EventLoopProxy<WindowCommand>,
    manager: Arc<PreviewManager>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

type Ready = Result<(EventLoopProxy<WindowCommand>, Arc<PreviewManager>)>;

impl PreviewWindow {
    /// Opens the window, builds the GPU backend and requests the first reload.
    pub fn spawn(config: PreviewConfig) -> Result<Self> {
        let (ready_tx, ready_rx) = bounded::<Ready>(1);
        let handle = thread::Builder::new()
            .name("preview-window".into())
            .spawn(move || run_window_thread(config, ready_tx))
            .map_err(|err| anyhow!("failed to spawn window thread: {err}"))?;

        let (proxy, manager) = ready_rx
            .recv()
            .map_err(|err| anyhow!("window thread failed to initialise: {err}"))??;

        Ok(Self {
            proxy,
            manager,
            join_handle: Some(handle),
        })
    }

    pub fn manager(&self) -> &Arc<PreviewManager> {
        &self.manager
    }

    /// Wakes the event loop after a uniform edit.
    pub fn refresh(&self) -> Result<()> {
        self.proxy
            .send_event(WindowCommand::Redraw)
            .map_err(|err| anyhow!(err.to_string()))
    }

    /// A cloneable closure form of [`Self::refresh`], for callbacks owned by
    /// other threads.
    pub fn refresher(&self) -> impl Fn() + Send + Sync + 'static {
        let proxy = Mutex::new(self.proxy.clone());
        move || {
            let _ = proxy.lock().send_event(WindowCommand::Redraw);
        }
    }

    /// Blocks until the user closes the window.
    pub fn wait(mut self) -> Result<()> {
        match self.join_handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|err| anyhow!("window thread panicked: {err:?}"))?,
            None => Ok(()),
        }
    }

    pub fn shutdown(self) -> Result<()> {
        let _ = self.proxy.send_event(WindowCommand::Shutdown);
        self.wait()
    }
}

impl Drop for PreviewWindow {
    fn drop(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = self.proxy.send_event(WindowCommand::Shutdown);
            let _ = handle.join();
        }
    }
}

fn run_window_thread(config: PreviewConfig, ready_tx: Sender<Ready>) -> Result<()> {
    let mut builder = EventLoopBuilder::<WindowCommand>::with_user_event();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        use winit::platform::wayland::EventLoopBuilderExtWayland;
        EventLoopBuilderExtWayland::with_any_thread(&mut builder, true);
    }
    #[cfg(any(
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    }

    let (event_loop, window, mut context) = match open_window(&mut builder, &config) {
        Ok(parts) => parts,
        Err(err) => {
            let _ = ready_tx.send(Err(anyhow!("failed to initialise preview window: {err}")));
            return Err(err);
        }
    };
    let proxy = event_loop.create_proxy();

    let backend = Arc::new(WgpuBackend::new(
        context.device.clone(),
        context.queue.clone(),
        context.surface_format,
    ));
    let PreviewConfig {
        title,
        mode,
        shader_path,
        analyzer,
        compiler,
        store,
        observers,
        ..
    } = config;
    let manager = ResourceGenerationManager::new(
        backend.clone(),
        analyzer,
        compiler,
        store.clone(),
        shader_path,
        Viewport::new(context.size.width, context.size.height),
    )
    .with_worker();
    manager.add_observer(Arc::new(TitleObserver {
        proxy: Mutex::new(proxy.clone()),
    }));
    for observer in observers {
        manager.add_observer(observer);
    }
    let manager = Arc::new(manager);
    let driver = RenderLoopDriver::new(backend, manager.slot(), store, mode);

    manager.request_reload();
    let _ = ready_tx.send(Ok((proxy, manager.clone())));

    // The surface borrows the native window; keep it alive until the loop
    // and everything it captured are gone.
    let window_guard = window.clone();
    let mut status: Option<String> = None;
    let mut last_title = Instant::now();
    let run_result = event_loop.run(move |event, elwt| match event {
        Event::UserEvent(command) => match command {
            WindowCommand::Redraw => window.request_redraw(),
            WindowCommand::Status(next) => {
                status = next;
                window.set_title(&compose_title(&title, &driver, status.as_deref()));
                window.request_redraw();
            }
            WindowCommand::Shutdown => elwt.exit(),
        },
        Event::WindowEvent { window_id, event } if window_id == window.id() => match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => elwt.exit(),
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed && !event.repeat =>
            {
                match event.logical_key {
                    Key::Named(NamedKey::Escape) => elwt.exit(),
                    Key::Named(NamedKey::F5) => manager.request_reload(),
                    _ => {}
                }
            }
            WindowEvent::Resized(new_size) => {
                context.resize(new_size);
                if let Err(err) = manager.resize(new_size.width, new_size.height) {
                    tracing::warn!(error = %err, "failed to resize pass targets");
                }
            }
            WindowEvent::RedrawRequested => match context.surface.get_current_texture() {
                Ok(frame) => {
                    let view = frame
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    driver.display(&view);
                    frame.present();
                    if last_title.elapsed() >= TITLE_REFRESH {
                        last_title = Instant::now();
                        window.set_title(&compose_title(&title, &driver, status.as_deref()));
                    }
                }
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    context.reconfigure();
                }
                Err(wgpu::SurfaceError::OutOfMemory) => {
                    tracing::error!("surface out of memory; closing preview");
                    elwt.exit();
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    tracing::debug!("surface timeout; retrying next frame");
                }
                Err(other) => {
                    tracing::warn!(error = ?other, "surface error; retrying next frame");
                }
            },
            _ => {}
        },
        Event::AboutToWait => {
            window.request_redraw();
            elwt.set_control_flow(ControlFlow::Wait);
        }
        Event::LoopExiting => {
            manager.store().flush_all();
        }
        _ => {}
    });

    drop(window_guard);
    run_result.map_err(|err| anyhow!("window event loop error: {err}"))
}

fn open_window(
    builder: &mut EventLoopBuilder<WindowCommand>,
    config: &PreviewConfig,
) -> Result<(EventLoop<WindowCommand>, Arc<Window>, GpuContext)> {
    let event_loop = builder
        .build()
        .map_err(|err| anyhow!("failed to create event loop: {err}"))?;
    let window = WindowBuilder::new()
        .with_title(config.title.clone())
        .with_inner_size(PhysicalSize::new(config.size.0, config.size.1))
        .build(&event_loop)
        .map_err(|err| anyhow!("failed to create preview window: {err}"))?;
    let window = Arc::new(window);
    let context = GpuContext::new(window.as_ref(), window.inner_size(), config.mode)?;
    tracing::info!(adapter = %context.adapter_name, "preview window ready");
    Ok((event_loop, window, context))
}

fn compose_title(title: &str, driver: &RenderLoopDriver<WgpuBackend>, status: Option<&str>) -> String {
    match status {
        Some(error) => format!("{title} | reload failed: {error}"),
        None => {
            let stats = driver.stats();
            format!("{title} | {:.1} fps | frame {}", stats.fps, stats.frame)
        }
    }
}
