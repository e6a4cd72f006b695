//! Frame submission against whatever generation is current.
//!
//! In vsync mode the display callback renders every pass and presents in one
//! submission. In free-running mode a background thread renders passes as
//! fast as the GPU retires them and the display callback only copies the last
//! target to the surface. Both paths take the same frame lock, so at most one
//! frame is being encoded at a time.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use uniforms::UniformStore;

use crate::backend::GpuBackend;
use crate::frame::{FrameClock, FrameStats};
use crate::generation::GenerationSlot;

const IDLE_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriverMode {
    #[default]
    Vsync,
    FreeRunning,
}

struct DriverShared<B: GpuBackend> {
    backend: Arc<B>,
    slot: GenerationSlot<B>,
    store: Arc<UniformStore>,
    clock: Mutex<FrameClock>,
    stats: Mutex<FrameStats>,
}

struct FreeRunner {
    stop: Sender<()>,
    join: Option<JoinHandle<()>>,
}

pub struct RenderLoopDriver<B: GpuBackend> {
    shared: Arc<DriverShared<B>>,
    mode: DriverMode,
    runner: Option<FreeRunner>,
}

impl<B: GpuBackend> RenderLoopDriver<B> {
    pub fn new(
        backend: Arc<B>,
        slot: GenerationSlot<B>,
        store: Arc<UniformStore>,
        mode: DriverMode,
    ) -> Self {
        let shared = Arc::new(DriverShared {
            backend,
            slot,
            store,
            clock: Mutex::new(FrameClock::new(Instant::now())),
            stats: Mutex::new(FrameStats::default()),
        });
        let runner = match mode {
            DriverMode::Vsync => None,
            DriverMode::FreeRunning => spawn_free_runner(shared.clone()),
        };
        Self {
            shared,
            mode,
            runner,
        }
    }

    pub fn mode(&self) -> DriverMode {
        self.mode
    }

    pub fn stats(&self) -> FrameStats {
        *self.shared.stats.lock()
    }

    /// Renders every pass of the current generation, presenting the result
    /// when a surface is given. Returns false when no generation exists yet.
    pub fn render_frame(&self, surface: Option<&B::Surface>) -> bool {
        self.shared.render(surface)
    }

    /// Copies the last pass target of the current generation to `surface`.
    pub fn present(&self, surface: &B::Surface) -> bool {
        self.shared.present(surface)
    }

    /// Display callback entry point.
    pub fn display(&self, surface: &B::Surface) -> bool {
        match self.mode {
            DriverMode::Vsync => self.render_frame(Some(surface)),
            DriverMode::FreeRunning => self.present(surface),
        }
    }
}

impl<B: GpuBackend> Drop for RenderLoopDriver<B> {
    fn drop(&mut self) {
        if let Some(mut runner) = self.runner.take() {
            let _ = runner.stop.send(());
            if let Some(handle) = runner.join.take() {
                let _ = handle.join();
            }
        }
        self.shared.backend.wait_idle();
    }
}

impl<B: GpuBackend> DriverShared<B> {
    fn render(&self, surface: Option<&B::Surface>) -> bool {
        let Some(generation) = self.slot.load() else {
            return false;
        };
        let resources = &generation.shared;
        let mut clock = self.clock.lock();

        if let Some(bytes) = self.store.pack_for_epoch(generation.schema_epoch()) {
            self.backend.write_buffer(&resources.uniform_buffer, &bytes);
        }
        let frame = clock.begin(Instant::now(), generation.viewport());
        self.backend
            .write_buffer(&resources.frame_buffer, bytemuck::bytes_of(&frame));

        let mut encoder = self.backend.begin_frame();
        for ((pipeline, inputs), target) in resources
            .pipelines
            .iter()
            .zip(&generation.pass_inputs)
            .zip(&generation.targets)
        {
            self.backend.encode_pass(
                &mut encoder,
                pipeline,
                &resources.frame_bindings,
                inputs,
                target,
            );
        }
        if let Some(surface) = surface {
            self.backend.encode_present(
                &mut encoder,
                &resources.present,
                &resources.frame_bindings,
                &generation.present_inputs,
                surface,
            );
        }
        self.backend.submit(encoder);

        if let Some(stats) = clock.finish(Instant::now()) {
            *self.stats.lock() = stats;
        }
        true
    }

    fn present(&self, surface: &B::Surface) -> bool {
        let Some(generation) = self.slot.load() else {
            return false;
        };
        let _clock = self.clock.lock();
        let resources = &generation.shared;
        let mut encoder = self.backend.begin_frame();
        self.backend.encode_present(
            &mut encoder,
            &resources.present,
            &resources.frame_bindings,
            &generation.present_inputs,
            surface,
        );
        self.backend.submit(encoder);
        true
    }
}

fn spawn_free_runner<B: GpuBackend>(shared: Arc<DriverShared<B>>) -> Option<FreeRunner> {
    let (stop, stop_rx) = crossbeam_channel::bounded::<()>(1);
    let spawned = thread::Builder::new()
        .name("free-running-render".into())
        .spawn(move || loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }
            if shared.render(None) {
                shared.backend.wait_idle();
            } else {
                match stop_rx.recv_timeout(IDLE_BACKOFF) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
        });
    match spawned {
        Ok(join) => Some(FreeRunner {
            stop,
            join: Some(join),
        }),
        Err(err) => {
            tracing::error!(error = %err, "failed to spawn free-running render thread");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, Output};
    use uniforms::SetOptions;

    const SHADER: &str = "struct Params { // @uniform\n\
                          float gain;\n\
                          };\n\
                          float4 pass0() { return gain; }\n\
                          float4 pass1() { return 0; }\n\
                          float4 pass2() { return 0; }\n";

    fn driver(fixture: &Fixture, mode: DriverMode) -> RenderLoopDriver<crate::testing::FakeBackend> {
        RenderLoopDriver::new(
            fixture.backend.clone(),
            fixture.manager.slot(),
            fixture.store.clone(),
            mode,
        )
    }

    #[test]
    fn nothing_renders_before_the_first_generation() {
        let fixture = Fixture::new(SHADER);
        let driver = driver(&fixture, DriverMode::Vsync);
        assert!(!driver.display(&"window".to_string()));
        assert!(fixture.backend.frames().is_empty());
    }

    #[test]
    fn frame_runs_passes_in_order_then_presents() {
        let fixture = Fixture::new(SHADER);
        fixture.manager.reload_now().unwrap();
        let generation = fixture.manager.current().unwrap();
        let driver = driver(&fixture, DriverMode::Vsync);

        assert!(driver.display(&"window".to_string()));
        let frames = fixture.backend.frames();
        assert_eq!(frames.len(), 1);
        let passes = &frames[0];
        let entry_points: Vec<&str> = passes.iter().map(|pass| pass.entry_point.as_str()).collect();
        assert_eq!(entry_points, vec!["pass0", "pass1", "pass2", "present"]);

        let targets: Vec<u64> = generation.targets.iter().map(|target| target.id).collect();
        for (index, pass) in passes[..3].iter().enumerate() {
            assert_eq!(pass.output, Output::Target(targets[index]));
            assert!(!pass.inputs.contains(&targets[index]));
        }
        assert_eq!(passes[3].inputs, vec![targets[2]]);
        assert_eq!(passes[3].output, Output::Surface("window".into()));
        assert_eq!(driver.stats().frame, 0);
    }

    #[test]
    fn user_uniforms_upload_only_when_dirty() {
        let fixture = Fixture::new(SHADER);
        fixture.manager.reload_now().unwrap();
        let driver = driver(&fixture, DriverMode::Vsync);
        let surface = "window".to_string();

        driver.display(&surface);
        driver.display(&surface);
        assert_eq!(fixture.backend.writes_to("user uniforms"), 1);
        assert_eq!(fixture.backend.writes_to("frame uniforms"), 2);

        fixture.store.set_values("gain", &[0.5], SetOptions::RESTORE);
        driver.display(&surface);
        assert_eq!(fixture.backend.writes_to("user uniforms"), 2);
    }

    #[test]
    fn stale_layout_is_not_uploaded() {
        let fixture = Fixture::new(SHADER);
        fixture.manager.reload_now().unwrap();
        let driver = driver(&fixture, DriverMode::Vsync);

        // A newer schema is installed but its generation has not been published.
        fixture.store.reset_schema();
        fixture.store.mark_dirty();
        driver.render_frame(None);
        assert_eq!(fixture.backend.writes_to("user uniforms"), 0);
        assert_eq!(fixture.backend.frames().len(), 1);
    }

    #[test]
    fn free_running_renders_off_thread_and_display_only_presents() {
        let fixture = Fixture::new(SHADER);
        fixture.manager.reload_now().unwrap();
        let driver = driver(&fixture, DriverMode::FreeRunning);

        let deadline = Instant::now() + Duration::from_secs(5);
        while fixture.backend.waits() < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(fixture.backend.waits() >= 3);

        assert!(driver.display(&"window".to_string()));
        drop(driver);
        let frames = fixture.backend.frames();
        let present_only = frames
            .iter()
            .filter(|frame| frame.len() == 1 && frame[0].entry_point == "present")
            .count();
        assert_eq!(present_only, 1);
        assert!(frames
            .iter()
            .filter(|frame| frame.len() == 3)
            .all(|frame| frame.iter().all(|pass| matches!(pass.output, Output::Target(_)))));
    }
}
