use std::time::{Duration, Instant};

use bytemuck::{Pod, Zeroable};
use chrono::{Datelike, Local, Timelike};

use crate::backend::Viewport;

/// Per-frame values at group 0 binding 0. Layout matches a std140 block:
///
/// ```text
/// struct Frame { float4 resolution; float time; float time_delta; uint frame; float fps; float4 date; };
/// ```
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    /// width, height, 1/width, 1/height
    pub resolution: [f32; 4],
    pub time: f32,
    pub time_delta: f32,
    pub frame: u32,
    pub fps: f32,
    /// year, month, day, seconds since midnight
    pub date: [f32; 4],
}

impl FrameUniforms {
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn set_viewport(&mut self, viewport: Viewport) {
        let width = viewport.width as f32;
        let height = viewport.height as f32;
        self.resolution = [width, height, 1.0 / width, 1.0 / height];
    }

    fn refresh_date(&mut self) {
        let local_now = Local::now();
        let seconds_since_midnight = local_now.num_seconds_from_midnight() as f32
            + local_now.nanosecond() as f32 / 1_000_000_000.0;
        self.date = [
            local_now.year() as f32,
            local_now.month() as f32,
            local_now.day() as f32,
            seconds_since_midnight,
        ];
    }
}

/// Snapshot shown in the window title.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frame: u64,
    pub fps: f32,
    pub time: f32,
}

/// Frame counter and clock; owned by the render loop behind its frame lock.
pub(crate) struct FrameClock {
    start: Instant,
    last_frame: Instant,
    frame: u64,
    last_fps_update: Instant,
    frames_since_update: u32,
    fps: f32,
    uniforms: FrameUniforms,
}

impl FrameClock {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            start: now,
            last_frame: now,
            frame: 0,
            last_fps_update: now,
            frames_since_update: 0,
            fps: 0.0,
            uniforms: FrameUniforms::default(),
        }
    }

    /// Values for the frame about to be rendered.
    pub(crate) fn begin(&mut self, now: Instant, viewport: Viewport) -> FrameUniforms {
        if self.frame == 0 {
            self.start = now;
            self.last_frame = now;
        }
        let elapsed = now.saturating_duration_since(self.start);
        let delta = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;

        self.uniforms.set_viewport(viewport);
        self.uniforms.time = elapsed.as_secs_f32();
        self.uniforms.time_delta = delta.as_secs_f32();
        self.uniforms.frame = self.frame.min(u64::from(u32::MAX)) as u32;
        self.uniforms.fps = self.fps;
        self.uniforms.refresh_date();
        self.uniforms
    }

    /// Advances the counter once the frame has been submitted. Returns fresh
    /// stats once per second.
    pub(crate) fn finish(&mut self, now: Instant) -> Option<FrameStats> {
        self.frame += 1;
        self.frames_since_update += 1;
        let since_update = now.saturating_duration_since(self.last_fps_update);
        if since_update < Duration::from_secs(1) {
            return None;
        }
        self.fps = self.frames_since_update as f32 / since_update.as_secs_f32();
        self.frames_since_update = 0;
        self.last_fps_update = now;
        let stats = self.stats();
        tracing::debug!(
            fps = stats.fps.round(),
            frame_count = stats.frame,
            time = stats.time,
            "render stats"
        );
        Some(stats)
    }

    pub(crate) fn stats(&self) -> FrameStats {
        FrameStats {
            frame: self.frame,
            fps: self.fps,
            time: self.uniforms.time,
        }
    }
}
