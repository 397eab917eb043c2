//! The top-level frame driver.
//!
//! The host loop delivers one signal per display refresh; for each signal the
//! [`FrameScheduler`] resets the per-frame GPU counters, advances the tick
//! registry exactly once, and renders the pipeline. [`start`](FrameScheduler::start)
//! arms the recurring signal and [`stop`](FrameScheduler::stop) disarms it for
//! teardown; while stopped, frame signals are ignored and the host loop stops
//! re-requesting them.
//!
//! The registry is advanced before the pipeline renders. Nothing may depend
//! on intra-frame ordering between ticks and draws; a one-frame-stale uniform
//! read is acceptable in either arrangement.

use crate::camera::Camera;
use crate::clock::{Clock, TickRegistry};
use crate::error::EngineError;
use crate::gpu::GpuContext;
use crate::pipeline::Pipeline;
use crate::scene::Scene;

/// Drives one frame per external signal while running.
pub struct FrameScheduler {
    running: bool,
    clock: Clock,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            running: false,
            clock: Clock::new(),
        }
    }

    /// Arms the recurring per-frame signal.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Halts the recurring signal. Frames delivered while stopped are no-ops.
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Elapsed seconds since the scheduler started ticking.
    pub fn elapsed(&self) -> f32 {
        self.clock.elapsed()
    }

    /// Runs one frame: dependency check, counter reset, registry advance,
    /// pipeline render. The host re-arms the next signal after this returns.
    ///
    /// Fails with [`EngineError::MissingDependency`] when no camera is active
    /// or the render surface has no size yet.
    pub fn frame(
        &mut self,
        dt: f32,
        gpu: &GpuContext,
        registry: &mut TickRegistry,
        pipeline: &mut Pipeline,
        scene: &Scene,
        camera: Option<&Camera>,
    ) -> Result<(), EngineError> {
        if !self.running {
            return Ok(());
        }
        let camera = require_dependencies(camera, (gpu.width(), gpu.height()))?;

        gpu.counters.reset();
        self.clock.advance(dt);
        registry.advance(dt);
        pipeline.render(gpu, scene, camera, self.clock.elapsed())
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks the collaborators a frame cannot run without.
fn require_dependencies(
    camera: Option<&Camera>,
    surface_size: (u32, u32),
) -> Result<&Camera, EngineError> {
    let camera = camera.ok_or(EngineError::MissingDependency("active camera"))?;
    if surface_size.0 == 0 || surface_size.1 == 0 {
        return Err(EngineError::MissingDependency("render surface"));
    }
    Ok(camera)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_requires_a_camera() {
        let err = require_dependencies(None, (800, 600)).unwrap_err();
        assert_eq!(err, EngineError::MissingDependency("active camera"));
    }

    #[test]
    fn frame_requires_an_initialized_surface() {
        let camera = Camera::new();
        let err = require_dependencies(Some(&camera), (0, 600)).unwrap_err();
        assert_eq!(err, EngineError::MissingDependency("render surface"));

        assert!(require_dependencies(Some(&camera), (800, 600)).is_ok());
    }

    #[test]
    fn start_and_stop_toggle_the_signal() {
        let mut scheduler = FrameScheduler::new();
        assert!(!scheduler.is_running());
        scheduler.start();
        assert!(scheduler.is_running());
        scheduler.stop();
        assert!(!scheduler.is_running());
    }
}
