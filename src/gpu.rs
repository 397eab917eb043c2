//! GPU context, device capabilities, and per-frame counters.
//!
//! [`GpuContext`] owns the wgpu surface, device, queue, and surface
//! configuration, and is passed by reference to every pass. All fields are
//! public so callers can reach the raw wgpu API when they need to.

use std::cell::Cell;
use std::sync::Arc;
use winit::window::Window;

/// Per-frame GPU bookkeeping.
///
/// The counters do not reset themselves; the frame scheduler calls
/// [`reset`](Self::reset) once at the top of each frame, and passes record
/// into them as they execute.
#[derive(Debug, Default)]
pub struct FrameCounters {
    draw_calls: Cell<u32>,
    pass_runs: Cell<u32>,
}

impl FrameCounters {
    /// Zeroes the counters for a new frame.
    pub fn reset(&self) {
        self.draw_calls.set(0);
        self.pass_runs.set(0);
    }

    pub(crate) fn record_draw_call(&self) {
        self.draw_calls.set(self.draw_calls.get() + 1);
    }

    pub(crate) fn record_pass(&self) {
        self.pass_runs.set(self.pass_runs.get() + 1);
    }

    /// Draw calls issued since the last reset.
    pub fn draw_calls(&self) -> u32 {
        self.draw_calls.get()
    }

    /// Pipeline passes executed since the last reset.
    pub fn pass_runs(&self) -> u32 {
        self.pass_runs.get()
    }
}

/// Core GPU context holding wgpu resources.
pub struct GpuContext {
    /// The surface for presenting rendered frames to the window.
    pub surface: wgpu::Surface<'static>,
    /// The logical GPU device for creating resources and pipelines.
    pub device: wgpu::Device,
    /// The command queue for submitting work to the GPU.
    pub queue: wgpu::Queue,
    /// Current surface configuration (format, size, present mode).
    pub config: wgpu::SurfaceConfiguration,
    /// Per-frame draw and pass counters, reset by the scheduler.
    pub counters: FrameCounters,
    pixel_ratio: f32,
    max_sample_count: u32,
}

impl GpuContext {
    /// Create a GPU context from a winit window at a 1:1 render resolution.
    pub fn new(window: Arc<Window>) -> Self {
        Self::with_pixel_ratio(window, 1.0)
    }

    /// Create a GPU context rendering at `pixel_ratio` times the window size.
    ///
    /// Performs all wgpu initialization: instance, surface, adapter, device
    /// and queue, then configures the surface with an sRGB format and Fifo
    /// present mode.
    ///
    /// # Panics
    ///
    /// Panics if no suitable GPU adapter is found or device creation fails.
    pub fn with_pixel_ratio(window: Arc<Window>, pixel_ratio: f32) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window).unwrap();

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .expect("Failed to find a suitable GPU adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Brume Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
            experimental_features: Default::default(),
        }))
        .expect("Failed to create device");

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let format_flags = adapter.get_texture_format_features(surface_format).flags;
        let max_sample_count = [16u32, 8, 4, 2]
            .into_iter()
            .find(|count| format_flags.sample_count_supported(*count))
            .unwrap_or(1);

        let pixel_ratio = pixel_ratio.max(0.1);
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: scaled(size.width, pixel_ratio),
            height: scaled(size.height, pixel_ratio),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Self {
            surface,
            device,
            queue,
            config,
            counters: FrameCounters::default(),
            pixel_ratio,
            max_sample_count,
        }
    }

    /// Resize the surface to new window dimensions (the pixel ratio is
    /// applied on top). Zero-sized dimensions are ignored to survive window
    /// minimize without a wgpu validation error.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = scaled(width, self.pixel_ratio);
            self.config.height = scaled(height, self.pixel_ratio);
            self.surface.configure(&self.device, &self.config);
        }
    }

    /// Returns the current surface width in pixels.
    pub fn width(&self) -> u32 {
        self.config.width
    }

    /// Returns the current surface height in pixels.
    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Returns the current aspect ratio (width / height).
    pub fn aspect(&self) -> f32 {
        self.config.width as f32 / self.config.height as f32
    }

    /// The render-resolution scale relative to the window size.
    pub fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    /// The largest multisample count the surface format supports.
    pub fn max_sample_count(&self) -> u32 {
        self.max_sample_count
    }
}

fn scaled(dimension: u32, pixel_ratio: f32) -> u32 {
    ((dimension as f32 * pixel_ratio) as u32).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_until_reset() {
        let counters = FrameCounters::default();
        counters.record_draw_call();
        counters.record_draw_call();
        counters.record_pass();
        assert_eq!(counters.draw_calls(), 2);
        assert_eq!(counters.pass_runs(), 1);

        counters.reset();
        assert_eq!(counters.draw_calls(), 0);
        assert_eq!(counters.pass_runs(), 0);
    }

    #[test]
    fn scaled_size_never_hits_zero() {
        assert_eq!(scaled(800, 0.5), 400);
        assert_eq!(scaled(1, 0.1), 1);
        assert_eq!(scaled(1280, 1.5), 1920);
    }
}
