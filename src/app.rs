//! The winit host loop.
//!
//! Bootstrapping glue only: window and GPU setup, the per-refresh redraw
//! signal, and resize plumbing. Everything that matters happens in the
//! components the loop drives: the [`FrameScheduler`], the [`TickRegistry`],
//! and the [`Pipeline`].
//!
//! ```no_run
//! use brume::*;
//!
//! fn main() {
//!     run(|ctx| {
//!         ctx.chunks.install_fog_override(FogFalloff::default());
//!         ctx.camera(Camera::new().at(10.0, 6.0, 10.0).looking_at(0.0, 0.0, 0.0));
//!         ctx.standard_pipeline(Color::rgb(0.02, 0.02, 0.04), 1.0, OutlineSettings::default());
//!
//!         move |_frame| {}
//!     });
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::camera::Camera;
use crate::chunks::ChunkLibrary;
use crate::clock::TickRegistry;
use crate::color::Color;
use crate::gpu::GpuContext;
use crate::pipeline::{OutlineSettings, Pipeline};
use crate::scene::Scene;
use crate::scheduler::FrameScheduler;

/// Configuration for the app window.
pub struct AppConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Render-resolution scale relative to the window size.
    pub pixel_ratio: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "Brume".to_string(),
            width: 1280,
            height: 720,
            pixel_ratio: 1.0,
        }
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn pixel_ratio(mut self, pixel_ratio: f32) -> Self {
        self.pixel_ratio = pixel_ratio;
        self
    }
}

/// Context provided during app setup, before the first frame.
///
/// This is where the one-time ordering constraints live: install the fog
/// override into [`chunks`](Self::chunks) *before* building the pipeline, so
/// every later-compiled material sees the patched library.
pub struct SetupContext<'a> {
    pub gpu: &'a GpuContext,
    pub scene: &'a mut Scene,
    pub registry: &'a mut TickRegistry,
    pub chunks: &'a mut ChunkLibrary,
    camera: &'a mut Option<Camera>,
    pipeline: &'a mut Option<Pipeline>,
}

impl SetupContext<'_> {
    /// Sets the active camera.
    pub fn camera(&mut self, camera: Camera) {
        *self.camera = Some(camera);
    }

    /// Installs a custom-assembled pipeline.
    pub fn pipeline(&mut self, pipeline: Pipeline) {
        *self.pipeline = Some(pipeline);
    }

    /// Installs the stock pass sequence (clear, scene, bloom, outline),
    /// compiled against a snapshot of the current chunk library.
    pub fn standard_pipeline(
        &mut self,
        clear_color: Color,
        luminance_threshold: f32,
        outline: OutlineSettings,
    ) {
        *self.pipeline = Some(Pipeline::standard(
            self.gpu,
            self.chunks.clone(),
            clear_color,
            luminance_threshold,
            outline,
        ));
    }
}

/// Per-frame context handed to the frame closure before the scheduler runs.
pub struct Frame<'a> {
    pub gpu: &'a GpuContext,
    pub scene: &'a mut Scene,
    pub registry: &'a mut TickRegistry,
    pub camera: &'a mut Option<Camera>,
    /// Seconds since the scheduler started.
    pub time: f32,
    /// Seconds since the previous frame.
    pub dt: f32,
}

/// Run an application with the default window configuration.
pub fn run<S, F>(setup: S)
where
    S: FnOnce(&mut SetupContext) -> F + 'static,
    F: FnMut(&mut Frame) + 'static,
{
    run_with_config(AppConfig::default(), setup);
}

/// Run an application with a custom window configuration.
pub fn run_with_config<S, F>(config: AppConfig, setup: S)
where
    S: FnOnce(&mut SetupContext) -> F + 'static,
    F: FnMut(&mut Frame) + 'static,
{
    let event_loop = EventLoop::new().unwrap();
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = BrumeApp::Pending {
        config,
        setup: Some(Box::new(move |ctx: &mut SetupContext| {
            Box::new(setup(ctx)) as Box<dyn FnMut(&mut Frame)>
        })),
    };

    event_loop.run_app(&mut app).unwrap();
}

type SetupFn = Box<dyn FnOnce(&mut SetupContext) -> Box<dyn FnMut(&mut Frame)>>;

enum BrumeApp {
    Pending {
        config: AppConfig,
        setup: Option<SetupFn>,
    },
    Running {
        window: Arc<Window>,
        gpu: GpuContext,
        scene: Scene,
        registry: TickRegistry,
        camera: Option<Camera>,
        pipeline: Option<Pipeline>,
        scheduler: FrameScheduler,
        frame_fn: Box<dyn FnMut(&mut Frame)>,
        last_frame: Instant,
    },
}

impl ApplicationHandler for BrumeApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let BrumeApp::Pending { config, setup } = self {
            let window_attrs = WindowAttributes::default()
                .with_title(&config.title)
                .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));

            let window = Arc::new(event_loop.create_window(window_attrs).unwrap());
            let gpu = GpuContext::with_pixel_ratio(window.clone(), config.pixel_ratio);

            let mut scene = Scene::new();
            let mut registry = TickRegistry::new();
            let mut chunks = ChunkLibrary::standard();
            let mut camera = None;
            let mut pipeline = None;

            let setup_fn = setup.take().unwrap();
            let frame_fn = {
                let mut ctx = SetupContext {
                    gpu: &gpu,
                    scene: &mut scene,
                    registry: &mut registry,
                    chunks: &mut chunks,
                    camera: &mut camera,
                    pipeline: &mut pipeline,
                };
                setup_fn(&mut ctx)
            };

            let mut scheduler = FrameScheduler::new();
            scheduler.start();
            window.request_redraw();

            *self = BrumeApp::Running {
                window,
                gpu,
                scene,
                registry,
                camera,
                pipeline,
                scheduler,
                frame_fn,
                last_frame: Instant::now(),
            };
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let BrumeApp::Running {
            window,
            gpu,
            scene,
            registry,
            camera,
            pipeline,
            scheduler,
            frame_fn,
            last_frame,
        } = self
        else {
            return;
        };

        match event {
            WindowEvent::CloseRequested => {
                scheduler.stop();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                gpu.resize(size.width, size.height);
            }
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = now.duration_since(*last_frame).as_secs_f32();
                *last_frame = now;

                let mut frame = Frame {
                    gpu,
                    scene,
                    registry,
                    camera,
                    time: scheduler.elapsed(),
                    dt,
                };
                frame_fn(&mut frame);

                let result = match pipeline.as_mut() {
                    Some(pipeline) => {
                        scheduler.frame(dt, gpu, registry, pipeline, scene, camera.as_ref())
                    }
                    None => Err(crate::error::EngineError::InvalidPipelineState(
                        "no pipeline was installed during setup".to_string(),
                    )),
                };
                if let Err(err) = result {
                    eprintln!("[frame] {err}");
                    scheduler.stop();
                    event_loop.exit();
                }

                if scheduler.is_running() {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
