//! Event loop and engine runner.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use lantern_render::{FramePipeline, FRAME_OVERLAP};

use crate::engine::Engine;
use crate::input::KeyboardState;

/// Engine configuration.
#[derive(Clone)]
pub struct EngineConfig {
    /// Window title.
    pub title: String,
    /// Initial window width.
    pub width: u32,
    /// Initial window height.
    pub height: u32,
    /// Enable vsync.
    pub vsync: bool,
    /// Enable Vulkan validation layers (default: debug builds only).
    pub validation: bool,
    /// Number of frame slots in the ring.
    pub frames_in_flight: usize,
    /// Directory holding shaders and meshes.
    pub asset_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: "Lantern".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            validation: cfg!(debug_assertions),
            frames_in_flight: FRAME_OVERLAP,
            asset_dir: PathBuf::from("assets"),
        }
    }
}

impl EngineConfig {
    /// Create a new config with the given title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Set the window dimensions.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enable or disable vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Enable or disable validation layers.
    pub fn with_validation(mut self, validation: bool) -> Self {
        self.validation = validation;
        self
    }

    /// Set the number of frame slots.
    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }

    /// Set the asset directory.
    pub fn with_asset_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.asset_dir = dir.into();
        self
    }
}

/// Run the engine with the given configuration.
///
/// Initializes logging, creates the window and engine, and runs the event
/// loop until quit is requested. A device error mid-frame logs and aborts the
/// process: once the device has failed, local recovery would only corrupt the
/// resource graph.
pub fn run(config: EngineConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("{} starting...", config.title);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut runner = Runner {
        config,
        state: None,
    };

    event_loop.run_app(&mut runner)?;

    Ok(())
}

/// Internal runner implementing winit's ApplicationHandler.
struct Runner {
    config: EngineConfig,
    state: Option<AppState>,
}

/// Live application state.
struct AppState {
    window: Arc<Window>,
    engine: Engine,
    frame_pipeline: FramePipeline,
    keys: KeyboardState,
}

impl ApplicationHandler for Runner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        match self.create_state(event_loop) {
            Ok(state) => {
                self.state = Some(state);
                info!("Engine ready");
            }
            Err(err) => {
                error!("Failed to initialize: {err:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if matches!(event, WindowEvent::CloseRequested) {
            info!("Close requested");
            self.quit(event_loop);
            return;
        }

        let Some(state) = &mut self.state else {
            return;
        };

        let mut quit = false;
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                state.keys.process_key_event(&event);

                if event.state == ElementState::Pressed && !event.repeat {
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Escape) => quit = true,
                        PhysicalKey::Code(KeyCode::Space) => {
                            state.engine.toggle_focus_material();
                        }
                        _ => {}
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                // Input takes effect between frames; there is no mid-frame
                // cancellation.
                state.engine.apply_input(&state.keys);

                if let Err(err) = state.frame_pipeline.render_frame(&mut state.engine) {
                    error!("Fatal device error: {err}");
                    std::process::abort();
                }

                state.window.request_redraw();
            }
            _ => {}
        }

        if quit {
            self.quit(event_loop);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

impl Runner {
    fn create_state(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<AppState> {
        let window_attrs = Window::default_attributes()
            .with_title(&self.config.title)
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

        let window = Arc::new(event_loop.create_window(window_attrs)?);

        let engine = Engine::new(&window, &self.config)?;
        let frame_pipeline = FramePipeline::new(self.config.frames_in_flight);

        Ok(AppState {
            window,
            engine,
            frame_pipeline,
            keys: KeyboardState::new(),
        })
    }

    fn quit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut state) = self.state.take() {
            info!(
                "Exiting after {} frames",
                state.frame_pipeline.frame_number()
            );
            state.engine.shutdown();
        }
        event_loop.exit();
    }
}
