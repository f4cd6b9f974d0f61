//! glTF viewer
//!
//! Opens a window, loads the configured glTF asset and renders it with a
//! free-fly camera: WASD/arrow keys move, right-drag looks around, the wheel
//! dollies along the view direction.

mod window;

use std::process::ExitCode;

use gltf_renderer::config::{ApplicationConfig, Config};
use gltf_renderer::foundation::logging;
use gltf_renderer::input::{InputState, WindowEvent};
use gltf_renderer::render::{route_input, Camera, FrameOutcome, NoOverlay, Overlay, VulkanRenderer};
use gltf_renderer::scene::SceneLoader;

use window::{ViewerEvent, Window};

const CONFIG_PATH: &str = "viewer.toml";

struct ViewerApp {
    config: ApplicationConfig,
    // Declared before `window` so the GPU objects go before the surface's window
    renderer: VulkanRenderer,
    window: Window,
    overlay: NoOverlay,
    camera: Camera,
    input: InputState,
    minimized: bool,
}

impl ViewerApp {
    fn new(config: ApplicationConfig) -> Result<Self, Box<dyn std::error::Error>> {
        log::info!("Creating window...");
        let window = Window::new(&config.window.title, config.window.width, config.window.height)?;

        let scene = SceneLoader::new().load_file(&config.scene.asset_path)?;

        log::info!("Creating Vulkan renderer...");
        let renderer = VulkanRenderer::new(&config.renderer, &scene, &window)?;

        let mut overlay = NoOverlay;
        overlay.swapchain_recreated(&renderer.overlay_target()?)?;

        let camera = Camera::from_config(&config.camera);
        Ok(Self {
            config,
            renderer,
            window,
            overlay,
            camera,
            input: InputState::default(),
            minimized: false,
        })
    }

    fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut last_time = self.window.time();
        let mut frames: u64 = 0;

        while !self.window.should_close() {
            if self.minimized {
                self.window.wait_events();
            }

            for event in self.window.poll_events() {
                match event {
                    ViewerEvent::Input(event) => {
                        self.input = route_input(&mut self.overlay, self.input, &event);
                    }
                    ViewerEvent::Window(event) => {
                        match event {
                            WindowEvent::Minimized => self.minimized = true,
                            WindowEvent::Restored => self.minimized = false,
                            WindowEvent::CloseRequested => self.window.set_should_close(true),
                            WindowEvent::Resized { .. } => {}
                        }
                        self.renderer.handle_window_event(&event);
                    }
                }
            }

            let now = self.window.time();
            let dt = (now - last_time) as f32;
            last_time = now;

            self.camera = self.camera.update(&self.input, dt, &self.config.camera);
            self.input = self.input.end_frame();

            if self.renderer.render_frame(&self.window, &self.camera, &mut self.overlay)? == FrameOutcome::Rendered {
                frames += 1;
            }
        }

        self.renderer.wait_idle()?;
        log::info!("Viewer closed after {} frames", frames);
        Ok(())
    }
}

fn main() -> ExitCode {
    let config = match ApplicationConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            log::error!("Failed to load {}: {}", CONFIG_PATH, e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.engine.log_level);

    if let Err(e) = config.validate() {
        log::error!("{}", e);
        return ExitCode::FAILURE;
    }

    let result = ViewerApp::new(config).and_then(|mut app| app.run());
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Viewer failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
