//! GLFW window for the viewer
//!
//! Owns the GLFW context and window, implements the renderer's
//! [`WindowSurface`] boundary and translates GLFW events into the renderer's
//! input and window events.

use ash::vk;
use gltf_renderer::input::{InputEvent, MouseButton, MoveDirection, WindowEvent};
use gltf_renderer::render::vulkan::{VulkanError, VulkanResult, WindowSurface};
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed: {0}")]
    InitializationFailed(String),

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// A translated GLFW event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewerEvent {
    /// Camera input
    Input(InputEvent),
    /// Window lifecycle
    Window(WindowEvent),
}

/// GLFW window configured for Vulkan (no client API)
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
}

impl Window {
    /// Create a resizable window
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|e| WindowError::InitializationFailed(format!("{:?}", e)))?;

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);
        window.set_iconify_polling(true);
        window.set_mouse_button_polling(true);
        window.set_cursor_pos_polling(true);
        window.set_scroll_polling(true);

        Ok(Self { glfw, window, events })
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Mark the window for closing
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Pump the event queue and return the translated events
    pub fn poll_events(&mut self) -> Vec<ViewerEvent> {
        self.glfw.poll_events();
        let mut translated = Vec::new();
        for (_, event) in glfw::flush_messages(&self.events) {
            if let glfw::WindowEvent::Key(glfw::Key::Escape, _, glfw::Action::Press, _) = event {
                self.window.set_should_close(true);
            }
            if let Some(event) = translate_event(&event) {
                translated.push(event);
            }
        }
        translated
    }

    /// Block until at least one event arrives (used while minimized)
    pub fn wait_events(&mut self) {
        self.glfw.wait_events();
    }

    /// Seconds since GLFW was initialized
    pub fn time(&self) -> f64 {
        self.glfw.get_time()
    }
}

impl WindowSurface for Window {
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| VulkanError::InitializationFailed("GLFW reports no Vulkan support".to_string()))
    }

    fn create_surface(&self, instance: &ash::Instance) -> VulkanResult<vk::SurfaceKHR> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self
            .window
            .create_window_surface(instance.handle(), std::ptr::null(), &mut surface);
        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(VulkanError::Api(result))
        }
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }
}

fn move_direction(key: glfw::Key) -> Option<MoveDirection> {
    match key {
        glfw::Key::A | glfw::Key::Left => Some(MoveDirection::Left),
        glfw::Key::D | glfw::Key::Right => Some(MoveDirection::Right),
        glfw::Key::W | glfw::Key::Up => Some(MoveDirection::Forward),
        glfw::Key::S | glfw::Key::Down => Some(MoveDirection::Backward),
        _ => None,
    }
}

/// Map a GLFW event onto the renderer's events; unrelated events map to `None`
pub fn translate_event(event: &glfw::WindowEvent) -> Option<ViewerEvent> {
    match *event {
        glfw::WindowEvent::Key(key, _, action, _) => {
            let pressed = match action {
                glfw::Action::Press => true,
                glfw::Action::Release => false,
                glfw::Action::Repeat => return None,
            };
            move_direction(key).map(|direction| ViewerEvent::Input(InputEvent::Key { direction, pressed }))
        }
        glfw::WindowEvent::MouseButton(button, action, _) => {
            let button = match button {
                glfw::MouseButtonLeft => MouseButton::Left,
                glfw::MouseButtonRight => MouseButton::Right,
                _ => MouseButton::Other,
            };
            Some(ViewerEvent::Input(InputEvent::MouseButton {
                button,
                pressed: action != glfw::Action::Release,
            }))
        }
        glfw::WindowEvent::CursorPos(x, y) => Some(ViewerEvent::Input(InputEvent::CursorMoved { x, y })),
        glfw::WindowEvent::Scroll(_, y) => Some(ViewerEvent::Input(InputEvent::Scroll { delta: y as f32 })),
        glfw::WindowEvent::FramebufferSize(width, height) => Some(ViewerEvent::Window(WindowEvent::Resized {
            width: width.max(0) as u32,
            height: height.max(0) as u32,
        })),
        glfw::WindowEvent::Iconify(true) => Some(ViewerEvent::Window(WindowEvent::Minimized)),
        glfw::WindowEvent::Iconify(false) => Some(ViewerEvent::Window(WindowEvent::Restored)),
        glfw::WindowEvent::Close => Some(ViewerEvent::Window(WindowEvent::CloseRequested)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movement_keys_translate() {
        let press = glfw::WindowEvent::Key(glfw::Key::W, 0, glfw::Action::Press, glfw::Modifiers::empty());
        assert_eq!(
            translate_event(&press),
            Some(ViewerEvent::Input(InputEvent::Key { direction: MoveDirection::Forward, pressed: true }))
        );

        let repeat = glfw::WindowEvent::Key(glfw::Key::W, 0, glfw::Action::Repeat, glfw::Modifiers::empty());
        assert_eq!(translate_event(&repeat), None);
    }

    #[test]
    fn test_iconify_maps_to_minimize_and_restore() {
        assert_eq!(
            translate_event(&glfw::WindowEvent::Iconify(true)),
            Some(ViewerEvent::Window(WindowEvent::Minimized))
        );
        assert_eq!(
            translate_event(&glfw::WindowEvent::Iconify(false)),
            Some(ViewerEvent::Window(WindowEvent::Restored))
        );
    }
}
