//! Overlay boundary
//!
//! An overlay (debug UI, HUD) draws in its own render pass after the scene,
//! into the same swapchain image. The renderer hands it an [`OverlayTarget`]
//! describing everything it needs to build its own pipelines and re-notifies
//! it whenever the swapchain is rebuilt.

use ash::vk;

use crate::input::{InputEvent, InputState};
use crate::render::vulkan::rendering::ActiveRenderPass;
use crate::render::vulkan::VulkanResult;

/// Handles and counts an overlay backend initializes against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayTarget {
    /// Overlay render pass (loads the scene image, ends in present layout)
    pub render_pass: vk::RenderPass,
    /// Queue the overlay submits uploads to
    pub graphics_queue: vk::Queue,
    /// Family of `graphics_queue`
    pub queue_family: u32,
    /// Pool for one-shot uploads (font atlases)
    pub command_pool: vk::CommandPool,
    /// Shared descriptor pool with sampler headroom reserved for the overlay
    pub descriptor_pool: vk::DescriptorPool,
    /// Swapchain image count
    pub image_count: usize,
    /// Minimum image count the swapchain was created with
    pub min_image_count: u32,
    /// Swapchain color format
    pub format: vk::Format,
    /// Swapchain extent
    pub extent: vk::Extent2D,
}

/// Something drawn on top of the scene
pub trait Overlay {
    /// Record draw commands into the open overlay pass
    fn record(&mut self, pass: &mut ActiveRenderPass<'_, '_>) -> VulkanResult<()>;

    /// The swapchain (and possibly the overlay render pass) was rebuilt
    fn swapchain_recreated(&mut self, _target: &OverlayTarget) -> VulkanResult<()> {
        Ok(())
    }

    /// Offer an input event; `true` means the overlay consumed it
    fn handle_input(&mut self, _event: &InputEvent) -> bool {
        false
    }
}

/// Overlay that draws nothing and consumes nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl Overlay for NoOverlay {
    fn record(&mut self, _pass: &mut ActiveRenderPass<'_, '_>) -> VulkanResult<()> {
        Ok(())
    }
}

/// Give `overlay` first refusal on `event`; the camera input only sees what
/// it does not consume
#[must_use]
pub fn route_input(overlay: &mut dyn Overlay, input: InputState, event: &InputEvent) -> InputState {
    if overlay.handle_input(event) {
        input
    } else {
        input.apply(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{MouseButton, MoveDirection};

    /// Captures every mouse event, as a UI with a hovered window would
    struct MouseCapture;

    impl Overlay for MouseCapture {
        fn record(&mut self, _pass: &mut ActiveRenderPass<'_, '_>) -> VulkanResult<()> {
            Ok(())
        }

        fn handle_input(&mut self, event: &InputEvent) -> bool {
            !matches!(event, InputEvent::Key { .. })
        }
    }

    #[test]
    fn test_consumed_events_do_not_reach_camera() {
        let mut overlay = MouseCapture;
        let press = InputEvent::MouseButton { button: MouseButton::Right, pressed: true };
        let key = InputEvent::Key { direction: MoveDirection::Forward, pressed: true };

        let state = route_input(&mut overlay, InputState::default(), &press);
        let state = route_input(&mut overlay, state, &key);

        assert!(!state.right_button_down);
        assert!(state.move_forward);
    }

    #[test]
    fn test_no_overlay_passes_everything() {
        let scroll = InputEvent::Scroll { delta: 2.0 };
        let state = route_input(&mut NoOverlay, InputState::default(), &scroll);
        assert_eq!(state.wheel_delta, 2.0);
    }
}
