//! # Rendering
//!
//! The Vulkan backend, the camera and the overlay boundary.
//!
//! ## Frame Structure
//!
//! Each frame records two render passes into one command buffer: the scene
//! pass (cleared color and depth, one draw for the whole scene) followed by
//! the overlay pass, which loads the scene image and leaves it ready to
//! present.

/// Vulkan backend
pub mod vulkan;

// Camera and push-constant data
pub mod primitives;

/// Overlay collaborator interface
pub mod overlay;

pub use overlay::{route_input, NoOverlay, Overlay, OverlayTarget};
pub use primitives::{Camera, CameraPushConstants};
pub use vulkan::renderer::FrameOutcome;
pub use vulkan::{RendererError, VulkanRenderer};
