//! Vulkan backend
//!
//! Organized into initialization, resources, state and rendering modules, with
//! the frame-level renderer on top.

/// Instance, device and surface setup
pub mod initialization;

/// Memory, buffers, transfers, descriptors and textures
pub mod resources;

/// Swapchain, framebuffers and frame synchronization
pub mod state;

/// Render passes, shaders, pipeline and command recording
pub mod rendering;

/// Error types
pub mod error;

/// Frame-level renderer
pub mod renderer;

pub use error::{check_vk_result, VulkanError, VulkanResult};
pub use initialization::{
    DescriptorIndexingSupport, LogicalDevice, PhysicalDeviceInfo, QueueFamilyIndices, SurfaceBinding, SurfaceSupport,
    VulkanContext, VulkanInstance, WindowSurface,
};
pub use renderer::{RendererError, VulkanRenderer};
