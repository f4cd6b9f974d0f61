//! Instance, device and surface setup

pub mod context;
pub mod device;
pub mod surface;

pub use context::{VulkanContext, VulkanInstance};
pub use device::{DescriptorIndexingSupport, LogicalDevice, PhysicalDeviceInfo, QueueFamilyIndices};
pub use surface::{SurfaceBinding, SurfaceSupport, WindowSurface};
