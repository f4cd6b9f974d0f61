//! Window surface boundary
//!
//! The renderer never talks to a windowing library directly. The viewer's
//! window implements [`WindowSurface`]; the context turns that into a
//! [`SurfaceBinding`] it owns and destroys.

use ash::extensions::khr::Surface;
use ash::{vk, Entry, Instance};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// What the renderer needs from a window
pub trait WindowSurface {
    /// Instance extensions the platform needs for presentation
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create a presentation surface for this window on `instance`
    fn create_surface(&self, instance: &Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Current framebuffer size in pixels
    fn framebuffer_size(&self) -> (u32, u32);
}

/// A created surface together with its extension loader
pub struct SurfaceBinding {
    loader: Surface,
    surface: vk::SurfaceKHR,
}

/// Surface properties queried for one physical device
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Capabilities snapshot (extent limits, image counts, transforms)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported formats in driver order
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes in driver order
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceBinding {
    /// Create the surface through the window and load the surface extension
    pub fn new(entry: &Entry, instance: &Instance, window: &dyn WindowSurface) -> VulkanResult<Self> {
        let loader = Surface::new(entry, instance);
        let surface = window.create_surface(instance).map_err(|e| {
            VulkanError::InitializationFailed(format!("Surface creation: {}", e))
        })?;
        Ok(Self { loader, surface })
    }

    /// Raw surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Whether `family` on `physical_device` can present to this surface
    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> VulkanResult<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, family, self.surface)
                .map_err(VulkanError::Api)
        }
    }

    /// Query capabilities, formats and present modes
    pub fn query_support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SurfaceSupport> {
        unsafe {
            let capabilities = self.loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)?;
            let formats = self.loader
                .get_physical_device_surface_formats(physical_device, self.surface)?;
            let present_modes = self.loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)?;
            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Destroy the surface; must run after the device and before the instance
    pub fn destroy(&self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}
