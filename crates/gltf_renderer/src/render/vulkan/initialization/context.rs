//! Vulkan context management
//!
//! [`VulkanContext`] owns the instance, the debug messenger, the surface, the
//! logical device with its queues, and the graphics/compute command pools.
//! Everything else the renderer creates is a child of this context and must be
//! destroyed before it drops.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Entry, Instance};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use super::device::{LogicalDevice, PhysicalDeviceInfo, QueueFamilyIndices};
use super::surface::{SurfaceBinding, WindowSurface};
use crate::config::VulkanRendererConfig;
use crate::render::vulkan::{VulkanError, VulkanResult};

const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Vulkan instance with its optional debug messenger
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities loader and messenger when validation is on
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Load the Vulkan library and create an instance
    ///
    /// `window_extensions` are the platform surface extensions; pass an empty
    /// list for headless use.
    pub fn new(config: &VulkanRendererConfig, window_extensions: &[String]) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|e| VulkanError::InitializationFailed(format!("Application name: {}", e)))?;
        let engine_name = CString::new("gltf_renderer")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let cstr_extensions = window_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VulkanError::InitializationFailed(format!("Extension name: {}", e)))?;
        let mut extensions: Vec<*const c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();

        let validation = config.validation_enabled() && Self::validation_layer_available(&entry);
        if config.validation_enabled() && !validation {
            log::warn!("{} not installed, continuing without validation", VALIDATION_LAYER);
        }

        let layer_names = if validation {
            vec![CString::new(VALIDATION_LAYER).map_err(|e| VulkanError::InitializationFailed(e.to_string()))?]
        } else {
            Vec::new()
        };
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        if validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let debug = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::debug!("Vulkan instance created (validation: {})", validation);

        Ok(Self { entry, instance, debug })
    }

    fn validation_layer_available(entry: &Entry) -> bool {
        entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers.iter().any(|layer| {
                    let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                    name.to_bytes() == VALIDATION_LAYER.as_bytes()
                })
            })
            .unwrap_or(false)
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Destroy the debug messenger and the instance
    pub fn destroy(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Main Vulkan context that owns all device-level objects
pub struct VulkanContext {
    instance: VulkanInstance,
    surface: Option<SurfaceBinding>,
    physical_device: PhysicalDeviceInfo,
    device: LogicalDevice,
    graphics_command_pool: vk::CommandPool,
    compute_command_pool: vk::CommandPool,
}

impl VulkanContext {
    /// Create a context presenting to `window`
    pub fn new(config: &VulkanRendererConfig, window: &dyn WindowSurface) -> VulkanResult<Self> {
        let extensions = window.required_instance_extensions()?;
        let mut instance = VulkanInstance::new(config, &extensions)?;

        let surface = match SurfaceBinding::new(&instance.entry, &instance.instance, window) {
            Ok(surface) => surface,
            Err(e) => {
                instance.destroy();
                return Err(e);
            }
        };

        Self::with_instance(instance, Some(surface))
    }

    /// Create a context without a surface (tests, offline uploads)
    ///
    /// The present family resolves to the graphics family and no swapchain
    /// loader is created.
    pub fn headless(config: &VulkanRendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(config, &[])?;
        Self::with_instance(instance, None)
    }

    fn with_instance(mut instance: VulkanInstance, surface: Option<SurfaceBinding>) -> VulkanResult<Self> {
        let selected = PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface.as_ref())
            .and_then(|physical_device| {
                let device = LogicalDevice::new(&instance.instance, &physical_device, surface.is_some())?;
                Ok((physical_device, device))
            });

        let (physical_device, device) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                if let Some(surface) = &surface {
                    surface.destroy();
                }
                instance.destroy();
                return Err(e);
            }
        };

        let pools = Self::create_command_pool(&device.device, physical_device.queue_families.graphics)
            .and_then(|graphics| {
                Self::create_command_pool(&device.device, physical_device.queue_families.compute)
                    .map(|compute| (graphics, compute))
                    .map_err(|e| {
                        unsafe { device.device.destroy_command_pool(graphics, None) };
                        e
                    })
            });
        let (graphics_command_pool, compute_command_pool) = match pools {
            Ok(pools) => pools,
            Err(e) => {
                device.destroy();
                if let Some(surface) = &surface {
                    surface.destroy();
                }
                instance.destroy();
                return Err(e);
            }
        };

        Ok(Self {
            instance,
            surface,
            physical_device,
            device,
            graphics_command_pool,
            compute_command_pool,
        })
    }

    fn create_command_pool(device: &Device, family: u32) -> VulkanResult<vk::CommandPool> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(family);
        unsafe { device.create_command_pool(&pool_info, None).map_err(VulkanError::Api) }
    }

    /// Get a reference to the Vulkan entry
    pub fn entry(&self) -> &Entry {
        &self.instance.entry
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get a reference to the logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Selected physical device
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Memory types used for allocation
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Resolved queue families
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.physical_device.queue_families
    }

    /// Graphics queue (also used for transfers)
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Compute queue
    pub fn compute_queue(&self) -> vk::Queue {
        self.device.compute_queue
    }

    /// Present queue
    pub fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Command pool on the graphics family
    pub fn graphics_command_pool(&self) -> vk::CommandPool {
        self.graphics_command_pool
    }

    /// Command pool on the compute family
    pub fn compute_command_pool(&self) -> vk::CommandPool {
        self.compute_command_pool
    }

    /// Presentation surface; fails on a headless context
    pub fn surface(&self) -> VulkanResult<&SurfaceBinding> {
        self.surface.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "context was created without a surface".to_string(),
        })
    }

    /// Swapchain extension loader; fails on a headless context
    pub fn swapchain_loader(&self) -> VulkanResult<&SwapchainLoader> {
        self.device.swapchain_loader.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "context was created without swapchain support".to_string(),
        })
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.device.device.destroy_command_pool(self.compute_command_pool, None);
            self.device.device.destroy_command_pool(self.graphics_command_pool, None);
        }
        self.device.destroy();
        if let Some(surface) = &self.surface {
            surface.destroy();
        }
        self.instance.destroy();
        log::debug!("Vulkan context destroyed");
    }
}
