//! Physical device selection and logical device creation

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Instance};
use std::ffi::CStr;

use super::surface::SurfaceBinding;
use crate::render::primitives::camera::CameraPushConstants;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Graphics, compute and present queue family indices
///
/// Each capability takes the first family that offers it, independently of
/// the others, so two or all three may coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for drawing and for all transfers
    pub graphics: u32,
    /// Family reserved for compute work
    pub compute: u32,
    /// Family that presents to the surface
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Search a queue-family table
    ///
    /// Returns `Ok(None)` when any of the three capabilities is missing.
    pub fn find<F>(families: &[vk::QueueFamilyProperties], mut supports_present: F) -> VulkanResult<Option<Self>>
    where
        F: FnMut(u32) -> VulkanResult<bool>,
    {
        let mut graphics = None;
        let mut compute = None;
        let mut present = None;

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            if family.queue_count == 0 {
                continue;
            }

            if graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics = Some(index);
            }
            if compute.is_none() && family.queue_flags.contains(vk::QueueFlags::COMPUTE) {
                compute = Some(index);
            }
            if present.is_none() && supports_present(index)? {
                present = Some(index);
            }

            if graphics.is_some() && compute.is_some() && present.is_some() {
                break;
            }
        }

        Ok(match (graphics, compute, present) {
            (Some(graphics), Some(compute), Some(present)) => Some(Self { graphics, compute, present }),
            _ => None,
        })
    }

    /// Distinct family indices in first-seen order
    pub fn unique(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);
        for family in [self.graphics, self.compute, self.present] {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// Descriptor-indexing support relevant to the material array
///
/// The fragment shader indexes the material uniform array and the five
/// sampler arrays with `nonuniformEXT(materialId)`, so every field must be
/// set for the scene pipeline to be valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorIndexingSupport {
    /// Unwritten array elements are allowed when never accessed
    pub partially_bound: bool,
    /// Sampler arrays may be indexed with dynamically uniform values (core)
    pub sampled_image_dynamic: bool,
    /// Uniform buffer arrays may be indexed with dynamically uniform values (core)
    pub uniform_buffer_dynamic: bool,
    /// Sampler arrays may be indexed with per-vertex material ids
    pub sampled_image_non_uniform: bool,
    /// Uniform buffer arrays may be indexed with per-vertex material ids
    pub uniform_buffer_non_uniform: bool,
}

impl DescriptorIndexingSupport {
    /// Everything the scene shaders use
    pub const REQUIRED: Self = Self {
        partially_bound: true,
        sampled_image_dynamic: true,
        uniform_buffer_dynamic: true,
        sampled_image_non_uniform: true,
        uniform_buffer_non_uniform: true,
    };

    /// Vulkan name of the first required feature this device lacks
    pub fn missing_feature(&self) -> Option<&'static str> {
        [
            (self.partially_bound, "descriptorBindingPartiallyBound"),
            (self.sampled_image_dynamic, "shaderSampledImageArrayDynamicIndexing"),
            (self.uniform_buffer_dynamic, "shaderUniformBufferArrayDynamicIndexing"),
            (self.sampled_image_non_uniform, "shaderSampledImageArrayNonUniformIndexing"),
            (self.uniform_buffer_non_uniform, "shaderUniformBufferArrayNonUniformIndexing"),
        ]
        .into_iter()
        .find_map(|(supported, name)| (!supported).then_some(name))
    }
}

/// Check that every `required` extension name appears in `available`
pub fn has_required_extensions(available: &[vk::ExtensionProperties], required: &[&CStr]) -> bool {
    required.iter().all(|required| {
        available.iter().any(|extension| {
            let name = unsafe { CStr::from_ptr(extension.extension_name.as_ptr()) };
            name == *required
        })
    })
}

/// Lower is better
fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u8 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types, used for every allocation
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Resolved queue families
    pub queue_families: QueueFamilyIndices,
    /// Descriptor-indexing features
    pub indexing: DescriptorIndexingSupport,
}

impl PhysicalDeviceInfo {
    /// Select a suitable physical device for rendering
    ///
    /// Without a surface (headless) the present family falls back to the
    /// graphics family and the swapchain extension is not required.
    pub fn select_suitable_device(instance: &Instance, surface: Option<&SurfaceBinding>) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices()? };

        let mut rejections = Vec::new();
        let mut best: Option<Self> = None;
        for device in devices {
            match Self::evaluate_device(instance, device, surface)? {
                Ok(info) => {
                    let better = best.as_ref().map_or(true, |current| {
                        device_type_rank(info.properties.device_type)
                            < device_type_rank(current.properties.device_type)
                    });
                    if better {
                        best = Some(info);
                    }
                }
                Err(reason) => {
                    log::debug!("Rejected GPU: {}", reason);
                    rejections.push(reason);
                }
            }
        }

        let info = best.ok_or_else(|| {
            if rejections.is_empty() {
                VulkanError::NoSuitableDevice("no Vulkan devices present".to_string())
            } else {
                VulkanError::NoSuitableDevice(rejections.join("; "))
            }
        })?;

        log::info!(
            "Selected GPU: {} ({:?}), queue families {:?}",
            info.name(),
            info.properties.device_type,
            info.queue_families
        );
        Ok(info)
    }

    /// Device name as reported by the driver
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Evaluate one device; the inner `Err` carries a rejection reason
    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: Option<&SurfaceBinding>,
    ) -> VulkanResult<Result<Self, String>> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        if properties.api_version < vk::API_VERSION_1_2 {
            return Ok(Err(format!("{}: Vulkan 1.2 not supported", name)));
        }

        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let queue_families = match surface {
            Some(surface) => QueueFamilyIndices::find(&families, |index| surface.supports_present(device, index))?,
            None => QueueFamilyIndices::find(&families, |index| {
                Ok(families[index as usize].queue_flags.contains(vk::QueueFlags::GRAPHICS))
            })?,
        };
        let Some(queue_families) = queue_families else {
            return Ok(Err(format!("{}: missing graphics, compute or present queue family", name)));
        };

        let extensions = unsafe { instance.enumerate_device_extension_properties(device)? };
        if !has_required_extensions(&extensions, &required_device_extensions(surface.is_some())) {
            return Ok(Err(format!("{}: required device extensions not supported", name)));
        }

        if let Some(surface) = surface {
            let support = surface.query_support(device)?;
            if support.formats.is_empty() || support.present_modes.is_empty() {
                return Ok(Err(format!("{}: surface reports no formats or present modes", name)));
            }
        }

        let indexing = query_descriptor_indexing(instance, device);
        if let Some(feature) = indexing.missing_feature() {
            return Ok(Err(format!("{}: {} not supported", name, feature)));
        }

        let push_constant_bytes = std::mem::size_of::<CameraPushConstants>() as u32;
        if properties.limits.max_push_constants_size < push_constant_bytes {
            return Ok(Err(format!(
                "{}: push constant limit {} < {} bytes",
                name, properties.limits.max_push_constants_size, push_constant_bytes
            )));
        }

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        Ok(Ok(Self {
            device,
            properties,
            memory_properties,
            queue_families,
            indexing,
        }))
    }
}

fn required_device_extensions(presenting: bool) -> Vec<&'static CStr> {
    if presenting {
        vec![SwapchainLoader::name()]
    } else {
        Vec::new()
    }
}

fn query_descriptor_indexing(instance: &Instance, device: vk::PhysicalDevice) -> DescriptorIndexingSupport {
    let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::builder()
        .push_next(&mut vulkan12)
        .build();
    unsafe { instance.get_physical_device_features2(device, &mut features2) };
    let core = features2.features;

    DescriptorIndexingSupport {
        partially_bound: vulkan12.descriptor_binding_partially_bound == vk::TRUE,
        sampled_image_dynamic: core.shader_sampled_image_array_dynamic_indexing == vk::TRUE,
        uniform_buffer_dynamic: core.shader_uniform_buffer_array_dynamic_indexing == vk::TRUE,
        sampled_image_non_uniform: vulkan12.shader_sampled_image_array_non_uniform_indexing == vk::TRUE,
        uniform_buffer_non_uniform: vulkan12.shader_uniform_buffer_array_non_uniform_indexing == vk::TRUE,
    }
}

/// Logical device with its three queues
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue, also used for transfers
    pub graphics_queue: vk::Queue,
    /// Compute queue
    pub compute_queue: vk::Queue,
    /// Surface presentation queue
    pub present_queue: vk::Queue,
    /// Swapchain extension loader (absent when headless)
    pub swapchain_loader: Option<SwapchainLoader>,
}

impl LogicalDevice {
    /// Create a new logical device with one queue per distinct family
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo, presenting: bool) -> VulkanResult<Self> {
        let families = physical_device.queue_families;
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_names: Vec<*const std::os::raw::c_char> = required_device_extensions(presenting)
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        // Device selection already rejected anything missing these
        let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::builder()
            .descriptor_binding_partially_bound(true)
            .shader_sampled_image_array_non_uniform_indexing(true)
            .shader_uniform_buffer_array_non_uniform_indexing(true);

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .shader_sampled_image_array_dynamic_indexing(true)
            .shader_uniform_buffer_array_dynamic_indexing(true)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&device_features)
            .push_next(&mut vulkan12);

        let device = unsafe { instance.create_device(physical_device.device, &create_info, None)? };

        let (graphics_queue, compute_queue, present_queue) = unsafe {
            (
                device.get_device_queue(families.graphics, 0),
                device.get_device_queue(families.compute, 0),
                device.get_device_queue(families.present, 0),
            )
        };

        let swapchain_loader = presenting.then(|| SwapchainLoader::new(instance, &device));

        Ok(Self {
            device,
            graphics_queue,
            compute_queue,
            present_queue,
            swapchain_loader,
        })
    }

    /// Wait for idle and destroy the device
    pub fn destroy(&self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::warn!("Failed to wait for device idle before destroying it: {:?}", e);
            }
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn extension(name: &str) -> vk::ExtensionProperties {
        let mut props = vk::ExtensionProperties::default();
        for (dst, src) in props.extension_name.iter_mut().zip(name.bytes()) {
            *dst = src as std::os::raw::c_char;
        }
        props
    }

    #[test]
    fn test_single_family_serves_all_capabilities() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
        let found = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap().unwrap();
        assert_eq!(found, QueueFamilyIndices { graphics: 0, compute: 0, present: 0 });
        assert_eq!(found.unique(), vec![0]);
    }

    #[test]
    fn test_first_match_per_capability_is_independent() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let found = QueueFamilyIndices::find(&families, |index| Ok(index == 3)).unwrap().unwrap();
        assert_eq!(found.graphics, 2);
        assert_eq!(found.compute, 1);
        assert_eq!(found.present, 3);
        assert_eq!(found.unique(), vec![2, 1, 3]);
    }

    #[test]
    fn test_missing_capability_yields_none() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let found = QueueFamilyIndices::find(&families, |_| Ok(false)).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_empty_families_are_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let found = QueueFamilyIndices::find(&families, |_| Ok(true)).unwrap().unwrap();
        assert_eq!(found.unique(), vec![1]);
    }

    #[test]
    fn test_present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = QueueFamilyIndices::find(&families, |_| Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR)));
        assert!(matches!(result, Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))));
    }

    #[test]
    fn test_required_extensions_check() {
        let available = [extension("VK_KHR_swapchain"), extension("VK_KHR_maintenance1")];
        assert!(has_required_extensions(&available, &[SwapchainLoader::name()]));
        assert!(has_required_extensions(&available, &[]));
        assert!(!has_required_extensions(&available[1..], &[SwapchainLoader::name()]));
    }

    #[test]
    fn test_full_indexing_support_is_accepted() {
        assert_eq!(DescriptorIndexingSupport::REQUIRED.missing_feature(), None);
    }

    #[test]
    fn test_each_missing_indexing_feature_is_named() {
        let required = DescriptorIndexingSupport::REQUIRED;
        let cases = [
            (
                DescriptorIndexingSupport { partially_bound: false, ..required },
                "descriptorBindingPartiallyBound",
            ),
            (
                DescriptorIndexingSupport { sampled_image_dynamic: false, ..required },
                "shaderSampledImageArrayDynamicIndexing",
            ),
            (
                DescriptorIndexingSupport { uniform_buffer_dynamic: false, ..required },
                "shaderUniformBufferArrayDynamicIndexing",
            ),
            (
                DescriptorIndexingSupport { sampled_image_non_uniform: false, ..required },
                "shaderSampledImageArrayNonUniformIndexing",
            ),
            (
                DescriptorIndexingSupport { uniform_buffer_non_uniform: false, ..required },
                "shaderUniformBufferArrayNonUniformIndexing",
            ),
        ];
        for (support, expected) in cases {
            assert_eq!(support.missing_feature(), Some(expected));
        }
    }

    #[test]
    fn test_partial_binding_alone_is_rejected() {
        let support = DescriptorIndexingSupport {
            partially_bound: true,
            ..DescriptorIndexingSupport::default()
        };
        assert_eq!(support.missing_feature(), Some("shaderSampledImageArrayDynamicIndexing"));
    }

    #[test]
    fn test_discrete_gpu_ranks_first() {
        assert!(device_type_rank(vk::PhysicalDeviceType::DISCRETE_GPU)
            < device_type_rank(vk::PhysicalDeviceType::INTEGRATED_GPU));
        assert!(device_type_rank(vk::PhysicalDeviceType::INTEGRATED_GPU)
            < device_type_rank(vk::PhysicalDeviceType::CPU));
    }
}
