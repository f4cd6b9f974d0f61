//! Buffer and image allocation with explicitly chosen memory types
//!
//! Every allocation follows the same steps: create the object, query its
//! memory requirements, pick a memory type with [`select_memory_type`],
//! allocate, bind. Objects are plain values; their owner calls `destroy`
//! before the device goes away.

use ash::{vk, Device};

use crate::render::vulkan::{QueueFamilyIndices, VulkanContext, VulkanError, VulkanResult};

/// Pick the lowest-indexed memory type allowed by `type_bits` whose flags
/// contain `flags`
///
/// First match wins; there is no best-fit search.
pub fn select_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count)
        .find(|&index| {
            type_bits & (1 << index) != 0
                && memory_properties.memory_types[index as usize]
                    .property_flags
                    .contains(flags)
        })
        .ok_or(VulkanError::NoSuitableMemoryType { type_bits, flags })
}

/// Queue-family sharing for a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SharingPolicy {
    /// Owned by one family at a time
    Exclusive,
    /// Accessed by several distinct families without ownership transfers
    Concurrent(Vec<u32>),
}

impl SharingPolicy {
    /// Concurrent across the distinct entries of `families` when there are
    /// at least two, exclusive otherwise
    pub fn for_families(families: &[u32]) -> Self {
        let mut distinct: Vec<u32> = Vec::with_capacity(families.len());
        for &family in families {
            if !distinct.contains(&family) {
                distinct.push(family);
            }
        }
        if distinct.len() > 1 {
            Self::Concurrent(distinct)
        } else {
            Self::Exclusive
        }
    }

    /// Sharing for buffers read by both graphics and compute work
    pub fn graphics_and_compute(families: QueueFamilyIndices) -> Self {
        Self::for_families(&[families.graphics, families.compute])
    }

    /// Vulkan sharing mode
    pub fn mode(&self) -> vk::SharingMode {
        match self {
            Self::Exclusive => vk::SharingMode::EXCLUSIVE,
            Self::Concurrent(_) => vk::SharingMode::CONCURRENT,
        }
    }

    /// Family indices to list in the create info (empty when exclusive)
    pub fn family_indices(&self) -> &[u32] {
        match self {
            Self::Exclusive => &[],
            Self::Concurrent(families) => families,
        }
    }
}

/// A buffer with its dedicated memory allocation
#[derive(Debug)]
pub struct GpuBuffer {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl GpuBuffer {
    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Requested size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Backing allocation
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Copy `bytes` to the start of a host-visible buffer
    pub fn write_bytes(&self, device: &Device, bytes: &[u8]) -> VulkanResult<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {} bytes into a {}-byte buffer", bytes.len(), self.size),
            });
        }
        unsafe {
            let ptr = device.map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Read the whole contents of a host-visible buffer
    pub fn read_bytes(&self, device: &Device) -> VulkanResult<Vec<u8>> {
        let mut bytes = vec![0u8; self.size as usize];
        unsafe {
            let ptr = device.map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), bytes.as_mut_ptr(), bytes.len());
            device.unmap_memory(self.memory);
        }
        Ok(bytes)
    }

    /// Destroy the buffer and free its memory
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// A 2D image with its dedicated memory allocation
#[derive(Debug)]
pub struct GpuImage {
    image: vk::Image,
    memory: vk::DeviceMemory,
    extent: vk::Extent2D,
    format: vk::Format,
}

impl GpuImage {
    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Pixel extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Pixel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Create a 2D view over the whole image
    pub fn create_view(&self, device: &Device, aspect: vk::ImageAspectFlags) -> VulkanResult<vk::ImageView> {
        create_image_view(device, self.image, self.format, aspect)
    }

    /// Destroy the image and free its memory
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Create a single-mip, single-layer 2D view
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> VulkanResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe { device.create_image_view(&view_info, None).map_err(VulkanError::Api) }
}

/// Creates buffers and images against one device's memory types
#[derive(Clone)]
pub struct GpuAllocator {
    device: Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue_families: QueueFamilyIndices,
}

impl GpuAllocator {
    /// Allocator for the context's device
    pub fn new(context: &VulkanContext) -> Self {
        Self {
            device: context.device().clone(),
            memory_properties: *context.memory_properties(),
            queue_families: context.queue_families(),
        }
    }

    /// Device the allocations belong to
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Queue families, for choosing a [`SharingPolicy`]
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    /// Create a buffer backed by memory with at least `memory_flags`
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_flags: vk::MemoryPropertyFlags,
        sharing: &SharingPolicy,
    ) -> VulkanResult<GpuBuffer> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "zero-sized buffer".to_string(),
            });
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(sharing.mode())
            .queue_family_indices(sharing.family_indices());

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let memory = match self.allocate(requirements, memory_flags) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { self.device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        Ok(GpuBuffer { buffer, memory, size })
    }

    /// Create a 2D, single-mip, single-layer, optimally tiled image
    pub fn create_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        memory_flags: vk::MemoryPropertyFlags,
    ) -> VulkanResult<GpuImage> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe { self.device.create_image(&image_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let memory = match self.allocate(requirements, memory_flags) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { self.device.bind_image_memory(image, memory, 0) } {
            unsafe {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        Ok(GpuImage { image, memory, extent, format })
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        memory_flags: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let memory_type_index = select_memory_type(
            &self.memory_properties,
            requirements.memory_type_bits,
            memory_flags,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        unsafe { self.device.allocate_memory(&alloc_info, None).map_err(VulkanError::Api) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = *flags;
        }
        props
    }

    fn desktop_layout() -> vk::PhysicalDeviceMemoryProperties {
        memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        ])
    }

    #[test]
    fn test_lowest_matching_index_wins() {
        let props = desktop_layout();
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(select_memory_type(&props, 0b1111, host).unwrap(), 1);
        assert_eq!(select_memory_type(&props, 0b1111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 0);
    }

    #[test]
    fn test_superset_flags_match() {
        let props = desktop_layout();
        // Type 3 carries extra flags but still contains DEVICE_LOCAL
        assert_eq!(select_memory_type(&props, 0b1000, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(), 3);
    }

    #[test]
    fn test_type_bits_restrict_candidates() {
        let props = desktop_layout();
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(select_memory_type(&props, 0b1100, host).unwrap(), 2);
    }

    #[test]
    fn test_no_match_is_an_error() {
        let props = desktop_layout();
        let err = select_memory_type(&props, 0b0001, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(matches!(err, VulkanError::NoSuitableMemoryType { type_bits: 0b0001, .. }));
        assert!(select_memory_type(&props, 0, vk::MemoryPropertyFlags::empty()).is_err());
    }

    #[test]
    fn test_bits_beyond_type_count_are_ignored() {
        let props = desktop_layout();
        assert!(select_memory_type(&props, 1 << 10, vk::MemoryPropertyFlags::empty()).is_err());
    }

    #[test]
    fn test_exhaustive_against_linear_scan() {
        let props = desktop_layout();
        let flag_sets = [
            vk::MemoryPropertyFlags::empty(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_CACHED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE,
        ];
        for bits in 0u32..16 {
            for flags in flag_sets {
                let expected = (0..4u32).find(|&i| {
                    bits & (1 << i) != 0 && props.memory_types[i as usize].property_flags.contains(flags)
                });
                assert_eq!(select_memory_type(&props, bits, flags).ok(), expected, "bits {:#b} flags {:?}", bits, flags);
            }
        }
    }

    #[test]
    fn test_sharing_policy() {
        assert_eq!(SharingPolicy::for_families(&[0, 0]), SharingPolicy::Exclusive);
        assert_eq!(SharingPolicy::for_families(&[0, 2, 0]), SharingPolicy::Concurrent(vec![0, 2]));
        assert_eq!(SharingPolicy::Exclusive.mode(), vk::SharingMode::EXCLUSIVE);
        assert!(SharingPolicy::Exclusive.family_indices().is_empty());

        let split = QueueFamilyIndices { graphics: 0, compute: 1, present: 0 };
        let policy = SharingPolicy::graphics_and_compute(split);
        assert_eq!(policy.mode(), vk::SharingMode::CONCURRENT);
        assert_eq!(policy.family_indices(), &[0, 1]);
    }
}
