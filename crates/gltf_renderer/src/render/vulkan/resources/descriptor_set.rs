//! Descriptor set layouts, pools and writes
//!
//! Layout bindings may be arrays and may be flagged partially bound, which
//! lets the material table leave texture slots unwritten when a material has
//! no texture for that role.

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Descriptor set layout builder
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
    binding_flags: Vec<vk::DescriptorBindingFlags>,
}

impl DescriptorSetLayoutBuilder {
    /// Create a new descriptor set layout builder
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
            binding_flags: Vec::new(),
        }
    }

    fn add(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
        flags: vk::DescriptorBindingFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags)
                .build(),
        );
        self.binding_flags.push(flags);
        self
    }

    /// Add a single storage buffer binding
    pub fn add_storage_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(
            binding,
            vk::DescriptorType::STORAGE_BUFFER,
            1,
            stage_flags,
            vk::DescriptorBindingFlags::empty(),
        )
    }

    /// Add a partially bound array of uniform buffers
    pub fn add_partial_uniform_buffer_array(self, binding: u32, count: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(
            binding,
            vk::DescriptorType::UNIFORM_BUFFER,
            count,
            stage_flags,
            vk::DescriptorBindingFlags::PARTIALLY_BOUND,
        )
    }

    /// Add a partially bound array of combined image samplers
    pub fn add_partial_combined_image_sampler_array(
        self,
        binding: u32,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.add(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            count,
            stage_flags,
            vk::DescriptorBindingFlags::PARTIALLY_BOUND,
        )
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Per-binding flags, parallel to [`Self::bindings`]
    pub fn binding_flags(&self) -> &[vk::DescriptorBindingFlags] {
        &self.binding_flags
    }

    /// Build the descriptor set layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::builder()
            .binding_flags(&self.binding_flags);

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(&self.bindings)
            .push_next(&mut flags_info);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            bindings: self.bindings,
        })
    }
}

impl Default for DescriptorSetLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor set layout handle with its bindings
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayout {
    /// Get the Vulkan descriptor set layout handle
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Get the bindings used in this layout
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Destroy the layout
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Per-type descriptor counts for a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolSizes {
    /// Uniform buffers
    pub uniform_buffers: u32,
    /// Combined image samplers
    pub combined_image_samplers: u32,
    /// Storage buffers
    pub storage_buffers: u32,
    /// Maximum number of sets
    pub max_sets: u32,
}

impl DescriptorPoolSizes {
    fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        [
            (vk::DescriptorType::UNIFORM_BUFFER, self.uniform_buffers),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, self.combined_image_samplers),
            (vk::DescriptorType::STORAGE_BUFFER, self.storage_buffers),
        ]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
        .collect()
    }
}

/// Descriptor pool for allocating descriptor sets
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    sizes: DescriptorPoolSizes,
}

impl DescriptorPool {
    /// Create a new descriptor pool whose sets can be freed individually
    pub fn new(device: &Device, sizes: DescriptorPoolSizes) -> VulkanResult<Self> {
        let pool_sizes = sizes.pool_sizes();
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(sizes.max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .map_err(VulkanError::Api)?;

        log::debug!("Descriptor pool created: {:?}", sizes);
        Ok(Self { pool, sizes })
    }

    /// Allocate one set per layout
    pub fn allocate_descriptor_sets(
        &self,
        device: &Device,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VulkanResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        unsafe { device.allocate_descriptor_sets(&alloc_info) }
            .map_err(VulkanError::Api)
    }

    /// Get the pool handle
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Capacities the pool was created with
    pub fn sizes(&self) -> DescriptorPoolSizes {
        self.sizes
    }

    /// Destroy the pool and every set allocated from it
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PendingInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    set: vk::DescriptorSet,
    binding: u32,
    array_element: u32,
    descriptor_type: vk::DescriptorType,
    info: PendingInfo,
}

/// Batches descriptor writes and applies them in one update call
#[derive(Debug, Default)]
pub struct DescriptorSetWriter {
    pending: Vec<PendingWrite>,
}

impl DescriptorSetWriter {
    /// Create a new descriptor set writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a whole buffer into one array element
    pub fn write_buffer(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
    ) -> Self {
        self.pending.push(PendingWrite {
            set,
            binding,
            array_element,
            descriptor_type,
            info: PendingInfo::Buffer(vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range: vk::WHOLE_SIZE,
            }),
        });
        self
    }

    /// Write a combined image sampler into one array element
    pub fn write_image(
        mut self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        image_info: vk::DescriptorImageInfo,
    ) -> Self {
        self.pending.push(PendingWrite {
            set,
            binding,
            array_element,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            info: PendingInfo::Image(image_info),
        });
        self
    }

    /// Number of queued writes
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Apply all queued writes
    pub fn update(self, device: &Device) {
        if self.pending.is_empty() {
            return;
        }

        let writes: Vec<vk::WriteDescriptorSet> = self
            .pending
            .iter()
            .map(|pending| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(pending.set)
                    .dst_binding(pending.binding)
                    .dst_array_element(pending.array_element)
                    .descriptor_type(pending.descriptor_type);
                match &pending.info {
                    PendingInfo::Buffer(info) => builder.buffer_info(std::slice::from_ref(info)).build(),
                    PendingInfo::Image(info) => builder.image_info(std::slice::from_ref(info)).build(),
                }
            })
            .collect();

        unsafe {
            device.update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_records_partial_binding_flags() {
        let builder = DescriptorSetLayoutBuilder::new()
            .add_partial_uniform_buffer_array(0, 128, vk::ShaderStageFlags::FRAGMENT)
            .add_partial_combined_image_sampler_array(1, 128, vk::ShaderStageFlags::FRAGMENT)
            .add_storage_buffer(2, vk::ShaderStageFlags::VERTEX);

        let bindings = builder.bindings();
        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[1].descriptor_count, 128);
        assert_eq!(bindings[2].descriptor_count, 1);
        assert_eq!(
            builder.binding_flags(),
            &[
                vk::DescriptorBindingFlags::PARTIALLY_BOUND,
                vk::DescriptorBindingFlags::PARTIALLY_BOUND,
                vk::DescriptorBindingFlags::empty(),
            ]
        );
    }

    #[test]
    fn test_pool_sizes_skip_empty_types() {
        let sizes = DescriptorPoolSizes {
            uniform_buffers: 4,
            combined_image_samplers: 0,
            storage_buffers: 1,
            max_sets: 2,
        };
        let pool_sizes = sizes.pool_sizes();
        assert_eq!(pool_sizes.len(), 2);
        assert_eq!(pool_sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(pool_sizes[1].descriptor_count, 1);
    }

    #[test]
    fn test_writer_queues_in_order() {
        let writer = DescriptorSetWriter::new()
            .write_buffer(vk::DescriptorSet::null(), 0, 3, vk::DescriptorType::UNIFORM_BUFFER, vk::Buffer::null())
            .write_image(vk::DescriptorSet::null(), 1, 3, vk::DescriptorImageInfo::default());
        assert_eq!(writer.len(), 2);
        assert_eq!(writer.pending[0].array_element, 3);
        assert_eq!(writer.pending[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    }
}
