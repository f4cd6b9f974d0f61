//! GPU resources: memory, transfers, descriptors and textures

pub mod descriptor_set;
pub mod memory;
pub mod texture;
pub mod transfer;

pub use descriptor_set::{
    DescriptorPool, DescriptorPoolSizes, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter,
};
pub use memory::{create_image_view, select_memory_type, GpuAllocator, GpuBuffer, GpuImage, SharingPolicy};
pub use texture::{SamplerSettings, Texture};
pub use transfer::{
    barrier_masks, BarrierMasks, ImageUploadStep, OneShotTransfer, StagingUploader, TransferChannel, IMAGE_UPLOAD_STEPS,
};
