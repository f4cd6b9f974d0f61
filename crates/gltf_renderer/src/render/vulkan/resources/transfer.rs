//! Host to device transfers
//!
//! [`TransferChannel`] is the seam: the scene upload code only asks for
//! "run these commands and return when done". [`OneShotTransfer`] answers
//! that with a throwaway command buffer on the graphics queue followed by a
//! full device idle wait. Uploads happen once before the render loop, so the
//! serialization is acceptable.

use ash::{vk, Device};

use super::memory::{GpuAllocator, GpuBuffer, GpuImage, SharingPolicy};
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Something that can execute a batch of recorded commands to completion
pub trait TransferChannel {
    /// Record commands with `record` and block until the GPU has executed them
    fn submit_one_shot(&self, record: &mut dyn FnMut(&Device, vk::CommandBuffer)) -> VulkanResult<()>;
}

/// One-shot command buffers on the graphics queue
pub struct OneShotTransfer {
    device: Device,
    command_pool: vk::CommandPool,
    queue: vk::Queue,
}

impl OneShotTransfer {
    /// Transfer channel over the context's graphics pool and queue
    pub fn new(context: &VulkanContext) -> Self {
        Self {
            device: context.device().clone(),
            command_pool: context.graphics_command_pool(),
            queue: context.graphics_queue(),
        }
    }

    fn record_and_submit(
        &self,
        command_buffer: vk::CommandBuffer,
        record: &mut dyn FnMut(&Device, vk::CommandBuffer),
    ) -> VulkanResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device.begin_command_buffer(command_buffer, &begin_info)?;
        }
        record(&self.device, command_buffer);

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();

        unsafe {
            self.device.end_command_buffer(command_buffer)?;
            self.device.queue_submit(self.queue, &[submit_info], vk::Fence::null())?;
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl TransferChannel for OneShotTransfer {
    fn submit_one_shot(&self, record: &mut dyn FnMut(&Device, vk::CommandBuffer)) -> VulkanResult<()> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { self.device.allocate_command_buffers(&alloc_info)? }
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: "driver returned no command buffer".to_string(),
            })?;

        let result = self.record_and_submit(command_buffer, record);

        unsafe {
            self.device.free_command_buffers(self.command_pool, &[command_buffer]);
        }
        result
    }
}

/// One command of an image upload, in recording order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageUploadStep {
    /// Pipeline barrier moving the image between layouts
    Transition {
        /// Layout before the barrier
        old_layout: vk::ImageLayout,
        /// Layout after the barrier
        new_layout: vk::ImageLayout,
    },
    /// Staging buffer to image copy
    CopyFromStaging,
}

/// Commands recorded by [`StagingUploader::upload_image`]
pub const IMAGE_UPLOAD_STEPS: [ImageUploadStep; 3] = [
    ImageUploadStep::Transition {
        old_layout: vk::ImageLayout::UNDEFINED,
        new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    },
    ImageUploadStep::CopyFromStaging,
    ImageUploadStep::Transition {
        old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    },
];

/// Access masks and stages for one layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierMasks {
    /// Writes that must be available before the barrier
    pub src_access: vk::AccessFlags,
    /// Accesses that wait on the barrier
    pub dst_access: vk::AccessFlags,
    /// Stage producing `src_access`
    pub src_stage: vk::PipelineStageFlags,
    /// Stage consuming `dst_access`
    pub dst_stage: vk::PipelineStageFlags,
}

/// Masks for the two transitions of an image upload
///
/// Anything other than `UNDEFINED -> TRANSFER_DST_OPTIMAL` is treated as the
/// transfer-to-fragment-shader handoff.
pub fn barrier_masks(old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> BarrierMasks {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => BarrierMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        _ => BarrierMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
    }
}

/// Record an image layout transition covering the single mip and layer
fn transition_image_layout(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let masks = barrier_masks(old_layout, new_layout);

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access)
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Staging-buffer uploads through a [`TransferChannel`]
pub struct StagingUploader<'a, T: TransferChannel + ?Sized> {
    allocator: &'a GpuAllocator,
    channel: &'a T,
}

impl<'a, T: TransferChannel + ?Sized> StagingUploader<'a, T> {
    /// Uploader allocating through `allocator` and copying through `channel`
    pub fn new(allocator: &'a GpuAllocator, channel: &'a T) -> Self {
        Self { allocator, channel }
    }

    /// Host-visible, host-coherent buffer filled with `bytes`
    ///
    /// Unmapped inside `write_bytes`, before the copy is submitted; the
    /// memory is coherent, so no flush is needed.
    fn create_staging(&self, bytes: &[u8]) -> VulkanResult<GpuBuffer> {
        let staging = self.allocator.create_buffer(
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &SharingPolicy::Exclusive,
        )?;
        if let Err(e) = staging.write_bytes(self.allocator.device(), bytes) {
            staging.destroy(self.allocator.device());
            return Err(e);
        }
        Ok(staging)
    }

    /// Upload `bytes` into a new device-local buffer
    ///
    /// `TRANSFER_DST` is added to `usage`. An empty slice creates nothing and
    /// returns `Ok(None)`.
    pub fn upload_buffer(
        &self,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
        sharing: &SharingPolicy,
    ) -> VulkanResult<Option<GpuBuffer>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let device = self.allocator.device();
        let size = bytes.len() as vk::DeviceSize;

        let staging = self.create_staging(bytes)?;
        let destination = match self.allocator.create_buffer(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            sharing,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                staging.destroy(device);
                return Err(e);
            }
        };

        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size };
        let result = self.channel.submit_one_shot(&mut |device: &Device, command_buffer: vk::CommandBuffer| unsafe {
            device.cmd_copy_buffer(command_buffer, staging.handle(), destination.handle(), &[region]);
        });

        staging.destroy(device);
        match result {
            Ok(()) => Ok(Some(destination)),
            Err(e) => {
                destination.destroy(device);
                Err(e)
            }
        }
    }

    /// Upload tightly packed pixels into a new sampled image
    ///
    /// The image ends in `SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload_image(&self, pixels: &[u8], extent: vk::Extent2D, format: vk::Format) -> VulkanResult<GpuImage> {
        if pixels.is_empty() || extent.width == 0 || extent.height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("empty image upload ({}x{})", extent.width, extent.height),
            });
        }
        let device = self.allocator.device();

        let staging = self.create_staging(pixels)?;
        let image = match self.allocator.create_image(
            extent,
            format,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) {
            Ok(image) => image,
            Err(e) => {
                staging.destroy(device);
                return Err(e);
            }
        };

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };

        let result = self.channel.submit_one_shot(&mut |device: &Device, command_buffer: vk::CommandBuffer| {
            for step in IMAGE_UPLOAD_STEPS {
                match step {
                    ImageUploadStep::Transition { old_layout, new_layout } => {
                        transition_image_layout(device, command_buffer, image.handle(), old_layout, new_layout);
                    }
                    ImageUploadStep::CopyFromStaging => unsafe {
                        device.cmd_copy_buffer_to_image(
                            command_buffer,
                            staging.handle(),
                            image.handle(),
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &[region],
                        );
                    },
                }
            }
        });

        staging.destroy(device);
        match result {
            Ok(()) => Ok(image),
            Err(e) => {
                image.destroy(device);
                Err(e)
            }
        }
    }

    /// Copy a device buffer back to the host
    ///
    /// The source needs `TRANSFER_SRC` usage.
    pub fn read_back(&self, source: &GpuBuffer) -> VulkanResult<Vec<u8>> {
        let device = self.allocator.device();
        let readback = self.allocator.create_buffer(
            source.size(),
            vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            &SharingPolicy::Exclusive,
        )?;

        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size: source.size() };
        let result = self
            .channel
            .submit_one_shot(&mut |device: &Device, command_buffer: vk::CommandBuffer| unsafe {
                device.cmd_copy_buffer(command_buffer, source.handle(), readback.handle(), &[region]);
            })
            .and_then(|()| readback.read_bytes(device));

        readback.destroy(device);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Counts submissions without touching a device
    struct CountingChannel {
        submissions: Cell<usize>,
    }

    impl TransferChannel for CountingChannel {
        fn submit_one_shot(&self, _record: &mut dyn FnMut(&Device, vk::CommandBuffer)) -> VulkanResult<()> {
            self.submissions.set(self.submissions.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn test_image_upload_wraps_copy_in_two_transitions() {
        assert_eq!(
            IMAGE_UPLOAD_STEPS,
            [
                ImageUploadStep::Transition {
                    old_layout: vk::ImageLayout::UNDEFINED,
                    new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                },
                ImageUploadStep::CopyFromStaging,
                ImageUploadStep::Transition {
                    old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                },
            ]
        );
    }

    #[test]
    fn test_copy_happens_in_transfer_dst_layout() {
        let mut layout = vk::ImageLayout::UNDEFINED;
        for step in IMAGE_UPLOAD_STEPS {
            match step {
                ImageUploadStep::Transition { old_layout, new_layout } => {
                    assert_eq!(old_layout, layout);
                    layout = new_layout;
                }
                ImageUploadStep::CopyFromStaging => assert_eq!(layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            }
        }
        assert_eq!(layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_barrier_masks_for_upload_transitions() {
        let before_copy = barrier_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(before_copy.src_access, vk::AccessFlags::empty());
        assert_eq!(before_copy.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(before_copy.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(before_copy.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let after_copy = barrier_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(after_copy.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(after_copy.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(after_copy.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(after_copy.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_channel_is_object_safe() {
        let channel = CountingChannel { submissions: Cell::new(0) };
        let dynamic: &dyn TransferChannel = &channel;
        dynamic.submit_one_shot(&mut |_: &Device, _: vk::CommandBuffer| {}).unwrap();
        dynamic.submit_one_shot(&mut |_: &Device, _: vk::CommandBuffer| {}).unwrap();
        assert_eq!(channel.submissions.get(), 2);
    }
}
