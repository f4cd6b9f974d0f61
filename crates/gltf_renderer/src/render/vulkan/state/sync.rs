//! Frame synchronization
//!
//! Each frame slot owns an image-available semaphore, a render-finished
//! semaphore, an in-flight fence and a primary command buffer. A frame goes
//! through these steps:
//!
//! 1. wait for the slot's fence (the GPU is done with this slot)
//! 2. acquire the next swapchain image, signalling image-available
//! 3. reset the fence, then reset the slot's command buffer for recording
//! 4. submit, waiting on image-available at color-attachment output and
//!    signalling render-finished plus the fence
//! 5. present, waiting on render-finished
//!
//! The fence is only reset once an image was actually acquired. If acquire
//! reports the swapchain out of date, the slot stays signaled and the next
//! attempt after recreation does not block forever.
//!
//! Swapchain images are also tracked against the fence of the slot that last
//! rendered to them, so a slot never writes an image another slot still uses.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// GPU-GPU signal
#[derive(Debug, Clone, Copy)]
pub struct Semaphore {
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a binary semaphore
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None)? };
        Ok(Self { semaphore })
    }

    /// Semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Destroy the semaphore
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// GPU-CPU signal
#[derive(Debug, Clone, Copy)]
pub struct Fence {
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signaled
    pub fn new(device: &Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None)? };
        Ok(Self { fence })
    }

    /// Block until signaled or `timeout` nanoseconds pass
    pub fn wait(&self, device: &Device, timeout: u64) -> VulkanResult<()> {
        unsafe {
            device.wait_for_fences(&[self.fence], true, timeout)?;
        }
        Ok(())
    }

    /// Return to the unsignaled state
    pub fn reset(&self, device: &Device) -> VulkanResult<()> {
        unsafe {
            device.reset_fences(&[self.fence])?;
        }
        Ok(())
    }

    /// Fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Destroy the fence
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects of one frame slot
#[derive(Debug, Clone, Copy)]
pub struct FrameSync {
    /// Signaled when the acquired image may be rendered to
    pub image_available: Semaphore,
    /// Signaled when rendering finished and the image may be presented
    pub render_finished: Semaphore,
    /// Signaled when the slot's submission completed on the GPU
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the three objects, the fence starting signaled
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device)?;
        let render_finished = match Semaphore::new(device) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                image_available.destroy(device);
                return Err(e);
            }
        };
        let in_flight = match Fence::new(device, true) {
            Ok(fence) => fence,
            Err(e) => {
                render_finished.destroy(device);
                image_available.destroy(device);
                return Err(e);
            }
        };
        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Destroy all three objects
    pub fn destroy(&self, device: &Device) {
        self.in_flight.destroy(device);
        self.render_finished.destroy(device);
        self.image_available.destroy(device);
    }
}

/// Result of starting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStart {
    /// An image was acquired and the command buffer is ready for recording
    Acquired {
        /// Swapchain image to render into
        image_index: u32,
        /// The swapchain still works but no longer matches the surface
        suboptimal: bool,
        /// Reset command buffer of the current slot
        command_buffer: vk::CommandBuffer,
    },
    /// The swapchain must be recreated before anything can be rendered
    OutOfDate,
}

/// Result of presenting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented against a matching swapchain
    Presented,
    /// Presented (or dropped) but the swapchain must be recreated
    NeedsRecreate,
}

/// Outcome of `vkAcquireNextImageKHR`, before any fence bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image acquired
    Acquired {
        /// Swapchain image index
        image_index: u32,
        /// Swapchain no longer matches the surface exactly
        suboptimal: bool,
    },
    /// Swapchain unusable
    OutOfDate,
}

/// Classify an acquire result; anything other than success, suboptimal or
/// out-of-date is an error
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> VulkanResult<AcquireOutcome> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired { image_index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// Classify a present result
pub fn classify_present(result: Result<bool, vk::Result>) -> VulkanResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::NeedsRecreate),
        Err(e) => Err(VulkanError::Api(e)),
    }
}

/// Whether a frame should be rendered at all; minimized windows and
/// zero-area surfaces are skipped
pub fn should_render(minimized: bool, extent: vk::Extent2D) -> bool {
    !minimized && extent.width > 0 && extent.height > 0
}

/// Index of the slot after `current`
pub fn next_frame_index(current: usize, max_frames_in_flight: usize) -> usize {
    (current + 1) % max_frames_in_flight
}

/// Frames-in-flight ring
pub struct FrameSynchronizer {
    frames: Vec<FrameSync>,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: vk::CommandPool,
    images_in_flight: Vec<vk::Fence>,
    current_frame: usize,
}

impl FrameSynchronizer {
    /// Create `max_frames_in_flight` slots, allocating one primary command
    /// buffer per slot from `command_pool` (which must allow per-buffer reset)
    pub fn new(
        device: &Device,
        command_pool: vk::CommandPool,
        max_frames_in_flight: usize,
        swapchain_image_count: usize,
    ) -> VulkanResult<Self> {
        if max_frames_in_flight == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "at least one frame in flight is required".to_string(),
            });
        }

        let mut frames: Vec<FrameSync> = Vec::with_capacity(max_frames_in_flight);
        for _ in 0..max_frames_in_flight {
            match FrameSync::new(device) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    for frame in &frames {
                        frame.destroy(device);
                    }
                    return Err(e);
                }
            }
        }

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(max_frames_in_flight as u32);

        let command_buffers = match unsafe { device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers,
            Err(e) => {
                for frame in &frames {
                    frame.destroy(device);
                }
                return Err(VulkanError::Api(e));
            }
        };

        log::debug!("Frame synchronizer created with {} frames in flight", max_frames_in_flight);

        Ok(Self {
            frames,
            command_buffers,
            command_pool,
            images_in_flight: vec![vk::Fence::null(); swapchain_image_count],
            current_frame: 0,
        })
    }

    /// Slot currently being recorded
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Number of slots
    pub fn max_frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Forget image ownership after the swapchain was rebuilt
    pub fn reset_image_tracking(&mut self, swapchain_image_count: usize) {
        self.images_in_flight = vec![vk::Fence::null(); swapchain_image_count];
    }

    /// Wait for the current slot, acquire an image and prepare the command buffer
    pub fn begin_frame(
        &mut self,
        device: &Device,
        loader: &SwapchainLoader,
        swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<FrameStart> {
        let frame = self.frames[self.current_frame];
        frame.in_flight.wait(device, u64::MAX)?;

        let acquired = unsafe {
            loader.acquire_next_image(swapchain, u64::MAX, frame.image_available.handle(), vk::Fence::null())
        };
        let (image_index, suboptimal) = match classify_acquire(acquired)? {
            AcquireOutcome::Acquired { image_index, suboptimal } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                log::debug!("Acquire reported out-of-date swapchain");
                return Ok(FrameStart::OutOfDate);
            }
        };

        if let Some(image_fence) = self.images_in_flight.get_mut(image_index as usize) {
            if *image_fence != vk::Fence::null() && *image_fence != frame.in_flight.handle() {
                unsafe {
                    device.wait_for_fences(&[*image_fence], true, u64::MAX)?;
                }
            }
            *image_fence = frame.in_flight.handle();
        }

        frame.in_flight.reset(device)?;

        let command_buffer = self.command_buffers[self.current_frame];
        unsafe {
            device.reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;
        }

        Ok(FrameStart::Acquired {
            image_index,
            suboptimal,
            command_buffer,
        })
    }

    /// Submit the recorded command buffer, present, and advance to the next slot
    pub fn submit_and_present(
        &mut self,
        device: &Device,
        loader: &SwapchainLoader,
        graphics_queue: vk::Queue,
        present_queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
    ) -> VulkanResult<PresentOutcome> {
        let frame = self.frames[self.current_frame];
        let command_buffers = [self.command_buffers[self.current_frame]];
        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished.handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            device.queue_submit(graphics_queue, &[submit_info], frame.in_flight.handle())?;
        }

        let swapchains = [swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let presented = unsafe { loader.queue_present(present_queue, &present_info) };
        self.current_frame = next_frame_index(self.current_frame, self.frames.len());

        classify_present(presented)
    }

    /// Free command buffers and destroy every slot's objects
    pub fn destroy(&mut self, device: &Device) {
        unsafe {
            if !self.command_buffers.is_empty() {
                device.free_command_buffers(self.command_pool, &self.command_buffers);
            }
        }
        self.command_buffers.clear();
        for frame in self.frames.drain(..) {
            frame.destroy(device);
        }
        self.images_in_flight.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_classification() {
        assert_eq!(
            classify_acquire(Ok((2, false))).unwrap(),
            AcquireOutcome::Acquired { image_index: 2, suboptimal: false }
        );
        assert_eq!(
            classify_acquire(Ok((0, true))).unwrap(),
            AcquireOutcome::Acquired { image_index: 0, suboptimal: true }
        );
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            AcquireOutcome::OutOfDate
        );
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn test_present_classification() {
        assert_eq!(classify_present(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(classify_present(Ok(true)).unwrap(), PresentOutcome::NeedsRecreate);
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::NeedsRecreate
        );
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn test_minimized_or_empty_surface_skips_rendering() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        assert!(should_render(false, extent));
        assert!(!should_render(true, extent));
        assert!(!should_render(false, vk::Extent2D { width: 0, height: 600 }));
        assert!(!should_render(false, vk::Extent2D { width: 800, height: 0 }));
    }

    #[test]
    fn test_frame_index_cycles() {
        let mut index = 0;
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(index);
            index = next_frame_index(index, 2);
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
        assert_eq!(next_frame_index(0, 1), 0);
    }
}
