//! Frame-level renderer
//!
//! Owns every GPU object the viewer needs and drives the per-frame cycle:
//! gate on window state, acquire, record the scene pass and the overlay pass,
//! submit, present, and rebuild the swapchain whenever the surface asks for
//! it. Teardown runs in reverse creation order after the device is idle.

use ash::vk;
use thiserror::Error;

use super::resources::{DescriptorPool, DescriptorPoolSizes, GpuAllocator, OneShotTransfer};
use super::rendering::{full_scissor, full_viewport, CommandRecorder, ScenePipeline};
use super::state::{should_render, FrameStart, FrameSynchronizer, PresentOutcome, SwapchainManager};
use super::{VulkanContext, VulkanError, WindowSurface};
use crate::config::{ShaderConfig, VulkanRendererConfig};
use crate::input::WindowEvent;
use crate::render::overlay::{Overlay, OverlayTarget};
use crate::render::primitives::Camera;
use crate::scene::{SceneData, SceneError, SceneResources, MAX_MATERIAL_COUNT};

/// Errors surfaced by [`VulkanRenderer`]
#[derive(Error, Debug)]
pub enum RendererError {
    /// Device, swapchain or command failure
    #[error(transparent)]
    Vulkan(#[from] VulkanError),

    /// Scene upload failure
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// What one call to [`VulkanRenderer::render_frame`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented
    Rendered,
    /// Nothing was drawn (minimized or zero-sized window)
    Skipped,
    /// The swapchain was rebuilt instead of (or after) drawing
    SwapchainRecreated,
}

/// Shared pool sizing: the material table, the model-matrix set and the
/// overlay's sampler headroom
pub fn scene_pool_sizes(overlay_sampler_reserve: u32) -> DescriptorPoolSizes {
    DescriptorPoolSizes {
        uniform_buffers: MAX_MATERIAL_COUNT,
        combined_image_samplers: 5 * MAX_MATERIAL_COUNT + overlay_sampler_reserve,
        storage_buffers: 1,
        max_sets: 2 + overlay_sampler_reserve,
    }
}

/// Vulkan renderer for one loaded glTF scene
pub struct VulkanRenderer {
    swapchain: SwapchainManager,
    frames: Option<FrameSynchronizer>,
    descriptor_pool: Option<DescriptorPool>,
    scene: SceneResources,
    pipeline: Option<ScenePipeline>,
    shaders: ShaderConfig,
    clear_color: [f32; 4],
    minimized: bool,
    resize_pending: bool,
    // Dropped last; its Drop destroys the device
    context: VulkanContext,
}

impl VulkanRenderer {
    /// Create the device, swapchain, frame ring, descriptor pool, scene
    /// resources and pipeline, in that order
    ///
    /// Anything created before a failing step is torn down again.
    pub fn new(
        config: &VulkanRendererConfig,
        scene: &SceneData,
        window: &dyn WindowSurface,
    ) -> Result<Self, RendererError> {
        log::debug!("Creating VulkanRenderer...");
        config
            .validate()
            .map_err(VulkanError::InitializationFailed)?;

        let context = VulkanContext::new(config, window)?;
        let allocator = GpuAllocator::new(&context);

        let mut renderer = Self {
            swapchain: SwapchainManager::new(allocator.clone()),
            frames: None,
            descriptor_pool: None,
            scene: SceneResources::default(),
            pipeline: None,
            shaders: config.shaders.clone(),
            clear_color: config.clear_color,
            minimized: false,
            resize_pending: false,
            context,
        };

        renderer.swapchain.create(&renderer.context, window.framebuffer_size())?;

        renderer.frames = Some(FrameSynchronizer::new(
            renderer.context.device(),
            renderer.context.graphics_command_pool(),
            config.max_frames_in_flight,
            renderer.swapchain.image_count()?,
        )?);

        let pool = renderer.descriptor_pool.insert(DescriptorPool::new(
            renderer.context.device(),
            scene_pool_sizes(config.overlay_sampler_reserve),
        )?);

        let transfer = OneShotTransfer::new(&renderer.context);
        renderer.scene = SceneResources::upload(scene, &allocator, &transfer, pool)?;

        renderer.pipeline = Some(ScenePipeline::new(
            renderer.context.device(),
            renderer.swapchain.scene_render_pass()?,
            &renderer.scene.set_layouts(),
            &renderer.shaders,
        )?);

        log::info!("VulkanRenderer ready");
        Ok(renderer)
    }

    /// Device context
    pub fn context(&self) -> &VulkanContext {
        &self.context
    }

    /// Current swapchain extent
    pub fn extent(&self) -> Result<vk::Extent2D, RendererError> {
        Ok(self.swapchain.extent()?)
    }

    /// React to window lifecycle events
    ///
    /// Resizes are deferred to the start of the next frame so the swapchain is
    /// never rebuilt mid-recording.
    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match *event {
            WindowEvent::Resized { width, height } => {
                log::debug!("Window resized to {}x{}", width, height);
                self.resize_pending = true;
            }
            WindowEvent::Minimized => self.minimized = true,
            WindowEvent::Restored => {
                self.minimized = false;
                self.resize_pending = true;
            }
            WindowEvent::CloseRequested => {}
        }
    }

    /// Handles an overlay backend needs to initialize against this renderer
    pub fn overlay_target(&self) -> Result<OverlayTarget, RendererError> {
        let pool = self.descriptor_pool.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "descriptor pool not created".to_string(),
        })?;
        Ok(OverlayTarget {
            render_pass: self.swapchain.overlay_render_pass()?,
            graphics_queue: self.context.graphics_queue(),
            queue_family: self.context.queue_families().graphics,
            command_pool: self.context.graphics_command_pool(),
            descriptor_pool: pool.handle(),
            image_count: self.swapchain.image_count()?,
            min_image_count: self.swapchain.min_image_count()?,
            format: self.swapchain.format()?.format,
            extent: self.swapchain.extent()?,
        })
    }

    /// Run one frame
    pub fn render_frame(
        &mut self,
        window: &dyn WindowSurface,
        camera: &Camera,
        overlay: &mut dyn Overlay,
    ) -> Result<FrameOutcome, RendererError> {
        let (width, height) = window.framebuffer_size();
        if !should_render(self.minimized, vk::Extent2D { width, height }) {
            return Ok(FrameOutcome::Skipped);
        }

        if self.resize_pending {
            self.recreate_swapchain(window, overlay)?;
            return Ok(FrameOutcome::SwapchainRecreated);
        }

        let device = self.context.device();
        let loader = self.context.swapchain_loader()?;
        let swapchain = self.swapchain.swapchain()?;
        let frames = self.frames.as_mut().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "frame synchronizer not created".to_string(),
        })?;

        let (image_index, suboptimal, command_buffer) = match frames.begin_frame(device, loader, swapchain)? {
            FrameStart::Acquired {
                image_index,
                suboptimal,
                command_buffer,
            } => (image_index, suboptimal, command_buffer),
            FrameStart::OutOfDate => {
                self.recreate_swapchain(window, overlay)?;
                return Ok(FrameOutcome::SwapchainRecreated);
            }
        };

        self.record_frame(command_buffer, image_index, camera, overlay)?;

        let frames = self.frames.as_mut().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "frame synchronizer not created".to_string(),
        })?;
        let presented = frames.submit_and_present(
            self.context.device(),
            self.context.swapchain_loader()?,
            self.context.graphics_queue(),
            self.context.present_queue(),
            swapchain,
            image_index,
        )?;

        if presented == PresentOutcome::NeedsRecreate || suboptimal {
            self.recreate_swapchain(window, overlay)?;
            return Ok(FrameOutcome::SwapchainRecreated);
        }
        Ok(FrameOutcome::Rendered)
    }

    fn record_frame(
        &self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        camera: &Camera,
        overlay: &mut dyn Overlay,
    ) -> Result<(), RendererError> {
        let pipeline = self.pipeline.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "scene pipeline not created".to_string(),
        })?;
        let extent = self.swapchain.extent()?;
        let (scene_framebuffer, overlay_framebuffer) = self.swapchain.framebuffers(image_index)?;
        let area = full_scissor(extent);
        let aspect = extent.width as f32 / extent.height.max(1) as f32;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: self.clear_color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        let mut recorder = CommandRecorder::new(self.context.device(), command_buffer);
        recorder.begin()?;
        {
            let mut pass =
                recorder.begin_render_pass(self.swapchain.scene_render_pass()?, scene_framebuffer, area, &clear_values)?;
            pass.set_viewport(full_viewport(extent));
            pass.set_scissor(area);
            pass.bind_pipeline(pipeline.handle());
            pass.push_constants(
                pipeline.layout(),
                vk::ShaderStageFlags::VERTEX,
                camera.push_constants(aspect).as_bytes(),
            );
            self.scene.record_draw(&mut pass, pipeline.layout());
        }
        {
            let mut pass =
                recorder.begin_render_pass(self.swapchain.overlay_render_pass()?, overlay_framebuffer, area, &[])?;
            overlay.record(&mut pass)?;
        }
        recorder.end()?;
        Ok(())
    }

    /// Rebuild the swapchain for the window's current size
    ///
    /// A zero-sized window leaves the rebuild pending.
    pub fn recreate_swapchain(
        &mut self,
        window: &dyn WindowSurface,
        overlay: &mut dyn Overlay,
    ) -> Result<(), RendererError> {
        let window_size = window.framebuffer_size();
        if window_size.0 == 0 || window_size.1 == 0 {
            self.resize_pending = true;
            return Ok(());
        }

        let outcome = self.swapchain.recreate(&self.context, window_size)?;
        if let Some(frames) = self.frames.as_mut() {
            frames.reset_image_tracking(outcome.image_count);
        }

        if outcome.format_changed {
            let device = self.context.device();
            if let Some(pipeline) = self.pipeline.take() {
                pipeline.destroy(device);
            }
            self.pipeline = Some(ScenePipeline::new(
                device,
                self.swapchain.scene_render_pass()?,
                &self.scene.set_layouts(),
                &self.shaders,
            )?);
        }

        self.resize_pending = false;
        overlay.swapchain_recreated(&self.overlay_target()?)?;
        Ok(())
    }

    /// Block until the GPU is idle
    pub fn wait_idle(&self) -> Result<(), RendererError> {
        Ok(self.context.wait_idle()?)
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        log::debug!("Destroying VulkanRenderer...");
        if let Err(e) = self.context.wait_idle() {
            log::warn!("device_wait_idle failed during teardown: {}", e);
        }

        let device = self.context.device();
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.destroy(device);
        }
        if let Some(pool) = self.descriptor_pool.take() {
            self.scene.destroy(device, &pool);
            pool.destroy(device);
        }
        if let Some(mut frames) = self.frames.take() {
            frames.destroy(device);
        }
        self.swapchain.destroy(&self.context);
        log::debug!("VulkanRenderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_covers_material_table_and_overlay() {
        let sizes = scene_pool_sizes(8);
        assert_eq!(sizes.uniform_buffers, 128);
        assert_eq!(sizes.combined_image_samplers, 5 * 128 + 8);
        assert_eq!(sizes.storage_buffers, 1);
        assert!(sizes.max_sets >= 2);
    }
}
