//! Swapchain lifecycle
//!
//! Owns the swapchain, the shared depth buffer, the two render passes and the
//! per-image framebuffer sets for each pass. `create` moves the manager from
//! `Uninitialized` to `Ready`; `recreate` drains the device and rebuilds every
//! swapchain-dependent object against the surface's current capabilities.

use ash::{vk, Device};

use super::framebuffer::{create_framebuffers, destroy_framebuffers, find_depth_format, DepthBuffer};
use super::swapchain::Swapchain;
use crate::render::vulkan::rendering::RenderPasses;
use crate::render::vulkan::resources::GpuAllocator;
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Objects that exist only while the manager is ready
struct SwapchainResources {
    swapchain: Swapchain,
    depth: DepthBuffer,
    scene_framebuffers: Vec<vk::Framebuffer>,
    overlay_framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainResources {
    fn build(
        context: &VulkanContext,
        allocator: &GpuAllocator,
        render_passes: &RenderPasses,
        depth_format: vk::Format,
        swapchain: Swapchain,
    ) -> VulkanResult<Self> {
        let device = context.device();
        let extent = swapchain.extent();

        let mut swapchain = swapchain;
        let depth = match DepthBuffer::new(allocator, extent, depth_format) {
            Ok(depth) => depth,
            Err(e) => {
                swapchain.destroy(device, context.swapchain_loader()?);
                return Err(e);
            }
        };

        let scene = create_framebuffers(
            device,
            render_passes.scene.handle(),
            swapchain.image_views(),
            &[depth.image_view()],
            extent,
        );
        let framebuffers = match scene {
            Ok(mut scene) => {
                match create_framebuffers(device, render_passes.overlay.handle(), swapchain.image_views(), &[], extent) {
                    Ok(overlay) => Ok((scene, overlay)),
                    Err(e) => {
                        destroy_framebuffers(device, &mut scene);
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        };

        match framebuffers {
            Ok((scene_framebuffers, overlay_framebuffers)) => Ok(Self {
                swapchain,
                depth,
                scene_framebuffers,
                overlay_framebuffers,
            }),
            Err(e) => {
                depth.destroy(device);
                swapchain.destroy(device, context.swapchain_loader()?);
                Err(e)
            }
        }
    }

    /// Destroy everything except the swapchain handle itself
    fn destroy_dependents(&mut self, device: &Device) {
        destroy_framebuffers(device, &mut self.overlay_framebuffers);
        destroy_framebuffers(device, &mut self.scene_framebuffers);
        self.depth.destroy(device);
        self.swapchain.destroy_views(device);
    }
}

enum SwapchainState {
    Uninitialized,
    Ready(SwapchainResources),
}

/// What a recreation changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecreateOutcome {
    /// New image extent
    pub extent: vk::Extent2D,
    /// New image count
    pub image_count: usize,
    /// The surface format changed and the render passes were rebuilt;
    /// pipelines built against the old passes must be rebuilt too
    pub format_changed: bool,
}

/// Swapchain, depth buffer, render passes and framebuffers
pub struct SwapchainManager {
    state: SwapchainState,
    render_passes: Option<RenderPasses>,
    depth_format: vk::Format,
    allocator: GpuAllocator,
    recreate_count: u32,
}

impl SwapchainManager {
    /// Manager in the `Uninitialized` state
    pub fn new(allocator: GpuAllocator) -> Self {
        Self {
            state: SwapchainState::Uninitialized,
            render_passes: None,
            depth_format: vk::Format::UNDEFINED,
            allocator,
            recreate_count: 0,
        }
    }

    /// Build the swapchain, render passes and framebuffers
    pub fn create(&mut self, context: &VulkanContext, window_size: (u32, u32)) -> VulkanResult<()> {
        if self.is_ready() {
            return Err(VulkanError::InvalidOperation {
                reason: "swapchain already created; use recreate".to_string(),
            });
        }

        self.depth_format = find_depth_format(context.instance(), context.physical_device().device)?;
        let swapchain = Swapchain::new(context, window_size, vk::SwapchainKHR::null())?;
        let device = context.device();

        let render_passes = match RenderPasses::new(device, swapchain.format().format, self.depth_format) {
            Ok(passes) => passes,
            Err(e) => {
                let mut swapchain = swapchain;
                swapchain.destroy(device, context.swapchain_loader()?);
                return Err(e);
            }
        };

        match SwapchainResources::build(context, &self.allocator, &render_passes, self.depth_format, swapchain) {
            Ok(resources) => {
                self.state = SwapchainState::Ready(resources);
                self.render_passes = Some(render_passes);
                log::debug!("Swapchain manager ready (depth {:?})", self.depth_format);
                Ok(())
            }
            Err(e) => {
                render_passes.destroy(device);
                Err(e)
            }
        }
    }

    /// Tear down and rebuild every swapchain-dependent object
    pub fn recreate(&mut self, context: &VulkanContext, window_size: (u32, u32)) -> VulkanResult<RecreateOutcome> {
        let device = context.device();
        let loader = context.swapchain_loader()?;

        context.wait_idle()?;

        let SwapchainState::Ready(mut old) = std::mem::replace(&mut self.state, SwapchainState::Uninitialized) else {
            return Err(VulkanError::InvalidOperation {
                reason: "recreate called before create".to_string(),
            });
        };
        old.destroy_dependents(device);

        let new_swapchain = Swapchain::new(context, window_size, old.swapchain.handle());
        old.swapchain.destroy(device, loader);
        let swapchain = new_swapchain?;

        let mut format_changed = false;
        let color_format = swapchain.format().format;
        if self.render_passes.as_ref().map(RenderPasses::color_format) != Some(color_format) {
            log::warn!("Surface format changed to {:?}, rebuilding render passes", color_format);
            if let Some(passes) = self.render_passes.take() {
                passes.destroy(device);
            }
            match RenderPasses::new(device, color_format, self.depth_format) {
                Ok(passes) => self.render_passes = Some(passes),
                Err(e) => {
                    let mut swapchain = swapchain;
                    swapchain.destroy(device, loader);
                    return Err(e);
                }
            }
            format_changed = true;
        }

        let render_passes = self.render_passes.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "render passes missing during recreate".to_string(),
        })?;
        let resources = SwapchainResources::build(context, &self.allocator, render_passes, self.depth_format, swapchain)?;

        let outcome = RecreateOutcome {
            extent: resources.swapchain.extent(),
            image_count: resources.swapchain.image_count(),
            format_changed,
        };
        self.state = SwapchainState::Ready(resources);
        self.recreate_count += 1;

        log::info!(
            "Swapchain recreated ({}): {}x{}, {} images",
            self.recreate_count,
            outcome.extent.width,
            outcome.extent.height,
            outcome.image_count
        );
        Ok(outcome)
    }

    /// Whether `create` has succeeded and resources are live
    pub fn is_ready(&self) -> bool {
        matches!(self.state, SwapchainState::Ready(_))
    }

    fn resources(&self) -> VulkanResult<&SwapchainResources> {
        match &self.state {
            SwapchainState::Ready(resources) => Ok(resources),
            SwapchainState::Uninitialized => Err(VulkanError::InvalidOperation {
                reason: "swapchain not created".to_string(),
            }),
        }
    }

    fn passes(&self) -> VulkanResult<&RenderPasses> {
        self.render_passes.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "render passes not created".to_string(),
        })
    }

    /// Swapchain handle
    pub fn swapchain(&self) -> VulkanResult<vk::SwapchainKHR> {
        Ok(self.resources()?.swapchain.handle())
    }

    /// Current extent
    pub fn extent(&self) -> VulkanResult<vk::Extent2D> {
        Ok(self.resources()?.swapchain.extent())
    }

    /// Number of presentable images
    pub fn image_count(&self) -> VulkanResult<usize> {
        Ok(self.resources()?.swapchain.image_count())
    }

    /// Minimum image count requested at creation
    pub fn min_image_count(&self) -> VulkanResult<u32> {
        Ok(self.resources()?.swapchain.plan().image_count)
    }

    /// Surface format
    pub fn format(&self) -> VulkanResult<vk::SurfaceFormatKHR> {
        Ok(self.resources()?.swapchain.format())
    }

    /// Scene render pass
    pub fn scene_render_pass(&self) -> VulkanResult<vk::RenderPass> {
        Ok(self.passes()?.scene.handle())
    }

    /// Overlay render pass
    pub fn overlay_render_pass(&self) -> VulkanResult<vk::RenderPass> {
        Ok(self.passes()?.overlay.handle())
    }

    /// Scene and overlay framebuffers for one swapchain image
    pub fn framebuffers(&self, image_index: u32) -> VulkanResult<(vk::Framebuffer, vk::Framebuffer)> {
        let resources = self.resources()?;
        let index = image_index as usize;
        match (resources.scene_framebuffers.get(index), resources.overlay_framebuffers.get(index)) {
            (Some(&scene), Some(&overlay)) => Ok((scene, overlay)),
            _ => Err(VulkanError::InvalidOperation {
                reason: format!("image index {} out of range", image_index),
            }),
        }
    }

    /// Destroy framebuffers, depth buffer, views, swapchain and render passes
    pub fn destroy(&mut self, context: &VulkanContext) {
        let device = context.device();
        if let SwapchainState::Ready(mut resources) = std::mem::replace(&mut self.state, SwapchainState::Uninitialized) {
            resources.destroy_dependents(device);
            if let Ok(loader) = context.swapchain_loader() {
                resources.swapchain.destroy(device, loader);
            }
        }
        if let Some(passes) = self.render_passes.take() {
            passes.destroy(device);
        }
    }
}
