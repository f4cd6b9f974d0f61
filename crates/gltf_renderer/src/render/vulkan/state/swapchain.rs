//! Swapchain creation and the surface choices behind it
//!
//! The choice functions are pure so the resize and recreation rules can be
//! checked without a surface.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::vulkan::resources::{create_image_view, SharingPolicy};
use crate::render::vulkan::{SurfaceSupport, VulkanContext, VulkanError, VulkanResult};

/// Prefer an 8-bit sRGB format in the sRGB non-linear color space
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> VulkanResult<vk::SurfaceFormatKHR> {
    const PREFERRED: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_SRGB];

    formats
        .iter()
        .find(|sf| PREFERRED.contains(&sf.format) && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| VulkanError::InitializationFailed("surface reports no formats".to_string()))
}

/// Mailbox when available, FIFO (always supported) otherwise
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Surface extent, or the window size clamped to the surface limits when the
/// surface leaves it to the application (`u32::MAX` sentinel)
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_size: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: window_size.0.clamp(min.width, max.width),
        height: window_size.1.clamp(min.height, max.height),
    }
}

/// One more than the minimum, capped by the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Everything decided before a swapchain is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    /// Surface format and color space
    pub format: vk::SurfaceFormatKHR,
    /// Present mode
    pub present_mode: vk::PresentModeKHR,
    /// Image extent
    pub extent: vk::Extent2D,
    /// Requested minimum image count
    pub image_count: u32,
    /// Surface transform to apply
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainPlan {
    /// Resolve a plan from a support snapshot and the live window size
    pub fn resolve(support: &SurfaceSupport, window_size: (u32, u32)) -> VulkanResult<Self> {
        Ok(Self {
            format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, window_size),
            image_count: choose_image_count(&support.capabilities),
            pre_transform: support.capabilities.current_transform,
        })
    }
}

/// Presentable image chain with one view per image
pub struct Swapchain {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    plan: SwapchainPlan,
}

impl Swapchain {
    /// Create a swapchain for the context's surface
    ///
    /// `old_swapchain` may be a retired chain being replaced; the caller still
    /// destroys it afterwards.
    pub fn new(context: &VulkanContext, window_size: (u32, u32), old_swapchain: vk::SwapchainKHR) -> VulkanResult<Self> {
        let surface = context.surface()?;
        let loader = context.swapchain_loader()?;
        let device = context.device();

        let support = surface.query_support(context.physical_device().device)?;
        let plan = SwapchainPlan::resolve(&support, window_size)?;

        let families = context.queue_families();
        let sharing = SharingPolicy::for_families(&[families.graphics, families.present]);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(plan.image_count)
            .image_format(plan.format.format)
            .image_color_space(plan.format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing.mode())
            .queue_family_indices(sharing.family_indices())
            .pre_transform(plan.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

        let images = match unsafe { loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { loader.destroy_swapchain(swapchain, None) };
                return Err(VulkanError::Api(e));
            }
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            match create_image_view(device, image, plan.format.format, vk::ImageAspectFlags::COLOR) {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    unsafe {
                        for view in image_views {
                            device.destroy_image_view(view, None);
                        }
                        loader.destroy_swapchain(swapchain, None);
                    }
                    return Err(e);
                }
            }
        }

        log::info!(
            "Swapchain created: {}x{}, {} images, {:?}, {:?}",
            plan.extent.width,
            plan.extent.height,
            images.len(),
            plan.format.format,
            plan.present_mode
        );

        Ok(Self {
            swapchain,
            images,
            image_views,
            plan,
        })
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Image views, indexed like the images
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of images the driver actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// The plan the chain was built from
    pub fn plan(&self) -> &SwapchainPlan {
        &self.plan
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    /// Surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.plan.format
    }

    /// Destroy only the image views (the chain itself may be retired later)
    pub fn destroy_views(&mut self, device: &Device) {
        unsafe {
            for view in self.image_views.drain(..) {
                device.destroy_image_view(view, None);
            }
        }
    }

    /// Destroy views and the swapchain
    pub fn destroy(&mut self, device: &Device, loader: &SwapchainLoader) {
        self.destroy_views(device);
        unsafe {
            loader.destroy_swapchain(self.swapchain, None);
        }
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 3,
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn support(caps: vk::SurfaceCapabilitiesKHR) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: caps,
            formats: vec![
                format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
                format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        }
    }

    #[test]
    fn test_prefers_srgb_nonlinear() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn test_falls_back_to_first_format() {
        let formats = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats).unwrap().format, vk::Format::A2B10G10R10_UNORM_PACK32);
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn test_present_mode_preference() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_current_extent_is_used_when_defined() {
        let caps = capabilities((640, 480), (1, 1), (4096, 4096));
        assert_eq!(choose_extent(&caps, (1920, 1080)), vk::Extent2D { width: 640, height: 480 });
    }

    #[test]
    fn test_resize_to_smaller_window_stays_within_bounds() {
        let caps = capabilities((u32::MAX, u32::MAX), (200, 150), (1024, 768));
        let large = choose_extent(&caps, (1000, 700));
        assert_eq!(large, vk::Extent2D { width: 1000, height: 700 });

        let smaller = choose_extent(&caps, (100, 50));
        assert_eq!(smaller, vk::Extent2D { width: 200, height: 150 });

        for size in [(0, 0), (150, 900), (5000, 10), (512, 512)] {
            let extent = choose_extent(&caps, size);
            assert!((200..=1024).contains(&extent.width), "{:?} -> {:?}", size, extent);
            assert!((150..=768).contains(&extent.height), "{:?} -> {:?}", size, extent);
        }
    }

    #[test]
    fn test_image_count_respects_maximum() {
        let mut caps = capabilities((1, 1), (1, 1), (1, 1));
        assert_eq!(choose_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(choose_image_count(&caps), 2);
        caps.max_image_count = 0;
        assert_eq!(choose_image_count(&caps), 3);
    }

    #[test]
    fn test_recreating_with_unchanged_window_is_idempotent() {
        let support = support(capabilities((u32::MAX, u32::MAX), (1, 1), (4096, 4096)));
        let first = SwapchainPlan::resolve(&support, (800, 600)).unwrap();
        let second = SwapchainPlan::resolve(&support, (800, 600)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.extent, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(first.image_count, 3);
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(first.format.format, vk::Format::B8G8R8A8_SRGB);
    }
}
