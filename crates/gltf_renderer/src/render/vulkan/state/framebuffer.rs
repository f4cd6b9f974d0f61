//! Depth buffer and framebuffer creation

use ash::{vk, Device, Instance};

use crate::render::vulkan::resources::{GpuAllocator, GpuImage};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate whose optimal-tiling features include depth attachment
pub fn pick_depth_format<F>(candidates: &[vk::Format], mut optimal_features: F) -> VulkanResult<vk::Format>
where
    F: FnMut(vk::Format) -> vk::FormatFeatureFlags,
{
    candidates
        .iter()
        .copied()
        .find(|&format| optimal_features(format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT))
        .ok_or_else(|| VulkanError::InitializationFailed("no supported depth format".to_string()))
}

/// Query the device for a usable depth format
pub fn find_depth_format(instance: &Instance, physical_device: vk::PhysicalDevice) -> VulkanResult<vk::Format> {
    pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| unsafe {
        instance
            .get_physical_device_format_properties(physical_device, format)
            .optimal_tiling_features
    })
}

/// Depth image shared by all scene framebuffers
#[derive(Debug)]
pub struct DepthBuffer {
    image: GpuImage,
    view: vk::ImageView,
}

impl DepthBuffer {
    /// Create a device-local depth attachment of `extent`
    pub fn new(allocator: &GpuAllocator, extent: vk::Extent2D, format: vk::Format) -> VulkanResult<Self> {
        let image = allocator.create_image(
            extent,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let view = match image.create_view(allocator.device(), vk::ImageAspectFlags::DEPTH) {
            Ok(view) => view,
            Err(e) => {
                image.destroy(allocator.device());
                return Err(e);
            }
        };

        Ok(Self { image, view })
    }

    /// Depth image view
    pub fn image_view(&self) -> vk::ImageView {
        self.view
    }

    /// Depth format
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    /// Destroy view then image
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_image_view(self.view, None);
        }
        self.image.destroy(device);
    }
}

/// Create one framebuffer per color view, each also bound to `extra_attachments`
pub fn create_framebuffers(
    device: &Device,
    render_pass: vk::RenderPass,
    color_views: &[vk::ImageView],
    extra_attachments: &[vk::ImageView],
    extent: vk::Extent2D,
) -> VulkanResult<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(color_views.len());
    for &color_view in color_views {
        let mut attachments = Vec::with_capacity(1 + extra_attachments.len());
        attachments.push(color_view);
        attachments.extend_from_slice(extra_attachments);

        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(&attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.create_framebuffer(&framebuffer_info, None) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                destroy_framebuffers(device, &mut framebuffers);
                return Err(VulkanError::Api(e));
            }
        }
    }
    Ok(framebuffers)
}

/// Destroy and clear a framebuffer set
pub fn destroy_framebuffers(device: &Device, framebuffers: &mut Vec<vk::Framebuffer>) {
    unsafe {
        for framebuffer in framebuffers.drain(..) {
            device.destroy_framebuffer(framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_supported_depth_format_wins() {
        let picked = pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            if format == vk::Format::D32_SFLOAT {
                vk::FormatFeatureFlags::SAMPLED_IMAGE
            } else {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            }
        })
        .unwrap();
        assert_eq!(picked, vk::Format::D32_SFLOAT_S8_UINT);
    }

    #[test]
    fn test_no_depth_format_is_an_error() {
        assert!(pick_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| vk::FormatFeatureFlags::empty()).is_err());
    }
}
