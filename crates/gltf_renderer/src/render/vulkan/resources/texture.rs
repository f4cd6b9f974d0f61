//! Sampled textures: image, view, sampler and the descriptor payload

use ash::{vk, Device};

use super::memory::GpuImage;
use super::transfer::{StagingUploader, TransferChannel};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Sampler state for one texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerSettings {
    /// Magnification filter
    pub mag_filter: vk::Filter,
    /// Minification filter
    pub min_filter: vk::Filter,
    /// Mipmap interpolation (textures carry a single level)
    pub mipmap_mode: vk::SamplerMipmapMode,
    /// Wrap mode along U
    pub address_mode_u: vk::SamplerAddressMode,
    /// Wrap mode along V
    pub address_mode_v: vk::SamplerAddressMode,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
        }
    }
}

/// A sampled texture ready to be written into a descriptor
#[derive(Debug)]
pub struct Texture {
    image: GpuImage,
    view: vk::ImageView,
    sampler: vk::Sampler,
}

impl Texture {
    /// Upload RGBA8 `pixels` and create the view and sampler
    pub fn upload<T: TransferChannel + ?Sized>(
        uploader: &StagingUploader<'_, T>,
        device: &Device,
        pixels: &[u8],
        extent: vk::Extent2D,
        format: vk::Format,
        sampler: SamplerSettings,
    ) -> VulkanResult<Self> {
        let expected = extent.width as usize * extent.height as usize * 4;
        if pixels.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "texture {}x{} needs {} RGBA bytes, got {}",
                    extent.width, extent.height, expected, pixels.len()
                ),
            });
        }

        let image = uploader.upload_image(pixels, extent, format)?;

        let view = match image.create_view(device, vk::ImageAspectFlags::COLOR) {
            Ok(view) => view,
            Err(e) => {
                image.destroy(device);
                return Err(e);
            }
        };

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(sampler.mag_filter)
            .min_filter(sampler.min_filter)
            .mipmap_mode(sampler.mipmap_mode)
            .address_mode_u(sampler.address_mode_u)
            .address_mode_v(sampler.address_mode_v)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .min_lod(0.0)
            .max_lod(0.0);

        let sampler = match unsafe { device.create_sampler(&sampler_info, None) } {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe { device.destroy_image_view(view, None) };
                image.destroy(device);
                return Err(VulkanError::Api(e));
            }
        };

        log::debug!(
            "Texture uploaded: {}x{} {:?}",
            extent.width,
            extent.height,
            format
        );

        Ok(Self { image, view, sampler })
    }

    /// Image extent
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    /// Binding payload for a combined image sampler write
    pub fn descriptor_info(&self) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler: self.sampler,
            image_view: self.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Destroy sampler, view and image in reverse creation order
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_sampler(self.sampler, None);
            device.destroy_image_view(self.view, None);
        }
        self.image.destroy(device);
    }
}
