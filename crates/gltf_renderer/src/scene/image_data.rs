//! Decoded glTF images to RGBA8 texture sources

use std::borrow::Cow;

use ash::vk;
use gltf::image::Format;
use gltf::texture::{MagFilter, MinFilter, WrappingMode};

use super::SceneError;
use crate::render::vulkan::resources::SamplerSettings;

/// Convert decoded pixels to tightly packed RGBA8
///
/// RGB gains an opaque alpha channel; RGBA passes through untouched.
pub fn expand_to_rgba8(format: Format, pixels: &[u8]) -> Option<Cow<'_, [u8]>> {
    match format {
        Format::R8G8B8A8 => Some(Cow::Borrowed(pixels)),
        Format::R8G8B8 => Some(Cow::Owned(
            pixels
                .chunks_exact(3)
                .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], u8::MAX])
                .collect(),
        )),
        _ => None,
    }
}

/// Sampler state from a glTF sampler
pub fn sampler_settings(sampler: &gltf::texture::Sampler<'_>) -> SamplerSettings {
    let defaults = SamplerSettings::default();

    let mag_filter = match sampler.mag_filter() {
        Some(MagFilter::Nearest) => vk::Filter::NEAREST,
        Some(MagFilter::Linear) => vk::Filter::LINEAR,
        None => defaults.mag_filter,
    };
    let (min_filter, mipmap_mode) = match sampler.min_filter() {
        Some(MinFilter::Nearest | MinFilter::NearestMipmapNearest) => {
            (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST)
        }
        Some(MinFilter::NearestMipmapLinear) => (vk::Filter::NEAREST, vk::SamplerMipmapMode::LINEAR),
        Some(MinFilter::LinearMipmapNearest) => (vk::Filter::LINEAR, vk::SamplerMipmapMode::NEAREST),
        Some(MinFilter::Linear | MinFilter::LinearMipmapLinear) => (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR),
        None => (defaults.min_filter, defaults.mipmap_mode),
    };

    SamplerSettings {
        mag_filter,
        min_filter,
        mipmap_mode,
        address_mode_u: address_mode(sampler.wrap_s()),
        address_mode_v: address_mode(sampler.wrap_t()),
    }
}

fn address_mode(mode: WrappingMode) -> vk::SamplerAddressMode {
    match mode {
        WrappingMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        WrappingMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        WrappingMode::Repeat => vk::SamplerAddressMode::REPEAT,
    }
}

/// One texture ready for upload
#[derive(Debug, Clone, PartialEq)]
pub struct TextureSource {
    /// Tightly packed RGBA8 pixels
    pub pixels: Vec<u8>,
    /// Width and height
    pub extent: vk::Extent2D,
    /// `R8G8B8A8_SRGB` for color roles, `R8G8B8A8_UNORM` otherwise
    pub format: vk::Format,
    /// Sampler state
    pub sampler: SamplerSettings,
}

impl TextureSource {
    /// Build from decoded image data
    pub fn from_image(
        image: &gltf::image::Data,
        image_index: usize,
        srgb: bool,
        sampler: SamplerSettings,
    ) -> Result<Self, SceneError> {
        let pixels = expand_to_rgba8(image.format, &image.pixels).ok_or(SceneError::UnsupportedImageFormat {
            image: image_index,
            format: image.format,
        })?;

        Ok(Self {
            pixels: pixels.into_owned(),
            extent: vk::Extent2D {
                width: image.width,
                height: image.height,
            },
            format: if srgb {
                vk::Format::R8G8B8A8_SRGB
            } else {
                vk::Format::R8G8B8A8_UNORM
            },
            sampler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_gains_opaque_alpha() {
        let rgb = [10, 20, 30, 40, 50, 60];
        let rgba = expand_to_rgba8(Format::R8G8B8, &rgb).unwrap();
        assert_eq!(&*rgba, &[10, 20, 30, 255, 40, 50, 60, 255]);
    }

    #[test]
    fn test_rgba_is_borrowed() {
        let rgba = [1, 2, 3, 4];
        assert!(matches!(expand_to_rgba8(Format::R8G8B8A8, &rgba), Some(Cow::Borrowed(_))));
    }

    #[test]
    fn test_other_layouts_are_rejected() {
        assert!(expand_to_rgba8(Format::R8G8, &[0, 0]).is_none());
        assert!(expand_to_rgba8(Format::R16G16B16A16, &[0; 8]).is_none());

        let image = gltf::image::Data {
            pixels: vec![0; 4],
            format: Format::R8,
            width: 2,
            height: 2,
        };
        assert!(matches!(
            TextureSource::from_image(&image, 3, true, SamplerSettings::default()),
            Err(SceneError::UnsupportedImageFormat { image: 3, format: Format::R8 })
        ));
    }
}
