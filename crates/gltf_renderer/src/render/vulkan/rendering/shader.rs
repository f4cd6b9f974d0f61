//! SPIR-V shader modules

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Entry point every stage uses
pub const SHADER_ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Decode SPIR-V bytes into words, checking length and magic number
pub fn decode_spirv(bytes: &[u8]) -> Result<Vec<u32>, String> {
    if bytes.is_empty() {
        return Err("file is empty".to_string());
    }
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| e.to_string())?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(format!("bad SPIR-V magic {:#010x}", other)),
        None => Err("file is empty".to_string()),
    }
}

/// Compiled shader module
pub struct ShaderModule {
    module: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
}

impl ShaderModule {
    /// Create a module from SPIR-V bytes
    pub fn from_bytes(device: &Device, bytes: &[u8], stage: vk::ShaderStageFlags, origin: &str) -> VulkanResult<Self> {
        let code = decode_spirv(bytes).map_err(|reason| VulkanError::ShaderLoad {
            path: origin.to_string(),
            reason,
        })?;

        let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);
        let module = unsafe { device.create_shader_module(&create_info, None)? };

        Ok(Self { module, stage })
    }

    /// Read and create a module from a SPIR-V file
    pub fn from_file<P: AsRef<Path>>(device: &Device, path: P, stage: vk::ShaderStageFlags) -> VulkanResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| VulkanError::ShaderLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        log::debug!("Loaded shader {} ({} bytes)", path.display(), bytes.len());
        Self::from_bytes(device, &bytes, stage, &path.display().to_string())
    }

    /// Module handle
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Stage info for pipeline creation
    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(self.stage)
            .module(self.module)
            .name(SHADER_ENTRY_POINT)
            .build()
    }

    /// Destroy the module (safe once pipelines using it are created)
    pub fn destroy(&self, device: &Device) {
        unsafe {
            device.destroy_shader_module(self.module, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_valid_header() {
        let mut bytes = Vec::new();
        for word in [SPIRV_MAGIC, 0x0001_0000, 0, 8, 0] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        let words = decode_spirv(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(decode_spirv(&[]).is_err());
        assert!(decode_spirv(&[1, 2, 3]).is_err());
        assert!(decode_spirv(&0xdead_beef_u32.to_le_bytes()).is_err());
    }
}
