//! Vulkan error types and status handling

use ash::vk;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No physical device satisfied the queue, extension and feature requirements
    #[error("No suitable GPU found: {0}")]
    NoSuitableDevice(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found (type bits {type_bits:#b}, flags {flags:?})")]
    NoSuitableMemoryType {
        /// Memory type bitmask from the resource's requirements
        type_bits: u32,
        /// Property flags that had to be present
        flags: vk::MemoryPropertyFlags,
    },

    /// A SPIR-V module could not be read or is malformed
    #[error("Failed to load shader {path}: {reason}")]
    ShaderLoad {
        /// Path the module was read from
        path: String,
        /// What went wrong
        reason: String,
    },
}

impl From<vk::Result> for VulkanError {
    fn from(result: vk::Result) -> Self {
        Self::Api(result)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Classify a raw status code from an external collaborator (the overlay
/// backend reports through a plain `VkResult` callback)
///
/// Errors become [`VulkanError::Api`]; positive, non-success codes are logged
/// and execution continues.
pub fn check_vk_result(result: vk::Result) -> VulkanResult<()> {
    if result == vk::Result::SUCCESS {
        return Ok(());
    }
    if result.as_raw() < 0 {
        log::error!("[Vulkan] call failed: {:?}", result);
        return Err(VulkanError::Api(result));
    }
    log::warn!("[Vulkan] call returned non-success status: {:?}", result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_ok() {
        assert!(check_vk_result(vk::Result::SUCCESS).is_ok());
    }

    #[test]
    fn test_advisory_status_continues() {
        assert!(check_vk_result(vk::Result::SUBOPTIMAL_KHR).is_ok());
        assert!(check_vk_result(vk::Result::INCOMPLETE).is_ok());
    }

    #[test]
    fn test_negative_status_is_fatal() {
        let err = check_vk_result(vk::Result::ERROR_DEVICE_LOST).unwrap_err();
        assert!(matches!(err, VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)));
    }
}
