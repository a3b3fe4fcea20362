//! GPU error types.

use ash::vk;
use std::path::PathBuf;
use thiserror::Error;

/// GPU-related errors.
///
/// Every variant is fatal to the operation that produced it; nothing in this
/// crate retries.
#[derive(Error, Debug)]
pub enum GpuError {
    /// The Vulkan loader could not be found or `vkCreateInstance` failed.
    #[error("Instance creation failed: {0}")]
    InstanceCreation(String),

    /// Physical device enumeration returned an empty list.
    #[error("No GPU with Vulkan support found")]
    NoDeviceFound,

    /// Every enumerated device scored zero.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// The selected device has no compute-capable queue family.
    #[error("Compute queue not supported on physical device {device}")]
    ComputeQueueUnavailable { device: String },

    /// No memory type matches both the filter bits and the property flags.
    #[error("No suitable memory type (type bits {type_bits:#b}, required {required:?})")]
    NoSuitableMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    /// Queue submission or the wait that follows it failed.
    #[error("Command submission failed: {0} (VkResult {code})", code = .0.as_raw())]
    CommandSubmission(vk::Result),

    /// A shader binary could not be opened.
    #[error("Shader object file {} not found: {source}", .path.display())]
    ShaderFileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A shader binary is not valid SPIR-V.
    #[error("Invalid shader binary: {0}")]
    InvalidShader(String),

    /// No barrier recipe exists for the requested image layout pair.
    #[error("Unsupported image layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// Pooled memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    Allocation(String),

    /// An object was used in a state that does not allow the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Any other Vulkan error.
    #[error("Vulkan error: {0} (VkResult {code})", code = .0.as_raw())]
    Vulkan(#[from] vk::Result),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
