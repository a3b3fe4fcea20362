//! SPIR-V shader modules.

use crate::device::Device;
use crate::error::{GpuError, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// An owned shader module.
pub struct ShaderModule {
    handle: vk::ShaderModule,
    device: Arc<Device>,
}

impl ShaderModule {
    /// Load a compiled SPIR-V binary from disk.
    pub fn from_file(device: Arc<Device>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| GpuError::ShaderFileNotFound {
            path: path.to_path_buf(),
            source,
        })?;

        let words = ash::util::read_spv(&mut Cursor::new(&bytes))
            .map_err(|e| GpuError::InvalidShader(format!("{}: {e}", path.display())))?;

        tracing::debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
        Self::from_words(device, &words)
    }

    /// Create a module from SPIR-V words already in memory.
    pub fn from_words(device: Arc<Device>, code: &[u32]) -> Result<Self> {
        if code.first() != Some(&SPIRV_MAGIC) {
            return Err(GpuError::InvalidShader(
                "Missing SPIR-V magic number".to_string(),
            ));
        }

        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let handle = unsafe { device.raw().create_shader_module(&create_info, None)? };
        Ok(Self { handle, device })
    }

    /// Get the raw module handle.
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_shader_module(self.handle, None);
        }
    }
}

const SPIRV_MAGIC: u32 = 0x0723_0203;
