//! Synchronization primitives.

use crate::device::Device;
use crate::error::{GpuError, Result};
use ash::vk;
use std::sync::Arc;

/// An owned fence.
pub struct Fence {
    handle: vk::Fence,
    device: Arc<Device>,
}

impl Fence {
    /// Create a fence, optionally already signaled.
    pub fn new(device: Arc<Device>, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let handle = unsafe { device.raw().create_fence(&create_info, None)? };
        Ok(Self { handle, device })
    }

    /// Get the raw fence handle.
    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Block until the fence is signaled or `timeout_ns` elapses.
    ///
    /// A timeout or device loss is reported as
    /// [`GpuError::CommandSubmission`].
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn wait_timeout(&self, timeout_ns: u64) -> Result<()> {
        unsafe {
            self.device
                .raw()
                .wait_for_fences(&[self.handle], true, timeout_ns)
                .map_err(GpuError::CommandSubmission)
        }
    }

    /// Block until the fence is signaled.
    pub fn wait(&self) -> Result<()> {
        self.wait_timeout(u64::MAX)
    }

    /// Whether the fence is currently signaled.
    pub fn is_signaled(&self) -> Result<bool> {
        Ok(unsafe { self.device.raw().get_fence_status(self.handle)? })
    }

    /// Reset to the unsignaled state.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device.raw().reset_fences(&[self.handle])?;
        }
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_fence(self.handle, None);
        }
    }
}
