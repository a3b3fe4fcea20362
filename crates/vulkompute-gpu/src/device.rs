//! Logical device and compute queue.

use crate::config::{to_c_strings, ManagerConfig};
use crate::error::Result;
use crate::instance::Instance;
use crate::physical::{PhysicalDeviceInfo, QueueFamilyIndices};
use ash::vk;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Required by MoltenVK when the device advertises it.
const PORTABILITY_SUBSET: &CStr = c"VK_KHR_portability_subset";

/// The single compute queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Queue {
    pub handle: vk::Queue,
    pub family_index: u32,
}

/// Owned logical device.
///
/// Holds the instance alive; every resource created from the device holds an
/// `Arc<Device>` in turn.
pub struct Device {
    raw: ash::Device,
    physical: PhysicalDeviceInfo,
    queue_family: u32,
    instance: Arc<Instance>,
}

impl Device {
    /// Create the logical device with one compute queue.
    ///
    /// Fails with [`crate::GpuError::ComputeQueueUnavailable`] before touching the
    /// driver if `indices` has no compute family.
    pub fn new(
        instance: Arc<Instance>,
        physical: PhysicalDeviceInfo,
        indices: &QueueFamilyIndices,
        config: &ManagerConfig,
    ) -> Result<(Arc<Self>, Queue)> {
        let queue_family = indices.require_compute(&physical.name)?;

        let queue_priority = 1.0_f32;
        let queue_create_info = vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(std::slice::from_ref(&queue_priority));

        let mut extensions = to_c_strings(&config.device_extensions);
        if config.portability {
            let name = PORTABILITY_SUBSET;
            if unsafe { device_supports_extension(instance.raw(), physical.handle, name)? } {
                extensions.push(name.to_owned());
            }
        }
        let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let raw = unsafe {
            instance
                .raw()
                .create_device(physical.handle, &create_info, None)?
        };
        let handle = unsafe { raw.get_device_queue(queue_family, 0) };

        tracing::info!(
            "Created logical device on '{}' with compute queue family {}",
            physical.name,
            queue_family
        );

        let device = Arc::new(Self {
            raw,
            physical,
            queue_family,
            instance,
        });

        Ok((
            device,
            Queue {
                handle,
                family_index: queue_family,
            },
        ))
    }

    /// Get the raw device.
    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    /// Get the physical device this device was created from.
    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Get the owning instance.
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Get the compute queue family index.
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Get the memory-type/heap table.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical.memory_properties
    }

    /// Query format support.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .raw()
                .get_physical_device_format_properties(self.physical.handle, format)
        }
    }

    /// Whether `format` can back a storage image with optimal tiling.
    pub fn supports_storage_image(&self, format: vk::Format) -> bool {
        self.format_properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::STORAGE_IMAGE)
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.raw.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            let _ = self.raw.device_wait_idle();
            self.raw.destroy_device(None);
        }
    }
}

/// Check whether a device advertises an extension.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn device_supports_extension(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    name: &CStr,
) -> Result<bool> {
    let extensions = instance.enumerate_device_extension_properties(physical_device)?;
    Ok(extensions
        .iter()
        .any(|ext| CStr::from_ptr(ext.extension_name.as_ptr()) == name))
}
