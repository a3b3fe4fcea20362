//! Physical device discovery and selection.

use crate::error::{GpuError, Result};
use crate::instance::Instance;
use ash::vk;
use std::collections::BTreeMap;
use std::ffi::CStr;

/// Bonus for discrete GPUs.
const DISCRETE_GPU_BONUS: u32 = 1000;

/// Queue families resolved from a device's queue-family list.
///
/// `None` means no family on the device carries the capability bit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// A graphics-capable family. Informational only.
    pub graphics: Option<u32>,
    /// A compute-capable family. Required.
    pub compute: Option<u32>,
}

impl QueueFamilyIndices {
    /// Resolve indices from queue-family properties.
    ///
    /// When several families carry a bit, the last one listed wins.
    pub fn from_properties(families: &[vk::QueueFamilyProperties]) -> Self {
        let mut indices = Self::default();

        for (i, family) in (0u32..).zip(families) {
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(i);
            }
            if family.queue_flags.contains(vk::QueueFlags::COMPUTE) {
                indices.compute = Some(i);
            }
        }

        indices
    }

    /// The compute family, or [`GpuError::ComputeQueueUnavailable`] naming
    /// `device_name`.
    pub fn require_compute(&self, device_name: &str) -> Result<u32> {
        self.compute.ok_or_else(|| GpuError::ComputeQueueUnavailable {
            device: device_name.to_string(),
        })
    }
}

/// Snapshot of a candidate GPU.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl PhysicalDeviceInfo {
    /// Query a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(handle);
        let name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        Self {
            handle,
            name,
            properties,
            queue_families: instance.get_physical_device_queue_family_properties(handle),
            memory_properties: instance.get_physical_device_memory_properties(handle),
        }
    }

    /// Resolve this device's queue families.
    pub fn queue_family_indices(&self) -> QueueFamilyIndices {
        QueueFamilyIndices::from_properties(&self.queue_families)
    }

    /// Suitability score. Zero means unusable.
    pub fn score(&self) -> u32 {
        // Need compute bit
        if self.queue_family_indices().compute.is_none() {
            return 0;
        }

        let mut score = 0u32;

        // Discrete GPUs have a significant performance advantage
        if self.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            score += DISCRETE_GPU_BONUS;
        }

        // Larger image limits stand in for overall capability
        score.saturating_add(self.properties.limits.max_image_dimension2_d)
    }
}

/// Enumerate every physical device the instance exposes.
pub fn enumerate_devices(instance: &Instance) -> Result<Vec<PhysicalDeviceInfo>> {
    let raw = instance.raw();
    let handles = unsafe { raw.enumerate_physical_devices()? };

    Ok(handles
        .into_iter()
        .map(|handle| unsafe { PhysicalDeviceInfo::query(raw, handle) })
        .collect())
}

/// Pick the highest-scoring device.
///
/// Among devices sharing the top score, the one listed last is chosen.
pub fn select_device(candidates: Vec<PhysicalDeviceInfo>) -> Result<PhysicalDeviceInfo> {
    if candidates.is_empty() {
        return Err(GpuError::NoDeviceFound);
    }

    let mut ranked: BTreeMap<u32, Vec<PhysicalDeviceInfo>> = BTreeMap::new();
    for device in candidates {
        let score = device.score();
        tracing::debug!("Device '{}' scored {}", device.name, score);
        ranked.entry(score).or_default().push(device);
    }

    let (score, mut best) = ranked.pop_last().ok_or(GpuError::NoDeviceFound)?;
    if score == 0 {
        return Err(GpuError::NoSuitableDevice);
    }

    let device = best.pop().ok_or(GpuError::NoSuitableDevice)?;
    tracing::info!("Picked physical device '{}'", device.name);
    Ok(device)
}
