//! Read-only capability queries for the selected GPU.

use crate::physical::PhysicalDeviceInfo;
use ash::vk;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// One memory heap of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryHeapInfo {
    pub size: u64,
    pub device_local: bool,
}

/// Capabilities relevant to compute workloads.
#[derive(Debug, Clone)]
pub struct Capabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Device type reported by the driver
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,
    /// Memory heaps in driver order
    pub heaps: Vec<MemoryHeapInfo>,
    /// Some memory type is both device-local and host-visible
    pub unified_memory: bool,
    /// Maximum compute workgroup count
    pub max_compute_workgroup_count: [u32; 3],
    /// Maximum compute workgroup size
    pub max_compute_workgroup_size: [u32; 3],
    /// Maximum compute workgroup invocations
    pub max_compute_workgroup_invocations: u32,
    /// Maximum compute shared memory size
    pub max_compute_shared_memory_size: u32,
    /// Maximum storage buffer range
    pub max_storage_buffer_range: u32,
}

impl Capabilities {
    /// Derive capabilities from a device snapshot.
    pub fn from_device(info: &PhysicalDeviceInfo) -> Self {
        let limits = &info.properties.limits;
        let memory = &info.memory_properties;

        let heaps = memory.memory_heaps[..memory.memory_heap_count as usize]
            .iter()
            .map(|heap| MemoryHeapInfo {
                size: heap.size,
                device_local: heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL),
            })
            .collect();

        let unified = vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;
        let unified_memory = memory.memory_types[..memory.memory_type_count as usize]
            .iter()
            .any(|ty| ty.property_flags.contains(unified));

        Self {
            vendor: GpuVendor::from_vendor_id(info.properties.vendor_id),
            device_name: info.name.clone(),
            device_type: info.properties.device_type,
            api_version: info.properties.api_version,
            driver_version: info.properties.driver_version,
            heaps,
            unified_memory,
            max_compute_workgroup_count: limits.max_compute_work_group_count,
            max_compute_workgroup_size: limits.max_compute_work_group_size,
            max_compute_workgroup_invocations: limits.max_compute_work_group_invocations,
            max_compute_shared_memory_size: limits.max_compute_shared_memory_size,
            max_storage_buffer_range: limits.max_storage_buffer_range,
        }
    }

    /// Total device-local memory in MB.
    pub fn device_local_memory_mb(&self) -> u64 {
        self.heaps
            .iter()
            .filter(|heap| heap.device_local)
            .map(|heap| heap.size / (1024 * 1024))
            .sum()
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB device-local",
            self.device_name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb(),
        )
    }
}
