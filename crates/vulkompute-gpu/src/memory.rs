//! Memory type selection and raw allocation.

use crate::device::Device;
use crate::error::{GpuError, Result};
use ash::vk;

/// Find the first memory type allowed by `type_bits` whose flags include
/// `required`.
///
/// Types are scanned in driver order, so the driver's preferred type wins
/// among equal candidates.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = memory_properties.memory_type_count as usize;

    let (index, memory_type) = (0u32..)
        .zip(&memory_properties.memory_types[..count])
        .find(|&(i, ty)| type_bits & (1 << i) != 0 && ty.property_flags.contains(required))
        .ok_or(GpuError::NoSuitableMemoryType {
            type_bits,
            required,
        })?;

    let heap = &memory_properties.memory_heaps[memory_type.heap_index as usize];
    tracing::debug!(
        "Found memory type {} ({:?}) on heap {} ({} MB)",
        index,
        memory_type.property_flags,
        memory_type.heap_index,
        heap.size / (1024 * 1024)
    );

    Ok(index)
}

/// Allocate memory satisfying `requirements` with the given properties.
///
/// # Safety
/// The device must be valid.
pub(crate) unsafe fn allocate(
    device: &Device,
    requirements: &vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
) -> Result<vk::DeviceMemory> {
    let memory_type_index = find_memory_type(
        device.memory_properties(),
        requirements.memory_type_bits,
        properties,
    )?;

    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    Ok(device.raw().allocate_memory(&alloc_info, None)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn table(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            memory_heap_count: 1,
            ..Default::default()
        };
        props.memory_heaps[0] = vk::MemoryHeap {
            size: 256 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            *slot = vk::MemoryType {
                property_flags: flags,
                heap_index: 0,
            };
        }
        props
    }

    /// Memory layout of a typical discrete GPU.
    pub(crate) fn discrete_table() -> vk::PhysicalDeviceMemoryProperties {
        table(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ])
    }

    #[test]
    fn picks_first_qualifying_type() {
        let props = discrete_table();
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert_eq!(find_memory_type(&props, 0b111, host).unwrap(), 1);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
    }

    #[test]
    fn respects_type_filter() {
        let props = discrete_table();
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert_eq!(find_memory_type(&props, 0b100, host).unwrap(), 2);
    }

    #[test]
    fn superset_flags_qualify() {
        let props = discrete_table();
        let cached = vk::MemoryPropertyFlags::HOST_CACHED;
        assert_eq!(find_memory_type(&props, u32::MAX, cached).unwrap(), 2);
    }

    #[test]
    fn empty_request_matches_first_allowed() {
        let props = discrete_table();
        assert_eq!(
            find_memory_type(&props, 0b110, vk::MemoryPropertyFlags::empty()).unwrap(),
            1
        );
    }

    #[test]
    fn is_deterministic() {
        let props = discrete_table();
        let flags = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let first = find_memory_type(&props, 0b110, flags).unwrap();
        for _ in 0..16 {
            assert_eq!(find_memory_type(&props, 0b110, flags).unwrap(), first);
        }
    }

    #[test]
    fn types_past_count_are_ignored() {
        let mut props = discrete_table();
        props.memory_types[5] = vk::MemoryType {
            property_flags: vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
            heap_index: 0,
        };
        assert!(find_memory_type(&props, u32::MAX, vk::MemoryPropertyFlags::LAZILY_ALLOCATED)
            .is_err());
    }

    #[test]
    fn impossible_combination_fails() {
        // No unified memory on a discrete layout
        let props = discrete_table();
        let flags = vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;
        match find_memory_type(&props, u32::MAX, flags) {
            Err(GpuError::NoSuitableMemoryType {
                type_bits,
                required,
            }) => {
                assert_eq!(type_bits, u32::MAX);
                assert_eq!(required, flags);
            }
            other => panic!("expected NoSuitableMemoryType, got {other:?}"),
        }
    }
}
