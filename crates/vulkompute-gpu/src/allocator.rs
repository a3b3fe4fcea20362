//! Pooled memory through gpu-allocator.
//!
//! Unlike [`Buffer`](crate::Buffer), which gives every resource its own
//! `VkDeviceMemory`, buffers created here are sub-allocated from larger memory
//! blocks and stay persistently mapped when they live in host-visible memory.

use crate::device::Device;
use crate::error::{GpuError, Result};
use crate::resource::check_buffer_size;
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::sync::Arc;

/// GPU memory allocator wrapper.
pub struct GpuAllocator {
    allocator: Mutex<Option<Allocator>>,
    device: Arc<Device>,
}

impl GpuAllocator {
    /// Create a new allocator for `device`.
    pub fn new(device: Arc<Device>) -> Result<Arc<Self>> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: device.instance().raw().clone(),
            device: device.raw().clone(),
            physical_device: device.physical().handle,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::Allocation(e.to_string()))?;

        Ok(Arc::new(Self {
            allocator: Mutex::new(Some(allocator)),
            device,
        }))
    }

    /// Create a buffer sub-allocated from `location`.
    pub fn create_buffer(
        self: &Arc<Self>,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<PooledBuffer> {
        check_buffer_size(size)?;
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let raw = self.device.raw();
        let handle = unsafe { raw.create_buffer(&buffer_info, None)? };

        let mut buffer = PooledBuffer {
            handle,
            allocation: None,
            size,
            location,
            allocator: Arc::clone(self),
        };

        let requirements = unsafe { raw.get_buffer_memory_requirements(handle) };
        let allocation = self.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        let bound =
            unsafe { raw.bind_buffer_memory(handle, allocation.memory(), allocation.offset()) };
        // Dropping `buffer` on error releases both the handle and the allocation
        buffer.allocation = Some(allocation);
        bound?;

        Ok(buffer)
    }

    /// Release every memory block.
    ///
    /// Any allocation still alive is reported as a leak.
    pub fn shutdown(&self) {
        // The gpu_allocator::Allocator::Drop will call vkFreeMemory
        drop(self.allocator.lock().take());
    }

    fn allocate(&self, desc: &AllocationCreateDesc<'_>) -> Result<Allocation> {
        self.allocator
            .lock()
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))?
            .allocate(desc)
            .map_err(|e| GpuError::Allocation(e.to_string()))
    }

    fn free(&self, allocation: Allocation) {
        if let Some(allocator) = self.allocator.lock().as_mut() {
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free pooled allocation: {e}");
            }
        }
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A buffer sub-allocated from a [`GpuAllocator`].
pub struct PooledBuffer {
    handle: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
    location: MemoryLocation,
    allocator: Arc<GpuAllocator>,
}

impl PooledBuffer {
    /// Get the raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Requested size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Memory location the buffer was sub-allocated from.
    pub fn location(&self) -> MemoryLocation {
        self.location
    }

    /// Write data to the start of the buffer (must be host-visible).
    pub fn write<T: Pod>(&mut self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = self.size;
        let mapped = self
            .allocation
            .as_mut()
            .and_then(Allocation::mapped_slice_mut)
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        if bytes.len() as u64 > size {
            return Err(GpuError::InvalidState(
                "Data too large for buffer".to_string(),
            ));
        }

        mapped[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Read the start of the buffer into `out` (must be host-visible).
    pub fn read<T: Pod>(&self, out: &mut [T]) -> Result<()> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        let mapped = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_slice)
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;

        if bytes.len() as u64 > self.size {
            return Err(GpuError::InvalidState(
                "Read larger than buffer".to_string(),
            ));
        }

        bytes.copy_from_slice(&mapped[..bytes.len()]);
        Ok(())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        unsafe {
            self.allocator.device.raw().destroy_buffer(self.handle, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.allocator.free(allocation);
        }
    }
}
