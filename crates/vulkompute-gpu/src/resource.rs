//! Owned buffers and images backed by dedicated device memory.
//!
//! Each resource owns both its handle and its memory. Construction either
//! yields a bound pair or releases whatever was created; dropping the resource
//! destroys the handle and then frees the memory.

use crate::device::Device;
use crate::error::{GpuError, Result};
use crate::memory;
use ash::vk;
use bytemuck::Pod;
use std::sync::Arc;

/// Canonical buffer roles for host/device transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPreset {
    /// Host-visible source of an upload.
    StagingSrc,
    /// Host-visible destination of a readback.
    StagingDst,
    /// Device-local storage buffer that can be copied out.
    DeviceSrc,
    /// Device-local storage buffer that can be copied into.
    DeviceDst,
}

impl BufferPreset {
    /// Buffer usage for this role.
    pub fn usage(self) -> vk::BufferUsageFlags {
        match self {
            Self::StagingSrc => vk::BufferUsageFlags::TRANSFER_SRC,
            Self::StagingDst => vk::BufferUsageFlags::TRANSFER_DST,
            Self::DeviceSrc => {
                vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::STORAGE_BUFFER
            }
            Self::DeviceDst => {
                vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::STORAGE_BUFFER
            }
        }
    }

    /// Memory properties for this role.
    pub fn properties(self) -> vk::MemoryPropertyFlags {
        match self {
            Self::StagingSrc | Self::StagingDst => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
            Self::DeviceSrc | Self::DeviceDst => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        }
    }
}

/// Fail with `InvalidState` for a zero-sized buffer, which Vulkan forbids.
pub(crate) fn check_buffer_size(size: vk::DeviceSize) -> Result<()> {
    if size == 0 {
        Err(GpuError::InvalidState("Cannot create a zero-sized buffer".to_string()))
    } else {
        Ok(())
    }
}

/// A buffer with its bound memory.
pub struct Buffer {
    handle: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    properties: vk::MemoryPropertyFlags,
    device: Arc<Device>,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory at offset 0.
    pub fn new(
        device: Arc<Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        check_buffer_size(size)?;
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { device.raw().create_buffer(&buffer_info, None)? };

        // From here on, dropping `buffer` releases whatever has been created.
        let mut buffer = Self {
            handle,
            memory: vk::DeviceMemory::null(),
            size,
            properties,
            device,
        };

        let raw = buffer.device.raw();
        unsafe {
            let requirements = raw.get_buffer_memory_requirements(handle);
            buffer.memory = memory::allocate(&buffer.device, &requirements, properties)?;
            raw.bind_buffer_memory(handle, buffer.memory, 0)?;
        }

        Ok(buffer)
    }

    /// Create a buffer for one of the canonical roles.
    pub fn with_preset(
        device: Arc<Device>,
        size: vk::DeviceSize,
        preset: BufferPreset,
    ) -> Result<Self> {
        Self::new(device, size, preset.usage(), preset.properties())
    }

    /// Get the raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Get the backing memory.
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Requested size in bytes.
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Memory properties the buffer was allocated with.
    pub fn properties(&self) -> vk::MemoryPropertyFlags {
        self.properties
    }

    /// Copy `data` into the start of the buffer (must be host-visible).
    pub fn write<T: Pod>(&self, data: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        self.check_host_range(bytes.len())?;
        if bytes.is_empty() {
            return Ok(());
        }

        let raw = self.device.raw();
        unsafe {
            let len = bytes.len() as u64;
            let ptr = raw.map_memory(self.memory, 0, len, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            let flushed = if self.is_coherent() {
                Ok(())
            } else {
                raw.flush_mapped_memory_ranges(&[self.whole_range()])
            };
            raw.unmap_memory(self.memory);
            flushed?;
        }

        Ok(())
    }

    /// Copy the start of the buffer into `out` (must be host-visible).
    pub fn read<T: Pod>(&self, out: &mut [T]) -> Result<()> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(out);
        self.check_host_range(bytes.len())?;
        if bytes.is_empty() {
            return Ok(());
        }

        let raw = self.device.raw();
        unsafe {
            let len = bytes.len() as u64;
            let ptr = raw.map_memory(self.memory, 0, len, vk::MemoryMapFlags::empty())?;
            let invalidated = if self.is_coherent() {
                Ok(())
            } else {
                raw.invalidate_mapped_memory_ranges(&[self.whole_range()])
            };
            if invalidated.is_ok() {
                let dst = bytes.as_mut_ptr();
                std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), dst, bytes.len());
            }
            raw.unmap_memory(self.memory);
            invalidated?;
        }

        Ok(())
    }

    /// Read the first `count` elements into a new vector.
    pub fn read_vec<T: Pod>(&self, count: usize) -> Result<Vec<T>> {
        let mut out = vec![<T as bytemuck::Zeroable>::zeroed(); count];
        self.read(&mut out)?;
        Ok(out)
    }

    fn check_host_range(&self, len: usize) -> Result<()> {
        if !self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(GpuError::InvalidState(
                "Buffer memory is not host-visible".to_string(),
            ));
        }
        if len as u64 > self.size {
            return Err(GpuError::InvalidState(format!(
                "{} bytes do not fit in a {}-byte buffer",
                len, self.size
            )));
        }
        Ok(())
    }

    fn is_coherent(&self) -> bool {
        self.properties.contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    fn whole_range(&self) -> vk::MappedMemoryRange<'static> {
        vk::MappedMemoryRange::default()
            .memory(self.memory)
            .offset(0)
            .size(vk::WHOLE_SIZE)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            let raw = self.device.raw();
            raw.destroy_buffer(self.handle, None);
            if self.memory != vk::DeviceMemory::null() {
                raw.free_memory(self.memory, None);
            }
        }
    }
}

/// A 2D image with its bound device-local memory.
pub struct Image {
    handle: vk::Image,
    memory: vk::DeviceMemory,
    format: vk::Format,
    extent: vk::Extent3D,
    device: Arc<Device>,
}

impl Image {
    /// Create a single-mip, single-layer, optimally tiled 2D image.
    ///
    /// The image starts in `vk::ImageLayout::UNDEFINED`.
    pub fn new_2d(
        device: Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Self> {
        let extent = vk::Extent3D {
            width,
            height,
            depth: 1,
        };

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let handle = unsafe { device.raw().create_image(&create_info, None)? };

        let mut image = Self {
            handle,
            memory: vk::DeviceMemory::null(),
            format,
            extent,
            device,
        };

        let raw = image.device.raw();
        unsafe {
            let requirements = raw.get_image_memory_requirements(handle);
            image.memory = memory::allocate(
                &image.device,
                &requirements,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )?;
            raw.bind_image_memory(handle, image.memory, 0)?;
        }

        Ok(image)
    }

    /// Get the raw image handle.
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    /// Get the backing memory.
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Texel format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Full extent, depth 1.
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            let raw = self.device.raw();
            raw.destroy_image(self.handle, None);
            if self.memory != vk::DeviceMemory::null() {
                raw.free_memory(self.memory, None);
            }
        }
    }
}
