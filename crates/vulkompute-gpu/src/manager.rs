//! The compute manager, owning root of every GPU object.

use crate::allocator::{GpuAllocator, PooledBuffer};
use crate::capabilities::Capabilities;
use crate::command::{execute_one_shot, CommandBuffer, CommandPool};
use crate::config::ManagerConfig;
use crate::descriptors::DescriptorPool;
use crate::device::{Device, Queue};
use crate::error::Result;
use crate::instance::Instance;
use crate::memory;
use crate::physical::{enumerate_devices, select_device, PhysicalDeviceInfo};
use crate::resource::{Buffer, BufferPreset, Image};
use crate::sync::Fence;
use crate::transfer::{self, BufferCopy};
use ash::vk;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

/// Owns the instance, device, queue, command pool, persistent command buffer,
/// descriptor pool and pooled allocator.
///
/// Not `Sync`: all submissions go through one queue from one thread.
pub struct ComputeManager {
    command_buffer: CommandBuffer,
    descriptor_pool: DescriptorPool,
    command_pool: Arc<CommandPool>,
    allocator: Arc<GpuAllocator>,
    queue: Queue,
    capabilities: Capabilities,
    device: Arc<Device>,
    instance: Arc<Instance>,
}

impl ComputeManager {
    /// Bring up a manager on the best available compute-capable GPU.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        let instance = Instance::new(&config)?;

        let physical = select_device(enumerate_devices(&instance)?)?;
        let indices = physical.queue_family_indices();
        let capabilities = Capabilities::from_device(&physical);
        tracing::info!("{}", capabilities.summary());

        let (device, queue) = Device::new(Arc::clone(&instance), physical, &indices, &config)?;

        let storage_format = vk::Format::R32_SFLOAT;
        if device.supports_storage_image(storage_format) {
            tracing::debug!("{:?} storage images supported", storage_format);
        } else {
            tracing::warn!("{:?} storage images not supported", storage_format);
        }

        let allocator = GpuAllocator::new(Arc::clone(&device))?;
        let command_pool = CommandPool::new(Arc::clone(&device), queue.family_index)?;
        let command_buffer = command_pool.allocate()?;
        let descriptor_pool = DescriptorPool::new(Arc::clone(&device), &config.descriptor_pool)?;

        Ok(Self {
            command_buffer,
            descriptor_pool,
            command_pool,
            allocator,
            queue,
            capabilities,
            device,
            instance,
        })
    }

    /// The Vulkan instance.
    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    /// Snapshot of the selected physical device.
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        self.device.physical()
    }

    /// The logical device.
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// The compute queue.
    pub fn queue(&self) -> Queue {
        self.queue
    }

    /// The pool every command buffer is allocated from.
    pub fn command_pool(&self) -> &Arc<CommandPool> {
        &self.command_pool
    }

    /// The persistent command buffer, reused across dispatches.
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// The shared descriptor pool.
    pub fn descriptor_pool(&self) -> &DescriptorPool {
        &self.descriptor_pool
    }

    /// The pooled allocator.
    pub fn allocator(&self) -> &Arc<GpuAllocator> {
        &self.allocator
    }

    /// Capabilities of the selected device.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Name of the selected device.
    pub fn device_name(&self) -> &str {
        &self.device.physical().name
    }

    /// Find a memory type on the selected device.
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Result<u32> {
        memory::find_memory_type(self.device.memory_properties(), type_bits, required)
    }

    /// Create a buffer with dedicated memory.
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Buffer> {
        Buffer::new(Arc::clone(&self.device), size, usage, properties)
    }

    /// Host-visible buffer to upload from.
    pub fn create_staging_buffer_src(&self, size: vk::DeviceSize) -> Result<Buffer> {
        Buffer::with_preset(Arc::clone(&self.device), size, BufferPreset::StagingSrc)
    }

    /// Host-visible buffer to read back into.
    pub fn create_staging_buffer_dst(&self, size: vk::DeviceSize) -> Result<Buffer> {
        Buffer::with_preset(Arc::clone(&self.device), size, BufferPreset::StagingDst)
    }

    /// Device-local storage buffer to copy out of.
    pub fn create_device_buffer_src(&self, size: vk::DeviceSize) -> Result<Buffer> {
        Buffer::with_preset(Arc::clone(&self.device), size, BufferPreset::DeviceSrc)
    }

    /// Device-local storage buffer to copy into.
    pub fn create_device_buffer_dst(&self, size: vk::DeviceSize) -> Result<Buffer> {
        Buffer::with_preset(Arc::clone(&self.device), size, BufferPreset::DeviceDst)
    }

    /// Create a buffer sub-allocated from the pooled allocator.
    pub fn create_pooled_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<PooledBuffer> {
        self.allocator.create_buffer(size, usage, location, name)
    }

    /// Create a device-local 2D image in `UNDEFINED` layout.
    pub fn create_image_2d(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Image> {
        Image::new_2d(Arc::clone(&self.device), width, height, format, usage)
    }

    /// Create a fence for caller-managed submissions.
    pub fn create_fence(&self, signaled: bool) -> Result<Fence> {
        Fence::new(Arc::clone(&self.device), signaled)
    }

    /// Record with `record` into a fresh buffer, submit it and block until the
    /// queue is idle.
    pub fn one_shot<F, R>(&self, record: F) -> Result<R>
    where
        F: FnOnce(&CommandBuffer) -> Result<R>,
    {
        execute_one_shot(&self.command_pool, self.queue, record)
    }

    /// Submit an ended command buffer, signaling `fence` on completion.
    pub fn submit(&self, cmd: &CommandBuffer, fence: Option<&Fence>) -> Result<()> {
        cmd.submit(self.queue, fence)
    }

    /// Wait for the submission of `cmd` that signals `fence`.
    ///
    /// `cmd` must be pending on `fence`; otherwise this fails with
    /// `InvalidState` instead of blocking.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn wait(&self, cmd: &CommandBuffer, fence: &Fence) -> Result<()> {
        cmd.wait_for(fence)
    }

    /// Copy `size` bytes between buffers.
    pub fn copy_buffer(
        &self,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
        cmd: Option<&CommandBuffer>,
    ) -> Result<()> {
        transfer::copy_buffer(&self.command_pool, self.queue, src, dst, size, cmd)
    }

    /// Copy several buffer pairs in one submission.
    pub fn copy_buffers(&self, copies: &[BufferCopy], cmd: Option<&CommandBuffer>) -> Result<()> {
        transfer::copy_buffers(&self.command_pool, self.queue, copies, cmd)
    }

    /// Upload a whole image from a buffer.
    pub fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: &Image,
        prior_layout: vk::ImageLayout,
        final_layout: vk::ImageLayout,
        cmd: Option<&CommandBuffer>,
    ) -> Result<()> {
        transfer::copy_buffer_to_image(
            &self.command_pool,
            self.queue,
            buffer,
            image,
            prior_layout,
            final_layout,
            cmd,
        )
    }

    /// Read a whole image back into a buffer.
    pub fn copy_image_to_buffer(
        &self,
        image: &Image,
        buffer: vk::Buffer,
        prior_layout: vk::ImageLayout,
        final_layout: vk::ImageLayout,
        cmd: Option<&CommandBuffer>,
    ) -> Result<()> {
        transfer::copy_image_to_buffer(
            &self.command_pool,
            self.queue,
            image,
            buffer,
            prior_layout,
            final_layout,
            cmd,
        )
    }

    /// Wait for the device to go idle.
    pub fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }
}

impl Drop for ComputeManager {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            tracing::error!("Failed to wait for device idle on shutdown: {e}");
        }
    }
}
