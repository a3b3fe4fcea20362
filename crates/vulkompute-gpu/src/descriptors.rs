//! Descriptor set management.

use crate::config::DescriptorPoolConfig;
use crate::device::Device;
use crate::error::Result;
use ash::vk;
use std::sync::Arc;

/// Descriptor set layout builder.
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl<'a> DescriptorSetLayoutBuilder<'a> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a binding.
    pub fn binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(count)
                .stage_flags(stage_flags),
        );
        self
    }

    /// Add a storage buffer binding visible to compute shaders.
    pub fn storage_buffer(self, binding: u32) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::STORAGE_BUFFER,
            1,
            vk::ShaderStageFlags::COMPUTE,
        )
    }

    /// Add a uniform buffer binding visible to compute shaders.
    pub fn uniform_buffer(self, binding: u32) -> Self {
        self.binding(
            binding,
            vk::DescriptorType::UNIFORM_BUFFER,
            1,
            vk::ShaderStageFlags::COMPUTE,
        )
    }

    /// Bindings added so far.
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'a>] {
        &self.bindings
    }

    /// Build the descriptor set layout.
    pub fn build(self, device: Arc<Device>) -> Result<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        let handle = unsafe { device.raw().create_descriptor_set_layout(&layout_info, None)? };
        Ok(DescriptorSetLayout { handle, device })
    }
}

impl Default for DescriptorSetLayoutBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// An owned descriptor set layout.
pub struct DescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
    device: Arc<Device>,
}

impl DescriptorSetLayout {
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .raw()
                .destroy_descriptor_set_layout(self.handle, None);
        }
    }
}

/// Descriptor pool for allocating descriptor sets.
///
/// Created with `FREE_DESCRIPTOR_SET`, so individual sets may be returned.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Arc<Device>,
}

impl DescriptorPool {
    /// Create a pool sized by `config`.
    pub fn new(device: Arc<Device>, config: &DescriptorPoolConfig) -> Result<Self> {
        let pool_sizes = config.pool_sizes();
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(config.max_sets)
            .pool_sizes(&pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe { device.raw().create_descriptor_pool(&create_info, None)? };
        Ok(Self { pool, device })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate one descriptor set per layout.
    pub fn allocate(&self, layouts: &[&DescriptorSetLayout]) -> Result<Vec<vk::DescriptorSet>> {
        let handles: Vec<vk::DescriptorSetLayout> = layouts.iter().map(|l| l.handle()).collect();
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&handles);

        Ok(unsafe { self.device.raw().allocate_descriptor_sets(&alloc_info)? })
    }

    /// Return sets to the pool.
    ///
    /// The sets must not be in use by pending command buffers.
    pub fn free(&self, sets: &[vk::DescriptorSet]) -> Result<()> {
        unsafe {
            self.device.raw().free_descriptor_sets(self.pool, sets)?;
        }
        Ok(())
    }

    /// Reset the pool, freeing all descriptor sets.
    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device
                .raw()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        Ok(())
    }

    /// Point `binding` of `dst_set` at a storage buffer range.
    pub fn write_storage_buffer(
        &self,
        dst_set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    ) {
        let descriptor_type = vk::DescriptorType::STORAGE_BUFFER;
        self.write_buffer(dst_set, binding, descriptor_type, buffer, offset, range);
    }

    /// Point `binding` of `dst_set` at a uniform buffer range.
    pub fn write_uniform_buffer(
        &self,
        dst_set: vk::DescriptorSet,
        binding: u32,
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    ) {
        let descriptor_type = vk::DescriptorType::UNIFORM_BUFFER;
        self.write_buffer(dst_set, binding, descriptor_type, buffer, offset, range);
    }

    fn write_buffer(
        &self,
        dst_set: vk::DescriptorSet,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: u64,
        range: u64,
    ) {
        let buffer_info = vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(offset)
            .range(range);

        let write = vk::WriteDescriptorSet::default()
            .dst_set(dst_set)
            .dst_binding(binding)
            .descriptor_type(descriptor_type)
            .buffer_info(std::slice::from_ref(&buffer_info));

        unsafe {
            self.device.raw().update_descriptor_sets(&[write], &[]);
        }
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_descriptor_pool(self.pool, None);
        }
    }
}
