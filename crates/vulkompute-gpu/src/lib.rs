//! Vulkan compute resource management.
//!
//! This crate provides:
//! - Instance creation and compute-capable device selection
//! - Buffer and image allocation, with dedicated or pooled memory
//! - Command buffer management with one-shot and fenced submission
//! - Transfer operations and the barriers that guard them

pub mod allocator;
pub mod barrier;
pub mod capabilities;
pub mod command;
pub mod config;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod instance;
pub mod manager;
pub mod memory;
pub mod physical;
pub mod pipeline;
pub mod resource;
pub mod shader;
pub mod sync;
pub mod transfer;

pub use allocator::{GpuAllocator, PooledBuffer};
pub use barrier::{record_memory_barrier, BarrierScope, ImageTransition, MemoryHazard};
pub use capabilities::{Capabilities, GpuVendor, MemoryHeapInfo};
pub use command::{CommandBuffer, CommandBufferState, CommandPool};
pub use config::{DescriptorPoolConfig, ManagerConfig, KHRONOS_VALIDATION};
pub use descriptors::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use device::{Device, Queue};
pub use error::{GpuError, Result};
pub use instance::Instance;
pub use manager::ComputeManager;
pub use memory::find_memory_type;
pub use physical::{enumerate_devices, select_device, PhysicalDeviceInfo, QueueFamilyIndices};
pub use pipeline::ComputePipeline;
pub use resource::{Buffer, BufferPreset, Image};
pub use shader::ShaderModule;
pub use sync::Fence;
pub use transfer::BufferCopy;

/// Re-exported so callers can name memory locations for pooled buffers.
pub use gpu_allocator::MemoryLocation;
