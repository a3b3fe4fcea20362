//! The square-array scenario.

use anyhow::{bail, ensure, Context};
use ash::vk;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vulkompute_gpu::{
    record_memory_barrier, ComputeManager, ComputePipeline, DescriptorSetLayout,
    DescriptorSetLayoutBuilder, MemoryHazard, MemoryLocation, ShaderModule,
};

const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Largest element count whose indices all fit in an `i32`.
pub const MAX_COUNT: u32 = i32::MAX as u32;

/// Location of the compiled kernel inside this crate.
pub fn default_shader_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders/square.spv")
}

/// `0..count` as the kernel's input. `count` is capped at [`MAX_COUNT`].
pub fn input(count: u32) -> Vec<i32> {
    (0..count.min(MAX_COUNT)).map(|i| i as i32).collect()
}

/// Workgroup count along x for `count` elements, one element per invocation.
///
/// Fails if it exceeds the device's `max_compute_workgroup_count[0]`.
pub fn workgroup_count(count: usize, max_groups: u32) -> anyhow::Result<u32> {
    match u32::try_from(count) {
        Ok(groups) if groups <= max_groups => Ok(groups),
        _ => bail!("{count} elements need more than the device's {max_groups} workgroups"),
    }
}

/// Check every element of `output` is the square of `input`.
pub fn verify(input: &[i32], output: &[i32]) -> anyhow::Result<()> {
    ensure!(
        input.len() == output.len(),
        "expected {} results, got {}",
        input.len(),
        output.len()
    );
    for (i, (x, y)) in input.iter().zip(output).enumerate() {
        // The kernel squares in 32-bit two's complement
        ensure!(x.wrapping_mul(*x) == *y, "element {i}: {x}^2 != {y}");
    }
    Ok(())
}

/// Kernel objects shared by both paths.
struct Kernel {
    pipeline: ComputePipeline,
    layout: DescriptorSetLayout,
}

impl Kernel {
    fn load(manager: &ComputeManager, shader_path: &Path) -> anyhow::Result<Self> {
        let device = manager.device();
        let shader = ShaderModule::from_file(Arc::clone(device), shader_path)
            .with_context(|| format!("loading {}", shader_path.display()))?;

        let layout = DescriptorSetLayoutBuilder::new()
            .storage_buffer(0)
            .storage_buffer(1)
            .build(Arc::clone(device))?;

        let pipeline =
            ComputePipeline::new(Arc::clone(device), &shader, ENTRY_POINT, &[&layout], &[])?;

        Ok(Self { pipeline, layout })
    }

    /// Allocate a set pointing binding 0 at `input` and binding 1 at `output`.
    fn bind_buffers(
        &self,
        manager: &ComputeManager,
        input: vk::Buffer,
        output: vk::Buffer,
        size: u64,
    ) -> anyhow::Result<vk::DescriptorSet> {
        let pool = manager.descriptor_pool();
        let set = pool
            .allocate(&[&self.layout])?
            .into_iter()
            .next()
            .context("descriptor pool returned no set")?;

        pool.write_storage_buffer(set, 0, input, 0, size);
        pool.write_storage_buffer(set, 1, output, 0, size);
        Ok(set)
    }
}

/// Staged path: host → staging → device → kernel → device → staging → host,
/// all recorded into the manager's persistent command buffer and waited on
/// with a fence.
pub fn run_staged(
    manager: &ComputeManager,
    shader_path: &Path,
    input: &[i32],
) -> anyhow::Result<Vec<i32>> {
    let count = input.len();
    let groups = workgroup_count(count, manager.capabilities().max_compute_workgroup_count[0])?;
    let size = std::mem::size_of_val(input) as u64;

    let staging_in = manager.create_staging_buffer_src(size)?;
    let device_in = manager.create_device_buffer_dst(size)?;
    let device_out = manager.create_device_buffer_src(size)?;
    let staging_out = manager.create_staging_buffer_dst(size)?;
    staging_in.write(input)?;

    let kernel = Kernel::load(manager, shader_path)?;
    let set = kernel.bind_buffers(manager, device_in.handle(), device_out.handle(), size)?;

    let cmd = manager.command_buffer();
    cmd.begin(vk::CommandBufferUsageFlags::empty())?;
    manager.copy_buffer(staging_in.handle(), device_in.handle(), size, Some(cmd))?;
    record_memory_barrier(cmd, MemoryHazard::TransferWriteBeforeComputeRead)?;
    kernel.pipeline.bind(cmd, &[set])?;
    kernel.pipeline.dispatch(cmd, groups, 1, 1)?;
    record_memory_barrier(cmd, MemoryHazard::ComputeWriteBeforeTransferRead)?;
    manager.copy_buffer(device_out.handle(), staging_out.handle(), size, Some(cmd))?;
    record_memory_barrier(cmd, MemoryHazard::TransferWriteBeforeHostRead)?;
    cmd.end()?;

    let fence = manager.create_fence(false)?;
    manager.submit(cmd, Some(&fence))?;
    manager.wait(cmd, &fence)?;

    let output = staging_out.read_vec(count)?;
    manager.descriptor_pool().free(&[set])?;
    Ok(output)
}

/// Pooled path: the kernel reads and writes persistently mapped buffers
/// directly, dispatched as a one-shot.
pub fn run_pooled(
    manager: &ComputeManager,
    shader_path: &Path,
    input: &[i32],
) -> anyhow::Result<Vec<i32>> {
    let count = input.len();
    let groups = workgroup_count(count, manager.capabilities().max_compute_workgroup_count[0])?;
    let size = std::mem::size_of_val(input) as u64;
    let usage = vk::BufferUsageFlags::STORAGE_BUFFER;

    let mut upload =
        manager.create_pooled_buffer(size, usage, MemoryLocation::CpuToGpu, "square-in")?;
    let readback =
        manager.create_pooled_buffer(size, usage, MemoryLocation::GpuToCpu, "square-out")?;
    upload.write(input)?;

    let kernel = Kernel::load(manager, shader_path)?;
    let set = kernel.bind_buffers(manager, upload.handle(), readback.handle(), size)?;

    manager.one_shot(|cmd| {
        kernel.pipeline.bind(cmd, &[set])?;
        kernel.pipeline.dispatch(cmd, groups, 1, 1)?;
        record_memory_barrier(cmd, MemoryHazard::ComputeWriteBeforeHostRead)
    })?;

    let mut output = vec![0i32; count];
    readback.read(&mut output)?;
    manager.descriptor_pool().free(&[set])?;
    Ok(output)
}
