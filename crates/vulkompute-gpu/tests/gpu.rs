//! End-to-end tests against a real device.

use ash::vk;
use std::sync::Arc;
use vulkompute_gpu::{
    BufferCopy, CommandBufferState, ComputeManager, GpuError, ManagerConfig, MemoryLocation,
    ShaderModule,
};

fn manager() -> ComputeManager {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    ComputeManager::new(ManagerConfig::new("vulkompute-test")).unwrap()
}

#[test]
#[ignore = "Requires GPU hardware"]
fn staging_round_trip_through_device_memory() {
    let manager = manager();
    let data: Vec<u32> = (0..256).map(|i| i * 3 + 1).collect();
    let size = std::mem::size_of_val(data.as_slice()) as u64;

    let upload = manager.create_staging_buffer_src(size).unwrap();
    let device_buffer = manager
        .create_buffer(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .unwrap();
    let readback = manager.create_staging_buffer_dst(size).unwrap();

    upload.write(&data).unwrap();
    manager
        .copy_buffer(upload.handle(), device_buffer.handle(), size, None)
        .unwrap();
    manager
        .copy_buffer(device_buffer.handle(), readback.handle(), size, None)
        .unwrap();

    assert_eq!(readback.read_vec::<u32>(data.len()).unwrap(), data);
}

#[test]
#[ignore = "Requires GPU hardware"]
fn batched_copies_share_one_submission() {
    let manager = manager();
    let a: Vec<u32> = (0..64).collect();
    let b: Vec<u32> = (100..164).collect();
    let size = 64 * 4;

    let src_a = manager.create_staging_buffer_src(size).unwrap();
    let src_b = manager.create_staging_buffer_src(size).unwrap();
    let dst_a = manager.create_staging_buffer_dst(size).unwrap();
    let dst_b = manager.create_staging_buffer_dst(size).unwrap();
    src_a.write(&a).unwrap();
    src_b.write(&b).unwrap();

    manager
        .copy_buffers(
            &[
                BufferCopy {
                    src: src_a.handle(),
                    dst: dst_a.handle(),
                    size,
                },
                BufferCopy {
                    src: src_b.handle(),
                    dst: dst_b.handle(),
                    size,
                },
            ],
            None,
        )
        .unwrap();

    assert_eq!(dst_a.read_vec::<u32>(64).unwrap(), a);
    assert_eq!(dst_b.read_vec::<u32>(64).unwrap(), b);
}

#[test]
#[ignore = "Requires GPU hardware"]
fn fenced_submission_of_persistent_buffer() {
    let manager = manager();
    let data = [7u32; 16];
    let size = 64;

    let src = manager.create_staging_buffer_src(size).unwrap();
    let dst = manager.create_staging_buffer_dst(size).unwrap();
    src.write(&data).unwrap();

    let cmd = manager.command_buffer();
    let fence = manager.create_fence(false).unwrap();

    cmd.begin(vk::CommandBufferUsageFlags::empty()).unwrap();
    manager
        .copy_buffer(src.handle(), dst.handle(), size, Some(cmd))
        .unwrap();
    cmd.end().unwrap();
    manager.submit(cmd, Some(&fence)).unwrap();
    assert_eq!(cmd.state(), CommandBufferState::Pending);

    manager.wait(cmd, &fence).unwrap();
    assert_eq!(cmd.state(), CommandBufferState::Executable);
    assert!(fence.is_signaled().unwrap());
    assert_eq!(dst.read_vec::<u32>(16).unwrap(), data);
}

#[test]
#[ignore = "Requires GPU hardware"]
fn recording_into_idle_buffer_is_rejected() {
    let manager = manager();
    let src = manager.create_staging_buffer_src(16).unwrap();
    let dst = manager.create_staging_buffer_dst(16).unwrap();

    let idle = manager.command_buffer();
    let result = manager.copy_buffer(src.handle(), dst.handle(), 16, Some(idle));
    assert!(matches!(result, Err(GpuError::InvalidState(_))));
}

#[test]
#[ignore = "Requires GPU hardware"]
fn failed_recorder_submits_nothing() {
    let manager = manager();
    let result: vulkompute_gpu::Result<()> =
        manager.one_shot(|_| Err(GpuError::InvalidState("abort".to_string())));
    assert!(matches!(result, Err(GpuError::InvalidState(_))));
    manager.wait_idle().unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn accessors_are_stable() {
    let manager = manager();
    assert_eq!(manager.queue(), manager.queue());
    assert_eq!(manager.device().raw().handle(), manager.device().raw().handle());
    assert_eq!(
        manager.command_pool().handle(),
        manager.command_pool().handle()
    );
    assert_eq!(
        manager.command_buffer().handle(),
        manager.command_buffer().handle()
    );
    assert_eq!(
        manager.descriptor_pool().handle(),
        manager.descriptor_pool().handle()
    );
    assert_eq!(
        manager.physical_device().handle,
        manager.physical_device().handle
    );
    assert_eq!(manager.device_name(), manager.capabilities().device_name);
    assert_eq!(manager.queue().family_index, manager.device().queue_family());
}

#[test]
#[ignore = "Requires GPU hardware"]
fn impossible_memory_flags_fail_cleanly() {
    let manager = manager();
    let flags = vk::MemoryPropertyFlags::PROTECTED | vk::MemoryPropertyFlags::LAZILY_ALLOCATED
        | vk::MemoryPropertyFlags::HOST_VISIBLE;

    let result = manager.create_buffer(64, vk::BufferUsageFlags::STORAGE_BUFFER, flags);
    assert!(matches!(
        result,
        Err(GpuError::NoSuitableMemoryType { required, .. }) if required == flags
    ));
}

#[test]
#[ignore = "Requires GPU hardware"]
fn image_round_trip() {
    let manager = manager();
    let (width, height) = (16, 8);
    let texels: Vec<f32> = (0..width * height).map(|i| i as f32 * 0.5).collect();
    let size = std::mem::size_of_val(texels.as_slice()) as u64;

    let image = manager
        .create_image_2d(
            width,
            height,
            vk::Format::R32_SFLOAT,
            vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST,
        )
        .unwrap();
    let upload = manager.create_staging_buffer_src(size).unwrap();
    let readback = manager.create_staging_buffer_dst(size).unwrap();
    upload.write(&texels).unwrap();

    manager
        .copy_buffer_to_image(
            upload.handle(),
            &image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
            None,
        )
        .unwrap();
    manager
        .copy_image_to_buffer(
            &image,
            readback.handle(),
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::GENERAL,
            None,
        )
        .unwrap();

    assert_eq!(readback.read_vec::<f32>(texels.len()).unwrap(), texels);
}

#[test]
#[ignore = "Requires GPU hardware"]
fn unsupported_layout_is_rejected_before_recording() {
    let manager = manager();
    let image = manager
        .create_image_2d(4, 4, vk::Format::R32_SFLOAT, vk::ImageUsageFlags::TRANSFER_DST)
        .unwrap();
    let upload = manager.create_staging_buffer_src(64).unwrap();

    let result = manager.copy_buffer_to_image(
        upload.handle(),
        &image,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::PRESENT_SRC_KHR,
        None,
    );
    assert!(matches!(
        result,
        Err(GpuError::UnsupportedLayoutTransition { .. })
    ));
}

#[test]
#[ignore = "Requires GPU hardware"]
fn pooled_buffers_map_host_memory() {
    let manager = manager();
    let data: Vec<u32> = (0..32).collect();
    let usage = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;

    let mut upload = manager
        .create_pooled_buffer(128, usage, MemoryLocation::CpuToGpu, "upload")
        .unwrap();
    let readback = manager
        .create_pooled_buffer(128, usage, MemoryLocation::GpuToCpu, "readback")
        .unwrap();
    let mut gpu_only = manager
        .create_pooled_buffer(128, usage, MemoryLocation::GpuOnly, "gpu-only")
        .unwrap();

    upload.write(&data).unwrap();
    manager
        .copy_buffer(upload.handle(), readback.handle(), 128, None)
        .unwrap();

    let mut out = vec![0u32; 32];
    readback.read(&mut out).unwrap();
    assert_eq!(out, data);
    assert!(matches!(gpu_only.write(&data), Err(GpuError::InvalidState(_))));
}

#[test]
#[ignore = "Requires GPU hardware"]
fn missing_shader_file_is_reported() {
    let manager = manager();
    let result = ShaderModule::from_file(Arc::clone(manager.device()), "does/not/exist.spv");
    match result {
        Err(GpuError::ShaderFileNotFound { path, .. }) => {
            assert_eq!(path, std::path::Path::new("does/not/exist.spv"));
        }
        Err(other) => panic!("expected ShaderFileNotFound, got {other:?}"),
        Ok(_) => panic!("expected ShaderFileNotFound, got a module"),
    }
}

#[test]
#[ignore = "Requires GPU hardware"]
fn host_writes_need_host_visible_memory() {
    let manager = manager();
    let device_local = manager.create_device_buffer_dst(64).unwrap();
    assert!(matches!(
        device_local.write(&[1u32; 16]),
        Err(GpuError::InvalidState(_))
    ));
}

#[test]
#[ignore = "Requires GPU hardware"]
fn host_writes_past_the_end_are_rejected() {
    let manager = manager();
    let staging = manager.create_staging_buffer_src(16).unwrap();
    assert!(matches!(
        staging.write(&[0u32; 5]),
        Err(GpuError::InvalidState(_))
    ));
    let mut out = [0u32; 5];
    assert!(matches!(staging.read(&mut out), Err(GpuError::InvalidState(_))));
}

#[test]
#[ignore = "Requires GPU hardware"]
fn zero_sized_buffers_are_rejected() {
    let manager = manager();
    assert!(matches!(
        manager.create_staging_buffer_src(0),
        Err(GpuError::InvalidState(_))
    ));
    let pooled = manager.create_pooled_buffer(
        0,
        vk::BufferUsageFlags::STORAGE_BUFFER,
        MemoryLocation::CpuToGpu,
        "empty",
    );
    assert!(matches!(pooled, Err(GpuError::InvalidState(_))));
}

#[test]
#[ignore = "Requires GPU hardware"]
fn fence_timeout_is_a_submission_error() {
    let manager = manager();
    let fence = manager.create_fence(false).unwrap();
    assert!(matches!(
        fence.wait_timeout(0),
        Err(GpuError::CommandSubmission(vk::Result::TIMEOUT))
    ));
}

#[test]
#[ignore = "Requires GPU hardware"]
fn waiting_on_the_wrong_fence_does_not_block() {
    let manager = manager();
    let src = manager.create_staging_buffer_src(16).unwrap();
    let dst = manager.create_staging_buffer_dst(16).unwrap();
    let submitted = manager.create_fence(false).unwrap();
    let unrelated = manager.create_fence(false).unwrap();

    let cmd = manager.command_buffer();
    cmd.begin(vk::CommandBufferUsageFlags::empty()).unwrap();
    manager
        .copy_buffer(src.handle(), dst.handle(), 16, Some(cmd))
        .unwrap();
    cmd.end().unwrap();
    manager.submit(cmd, Some(&submitted)).unwrap();

    assert!(matches!(
        manager.wait(cmd, &unrelated),
        Err(GpuError::InvalidState(_))
    ));
    assert_eq!(cmd.state(), CommandBufferState::Pending);
    manager.wait(cmd, &submitted).unwrap();
    assert_eq!(cmd.state(), CommandBufferState::Executable);
}

#[test]
#[ignore = "Requires GPU hardware"]
fn waiting_on_an_unfenced_submission_does_not_block() {
    let manager = manager();
    let src = manager.create_staging_buffer_src(16).unwrap();
    let dst = manager.create_staging_buffer_dst(16).unwrap();
    let fence = manager.create_fence(false).unwrap();

    let cmd = manager.command_buffer();
    cmd.begin(vk::CommandBufferUsageFlags::empty()).unwrap();
    manager
        .copy_buffer(src.handle(), dst.handle(), 16, Some(cmd))
        .unwrap();
    cmd.end().unwrap();
    manager.submit(cmd, None).unwrap();

    assert!(matches!(
        manager.wait(cmd, &fence),
        Err(GpuError::InvalidState(_))
    ));
    manager.wait_idle().unwrap();
}
