//! Buffer and image copies.
//!
//! Each operation either records into a caller-provided command buffer that is
//! already recording, or runs as its own one-shot submission and returns once
//! the queue has drained. One-shot submissions end with a transfer-to-host
//! barrier, so their results are visible to the host as soon as the call
//! returns. Callers recording into their own buffer must record
//! [`MemoryHazard::TransferWriteBeforeHostRead`] themselves before reading
//! back.

use crate::barrier::{record_memory_barrier, ImageTransition, MemoryHazard};
use crate::command::{execute_one_shot, CommandBuffer, CommandPool};
use crate::device::Queue;
use crate::error::{GpuError, Result};
use crate::resource::Image;
use ash::vk;
use std::sync::Arc;

/// One buffer-to-buffer copy, starting at offset 0 of both buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferCopy {
    pub src: vk::Buffer,
    pub dst: vk::Buffer,
    pub size: vk::DeviceSize,
}

/// Hazard closing every one-shot transfer.
pub(crate) const ONE_SHOT_HAZARD: MemoryHazard = MemoryHazard::TransferWriteBeforeHostRead;

/// Record into `cmd` if given, otherwise run `record` as a one-shot that ends
/// with [`ONE_SHOT_HAZARD`].
pub(crate) fn record_or_submit<F>(
    pool: &Arc<CommandPool>,
    queue: Queue,
    cmd: Option<&CommandBuffer>,
    record: F,
) -> Result<()>
where
    F: FnOnce(&CommandBuffer) -> Result<()>,
{
    match cmd {
        Some(cmd) => {
            cmd.ensure_recording()?;
            record(cmd)
        }
        None => execute_one_shot(pool, queue, |cmd| {
            record(cmd)?;
            record_memory_barrier(cmd, ONE_SHOT_HAZARD)
        }),
    }
}

/// Copy `size` bytes from `src` to `dst`.
pub fn copy_buffer(
    pool: &Arc<CommandPool>,
    queue: Queue,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
    cmd: Option<&CommandBuffer>,
) -> Result<()> {
    copy_buffers(pool, queue, &[BufferCopy { src, dst, size }], cmd)
}

/// Record several copies in one go.
///
/// Without `cmd` all copies share a single submission.
pub fn copy_buffers(
    pool: &Arc<CommandPool>,
    queue: Queue,
    copies: &[BufferCopy],
    cmd: Option<&CommandBuffer>,
) -> Result<()> {
    if let Some(copy) = copies.iter().find(|c| c.size == 0) {
        return Err(GpuError::InvalidState(format!(
            "Zero-sized copy from {:?} to {:?}",
            copy.src, copy.dst
        )));
    }
    if copies.is_empty() {
        return Ok(());
    }

    record_or_submit(pool, queue, cmd, |cmd| {
        for copy in copies {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: copy.size,
            };
            unsafe {
                cmd.device()
                    .cmd_copy_buffer(cmd.handle(), copy.src, copy.dst, &[region]);
            }
        }
        Ok(())
    })
}

/// Full-extent region for a tightly packed buffer and a color image.
fn image_region(image: &Image) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D::default(),
        image_extent: image.extent(),
    }
}

/// Upload the whole of `image` from `buffer`.
///
/// The image moves from `prior_layout` to `TRANSFER_DST_OPTIMAL` for the copy
/// and ends in `final_layout`. Both transitions are validated before anything
/// is recorded.
pub fn copy_buffer_to_image(
    pool: &Arc<CommandPool>,
    queue: Queue,
    buffer: vk::Buffer,
    image: &Image,
    prior_layout: vk::ImageLayout,
    final_layout: vk::ImageLayout,
    cmd: Option<&CommandBuffer>,
) -> Result<()> {
    let transfer = vk::ImageLayout::TRANSFER_DST_OPTIMAL;
    let before = ImageTransition::between(prior_layout, transfer)?;
    let after = ImageTransition::between(transfer, final_layout)?;
    let region = image_region(image);

    record_or_submit(pool, queue, cmd, |cmd| {
        before.record(cmd, image.handle())?;
        unsafe {
            cmd.device().cmd_copy_buffer_to_image(
                cmd.handle(),
                buffer,
                image.handle(),
                transfer,
                &[region],
            );
        }
        after.record(cmd, image.handle())
    })
}

/// Read the whole of `image` back into `buffer`.
///
/// Mirrors [`copy_buffer_to_image`] through `TRANSFER_SRC_OPTIMAL`.
pub fn copy_image_to_buffer(
    pool: &Arc<CommandPool>,
    queue: Queue,
    image: &Image,
    buffer: vk::Buffer,
    prior_layout: vk::ImageLayout,
    final_layout: vk::ImageLayout,
    cmd: Option<&CommandBuffer>,
) -> Result<()> {
    let transfer = vk::ImageLayout::TRANSFER_SRC_OPTIMAL;
    let before = ImageTransition::between(prior_layout, transfer)?;
    let after = ImageTransition::between(transfer, final_layout)?;
    let region = image_region(image);

    record_or_submit(pool, queue, cmd, |cmd| {
        before.record(cmd, image.handle())?;
        unsafe {
            cmd.device().cmd_copy_image_to_buffer(
                cmd.handle(),
                image.handle(),
                transfer,
                buffer,
                &[region],
            );
        }
        after.record(cmd, image.handle())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_transfers_end_visible_to_host() {
        let scope = ONE_SHOT_HAZARD.scope();
        assert!(scope.src_stage.contains(vk::PipelineStageFlags::TRANSFER));
        assert!(scope.src_access.contains(vk::AccessFlags::TRANSFER_WRITE));
        assert_eq!(scope.dst_stage, vk::PipelineStageFlags::HOST);
        assert_eq!(scope.dst_access, vk::AccessFlags::HOST_READ);
    }
}
