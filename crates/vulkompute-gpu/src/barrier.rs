//! Pipeline barriers between transfer and compute work.
//!
//! Every barrier here is recorded on the single compute queue, so no queue
//! family ownership transfer is ever needed.

use crate::command::CommandBuffer;
use crate::error::{GpuError, Result};
use ash::vk;

/// Source and destination scope of a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierScope {
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
}

/// Read-after-write hazards between transfer, compute and host accesses.
///
/// Waiting on a fence or the queue does not make device writes visible to
/// the host by itself; the host variants must be recorded before the
/// submission ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryHazard {
    /// A copy wrote data a compute shader is about to read.
    TransferWriteBeforeComputeRead,
    /// A compute shader wrote data a copy is about to read.
    ComputeWriteBeforeTransferRead,
    /// A copy wrote host-visible memory the host will read after the wait.
    TransferWriteBeforeHostRead,
    /// A compute shader wrote host-visible memory the host will read after the wait.
    ComputeWriteBeforeHostRead,
}

impl MemoryHazard {
    /// Stages and access masks on both sides of the hazard.
    pub fn scope(self) -> BarrierScope {
        match self {
            Self::TransferWriteBeforeComputeRead => BarrierScope {
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
            },
            Self::ComputeWriteBeforeTransferRead => BarrierScope {
                src_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
                src_access: vk::AccessFlags::SHADER_WRITE,
                dst_access: vk::AccessFlags::TRANSFER_READ,
            },
            Self::TransferWriteBeforeHostRead => BarrierScope {
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::HOST,
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::HOST_READ,
            },
            Self::ComputeWriteBeforeHostRead => BarrierScope {
                src_stage: vk::PipelineStageFlags::COMPUTE_SHADER,
                dst_stage: vk::PipelineStageFlags::HOST,
                src_access: vk::AccessFlags::SHADER_WRITE,
                dst_access: vk::AccessFlags::HOST_READ,
            },
        }
    }
}

/// Record a global memory barrier resolving `hazard`.
///
/// `cmd` must be recording.
pub fn record_memory_barrier(cmd: &CommandBuffer, hazard: MemoryHazard) -> Result<()> {
    cmd.ensure_recording()?;
    let scope = hazard.scope();

    let barrier = vk::MemoryBarrier::default()
        .src_access_mask(scope.src_access)
        .dst_access_mask(scope.dst_access);

    unsafe {
        cmd.device().cmd_pipeline_barrier(
            cmd.handle(),
            scope.src_stage,
            scope.dst_stage,
            vk::DependencyFlags::empty(),
            &[barrier],
            &[],
            &[],
        );
    }
    Ok(())
}

/// Access mask a compute shader uses for an image in `layout`, if the layout
/// is one a shader can work with.
fn shader_access(layout: vk::ImageLayout) -> Option<vk::AccessFlags> {
    match layout {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => Some(vk::AccessFlags::SHADER_READ),
        vk::ImageLayout::GENERAL => {
            Some(vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE)
        }
        _ => None,
    }
}

/// A supported image layout transition and its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransition {
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub scope: BarrierScope,
}

impl ImageTransition {
    /// Look up the scope for `old -> new`.
    ///
    /// Only transitions into and out of the transfer layouts are supported.
    pub fn between(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<Self> {
        use vk::AccessFlags as A;
        use vk::ImageLayout as L;
        use vk::PipelineStageFlags as S;

        let scope = |src_access, dst_access, src_stage, dst_stage| BarrierScope {
            src_stage,
            dst_stage,
            src_access,
            dst_access,
        };

        let scope = match (old, new, shader_access(old), shader_access(new)) {
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL, ..) => {
                scope(A::NONE, A::TRANSFER_WRITE, S::TOP_OF_PIPE, S::TRANSFER)
            }
            (L::UNDEFINED, L::TRANSFER_SRC_OPTIMAL, ..) => {
                scope(A::NONE, A::TRANSFER_READ, S::TOP_OF_PIPE, S::TRANSFER)
            }
            (L::TRANSFER_DST_OPTIMAL, _, _, Some(access)) => {
                scope(A::TRANSFER_WRITE, access, S::TRANSFER, S::COMPUTE_SHADER)
            }
            (L::TRANSFER_SRC_OPTIMAL, _, _, Some(access)) => {
                scope(A::TRANSFER_READ, access, S::TRANSFER, S::COMPUTE_SHADER)
            }
            (_, L::TRANSFER_DST_OPTIMAL, Some(access), _) => {
                scope(access, A::TRANSFER_WRITE, S::COMPUTE_SHADER, S::TRANSFER)
            }
            (_, L::TRANSFER_SRC_OPTIMAL, Some(access), _) => {
                scope(access, A::TRANSFER_READ, S::COMPUTE_SHADER, S::TRANSFER)
            }
            _ => {
                return Err(GpuError::UnsupportedLayoutTransition { old, new })
            }
        };

        Ok(Self {
            old_layout: old,
            new_layout: new,
            scope,
        })
    }

    /// Record this transition for the whole color subresource of `image`.
    pub fn record(&self, cmd: &CommandBuffer, image: vk::Image) -> Result<()> {
        cmd.ensure_recording()?;

        let barrier = vk::ImageMemoryBarrier::default()
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_subresource_range())
            .src_access_mask(self.scope.src_access)
            .dst_access_mask(self.scope.dst_access);

        unsafe {
            cmd.device().cmd_pipeline_barrier(
                cmd.handle(),
                self.scope.src_stage,
                self.scope.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        Ok(())
    }
}

/// Single mip, single layer color range.
pub fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    #[test]
    fn transfer_then_compute_scope() {
        let scope = MemoryHazard::TransferWriteBeforeComputeRead.scope();
        assert_eq!(scope.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(scope.dst_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert_eq!(scope.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(scope.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn compute_then_transfer_scope() {
        let scope = MemoryHazard::ComputeWriteBeforeTransferRead.scope();
        assert_eq!(scope.src_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert_eq!(scope.dst_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(scope.src_access, vk::AccessFlags::SHADER_WRITE);
        assert_eq!(scope.dst_access, vk::AccessFlags::TRANSFER_READ);
    }

    #[test]
    fn transfer_then_host_scope() {
        let scope = MemoryHazard::TransferWriteBeforeHostRead.scope();
        assert_eq!(scope.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(scope.dst_stage, vk::PipelineStageFlags::HOST);
        assert_eq!(scope.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(scope.dst_access, vk::AccessFlags::HOST_READ);
    }

    #[test]
    fn compute_then_host_scope() {
        let scope = MemoryHazard::ComputeWriteBeforeHostRead.scope();
        assert_eq!(scope.src_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert_eq!(scope.dst_stage, vk::PipelineStageFlags::HOST);
        assert_eq!(scope.src_access, vk::AccessFlags::SHADER_WRITE);
        assert_eq!(scope.dst_access, vk::AccessFlags::HOST_READ);
    }

    #[test]
    fn hazard_scopes_never_include_fragment_stage() {
        for hazard in [
            MemoryHazard::TransferWriteBeforeComputeRead,
            MemoryHazard::ComputeWriteBeforeTransferRead,
            MemoryHazard::TransferWriteBeforeHostRead,
            MemoryHazard::ComputeWriteBeforeHostRead,
        ] {
            let scope = hazard.scope();
            let stages = scope.src_stage | scope.dst_stage;
            assert!(!stages.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
            assert!(!stages.contains(vk::PipelineStageFlags::ALL_COMMANDS));
        }
    }

    #[test]
    fn undefined_to_transfer_dst() {
        let t = ImageTransition::between(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(t.scope.src_access, vk::AccessFlags::NONE);
        assert_eq!(t.scope.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.scope.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(t.scope.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn undefined_to_transfer_src() {
        let t = ImageTransition::between(L::UNDEFINED, L::TRANSFER_SRC_OPTIMAL).unwrap();
        assert_eq!(t.scope.dst_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(t.scope.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
    }

    #[test]
    fn transfer_dst_to_general_grants_read_write() {
        let t = ImageTransition::between(L::TRANSFER_DST_OPTIMAL, L::GENERAL).unwrap();
        assert_eq!(t.scope.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(
            t.scope.dst_access,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
        );
        assert_eq!(t.scope.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(t.scope.dst_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
    }

    #[test]
    fn transfer_src_to_read_only() {
        let t =
            ImageTransition::between(L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(t.scope.src_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(t.scope.dst_access, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn shader_layout_to_transfer() {
        let t = ImageTransition::between(L::GENERAL, L::TRANSFER_SRC_OPTIMAL).unwrap();
        assert_eq!(
            t.scope.src_access,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
        );
        assert_eq!(t.scope.dst_access, vk::AccessFlags::TRANSFER_READ);
        assert_eq!(t.scope.src_stage, vk::PipelineStageFlags::COMPUTE_SHADER);

        let t =
            ImageTransition::between(L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(t.scope.src_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(t.scope.dst_access, vk::AccessFlags::TRANSFER_WRITE);
    }

    #[test]
    fn unsupported_transitions_are_rejected() {
        for (old, new) in [
            (L::UNDEFINED, L::GENERAL),
            (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL),
            (L::GENERAL, L::SHADER_READ_ONLY_OPTIMAL),
            (L::PRESENT_SRC_KHR, L::TRANSFER_DST_OPTIMAL),
        ] {
            match ImageTransition::between(old, new) {
                Err(GpuError::UnsupportedLayoutTransition {
                    old: reported_old,
                    new: reported_new,
                }) => {
                    assert_eq!(reported_old, old);
                    assert_eq!(reported_new, new);
                }
                other => panic!("{old:?} -> {new:?}: expected rejection, got {other:?}"),
            }
        }
    }

    #[test]
    fn transition_keeps_layouts() {
        let t = ImageTransition::between(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(t.old_layout, L::UNDEFINED);
        assert_eq!(t.new_layout, L::TRANSFER_DST_OPTIMAL);
    }
}
