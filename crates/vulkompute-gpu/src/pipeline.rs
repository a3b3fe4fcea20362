//! Compute pipeline creation.

use crate::command::CommandBuffer;
use crate::descriptors::DescriptorSetLayout;
use crate::device::Device;
use crate::error::{GpuError, Result};
use crate::shader::ShaderModule;
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

/// Compute pipeline wrapper.
pub struct ComputePipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    device: Arc<Device>,
}

impl ComputePipeline {
    /// Create a compute pipeline running `entry_point` of `shader`.
    ///
    /// The module may be dropped once this returns.
    pub fn new(
        device: Arc<Device>,
        shader: &ShaderModule,
        entry_point: &CStr,
        set_layouts: &[&DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let raw = device.raw();
        let set_layouts: Vec<vk::DescriptorSetLayout> =
            set_layouts.iter().map(|l| l.handle()).collect();

        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { raw.create_pipeline_layout(&layout_info, None)? };

        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader.handle())
            .name(entry_point);

        let pipeline_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_info)
            .layout(layout);

        let created = unsafe {
            raw.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        let pipeline = match created {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, e)) => {
                unsafe { raw.destroy_pipeline_layout(layout, None) };
                return Err(GpuError::Vulkan(e));
            }
        };
        let Some(pipeline) = pipeline else {
            unsafe { raw.destroy_pipeline_layout(layout, None) };
            return Err(GpuError::InvalidState(
                "Driver returned no compute pipeline".to_string(),
            ));
        };

        Ok(Self {
            pipeline,
            layout,
            device,
        })
    }

    /// Get the raw pipeline handle.
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get the pipeline layout.
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Bind the pipeline and its descriptor sets into a recording buffer.
    pub fn bind(&self, cmd: &CommandBuffer, descriptor_sets: &[vk::DescriptorSet]) -> Result<()> {
        cmd.ensure_recording()?;
        unsafe {
            let raw = cmd.device();
            raw.cmd_bind_pipeline(cmd.handle(), vk::PipelineBindPoint::COMPUTE, self.pipeline);
            if !descriptor_sets.is_empty() {
                raw.cmd_bind_descriptor_sets(
                    cmd.handle(),
                    vk::PipelineBindPoint::COMPUTE,
                    self.layout,
                    0,
                    descriptor_sets,
                    &[],
                );
            }
        }
        Ok(())
    }

    /// Record a dispatch of the bound pipeline.
    pub fn dispatch(&self, cmd: &CommandBuffer, x: u32, y: u32, z: u32) -> Result<()> {
        cmd.ensure_recording()?;
        unsafe { cmd.device().cmd_dispatch(cmd.handle(), x, y, z) };
        Ok(())
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe {
            let raw = self.device.raw();
            raw.destroy_pipeline(self.pipeline, None);
            raw.destroy_pipeline_layout(self.layout, None);
        }
    }
}
