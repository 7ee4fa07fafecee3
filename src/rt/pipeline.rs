// Ray tracing pipeline and shader binding table
//
// Three stages (raygen, closest hit, miss) loaded from the shader
// directory, one group per stage, recursion depth 1. The group handles
// are fetched after creation and packed into the SBT buffer back to
// back, handle-sized stride.

use crate::backend::{shader, BufferResource, VulkanDevice};
use crate::rt::sbt::{demo_shader_groups, SbtLayout};
use anyhow::{Context, Result};
use ash::vk;
use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

const ENTRY_POINT: &CStr = c"main";

pub struct RayTracingPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub sbt: SbtLayout,
    pub sbt_buffer: BufferResource,
    modules: Vec<vk::ShaderModule>,
    device: Arc<VulkanDevice>,
}

impl RayTracingPipeline {
    pub fn new(
        device: Arc<VulkanDevice>,
        shader_dir: &Path,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Self> {
        // stage order fixes the indices the shader groups refer to
        let stage_files = [
            ("ray-rgen.spv", vk::ShaderStageFlags::RAYGEN_NV),
            ("ray-rchit.spv", vk::ShaderStageFlags::CLOSEST_HIT_NV),
            ("ray-rmiss.spv", vk::ShaderStageFlags::MISS_NV),
        ];

        let mut modules = Vec::with_capacity(stage_files.len());
        let mut stages = Vec::with_capacity(stage_files.len());
        for (file, stage) in stage_files {
            let module = shader::load_shader_module(&device, shader_dir.join(file))?;
            modules.push(module);
            stages.push(
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage)
                    .module(module)
                    .name(ENTRY_POINT)
                    .build(),
            );
        }

        let groups = demo_shader_groups();

        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        let layout = unsafe {
            device
                .device
                .create_pipeline_layout(&layout_info, None)
                .context("Failed to create pipeline layout")?
        };

        let pipeline_info = vk::RayTracingPipelineCreateInfoNV::builder()
            .stages(&stages)
            .groups(&groups)
            .max_recursion_depth(1)
            .layout(layout)
            .build();

        let pipeline = unsafe {
            device
                .ray_tracing
                .create_ray_tracing_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .context("Failed to create ray tracing pipeline")?[0]
        };

        let handle_size = device.ray_tracing_properties.shader_group_handle_size;
        let sbt = SbtLayout::new(handle_size, 1, 1, 1);

        let mut table = vec![0u8; sbt.size() as usize];
        unsafe {
            device
                .ray_tracing
                .get_ray_tracing_shader_group_handles(pipeline, 0, sbt.group_count(), &mut table)
                .context("Failed to fetch shader group handles")?;
        }

        let sbt_buffer = BufferResource::with_data(
            device.clone(),
            "shader binding table",
            sbt_buffer_usage(),
            &table,
        )?;

        log::info!(
            "Ray tracing pipeline ready ({} groups, {} byte handles)",
            sbt.group_count(),
            handle_size
        );

        Ok(Self {
            pipeline,
            layout,
            sbt,
            sbt_buffer,
            modules,
            device,
        })
    }
}

/// The trace call reads the table directly, so the buffer needs ray
/// tracing usage on top of the transfer source bit.
fn sbt_buffer_usage() -> vk::BufferUsageFlags {
    vk::BufferUsageFlags::RAY_TRACING_NV | vk::BufferUsageFlags::TRANSFER_SRC
}

impl Drop for RayTracingPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
            for &module in &self.modules {
                self.device.device.destroy_shader_module(module, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sbt_buffer_is_usable_by_the_trace_call() {
        let usage = sbt_buffer_usage();
        assert!(usage.contains(vk::BufferUsageFlags::RAY_TRACING_NV));
        assert!(usage.contains(vk::BufferUsageFlags::TRANSFER_SRC));
    }
}
