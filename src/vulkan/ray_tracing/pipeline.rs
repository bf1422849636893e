use std::ffi::CString;
use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::vulkan::context::Context;
use crate::vulkan::descriptor::DescriptorSetLayout;
use crate::vulkan::device::Device;
use crate::vulkan::utils::read_shader_from_bytes;

/// Upper bound asked from the driver. Clamped to the device limit at
/// pipeline creation.
pub const MAX_RAY_RECURSION_DEPTH: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayTracingShaderGroup {
    RayGen,
    Miss,
    ClosestHit,
}

#[derive(Clone, Copy)]
pub struct RayTracingShaderCreateInfo<'a> {
    pub source: &'a [u8],
    pub stage: vk::ShaderStageFlags,
    pub group: RayTracingShaderGroup,
}

pub struct RayTracingPipeline {
    device: Arc<Device>,
    pub inner: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub shader_group_info: ShaderGroupInfo,
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderGroupInfo {
    pub group_count: u32,
    pub raygen_count: u32,
    pub miss_count: u32,
    pub hit_count: u32,
}

impl RayTracingPipeline {
    pub(crate) fn new(
        context: &Context,
        set_layouts: &[&DescriptorSetLayout],
        shaders: &[RayTracingShaderCreateInfo],
    ) -> Result<Self> {
        let device = context.device.clone();

        let layouts = set_layouts.iter().map(|l| l.inner).collect::<Vec<_>>();
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&layouts);
        let layout = unsafe { device.inner.create_pipeline_layout(&layout_info, None)? };

        let mut shader_group_info = ShaderGroupInfo {
            group_count: shaders.len() as u32,
            raygen_count: 0,
            miss_count: 0,
            hit_count: 0,
        };

        let entry_point_name = CString::new("main")?;

        let mut modules = Vec::with_capacity(shaders.len());
        let mut stages = Vec::with_capacity(shaders.len());
        let mut groups = Vec::with_capacity(shaders.len());

        for (index, shader) in shaders.iter().enumerate() {
            let code = read_shader_from_bytes(shader.source)?;
            let module_info = vk::ShaderModuleCreateInfo::default().code(&code);
            let module = unsafe { device.inner.create_shader_module(&module_info, None)? };
            modules.push(module);

            stages.push(
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader.stage)
                    .module(module)
                    .name(&entry_point_name),
            );

            let mut group = vk::RayTracingShaderGroupCreateInfoKHR::default()
                .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
                .general_shader(vk::SHADER_UNUSED_KHR)
                .closest_hit_shader(vk::SHADER_UNUSED_KHR)
                .any_hit_shader(vk::SHADER_UNUSED_KHR)
                .intersection_shader(vk::SHADER_UNUSED_KHR);
            match shader.group {
                RayTracingShaderGroup::RayGen => {
                    shader_group_info.raygen_count += 1;
                    group = group.general_shader(index as u32);
                }
                RayTracingShaderGroup::Miss => {
                    shader_group_info.miss_count += 1;
                    group = group.general_shader(index as u32);
                }
                RayTracingShaderGroup::ClosestHit => {
                    shader_group_info.hit_count += 1;
                    group = group
                        .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
                        .closest_hit_shader(index as u32);
                }
            };
            groups.push(group);
        }

        let max_recursion = MAX_RAY_RECURSION_DEPTH
            .min(context.ray_tracing.pipeline_properties.max_ray_recursion_depth);

        let pipeline_info = vk::RayTracingPipelineCreateInfoKHR::default()
            .stages(&stages)
            .groups(&groups)
            .max_pipeline_ray_recursion_depth(max_recursion)
            .layout(layout);

        let inner = unsafe {
            context
                .ray_tracing
                .pipeline_fn
                .create_ray_tracing_pipelines(
                    vk::DeferredOperationKHR::null(),
                    vk::PipelineCache::null(),
                    std::slice::from_ref(&pipeline_info),
                    None,
                )
                .map_err(|e| anyhow::anyhow!("Failed to create ray tracing pipeline: {e:?}"))?[0]
        };

        for module in modules {
            unsafe { device.inner.destroy_shader_module(module, None) };
        }

        Ok(Self {
            device,
            inner,
            layout,
            shader_group_info,
        })
    }
}

impl Drop for RayTracingPipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.inner.destroy_pipeline(self.inner, None);
            self.device.inner.destroy_pipeline_layout(self.layout, None);
        }
    }
}

impl Context {
    pub fn create_ray_tracing_pipeline(
        &self,
        set_layouts: &[&DescriptorSetLayout],
        shaders: &[RayTracingShaderCreateInfo],
    ) -> Result<RayTracingPipeline> {
        RayTracingPipeline::new(self, set_layouts, shaders)
    }
}
