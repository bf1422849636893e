use anyhow::Result;
use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::vulkan::buffer::Buffer;
use crate::vulkan::context::Context;
use crate::vulkan::ray_tracing::RayTracingPipeline;
use crate::vulkan::utils::compute_aligned_size;

/// Shader group handles laid out in one device local buffer with the regions
/// `vkCmdTraceRaysKHR` consumes.
pub struct ShaderBindingTable {
    _buffer: Buffer,
    pub raygen_region: vk::StridedDeviceAddressRegionKHR,
    pub miss_region: vk::StridedDeviceAddressRegionKHR,
    pub hit_region: vk::StridedDeviceAddressRegionKHR,
}

impl ShaderBindingTable {
    pub(crate) fn new(context: &Context, pipeline: &RayTracingPipeline) -> Result<Self> {
        let group_info = pipeline.shader_group_info;
        let properties = &context.ray_tracing.pipeline_properties;

        let handle_size = properties.shader_group_handle_size;
        let handle_alignment = properties.shader_group_handle_alignment;
        let base_alignment = properties.shader_group_base_alignment;

        let handle_size_aligned = compute_aligned_size(handle_size, handle_alignment);

        let raygen_region_size = compute_aligned_size(
            group_info.raygen_count * handle_size_aligned,
            base_alignment,
        );
        let miss_region_size =
            compute_aligned_size(group_info.miss_count * handle_size_aligned, base_alignment);
        let hit_region_size =
            compute_aligned_size(group_info.hit_count * handle_size_aligned, base_alignment);

        let handles = unsafe {
            context
                .ray_tracing
                .pipeline_fn
                .get_ray_tracing_shader_group_handles(
                    pipeline.inner,
                    0,
                    group_info.group_count,
                    (group_info.group_count * handle_size) as usize,
                )?
        };

        let buffer_size = raygen_region_size + miss_region_size + hit_region_size;
        let mut sbt_data = Vec::<u8>::with_capacity(buffer_size as usize);

        let region_sizes = [
            (group_info.raygen_count, raygen_region_size),
            (group_info.miss_count, miss_region_size),
            (group_info.hit_count, hit_region_size),
        ];

        let mut offset = 0usize;
        for (group_count, region_size) in region_sizes {
            for _ in 0..group_count {
                let handle = &handles[offset..offset + handle_size as usize];
                sbt_data.extend_from_slice(handle);
                sbt_data.extend(std::iter::repeat_n(
                    0u8,
                    (handle_size_aligned - handle_size) as usize,
                ));
                offset += handle_size as usize;
            }
            let padding = region_size - group_count * handle_size_aligned;
            sbt_data.extend(std::iter::repeat_n(0u8, padding as usize));
        }

        let buffer = context.create_buffer(
            vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::CpuToGpu,
            buffer_size as vk::DeviceSize,
        )?;
        buffer.copy_data_to_buffer(&sbt_data)?;

        let address = buffer.get_device_address();

        let raygen_region = vk::StridedDeviceAddressRegionKHR::default()
            .device_address(address)
            .size(raygen_region_size as vk::DeviceSize)
            .stride(raygen_region_size as vk::DeviceSize);
        let miss_region = vk::StridedDeviceAddressRegionKHR::default()
            .device_address(address + raygen_region_size as vk::DeviceSize)
            .size(miss_region_size as vk::DeviceSize)
            .stride(handle_size_aligned as vk::DeviceSize);
        let hit_region = vk::StridedDeviceAddressRegionKHR::default()
            .device_address(address + (raygen_region_size + miss_region_size) as vk::DeviceSize)
            .size(hit_region_size as vk::DeviceSize)
            .stride(handle_size_aligned as vk::DeviceSize);

        Ok(Self {
            _buffer: buffer,
            raygen_region,
            miss_region,
            hit_region,
        })
    }
}

impl Context {
    pub fn create_shader_binding_table(
        &self,
        pipeline: &RayTracingPipeline,
    ) -> Result<ShaderBindingTable> {
        ShaderBindingTable::new(self, pipeline)
    }
}
