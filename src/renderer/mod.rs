mod geometry;
mod geometry_buffer;
mod instance_buffer;
mod scratch;
mod texture_array;

pub use geometry::*;
pub use geometry_buffer::*;
pub use instance_buffer::*;
pub use scratch::*;
pub use texture_array::*;

use anyhow::{ensure, Result};
use ash::vk;
use gpu_allocator::MemoryLocation;
use log::debug;

use crate::camera::{Camera, CameraUniform};
use crate::scene::Scene;
use crate::vulkan::{
    AccelerationStructure, Buffer, CommandBuffer, Context, DescriptorPool, DescriptorSet,
    DescriptorSetLayout, Image, ImageBarrier, ImageView, RayTracingPipeline,
    RayTracingShaderCreateInfo, RayTracingShaderGroup, ShaderBindingTable, Swapchain,
    WriteDescriptorSet, WriteDescriptorSetKind,
};

const ACCUMULATION_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

/// SPIR-V blobs for the three fixed pipeline stages. Compilation happens
/// outside the crate, the demo ships prebuilt binaries.
pub struct RayTracerShaders {
    pub raygen: Vec<u8>,
    pub miss: Vec<u8>,
    pub closest_hit: Vec<u8>,
}

/// Owns the compiled scene and every GPU resource derived from it. Built in
/// one strictly sequential startup chain; any failure aborts the whole
/// startup, there is no partial rollback.
pub struct RayTracer {
    pub camera: Camera,
    camera_buffer: Buffer,

    descriptor_set: DescriptorSet,
    _descriptor_pool: DescriptorPool,
    _descriptor_layout: DescriptorSetLayout,
    sbt: ShaderBindingTable,
    pipeline: RayTracingPipeline,

    _offscreen_view: ImageView,
    offscreen_image: Image,
    _accumulation_view: ImageView,
    accumulation_image: Image,

    _top_structure: AccelerationStructure,
    _top_scratch: ScratchBuffer,
    _instance_buffer: InstanceBuffer,
    _bottom_structures: Vec<AccelerationStructure>,
    _bottom_scratch: ScratchBuffer,

    _geometry_buffer: SceneGeometryBuffer,
    _geometries: Vec<GeometryRecord>,
    _material_textures: TextureArray,
    _skybox: TextureArray,

    extent: vk::Extent2D,
}

impl RayTracer {
    pub fn create(
        context: &Context,
        scene: &Scene,
        shaders: &RayTracerShaders,
        width: u32,
        height: u32,
        output_format: vk::Format,
    ) -> Result<Self> {
        ensure!(scene.geometry_count() > 0, "Scene has no geometry");
        ensure!(scene.instance_count() > 0, "Scene has no instances");

        debug!("Building texture arrays");
        let material_textures = TextureArray::material_array(context, &scene.textures)?;
        let skybox = TextureArray::skybox_array(context, scene.skybox.as_ref())?;

        debug!("Flattening scene geometry");
        let geometry_buffer = SceneGeometryBuffer::create(context, scene)?;

        debug!("Uploading acceleration structure build inputs");
        let geometries = scene
            .meshes
            .iter()
            .map(|mesh| GeometryRecord::create(context, mesh))
            .collect::<Result<Vec<_>>>()?;

        debug!("Creating bottom level acceleration structures");
        let mut bottom_structures = geometries
            .iter()
            .map(|geometry| {
                context.create_bottom_level_acceleration_structure(vec![
                    geometry.triangle_geometry_desc(),
                ])
            })
            .collect::<Vec<_>>();
        let bottom_scratch = ScratchBuffer::create(context, &mut bottom_structures)?;

        debug!("Encoding instance records");
        let handles = bottom_structures
            .iter()
            .map(AccelerationStructure::handle)
            .collect::<Result<Vec<_>>>()?;
        let instance_buffer = InstanceBuffer::create(context, scene, &handles)?;

        debug!("Creating top level acceleration structure");
        let mut top_structure = context.create_top_level_acceleration_structure(
            instance_buffer.buffer.get_device_address(),
            instance_buffer.count,
        );
        let top_scratch =
            ScratchBuffer::create(context, std::slice::from_mut(&mut top_structure))?;

        debug!("Building acceleration structures");
        context.execute_one_time_commands(|cmd_buffer| -> Result<()> {
            for (index, structure) in bottom_structures.iter().enumerate() {
                structure.encode_build(cmd_buffer, bottom_scratch.build_address(index))?;
            }
            // top level consumes the bottom level handles
            cmd_buffer.acceleration_structure_build_barrier();
            top_structure.encode_build(cmd_buffer, top_scratch.build_address(0))?;

            Ok(())
        })??;

        debug!("Creating camera");
        let camera = Camera::new(width, height);
        let camera_buffer = context.create_buffer(
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            std::mem::size_of::<CameraUniform>() as vk::DeviceSize,
        )?;

        debug!("Creating storage images");
        let offscreen_image = context.create_image(
            vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC,
            MemoryLocation::GpuOnly,
            output_format,
            width,
            height,
        )?;
        let offscreen_view = offscreen_image.create_image_view()?;
        let accumulation_image = context.create_image(
            vk::ImageUsageFlags::STORAGE,
            MemoryLocation::GpuOnly,
            ACCUMULATION_FORMAT,
            width,
            height,
        )?;
        let accumulation_view = accumulation_image.create_image_view()?;

        debug!("Creating ray tracing pipeline");
        let descriptor_layout = context.create_descriptor_set_layout(&Self::bindings(
            geometries.len() as u32,
            scene.materials.len() as u32,
        ))?;
        let pipeline = context.create_ray_tracing_pipeline(
            &[&descriptor_layout],
            &[
                RayTracingShaderCreateInfo {
                    source: &shaders.raygen,
                    stage: vk::ShaderStageFlags::RAYGEN_KHR,
                    group: RayTracingShaderGroup::RayGen,
                },
                RayTracingShaderCreateInfo {
                    source: &shaders.miss,
                    stage: vk::ShaderStageFlags::MISS_KHR,
                    group: RayTracingShaderGroup::Miss,
                },
                RayTracingShaderCreateInfo {
                    source: &shaders.closest_hit,
                    stage: vk::ShaderStageFlags::CLOSEST_HIT_KHR,
                    group: RayTracingShaderGroup::ClosestHit,
                },
            ],
        )?;

        debug!("Creating shader binding table");
        let sbt = context.create_shader_binding_table(&pipeline)?;

        debug!("Writing descriptor sets");
        let descriptor_pool = context.create_descriptor_pool(
            1,
            &[
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
                    descriptor_count: 1,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::STORAGE_IMAGE,
                    descriptor_count: 2,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: 1,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::STORAGE_BUFFER,
                    descriptor_count: (2 * geometries.len() + scene.materials.len()) as u32,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: 2,
                },
            ],
        )?;
        let descriptor_set = descriptor_pool.allocate_set(&descriptor_layout)?;
        descriptor_set.update(&[
            WriteDescriptorSet {
                binding: 0,
                kind: WriteDescriptorSetKind::AccelerationStructure {
                    acceleration_structure: top_structure.native()?,
                },
            },
            WriteDescriptorSet {
                binding: 1,
                kind: WriteDescriptorSetKind::StorageImage {
                    view: &offscreen_view,
                    layout: vk::ImageLayout::GENERAL,
                },
            },
            WriteDescriptorSet {
                binding: 2,
                kind: WriteDescriptorSetKind::StorageImage {
                    view: &accumulation_view,
                    layout: vk::ImageLayout::GENERAL,
                },
            },
            WriteDescriptorSet {
                binding: 3,
                kind: WriteDescriptorSetKind::UniformBuffer {
                    buffer: &camera_buffer,
                },
            },
            WriteDescriptorSet {
                binding: 4,
                kind: WriteDescriptorSetKind::StorageBufferArray {
                    buffers: &geometry_buffer.attributes,
                },
            },
            WriteDescriptorSet {
                binding: 5,
                kind: WriteDescriptorSetKind::StorageBufferArray {
                    buffers: &geometry_buffer.faces,
                },
            },
            WriteDescriptorSet {
                binding: 6,
                kind: WriteDescriptorSetKind::StorageBufferArray {
                    buffers: &geometry_buffer.materials,
                },
            },
            WriteDescriptorSet {
                binding: 7,
                kind: WriteDescriptorSetKind::CombinedImageSampler {
                    view: &material_textures.view,
                    sampler: &material_textures.sampler,
                    layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                },
            },
            WriteDescriptorSet {
                binding: 8,
                kind: WriteDescriptorSetKind::CombinedImageSampler {
                    view: &skybox.view,
                    sampler: &skybox.sampler,
                    layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                },
            },
        ]);

        Ok(Self {
            camera,
            camera_buffer,
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            _descriptor_layout: descriptor_layout,
            sbt,
            pipeline,
            _offscreen_view: offscreen_view,
            offscreen_image,
            _accumulation_view: accumulation_view,
            accumulation_image,
            _top_structure: top_structure,
            _top_scratch: top_scratch,
            _instance_buffer: instance_buffer,
            _bottom_structures: bottom_structures,
            _bottom_scratch: bottom_scratch,
            _geometry_buffer: geometry_buffer,
            _geometries: geometries,
            _material_textures: material_textures,
            _skybox: skybox,
            extent: vk::Extent2D { width, height },
        })
    }

    fn bindings(
        geometry_count: u32,
        material_count: u32,
    ) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        vec![
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                .descriptor_count(1)
                .stage_flags(
                    vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::CLOSEST_HIT_KHR,
                ),
            vk::DescriptorSetLayoutBinding::default()
                .binding(1)
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR),
            vk::DescriptorSetLayoutBinding::default()
                .binding(2)
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::RAYGEN_KHR),
            vk::DescriptorSetLayoutBinding::default()
                .binding(3)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1)
                .stage_flags(
                    vk::ShaderStageFlags::RAYGEN_KHR
                        | vk::ShaderStageFlags::CLOSEST_HIT_KHR
                        | vk::ShaderStageFlags::MISS_KHR,
                ),
            vk::DescriptorSetLayoutBinding::default()
                .binding(4)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(geometry_count)
                .stage_flags(vk::ShaderStageFlags::CLOSEST_HIT_KHR),
            vk::DescriptorSetLayoutBinding::default()
                .binding(5)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(geometry_count)
                .stage_flags(vk::ShaderStageFlags::CLOSEST_HIT_KHR),
            vk::DescriptorSetLayoutBinding::default()
                .binding(6)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(material_count)
                .stage_flags(vk::ShaderStageFlags::CLOSEST_HIT_KHR),
            vk::DescriptorSetLayoutBinding::default()
                .binding(7)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::CLOSEST_HIT_KHR),
            vk::DescriptorSetLayoutBinding::default()
                .binding(8)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::MISS_KHR),
        ]
    }

    /// Records the fixed trace and blit sequence into one command buffer per
    /// swapchain image. Recorded once, replayed every frame.
    pub fn record_draw_commands(
        &self,
        command_buffers: &[CommandBuffer],
        swapchain: &Swapchain,
    ) -> Result<()> {
        for (command_buffer, swapchain_image) in command_buffers.iter().zip(&swapchain.images) {
            command_buffer.begin(None)?;

            command_buffer.pipeline_image_barriers(&[
                ImageBarrier {
                    image: &self.accumulation_image,
                    old_layout: vk::ImageLayout::UNDEFINED,
                    new_layout: vk::ImageLayout::GENERAL,
                    src_access_mask: vk::AccessFlags2::NONE,
                    dst_access_mask: vk::AccessFlags2::SHADER_WRITE,
                    src_stage_mask: vk::PipelineStageFlags2::NONE,
                    dst_stage_mask: vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
                },
                ImageBarrier {
                    image: &self.offscreen_image,
                    old_layout: vk::ImageLayout::UNDEFINED,
                    new_layout: vk::ImageLayout::GENERAL,
                    src_access_mask: vk::AccessFlags2::NONE,
                    dst_access_mask: vk::AccessFlags2::SHADER_WRITE,
                    src_stage_mask: vk::PipelineStageFlags2::NONE,
                    dst_stage_mask: vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
                },
            ]);

            command_buffer.bind_rt_pipeline(&self.pipeline);
            command_buffer.bind_descriptor_sets(
                vk::PipelineBindPoint::RAY_TRACING_KHR,
                self.pipeline.layout,
                0,
                &[&self.descriptor_set],
            );
            command_buffer.trace_rays(&self.sbt, self.extent.width, self.extent.height);

            command_buffer.pipeline_image_barriers(&[
                ImageBarrier {
                    image: swapchain_image,
                    old_layout: vk::ImageLayout::UNDEFINED,
                    new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    src_access_mask: vk::AccessFlags2::NONE,
                    dst_access_mask: vk::AccessFlags2::TRANSFER_WRITE,
                    src_stage_mask: vk::PipelineStageFlags2::NONE,
                    dst_stage_mask: vk::PipelineStageFlags2::TRANSFER,
                },
                ImageBarrier {
                    image: &self.offscreen_image,
                    old_layout: vk::ImageLayout::GENERAL,
                    new_layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    src_access_mask: vk::AccessFlags2::SHADER_WRITE,
                    dst_access_mask: vk::AccessFlags2::TRANSFER_READ,
                    src_stage_mask: vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
                    dst_stage_mask: vk::PipelineStageFlags2::TRANSFER,
                },
            ]);

            command_buffer.copy_image(&self.offscreen_image, swapchain_image);

            command_buffer.pipeline_image_barriers(&[ImageBarrier {
                image: swapchain_image,
                old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                src_access_mask: vk::AccessFlags2::TRANSFER_WRITE,
                dst_access_mask: vk::AccessFlags2::NONE,
                src_stage_mask: vk::PipelineStageFlags2::TRANSFER,
                dst_stage_mask: vk::PipelineStageFlags2::NONE,
            }]);

            command_buffer.end()?;
        }

        Ok(())
    }

    /// Per frame state update, advances the camera and its uniform.
    pub fn update(&mut self) -> Result<()> {
        self.camera.update(&self.camera_buffer)
    }

    pub fn total_sample_count(&self) -> u32 {
        self.camera.total_sample_count()
    }
}
