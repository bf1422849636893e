use std::sync::Arc;

use anyhow::{bail, Result};
use ash::vk;

use crate::vulkan::buffer::Buffer;
use crate::vulkan::command::CommandBuffer;
use crate::vulkan::context::Context;
use crate::vulkan::ray_tracing::RayTracingContext;

/// Sizes reported for an acceleration structure before memory is committed.
///
/// `result_size` covers the structure itself, `build_size` and `update_size`
/// the scratch space a build or refit consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelerationStructureMemoryRequirements {
    pub result_size: vk::DeviceSize,
    pub build_size: vk::DeviceSize,
    pub update_size: vk::DeviceSize,
}

/// One triangle mesh feeding a bottom level structure. Addresses point at
/// device local buffers that stay alive until the build completed.
#[derive(Debug, Clone, Copy)]
pub struct TriangleGeometryDesc {
    pub vertex_address: vk::DeviceAddress,
    pub vertex_stride: vk::DeviceSize,
    pub vertex_count: u32,
    pub index_address: vk::DeviceAddress,
    pub triangle_count: u32,
}

enum AccelerationStructureGeometry {
    Triangles(Vec<TriangleGeometryDesc>),
    Instances {
        buffer_address: vk::DeviceAddress,
        count: u32,
    },
}

/// An acceleration structure that is created unbound. Querying
/// [`Self::memory_requirements`] is valid right away, while [`Self::handle`]
/// only resolves once the structure was bound to backing memory with
/// [`Self::bind`]. The GPU build itself is recorded separately through
/// [`Self::encode_build`].
pub struct AccelerationStructure {
    ray_tracing: Arc<RayTracingContext>,
    ty: vk::AccelerationStructureTypeKHR,
    geometry: AccelerationStructureGeometry,
    inner: Option<vk::AccelerationStructureKHR>,
    device_address: Option<u64>,
}

impl AccelerationStructure {
    fn new(
        ray_tracing: Arc<RayTracingContext>,
        ty: vk::AccelerationStructureTypeKHR,
        geometry: AccelerationStructureGeometry,
    ) -> Self {
        Self {
            ray_tracing,
            ty,
            geometry,
            inner: None,
            device_address: None,
        }
    }

    pub fn new_bottom_level(
        ray_tracing: Arc<RayTracingContext>,
        geometries: Vec<TriangleGeometryDesc>,
    ) -> Self {
        Self::new(
            ray_tracing,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            AccelerationStructureGeometry::Triangles(geometries),
        )
    }

    pub fn new_top_level(
        ray_tracing: Arc<RayTracingContext>,
        instance_buffer_address: vk::DeviceAddress,
        instance_count: u32,
    ) -> Self {
        Self::new(
            ray_tracing,
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            AccelerationStructureGeometry::Instances {
                buffer_address: instance_buffer_address,
                count: instance_count,
            },
        )
    }

    fn vk_geometries(
        &self,
    ) -> (
        Vec<vk::AccelerationStructureGeometryKHR<'static>>,
        Vec<u32>,
    ) {
        match &self.geometry {
            AccelerationStructureGeometry::Triangles(descs) => {
                let geometries = descs
                    .iter()
                    .map(|desc| {
                        let triangles =
                            vk::AccelerationStructureGeometryTrianglesDataKHR::default()
                                .vertex_format(vk::Format::R32G32B32_SFLOAT)
                                .vertex_data(vk::DeviceOrHostAddressConstKHR {
                                    device_address: desc.vertex_address,
                                })
                                .vertex_stride(desc.vertex_stride)
                                .max_vertex(desc.vertex_count.saturating_sub(1))
                                .index_type(vk::IndexType::UINT32)
                                .index_data(vk::DeviceOrHostAddressConstKHR {
                                    device_address: desc.index_address,
                                });

                        vk::AccelerationStructureGeometryKHR::default()
                            .geometry_type(vk::GeometryTypeKHR::TRIANGLES)
                            .flags(vk::GeometryFlagsKHR::OPAQUE)
                            .geometry(vk::AccelerationStructureGeometryDataKHR { triangles })
                    })
                    .collect();
                let primitive_counts = descs.iter().map(|desc| desc.triangle_count).collect();

                (geometries, primitive_counts)
            }
            AccelerationStructureGeometry::Instances {
                buffer_address,
                count,
            } => {
                let instances = vk::AccelerationStructureGeometryInstancesDataKHR::default()
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: *buffer_address,
                    });

                let geometry = vk::AccelerationStructureGeometryKHR::default()
                    .geometry_type(vk::GeometryTypeKHR::INSTANCES)
                    .geometry(vk::AccelerationStructureGeometryDataKHR { instances });

                (vec![geometry], vec![*count])
            }
        }
    }

    /// Valid before any memory was bound. The sizes are stable for a given
    /// geometry layout so callers may sum them over several structures to
    /// carve a shared buffer.
    pub fn memory_requirements(&self) -> AccelerationStructureMemoryRequirements {
        let (geometries, primitive_counts) = self.vk_geometries();

        let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(self.ty)
            .flags(
                vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE
                    | vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE,
            )
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .geometries(&geometries);

        let mut size_info = vk::AccelerationStructureBuildSizesInfoKHR::default();
        unsafe {
            self.ray_tracing
                .acceleration_structure_fn
                .get_acceleration_structure_build_sizes(
                    vk::AccelerationStructureBuildTypeKHR::DEVICE,
                    &build_info,
                    &primitive_counts,
                    &mut size_info,
                )
        };

        AccelerationStructureMemoryRequirements {
            result_size: size_info.acceleration_structure_size,
            build_size: size_info.build_scratch_size,
            update_size: size_info.update_scratch_size,
        }
    }

    /// Commits the structure to a sub range of `buffer`. May be called once;
    /// afterwards [`Self::handle`] resolves.
    pub fn bind(&mut self, buffer: &Buffer, offset: vk::DeviceSize) -> Result<()> {
        if self.inner.is_some() {
            bail!("Acceleration structure is already bound to memory");
        }

        let size = self.memory_requirements().result_size;
        let create_info = vk::AccelerationStructureCreateInfoKHR::default()
            .buffer(buffer.inner)
            .offset(offset)
            .size(size)
            .ty(self.ty);

        let inner = unsafe {
            self.ray_tracing
                .acceleration_structure_fn
                .create_acceleration_structure(&create_info, None)?
        };

        let address_info =
            vk::AccelerationStructureDeviceAddressInfoKHR::default().acceleration_structure(inner);
        let device_address = unsafe {
            self.ray_tracing
                .acceleration_structure_fn
                .get_acceleration_structure_device_address(&address_info)
        };

        self.inner = Some(inner);
        self.device_address = Some(device_address);

        Ok(())
    }

    /// Opaque 64 bit reference other structures and descriptors embed.
    pub fn handle(&self) -> Result<u64> {
        self.device_address
            .ok_or_else(|| anyhow::anyhow!("Acceleration structure is not bound to memory yet"))
    }

    pub fn native(&self) -> Result<vk::AccelerationStructureKHR> {
        self.inner
            .ok_or_else(|| anyhow::anyhow!("Acceleration structure is not bound to memory yet"))
    }

    /// Records the GPU build. Input buffers, the bound range and the scratch
    /// range must stay untouched until the submission completed.
    pub fn encode_build(
        &self,
        command_buffer: &CommandBuffer,
        scratch_address: vk::DeviceAddress,
    ) -> Result<()> {
        let inner = self.native()?;
        let (geometries, primitive_counts) = self.vk_geometries();

        let geometry_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
            .ty(self.ty)
            .flags(
                vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE
                    | vk::BuildAccelerationStructureFlagsKHR::ALLOW_UPDATE,
            )
            .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
            .dst_acceleration_structure(inner)
            .geometries(&geometries)
            .scratch_data(vk::DeviceOrHostAddressKHR {
                device_address: scratch_address,
            });

        let build_range_infos = primitive_counts
            .iter()
            .map(|count| {
                vk::AccelerationStructureBuildRangeInfoKHR::default().primitive_count(*count)
            })
            .collect::<Vec<_>>();

        command_buffer.build_acceleration_structure(&geometry_info, &build_range_infos);

        Ok(())
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            unsafe {
                self.ray_tracing
                    .acceleration_structure_fn
                    .destroy_acceleration_structure(inner, None)
            };
        }
    }
}

impl Context {
    pub fn create_bottom_level_acceleration_structure(
        &self,
        geometries: Vec<TriangleGeometryDesc>,
    ) -> AccelerationStructure {
        AccelerationStructure::new_bottom_level(self.ray_tracing.clone(), geometries)
    }

    pub fn create_top_level_acceleration_structure(
        &self,
        instance_buffer_address: vk::DeviceAddress,
        instance_count: u32,
    ) -> AccelerationStructure {
        AccelerationStructure::new_top_level(
            self.ray_tracing.clone(),
            instance_buffer_address,
            instance_count,
        )
    }
}
