use anyhow::Result;
use ash::vk;

use crate::scene::Mesh;
use crate::vulkan::{Buffer, Context, TriangleGeometryDesc};

/// Device local copy of one mesh's build inputs. The position and index
/// buffers stay alive for the lifetime of the scene because the bottom level
/// structure references them by address.
pub struct GeometryRecord {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    pub vertex_count: u32,
    pub triangle_count: u32,
}

impl GeometryRecord {
    pub fn create(context: &Context, mesh: &Mesh) -> Result<Self> {
        let usage = vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;

        let vertex_buffer = context.create_gpu_only_buffer_from_data(usage, &mesh.positions)?;
        let index_buffer = context.create_gpu_only_buffer_from_data(usage, &mesh.indices)?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: mesh.vertex_count() as u32,
            triangle_count: mesh.triangle_count() as u32,
        })
    }

    /// Build input description for the bottom level structure. Positions are
    /// tightly packed vec3 floats.
    pub fn triangle_geometry_desc(&self) -> TriangleGeometryDesc {
        TriangleGeometryDesc {
            vertex_address: self.vertex_buffer.get_device_address(),
            vertex_stride: 12,
            vertex_count: self.vertex_count,
            index_address: self.index_buffer.get_device_address(),
            triangle_count: self.triangle_count,
        }
    }
}
