use std::mem::size_of_val;

use anyhow::Result;
use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::vulkan::buffer::Buffer;
use crate::vulkan::context::Context;

pub fn compute_aligned_size(size: u32, alignment: u32) -> u32 {
    (size + (alignment - 1)) & !(alignment - 1)
}

pub fn read_shader_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    let mut cursor = std::io::Cursor::new(bytes);
    Ok(ash::util::read_spv(&mut cursor)?)
}

impl Context {
    /// Uploads `data` into a device local buffer through a transient host
    /// visible staging buffer. The staging buffer is dropped once the copy
    /// submission has completed.
    pub fn create_gpu_only_buffer_from_data<T: Copy>(
        &self,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Buffer> {
        let size = size_of_val(data) as vk::DeviceSize;
        let staging_buffer = self.create_buffer(
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            size,
        )?;
        staging_buffer.copy_data_to_buffer(data)?;

        let buffer = self.create_buffer(
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            size,
        )?;

        self.execute_one_time_commands(|cmd_buffer| {
            cmd_buffer.copy_buffer(&staging_buffer, &buffer);
        })?;

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligned_size_rounds_up_to_power_of_two() {
        assert_eq!(compute_aligned_size(32, 64), 64);
        assert_eq!(compute_aligned_size(64, 64), 64);
        assert_eq!(compute_aligned_size(65, 64), 128);
        assert_eq!(compute_aligned_size(0, 256), 0);
    }
}
