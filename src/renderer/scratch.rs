use anyhow::Result;
use ash::vk;
use gpu_allocator::MemoryLocation;

use crate::vulkan::{AccelerationStructure, AccelerationStructureMemoryRequirements, Buffer, Context};

/// Pure offset arithmetic for packing several acceleration structures into
/// one shared result buffer and one shared scratch buffer. Offsets are the
/// running sums of the reported sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchLayout {
    pub result_offsets: Vec<vk::DeviceSize>,
    pub build_offsets: Vec<vk::DeviceSize>,
    pub result_size: vk::DeviceSize,
    pub build_size: vk::DeviceSize,
}

impl ScratchLayout {
    pub fn new(requirements: &[AccelerationStructureMemoryRequirements]) -> Self {
        let mut result_offsets = Vec::with_capacity(requirements.len());
        let mut build_offsets = Vec::with_capacity(requirements.len());
        let mut result_size = 0;
        let mut build_size = 0;

        for requirement in requirements {
            result_offsets.push(result_size);
            build_offsets.push(build_size);
            result_size += requirement.result_size;
            build_size += requirement.build_size;
        }

        Self {
            result_offsets,
            build_offsets,
            result_size,
            build_size,
        }
    }
}

/// The two shared device local buffers behind a batch of acceleration
/// structures. The structures stay bound into the result buffer, so this
/// has to outlive them.
pub struct ScratchBuffer {
    pub layout: ScratchLayout,
    pub result_buffer: Buffer,
    scratch_buffer: Buffer,
    scratch_address: vk::DeviceAddress,
}

impl ScratchBuffer {
    /// Sizes the buffers from the driver reported requirements and binds
    /// every structure at its result offset.
    pub fn create(
        context: &Context,
        structures: &mut [AccelerationStructure],
    ) -> Result<Self> {
        let requirements = structures
            .iter()
            .map(AccelerationStructure::memory_requirements)
            .collect::<Vec<_>>();
        let layout = ScratchLayout::new(&requirements);

        log::trace!(
            "Acceleration structure batch: {} structures, {} result bytes, {} scratch bytes",
            structures.len(),
            layout.result_size,
            layout.build_size,
        );

        let result_buffer = context.create_buffer(
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            layout.result_size,
        )?;
        let scratch_buffer = context.create_buffer(
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            MemoryLocation::GpuOnly,
            layout.build_size,
        )?;
        let scratch_address = scratch_buffer.get_device_address();

        for (structure, &offset) in structures.iter_mut().zip(&layout.result_offsets) {
            structure.bind(&result_buffer, offset)?;
        }

        Ok(Self {
            layout,
            result_buffer,
            scratch_buffer,
            scratch_address,
        })
    }

    /// Scratch address for the build of structure `index` in the batch.
    pub fn build_address(&self, index: usize) -> vk::DeviceAddress {
        self.scratch_address + self.layout.build_offsets[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_sums_three_structures() {
        let layout = ScratchLayout::new(&[
            AccelerationStructureMemoryRequirements {
                result_size: 100,
                build_size: 50,
                update_size: 0,
            },
            AccelerationStructureMemoryRequirements {
                result_size: 200,
                build_size: 80,
                update_size: 0,
            },
            AccelerationStructureMemoryRequirements {
                result_size: 150,
                build_size: 70,
                update_size: 0,
            },
        ]);

        assert_eq!(layout.result_size, 450);
        assert_eq!(layout.build_size, 200);
        assert_eq!(layout.result_offsets, vec![0, 100, 300]);
        assert_eq!(layout.build_offsets, vec![0, 50, 130]);
    }

    #[test]
    fn empty_batch_is_zero_sized() {
        let layout = ScratchLayout::new(&[]);

        assert_eq!(layout.result_size, 0);
        assert_eq!(layout.build_size, 0);
        assert!(layout.result_offsets.is_empty());
    }
}
