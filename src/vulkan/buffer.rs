use std::{
    mem::{align_of, size_of_val},
    sync::{Arc, Mutex},
};

use anyhow::{ensure, Result};
use ash::vk;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};

use crate::vulkan::context::Context;
use crate::vulkan::device::Device;

pub struct Buffer {
    device: Arc<Device>,
    allocator: Arc<Mutex<Allocator>>,
    pub inner: vk::Buffer,
    allocation: Option<Allocation>,
    pub size: vk::DeviceSize,
}

impl Buffer {
    pub(crate) fn new(
        device: Arc<Device>,
        allocator: Arc<Mutex<Allocator>>,
        usage: vk::BufferUsageFlags,
        memory_location: MemoryLocation,
        size: vk::DeviceSize,
    ) -> Result<Self> {
        let create_info = vk::BufferCreateInfo::default().size(size).usage(usage);
        let inner = unsafe { device.inner.create_buffer(&create_info, None)? };
        let requirements = unsafe { device.inner.get_buffer_memory_requirements(inner) };

        let allocation = allocator.lock().unwrap().allocate(&AllocationCreateDesc {
            name: "buffer",
            requirements,
            location: memory_location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .inner
                .bind_buffer_memory(inner, allocation.memory(), allocation.offset())?
        };

        Ok(Self {
            device,
            allocator,
            inner,
            allocation: Some(allocation),
            size,
        })
    }

    pub fn copy_data_to_buffer<T: Copy>(&self, data: &[T]) -> Result<()> {
        ensure_copy_fits(self.size, size_of_val(data))?;

        unsafe {
            let data_ptr = self
                .allocation
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("Buffer was already freed"))?
                .mapped_ptr()
                .ok_or_else(|| anyhow::anyhow!("Buffer memory is not host visible"))?
                .as_ptr();

            let mut align =
                ash::util::Align::new(data_ptr, align_of::<T>() as _, size_of_val(data) as _);
            align.copy_from_slice(data);
        };

        Ok(())
    }

    pub fn get_device_address(&self) -> u64 {
        let addr_info = vk::BufferDeviceAddressInfo::default().buffer(self.inner);
        unsafe { self.device.inner.get_buffer_device_address(&addr_info) }
    }
}

/// The mapped region is only `buffer_size` bytes long, `ash::util::Align`
/// sizes its copy loop from the data slice alone.
fn ensure_copy_fits(buffer_size: vk::DeviceSize, copy_size: usize) -> Result<()> {
    ensure!(
        copy_size as vk::DeviceSize <= buffer_size,
        "Copy of {copy_size} bytes does not fit into a {buffer_size} byte buffer"
    );

    Ok(())
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_buffer(self.inner, None) };
        if let Some(allocation) = self.allocation.take() {
            let _ = self.allocator.lock().unwrap().free(allocation);
        }
    }
}

impl Context {
    pub fn create_buffer(
        &self,
        usage: vk::BufferUsageFlags,
        memory_location: MemoryLocation,
        size: vk::DeviceSize,
    ) -> Result<Buffer> {
        Buffer::new(
            self.device.clone(),
            self.allocator.clone(),
            usage,
            memory_location,
            size,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies_larger_than_the_buffer_are_rejected() {
        assert!(ensure_copy_fits(16, 16).is_ok());
        assert!(ensure_copy_fits(16, 17).is_err());
        assert!(ensure_copy_fits(0, 0).is_ok());
    }
}
