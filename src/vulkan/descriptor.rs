use std::sync::Arc;

use anyhow::Result;
use ash::vk;

use crate::vulkan::buffer::Buffer;
use crate::vulkan::context::Context;
use crate::vulkan::device::Device;
use crate::vulkan::image::ImageView;
use crate::vulkan::sampler::Sampler;

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    pub inner: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub(crate) fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<Self> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let inner = unsafe {
            device
                .inner
                .create_descriptor_set_layout(&layout_info, None)?
        };

        Ok(Self { device, inner })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .inner
                .destroy_descriptor_set_layout(self.inner, None)
        };
    }
}

pub struct DescriptorPool {
    device: Arc<Device>,
    pub inner: vk::DescriptorPool,
}

impl DescriptorPool {
    pub(crate) fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        let inner = unsafe { device.inner.create_descriptor_pool(&pool_info, None)? };

        Ok(Self { device, inner })
    }

    pub fn allocate_set(&self, layout: &DescriptorSetLayout) -> Result<DescriptorSet> {
        let layouts = [layout.inner];
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.inner)
            .set_layouts(&layouts);

        let inner = unsafe { self.device.inner.allocate_descriptor_sets(&allocate_info)? }
            .into_iter()
            .next()
            .unwrap();

        Ok(DescriptorSet {
            device: self.device.clone(),
            inner,
        })
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_descriptor_pool(self.inner, None) };
    }
}

pub struct DescriptorSet {
    device: Arc<Device>,
    pub inner: vk::DescriptorSet,
}

impl DescriptorSet {
    pub fn update(&self, writes: &[WriteDescriptorSet]) {
        for write in writes {
            self.update_one(write);
        }
    }

    pub fn update_one(&self, write: &WriteDescriptorSet) {
        use WriteDescriptorSetKind::*;

        match write.kind {
            StorageImage { view, layout } => {
                let image_info = vk::DescriptorImageInfo::default()
                    .image_view(view.inner)
                    .image_layout(layout);

                let write = vk::WriteDescriptorSet::default()
                    .dst_set(self.inner)
                    .dst_binding(write.binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                    .image_info(std::slice::from_ref(&image_info));

                unsafe { self.device.inner.update_descriptor_sets(&[write], &[]) };
            }
            AccelerationStructure {
                acceleration_structure,
            } => {
                let structures = [acceleration_structure];
                let mut as_info = vk::WriteDescriptorSetAccelerationStructureKHR::default()
                    .acceleration_structures(&structures);

                let mut write = vk::WriteDescriptorSet::default()
                    .dst_set(self.inner)
                    .dst_binding(write.binding)
                    .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                    .push_next(&mut as_info);
                write.descriptor_count = 1;

                unsafe { self.device.inner.update_descriptor_sets(&[write], &[]) };
            }
            UniformBuffer { buffer } => {
                let buffer_info = vk::DescriptorBufferInfo::default()
                    .buffer(buffer.inner)
                    .range(vk::WHOLE_SIZE);

                let write = vk::WriteDescriptorSet::default()
                    .dst_set(self.inner)
                    .dst_binding(write.binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(&buffer_info));

                unsafe { self.device.inner.update_descriptor_sets(&[write], &[]) };
            }
            StorageBufferArray { buffers } => {
                let buffer_infos = buffers
                    .iter()
                    .map(|buffer| {
                        vk::DescriptorBufferInfo::default()
                            .buffer(buffer.inner)
                            .range(vk::WHOLE_SIZE)
                    })
                    .collect::<Vec<_>>();

                let write = vk::WriteDescriptorSet::default()
                    .dst_set(self.inner)
                    .dst_binding(write.binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(&buffer_infos);

                unsafe { self.device.inner.update_descriptor_sets(&[write], &[]) };
            }
            CombinedImageSampler {
                view,
                sampler,
                layout,
            } => {
                let image_info = vk::DescriptorImageInfo::default()
                    .image_view(view.inner)
                    .sampler(sampler.inner)
                    .image_layout(layout);

                let write = vk::WriteDescriptorSet::default()
                    .dst_set(self.inner)
                    .dst_binding(write.binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(&image_info));

                unsafe { self.device.inner.update_descriptor_sets(&[write], &[]) };
            }
        }
    }
}

#[derive(Clone, Copy)]
pub struct WriteDescriptorSet<'a> {
    pub binding: u32,
    pub kind: WriteDescriptorSetKind<'a>,
}

#[derive(Clone, Copy)]
pub enum WriteDescriptorSetKind<'a> {
    StorageImage {
        view: &'a ImageView,
        layout: vk::ImageLayout,
    },
    AccelerationStructure {
        acceleration_structure: vk::AccelerationStructureKHR,
    },
    UniformBuffer {
        buffer: &'a Buffer,
    },
    StorageBufferArray {
        buffers: &'a [Buffer],
    },
    CombinedImageSampler {
        view: &'a ImageView,
        sampler: &'a Sampler,
        layout: vk::ImageLayout,
    },
}

impl Context {
    pub fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<DescriptorSetLayout> {
        DescriptorSetLayout::new(self.device.clone(), bindings)
    }

    pub fn create_descriptor_pool(
        &self,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<DescriptorPool> {
        DescriptorPool::new(self.device.clone(), max_sets, pool_sizes)
    }
}
