use std::sync::Arc;

use anyhow::Result;
use ash::{vk, Device as AshDevice};
use itertools::Itertools;

use crate::vulkan::instance::Instance;
use crate::vulkan::physical_device::{PhysicalDevice, REQUIRED_DEVICE_EXTENSIONS};
use crate::vulkan::queue::Queue;

pub struct Device {
    pub inner: AshDevice,
}

impl Device {
    pub(crate) fn new(instance: &Instance, physical_device: &PhysicalDevice) -> Result<Self> {
        let queue_priorities = [1.0f32];

        let queue_create_infos = [
            physical_device.graphics_queue_family.index,
            physical_device.present_queue_family.index,
        ]
        .into_iter()
        .unique()
        .map(|index| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(index)
                .queue_priorities(&queue_priorities)
        })
        .collect::<Vec<_>>();

        let device_extensions_ptrs = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<_>>();

        let mut vulkan_12_features = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(true)
            .runtime_descriptor_array(true)
            .shader_sampled_image_array_non_uniform_indexing(true);

        let mut vulkan_13_features = vk::PhysicalDeviceVulkan13Features::default()
            .synchronization2(true)
            .dynamic_rendering(true);

        let mut acceleration_structure_features =
            vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
                .acceleration_structure(true);

        let mut ray_tracing_pipeline_features =
            vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default().ray_tracing_pipeline(true);

        let mut features = vk::PhysicalDeviceFeatures2::default()
            .features(vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true))
            .push_next(&mut vulkan_12_features)
            .push_next(&mut vulkan_13_features)
            .push_next(&mut acceleration_structure_features)
            .push_next(&mut ray_tracing_pipeline_features);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_extensions_ptrs)
            .push_next(&mut features);

        let inner = unsafe {
            instance
                .inner
                .create_device(physical_device.inner, &device_create_info, None)?
        };

        Ok(Self { inner })
    }

    pub(crate) fn get_queue(self: &Arc<Self>, queue_family_index: u32) -> Queue {
        let inner = unsafe { self.inner.get_device_queue(queue_family_index, 0) };
        Queue::new(self.clone(), inner)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            self.inner.destroy_device(None);
        }
    }
}
