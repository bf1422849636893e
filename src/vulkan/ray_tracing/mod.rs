mod acceleration_structure;
mod pipeline;
mod shader_binding_table;

pub use acceleration_structure::*;
pub use pipeline::*;
pub use shader_binding_table::*;

use ash::{vk, Device as AshDevice, Instance as AshInstance};

use crate::vulkan::physical_device::PhysicalDevice;

pub struct RayTracingContext {
    pub pipeline_properties: vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'static>,
    pub pipeline_fn: ash::khr::ray_tracing_pipeline::Device,
    pub acceleration_structure_properties:
        vk::PhysicalDeviceAccelerationStructurePropertiesKHR<'static>,
    pub acceleration_structure_fn: ash::khr::acceleration_structure::Device,
}

impl RayTracingContext {
    pub(crate) fn new(
        instance: &AshInstance,
        physical_device: &PhysicalDevice,
        device: &AshDevice,
    ) -> Self {
        let mut pipeline_properties = vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
        let mut acceleration_structure_properties =
            vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();

        {
            let mut properties2 = vk::PhysicalDeviceProperties2::default()
                .push_next(&mut pipeline_properties)
                .push_next(&mut acceleration_structure_properties);
            unsafe {
                instance.get_physical_device_properties2(physical_device.inner, &mut properties2)
            };
        }

        let pipeline_fn = ash::khr::ray_tracing_pipeline::Device::new(instance, device);
        let acceleration_structure_fn =
            ash::khr::acceleration_structure::Device::new(instance, device);

        Self {
            pipeline_properties,
            pipeline_fn,
            acceleration_structure_properties,
            acceleration_structure_fn,
        }
    }
}
