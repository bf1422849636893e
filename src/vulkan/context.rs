use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::{vk, Entry};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::AllocatorDebugSettings;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::vulkan::command::{CommandBuffer, CommandPool};
use crate::vulkan::device::Device;
use crate::vulkan::instance::Instance;
use crate::vulkan::physical_device::PhysicalDevice;
use crate::vulkan::queue::Queue;
use crate::vulkan::ray_tracing::RayTracingContext;
use crate::vulkan::surface::Surface;

pub struct Context {
    pub allocator: Arc<Mutex<Allocator>>,
    pub command_pool: CommandPool,
    pub ray_tracing: Arc<RayTracingContext>,
    pub graphics_queue: Queue,
    pub present_queue: Queue,
    pub device: Arc<Device>,
    pub physical_device: PhysicalDevice,
    pub surface: Surface,
    pub instance: Instance,
    _entry: Entry,
}

impl Context {
    pub fn new(
        window_handle: &dyn HasWindowHandle,
        display_handle: &dyn HasDisplayHandle,
        app_name: &str,
        enable_validation_layers: bool,
    ) -> Result<Self> {
        let entry = Entry::linked();

        let instance = Instance::new(&entry, display_handle, app_name, enable_validation_layers)?;
        let surface = Surface::new(&entry, &instance, window_handle, display_handle)?;

        let physical_device = PhysicalDevice::select_suitable(&instance.inner, &surface)?;

        let device = Arc::new(Device::new(&instance, &physical_device)?);

        let ray_tracing = Arc::new(RayTracingContext::new(
            &instance.inner,
            &physical_device,
            &device.inner,
        ));
        log::debug!(
            "Ray tracing properties: {:#?}",
            ray_tracing.pipeline_properties
        );

        let graphics_queue = device.get_queue(physical_device.graphics_queue_family.index);
        let present_queue = device.get_queue(physical_device.present_queue_family.index);

        let command_pool = CommandPool::new(
            device.clone(),
            ray_tracing.clone(),
            physical_device.graphics_queue_family,
            Some(vk::CommandPoolCreateFlags::TRANSIENT),
        )?;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.inner.clone(),
            device: device.inner.clone(),
            physical_device: physical_device.inner,
            debug_settings: AllocatorDebugSettings::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })?;

        Ok(Self {
            allocator: Arc::new(Mutex::new(allocator)),
            command_pool,
            ray_tracing,
            graphics_queue,
            present_queue,
            device,
            physical_device,
            surface,
            instance,
            _entry: entry,
        })
    }

    pub fn device_wait_idle(&self) -> Result<()> {
        unsafe { self.device.inner.device_wait_idle()? };

        Ok(())
    }

    /// Records into a transient command buffer, submits it and blocks until
    /// the queue signals completion.
    pub fn execute_one_time_commands<R, F: FnOnce(&CommandBuffer) -> R>(
        &self,
        executor: F,
    ) -> Result<R> {
        let command_buffer = self
            .command_pool
            .allocate_command_buffer(vk::CommandBufferLevel::PRIMARY)?;

        command_buffer.begin(Some(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT))?;
        let executor_result = executor(&command_buffer);
        command_buffer.end()?;

        let fence = self.create_fence(None)?;
        self.graphics_queue
            .submit(&command_buffer, None, None, &fence)?;
        fence.wait(None)?;

        self.command_pool.free_command_buffer(&command_buffer)?;

        Ok(executor_result)
    }
}
