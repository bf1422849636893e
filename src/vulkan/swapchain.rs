use std::sync::Arc;

use anyhow::Result;
use ash::vk;
use log::debug;

use crate::vulkan::context::Context;
use crate::vulkan::device::Device;
use crate::vulkan::image::Image;
use crate::vulkan::sync::Semaphore;

pub struct AcquiredImage {
    pub index: u32,
    pub is_suboptimal: bool,
}

pub struct Swapchain {
    device: Arc<Device>,
    inner: ash::khr::swapchain::Device,
    swapchain_khr: vk::SwapchainKHR,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub images: Vec<Image>,
}

impl Swapchain {
    pub fn new(context: &Context, width: u32, height: u32) -> Result<Self> {
        let device = context.device.clone();
        let inner = ash::khr::swapchain::Device::new(&context.instance.inner, &device.inner);

        let mut swapchain = Self {
            device,
            inner,
            swapchain_khr: vk::SwapchainKHR::null(),
            extent: vk::Extent2D::default(),
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::default(),
            present_mode: vk::PresentModeKHR::default(),
            images: Vec::new(),
        };
        swapchain.update(context, width, height)?;

        Ok(swapchain)
    }

    pub fn update(&mut self, context: &Context, width: u32, height: u32) -> Result<()> {
        debug!("Updating swapchain to {width}x{height}");

        self.destroy();

        let capabilities = unsafe {
            context
                .surface
                .inner
                .get_physical_device_surface_capabilities(
                    context.physical_device.inner,
                    context.surface.surface_khr,
                )?
        };

        let extent = if capabilities.current_extent.width != u32::MAX {
            capabilities.current_extent
        } else {
            let min = capabilities.min_image_extent;
            let max = capabilities.max_image_extent;
            vk::Extent2D {
                width: width.clamp(min.width, max.width),
                height: height.clamp(min.height, max.height),
            }
        };

        let image_count = {
            let preferred = capabilities.min_image_count + 1;
            if capabilities.max_image_count > 0 {
                preferred.min(capabilities.max_image_count)
            } else {
                preferred
            }
        };

        let format = context.physical_device.surface_format;
        let present_mode = context.physical_device.present_mode;

        let families = [
            context.physical_device.graphics_queue_family.index,
            context.physical_device.present_queue_family.index,
        ];

        let create_info = {
            let mut info = vk::SwapchainCreateInfoKHR::default()
                .surface(context.surface.surface_khr)
                .min_image_count(image_count)
                .image_format(format.format)
                .image_color_space(format.color_space)
                .image_extent(extent)
                .image_array_layers(1)
                .image_usage(
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                )
                .pre_transform(capabilities.current_transform)
                .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                .present_mode(present_mode)
                .clipped(true);

            if families[0] != families[1] {
                info = info
                    .image_sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(&families)
            } else {
                info = info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            }

            info
        };

        let swapchain_khr = unsafe { self.inner.create_swapchain(&create_info, None)? };

        let images = unsafe { self.inner.get_swapchain_images(swapchain_khr)? }
            .into_iter()
            .map(|image| {
                Image::from_swapchain_image(self.device.clone(), image, format.format, extent)
            })
            .collect::<Vec<_>>();

        self.swapchain_khr = swapchain_khr;
        self.extent = extent;
        self.format = format.format;
        self.color_space = format.color_space;
        self.present_mode = present_mode;
        self.images = images;

        Ok(())
    }

    pub fn acquire_next_image(
        &self,
        timeout: u64,
        semaphore: &Semaphore,
    ) -> Result<AcquiredImage> {
        let (index, is_suboptimal) = unsafe {
            self.inner.acquire_next_image(
                self.swapchain_khr,
                timeout,
                semaphore.inner,
                vk::Fence::null(),
            )?
        };

        Ok(AcquiredImage {
            index,
            is_suboptimal,
        })
    }

    pub fn queue_present(
        &self,
        image_index: u32,
        wait_semaphores: &[&Semaphore],
        queue: &crate::vulkan::queue::Queue,
    ) -> Result<bool> {
        let swapchains = [self.swapchain_khr];
        let image_indices = [image_index];
        let wait_semaphores = wait_semaphores.iter().map(|s| s.inner).collect::<Vec<_>>();

        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .image_indices(&image_indices)
            .wait_semaphores(&wait_semaphores);

        let result = unsafe { self.inner.queue_present(queue.inner, &present_info)? };

        Ok(result)
    }

    fn destroy(&mut self) {
        self.images.clear();
        if self.swapchain_khr != vk::SwapchainKHR::null() {
            unsafe { self.inner.destroy_swapchain(self.swapchain_khr, None) };
            self.swapchain_khr = vk::SwapchainKHR::null();
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}
