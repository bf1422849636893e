use std::ffi::CStr;

use anyhow::{anyhow, Result};
use ash::{vk, Instance as AshInstance};
use log::{debug, info};

use crate::vulkan::queue::QueueFamily;
use crate::vulkan::surface::Surface;

/// Device extensions every candidate must carry for hardware ray tracing
/// plus presentation.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 4] = [
    ash::khr::swapchain::NAME,
    ash::khr::acceleration_structure::NAME,
    ash::khr::ray_tracing_pipeline::NAME,
    ash::khr::deferred_host_operations::NAME,
];

#[derive(Clone)]
pub struct PhysicalDevice {
    pub inner: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub limits: vk::PhysicalDeviceLimits,
    pub graphics_queue_family: QueueFamily,
    pub present_queue_family: QueueFamily,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
}

impl PhysicalDevice {
    fn new(
        instance: &AshInstance,
        surface: &Surface,
        inner: vk::PhysicalDevice,
    ) -> Result<Option<Self>> {
        let props = unsafe { instance.get_physical_device_properties(inner) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_str()?
            .to_owned();

        if !supports_required_extensions(instance, inner)? {
            debug!("{name}: missing required ray tracing extensions");
            return Ok(None);
        }

        let queue_family_properties =
            unsafe { instance.get_physical_device_queue_family_properties(inner) };

        let mut graphics_queue_family = None;
        let mut present_queue_family = None;
        for (index, family) in queue_family_properties.into_iter().enumerate() {
            let supports_present = unsafe {
                surface.inner.get_physical_device_surface_support(
                    inner,
                    index as u32,
                    surface.surface_khr,
                )?
            };
            let family = QueueFamily::new(index as u32, family, supports_present);

            if graphics_queue_family.is_none() && family.supports_graphics() && family.has_queues()
            {
                graphics_queue_family = Some(family);
            }
            if present_queue_family.is_none() && family.supports_present() && family.has_queues() {
                present_queue_family = Some(family);
            }
        }
        let (Some(graphics_queue_family), Some(present_queue_family)) =
            (graphics_queue_family, present_queue_family)
        else {
            debug!("{name}: missing graphics or present queue family");
            return Ok(None);
        };

        let formats = unsafe {
            surface
                .inner
                .get_physical_device_surface_formats(inner, surface.surface_khr)?
        };
        let Some(surface_format) = formats
            .iter()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_UNORM
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .or_else(|| formats.first())
            .copied()
        else {
            debug!("{name}: no surface format");
            return Ok(None);
        };

        let present_modes = unsafe {
            surface
                .inner
                .get_physical_device_surface_present_modes(inner, surface.surface_khr)?
        };
        let present_mode = present_modes
            .iter()
            .copied()
            .find(|m| *m == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO);

        Ok(Some(Self {
            inner,
            name,
            device_type: props.device_type,
            limits: props.limits,
            graphics_queue_family,
            present_queue_family,
            surface_format,
            present_mode,
        }))
    }

    /// Picks the first suitable device, preferring a discrete GPU when
    /// several qualify.
    pub(crate) fn select_suitable(
        instance: &AshInstance,
        surface: &Surface,
    ) -> Result<Self> {
        let candidates = unsafe { instance.enumerate_physical_devices()? }
            .into_iter()
            .map(|pd| Self::new(instance, surface, pd))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();

        let selected = candidates
            .iter()
            .find(|pd| pd.device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
            .or_else(|| candidates.first())
            .cloned()
            .ok_or_else(|| {
                anyhow!("No device with ray tracing and present support found")
            })?;

        info!("Using device: {} ({:?})", selected.name, selected.device_type);

        Ok(selected)
    }
}

fn supports_required_extensions(
    instance: &AshInstance,
    device: vk::PhysicalDevice,
) -> Result<bool> {
    let available = unsafe { instance.enumerate_device_extension_properties(device)? };
    let supported = REQUIRED_DEVICE_EXTENSIONS.iter().all(|required| {
        available
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == *required)
    });

    Ok(supported)
}
