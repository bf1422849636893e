use std::ffi::{c_char, c_void, CStr, CString};

use anyhow::Result;
use ash::{
    ext::debug_utils,
    vk::{self, DebugUtilsMessengerEXT},
    Entry, Instance as AshInstance,
};
use log::info;
use raw_window_handle::HasDisplayHandle;

pub struct Instance {
    pub(crate) inner: AshInstance,
    debug_report_callback: Option<(debug_utils::Instance, DebugUtilsMessengerEXT)>,
    pub(crate) validation_layers: bool,
}

impl Instance {
    pub(crate) fn new(
        entry: &Entry,
        display_handle: &dyn HasDisplayHandle,
        app_name: &str,
        want_validation_layers: bool,
    ) -> Result<Self> {
        info!("Using Vulkan 1.3");

        let app_name = CString::new(app_name)?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(app_name.as_c_str())
            .api_version(vk::make_api_version(0, 1, 3, 0));

        let mut extension_names =
            ash_window::enumerate_required_extensions(display_handle.display_handle()?.as_raw())?
                .to_vec();

        let mut instance_create_info = vk::InstanceCreateInfo::default().application_info(&app_info);

        let mut validation_layers = false;
        let (_layer_names, layer_names_ptrs) = get_validation_layer_names_and_pointers();
        if want_validation_layers && check_validation_layer_support(entry) {
            extension_names.push(debug_utils::NAME.as_ptr());
            instance_create_info = instance_create_info.enabled_layer_names(&layer_names_ptrs);
            validation_layers = true;
        }

        instance_create_info = instance_create_info.enabled_extension_names(&extension_names);

        let inner = unsafe { entry.create_instance(&instance_create_info, None)? };

        let debug_report_callback = if validation_layers {
            Some(setup_debug_messenger(entry, &inner))
        } else {
            None
        };

        Ok(Self {
            inner,
            debug_report_callback,
            validation_layers,
        })
    }
}

const REQUIRED_DEBUG_LAYERS: [&str; 1] = ["VK_LAYER_KHRONOS_validation"];

/// Get the pointers to the validation layers names.
/// Also return the corresponding `CString` to avoid dangling pointers.
pub fn get_validation_layer_names_and_pointers() -> (Vec<CString>, Vec<*const c_char>) {
    let layer_names = REQUIRED_DEBUG_LAYERS
        .iter()
        .map(|name| CString::new(*name).unwrap())
        .collect::<Vec<_>>();
    let layer_names_ptrs = layer_names
        .iter()
        .map(|name| name.as_ptr())
        .collect::<Vec<_>>();
    (layer_names, layer_names_ptrs)
}

/// Check if the required validation set in `REQUIRED_DEBUG_LAYERS`
/// are supported by the Vulkan instance.
pub fn check_validation_layer_support(entry: &Entry) -> bool {
    let mut found = false;
    for required in REQUIRED_DEBUG_LAYERS.iter() {
        found |= unsafe { entry.enumerate_instance_layer_properties() }
            .unwrap_or_default()
            .iter()
            .any(|layer| {
                let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
                let name = name.to_str().expect("Failed to get layer name pointer");
                required == &name
            });
    }

    if !found {
        log::warn!("Validation layer not supported: {:?}", REQUIRED_DEBUG_LAYERS);
    }

    found
}

unsafe extern "system" fn vulkan_debug_callback(
    flag: vk::DebugUtilsMessageSeverityFlagsEXT,
    typ: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    use vk::DebugUtilsMessageSeverityFlagsEXT as Flag;

    let message = CStr::from_ptr((*p_callback_data).p_message);
    match flag {
        Flag::VERBOSE => log::trace!("{:?} - {:?}", typ, message),
        Flag::INFO => {}
        Flag::WARNING => log::warn!("{:?} - {:?}", typ, message),
        _ => log::error!("{:?} - {:?}", typ, message),
    }
    vk::FALSE
}

/// Setup the debug message if validation layers are enabled.
pub fn setup_debug_messenger(
    entry: &Entry,
    instance: &AshInstance,
) -> (debug_utils::Instance, vk::DebugUtilsMessengerEXT) {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
        )
        .pfn_user_callback(Some(vulkan_debug_callback));

    let debug_utils = debug_utils::Instance::new(entry, instance);
    let debug_utils_messenger = unsafe {
        debug_utils
            .create_debug_utils_messenger(&create_info, None)
            .unwrap()
    };

    (debug_utils, debug_utils_messenger)
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((utils, messenger)) = self.debug_report_callback.take() {
                utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.inner.destroy_instance(None);
        }
    }
}
