//! Vulkan instance and surface creation.

use std::ffi::{CStr, CString};

use ash::vk;
use raw_window_handle::RawDisplayHandle;

use crate::backend::WindowHandles;
use crate::error::GraphicsError;

use super::debug;

/// Required Vulkan API version.
/// On macOS with MoltenVK, only Vulkan 1.2 is supported.
/// On other platforms, we can use 1.3 for native dynamic rendering support.
#[cfg(target_os = "macos")]
const REQUIRED_API_VERSION: u32 = vk::make_api_version(0, 1, 2, 0);

#[cfg(not(target_os = "macos"))]
const REQUIRED_API_VERSION: u32 = vk::make_api_version(0, 1, 3, 0);

const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance plus the optional debug messenger.
pub struct InstanceParts {
    pub instance: ash::Instance,
    pub debug_utils: Option<ash::ext::debug_utils::Instance>,
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

/// Create a Vulkan instance able to present to `display`.
///
/// Validation is silently dropped when the layer is not installed.
pub fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    validation_enabled: bool,
    display: RawDisplayHandle,
) -> Result<InstanceParts, GraphicsError> {
    let validation_available = validation_enabled && check_validation_layer_support(entry);
    if validation_enabled && !validation_available {
        log::warn!("Validation layers requested but not available");
    }

    let app_name = CString::new(app_name)
        .map_err(|_| GraphicsError::InvalidParameter("application name contains NUL".into()))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(c"Ironframe")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(REQUIRED_API_VERSION);

    let mut extensions = ash_window::enumerate_required_extensions(display)
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!(
                "No surface extensions for this display: {:?}",
                e
            ))
        })?
        .to_vec();

    if validation_available {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    #[cfg(target_os = "macos")]
    {
        extensions.push(ash::khr::portability_enumeration::NAME.as_ptr());
    }

    let layer_names: Vec<*const std::ffi::c_char> = if validation_available {
        vec![VALIDATION_LAYER_NAME.as_ptr()]
    } else {
        vec![]
    };

    #[allow(unused_mut)]
    let mut create_flags = vk::InstanceCreateFlags::empty();

    #[cfg(target_os = "macos")]
    {
        create_flags |= vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    }

    let create_info = vk::InstanceCreateInfo::default()
        .flags(create_flags)
        .application_info(&app_info)
        .enabled_extension_names(&extensions)
        .enabled_layer_names(&layer_names);

    let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        GraphicsError::InitializationFailed(format!("Failed to create Vulkan instance: {:?}", e))
    })?;

    let (debug_utils, debug_messenger) = if validation_available {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, &instance);
        match debug::create_debug_messenger(&debug_utils) {
            Ok(messenger) => (Some(debug_utils), Some(messenger)),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        }
    } else {
        (None, None)
    };

    Ok(InstanceParts {
        instance,
        debug_utils,
        debug_messenger,
    })
}

/// Create a presentation surface for `window`.
pub fn create_surface(
    entry: &ash::Entry,
    instance: &ash::Instance,
    window: &dyn WindowHandles,
) -> Result<vk::SurfaceKHR, GraphicsError> {
    let display = window
        .display_handle()
        .map_err(|e| GraphicsError::InitializationFailed(format!("No display handle: {}", e)))?;
    let handle = window
        .window_handle()
        .map_err(|e| GraphicsError::InitializationFailed(format!("No window handle: {}", e)))?;

    unsafe { ash_window::create_surface(entry, instance, display.as_raw(), handle.as_raw(), None) }
        .map_err(|e| {
            GraphicsError::InitializationFailed(format!("Failed to create surface: {:?}", e))
        })
}

fn check_validation_layer_support(entry: &ash::Entry) -> bool {
    let Ok(available_layers) = (unsafe { entry.enumerate_instance_layer_properties() }) else {
        return false;
    };

    available_layers.iter().any(|layer| {
        layer
            .layer_name_as_c_str()
            .is_ok_and(|name| name == VALIDATION_LAYER_NAME)
    })
}
