use std::ffi::{c_char, c_void, CStr, CString};
use ash::vk;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::surface::RenderSurface;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Owns the Vulkan loader and instance
pub struct RenderInstance {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    validation: bool,
}

impl RenderInstance {
    pub fn new(
        window: &Window,
        config: &RenderConfig,
    ) -> Result<Self> {
        let entry = ash::Entry::linked();
        let validation = cfg!(debug_assertions);

        let mut layers = Vec::new();
        if validation {
            let available = unsafe { entry.enumerate_instance_layer_properties()? };
            let available = available
                .iter()
                .filter_map(|props| props.layer_name_as_c_str().ok())
                .collect::<Vec<_>>();
            let missing = missing_layers(&[VALIDATION_LAYER], &available);
            if !missing.is_empty() {
                return Err(eyre!("Requested layers are not available: {:?}", missing));
            }
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let extensions = instance_extensions(window, validation)?;
        let extension_ptrs = extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        let application_name = CString::new(config.application_name.as_str())?;
        let engine_name = CString::new(config.engine_name.as_str())?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        // Also reports problems in vkCreateInstance and vkDestroyInstance themselves
        let mut messenger_info = messenger_create_info();
        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extension_ptrs);
        if validation {
            create_info = create_info.push_next(&mut messenger_info);
        }
        #[cfg(target_os = "macos")]
        let create_info = create_info.flags(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .wrap_err("Failed to create Vulkan instance")?
        };
        log::info!(
            "Created Vulkan 1.3 instance for {:?} (validation {})",
            config.application_name,
            if validation { "on" } else { "off" },
        );

        Ok(Self {
            entry,
            instance,
            validation,
        })
    }

    /// Routes validation messages into `log`. Returns `None` in release builds.
    pub fn create_debug_messenger(&self) -> Result<Option<DebugMessenger>> {
        if !self.validation {
            return Ok(None);
        }
        let loader = ash::ext::debug_utils::Instance::new(&self.entry, &self.instance);
        let messenger = unsafe {
            loader.create_debug_utils_messenger(&messenger_create_info(), None)?
        };
        Ok(Some(DebugMessenger { messenger, loader }))
    }

    pub fn create_surface(&self, window: &Window) -> Result<RenderSurface> {
        let surface = unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )?
        };
        let surface_loader = ash::khr::surface::Instance::new(&self.entry, &self.instance);
        Ok(RenderSurface::new(surface, surface_loader))
    }
}

impl Drop for RenderInstance {
    fn drop(&mut self) {
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

pub struct DebugMessenger {
    messenger: vk::DebugUtilsMessengerEXT,
    loader: ash::ext::debug_utils::Instance,
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

fn instance_extensions(window: &Window, validation: bool) -> Result<Vec<&'static CStr>> {
    let surface_exts = ash_window::enumerate_required_extensions(window.display_handle()?.as_raw())?;
    // ash-window hands out pointers to static extension name constants
    let mut exts = surface_exts
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(*ext) })
        .collect::<Vec<_>>();

    if validation {
        exts.push(ash::ext::debug_utils::NAME);
    }
    #[cfg(target_os = "macos")]
    {
        exts.push(ash::khr::portability_enumeration::NAME);
        exts.push(ash::khr::get_physical_device_properties2::NAME);
    }
    Ok(exts)
}

fn missing_layers<'a>(required: &[&'a CStr], available: &[&CStr]) -> Vec<&'a CStr> {
    required
        .iter()
        .filter(|layer| !available.contains(layer))
        .copied()
        .collect()
}

fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback))
}

fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        log::Level::Info
    } else {
        log::Level::Trace
    }
}

unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() {
        return vk::FALSE;
    }
    let message = unsafe {
        let data = &*callback_data;
        if data.p_message.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr(data.p_message).to_string_lossy()
    };
    log::log!(target: "vulkan", severity_level(severity), "{:?} {}", message_type, message);

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_map_onto_log_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Severity;
        assert_eq!(severity_level(Severity::VERBOSE), log::Level::Trace);
        assert_eq!(severity_level(Severity::INFO), log::Level::Info);
        assert_eq!(severity_level(Severity::WARNING), log::Level::Warn);
        assert_eq!(severity_level(Severity::ERROR), log::Level::Error);
    }

    #[test]
    fn reports_layers_the_loader_lacks() {
        let other = c"VK_LAYER_LUNARG_monitor";
        assert_eq!(missing_layers(&[VALIDATION_LAYER], &[other]), vec![VALIDATION_LAYER]);
        assert!(missing_layers(&[VALIDATION_LAYER], &[other, VALIDATION_LAYER]).is_empty());
    }
}
