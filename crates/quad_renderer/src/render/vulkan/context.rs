//! Vulkan context management
//!
//! Instance creation with validation, physical device selection and the
//! logical device with its graphics queue.

use std::ffi::{c_char, CStr, CString};
use std::io::{BufRead, Write};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Entry, Instance};
use thiserror::Error;

use crate::config::AppConfig;
use crate::render::vulkan::window::{Window, WindowError};

/// Layers requested when validation is enabled
///
/// Each entry is optional; only the ones the loader reports are enabled.
pub const VALIDATION_LAYERS: &[&str] = &["VK_LAYER_KHRONOS_validation", "VK_LAYER_NV_optimus"];

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// The device lacks extensions the renderer cannot run without
    #[error("Missing required device extensions: {0:?}")]
    MissingExtensions(Vec<String>),

    /// The surface cannot be used the way the swapchain needs
    #[error("Surface does not support image usage {missing:?}")]
    UnsupportedImageUsage {
        /// Required bits the surface does not report
        missing: vk::ImageUsageFlags,
    },

    /// No barrier recipe exists for this pair of layouts
    #[error("Unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        /// Layout the image is in
        old: vk::ImageLayout,
        /// Layout that was requested
        new: vk::ImageLayout,
    },

    /// A SPIR-V file could not be read or is malformed
    #[error("Failed to load shader {path}: {reason}")]
    ShaderLoad {
        /// File that was attempted
        path: String,
        /// What went wrong
        reason: String,
    },

    /// Windowing failure
    #[error(transparent)]
    Window(#[from] WindowError),

    /// Console interaction failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Convert a fixed-size name array from a Vulkan properties struct
fn name_from_raw(raw: &[c_char]) -> String {
    // SAFETY: Vulkan guarantees these arrays are nul-terminated
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Entries of `wishlist` that appear in `available`, in wishlist order
pub fn intersect_wishlist(available: &[String], wishlist: &[&str]) -> Vec<String> {
    wishlist
        .iter()
        .filter(|wanted| available.iter().any(|name| name == *wanted))
        .map(|wanted| (*wanted).to_string())
        .collect()
}

/// Entries of `required` that do not appear in `available`
pub fn missing_extensions(available: &[String], required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|wanted| !available.iter().any(|name| name == *wanted))
        .map(|wanted| (*wanted).to_string())
        .collect()
}

fn to_cstrings(names: &[String]) -> VulkanResult<Vec<CString>> {
    names
        .iter()
        .map(|name| {
            CString::new(name.as_str()).map_err(|_| {
                VulkanError::InitializationFailed(format!("Name contains a nul byte: {name}"))
            })
        })
        .collect()
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create the instance with the window-system extensions and, when
    /// requested and available, validation plus a debug messenger.
    pub fn new(window: &Window, config: &AppConfig) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name = CString::new(config.app_name.as_str())
            .map_err(|_| VulkanError::InitializationFailed("Invalid application name".into()))?;
        let engine_name = CString::new(config.engine_name.as_str())
            .map_err(|_| VulkanError::InitializationFailed("Invalid engine name".into()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let available_layers: Vec<String> = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::Api)?
            .iter()
            .map(|layer| name_from_raw(&layer.layer_name))
            .collect();
        log::debug!("Available instance layers: {:?}", available_layers);

        let layers = if config.validation {
            let found = intersect_wishlist(&available_layers, VALIDATION_LAYERS);
            for missing in missing_extensions(&available_layers, VALIDATION_LAYERS) {
                log::warn!("Requested layer {} is not available", missing);
            }
            found
        } else {
            Vec::new()
        };

        let available_extensions: Vec<String> = entry
            .enumerate_instance_extension_properties(None)
            .map_err(VulkanError::Api)?
            .iter()
            .map(|ext| name_from_raw(&ext.extension_name))
            .collect();

        let mut extensions = window.required_instance_extensions()?;
        let debug_name = DebugUtils::name().to_string_lossy().into_owned();
        let enable_debug = config.validation && available_extensions.contains(&debug_name);
        if enable_debug {
            extensions.push(debug_name);
        } else if config.validation {
            log::warn!("{} not available, validation messages will not be logged", debug_name);
        }

        let missing = missing_extensions(
            &available_extensions,
            &extensions.iter().map(String::as_str).collect::<Vec<_>>(),
        );
        if !missing.is_empty() {
            return Err(VulkanError::InitializationFailed(format!(
                "Missing instance extensions: {missing:?}"
            )));
        }

        log::info!("Instance layers: {:?}", layers);
        log::info!("Instance extensions: {:?}", extensions);

        let layer_names = to_cstrings(&layers)?;
        let layer_ptrs: Vec<*const c_char> = layer_names.iter().map(|n| n.as_ptr()).collect();
        let extension_names = to_cstrings(&extensions)?;
        let extension_ptrs: Vec<*const c_char> =
            extension_names.iter().map(|n| n.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let debug_utils = if enable_debug {
            let loader = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&loader) {
                Ok(messenger) => Some((loader, messenger)),
                Err(err) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
        })
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Raw instance handle
    pub fn handle(&self) -> vk::Instance {
        self.instance.handle()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = &self.debug_utils {
                loader.destroy_debug_utils_messenger(*messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// First queue family that has at least one queue and supports graphics
pub fn find_graphics_queue_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|family| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|index| index as u32)
}

/// Ask on `output` for a device index until `input` yields a valid one
///
/// Non-numeric and out-of-range answers re-prompt. End of input is an error.
pub fn prompt_device_index<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
    device_names: &[String],
) -> VulkanResult<usize> {
    if device_names.is_empty() {
        return Err(VulkanError::InitializationFailed("No GPUs to choose from".into()));
    }

    loop {
        for (index, name) in device_names.iter().enumerate() {
            writeln!(output, "  {index}: {name}")?;
        }
        write!(output, "Select a GPU [0-{}]: ", device_names.len() - 1)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(VulkanError::InitializationFailed(
                "Input closed before a GPU was selected".into(),
            ));
        }

        match line.trim().parse::<usize>() {
            Ok(index) if index < device_names.len() => return Ok(index),
            _ => writeln!(output, "Invalid GPU index '{}'", line.trim())?,
        }
    }
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Human readable device name
    pub name: String,
}

impl PhysicalDeviceInfo {
    /// Pick the GPU to render with
    ///
    /// Uses `config.gpu_index` when set, the only device when there is one,
    /// and otherwise asks on the console.
    pub fn select(instance: &Instance, config: &AppConfig) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };

        if devices.is_empty() {
            return Err(VulkanError::InitializationFailed(
                "No Vulkan capable GPU found".to_string(),
            ));
        }

        let names: Vec<String> = devices
            .iter()
            .map(|&device| {
                let properties = unsafe { instance.get_physical_device_properties(device) };
                name_from_raw(&properties.device_name)
            })
            .collect();
        for (index, name) in names.iter().enumerate() {
            log::info!("GPU {}: {}", index, name);
        }

        let index = match config.gpu_index {
            Some(index) if index < devices.len() => index,
            Some(index) => {
                return Err(VulkanError::InitializationFailed(format!(
                    "Configured GPU index {index} but only {} GPUs found",
                    devices.len()
                )))
            }
            None if devices.len() == 1 => 0,
            None => {
                let stdin = std::io::stdin();
                let stdout = std::io::stdout();
                prompt_device_index(stdin.lock(), stdout.lock(), &names)?
            }
        };

        Self::evaluate_device(instance, devices[index], names[index].clone())
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        name: String,
    ) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let graphics_family = find_graphics_queue_family(&queue_families).ok_or_else(|| {
            VulkanError::InitializationFailed(format!("No graphics queue family on {name}"))
        })?;

        log::info!(
            "Selected GPU: {} ({:?}), graphics queue family {}",
            name,
            properties.device_type,
            graphics_family
        );

        Ok(Self {
            device,
            properties,
            memory_properties,
            graphics_family,
            name,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue, also used for presentation
    pub graphics_queue: vk::Queue,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
}

impl LogicalDevice {
    /// Create the device with one graphics queue and the swapchain extension
    pub fn new(instance: &Instance, physical_device: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let available: Vec<String> = unsafe {
            instance
                .enumerate_device_extension_properties(physical_device.device)
                .map_err(VulkanError::Api)?
        }
        .iter()
        .map(|ext| name_from_raw(&ext.extension_name))
        .collect();

        let swapchain_name = SwapchainLoader::name().to_string_lossy().into_owned();
        let required = [swapchain_name.as_str()];
        let missing = missing_extensions(&available, &required);
        if !missing.is_empty() {
            return Err(VulkanError::MissingExtensions(missing));
        }
        let required_extensions = [SwapchainLoader::name().as_ptr()];

        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical_device.graphics_family)
            .queue_priorities(&priorities)
            .build()];

        let device_features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions)
            .enabled_features(&device_features);

        let device = unsafe {
            instance
                .create_device(physical_device.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue = unsafe { device.get_device_queue(physical_device.graphics_family, 0) };
        let swapchain_loader = SwapchainLoader::new(instance, &device);

        log::debug!("Logical device created with extensions {:?}", required);

        Ok(Self {
            device,
            graphics_queue,
            graphics_family: physical_device.graphics_family,
            swapchain_loader,
        })
    }

    /// Block until every queue on the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                log::warn!("Device wait idle failed before destroying device: {err:?}");
            }
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_wishlist_intersection_keeps_available_only() {
        let available = names(&["VK_LAYER_LUNARG_api_dump", "VK_LAYER_KHRONOS_validation"]);
        assert_eq!(
            intersect_wishlist(&available, VALIDATION_LAYERS),
            names(&["VK_LAYER_KHRONOS_validation"])
        );

        let with_optimus = names(&["VK_LAYER_NV_optimus", "VK_LAYER_KHRONOS_validation"]);
        assert_eq!(
            intersect_wishlist(&with_optimus, VALIDATION_LAYERS),
            names(&["VK_LAYER_KHRONOS_validation", "VK_LAYER_NV_optimus"])
        );
        assert_eq!(
            intersect_wishlist(&names(&["VK_LAYER_NV_optimus"]), VALIDATION_LAYERS),
            names(&["VK_LAYER_NV_optimus"])
        );
        assert!(intersect_wishlist(&names(&["other"]), VALIDATION_LAYERS).is_empty());
    }

    #[test]
    fn test_device_creation_requires_every_extension() {
        let required = ["VK_KHR_swapchain"];
        let supported = names(&["VK_KHR_maintenance1", "VK_KHR_swapchain"]);
        assert!(missing_extensions(&supported, &required).is_empty());

        let unsupported = names(&["VK_KHR_maintenance1"]);
        assert_eq!(missing_extensions(&unsupported, &required), names(&["VK_KHR_swapchain"]));

        let partial = names(&["VK_KHR_swapchain"]);
        assert_eq!(
            missing_extensions(&partial, &["VK_KHR_swapchain", "VK_KHR_maintenance1"]),
            names(&["VK_KHR_maintenance1"])
        );
    }

    #[test]
    fn test_graphics_family_skips_empty_and_compute_only() {
        let families = [
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::GRAPHICS,
                queue_count: 0,
                ..Default::default()
            },
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::COMPUTE,
                queue_count: 4,
                ..Default::default()
            },
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
                queue_count: 1,
                ..Default::default()
            },
        ];
        assert_eq!(find_graphics_queue_family(&families), Some(2));
        assert_eq!(find_graphics_queue_family(&families[..2]), None);
    }

    #[test]
    fn test_prompt_reprompts_until_valid() {
        let devices = names(&["Integrated", "Discrete"]);
        let input = Cursor::new("abc\n7\n1\n");
        let mut output = Vec::new();
        let index = prompt_device_index(input, &mut output, &devices).unwrap();
        assert_eq!(index, 1);

        let transcript = String::from_utf8(output).unwrap();
        assert_eq!(transcript.matches("Select a GPU").count(), 3);
        assert!(transcript.contains("Invalid GPU index 'abc'"));
        assert!(transcript.contains("Invalid GPU index '7'"));
    }

    #[test]
    fn test_prompt_fails_on_closed_input() {
        let devices = names(&["A", "B"]);
        let result = prompt_device_index(Cursor::new(""), Vec::new(), &devices);
        assert!(matches!(result, Err(VulkanError::InitializationFailed(_))));
    }
}
