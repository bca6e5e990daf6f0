//! Presentation surface

use ash::extensions::khr::Surface as SurfaceLoader;
use ash::vk;

use crate::render::vulkan::{PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult, Window};

/// Everything the swapchain negotiation reads from the surface
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Image counts, extents, usages and transforms
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Format and color space pairs
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Window surface with RAII cleanup
pub struct Surface {
    loader: SurfaceLoader,
    surface: vk::SurfaceKHR,
}

impl Surface {
    /// Create a surface for `window`
    pub fn new(instance: &VulkanInstance, window: &Window) -> VulkanResult<Self> {
        let loader = SurfaceLoader::new(&instance.entry, &instance.instance);
        let surface = window.create_vulkan_surface(instance.handle())?;
        Ok(Self { loader, surface })
    }

    /// Fail unless the device's graphics family can present to this surface
    pub fn verify_presentation(&self, physical_device: &PhysicalDeviceInfo) -> VulkanResult<()> {
        let supported = unsafe {
            self.loader
                .get_physical_device_surface_support(
                    physical_device.device,
                    physical_device.graphics_family,
                    self.surface,
                )
                .map_err(VulkanError::Api)?
        };

        if supported {
            log::debug!(
                "Queue family {} can present to the window surface",
                physical_device.graphics_family
            );
            Ok(())
        } else {
            Err(VulkanError::InitializationFailed(format!(
                "Queue family {} of {} cannot present to the window surface",
                physical_device.graphics_family, physical_device.name
            )))
        }
    }

    /// Query capabilities, formats and present modes
    pub fn support(&self, physical_device: vk::PhysicalDevice) -> VulkanResult<SurfaceSupport> {
        unsafe {
            let capabilities = self
                .loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
                .map_err(VulkanError::Api)?;
            let formats = self
                .loader
                .get_physical_device_surface_formats(physical_device, self.surface)
                .map_err(VulkanError::Api)?;
            let present_modes = self
                .loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)
                .map_err(VulkanError::Api)?;

            Ok(SurfaceSupport {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Get the surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}
