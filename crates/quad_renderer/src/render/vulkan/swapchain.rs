//! Vulkan swapchain management
//!
//! The `choose_*` functions turn surface capabilities into swapchain
//! parameters. They only read plain Vulkan structs so they can be checked
//! against synthetic capabilities. [`Swapchain`] owns the resulting handle and
//! its per-image views.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::config::AppConfig;
use crate::render::vulkan::{LogicalDevice, Surface, SurfaceSupport, VulkanError, VulkanResult};

/// Image count: one more than the minimum, capped by the maximum when the
/// surface reports one (`max_image_count == 0` means unbounded).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Use the surface's current extent, or the window size clamped into the
/// supported range when the surface reports the `u32::MAX` sentinel.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: window_extent.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window_extent.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Every bit of `required` must be supported by the surface
pub fn choose_image_usage(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    required: vk::ImageUsageFlags,
) -> VulkanResult<vk::ImageUsageFlags> {
    let missing = required & !capabilities.supported_usage_flags;
    if missing.is_empty() {
        Ok(required)
    } else {
        Err(VulkanError::UnsupportedImageUsage { missing })
    }
}

/// `desired` when supported, otherwise whatever the surface currently uses
pub fn choose_transform(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::SurfaceTransformFlagsKHR,
) -> vk::SurfaceTransformFlagsKHR {
    if capabilities.supported_transforms.contains(desired) {
        desired
    } else {
        capabilities.current_transform
    }
}

/// Pick a format and color space
///
/// A lone `UNDEFINED` entry means the surface has no preference. Otherwise
/// the exact preferred pair wins, then the preferred format in any color
/// space, then the first format the surface lists.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> VulkanResult<vk::SurfaceFormatKHR> {
    let first = *available.first().ok_or_else(|| {
        VulkanError::InitializationFailed("Surface reports no formats".to_string())
    })?;

    if available.len() == 1 && first.format == vk::Format::UNDEFINED {
        return Ok(preferred);
    }

    if available.contains(&preferred) {
        return Ok(preferred);
    }

    if let Some(same_format) = available.iter().find(|f| f.format == preferred.format) {
        log::warn!(
            "Color space {:?} unavailable for {:?}, using {:?}",
            preferred.color_space,
            preferred.format,
            same_format.color_space
        );
        return Ok(*same_format);
    }

    log::warn!("Format {:?} unavailable, using {:?}", preferred.format, first.format);
    Ok(first)
}

/// `preferred` when available, otherwise FIFO, which every surface supports
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        log::warn!("Present mode {:?} unavailable, falling back to FIFO", preferred);
        vk::PresentModeKHR::FIFO
    }
}

/// Preferences fed into negotiation
#[derive(Debug, Clone, Copy)]
pub struct SwapchainPreferences {
    /// Preferred format and color space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Preferred presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Usage bits the swapchain images must support
    pub required_usage: vk::ImageUsageFlags,
    /// Preferred pre-transform
    pub transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainPreferences {
    /// Preferences from the application configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            surface_format: config.surface_format.surface_format(),
            present_mode: config.present_mode.to_vk(),
            required_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
        }
    }
}

/// Negotiated swapchain parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainParameters {
    /// Minimum number of images requested
    pub image_count: u32,
    /// Image size
    pub extent: vk::Extent2D,
    /// Image usage
    pub usage: vk::ImageUsageFlags,
    /// Pre-transform
    pub transform: vk::SurfaceTransformFlagsKHR,
    /// Format and color space
    pub surface_format: vk::SurfaceFormatKHR,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
}

impl SwapchainParameters {
    /// Run every `choose_*` step against the surface's reported support
    pub fn negotiate(
        support: &SurfaceSupport,
        window_extent: vk::Extent2D,
        preferences: &SwapchainPreferences,
    ) -> VulkanResult<Self> {
        let capabilities = &support.capabilities;
        Ok(Self {
            image_count: choose_image_count(capabilities),
            extent: choose_extent(capabilities, window_extent),
            usage: choose_image_usage(capabilities, preferences.required_usage)?,
            transform: choose_transform(capabilities, preferences.transform),
            surface_format: choose_surface_format(&support.formats, preferences.surface_format)?,
            present_mode: choose_present_mode(&support.present_modes, preferences.present_mode),
        })
    }
}

/// Swapchain and its image views with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    parameters: SwapchainParameters,
}

impl Swapchain {
    /// Create a swapchain from negotiated parameters
    pub fn new(
        device: &LogicalDevice,
        surface: &Surface,
        parameters: SwapchainParameters,
    ) -> VulkanResult<Self> {
        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(parameters.image_count)
            .image_format(parameters.surface_format.format)
            .image_color_space(parameters.surface_format.color_space)
            .image_extent(parameters.extent)
            .image_array_layers(1)
            .image_usage(parameters.usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(parameters.transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(parameters.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain_loader = device.swapchain_loader.clone();
        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(VulkanError::Api)?
        };

        // Owned from here so an early return below still releases the handle
        let mut this = Self {
            device: device.device.clone(),
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            parameters,
        };

        this.images = unsafe {
            this.swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        for &image in &this.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(parameters.surface_format.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe {
                this.device
                    .create_image_view(&create_info, None)
                    .map_err(VulkanError::Api)?
            };
            this.image_views.push(view);
        }

        log::info!(
            "Swapchain created: {} images, {}x{}, {:?}/{:?}, {:?}",
            this.images.len(),
            parameters.extent.width,
            parameters.extent.height,
            parameters.surface_format.format,
            parameters.surface_format.color_space,
            parameters.present_mode
        );

        Ok(this)
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.parameters.extent
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of images the driver actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire the next image, waiting without a timeout
    ///
    /// `Ok(None)` means the swapchain is out of date.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> VulkanResult<Option<u32>> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, fence)
        };
        match result {
            Ok((index, _suboptimal)) => Ok(Some(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(err) => Err(VulkanError::Api(err)),
        }
    }

    /// Queue `image_index` for presentation after `wait_semaphore` signals
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> PresentOutcome {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        PresentOutcome::from(unsafe { self.swapchain_loader.queue_present(queue, &present_info) })
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Result of a present call, classified for the frame loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented and the swapchain still matches the surface
    Presented,
    /// The swapchain no longer matches the surface and must be rebuilt
    Stale,
    /// Any other failure
    Failed(vk::Result),
}

impl From<Result<bool, vk::Result>> for PresentOutcome {
    fn from(result: Result<bool, vk::Result>) -> Self {
        match result {
            Ok(false) => Self::Presented,
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Self::Stale,
            Err(err) => Self::Failed(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: 800, height: 600 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn test_image_count_unbounded_max() {
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
    }

    #[test]
    fn test_image_count_capped_by_max() {
        assert_eq!(choose_image_count(&capabilities(2, 2)), 2);
    }

    #[test]
    fn test_image_count_stays_in_bounds() {
        for min in 1..6 {
            for max in 0..8 {
                if max != 0 && max < min {
                    continue;
                }
                let count = choose_image_count(&capabilities(min, max));
                assert!(count >= min);
                if max != 0 {
                    assert!(count <= max, "min {min} max {max} gave {count}");
                }
            }
        }
    }

    #[test]
    fn test_extent_uses_current_extent() {
        let caps = capabilities(2, 3);
        let extent = choose_extent(&caps, vk::Extent2D { width: 1280, height: 720 });
        assert_eq!(extent, vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_extent_follows_window_within_limits() {
        let mut caps = capabilities(2, 3);
        caps.current_extent = vk::Extent2D { width: u32::MAX, height: u32::MAX };

        let inside = choose_extent(&caps, vk::Extent2D { width: 1280, height: 720 });
        assert_eq!(inside, vk::Extent2D { width: 1280, height: 720 });

        let oversized = choose_extent(&caps, vk::Extent2D { width: 4000, height: 0 });
        assert_eq!(oversized, vk::Extent2D { width: 1920, height: 1 });
    }

    #[test]
    fn test_image_usage_requires_every_bit() {
        let caps = capabilities(2, 3);
        let usage = choose_image_usage(&caps, vk::ImageUsageFlags::COLOR_ATTACHMENT).unwrap();
        assert!(usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));

        let err = choose_image_usage(
            &caps,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::STORAGE,
        )
        .unwrap_err();
        match err {
            VulkanError::UnsupportedImageUsage { missing } => {
                assert_eq!(missing, vk::ImageUsageFlags::STORAGE);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_transform_falls_back_to_current() {
        let mut caps = capabilities(2, 3);
        assert_eq!(
            choose_transform(&caps, vk::SurfaceTransformFlagsKHR::IDENTITY),
            vk::SurfaceTransformFlagsKHR::IDENTITY
        );

        caps.supported_transforms = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        caps.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(
            choose_transform(&caps, vk::SurfaceTransformFlagsKHR::IDENTITY),
            vk::SurfaceTransformFlagsKHR::ROTATE_90
        );
    }

    #[test]
    fn test_surface_format_selection() {
        let preferred = srgb(vk::Format::B8G8R8A8_SRGB);

        let unrestricted = [srgb(vk::Format::UNDEFINED)];
        assert_eq!(choose_surface_format(&unrestricted, preferred).unwrap(), preferred);

        let listed = [srgb(vk::Format::R8G8B8A8_UNORM), preferred];
        assert_eq!(choose_surface_format(&listed, preferred).unwrap(), preferred);

        let other_space = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
        };
        let wrong_space = [srgb(vk::Format::R8G8B8A8_UNORM), other_space];
        assert_eq!(choose_surface_format(&wrong_space, preferred).unwrap(), other_space);

        let unrelated = [srgb(vk::Format::R16G16B16A16_SFLOAT), srgb(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(
            choose_surface_format(&unrelated, preferred).unwrap(),
            srgb(vk::Format::R16G16B16A16_SFLOAT)
        );

        assert!(choose_surface_format(&[], preferred).is_err());
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::FIFO_RELAXED),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_negotiate_combines_choices() {
        let support = SurfaceSupport {
            capabilities: capabilities(2, 0),
            formats: vec![srgb(vk::Format::B8G8R8A8_SRGB)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let preferences = SwapchainPreferences::from_config(&AppConfig::default());
        let params = SwapchainParameters::negotiate(
            &support,
            vk::Extent2D { width: 1280, height: 720 },
            &preferences,
        )
        .unwrap();

        assert_eq!(params.image_count, 3);
        assert_eq!(params.extent, vk::Extent2D { width: 800, height: 600 });
        assert_eq!(params.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(params.surface_format.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_present_outcome_classification() {
        assert_eq!(PresentOutcome::from(Ok(false)), PresentOutcome::Presented);
        assert_eq!(PresentOutcome::from(Ok(true)), PresentOutcome::Stale);
        assert_eq!(
            PresentOutcome::from(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            PresentOutcome::Stale
        );
        assert_eq!(
            PresentOutcome::from(Err(vk::Result::ERROR_DEVICE_LOST)),
            PresentOutcome::Failed(vk::Result::ERROR_DEVICE_LOST)
        );
    }
}
