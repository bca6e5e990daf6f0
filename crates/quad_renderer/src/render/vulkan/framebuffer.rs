//! Framebuffers over swapchain views
//!
//! Attachment order follows the render pass: color at index 0, then the
//! shared depth view when depth testing is on.

use ash::{vk, Device};

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Attachments of one framebuffer, color view first
pub fn attachment_views(color_view: vk::ImageView, depth_view: Option<vk::ImageView>) -> Vec<vk::ImageView> {
    std::iter::once(color_view).chain(depth_view).collect()
}

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a framebuffer over `attachments`, in render pass attachment order
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            framebuffer,
        })
    }

    /// One framebuffer per swapchain view, each sharing `depth_view` if given
    pub fn for_swapchain(
        device: &Device,
        render_pass: vk::RenderPass,
        color_views: &[vk::ImageView],
        depth_view: Option<vk::ImageView>,
        extent: vk::Extent2D,
    ) -> VulkanResult<Vec<Self>> {
        color_views
            .iter()
            .map(|&view| {
                let attachments = attachment_views(view, depth_view);
                Self::new(device.clone(), render_pass, &attachments, extent)
            })
            .collect()
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_color_view_only_without_depth() {
        let color = vk::ImageView::from_raw(7);
        assert_eq!(attachment_views(color, None), vec![color]);
    }

    #[test]
    fn test_depth_view_follows_color_view() {
        let color = vk::ImageView::from_raw(7);
        let depth = vk::ImageView::from_raw(9);
        let views = attachment_views(color, Some(depth));
        assert_eq!(views, vec![color, depth]);
    }
}
