//! Swapchain-dependent resources and their rebuild lifecycle
//!
//! Everything sized to the surface lives in [`PresentTargets`]: the
//! swapchain with its views, the depth buffer, the framebuffers and the
//! pipeline whose viewport matches the extent. [`SwapchainLifecycle`] tracks
//! whether that set still matches the surface and replaces it as a unit,
//! destroying the old set before the new one is created.

use ash::vk;

use crate::config::DepthFormat;
use crate::render::vulkan::framebuffer::Framebuffer;
use crate::render::vulkan::shader::{GraphicsPipeline, PipelineSettings, ShaderSet};
use crate::render::vulkan::{
    CommandPool, CommandRecorder, DepthBuffer, LogicalDevice, PhysicalDeviceInfo, RenderPass, Surface,
    Swapchain, SwapchainParameters, SwapchainPreferences, VertexBuffer, VulkanError, VulkanResult,
};

/// Whether the current swapchain can be rendered to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    /// Nothing has been built yet
    Uninitialized,
    /// The swapchain matches the surface
    Valid,
    /// The surface changed; the swapchain must be rebuilt before the next frame
    Stale,
}

/// Owner of a rebuildable resource set
///
/// `rebuild` drops the current set before running the builder, so the old
/// and new resources are never alive at the same time. A failed build leaves
/// the lifecycle empty and stale.
pub struct SwapchainLifecycle<T> {
    state: SwapchainState,
    current: Option<T>,
    generation: u64,
}

impl<T> SwapchainLifecycle<T> {
    /// Empty lifecycle
    pub fn new() -> Self {
        Self {
            state: SwapchainState::Uninitialized,
            current: None,
            generation: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> SwapchainState {
        self.state
    }

    /// Number of successful builds so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resources of the current build, if any
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Record that the surface no longer matches
    pub fn mark_stale(&mut self) {
        if self.state == SwapchainState::Valid {
            log::debug!("Swapchain generation {} marked stale", self.generation);
            self.state = SwapchainState::Stale;
        }
    }

    /// Tear down the current set and build a replacement
    pub fn rebuild<F>(&mut self, build: F) -> VulkanResult<&T>
    where
        F: FnOnce() -> VulkanResult<T>,
    {
        if self.state == SwapchainState::Valid {
            self.state = SwapchainState::Stale;
        }
        drop(self.current.take());

        let built = build()?;
        self.generation += 1;
        self.state = SwapchainState::Valid;
        log::debug!("Swapchain generation {} ready", self.generation);

        Ok(&*self.current.insert(built))
    }
}

impl<T> Default for SwapchainLifecycle<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Long-lived objects a rebuild reads from
pub struct TargetInputs<'a> {
    /// Logical device and queue
    pub device: &'a LogicalDevice,
    /// Chosen GPU
    pub physical_device: &'a PhysicalDeviceInfo,
    /// Presentation surface
    pub surface: &'a Surface,
    /// Negotiation preferences
    pub preferences: &'a SwapchainPreferences,
    /// Current framebuffer size of the window
    pub window_extent: vk::Extent2D,
    /// Pass the framebuffers and pipeline are built for
    pub render_pass: &'a RenderPass,
    /// Loaded shader stages
    pub shaders: &'a ShaderSet,
    /// Descriptor set layout of the pipeline
    pub set_layout: vk::DescriptorSetLayout,
    /// Depth format and its device properties, when depth testing
    pub depth: Option<(DepthFormat, vk::FormatProperties)>,
    /// Pool for the depth buffer's layout transition
    pub command_pool: &'a CommandPool,
}

/// Resources that must match the surface extent
///
/// Fields drop in declaration order: framebuffers and pipeline first, then
/// the depth buffer, then the swapchain and its views.
pub struct PresentTargets {
    framebuffers: Vec<Framebuffer>,
    pipeline: GraphicsPipeline,
    depth_buffer: Option<DepthBuffer>,
    swapchain: Swapchain,
}

impl PresentTargets {
    /// Negotiate and create a swapchain and everything sized to it
    pub fn new(inputs: &TargetInputs<'_>) -> VulkanResult<Self> {
        let support = inputs.surface.support(inputs.physical_device.device)?;
        let parameters =
            SwapchainParameters::negotiate(&support, inputs.window_extent, inputs.preferences)?;

        if parameters.surface_format.format != inputs.render_pass.color_format() {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "surface format changed from {:?} to {:?}",
                    inputs.render_pass.color_format(),
                    parameters.surface_format.format
                ),
            });
        }

        let swapchain = Swapchain::new(inputs.device, inputs.surface, parameters)?;
        let extent = swapchain.extent();
        let device = &inputs.device.device;

        let depth_buffer = match inputs.depth {
            Some((format, format_properties)) => Some(DepthBuffer::new(
                device.clone(),
                &inputs.physical_device.memory_properties,
                format_properties,
                format,
                extent,
                inputs.command_pool,
                inputs.device.graphics_queue,
            )?),
            None => None,
        };

        let framebuffers = Framebuffer::for_swapchain(
            device,
            inputs.render_pass.handle(),
            swapchain.image_views(),
            depth_buffer.as_ref().map(DepthBuffer::view),
            extent,
        )?;

        let pipeline = GraphicsPipeline::new(
            device.clone(),
            inputs.render_pass.handle(),
            inputs.shaders,
            inputs.set_layout,
            extent,
            PipelineSettings::quads(depth_buffer.is_some()),
        )?;

        log::info!(
            "Swapchain ready: {} images, {}x{}, {:?}",
            swapchain.image_count(),
            extent.width,
            extent.height,
            parameters.present_mode
        );

        Ok(Self {
            framebuffers,
            pipeline,
            depth_buffer,
            swapchain,
        })
    }

    /// The swapchain
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Number of swapchain images
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Record the draw of `vertex_buffer` into the framebuffer of `image_index`
    pub fn record(
        &self,
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
        render_pass: &RenderPass,
        descriptor_set: vk::DescriptorSet,
        vertex_buffer: &VertexBuffer,
    ) -> VulkanResult<()> {
        let framebuffer = self
            .framebuffers
            .get(image_index as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("no framebuffer for swapchain image {image_index}"),
            })?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.swapchain.extent(),
        };
        let clear_values = render_pass.clear_values();

        let mut recorder = CommandRecorder::begin(device, command_buffer)?;
        {
            let mut pass = recorder.begin_render_pass(
                render_pass.handle(),
                framebuffer.handle(),
                render_area,
                &clear_values,
            );
            pass.bind_pipeline(self.pipeline.handle());
            pass.bind_descriptor_sets(self.pipeline.layout(), &[descriptor_set]);
            pass.bind_vertex_buffers(&[vertex_buffer.handle()], &[0]);
            pass.draw(vertex_buffer.vertex_count(), 1);
        }
        recorder.end()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Tracked {
        id: u64,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.log.borrow_mut().push(format!("drop {}", self.id));
        }
    }

    fn build(id: u64, log: &Rc<RefCell<Vec<String>>>) -> VulkanResult<Tracked> {
        log.borrow_mut().push(format!("build {id}"));
        Ok(Tracked {
            id,
            log: Rc::clone(log),
        })
    }

    #[test]
    fn test_starts_uninitialized() {
        let mut lifecycle: SwapchainLifecycle<Tracked> = SwapchainLifecycle::new();
        assert_eq!(lifecycle.state(), SwapchainState::Uninitialized);
        assert!(lifecycle.current().is_none());

        lifecycle.mark_stale();
        assert_eq!(lifecycle.state(), SwapchainState::Uninitialized);
    }

    #[test]
    fn test_rebuild_drops_old_before_building_new() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut lifecycle = SwapchainLifecycle::new();

        lifecycle.rebuild(|| build(1, &log)).unwrap();
        assert_eq!(lifecycle.state(), SwapchainState::Valid);

        lifecycle.mark_stale();
        assert_eq!(lifecycle.state(), SwapchainState::Stale);

        let current = lifecycle.rebuild(|| build(2, &log)).unwrap();
        assert_eq!(current.id, 2);
        assert_eq!(lifecycle.state(), SwapchainState::Valid);
        assert_eq!(lifecycle.generation(), 2);

        assert_eq!(*log.borrow(), vec!["build 1", "drop 1", "build 2"]);
    }

    #[test]
    fn test_failed_rebuild_leaves_stale_and_empty() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut lifecycle = SwapchainLifecycle::new();
        lifecycle.rebuild(|| build(1, &log)).unwrap();

        let result = lifecycle.rebuild(|| -> VulkanResult<Tracked> {
            Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR))
        });
        assert!(result.is_err());
        assert_eq!(lifecycle.state(), SwapchainState::Stale);
        assert!(lifecycle.current().is_none());
        assert_eq!(lifecycle.generation(), 1);
        assert_eq!(*log.borrow(), vec!["build 1", "drop 1"]);
    }
}
