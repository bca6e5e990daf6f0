//! Quad renderer: owns every Vulkan object and drives one frame at a time
//!
//! A frame is fully synchronous. The acquire fence is reset, the next image
//! is acquired, its command buffer is recorded and submitted, the queue is
//! drained, the image is presented, and the fence is waited on before the
//! command buffer is reset for reuse.

use ash::vk;

use crate::assets::ImageData;
use crate::config::{AppConfig, DepthFormat};
use crate::foundation::math::Camera;
use crate::render::scene::{scene_vertices, ViewProjection};
use crate::render::vulkan::descriptor_set::{quad_layout_builder, DescriptorPool, DescriptorSetLayout};
use crate::render::vulkan::shader::ShaderSet;
use crate::render::vulkan::swapchain::choose_surface_format;
use crate::render::vulkan::swapchain_manager::{
    PresentTargets, SwapchainLifecycle, SwapchainState, TargetInputs,
};
use crate::render::vulkan::sync::FrameSync;
use crate::render::vulkan::texture::TEXTURE_FORMAT;
use crate::render::vulkan::{
    CommandPool, LogicalDevice, PhysicalDeviceInfo, PresentOutcome, RenderPass, Surface,
    SwapchainPreferences, Texture, UniformBuffer, VertexBuffer, VulkanError, VulkanInstance,
    VulkanResult, Window,
};

/// Where the current frame is in its acquire/record/submit/present cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Between frames
    Idle,
    /// Waiting for a swapchain image
    Acquiring,
    /// Recording the command buffer
    Recording,
    /// Command buffer submitted to the graphics queue
    Submitted,
    /// Image queued for presentation
    Presenting,
}

impl FramePhase {
    /// Phase that follows this one in a successful frame
    pub fn next(self) -> Self {
        match self {
            Self::Idle => Self::Acquiring,
            Self::Acquiring => Self::Recording,
            Self::Recording => Self::Submitted,
            Self::Submitted => Self::Presenting,
            Self::Presenting => Self::Idle,
        }
    }

    /// Validate a move to `to`
    ///
    /// Only the next phase of the cycle is allowed, plus a return to `Idle`
    /// from anywhere when a frame is abandoned.
    pub fn transition(self, to: Self) -> VulkanResult<Self> {
        if to == Self::Idle || self.next() == to {
            Ok(to)
        } else {
            Err(VulkanError::InvalidOperation {
                reason: format!("frame phase {self:?} cannot move to {to:?}"),
            })
        }
    }
}

fn advance(phase: &mut FramePhase, to: FramePhase) -> VulkanResult<()> {
    let next = phase.transition(to)?;
    log::trace!("Frame phase {:?} -> {:?}", phase, next);
    *phase = next;
    Ok(())
}

/// What the caller should do after a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Keep looping
    Continue,
    /// The window was closed while waiting for it to regain area
    CloseRequested,
}

/// Texture pixels from `path`, or a generated checkerboard when the file
/// cannot be decoded
pub fn load_texture_pixels(path: &str) -> ImageData {
    match ImageData::from_file(path) {
        Ok(data) => data,
        Err(err) => {
            log::warn!("{err}; using a generated checkerboard texture");
            ImageData::checkerboard(256, 32, [255, 255, 255, 255], [64, 64, 64, 255])
        }
    }
}

fn format_properties(
    instance: &VulkanInstance,
    physical_device: &PhysicalDeviceInfo,
    format: vk::Format,
) -> vk::FormatProperties {
    unsafe {
        instance
            .instance
            .get_physical_device_format_properties(physical_device.device, format)
    }
}

/// Every GPU object needed to draw the quads
///
/// Fields are dropped top to bottom, the reverse of creation order.
pub struct Renderer {
    sync: FrameSync,
    command_buffers: Vec<vk::CommandBuffer>,
    targets: SwapchainLifecycle<PresentTargets>,
    descriptor_set: vk::DescriptorSet,
    _descriptor_pool: DescriptorPool,
    texture: Texture,
    _uniform_buffer: UniformBuffer<ViewProjection>,
    vertex_buffer: VertexBuffer,
    descriptor_layout: DescriptorSetLayout,
    shaders: ShaderSet,
    render_pass: RenderPass,
    command_pool: CommandPool,
    device: LogicalDevice,
    surface: Surface,
    physical_device: PhysicalDeviceInfo,
    _instance: VulkanInstance,
    preferences: SwapchainPreferences,
    depth: Option<(DepthFormat, vk::FormatProperties)>,
    phase: FramePhase,
}

impl Renderer {
    /// Run the whole setup sequence for `config` against `window`
    pub fn new(window: &mut Window, config: &AppConfig) -> VulkanResult<Self> {
        log::debug!("Creating renderer with {:?}", config.features);

        let instance = VulkanInstance::new(window, config)?;
        let physical_device = PhysicalDeviceInfo::select(&instance.instance, config)?;
        let surface = Surface::new(&instance, window)?;
        surface.verify_presentation(&physical_device)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;
        let command_pool = CommandPool::new(device.device.clone(), device.graphics_family)?;

        let preferences = SwapchainPreferences::from_config(config);
        let support = surface.support(physical_device.device)?;
        let surface_format = choose_surface_format(&support.formats, preferences.surface_format)?;
        log::info!(
            "Surface format {:?} / {:?}",
            surface_format.format,
            surface_format.color_space
        );

        let depth = config.features.depth.then(|| {
            let format = config.depth_format;
            (format, format_properties(&instance, &physical_device, format.to_vk()))
        });
        let render_pass = RenderPass::new(
            device.device.clone(),
            surface_format.format,
            depth.map(|(format, _)| format.to_vk()),
        )?;

        let shaders = ShaderSet::load(&device.device, &config.shaders)?;
        let descriptor_layout = quad_layout_builder().build(&device.device)?;

        let memory_properties = &physical_device.memory_properties;
        let vertices = scene_vertices(config.features);
        let vertex_buffer = VertexBuffer::new(device.device.clone(), memory_properties, &vertices)?;

        let camera = Camera::quad_viewer(config.window.aspect_ratio());
        let uniform_buffer = UniformBuffer::new(
            device.device.clone(),
            memory_properties,
            &ViewProjection::from(camera.view_projection()),
        )?;

        let pixels = load_texture_pixels(&config.texture_path);
        let texture = Texture::from_image_data(
            device.device.clone(),
            memory_properties,
            format_properties(&instance, &physical_device, TEXTURE_FORMAT),
            &pixels,
            config.features.mipmaps,
            &command_pool,
            device.graphics_queue,
        )?;

        let descriptor_pool = DescriptorPool::for_layout(device.device.clone(), &descriptor_layout, 2)?;
        let descriptor_set = descriptor_pool.allocate(&descriptor_layout)?;
        descriptor_pool.write_quad_set(
            descriptor_set,
            vk::DescriptorBufferInfo {
                buffer: uniform_buffer.handle(),
                offset: 0,
                range: uniform_buffer.range(),
            },
            texture.descriptor_info(),
        );

        let sync = FrameSync::new(device.device.clone())?;

        let mut renderer = Self {
            sync,
            command_buffers: Vec::new(),
            targets: SwapchainLifecycle::new(),
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            texture,
            _uniform_buffer: uniform_buffer,
            vertex_buffer,
            descriptor_layout,
            shaders,
            render_pass,
            command_pool,
            device,
            surface,
            physical_device,
            _instance: instance,
            preferences,
            depth,
            phase: FramePhase::Idle,
        };

        if renderer.recreate_swapchain(window)? == FrameStatus::CloseRequested {
            log::info!("Window closed before the first frame");
        }

        log::info!(
            "Renderer ready on {} ({} vertices, {} mip level(s))",
            renderer.physical_device.name,
            renderer.vertex_buffer.vertex_count(),
            renderer.texture.mip_levels()
        );
        Ok(renderer)
    }

    /// Flag the swapchain for a rebuild before the next frame
    pub fn mark_swapchain_stale(&mut self) {
        self.targets.mark_stale();
    }

    /// Draw and present one frame
    ///
    /// An out-of-date or suboptimal swapchain is rebuilt in place. Any other
    /// acquire, submit or present failure is returned.
    pub fn draw_frame(&mut self, window: &mut Window) -> VulkanResult<FrameStatus> {
        if self.phase != FramePhase::Idle {
            log::warn!("Previous frame stopped in {:?}, starting over", self.phase);
            advance(&mut self.phase, FramePhase::Idle)?;
        }
        if self.targets.state() != SwapchainState::Valid {
            return self.recreate_swapchain(window);
        }

        advance(&mut self.phase, FramePhase::Acquiring)?;
        let acquire_fence = self.sync.prepare_acquire()?;
        let targets = self.targets.current().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "valid swapchain state without present targets".to_string(),
        })?;

        let acquired = targets
            .swapchain()
            .acquire_next_image(self.sync.image_available(), acquire_fence)?;
        let Some(image_index) = acquired else {
            log::debug!("Swapchain out of date on acquire");
            advance(&mut self.phase, FramePhase::Idle)?;
            self.targets.mark_stale();
            return self.recreate_swapchain(window);
        };
        self.sync.mark_acquired()?;

        advance(&mut self.phase, FramePhase::Recording)?;
        let command_buffer = *self.command_buffers.get(image_index as usize).ok_or_else(|| {
            VulkanError::InvalidOperation {
                reason: format!("no command buffer for swapchain image {image_index}"),
            }
        })?;
        targets.record(
            &self.device.device,
            command_buffer,
            image_index,
            &self.render_pass,
            self.descriptor_set,
            &self.vertex_buffer,
        )?;

        advance(&mut self.phase, FramePhase::Submitted)?;
        self.submit(command_buffer)?;

        advance(&mut self.phase, FramePhase::Presenting)?;
        let outcome = targets.swapchain().present(
            self.device.graphics_queue,
            image_index,
            self.sync.render_finished(),
        );

        self.sync.wait_acquired()?;
        unsafe {
            self.device
                .device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
        }
        advance(&mut self.phase, FramePhase::Idle)?;

        match outcome {
            PresentOutcome::Presented => Ok(FrameStatus::Continue),
            PresentOutcome::Stale => {
                log::debug!("Swapchain stale after present");
                self.targets.mark_stale();
                self.recreate_swapchain(window)
            }
            PresentOutcome::Failed(err) => Err(VulkanError::Api(err)),
        }
    }

    fn submit(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        let wait_semaphores = [self.sync.image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [self.sync.render_finished()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let queue = self.device.graphics_queue;
        unsafe {
            self.device
                .device
                .queue_submit(queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            self.device
                .device
                .queue_wait_idle(queue)
                .map_err(VulkanError::Api)
        }
    }

    /// Replace the swapchain and everything sized to it
    ///
    /// While the window has no area this blocks on window events. Once the
    /// device is idle the old targets are destroyed and new ones built for
    /// the current framebuffer size. Command buffers are reallocated when the
    /// image count changed.
    pub fn recreate_swapchain(&mut self, window: &mut Window) -> VulkanResult<FrameStatus> {
        let mut extent = window.framebuffer_extent();
        while extent.width == 0 || extent.height == 0 {
            log::debug!("Framebuffer has no area, waiting for window events");
            if window.wait_events().close_requested {
                return Ok(FrameStatus::CloseRequested);
            }
            extent = window.framebuffer_extent();
        }

        self.device.wait_idle()?;

        let inputs = TargetInputs {
            device: &self.device,
            physical_device: &self.physical_device,
            surface: &self.surface,
            preferences: &self.preferences,
            window_extent: extent,
            render_pass: &self.render_pass,
            shaders: &self.shaders,
            set_layout: self.descriptor_layout.handle(),
            depth: self.depth,
            command_pool: &self.command_pool,
        };
        let image_count = self.targets.rebuild(|| PresentTargets::new(&inputs))?.image_count();

        if self.command_buffers.len() != image_count {
            self.command_pool.free_command_buffers(&self.command_buffers);
            self.command_buffers = self.command_pool.allocate_command_buffers(image_count as u32)?;
            log::debug!("Allocated {} command buffers", image_count);
        }

        Ok(FrameStatus::Continue)
    }

    /// Block until the GPU has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle during teardown: {err}");
        }
        log::debug!("Destroying renderer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_phase_cycle() {
        let mut phase = FramePhase::Idle;
        let mut visited = vec![phase];
        for _ in 0..5 {
            phase = phase.next();
            visited.push(phase);
        }
        assert_eq!(
            visited,
            vec![
                FramePhase::Idle,
                FramePhase::Acquiring,
                FramePhase::Recording,
                FramePhase::Submitted,
                FramePhase::Presenting,
                FramePhase::Idle,
            ]
        );
    }

    #[test]
    fn test_transition_follows_cycle() {
        let order = [
            FramePhase::Idle,
            FramePhase::Acquiring,
            FramePhase::Recording,
            FramePhase::Submitted,
            FramePhase::Presenting,
            FramePhase::Idle,
        ];
        let mut phase = FramePhase::Idle;
        for &to in &order[1..] {
            advance(&mut phase, to).unwrap();
            assert_eq!(phase, to);
        }
    }

    #[test]
    fn test_transition_rejects_skips() {
        assert!(FramePhase::Idle.transition(FramePhase::Recording).is_err());
        assert!(FramePhase::Acquiring.transition(FramePhase::Submitted).is_err());
        assert!(FramePhase::Recording.transition(FramePhase::Presenting).is_err());
        assert!(FramePhase::Presenting.transition(FramePhase::Acquiring).is_err());
        assert!(FramePhase::Submitted.transition(FramePhase::Submitted).is_err());

        let mut phase = FramePhase::Idle;
        let result = advance(&mut phase, FramePhase::Submitted);
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
        assert_eq!(phase, FramePhase::Idle);
    }

    #[test]
    fn test_abandoned_frame_returns_to_idle() {
        for stuck in [
            FramePhase::Acquiring,
            FramePhase::Recording,
            FramePhase::Submitted,
            FramePhase::Presenting,
        ] {
            let mut phase = stuck;
            advance(&mut phase, FramePhase::Idle).unwrap();
            advance(&mut phase, FramePhase::Acquiring).unwrap();
            assert_eq!(phase, FramePhase::Acquiring);
        }
    }

    #[test]
    fn test_missing_texture_falls_back_to_checkerboard() {
        let pixels = load_texture_pixels("does/not/exist.tga");
        assert_eq!((pixels.width, pixels.height), (256, 256));
        assert_eq!(pixels.byte_len(), 256 * 256 * 4);
    }
}
