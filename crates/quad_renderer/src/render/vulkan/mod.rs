//! Vulkan backend
//!
//! Thin RAII wrappers over `ash` objects, pure negotiation helpers that can be
//! tested without a GPU, and the [`Renderer`] that ties them together.

/// Host-visible buffers and memory type selection
pub mod buffer;
/// Command pools, one-shot submissions and frame recording
pub mod commands;
/// Instance, physical device and logical device
pub mod context;
/// Descriptor set layout, pool and writes
pub mod descriptor_set;
pub mod framebuffer;
/// Images, layout transitions, mipmaps and the depth buffer
pub mod image;
/// Render pass with optional depth attachment
pub mod render_pass;
/// Renderer and frame loop
pub mod renderer;
/// Shader modules and the graphics pipeline
pub mod shader;
/// Presentation surface
pub mod surface;
/// Swapchain negotiation and presentation
pub mod swapchain;
/// Swapchain-sized resources and their rebuild lifecycle
pub mod swapchain_manager;
/// Semaphores and fences
pub mod sync;
/// Sampled textures
pub mod texture;
/// GLFW window
pub mod window;

pub use buffer::{Buffer, UniformBuffer, VertexBuffer};
pub use commands::{CommandPool, CommandRecorder, SingleTimeCommands};
pub use context::{LogicalDevice, PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult};
pub use descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
pub use framebuffer::Framebuffer;
pub use image::{DepthBuffer, Image};
pub use render_pass::RenderPass;
pub use renderer::{FramePhase, FrameStatus, Renderer};
pub use shader::{GraphicsPipeline, ShaderModule, ShaderSet};
pub use surface::{Surface, SurfaceSupport};
pub use swapchain::{PresentOutcome, Swapchain, SwapchainParameters, SwapchainPreferences};
pub use swapchain_manager::{PresentTargets, SwapchainLifecycle, SwapchainState};
pub use sync::{FenceState, FrameSync};
pub use texture::Texture;
pub use window::{Window, WindowError, WindowEvents};
