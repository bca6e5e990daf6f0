//! # Quad Renderer
//!
//! Draws textured quads through raw Vulkan, one explicit setup step at a time:
//! instance and validation, device selection, swapchain negotiation, texture
//! upload with optional GPU mip generation, an optional depth attachment, and
//! a fully synchronous acquire/record/submit/present loop.
//!
//! ```rust,no_run
//! use quad_renderer::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     quad_renderer::foundation::logging::init();
//!     let config = AppConfig::for_variant(Variant::DepthQuads);
//!     run(&config)?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod assets;
pub mod config;
pub mod foundation;
pub mod render;

/// Commonly used items
pub mod prelude {
    pub use crate::app::run;
    pub use crate::config::{AppConfig, Config, RenderFeatures, Variant};
    pub use crate::render::vulkan::{VulkanError, VulkanResult};
}
