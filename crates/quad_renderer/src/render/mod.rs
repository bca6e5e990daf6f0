//! Rendering: scene data and the Vulkan backend

pub mod scene;
pub mod vulkan;
