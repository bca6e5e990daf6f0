//! Foundation utilities shared by the renderer

pub mod logging;
pub mod math;
