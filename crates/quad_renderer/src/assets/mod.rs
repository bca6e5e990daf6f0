//! Asset loading

mod image_loader;

pub use image_loader::ImageData;

/// Asset loading errors
#[derive(thiserror::Error, Debug)]
pub enum AssetError {
    /// The file could not be read or decoded
    #[error("Failed to load asset: {0}")]
    LoadFailed(String),

    /// The decoded asset is unusable
    #[error("Invalid asset: {0}")]
    Invalid(String),
}
