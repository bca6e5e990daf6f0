//! Image loading for texture data
//!
//! Decodes TGA or PNG files into tightly packed RGBA8 rows ready for a staging upload.

use std::path::Path;

use crate::assets::AssetError;

/// Decoded image ready for GPU upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Raw RGBA pixel data, row-major, top row first
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Load an image from a file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path_ref = path.as_ref();

        log::debug!("Loading image from: {:?}", path_ref);

        let img = image::open(path_ref).map_err(|e| {
            AssetError::LoadFailed(format!("{}: {}", path_ref.display(), e))
        })?;

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();

        log::info!("Loaded image {}x{} from {:?}", width, height, path_ref);

        Self::from_rgba(rgba_img.into_raw(), width, height)
    }

    /// Wrap already decoded RGBA pixels
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Result<Self, AssetError> {
        if width == 0 || height == 0 {
            return Err(AssetError::Invalid(format!("empty image {width}x{height}")));
        }
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(AssetError::Invalid(format!(
                "expected {} bytes for {}x{} RGBA, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self { data, width, height })
    }

    /// Two-color checkerboard, used when no texture file is available
    pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let mut data = Vec::with_capacity(size as usize * size as usize * 4);
        for y in 0..size {
            for x in 0..size {
                let color = if (x / cell + y / cell) % 2 == 0 { a } else { b };
                data.extend_from_slice(&color);
            }
        }
        Self {
            data,
            width: size,
            height: size,
        }
    }

    /// Size of the pixel data in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkerboard_layout() {
        let image = ImageData::checkerboard(4, 2, [255, 255, 255, 255], [0, 0, 0, 255]);
        assert_eq!(image.byte_len(), 4 * 4 * 4);
        assert_eq!(&image.data[0..4], &[255, 255, 255, 255]);
        // third pixel of the first row crosses into the next cell
        assert_eq!(&image.data[8..12], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_from_rgba_rejects_short_buffer() {
        assert!(matches!(
            ImageData::from_rgba(vec![0; 15], 2, 2),
            Err(AssetError::Invalid(_))
        ));
        assert!(ImageData::from_rgba(vec![0; 16], 2, 2).is_ok());
    }

    #[test]
    fn test_missing_file_is_load_error() {
        assert!(matches!(
            ImageData::from_file("no/such/texture.tga"),
            Err(AssetError::LoadFailed(_))
        ));
    }
}
