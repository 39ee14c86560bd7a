//! Image loading utilities for texture data

use std::path::Path;
use crate::assets::AssetError;

/// Loaded image data ready for GPU upload
#[derive(Debug, Clone)]
pub struct ImageData {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Channels in the source file; `data` is always expanded to RGBA
    pub channels: u8,
}

impl ImageData {
    /// Load an image from a file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AssetError> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            return Err(AssetError::NotFound(path_ref.display().to_string()));
        }

        log::debug!("Loading image from: {:?}", path_ref);

        let img = image::open(path_ref)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to load image {}: {}", path_ref.display(), e)))?;
        let channels = img.color().channel_count();

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();

        log::info!("Loaded image {}x{} ({} channels) from {:?}", width, height, channels, path_ref);

        Ok(Self {
            data: rgba_img.into_raw(),
            width,
            height,
            channels,
        })
    }

    /// Load image from memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AssetError> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| AssetError::LoadFailed(format!("Failed to load image from bytes: {}", e)))?;
        let channels = img.color().channel_count();

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();

        log::debug!("Loaded image {}x{} from memory", width, height);

        Ok(Self {
            data: rgba_img.into_raw(),
            width,
            height,
            channels,
        })
    }

    /// Create a solid color image, used for the fallback texture
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = (width * height) as usize;
        let data = color.iter().copied().cycle().take(pixel_count * 4).collect();

        Self {
            data,
            width,
            height,
            channels: 4,
        }
    }

    /// Size of the pixel data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(4, 2, [255, 0, 0, 255]);
        assert_eq!(img.width, 4);
        assert_eq!(img.height, 2);
        assert_eq!(img.size_bytes(), 4 * 2 * 4);
        assert!(img.data.chunks(4).all(|px| px == [255, 0, 0, 255]));
    }

    #[test]
    fn test_png_from_bytes_expands_to_rgba() {
        let mut png = Vec::new();
        let gray = image::GrayImage::from_raw(2, 2, vec![0, 64, 128, 255]).unwrap();
        image::DynamicImage::ImageLuma8(gray)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let img = ImageData::from_bytes(&png).unwrap();
        assert_eq!((img.width, img.height), (2, 2));
        assert_eq!(img.channels, 1);
        assert_eq!(img.size_bytes(), 16);
        assert_eq!(&img.data[4..8], &[64, 64, 64, 255]);
    }

    #[test]
    fn test_missing_file() {
        let err = ImageData::from_file("does/not/exist.png").unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }
}
