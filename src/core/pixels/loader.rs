//! Slide loading behind a swappable trait.
//!
//! The default loader decodes through the image crate, which covers plain and
//! tiled TIFF, PNG and JPEG. Whole-slide containers need a dedicated decoder
//! implementing [`SlideLoader`].

use super::{BitDepth, ChannelLayout, PixelArray};
use crate::error::LoadError;
use image::DynamicImage;
use std::path::Path;

/// Loads a slide fully into memory
pub trait SlideLoader {
    /// Decode the slide at `path` into a pixel array
    fn load(&self, path: &Path) -> Result<PixelArray, LoadError>;

    /// Decode, then stride-downsample once by `factor`
    fn load_downsampled(&self, path: &Path, factor: usize) -> Result<PixelArray, LoadError> {
        let slide = self.load(path)?;
        tracing::info!(path = %path.display(), shape = %slide.shape(), "Loaded slide");

        let slide = slide.downsample(factor)?;
        if factor > 1 {
            tracing::info!(factor, shape = %slide.shape(), "Downsampled slide");
        }
        Ok(slide)
    }
}

/// Loader backed by the image crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageSlideLoader;

impl ImageSlideLoader {
    pub fn new() -> Self {
        Self
    }

    /// Convert a decoded image, fixing the channel layout once
    pub fn from_dynamic(image: DynamicImage) -> Result<PixelArray, LoadError> {
        let height = image.height() as usize;
        let width = image.width() as usize;
        let color = image.color();
        let sixteen_bit = color.bytes_per_pixel() / color.channel_count().max(1) > 1;

        let (layout, depth, data) = match (color.has_color(), sixteen_bit) {
            (false, false) => (
                ChannelLayout::Grayscale,
                BitDepth::Eight,
                widen(image.to_luma8().into_raw()),
            ),
            (false, true) => (
                ChannelLayout::Grayscale,
                BitDepth::Sixteen,
                image.to_luma16().into_raw(),
            ),
            (true, false) => (
                ChannelLayout::MultiChannel(3),
                BitDepth::Eight,
                widen(image.to_rgb8().into_raw()),
            ),
            (true, true) => (
                ChannelLayout::MultiChannel(3),
                BitDepth::Sixteen,
                image.to_rgb16().into_raw(),
            ),
        };

        PixelArray::new(height, width, layout, depth, data)
    }
}

fn widen(samples: Vec<u8>) -> Vec<u16> {
    samples.into_iter().map(u16::from).collect()
}

impl SlideLoader for ImageSlideLoader {
    fn load(&self, path: &Path) -> Result<PixelArray, LoadError> {
        if !path.exists() {
            return Err(LoadError::PathNotFound {
                path: path.to_path_buf(),
            });
        }

        tracing::debug!(path = %path.display(), "Decoding slide");
        let image = image::open(path).map_err(|e| LoadError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if image.width() == 0 || image.height() == 0 {
            return Err(LoadError::Empty {
                path: path.to_path_buf(),
            });
        }

        Self::from_dynamic(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb};
    use tempfile::TempDir;

    #[test]
    fn missing_slide_is_path_not_found() {
        let loader = ImageSlideLoader::new();
        let result = loader.load(Path::new("/nonexistent/slide.ome.tiff"));
        assert!(matches!(result, Err(LoadError::PathNotFound { .. })));
    }

    #[test]
    fn corrupt_slide_is_decode_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let result = ImageSlideLoader::new().load(&path);
        assert!(matches!(result, Err(LoadError::Decode { .. })));
    }

    #[test]
    fn rgb_png_loads_as_multichannel() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("he.png");
        let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(8, 4, |x, y| Rgb([x as u8, y as u8, 200]));
        buffer.save(&path).unwrap();

        let slide = ImageSlideLoader::new().load(&path).unwrap();

        assert_eq!(slide.layout(), ChannelLayout::MultiChannel(3));
        assert_eq!((slide.height(), slide.width()), (4, 8));
        assert_eq!(slide.sample(3, 5, 0), 5);
        assert_eq!(slide.sample(3, 5, 2), 200);
    }

    #[test]
    fn sixteen_bit_gray_keeps_depth() {
        let buffer: ImageBuffer<Luma<u16>, Vec<u16>> =
            ImageBuffer::from_fn(3, 3, |x, _| Luma([x as u16 * 1000]));
        let slide = ImageSlideLoader::from_dynamic(DynamicImage::ImageLuma16(buffer)).unwrap();

        assert_eq!(slide.layout(), ChannelLayout::Grayscale);
        assert_eq!(slide.depth(), BitDepth::Sixteen);
        assert_eq!(slide.sample(0, 2, 0), 2000);
    }

    #[test]
    fn load_downsampled_applies_stride() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cd8.png");
        let buffer: ImageBuffer<Luma<u8>, Vec<u8>> = ImageBuffer::from_fn(32, 16, |_, _| Luma([9]));
        buffer.save(&path).unwrap();

        let slide = ImageSlideLoader::new().load_downsampled(&path, 4).unwrap();

        assert_eq!((slide.height(), slide.width()), (4, 8));
    }
}
