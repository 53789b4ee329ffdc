use image::{DynamicImage, GrayImage, ImageError, ImageReader, Luma};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("Failed to open image {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to decode image: {0}")]
    Decode(#[from] ImageError),

    #[error("Target size {width}x{height} px is empty; increase the physical dimensions")]
    EmptyTarget { width: u32, height: u32 },

    #[error("Target size {width}x{height} px is too large to resample; check the physical dimensions")]
    TargetTooLarge { width: usize, height: usize },
}

pub struct RasterLoader;

impl RasterLoader {
    /// Decode an image file of any supported format into 8-bit grayscale.
    pub fn load(path: impl AsRef<Path>) -> Result<GrayImage, ImageLoadError> {
        let path = path.as_ref();
        let reader = ImageReader::open(path)
            .and_then(ImageReader::with_guessed_format)
            .map_err(|source| ImageLoadError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let image = reader.decode()?;
        debug!(
            path = %path.display(),
            width = image.width(),
            height = image.height(),
            "Decoded source image"
        );
        Ok(Self::to_grayscale(&image))
    }

    /// Perceptual (ITU-R 601-2) luma, ignoring any alpha channel.
    pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
        if let DynamicImage::ImageLuma8(gray) = image {
            return gray.clone();
        }
        let rgb = image.to_rgb8();
        GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let [r, g, b] = rgb.get_pixel(x, y).0;
            Luma([Self::luma(r, g, b)])
        })
    }

    #[inline]
    fn luma(r: u8, g: u8, b: u8) -> u8 {
        // 0.299 R + 0.587 G + 0.114 B in 16.16 fixed point, rounded
        let weighted = r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000;
        (weighted >> 16) as u8
    }
}
