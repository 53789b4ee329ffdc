use crate::enums::Interpolation;
use crate::raster::ImageLoadError;

use image::GrayImage;
use image::imageops;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Resample to exactly `width` x `height`, ignoring the source aspect ratio.
    pub(crate) fn resample(
        image: &GrayImage,
        width: u32,
        height: u32,
        interpolation: Interpolation,
    ) -> Result<GrayImage, ImageLoadError> {
        if width == 0 || height == 0 || image.width() == 0 || image.height() == 0 {
            return Err(ImageLoadError::EmptyTarget { width, height });
        }
        if image.dimensions() == (width, height) {
            return Ok(image.clone());
        }
        Ok(imageops::resize(image, width, height, interpolation.into()))
    }
}
