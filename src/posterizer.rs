//! Intensity banding of the source image on the reference coronal plane.
//!
//! The grayscale image is resampled to its physical size in grid cells,
//! mirrored vertically so that image rows run from inferior to superior,
//! centered on a white canvas spanning the coronal plane of the reference
//! grid (columns x slices) and transposed so that masks are indexed
//! `[column, slice]`. The canvas is then split into `N` equal-width
//! intensity bands over `[0, 255]`; the last band is closed so that every
//! pixel lands in exactly one band.

use crate::enums::Interpolation;
use crate::geometry::{SeriesGeometry, TargetPixels};
use crate::interpolator::Interpolator;
use crate::raster::ImageLoadError;

use image::{GrayImage, Luma, imageops};
use ndarray::{Array2, ArrayView2, Zip};
use tracing::{debug, warn};

/// Canvas value outside the pasted image: unexposed film.
pub const BACKGROUND: u8 = 255;

/// Largest resampled image accepted, in pixels (256 MiB of 8-bit gray).
pub const MAX_TARGET_PIXELS: usize = 1 << 28;

/// One half-open intensity interval `[lower, upper)`, closed on top when `closed`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Band {
    pub index: usize,
    pub lower: f64,
    pub upper: f64,
    pub closed: bool,
}

impl Band {
    /// Split `[0, 255]` into `count` equal-width bands, darkest first.
    pub fn partition(count: usize) -> Vec<Band> {
        let threshold = |i: usize| f64::from(BACKGROUND) * i as f64 / count as f64;
        (0..count)
            .map(|index| Band {
                index,
                lower: threshold(index),
                upper: threshold(index + 1),
                closed: index + 1 == count,
            })
            .collect()
    }

    #[inline]
    pub fn contains(&self, intensity: u8) -> bool {
        let value = f64::from(intensity);
        self.lower <= value && (value < self.upper || (self.closed && value <= self.upper))
    }
}

/// Pixels of the coronal plane that fall into one intensity band.
#[derive(Clone, Debug, PartialEq)]
pub struct BandMask2D {
    pub band: Band,
    /// Shape `(columns, slices)`, slice index increasing superiorly.
    pub data: Array2<bool>,
}

impl BandMask2D {
    pub fn index(&self) -> usize {
        self.band.index
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn pixel_count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    /// Render the mask the way the source image is displayed: superior at
    /// the top, patient right on the left, white where the band is present.
    pub fn to_display_image(&self) -> GrayImage {
        let (columns, slices) = self.data.dim();
        GrayImage::from_fn(columns as u32, slices as u32, |x, y| {
            let z = slices - 1 - y as usize;
            Luma([if self.data[[x as usize, z]] { 255 } else { 0 }])
        })
    }
}

/// Receives each band mask as soon as it is produced.
pub trait BandObserver {
    fn on_band(&mut self, mask: &BandMask2D, total: usize);
}

impl<F> BandObserver for F
where
    F: FnMut(&BandMask2D, usize),
{
    fn on_band(&mut self, mask: &BandMask2D, total: usize) {
        self(mask, total)
    }
}

pub struct Posterizer {
    band_count: usize,
    interpolation: Interpolation,
}

impl Posterizer {
    pub fn new(band_count: usize) -> Self {
        Self {
            band_count: band_count.max(1),
            interpolation: Interpolation::default(),
        }
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Produce one mask per band, darkest band first.
    ///
    /// The observer, if any, sees each mask before the next one is computed.
    pub fn posterize(
        &self,
        image: &GrayImage,
        target: &TargetPixels,
        geometry: &SeriesGeometry,
        mut observer: Option<&mut dyn BandObserver>,
    ) -> Result<Vec<BandMask2D>, ImageLoadError> {
        let canvas = self.canvas(image, target, geometry)?;
        let bands = Band::partition(self.band_count);
        let total = bands.len();

        let mut masks = Vec::with_capacity(total);
        for band in bands {
            let mask = Self::threshold(canvas.view(), band);
            debug!(
                band = band.index,
                lower = band.lower,
                upper = band.upper,
                pixels = mask.pixel_count(),
                "Posterized band"
            );
            if let Some(observer) = observer.as_deref_mut() {
                observer.on_band(&mask, total);
            }
            masks.push(mask);
        }
        Ok(masks)
    }

    /// Resample, mirror, center and transpose the image onto the coronal plane.
    ///
    /// The result has shape `(columns, slices)`.
    pub fn canvas(
        &self,
        image: &GrayImage,
        target: &TargetPixels,
        geometry: &SeriesGeometry,
    ) -> Result<Array2<u8>, ImageLoadError> {
        let (width, height) = Self::target_size(target)?;
        let resized = Interpolator::resample(image, width, height, self.interpolation)?;
        let mirrored = imageops::flip_vertical(&resized);

        let (columns, slices) = geometry.coronal_plane();
        let mut canvas = GrayImage::from_pixel(columns as u32, slices as u32, Luma([BACKGROUND]));
        let x = centered_offset(canvas.width(), mirrored.width());
        let y = centered_offset(canvas.height(), mirrored.height());
        if mirrored.width() > canvas.width() || mirrored.height() > canvas.height() {
            warn!(
                image_width = mirrored.width(),
                image_height = mirrored.height(),
                columns,
                slices,
                "Image is larger than the reference plane and will be cropped"
            );
        }
        imageops::replace(&mut canvas, &mirrored, x, y);

        // (slices, columns) in raster order, transposed to (columns, slices)
        let raster = Array2::from_shape_vec((slices, columns), canvas.into_raw())
            .map_err(|_| ImageLoadError::EmptyTarget { width, height })?;
        Ok(raster.reversed_axes())
    }

    fn target_size(target: &TargetPixels) -> Result<(u32, u32), ImageLoadError> {
        let too_large = ImageLoadError::TargetTooLarge {
            width: target.sagittal,
            height: target.axial,
        };
        match target.sagittal.checked_mul(target.axial) {
            Some(pixels) if pixels <= MAX_TARGET_PIXELS => {}
            _ => return Err(too_large),
        }
        match (u32::try_from(target.sagittal), u32::try_from(target.axial)) {
            (Ok(width), Ok(height)) => Ok((width, height)),
            _ => Err(too_large),
        }
    }

    fn threshold(canvas: ArrayView2<'_, u8>, band: Band) -> BandMask2D {
        let mut data = Array2::from_elem(canvas.dim(), false);
        Zip::from(&mut data)
            .and(&canvas)
            .par_for_each(|inside, &intensity| *inside = band.contains(intensity));
        BandMask2D { band, data }
    }
}

/// Floor of `(outer - inner) / 2`, negative when the inner image overhangs.
#[inline]
fn centered_offset(outer: u32, inner: u32) -> i64 {
    (i64::from(outer) - i64::from(inner)).div_euclid(2)
}
