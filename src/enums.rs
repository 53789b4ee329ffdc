use clap::ValueEnum;
use image::imageops::FilterType;

/// Anatomical axes of the reference grid, assuming head-first-supine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    /// Slice index, inferior to superior.
    Axial,
    /// Row index, anterior to posterior.
    Coronal,
    /// Column index, patient right to left.
    Sagittal,
}

/// Resampling filter used to scale the raster to its physical size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Interpolation {
    Nearest,
    Bilinear,
    #[default]
    Bicubic,
    Lanczos3,
}

impl From<Interpolation> for FilterType {
    fn from(interpolation: Interpolation) -> Self {
        match interpolation {
            Interpolation::Nearest => FilterType::Nearest,
            Interpolation::Bilinear => FilterType::Triangle,
            Interpolation::Bicubic => FilterType::CatmullRom,
            Interpolation::Lanczos3 => FilterType::Lanczos3,
        }
    }
}
