//! Command-line arguments and the validated pipeline configuration.
//!
//! [`Cli`] is what the binary parses; [`PipelineConfig`] is the plain value
//! the library consumes. Conversion validates every parameter up front so
//! a bad invocation fails before any file is touched.

use crate::enums::Interpolation;
use crate::geometry::PhysicalSize;

use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

/// Default number of posterization bands.
pub const DEFAULT_BAND_COUNT: usize = 5;

/// Default directory for preview PNGs.
pub const DEFAULT_PREVIEW_DIR: &str = "preview";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Band count must be at least 1")]
    NoBands,

    #[error("{name} must be a positive number of centimeters, got {value}")]
    InvalidDimension { name: &'static str, value: f64 },
}

/// Posterize a film scan into a DICOM RT Structure Set.
///
/// The image is scaled to its physical size, split into gray-level bands
/// and each band is embedded as one structure on the reference CT grid.
#[derive(Parser, Debug, Clone)]
#[command(name = "dicom-posterize")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Image of the dose pattern (PNG, JPEG, TIFF, ...).
    pub image: PathBuf,

    /// Directory holding the reference CT series.
    #[arg(short, long)]
    pub reference: PathBuf,

    /// Directory the structure set is written to.
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Number of gray-level bands.
    #[arg(short, long, default_value_t = DEFAULT_BAND_COUNT)]
    pub bands: usize,

    /// Pattern width along the patient left-right axis, in cm.
    #[arg(long)]
    pub sagittal: f64,

    /// Pattern height along the head-feet axis, in cm.
    #[arg(long)]
    pub axial: f64,

    /// Thickness the pattern is extruded to, anterior-posterior, in cm.
    #[arg(long)]
    pub coronal: f64,

    /// Resampling filter for scaling the image.
    #[arg(long, value_enum, default_value_t = Interpolation::default())]
    pub interpolation: Interpolation,

    /// Drop contour vertices where the boundary runs straight on.
    #[arg(long, default_value_t = false)]
    pub approximate_contours: bool,

    /// Write every band mask as a PNG before it is encoded.
    #[arg(long, default_value_t = false)]
    pub preview: bool,

    /// Where preview PNGs go.
    #[arg(long, default_value = DEFAULT_PREVIEW_DIR)]
    pub preview_dir: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    pub fn into_config(self) -> Result<PipelineConfig, ConfigError> {
        let config = PipelineConfig {
            image: self.image,
            reference: self.reference,
            output: self.output,
            band_count: self.bands,
            size: PhysicalSize {
                sagittal_cm: self.sagittal,
                axial_cm: self.axial,
                coronal_cm: self.coronal,
            },
            interpolation: self.interpolation,
            approximate_contours: self.approximate_contours,
            preview: self.preview,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Everything one posterization run needs.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub image: PathBuf,
    pub reference: PathBuf,
    pub output: PathBuf,
    pub band_count: usize,
    pub size: PhysicalSize,
    pub interpolation: Interpolation,
    pub approximate_contours: bool,
    pub preview: bool,
}

impl PipelineConfig {
    pub fn new(
        image: impl Into<PathBuf>,
        reference: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        band_count: usize,
        size: PhysicalSize,
    ) -> Self {
        Self {
            image: image.into(),
            reference: reference.into(),
            output: output.into(),
            band_count,
            size,
            interpolation: Interpolation::default(),
            approximate_contours: false,
            preview: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.band_count == 0 {
            return Err(ConfigError::NoBands);
        }
        let dimensions = [
            ("sagittal", self.size.sagittal_cm),
            ("axial", self.size.axial_cm),
            ("coronal", self.size.coronal_cm),
        ];
        for (name, value) in dimensions {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidDimension { name, value });
            }
        }
        Ok(())
    }
}
