//! # DICOM posterize library
//!
//! Turns a scanned dose pattern (for example a radiochromic film) into a
//! DICOM RT Structure Set on the grid of a reference CT series.
//!
//! The image is scaled to its physical size, centered on the coronal
//! plane of the reference grid and split into gray-level bands. Each band
//! is extruded anterior-posterior through a slab of the requested
//! thickness at the middle of the scan and written as one structure,
//! darkest band first. DICOM files of the reference series are assumed to
//! have the following attributes:
//!   - Axial slices in head-first-supine orientation
//!   - The same rows × columns on every slice
//!   - Images from the same series (Series Instance UID)
//!
//! # Examples
//!
//! ## Posterizing a film into five structures
//!
//! ```no_run
//! # use dicom_posterize::{PhysicalSize, Pipeline, PipelineConfig};
//! let config = PipelineConfig::new(
//!     "film.png",
//!     "ct/",
//!     "out/",
//!     5,
//!     PhysicalSize { sagittal_cm: 10.0, axial_cm: 5.0, coronal_cm: 1.0 },
//! );
//! let report = Pipeline::new(config)
//!     .run()
//!     .expect("should have written the structure set");
//! for region in &report.regions {
//!     println!("{} {:?} {} voxels", region.name, region.color, region.voxels);
//! }
//! ```
//!
//! ## Inspecting the bands without writing DICOM
//!
//! ```no_run
//! # use dicom_posterize::{Posterizer, RasterLoader, SeriesLoader, PhysicalSize};
//! let series = SeriesLoader::load_from_directory("ct/")
//!     .expect("should have loaded the reference series");
//! let image = RasterLoader::load("film.png").expect("should have decoded the image");
//! let size = PhysicalSize { sagittal_cm: 10.0, axial_cm: 5.0, coronal_cm: 1.0 };
//! let target = series.geometry().target_pixels(&size);
//! let masks = Posterizer::new(3)
//!     .posterize(&image, &target, series.geometry(), None)
//!     .expect("should have posterized the image");
//! masks[0].to_display_image().save("darkest.png").expect("should have saved");
//! ```

pub mod config;
mod contour;
pub mod enums;
pub mod geometry;
mod interpolator;
pub mod pipeline;
pub mod posterizer;
pub mod raster;
pub mod rtstruct;
pub mod series_loader;
pub mod structure;
pub mod volume;

pub use config::{Cli, ConfigError, PipelineConfig};
pub use enums::{Axis, Interpolation};
pub use geometry::{GeometryError, PhysicalSize, SeriesGeometry, Slice, TargetPixels};
pub use pipeline::{CancellationFlag, Pipeline, PipelineError, PipelineReport};
pub use posterizer::{Band, BandMask2D, BandObserver, Posterizer};
pub use raster::{ImageLoadError, RasterLoader};
pub use rtstruct::{RtStructBuilder, RtStructError};
pub use series_loader::{
    ReferenceSeries, SeriesIdentity, SeriesLoader, SeriesLoaderError, SliceCandidate,
};
pub use structure::{
    BandLabel, EncodedStructureSet, Region, RegionSummary, StructureEncoder, StructureSetBuilder,
};
pub use volume::{EmbedError, EmbeddingWindow, VolumeEmbedder, VolumeMask3D};
