//! End-to-end posterization: reference series, image, bands, structure set.

use crate::config::{ConfigError, PipelineConfig};
use crate::geometry::{SeriesGeometry, TargetPixels};
use crate::posterizer::{BandObserver, Posterizer};
use crate::raster::{ImageLoadError, RasterLoader};
use crate::rtstruct::RtStructBuilder;
use crate::series_loader::{ReferenceSeries, SeriesLoader, SeriesLoaderError};
use crate::structure::{RegionSummary, StructureEncoder, StructureSetBuilder};
use crate::volume::{EmbedError, EmbeddingWindow, VolumeEmbedder};

use std::{
    fs,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use thiserror::Error;
use tracing::{debug, info};
use web_time::Instant;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Series(#[from] SeriesLoaderError),

    #[error(transparent)]
    Image(#[from] ImageLoadError),

    #[error(transparent)]
    Embed(#[from] EmbedError),

    #[error("Failed to encode structure set: {0}")]
    Encode(#[source] BoxError),

    #[error("Failed to prepare output directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled")]
    Cancelled,
}

impl PipelineError {
    fn encode<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Self::Encode(Box::new(error))
    }
}

/// Shared flag a caller sets to stop a running pipeline between bands.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

/// What a successful run produced.
#[derive(Clone, Debug)]
pub struct PipelineReport {
    pub geometry: SeriesGeometry,
    pub target: TargetPixels,
    pub window: EmbeddingWindow,
    pub regions: Vec<RegionSummary>,
    /// Bands without any voxel, by name.
    pub skipped: Vec<String>,
    pub output: PathBuf,
}

pub struct Pipeline {
    config: PipelineConfig,
    observer: Option<Box<dyn BandObserver + Send>>,
    cancellation: CancellationFlag,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            observer: None,
            cancellation: CancellationFlag::default(),
        }
    }

    /// Receives every band mask when preview is enabled.
    pub fn with_observer(mut self, observer: impl BandObserver + Send + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationFlag) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run and write a DICOM RT Structure Set.
    pub fn run(&mut self) -> Result<PipelineReport, PipelineError> {
        self.run_with(RtStructBuilder::new)
    }

    /// Run with a custom structure set builder, created once the reference
    /// series is known.
    ///
    /// Nothing is written unless every band was encoded.
    pub fn run_with<B, F>(&mut self, make_builder: F) -> Result<PipelineReport, PipelineError>
    where
        B: StructureSetBuilder,
        F: FnOnce(&ReferenceSeries) -> Result<B, B::Error>,
    {
        let started = Instant::now();
        self.config.validate()?;
        self.cancellation.check()?;

        let stage = Instant::now();
        let series = SeriesLoader::load_from_directory(&self.config.reference)?;
        let geometry = series.geometry().clone();
        debug!(elapsed = ?stage.elapsed(), "Loaded reference series");

        let stage = Instant::now();
        let image = RasterLoader::load(&self.config.image)?;
        let target = geometry.target_pixels(&self.config.size);
        info!(
            width = image.width(),
            height = image.height(),
            sagittal = target.sagittal,
            axial = target.axial,
            coronal = target.coronal,
            "Scaling image to grid"
        );
        self.cancellation.check()?;

        let posterizer =
            Posterizer::new(self.config.band_count).with_interpolation(self.config.interpolation);
        let observer = match (self.config.preview, self.observer.as_deref_mut()) {
            (true, Some(observer)) => Some(observer as &mut dyn BandObserver),
            _ => None,
        };
        let masks = posterizer.posterize(&image, &target, &geometry, observer)?;
        debug!(elapsed = ?stage.elapsed(), bands = masks.len(), "Posterized image");

        let stage = Instant::now();
        let embedder = VolumeEmbedder::new(&geometry, target.coronal);
        let builder = make_builder(&series).map_err(PipelineError::encode)?;
        let mut encoder = StructureEncoder::new(builder, posterizer.band_count())
            .with_approximate_contours(self.config.approximate_contours);
        // one dense volume alive at a time
        for mask in &masks {
            self.cancellation.check()?;
            let volume = embedder.embed(mask)?;
            encoder
                .encode(mask.index(), &volume)
                .map_err(PipelineError::encode)?;
        }
        self.cancellation.check()?;
        debug!(elapsed = ?stage.elapsed(), "Encoded bands");

        fs::create_dir_all(&self.config.output)?;
        let encoded = encoder
            .finish(&self.config.output)
            .map_err(PipelineError::encode)?;
        info!(
            output = %encoded.path.display(),
            regions = encoded.regions.len(),
            skipped = encoded.skipped.len(),
            elapsed = ?started.elapsed(),
            "Posterization finished"
        );

        Ok(PipelineReport {
            geometry,
            target,
            window: embedder.window().clone(),
            regions: encoded.regions,
            skipped: encoded.skipped,
            output: encoded.path,
        })
    }
}
