//! Naming, coloring and emission of one region per band.

use crate::volume::VolumeMask3D;

use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Film color where no dose was delivered.
pub const UNEXPOSED_COLOR: [u8; 3] = [165, 154, 89];
/// Film color at full dose.
pub const EXPOSED_COLOR: [u8; 3] = [62, 69, 58];

pub const REGION_DESCRIPTION: &str = "Posterized dose pattern";
pub const OUTPUT_FILE_NAME: &str = "powerstructs.dcm";

/// Display metadata of band `index` out of `count`.
///
/// Names and colors round half to even.
#[derive(Clone, Debug, PartialEq)]
pub struct BandLabel {
    /// `(count - index) / count`: 1.0 for the darkest band, `1 / count` for the lightest.
    pub weight: f64,
    pub name: String,
    pub color: [u8; 3],
}

impl BandLabel {
    pub fn for_band(index: usize, count: usize) -> Self {
        let weight = count.saturating_sub(index) as f64 / count.max(1) as f64;
        let color = std::array::from_fn(|channel| {
            let unexposed = f64::from(UNEXPOSED_COLOR[channel]);
            let exposed = f64::from(EXPOSED_COLOR[channel]);
            ((1.0 - weight) * unexposed + weight * exposed).round_ties_even() as u8
        });
        Self {
            weight,
            name: format!("{} Dark", (weight * 1000.0).round_ties_even() as u32),
            color,
        }
    }
}

/// One structure to persist.
#[derive(Clone, Debug)]
pub struct Region<'a> {
    pub mask: &'a VolumeMask3D,
    pub name: String,
    pub color: [u8; 3],
    pub description: &'a str,
    /// Merge collinear boundary vertices instead of keeping every voxel edge.
    pub approximate_contours: bool,
}

/// Turns masks into a persisted structure set.
pub trait StructureSetBuilder {
    type Error: std::error::Error + Send + Sync + 'static;

    fn add_region(&mut self, region: Region<'_>) -> Result<(), Self::Error>;

    /// Write every added region to `path` in one go.
    fn save(self, path: &Path) -> Result<(), Self::Error>;
}

/// Summary of an emitted region.
#[derive(Clone, Debug, PartialEq)]
pub struct RegionSummary {
    pub band: usize,
    pub name: String,
    pub color: [u8; 3],
    pub voxels: usize,
}

/// What [`StructureEncoder::finish`] persisted.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedStructureSet {
    pub regions: Vec<RegionSummary>,
    /// Names of bands left out because their mask was empty.
    pub skipped: Vec<String>,
    pub path: PathBuf,
}

pub struct StructureEncoder<B> {
    builder: B,
    band_count: usize,
    approximate_contours: bool,
    emitted: Vec<RegionSummary>,
    skipped: Vec<String>,
}

impl<B: StructureSetBuilder> StructureEncoder<B> {
    pub fn new(builder: B, band_count: usize) -> Self {
        Self {
            builder,
            band_count,
            approximate_contours: false,
            emitted: Vec::with_capacity(band_count),
            skipped: Vec::new(),
        }
    }

    /// Trade exact voxel contours for fewer vertices. Off by default.
    pub fn with_approximate_contours(mut self, approximate: bool) -> Self {
        self.approximate_contours = approximate;
        self
    }

    /// Add the region for band `index`, skipping it when the mask is empty.
    ///
    /// Returns whether a region was emitted.
    pub fn encode(&mut self, index: usize, mask: &VolumeMask3D) -> Result<bool, B::Error> {
        let label = BandLabel::for_band(index, self.band_count);
        let voxels = mask.voxel_count();
        if voxels == 0 {
            warn!(name = %label.name, "Empty mask, skipping");
            self.skipped.push(label.name);
            return Ok(false);
        }

        self.builder.add_region(Region {
            mask,
            name: label.name.clone(),
            color: label.color,
            description: REGION_DESCRIPTION,
            approximate_contours: self.approximate_contours,
        })?;
        info!(name = %label.name, color = ?label.color, voxels, "Added region");
        self.emitted.push(RegionSummary {
            band: index,
            name: label.name,
            color: label.color,
            voxels,
        });
        Ok(true)
    }

    pub fn encode_all(&mut self, masks: &[VolumeMask3D]) -> Result<usize, B::Error> {
        let mut emitted = 0;
        for (index, mask) in masks.iter().enumerate() {
            emitted += usize::from(self.encode(index, mask)?);
        }
        Ok(emitted)
    }

    /// Persist under [`OUTPUT_FILE_NAME`] inside `directory`.
    pub fn finish(self, directory: &Path) -> Result<EncodedStructureSet, B::Error> {
        let path = directory.join(OUTPUT_FILE_NAME);
        self.builder.save(&path)?;
        info!(path = %path.display(), regions = self.emitted.len(), "Saved structure set");
        Ok(EncodedStructureSet {
            regions: self.emitted,
            skipped: self.skipped,
            path,
        })
    }
}
