use crate::enums::Axis;
use crate::geometry::SeriesGeometry;
use crate::posterizer::BandMask2D;

use ndarray::{Array3, ArrayView2, Axis as NdAxis, s};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Band mask has shape {found:?} but the coronal plane is {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// A band mask replicated through the full reference grid.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeMask3D {
    pub band: usize,
    /// Shape `(columns, rows, slices)`.
    pub data: Array3<bool>,
}

impl VolumeMask3D {
    pub fn empty(band: usize, shape: (usize, usize, usize)) -> Self {
        Self {
            band,
            data: Array3::from_elem(shape, false),
        }
    }

    /// Get the dimensions of the volume (columns, rows, slices)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn voxel_count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    /// View one plane of the volume, or `None` when `index` is out of range.
    ///
    /// Axial planes are `(columns, rows)`, coronal `(columns, slices)` and
    /// sagittal `(rows, slices)`.
    pub fn slice(&self, index: usize, axis: Axis) -> Option<ArrayView2<'_, bool>> {
        if index >= self.data.len_of(Self::nd_axis(axis)) {
            return None;
        }
        let view = match axis {
            Axis::Axial => self.data.slice(s![.., .., index]),
            Axis::Coronal => self.data.slice(s![.., index, ..]),
            Axis::Sagittal => self.data.slice(s![index, .., ..]),
        };
        Some(view)
    }

    fn nd_axis(axis: Axis) -> NdAxis {
        match axis {
            Axis::Sagittal => NdAxis(0),
            Axis::Coronal => NdAxis(1),
            Axis::Axial => NdAxis(2),
        }
    }
}

/// Coronal row indices a band mask is replicated over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmbeddingWindow {
    indices: Vec<usize>,
    requested: usize,
}

impl EmbeddingWindow {
    /// `requested` rows stepping anteriorly from the grid midpoint `rows / 2`.
    ///
    /// Rows that would fall before index 0 are dropped.
    pub fn centered(rows: usize, requested: usize) -> Self {
        let midpoint = rows / 2;
        let indices = (0..requested)
            .map_while(|offset| midpoint.checked_sub(offset))
            .filter(|&row| row < rows)
            .collect();
        Self { indices, requested }
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether the grid was too small for the requested thickness.
    pub fn truncated(&self) -> bool {
        self.indices.len() < self.requested
    }
}

/// Lifts coronal band masks into volumes matching the reference grid.
///
/// Each mask is written into the coronal planes `data[.., row, ..]` for the
/// rows of the [`EmbeddingWindow`]; the window steps along the coronal
/// (anterior-posterior) axis.
pub struct VolumeEmbedder {
    shape: (usize, usize, usize),
    window: EmbeddingWindow,
}

impl VolumeEmbedder {
    pub fn new(geometry: &SeriesGeometry, thickness: usize) -> Self {
        let window = EmbeddingWindow::centered(geometry.rows, thickness);
        if window.truncated() {
            warn!(
                requested = thickness,
                available = window.len(),
                rows = geometry.rows,
                "Depth window exceeds the grid and was truncated"
            );
        }
        if window.is_empty() {
            warn!("Depth window is empty; every band will be empty");
        }
        Self {
            shape: geometry.grid_shape(),
            window,
        }
    }

    pub fn window(&self) -> &EmbeddingWindow {
        &self.window
    }

    pub fn embed(&self, mask: &BandMask2D) -> Result<VolumeMask3D, EmbedError> {
        let (columns, rows, slices) = self.shape;
        if mask.dim() != (columns, slices) {
            return Err(EmbedError::ShapeMismatch {
                expected: (columns, slices),
                found: mask.dim(),
            });
        }

        let mut volume = VolumeMask3D::empty(mask.index(), (columns, rows, slices));
        for &row in self.window.indices() {
            volume.data.slice_mut(s![.., row, ..]).assign(&mask.data);
        }
        debug!(band = mask.index(), rows = self.window.len(), "Embedded band");
        Ok(volume)
    }

    pub fn embed_all(&self, masks: &[BandMask2D]) -> Result<Vec<VolumeMask3D>, EmbedError> {
        masks.iter().map(|mask| self.embed(mask)).collect()
    }
}
