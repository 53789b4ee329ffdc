//! Reference grid geometry.
//!
//! A [`SeriesGeometry`] summarizes a validated, sorted collection of
//! [`Slice`]s. Only the head-first-supine orientation is accepted: the
//! image orientation cosines of the first slice must lie within
//! [`ORIENTATION_TOLERANCE`] (Euclidean distance) of [`HFS_ORIENTATION`].

use thiserror::Error;

/// Row and column direction cosines of an axis-aligned head-first-supine scan.
pub const HFS_ORIENTATION: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

pub const ORIENTATION_TOLERANCE: f64 = 0.1;

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("No slices to derive a geometry from")]
    Empty,

    #[error(
        "Image orientation {found:?} is {distance:.3} away from head-first-supine {expected:?}; \
         only HFS scans are supported"
    )]
    NonCanonicalOrientation {
        found: [f64; 6],
        expected: [f64; 6],
        distance: f64,
    },

    #[error("{name} must be a positive number of millimeters, got {value}")]
    InvalidSpacing { name: &'static str, value: f64 },

    #[error("Inconsistent slice dimensions: expected {expected:?}, found {found:?}")]
    InconsistentDimensions {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

/// One parsed image of the reference series.
#[derive(Clone, Debug, PartialEq)]
pub struct Slice {
    pub sop_instance_uid: String,
    /// ImagePositionPatient, center of the first transmitted pixel (mm).
    pub position: [f64; 3],
    /// PixelSpacing as stored: `[row spacing, column spacing]` (mm).
    pub pixel_spacing: [f64; 2],
    pub slice_thickness: f64,
    pub orientation: [f64; 6],
    pub rows: usize,
    pub columns: usize,
}

impl Slice {
    /// Patient coordinate of a (possibly fractional) column/row index on this slice.
    pub fn patient_point(&self, column: f64, row: f64) -> [f64; 3] {
        let [rx, ry, rz, cx, cy, cz] = self.orientation;
        let dx = column * self.pixel_spacing[1];
        let dy = row * self.pixel_spacing[0];
        [
            self.position[0] + rx * dx + cx * dy,
            self.position[1] + ry * dx + cy * dy,
            self.position[2] + rz * dx + cz * dy,
        ]
    }
}

/// Physical extent of the pattern, in centimeters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicalSize {
    /// Width along the patient left-right axis.
    pub sagittal_cm: f64,
    /// Height along the patient head-feet axis.
    pub axial_cm: f64,
    /// Thickness along the patient anterior-posterior axis.
    pub coronal_cm: f64,
}

/// [`PhysicalSize`] expressed in grid cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetPixels {
    pub sagittal: usize,
    pub axial: usize,
    pub coronal: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SeriesGeometry {
    pub rows: usize,
    pub columns: usize,
    pub slice_count: usize,
    pub pixel_spacing: [f64; 2],
    pub slice_thickness: f64,
    pub orientation: [f64; 6],
}

impl SeriesGeometry {
    /// Derive the geometry of slices already sorted by position.
    ///
    /// The first slice provides spacing, thickness and orientation.
    pub fn from_sorted_slices(slices: &[Slice]) -> Result<Self, GeometryError> {
        let first = slices.first().ok_or(GeometryError::Empty)?;
        validate_orientation(&first.orientation)?;
        validate_spacing("PixelSpacing", first.pixel_spacing[0])?;
        validate_spacing("PixelSpacing", first.pixel_spacing[1])?;
        validate_spacing("SliceThickness", first.slice_thickness)?;

        let expected = (first.rows, first.columns);
        if let Some(slice) = slices
            .iter()
            .find(|slice| (slice.rows, slice.columns) != expected)
        {
            return Err(GeometryError::InconsistentDimensions {
                expected,
                found: (slice.rows, slice.columns),
            });
        }

        Ok(Self {
            rows: first.rows,
            columns: first.columns,
            slice_count: slices.len(),
            pixel_spacing: first.pixel_spacing,
            slice_thickness: first.slice_thickness,
            orientation: first.orientation,
        })
    }

    /// Grid shape as `(columns, rows, slices)`, the layout of every volume mask.
    pub fn grid_shape(&self) -> (usize, usize, usize) {
        (self.columns, self.rows, self.slice_count)
    }

    /// Shape of the coronal plane `(columns, slices)` that band masks live on.
    pub fn coronal_plane(&self) -> (usize, usize) {
        (self.columns, self.slice_count)
    }

    /// Convert a physical size to grid cells with truncating arithmetic.
    ///
    /// Sagittal width is measured in column spacing, axial height in slice
    /// thickness and coronal thickness in row spacing.
    pub fn target_pixels(&self, size: &PhysicalSize) -> TargetPixels {
        TargetPixels {
            sagittal: cells(size.sagittal_cm, self.pixel_spacing[1]),
            axial: cells(size.axial_cm, self.slice_thickness),
            coronal: cells(size.coronal_cm, self.pixel_spacing[0]),
        }
    }
}

#[inline]
fn cells(extent_cm: f64, spacing_mm: f64) -> usize {
    // `as` saturates: negative and NaN become 0, +inf becomes usize::MAX
    (extent_cm * 10.0 / spacing_mm).floor() as usize
}

/// A spacing is usable when it is finite and strictly positive.
pub fn validate_spacing(name: &'static str, value: f64) -> Result<(), GeometryError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(GeometryError::InvalidSpacing { name, value })
    }
}

pub fn orientation_distance(orientation: &[f64; 6]) -> f64 {
    orientation
        .iter()
        .zip(HFS_ORIENTATION.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}

pub fn validate_orientation(orientation: &[f64; 6]) -> Result<(), GeometryError> {
    let distance = orientation_distance(orientation);
    // NaN components must fail as well
    if distance <= ORIENTATION_TOLERANCE {
        Ok(())
    } else {
        Err(GeometryError::NonCanonicalOrientation {
            found: *orientation,
            expected: HFS_ORIENTATION,
            distance,
        })
    }
}

#[cfg(test)]
pub(crate) fn test_slice(z: f64, rows: usize, columns: usize) -> Slice {
    Slice {
        sop_instance_uid: format!("1.2.826.0.1.3680043.2.1125.{}", (z * 10.0) as i64 + 1000),
        position: [-(columns as f64) / 2.0, -(rows as f64) / 2.0, z],
        pixel_spacing: [1.0, 1.0],
        slice_thickness: 1.0,
        orientation: HFS_ORIENTATION,
        rows,
        columns,
    }
}
