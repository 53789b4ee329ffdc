use crate::geometry::{GeometryError, SeriesGeometry, Slice};

use dicom::core::Tag;
use dicom::object::file::ReadPreamble;
use dicom::object::{FileDicomObject, InMemDicomObject, OpenFileOptions};
use dicom_dictionary_std::tags;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SeriesLoaderError {
    #[error("No valid DICOM slices found in {0}")]
    NoValidSlices(PathBuf),

    #[error("Invalid reference geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of inspecting one candidate file.
#[derive(Debug)]
pub enum SliceCandidate {
    Slice {
        slice: Box<Slice>,
        identity: Box<SeriesIdentity>,
    },
    NotASlice { path: PathBuf, reason: String },
}

/// Identity attributes copied into anything that references the series.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SeriesIdentity {
    pub sop_class_uid: String,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub frame_of_reference_uid: String,
    pub patient_name: String,
    pub patient_id: String,
    pub patient_birth_date: String,
    pub patient_sex: String,
    pub study_date: String,
    pub study_time: String,
    pub study_id: String,
    pub accession_number: String,
    pub referring_physician_name: String,
}

/// A validated reference scan: slices sorted by ascending axial position.
#[derive(Clone, Debug)]
pub struct ReferenceSeries {
    slices: Vec<Slice>,
    geometry: SeriesGeometry,
    identity: SeriesIdentity,
    excluded: Vec<(PathBuf, String)>,
}

impl ReferenceSeries {
    /// Build a series from already parsed slices.
    pub fn new(
        mut slices: Vec<Slice>,
        identity: SeriesIdentity,
    ) -> Result<Self, SeriesLoaderError> {
        if slices.is_empty() {
            return Err(SeriesLoaderError::NoValidSlices(PathBuf::new()));
        }
        SeriesLoader::sort_slices(&mut slices);
        let geometry = SeriesGeometry::from_sorted_slices(&slices)?;
        Ok(Self {
            slices,
            geometry,
            identity,
            excluded: Vec::new(),
        })
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn geometry(&self) -> &SeriesGeometry {
        &self.geometry
    }

    pub fn identity(&self) -> &SeriesIdentity {
        &self.identity
    }

    /// Candidates that were skipped while loading, with the reason.
    pub fn excluded(&self) -> &[(PathBuf, String)] {
        &self.excluded
    }
}

pub struct SeriesLoader;

impl SeriesLoader {
    /// Load the reference series from every file in a directory.
    ///
    /// Files that are not DICOM, or that lack the attributes of an image
    /// slice, are skipped without error.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be read, no usable slice is
    /// found, or the geometry is not head-first-supine.
    pub fn load_from_directory(path: impl AsRef<Path>) -> Result<ReferenceSeries, SeriesLoaderError> {
        let path = path.as_ref();
        let mut paths: Vec<_> = fs::read_dir(path)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let candidates = paths
            .into_iter()
            .map(|path| {
                match OpenFileOptions::new()
                    .read_preamble(ReadPreamble::Auto)
                    .read_until(tags::PIXEL_DATA)
                    .open_file(&path)
                {
                    Ok(object) => Self::inspect(path, &object),
                    Err(e) => SliceCandidate::NotASlice {
                        path,
                        reason: e.to_string(),
                    },
                }
            })
            .collect();

        Self::assemble(path, candidates)
    }

    /// Load the reference series from DICOM objects already in memory.
    pub fn load_from_dicom_objects(
        objects: &[(PathBuf, FileDicomObject<InMemDicomObject>)],
    ) -> Result<ReferenceSeries, SeriesLoaderError> {
        let candidates = objects
            .iter()
            .map(|(path, object)| Self::inspect(path.clone(), object))
            .collect();
        Self::assemble(Path::new(""), candidates)
    }

    /// Classify a parsed object as a usable slice or not.
    pub fn inspect(path: PathBuf, object: &FileDicomObject<InMemDicomObject>) -> SliceCandidate {
        match Self::extract_slice(object) {
            Ok(slice) => SliceCandidate::Slice {
                slice: Box::new(slice),
                identity: Box::new(Self::extract_identity(object)),
            },
            Err(missing) => SliceCandidate::NotASlice {
                path,
                reason: format!("missing or invalid {missing}"),
            },
        }
    }

    fn assemble(
        origin: &Path,
        candidates: Vec<SliceCandidate>,
    ) -> Result<ReferenceSeries, SeriesLoaderError> {
        let mut parsed = Vec::with_capacity(candidates.len());
        let mut excluded = Vec::new();

        for candidate in candidates {
            match candidate {
                SliceCandidate::Slice { slice, identity } => parsed.push((*slice, identity)),
                SliceCandidate::NotASlice { path, reason } => {
                    debug!(path = %path.display(), %reason, "Skipping candidate");
                    excluded.push((path, reason));
                }
            }
        }

        parsed.sort_by(|(a, _), (b, _)| Self::compare_position(a, b));
        let Some(identity) = parsed.first().map(|(_, identity)| (**identity).clone()) else {
            return Err(SeriesLoaderError::NoValidSlices(origin.to_path_buf()));
        };
        let slices: Vec<_> = parsed.into_iter().map(|(slice, _)| slice).collect();
        let geometry = SeriesGeometry::from_sorted_slices(&slices)?;

        info!(
            slices = slices.len(),
            excluded = excluded.len(),
            rows = geometry.rows,
            columns = geometry.columns,
            "Loaded reference series"
        );

        Ok(ReferenceSeries {
            slices,
            geometry,
            identity,
            excluded,
        })
    }

    fn sort_slices(slices: &mut [Slice]) {
        slices.sort_by(Self::compare_position);
    }

    fn compare_position(a: &Slice, b: &Slice) -> std::cmp::Ordering {
        a.position[2]
            .partial_cmp(&b.position[2])
            .unwrap_or(std::cmp::Ordering::Equal)
    }

    fn extract_slice(object: &InMemDicomObject) -> Result<Slice, &'static str> {
        let position = Self::floats::<3>(object, tags::IMAGE_POSITION_PATIENT)
            .ok_or("ImagePositionPatient")?;
        let pixel_spacing = Self::floats::<2>(object, tags::PIXEL_SPACING)
            .filter(|spacing| spacing.iter().all(|&v| positive(v)))
            .ok_or("PixelSpacing")?;
        let orientation = Self::floats::<6>(object, tags::IMAGE_ORIENTATION_PATIENT)
            .ok_or("ImageOrientationPatient")?;
        let slice_thickness = object
            .element(tags::SLICE_THICKNESS)
            .ok()
            .and_then(|e| e.to_float64().ok())
            .filter(|&v| positive(v))
            .ok_or("SliceThickness")?;
        let rows = Self::dimension(object, tags::ROWS).ok_or("Rows")?;
        let columns = Self::dimension(object, tags::COLUMNS).ok_or("Columns")?;
        let sop_instance_uid =
            Self::string(object, tags::SOP_INSTANCE_UID).ok_or("SOPInstanceUID")?;

        Ok(Slice {
            sop_instance_uid,
            position,
            pixel_spacing,
            slice_thickness,
            orientation,
            rows,
            columns,
        })
    }

    fn extract_identity(object: &InMemDicomObject) -> SeriesIdentity {
        let text = |tag| Self::string(object, tag).unwrap_or_default();
        SeriesIdentity {
            sop_class_uid: text(tags::SOP_CLASS_UID),
            study_instance_uid: text(tags::STUDY_INSTANCE_UID),
            series_instance_uid: text(tags::SERIES_INSTANCE_UID),
            frame_of_reference_uid: text(tags::FRAME_OF_REFERENCE_UID),
            patient_name: text(tags::PATIENT_NAME),
            patient_id: text(tags::PATIENT_ID),
            patient_birth_date: text(tags::PATIENT_BIRTH_DATE),
            patient_sex: text(tags::PATIENT_SEX),
            study_date: text(tags::STUDY_DATE),
            study_time: text(tags::STUDY_TIME),
            study_id: text(tags::STUDY_ID),
            accession_number: text(tags::ACCESSION_NUMBER),
            referring_physician_name: text(tags::REFERRING_PHYSICIAN_NAME),
        }
    }

    fn floats<const N: usize>(object: &InMemDicomObject, tag: Tag) -> Option<[f64; N]> {
        let values = object.element(tag).ok()?.to_multi_float64().ok()?;
        values.get(..N)?.try_into().ok()
    }

    fn dimension(object: &InMemDicomObject, tag: Tag) -> Option<usize> {
        let value = object.element(tag).ok()?.to_int::<u32>().ok()?;
        (value > 0).then_some(value as usize)
    }

    fn string(object: &InMemDicomObject, tag: Tag) -> Option<String> {
        let value = object.element(tag).ok()?.to_str().ok()?;
        let value = value.trim_end_matches(['\0', ' ']).trim();
        (!value.is_empty()).then(|| value.to_string())
    }
}

fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}
