//! DICOM RT Structure Set encoding.
//!
//! [`RtStructBuilder`] collects one ROI per region, contoured slice by slice
//! on the reference grid, and writes a single RTSTRUCT instance bound to
//! the reference series' frame of reference.

use crate::contour::{self, Corner};
use crate::enums::Axis;
use crate::geometry::Slice;
use crate::series_loader::{ReferenceSeries, SeriesIdentity};
use crate::structure::{REGION_DESCRIPTION, Region, StructureSetBuilder};

use chrono::Local;
use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::mem::InMemElement;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject, WithMetaError, WriteError};
use dicom_dictionary_std::{tags, uids};
use rayon::prelude::*;
use std::{fs, path::Path};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Detached Study Management SOP class, the customary class of RT Referenced Study items.
const DETACHED_STUDY_MANAGEMENT: &str = "1.2.840.10008.3.1.2.3.1";
const MANUFACTURER: &str = "dicom-posterize";

#[derive(Debug, Error)]
pub enum RtStructError {
    #[error("Reference series has no {0}")]
    MissingReference(&'static str),

    #[error("Mask has shape {found:?} but the reference grid is {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    #[error("Failed to build file meta group: {0}")]
    Meta(#[from] WithMetaError),

    #[error("Failed to write structure set: {0}")]
    Write(#[from] WriteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Closed planar contour on one reference slice, in patient coordinates (mm).
#[derive(Clone, Debug, PartialEq)]
pub struct SliceContour {
    pub slice: usize,
    pub points: Vec<[f64; 3]>,
}

#[derive(Clone, Debug)]
struct Roi {
    number: u32,
    name: String,
    description: String,
    color: [u8; 3],
    contours: Vec<SliceContour>,
}

pub struct RtStructBuilder {
    slices: Vec<Slice>,
    identity: SeriesIdentity,
    shape: (usize, usize, usize),
    rois: Vec<Roi>,
}

impl RtStructBuilder {
    pub fn new(series: &ReferenceSeries) -> Result<Self, RtStructError> {
        let identity = series.identity().clone();
        if identity.frame_of_reference_uid.is_empty() {
            return Err(RtStructError::MissingReference("FrameOfReferenceUID"));
        }
        if identity.study_instance_uid.is_empty() {
            return Err(RtStructError::MissingReference("StudyInstanceUID"));
        }
        if identity.series_instance_uid.is_empty() {
            return Err(RtStructError::MissingReference("SeriesInstanceUID"));
        }
        Ok(Self {
            slices: series.slices().to_vec(),
            identity,
            shape: series.geometry().grid_shape(),
            rois: Vec::new(),
        })
    }

    pub fn roi_count(&self) -> usize {
        self.rois.len()
    }

    /// Contours of every axial slice of `region`, in slice order.
    pub fn contours(&self, region: &Region<'_>) -> Vec<SliceContour> {
        (0..self.slices.len())
            .into_par_iter()
            .filter_map(|z| region.mask.slice(z, Axis::Axial).map(|plane| (z, plane)))
            .flat_map_iter(|(z, plane)| {
                let slice = &self.slices[z];
                contour::trace(plane, region.approximate_contours)
                    .into_iter()
                    .map(move |corners| SliceContour {
                        slice: z,
                        points: corners
                            .iter()
                            .map(|&corner| Self::corner_to_patient(slice, corner))
                            .collect(),
                    })
            })
            .collect()
    }

    /// Pixel corners sit half a pixel before the center of the pixel they start.
    fn corner_to_patient(slice: &Slice, (x, y): Corner) -> [f64; 3] {
        slice.patient_point(x as f64 - 0.5, y as f64 - 0.5)
    }

    /// Assemble the RT Structure Set data set.
    pub fn to_dicom(&self, sop_instance_uid: &str) -> InMemDicomObject {
        let id = &self.identity;
        let now = Local::now();
        let date = now.format("%Y%m%d").to_string();
        let time = now.format("%H%M%S").to_string();

        let mut object = InMemDicomObject::from_element_iter([
            text(tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 100"),
            text(tags::INSTANCE_CREATION_DATE, VR::DA, &date),
            text(tags::INSTANCE_CREATION_TIME, VR::TM, &time),
            text(tags::SOP_CLASS_UID, VR::UI, uids::RT_STRUCTURE_SET_STORAGE),
            text(tags::SOP_INSTANCE_UID, VR::UI, sop_instance_uid),
            text(tags::STUDY_DATE, VR::DA, &id.study_date),
            text(tags::STUDY_TIME, VR::TM, &id.study_time),
            text(tags::ACCESSION_NUMBER, VR::SH, &id.accession_number),
            text(tags::MODALITY, VR::CS, "RTSTRUCT"),
            text(tags::MANUFACTURER, VR::LO, MANUFACTURER),
            text(tags::REFERRING_PHYSICIAN_NAME, VR::PN, &id.referring_physician_name),
            text(tags::SERIES_DESCRIPTION, VR::LO, REGION_DESCRIPTION),
            text(tags::PATIENT_NAME, VR::PN, &id.patient_name),
            text(tags::PATIENT_ID, VR::LO, &id.patient_id),
            text(tags::PATIENT_BIRTH_DATE, VR::DA, &id.patient_birth_date),
            text(tags::PATIENT_SEX, VR::CS, &id.patient_sex),
            text(tags::STUDY_INSTANCE_UID, VR::UI, &id.study_instance_uid),
            text(tags::SERIES_INSTANCE_UID, VR::UI, &new_uid()),
            text(tags::STUDY_ID, VR::SH, &id.study_id),
            text(tags::SERIES_NUMBER, VR::IS, "1"),
            text(tags::INSTANCE_NUMBER, VR::IS, "1"),
            text(tags::FRAME_OF_REFERENCE_UID, VR::UI, &id.frame_of_reference_uid),
            text(tags::STRUCTURE_SET_LABEL, VR::SH, "Posterized"),
            text(tags::STRUCTURE_SET_NAME, VR::LO, "Posterized"),
            text(tags::STRUCTURE_SET_DATE, VR::DA, &date),
            text(tags::STRUCTURE_SET_TIME, VR::TM, &time),
        ]);

        object.put(self.referenced_frame_of_reference());
        object.put(sequence(
            tags::STRUCTURE_SET_ROI_SEQUENCE,
            self.rois.iter().map(|roi| self.structure_set_roi(roi)).collect(),
        ));
        object.put(sequence(
            tags::ROI_CONTOUR_SEQUENCE,
            self.rois.iter().map(|roi| self.roi_contour(roi)).collect(),
        ));
        object.put(sequence(
            tags::RTROI_OBSERVATIONS_SEQUENCE,
            self.rois.iter().map(Self::observation).collect(),
        ));
        object
    }

    fn contour_image(&self, slice: &Slice) -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            text(tags::REFERENCED_SOP_CLASS_UID, VR::UI, self.referenced_sop_class()),
            text(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, &slice.sop_instance_uid),
        ])
    }

    fn referenced_sop_class(&self) -> &str {
        if self.identity.sop_class_uid.is_empty() {
            uids::CT_IMAGE_STORAGE
        } else {
            &self.identity.sop_class_uid
        }
    }

    fn referenced_frame_of_reference(&self) -> InMemElement {
        let images = self.slices.iter().map(|s| self.contour_image(s)).collect();
        let series = InMemDicomObject::from_element_iter([
            text(tags::SERIES_INSTANCE_UID, VR::UI, &self.identity.series_instance_uid),
            sequence(tags::CONTOUR_IMAGE_SEQUENCE, images),
        ]);
        let study = InMemDicomObject::from_element_iter([
            text(tags::REFERENCED_SOP_CLASS_UID, VR::UI, DETACHED_STUDY_MANAGEMENT),
            text(
                tags::REFERENCED_SOP_INSTANCE_UID,
                VR::UI,
                &self.identity.study_instance_uid,
            ),
            sequence(tags::RT_REFERENCED_SERIES_SEQUENCE, vec![series]),
        ]);
        let frame = InMemDicomObject::from_element_iter([
            text(
                tags::FRAME_OF_REFERENCE_UID,
                VR::UI,
                &self.identity.frame_of_reference_uid,
            ),
            sequence(tags::RT_REFERENCED_STUDY_SEQUENCE, vec![study]),
        ]);
        sequence(tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE, vec![frame])
    }

    fn structure_set_roi(&self, roi: &Roi) -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            text(tags::ROI_NUMBER, VR::IS, &roi.number.to_string()),
            text(
                tags::REFERENCED_FRAME_OF_REFERENCE_UID,
                VR::UI,
                &self.identity.frame_of_reference_uid,
            ),
            text(tags::ROI_NAME, VR::LO, &roi.name),
            text(tags::ROI_DESCRIPTION, VR::ST, &roi.description),
            text(tags::ROI_GENERATION_ALGORITHM, VR::CS, "AUTOMATIC"),
        ])
    }

    fn roi_contour(&self, roi: &Roi) -> InMemDicomObject {
        let contours = roi
            .contours
            .iter()
            .map(|contour| {
                let data = contour
                    .points
                    .iter()
                    .flat_map(|point| point.iter().map(|&v| decimal(v)));
                InMemDicomObject::from_element_iter([
                    sequence(
                        tags::CONTOUR_IMAGE_SEQUENCE,
                        vec![self.contour_image(&self.slices[contour.slice])],
                    ),
                    text(tags::CONTOUR_GEOMETRIC_TYPE, VR::CS, "CLOSED_PLANAR"),
                    text(
                        tags::NUMBER_OF_CONTOUR_POINTS,
                        VR::IS,
                        &contour.points.len().to_string(),
                    ),
                    multi(tags::CONTOUR_DATA, VR::DS, data),
                ])
            })
            .collect();

        InMemDicomObject::from_element_iter([
            multi(
                tags::ROI_DISPLAY_COLOR,
                VR::IS,
                roi.color.iter().map(u8::to_string),
            ),
            sequence(tags::CONTOUR_SEQUENCE, contours),
            text(tags::REFERENCED_ROI_NUMBER, VR::IS, &roi.number.to_string()),
        ])
    }

    fn observation(roi: &Roi) -> InMemDicomObject {
        InMemDicomObject::from_element_iter([
            text(tags::OBSERVATION_NUMBER, VR::IS, &roi.number.to_string()),
            text(tags::REFERENCED_ROI_NUMBER, VR::IS, &roi.number.to_string()),
            text(tags::ROI_OBSERVATION_LABEL, VR::SH, &roi.name),
            text(tags::RTROI_INTERPRETED_TYPE, VR::CS, ""),
            text(tags::ROI_INTERPRETER, VR::PN, ""),
        ])
    }
}

impl StructureSetBuilder for RtStructBuilder {
    type Error = RtStructError;

    fn add_region(&mut self, region: Region<'_>) -> Result<(), RtStructError> {
        if region.mask.dim() != self.shape {
            return Err(RtStructError::ShapeMismatch {
                expected: self.shape,
                found: region.mask.dim(),
            });
        }
        let contours = self.contours(&region);
        debug!(name = %region.name, contours = contours.len(), "Contoured region");
        let number = self.rois.len() as u32 + 1;
        self.rois.push(Roi {
            number,
            name: region.name,
            description: region.description.to_string(),
            color: region.color,
            contours,
        });
        Ok(())
    }

    fn save(self, path: &Path) -> Result<(), RtStructError> {
        let sop_instance_uid = new_uid();
        let file = self.to_dicom(&sop_instance_uid).with_meta(
            FileMetaTableBuilder::new()
                .media_storage_sop_class_uid(uids::RT_STRUCTURE_SET_STORAGE)
                .media_storage_sop_instance_uid(sop_instance_uid.as_str())
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN),
        )?;

        // a failed run must not leave a truncated file at `path`
        let partial = path.with_extension("dcm.part");
        if let Err(e) = file.write_to_file(&partial) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }
        fs::rename(&partial, path)?;
        Ok(())
    }
}

/// Fresh UID under the UUID-derived `2.25` root.
pub fn new_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

fn text(tag: Tag, vr: VR, value: &str) -> InMemElement {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

fn multi(tag: Tag, vr: VR, values: impl Iterator<Item = String>) -> InMemElement {
    DataElement::new(tag, vr, PrimitiveValue::Strs(values.collect()))
}

fn sequence(tag: Tag, items: Vec<InMemDicomObject>) -> InMemElement {
    DataElement::new(tag, VR::SQ, DataSetSequence::from(items))
}

/// Decimal string short enough for DS (16 bytes).
fn decimal(value: f64) -> String {
    let formatted = format!("{value:.4}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}
