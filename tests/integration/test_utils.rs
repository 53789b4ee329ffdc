//! Fixtures shared by the integration tests.

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};
use dicom_posterize::{PhysicalSize, PipelineConfig};
use image::{GrayImage, Luma};
use std::path::{Path, PathBuf};

pub const HFS: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
pub const STUDY_UID: &str = "1.2.826.0.1.3680043.8.498.1";
pub const SERIES_UID: &str = "1.2.826.0.1.3680043.8.498.2";
pub const FRAME_OF_REFERENCE_UID: &str = "1.2.826.0.1.3680043.8.498.3";

/// Geometry of a synthetic CT series.
#[derive(Clone, Copy, Debug)]
pub struct SeriesFixture {
    pub rows: u16,
    pub columns: u16,
    pub slices: usize,
    pub spacing: f64,
    pub thickness: f64,
    pub orientation: [f64; 6],
}

impl Default for SeriesFixture {
    fn default() -> Self {
        Self {
            rows: 512,
            columns: 512,
            slices: 50,
            spacing: 1.0,
            thickness: 1.0,
            orientation: HFS,
        }
    }
}

fn decimals(values: &[f64]) -> PrimitiveValue {
    PrimitiveValue::Strs(values.iter().map(|v| v.to_string()).collect())
}

pub fn slice_uid(index: usize) -> String {
    format!("1.2.826.0.1.3680043.8.498.4.{}", index + 1)
}

/// Write one CT file per slice, without pixel data, in reverse order so the
/// loader has to sort them.
pub fn write_series(directory: &Path, fixture: SeriesFixture) {
    for index in (0..fixture.slices).rev() {
        let sop = slice_uid(index);
        let z = index as f64 * fixture.thickness;
        let origin = -(f64::from(fixture.columns) * fixture.spacing) / 2.0;
        let object = InMemDicomObject::from_element_iter([
            DataElement::new(
                tags::SOP_CLASS_UID,
                VR::UI,
                PrimitiveValue::from(uids::CT_IMAGE_STORAGE),
            ),
            DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(sop.as_str())),
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")),
            DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("Phantom^Film")),
            DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("PHANTOM01")),
            DataElement::new(tags::STUDY_INSTANCE_UID, VR::UI, PrimitiveValue::from(STUDY_UID)),
            DataElement::new(tags::SERIES_INSTANCE_UID, VR::UI, PrimitiveValue::from(SERIES_UID)),
            DataElement::new(
                tags::FRAME_OF_REFERENCE_UID,
                VR::UI,
                PrimitiveValue::from(FRAME_OF_REFERENCE_UID),
            ),
            DataElement::new(
                tags::IMAGE_POSITION_PATIENT,
                VR::DS,
                decimals(&[origin, origin, z]),
            ),
            DataElement::new(
                tags::IMAGE_ORIENTATION_PATIENT,
                VR::DS,
                decimals(&fixture.orientation),
            ),
            DataElement::new(
                tags::PIXEL_SPACING,
                VR::DS,
                decimals(&[fixture.spacing, fixture.spacing]),
            ),
            DataElement::new(
                tags::SLICE_THICKNESS,
                VR::DS,
                PrimitiveValue::from(fixture.thickness.to_string()),
            ),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(fixture.rows)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(fixture.columns)),
        ]);
        let file = object
            .with_meta(
                FileMetaTableBuilder::new()
                    .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid(sop.as_str())
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN),
            )
            .expect("should have built file meta");
        file.write_to_file(directory.join(format!("CT{index:04}.dcm")))
            .expect("should have written slice");
    }
}

/// 100 x 50 film: left half black, right half gray 200.
pub fn write_film(path: &Path) {
    film(100, 50).save(path).expect("should have saved film");
}

pub fn film(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, _| {
        if x < width / 2 { Luma([0]) } else { Luma([200]) }
    })
}

/// Reference series, film and output directory inside `root`.
pub struct Workspace {
    pub reference: PathBuf,
    pub film: PathBuf,
    pub output: PathBuf,
}

impl Workspace {
    pub fn new(root: &Path, fixture: SeriesFixture) -> Self {
        let reference = root.join("ct");
        std::fs::create_dir_all(&reference).expect("should have created reference dir");
        write_series(&reference, fixture);
        let film = root.join("film.png");
        write_film(&film);
        Self {
            reference,
            film,
            output: root.join("out"),
        }
    }

    pub fn config(&self, bands: usize) -> PipelineConfig {
        PipelineConfig::new(
            &self.film,
            &self.reference,
            &self.output,
            bands,
            PhysicalSize {
                sagittal_cm: 10.0,
                axial_cm: 5.0,
                coronal_cm: 1.0,
            },
        )
    }
}
