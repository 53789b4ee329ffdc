//! Loading reference series from disk.

use super::test_utils::{SeriesFixture, slice_uid, write_series};
use dicom_posterize::{GeometryError, SeriesLoader, SeriesLoaderError};
use std::fs;

#[test]
fn test_directory_load_sorts_and_reads_identity() {
    let dir = tempfile::tempdir().expect("temp dir");
    let fixture = SeriesFixture {
        rows: 40,
        columns: 60,
        slices: 12,
        spacing: 0.8,
        thickness: 2.5,
        ..Default::default()
    };
    write_series(dir.path(), fixture);

    let series = SeriesLoader::load_from_directory(dir.path()).expect("series");
    let geometry = series.geometry();
    assert_eq!((geometry.rows, geometry.columns, geometry.slice_count), (40, 60, 12));
    assert_eq!(geometry.pixel_spacing, [0.8, 0.8]);
    assert_eq!(geometry.slice_thickness, 2.5);

    let z: Vec<_> = series.slices().iter().map(|s| s.position[2]).collect();
    assert!(z.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(series.slices()[0].sop_instance_uid, slice_uid(0));
    assert_eq!(series.identity().patient_id, "PHANTOM01");
    assert_eq!(series.identity().patient_name, "Phantom^Film");
    assert!(series.excluded().is_empty());
}

#[test]
fn test_foreign_files_are_excluded() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_series(
        dir.path(),
        SeriesFixture {
            rows: 8,
            columns: 8,
            slices: 3,
            ..Default::default()
        },
    );
    fs::write(dir.path().join("notes.txt"), "not dicom").expect("write");
    fs::create_dir(dir.path().join("nested")).expect("mkdir");

    let series = SeriesLoader::load_from_directory(dir.path()).expect("series");
    assert_eq!(series.slices().len(), 3);
    assert_eq!(series.excluded().len(), 1);
    assert!(series.excluded()[0].0.ends_with("notes.txt"));
}

#[test]
fn test_empty_directory_has_no_slices() {
    let dir = tempfile::tempdir().expect("temp dir");
    let result = SeriesLoader::load_from_directory(dir.path());
    assert!(matches!(result, Err(SeriesLoaderError::NoValidSlices(_))));
}

#[test]
fn test_missing_directory_is_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let result = SeriesLoader::load_from_directory(dir.path().join("absent"));
    assert!(matches!(result, Err(SeriesLoaderError::Io(_))));
}

#[test]
fn test_feet_first_series_is_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_series(
        dir.path(),
        SeriesFixture {
            rows: 8,
            columns: 8,
            slices: 3,
            orientation: [-1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            ..Default::default()
        },
    );
    let result = SeriesLoader::load_from_directory(dir.path());
    match result {
        Err(SeriesLoaderError::Geometry(GeometryError::NonCanonicalOrientation {
            found, ..
        })) => assert_eq!(found, [-1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
        other => panic!("expected an orientation error, got {other:?}"),
    }
}
