//! End-to-end posterization runs.

use super::test_utils::{SeriesFixture, Workspace};
use dicom_posterize::{
    BandMask2D, CancellationFlag, GeometryError, ImageLoadError, Pipeline, PipelineError, Posterizer,
    RasterLoader, SeriesLoader, SeriesLoaderError, VolumeEmbedder, structure::OUTPUT_FILE_NAME,
};
use std::sync::{Arc, Mutex};

#[test]
fn test_two_band_film_on_512_grid() {
    let dir = tempfile::tempdir().expect("temp dir");
    let workspace = Workspace::new(dir.path(), SeriesFixture::default());

    let report = Pipeline::new(workspace.config(2))
        .run()
        .expect("should have posterized the film");

    assert_eq!((report.target.sagittal, report.target.axial, report.target.coronal), (100, 50, 10));
    assert_eq!(
        report.window.indices(),
        (247..=256).rev().collect::<Vec<_>>().as_slice()
    );
    assert!(report.skipped.is_empty());

    let names: Vec<_> = report.regions.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["1000 Dark", "500 Dark"]);
    assert_eq!(report.regions[0].color, [62, 69, 58]);
    assert_eq!(report.regions[1].color, [114, 112, 74]);
    assert_eq!(report.regions[0].voxels, 50 * 50 * 10);
    assert_eq!(report.regions[1].voxels, (512 * 50 - 50 * 50) * 10);

    assert_eq!(report.output, workspace.output.join("powerstructs.dcm"));
    assert_eq!(OUTPUT_FILE_NAME, "powerstructs.dcm");
    assert!(report.output.is_file());
}

#[test]
fn test_dark_band_lands_left_of_center() {
    let dir = tempfile::tempdir().expect("temp dir");
    let workspace = Workspace::new(dir.path(), SeriesFixture::default());
    let config = workspace.config(2);

    let series = SeriesLoader::load_from_directory(&config.reference).expect("series");
    let image = RasterLoader::load(&config.image).expect("film");
    let target = series.geometry().target_pixels(&config.size);
    let masks = Posterizer::new(2)
        .posterize(&image, &target, series.geometry(), None)
        .expect("posterized");
    let volume = VolumeEmbedder::new(series.geometry(), target.coronal)
        .embed(&masks[0])
        .expect("embedded");

    // image columns 0..50 sit at grid columns 206..256
    assert!(volume.data[[206, 256, 0]]);
    assert!(volume.data[[255, 247, 49]]);
    assert!(!volume.data[[205, 256, 0]]);
    assert!(!volume.data[[256, 256, 0]]);
    assert!(!volume.data[[206, 246, 0]]);
    assert!(!volume.data[[206, 257, 0]]);
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = tempfile::tempdir().expect("temp dir");
    let workspace = Workspace::new(dir.path(), SeriesFixture::default());

    let first = Pipeline::new(workspace.config(3)).run().expect("first run");
    let second = Pipeline::new(workspace.config(3)).run().expect("second run");
    assert_eq!(first.regions, second.regions);
    assert_eq!(first.skipped, second.skipped);
    assert_eq!(first.output, second.output);

    let series = SeriesLoader::load_from_directory(&workspace.reference).expect("series");
    let image = RasterLoader::load(&workspace.film).expect("film");
    let target = series.geometry().target_pixels(&workspace.config(3).size);
    let posterizer = Posterizer::new(3);
    let a = posterizer
        .posterize(&image, &target, series.geometry(), None)
        .expect("posterized");
    let b = posterizer
        .posterize(&image, &target, series.geometry(), None)
        .expect("posterized");
    assert_eq!(a, b);
}

#[test]
fn test_empty_band_is_skipped() {
    let dir = tempfile::tempdir().expect("temp dir");
    let workspace = Workspace::new(dir.path(), SeriesFixture::default());

    // 0 and 200 fall in the first and last of three bands; 85..170 stays empty
    let report = Pipeline::new(workspace.config(3)).run().expect("run");
    assert_eq!(report.skipped, vec!["667 Dark".to_string()]);
    let names: Vec<_> = report.regions.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["1000 Dark", "333 Dark"]);
    assert!(report.output.is_file());
}

#[test]
fn test_preview_observer_sees_every_band() {
    let dir = tempfile::tempdir().expect("temp dir");
    let workspace = Workspace::new(
        dir.path(),
        SeriesFixture {
            rows: 64,
            columns: 128,
            slices: 60,
            ..Default::default()
        },
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = {
        let seen = Arc::clone(&seen);
        move |mask: &BandMask2D, total: usize| {
            seen.lock().expect("lock").push((mask.index(), total, mask.dim()));
        }
    };

    let mut config = workspace.config(4);
    config.preview = true;
    Pipeline::new(config).with_observer(recorder).run().expect("run");

    let seen = seen.lock().expect("lock");
    let indices: Vec<_> = seen.iter().map(|(i, _, _)| *i).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert!(seen.iter().all(|&(_, total, dim)| total == 4 && dim == (128, 60)));
}

#[test]
fn test_observer_ignored_without_preview() {
    let dir = tempfile::tempdir().expect("temp dir");
    let workspace = Workspace::new(
        dir.path(),
        SeriesFixture {
            rows: 32,
            columns: 128,
            slices: 50,
            ..Default::default()
        },
    );

    let calls = Arc::new(Mutex::new(0_usize));
    let counter = {
        let calls = Arc::clone(&calls);
        move |_: &BandMask2D, _: usize| *calls.lock().expect("lock") += 1
    };
    Pipeline::new(workspace.config(2))
        .with_observer(counter)
        .run()
        .expect("run");
    assert_eq!(*calls.lock().expect("lock"), 0);
}

#[test]
fn test_non_hfs_series_writes_nothing() {
    let dir = tempfile::tempdir().expect("temp dir");
    let workspace = Workspace::new(
        dir.path(),
        SeriesFixture {
            rows: 32,
            columns: 32,
            slices: 5,
            orientation: [-1.0, 0.0, 0.0, 0.0, -1.0, 0.0],
            ..Default::default()
        },
    );

    let result = Pipeline::new(workspace.config(2)).run();
    assert!(matches!(
        result,
        Err(PipelineError::Series(SeriesLoaderError::Geometry(
            GeometryError::NonCanonicalOrientation { .. }
        )))
    ));
    assert!(!workspace.output.join(OUTPUT_FILE_NAME).exists());
}

#[test]
fn test_cancelled_run_writes_nothing() {
    let dir = tempfile::tempdir().expect("temp dir");
    let workspace = Workspace::new(
        dir.path(),
        SeriesFixture {
            rows: 32,
            columns: 128,
            slices: 50,
            ..Default::default()
        },
    );

    let flag = CancellationFlag::new();
    let cancel = flag.clone();
    let mut config = workspace.config(3);
    config.preview = true;
    // cancel while the first band is being produced
    let result = Pipeline::new(config)
        .with_cancellation(flag)
        .with_observer(move |_: &BandMask2D, _: usize| cancel.cancel())
        .run();

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert!(!workspace.output.join(OUTPUT_FILE_NAME).exists());
}

#[test]
fn test_missing_film_is_an_image_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let workspace = Workspace::new(
        dir.path(),
        SeriesFixture {
            rows: 16,
            columns: 16,
            slices: 4,
            ..Default::default()
        },
    );
    let mut config = workspace.config(2);
    config.image = dir.path().join("absent.png");

    let result = Pipeline::new(config).run();
    assert!(matches!(result, Err(PipelineError::Image(_))));
    assert!(!workspace.output.exists());
}

#[test]
fn test_zero_slice_thickness_is_rejected() {
    let dir = tempfile::tempdir().expect("temp dir");
    let workspace = Workspace::new(
        dir.path(),
        SeriesFixture {
            rows: 16,
            columns: 16,
            slices: 4,
            thickness: 0.0,
            ..Default::default()
        },
    );

    let result = Pipeline::new(workspace.config(2)).run();
    assert!(matches!(
        result,
        Err(PipelineError::Series(SeriesLoaderError::NoValidSlices(_)))
    ));
    assert!(!workspace.output.exists());
}

#[test]
fn test_huge_physical_size_is_an_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let workspace = Workspace::new(
        dir.path(),
        SeriesFixture {
            rows: 16,
            columns: 16,
            slices: 4,
            ..Default::default()
        },
    );
    let mut config = workspace.config(2);
    config.size.sagittal_cm = 1e9;

    let result = Pipeline::new(config).run();
    assert!(matches!(
        result,
        Err(PipelineError::Image(ImageLoadError::TargetTooLarge { .. }))
    ));
    assert!(!workspace.output.exists());
}
