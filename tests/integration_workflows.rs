//! Integration tests for the quality-check workflows.
//!
//! These run each workflow end to end on synthetic PNG slides:
//! - Spot-check validation with the HTML report sink
//! - Stratified tile review from a CSV metrics table
//! - Tile-directory review with a stored transform
//! - Report abandonment when a run fails

use assert_fs::prelude::*;
use image::{GrayImage, Luma, Rgb, RgbImage};
use predicates::prelude::*;
use slide_registration_qc::core::locator::RegistrationLocation;
use slide_registration_qc::core::pipeline::{
    PairReviewConfig, PairReviewer, TileReviewConfig, TileReviewer, Validator, PAIR_REPORT,
    REVIEW_REPORT, VALIDATION_REPORT,
};
use slide_registration_qc::core::render::HtmlReportSink;
use slide_registration_qc::core::sampler::{MetricsTable, SampleGroup};
use slide_registration_qc::core::transform::load_transform;
use std::path::Path;

fn texture(x: u32, y: u32) -> u8 {
    ((x * 31 + y * 17 + (x * y) % 13) % 256) as u8
}

fn write_gray_slide(path: &Path, width: u32, height: u32) {
    GrayImage::from_fn(width, height, |x, y| Luma([texture(x, y)]))
        .save(path)
        .unwrap();
}

fn write_rgb_slide(path: &Path, width: u32, height: u32) {
    RgbImage::from_fn(width, height, |x, y| {
        let v = texture(x, y);
        Rgb([v, 255 - v, v / 2])
    })
    .save(path)
    .unwrap();
}

#[test]
fn validation_writes_three_comparisons_and_report() {
    let temp = assert_fs::TempDir::new().unwrap();
    let slides = temp.child("Pair_01/registration_results/registered_slides");
    slides.create_dir_all().unwrap();
    write_gray_slide(&slides.path().join("HE_downsampled_x2.ome.png"), 256, 256);
    write_gray_slide(&slides.path().join("CD8_channel2.ome.png"), 256, 256);

    let location = RegistrationLocation {
        pair_name: "Pair_01".to_string(),
        registration_dir: slides.path().to_path_buf(),
        he_path: slides.path().join("HE_downsampled_x2.ome.png"),
        cd8_path: slides.path().join("CD8_channel2.ome.png"),
    };
    let output_dir = temp.child("validation_results");
    let mut sink = HtmlReportSink::create(output_dir.path(), VALIDATION_REPORT, "Validation").unwrap();

    let validation = Validator::builder()
        .tile_size(64)
        .build()
        .run(&location, &mut sink)
        .unwrap();
    sink.finish().unwrap();

    assert_eq!(validation.checks.len(), 3);
    assert!(validation.skipped.is_empty());
    let average = validation.average.unwrap();
    assert!((average.ssim - 1.0).abs() < 1e-9);

    for n in 1..=3 {
        output_dir
            .child(format!("tile_{}_comparison.png", n))
            .assert(predicate::path::is_file());
    }
    output_dir
        .child(VALIDATION_REPORT)
        .assert(predicate::str::contains("tile_2_comparison.png"));
}

#[test]
fn validation_clips_mismatched_slides_and_skips_outside_tiles() {
    let temp = assert_fs::TempDir::new().unwrap();
    let he = temp.child("he.png");
    let cd8 = temp.child("cd8.png");
    write_gray_slide(he.path(), 200, 220);
    write_gray_slide(cd8.path(), 240, 200);

    let location = RegistrationLocation {
        pair_name: String::new(),
        registration_dir: temp.path().to_path_buf(),
        he_path: he.path().to_path_buf(),
        cd8_path: cd8.path().to_path_buf(),
    };
    let mut sink = HtmlReportSink::create(&temp.path().join("out"), VALIDATION_REPORT, "Validation").unwrap();

    // common extent 200x200: origins 50, 100, 150; the last one overruns
    let validation = Validator::builder()
        .tile_size(64)
        .build()
        .run(&location, &mut sink)
        .unwrap();

    let mismatch = validation.mismatch.unwrap();
    assert_eq!(mismatch.common, (200, 200));
    assert_eq!(validation.checks.len(), 2);
    assert_eq!(validation.skipped.len(), 1);
}

#[test]
fn failed_validation_leaves_no_report() {
    let temp = assert_fs::TempDir::new().unwrap();
    let location = RegistrationLocation {
        pair_name: "Pair_02".to_string(),
        registration_dir: temp.path().to_path_buf(),
        he_path: temp.path().join("missing_he.png"),
        cd8_path: temp.path().join("missing_cd8.png"),
    };
    let output_dir = temp.child("out");

    let result = {
        let mut sink = HtmlReportSink::create(output_dir.path(), VALIDATION_REPORT, "Validation").unwrap();
        Validator::builder().build().run(&location, &mut sink)
    };

    assert!(result.unwrap_err().is_path_not_found());
    output_dir
        .child(VALIDATION_REPORT)
        .assert(predicate::path::missing());
    let leftovers = std::fs::read_dir(output_dir.path()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[test]
fn tile_review_from_csv_table() {
    let temp = assert_fs::TempDir::new().unwrap();
    let he = temp.child("he.png");
    let cd8 = temp.child("cd8.png");
    write_gray_slide(he.path(), 512, 512);
    write_gray_slide(cd8.path(), 512, 512);

    // 4x4 grid after downsampling by 2 with 64 px tiles
    let mut csv = String::from("index,ssim,ncc,combined_score\n");
    for i in 0..16 {
        csv.push_str(&format!("{},0.5,0.4,{}\n", i, i as f64 / 16.0));
    }
    let metrics = temp.child("tile_metrics.csv");
    metrics.write_str(&csv).unwrap();
    let table = MetricsTable::load(metrics.path()).unwrap();

    let output_dir = temp.child("review");
    let mut sink = HtmlReportSink::create(output_dir.path(), REVIEW_REPORT, "Tile Review").unwrap();
    let config = TileReviewConfig::default()
        .tile_size(64)
        .downsample_factor(2)
        .num_samples(5);

    let review = TileReviewer::new(config)
        .run(he.path(), cd8.path(), &table, &mut sink)
        .unwrap();
    sink.finish().unwrap();

    assert_eq!(review.grid.cols, 4);
    assert_eq!(review.reviewed.len(), 5);
    assert_eq!(review.reviewed[0].sample.group, SampleGroup::Best);
    assert_eq!(review.reviewed[0].sample.index, 15);
    output_dir
        .child("tile_comparison_idx15_row3_col3.png")
        .assert(predicate::path::is_file());
    output_dir
        .child(REVIEW_REPORT)
        .assert(predicate::str::contains("SSIM (table)"));
}

#[test]
fn tile_review_missing_table_is_path_not_found() {
    let temp = assert_fs::TempDir::new().unwrap();
    let error = MetricsTable::load(&temp.path().join("tile_metrics.csv")).unwrap_err();
    assert!(matches!(
        error,
        slide_registration_qc::error::TableError::PathNotFound { .. }
    ));
}

#[test]
fn tile_directories_are_paired_by_stem() {
    let temp = assert_fs::TempDir::new().unwrap();
    let he_tiles = temp.child("he_tiles");
    let cd8_tiles = temp.child("cd8_tiles");
    he_tiles.create_dir_all().unwrap();
    cd8_tiles.create_dir_all().unwrap();
    for name in ["tile_0_0", "tile_0_1", "tile_1_0"] {
        write_rgb_slide(&he_tiles.path().join(format!("{}.png", name)), 32, 32);
        write_gray_slide(&cd8_tiles.path().join(format!("{}.png", name)), 32, 32);
    }
    cd8_tiles.child("notes.txt").write_str("not a tile").unwrap();

    let matrix = temp.child("registration_matrix.json");
    matrix
        .write_str(r#"{"registration_matrix": [[1, 0, 5], [0, 1, -3], [0, 0, 1]]}"#)
        .unwrap();
    let transform = load_transform(Some(matrix.path()));
    assert!(!transform.is_fallback());

    let output_dir = temp.child("visualizations");
    let mut sink = HtmlReportSink::create(output_dir.path(), PAIR_REPORT, "Tile Pairs").unwrap();
    let review = PairReviewer::new(PairReviewConfig {
        limit: 2,
        ..Default::default()
    })
    .run(he_tiles.path(), cd8_tiles.path(), transform, &mut sink)
    .unwrap();
    sink.finish().unwrap();

    assert_eq!(review.reviewed.len(), 2);
    assert!(review.reviewed[0].pair.marker.ends_with("tile_0_0.png"));
    output_dir.child("tile_comparison_1.png").assert(predicate::path::is_file());
    output_dir.child("tile_comparison_3.png").assert(predicate::path::missing());
    output_dir
        .child(PAIR_REPORT)
        .assert(predicate::str::contains("Registration Matrix"));
}

#[test]
fn missing_transform_falls_back_to_identity() {
    let temp = assert_fs::TempDir::new().unwrap();
    let transform = load_transform(Some(&temp.path().join("registration_matrix.json")));

    assert!(transform.is_fallback());
    assert_eq!(transform.shape_label(), "(3, 3)");
}
