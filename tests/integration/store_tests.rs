//! Store integration tests.
//!
//! Covers pipeline runs against chunked disk stores whose chunks are smaller
//! than a tile, reopening a store written by a previous run, and exporting
//! assembled results.

use std::fs;

use image::Rgb;
use ndarray::{arr1, s, Array3};
use tempfile::TempDir;

use wsi_tiler::error::StoreError;
use wsi_tiler::pipeline::{IdentityProcessor, MeanIntensityProcessor, TilePipeline};
use wsi_tiler::store::{save_array, DiskStore, MemoryStore, OutputStore, StoreWriter};

use super::test_utils::{slide_pixel, test_params, write_mask, SharedSlideSource};

#[test]
fn test_pipeline_into_small_chunks() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);
    // 100x100 chunks never align with 256 tile borders
    let store =
        DiskStore::create(dir.path().join("out.store"), [512, 512, 3], [100, 100]).unwrap();

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        store,
        IdentityProcessor,
        test_params(256, 16, 4),
    );
    let output = pipeline.run("slide.png", &mask_path).unwrap();
    assert_eq!(output.report.written, 4);

    let reopened = DiskStore::open(dir.path().join("out.store")).unwrap();
    let full = reopened.read_full().unwrap();
    for &(x, y) in &[(0u32, 0u32), (99, 100), (255, 256), (300, 411), (511, 511)] {
        let expected = slide_pixel(x, y);
        for ch in 0..3 {
            assert_eq!(
                full[[y as usize, x as usize, ch]],
                f32::from(expected[ch]),
                "pixel ({}, {}) channel {}",
                x,
                y,
                ch
            );
        }
    }
    assert_eq!(full, output.array);
}

#[test]
fn test_cell_output_into_disk_store() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);
    let store = DiskStore::create(dir.path().join("cells.store"), [2, 2, 3], [1, 1]).unwrap();

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        store,
        MeanIntensityProcessor,
        test_params(256, 16, 2),
    );
    let output = pipeline.run("slide.png", &mask_path).unwrap();

    assert_eq!(output.array.dim(), (2, 2, 3));
    // Red and green sweep 0..256 inside every tile, blue identifies the tile
    for row in 0..2 {
        for col in 0..2 {
            assert_eq!(output.array[[row, col, 0]], 127.5);
            assert_eq!(output.array[[row, col, 1]], 127.5);
            assert_eq!(output.array[[row, col, 2]], ((col + 2 * row) * 40) as f32);
        }
    }
}

#[test]
fn test_memory_store_writers_share_array() {
    let store = MemoryStore::new([4, 4, 2]);
    let mut first = store.open_writer().unwrap();
    let mut second = store.open_writer().unwrap();

    first
        .write_region(0, 0, Array3::from_elem((2, 4, 2), 1.0).view())
        .unwrap();
    second.write_cell(3, 3, arr1(&[5.0, 6.0]).view()).unwrap();

    let full = store.read_full().unwrap();
    assert!(full.slice(s![..2, .., ..]).iter().all(|&v| v == 1.0));
    assert_eq!(full[[3, 3, 0]], 5.0);
    assert_eq!(full[[3, 3, 1]], 6.0);
    assert_eq!(full[[2, 0, 0]], 0.0);
}

#[test]
fn test_writer_rejects_region_outside_store() {
    let dir = TempDir::new().unwrap();
    let store = DiskStore::create(dir.path(), [8, 8, 1], [4, 4]).unwrap();
    let mut writer = store.open_writer().unwrap();

    assert!(matches!(
        writer.write_region(8, 0, Array3::zeros((2, 2, 1)).view()),
        Err(StoreError::OutOfBounds { row: 8, col: 0, .. })
    ));
    assert!(matches!(
        writer.write_cell(0, 0, arr1(&[1.0, 2.0]).view()),
        Err(StoreError::ChannelMismatch {
            expected: 1,
            actual: 2
        })
    ));
}

#[test]
fn test_open_rejects_foreign_dtype() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("out.store");
    DiskStore::create(&root, [4, 4, 1], [4, 4]).unwrap();

    let meta_path = root.join("store.json");
    let meta = fs::read_to_string(&meta_path).unwrap().replace("<f4", "<f8");
    fs::write(&meta_path, meta).unwrap();

    assert!(matches!(
        DiskStore::open(&root),
        Err(StoreError::Metadata { .. })
    ));
}

#[test]
fn test_writer_fails_without_chunk_dir() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("out.store");
    let store = DiskStore::create(&root, [4, 4, 1], [4, 4]).unwrap();
    fs::remove_dir_all(root.join("c")).unwrap();

    assert!(matches!(store.open_writer(), Err(StoreError::Io { .. })));
}

#[test]
fn test_export_pipeline_result() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([512, 512, 3]),
        IdentityProcessor,
        test_params(256, 16, 2),
    );
    let output = pipeline.run("slide.png", &mask_path).unwrap();

    let png_path = dir.path().join("result.png");
    save_array(&png_path, &output.array).unwrap();
    let img = image::open(&png_path).unwrap().to_rgb8();
    assert_eq!(img.dimensions(), (512, 512));
    assert_eq!(img.get_pixel(300, 260), &Rgb(slide_pixel(300, 260)));

    let json_path = dir.path().join("result.json");
    save_array(&json_path, &output.array).unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(value["shape"], serde_json::json!([512, 512, 3]));
    assert_eq!(value["data"].as_array().unwrap().len(), 512 * 512 * 3);
}

#[test]
fn test_export_rejects_unknown_extension() {
    let dir = TempDir::new().unwrap();
    let array = Array3::<f32>::zeros((2, 2, 1));

    assert!(matches!(
        save_array(dir.path().join("result.bmp"), &array),
        Err(StoreError::UnsupportedExport { .. })
    ));
    assert!(matches!(
        save_array(dir.path().join("result.png"), &Array3::<f32>::zeros((2, 2, 2))),
        Err(StoreError::UnsupportedExport { .. })
    ));
}
