//! End-to-end pipeline tests.
//!
//! These tests run the full pipeline (mask load, grid planning, filtering,
//! dispatch, write-back, assembly) on synthetic slides and check the
//! finalized arrays.

use std::sync::Arc;

use ndarray::{s, Array2, Array3};
use proptest::prelude::*;
use tempfile::TempDir;

use wsi_tiler::grid::{GridPlanner, MaskFilter, TileCoordinate};
use wsi_tiler::mask::Mask;
use wsi_tiler::pipeline::{
    CountingObserver, FnProcessor, GrayscaleProcessor, IdentityProcessor,
    MeanIntensityProcessor, NoopObserver, OutputKind, PipelineObserver, TileOutput, TilePipeline,
};
use wsi_tiler::slide::ImageFileSource;
use wsi_tiler::store::{DiskStore, MemoryStore, OutputStore};

use super::test_utils::{
    slide_pixel, test_params, write_mask, write_mask_with, write_slide, SharedSlideSource,
};

/// Assert that `array` holds the synthetic slide pixels over `width x height`.
fn assert_slide_pixels(array: &Array3<f32>, width: usize, height: usize) {
    for y in 0..height {
        for x in 0..width {
            let expected = slide_pixel(x as u32, y as u32);
            for ch in 0..3 {
                assert_eq!(
                    array[[y, x, ch]],
                    f32::from(expected[ch]),
                    "pixel mismatch at x={}, y={}, channel={}",
                    x,
                    y,
                    ch
                );
            }
        }
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_full_coverage_512() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);
    let source = SharedSlideSource::new(512, 512);
    let observer = Arc::new(CountingObserver::new());

    let pipeline = TilePipeline::new(
        source.clone(),
        MemoryStore::new([512, 512, 3]),
        IdentityProcessor,
        test_params(256, 16, 3),
    )
    .with_observer(observer.clone());

    let output = pipeline.run("slide.png", &mask_path).unwrap();

    assert_eq!((output.plan.pad_w, output.plan.pad_h), (0, 0));
    assert_eq!(output.array.dim(), (512, 512, 3));
    assert_slide_pixels(&output.array, 512, 512);

    assert_eq!(output.report.considered, 4);
    assert_eq!(output.report.queued, 4);
    assert_eq!(output.report.written, 4);
    assert_eq!(output.report.per_worker.len(), 3);
    assert_eq!(observer.written(), 4);
    assert_eq!(observer.workers_finished(), 3);

    // One open for planning plus one per worker
    assert_eq!(source.open_count(), 4);
}

#[test]
fn test_tile_generation_order() {
    let mask = Mask::filled(32, 32, 1.0);
    let plan = GridPlanner::with_mask_downsample(256, 256, 16)
        .unwrap()
        .plan((512, 512), 1.0, &mask)
        .unwrap();

    let coords: Vec<TileCoordinate> = MaskFilter::new(&plan, &mask, 0.0).accepted().collect();
    assert_eq!(
        coords,
        vec![
            TileCoordinate::new(0, 0),
            TileCoordinate::new(0, 256),
            TileCoordinate::new(256, 0),
            TileCoordinate::new(256, 256),
        ]
    );
}

#[test]
fn test_padding_removed_300() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(300, 300),
        MemoryStore::new([512, 512, 3]),
        IdentityProcessor,
        test_params(256, 16, 2),
    );
    let output = pipeline.run("slide.png", &mask_path).unwrap();

    assert_eq!((output.plan.width, output.plan.height), (512, 512));
    assert_eq!((output.plan.pad_w, output.plan.pad_h), (212, 212));
    assert_eq!(output.array.dim(), (300, 300, 3));
    assert_slide_pixels(&output.array, 300, 300);
}

#[test]
fn test_unpad_with_grid_capped_by_mask() {
    let dir = TempDir::new().unwrap();
    // 18 mask columns cover 288 < 300 px; 20 mask rows cover 320 px
    let mask_path = write_mask(dir.path(), 20, 18, 255);

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(300, 300),
        MemoryStore::new([320, 288, 3]),
        IdentityProcessor,
        test_params(256, 16, 2),
    );
    let output = pipeline.run("slide.png", &mask_path).unwrap();

    assert_eq!((output.plan.width, output.plan.height), (288, 320));
    assert_eq!((output.plan.pad_w, output.plan.pad_h), (0, 20));
    assert_eq!(output.report.written, 4);
    assert_eq!(output.array.dim(), (300, 288, 3));
    assert_slide_pixels(&output.array, 288, 300);
}

#[test]
fn test_padding_kept_without_unpad() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let mut params = test_params(256, 16, 2);
    params.unpad = false;
    let pipeline = TilePipeline::new(
        SharedSlideSource::new(300, 300),
        MemoryStore::new([512, 512, 3]),
        IdentityProcessor,
        params,
    );
    let output = pipeline.run("slide.png", &mask_path).unwrap();

    assert_eq!(output.array.dim(), (512, 512, 3));
    // Padding reads as zero
    assert_eq!(output.array[[400, 400, 0]], 0.0);
    assert_eq!(output.array[[10, 310, 1]], 0.0);
}

#[test]
fn test_all_zero_mask_leaves_output_unchanged() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 0);
    let observer = Arc::new(CountingObserver::new());

    let mut params = test_params(256, 16, 4);
    params.unpad = false;
    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::filled([512, 512, 3], 7.0),
        IdentityProcessor,
        params,
    )
    .with_observer(observer.clone());

    let output = pipeline.run("slide.png", &mask_path).unwrap();

    assert!(output.array.iter().all(|&v| v == 7.0));
    assert_eq!(output.report.queued, 0);
    assert_eq!(output.report.skipped, 4);
    assert_eq!(output.report.per_worker, vec![0, 0, 0, 0]);
    assert_eq!(observer.workers_finished(), 4);
    assert_eq!(observer.skipped(), 4);
}

#[test]
fn test_partial_mask_selects_tiles() {
    let dir = TempDir::new().unwrap();
    // Left half covered, right half background
    let mask_path = write_mask_with(dir.path(), 32, 32, |_, col| {
        if col < 16 {
            255
        } else {
            0
        }
    });

    let mut params = test_params(256, 16, 2).with_mask_ratio(0.5);
    params.unpad = false;
    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([512, 512, 3]),
        IdentityProcessor,
        params,
    );
    let output = pipeline.run("slide.png", &mask_path).unwrap();

    assert_eq!(output.report.written, 2);
    assert_eq!(output.array[[300, 100, 0]], f32::from(slide_pixel(100, 300)[0]));
    assert!(output.array.slice(s![.., 256.., ..]).iter().all(|&v| v == 0.0));
}

// =============================================================================
// Output Kinds
// =============================================================================

#[test]
fn test_cell_output() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([2, 2, 3]),
        MeanIntensityProcessor,
        test_params(256, 16, 2),
    );
    let output = pipeline.run("slide.png", &mask_path).unwrap();

    // Cell outputs are never cropped
    assert_eq!(output.array.dim(), (2, 2, 3));
    for (row, col) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        let blue = ((col + 2 * row) * 40) as f32;
        assert!((output.array[[row, col, 0]] - 127.5).abs() < 1e-3);
        assert!((output.array[[row, col, 1]] - 127.5).abs() < 1e-3);
        assert!((output.array[[row, col, 2]] - blue).abs() < 1e-3);
    }
}

#[test]
fn test_scalar_cell_with_closure_state() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let offset = 1000.0;
    let processor = FnProcessor::new(
        OutputKind::Cell { features: 1 },
        move |_tile, coord: TileCoordinate| {
            Ok(TileOutput::scalar(
                offset + coord.x as f32 + coord.y as f32 / 1000.0,
            ))
        },
    );
    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([2, 2, 1]),
        processor,
        test_params(256, 16, 2),
    );
    let output = pipeline.run("slide.png", &mask_path).unwrap();

    assert_eq!(output.array[[0, 1, 0]], 1256.0);
    assert!((output.array[[1, 0, 0]] - 1000.256).abs() < 1e-3);
}

#[test]
fn test_output_transform_applied() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(300, 300),
        MemoryStore::new([512, 512, 1]),
        GrayscaleProcessor,
        test_params(256, 16, 2),
    )
    .with_output_transform(|array| array.mapv(|v| v + 1.0));

    let output = pipeline.run("slide.png", &mask_path).unwrap();
    assert_eq!(output.array.dim(), (300, 300, 1));
    assert!(output.array.iter().all(|&v| v >= 1.0));
}

#[test]
fn test_normalized_tiles() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let mut params = test_params(256, 16, 2);
    params.normalize = true;
    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([512, 512, 3]),
        IdentityProcessor,
        params,
    );
    let output = pipeline.run("slide.png", &mask_path).unwrap();

    assert!(output.array.iter().all(|&v| (0.0..=1.0).contains(&v)));
    assert!((output.array[[0, 255, 0]] - 1.0).abs() < 1e-6);
}

// =============================================================================
// Dispatch Properties
// =============================================================================

#[test]
fn test_many_workers_few_tiles_terminates() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let mut params = test_params(256, 16, 16);
    params.queue_capacity = Some(1);
    let pipeline = TilePipeline::new(
        SharedSlideSource::new(256, 256),
        MemoryStore::new([256, 256, 3]),
        IdentityProcessor,
        params,
    )
    .with_observer(Arc::new(NoopObserver));

    let output = pipeline.run("slide.png", &mask_path).unwrap();
    assert_eq!(output.report.written, 1);
    assert_eq!(output.report.per_worker.len(), 16);
    assert_eq!(output.report.per_worker.iter().sum::<usize>(), 1);
}

#[test]
fn test_many_tiles_unbounded_queue() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 64, 64, 255);

    let mut params = test_params(64, 16, 5);
    params.queue_capacity = None;
    let pipeline = TilePipeline::new(
        SharedSlideSource::new(1024, 1024),
        MemoryStore::new([1024, 1024, 3]),
        IdentityProcessor,
        params,
    );
    let output = pipeline.run("slide.png", &mask_path).unwrap();

    assert_eq!(output.report.written, 256);
    assert_slide_pixels(&output.array, 1024, 1024);
}

#[test]
fn test_runs_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask_with(dir.path(), 32, 32, |row, col| ((row * 8 + col) % 256) as u8);
    let store = DiskStore::create(dir.path().join("out.store"), [512, 512, 1], [100, 100]).unwrap();

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        store,
        GrayscaleProcessor,
        test_params(256, 16, 4).with_mask_ratio(0.2),
    );

    let first = pipeline.run("slide.png", &mask_path).unwrap();
    let second = pipeline.run("slide.png", &mask_path).unwrap();
    assert_eq!(first.array, second.array);
    assert_eq!(first.report.queued, second.report.queued);
}

#[test]
fn test_plan_without_dispatch() {
    let dir = TempDir::new().unwrap();
    let slide_path = write_slide(dir.path(), 300, 200);

    let pipeline = TilePipeline::new(
        ImageFileSource,
        MemoryStore::new([1, 1, 1]),
        IdentityProcessor,
        test_params(128, 16, 1),
    );
    let plan = pipeline.plan(&slide_path, &Mask::filled(16, 16, 1.0)).unwrap();

    assert_eq!((plan.width, plan.height), (256, 256));
    assert_eq!((plan.unpadded_width, plan.unpadded_height), (300, 200));
    assert_eq!(plan.output_shape(OutputKind::Cell { features: 4 }), [2, 2, 4]);
}

#[test]
fn test_disk_store_from_slide_file() {
    let dir = TempDir::new().unwrap();
    let slide_path = write_slide(dir.path(), 300, 260);
    let mask_path = write_mask(dir.path(), 32, 32, 255);
    let store = DiskStore::create(dir.path().join("out.store"), [512, 512, 3], [128, 128]).unwrap();

    let pipeline = TilePipeline::new(
        ImageFileSource,
        store,
        IdentityProcessor,
        test_params(256, 16, 3),
    );
    let output = pipeline.run(&slide_path, &mask_path).unwrap();

    assert_eq!(output.array.dim(), (260, 300, 3));
    assert_slide_pixels(&output.array, 300, 260);

    // The store keeps the padded result
    let reopened = DiskStore::open(dir.path().join("out.store")).unwrap();
    assert_eq!(reopened.shape(), [512, 512, 3]);
    assert_eq!(reopened.read_full().unwrap().dim(), (512, 512, 3));
}

#[tokio::test]
async fn test_run_async() {
    let dir = TempDir::new().unwrap();
    let slide_path = write_slide(dir.path(), 512, 512);
    let mask_path = write_mask(dir.path(), 32, 32, 255);
    let observer: Arc<dyn PipelineObserver> = Arc::new(CountingObserver::new());

    let pipeline = Arc::new(
        TilePipeline::new(
            ImageFileSource,
            MemoryStore::new([2, 2, 3]),
            MeanIntensityProcessor,
            test_params(256, 16, 2),
        )
        .with_observer(observer),
    );

    let output = pipeline.run_async(slide_path, mask_path).await.unwrap();
    assert_eq!(output.report.written, 4);
    assert_eq!(output.array.dim(), (2, 2, 3));
}

#[tokio::test]
async fn test_run_async_with_preloaded_mask() {
    // Only the top-left tile is covered
    let mask = Mask::from_array(Array2::from_shape_fn((32, 32), |(r, c)| {
        if r < 16 && c < 16 {
            1.0
        } else {
            0.0
        }
    }));
    let source = SharedSlideSource::new(512, 512);

    let pipeline = Arc::new(TilePipeline::new(
        source.clone(),
        MemoryStore::filled([2, 2, 3], -1.0),
        MeanIntensityProcessor,
        test_params(256, 16, 2),
    ));

    let output = pipeline
        .run_async_with_mask("slide.png", mask)
        .await
        .unwrap();
    assert_eq!(output.report.written, 1);
    assert_eq!(output.report.skipped, 3);
    assert_eq!(output.array[[0, 0, 0]], 127.5);
    assert_eq!(output.array[[1, 1, 0]], -1.0);
    assert_eq!(source.open_count(), 3);
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_accepted_regions_are_disjoint(
        flags in proptest::collection::vec(any::<bool>(), 64),
        width in 1u32..24,
        height in 1u32..24,
        ratio in 0.0f32..1.0,
    ) {
        let mask = mask_from_flags(&flags);
        let plan = GridPlanner::with_mask_downsample(2, 2, 1)
            .unwrap()
            .plan((width, height), 1.0, &mask)
            .unwrap();

        let coords: Vec<TileCoordinate> = MaskFilter::new(&plan, &mask, ratio).accepted().collect();
        for (i, a) in coords.iter().enumerate() {
            for b in &coords[i + 1..] {
                let (ar0, ar1, ac0, ac1) = plan.tile_region(*a);
                let (br0, br1, bc0, bc1) = plan.tile_region(*b);
                let overlap = ar0 < br1 && br0 < ar1 && ac0 < bc1 && bc0 < ac1;
                prop_assert!(!overlap, "{} and {} overlap", a, b);
            }
        }
    }
}

/// 8x8 binary mask from 64 flags.
fn mask_from_flags(flags: &[bool]) -> Mask {
    Mask::from_array(Array2::from_shape_fn((8, 8), |(r, c)| {
        if flags[r * 8 + c] {
            1.0
        } else {
            0.0
        }
    }))
}
