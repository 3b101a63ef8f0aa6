//! Error handling tests.
//!
//! Each pipeline stage reports its own error variant: mask loading, grid
//! geometry, slide access, worker failures and worker panics.

use std::sync::Arc;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use wsi_tiler::error::{
    GeometryError, MaskError, PipelineError, ProcessError, SlideError, WorkerError,
};
use wsi_tiler::grid::TileCoordinate;
use wsi_tiler::pipeline::{
    CountingObserver, FnProcessor, IdentityProcessor, OutputKind, TileOutput, TilePipeline,
};
use wsi_tiler::slide::ImageFileSource;
use wsi_tiler::store::MemoryStore;

use super::test_utils::{
    test_params, write_mask, FailAtProcessor, MisdeclaredProcessor, PanickingProcessor,
    SharedSlideSource,
};

#[test]
fn test_worker_failure_surfaces() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);
    let observer = Arc::new(CountingObserver::new());

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([512, 512, 3]),
        FailAtProcessor {
            fail_at: TileCoordinate::new(256, 0),
        },
        test_params(256, 16, 2),
    )
    .with_observer(observer.clone());

    match pipeline.run("slide.png", &mask_path) {
        Err(PipelineError::Worker {
            source: WorkerError::Process { coord, source },
            failed_workers,
            ..
        }) => {
            assert_eq!(coord, TileCoordinate::new(256, 0));
            assert!(source.message.contains("refusing"));
            assert_eq!(failed_workers, 1);
        }
        other => panic!("Expected worker process error, got {:?}", other),
    }
    assert_eq!(observer.workers_failed(), 1);
}

#[test]
fn test_every_worker_failing_does_not_deadlock() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 64, 64, 255);

    let processor = FnProcessor::new(
        OutputKind::Spatial { channels: 3 },
        |_tile, _coord: TileCoordinate| Err(ProcessError::new("always fails")),
    );
    let mut params = test_params(64, 16, 1);
    params.queue_capacity = Some(1);
    let pipeline = TilePipeline::new(
        SharedSlideSource::new(1024, 1024),
        MemoryStore::new([1024, 1024, 3]),
        processor,
        params,
    );

    match pipeline.run("slide.png", &mask_path) {
        Err(PipelineError::Worker {
            worker_id,
            failed_workers,
            ..
        }) => {
            assert_eq!(worker_id, 0);
            assert_eq!(failed_workers, 1);
        }
        other => panic!("Expected worker error, got {:?}", other),
    }
}

#[test]
fn test_kind_mismatch_is_worker_fatal() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([512, 512, 1]),
        MisdeclaredProcessor,
        test_params(256, 16, 2),
    );

    let result = pipeline.run("slide.png", &mask_path);
    assert!(matches!(
        result,
        Err(PipelineError::Worker {
            source: WorkerError::KindMismatch {
                expected: "spatial",
                actual: "cell",
                ..
            },
            ..
        })
    ));
}

#[test]
fn test_shape_mismatch_is_worker_fatal() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    // Declares 3 features but returns 2
    let processor = FnProcessor::new(
        OutputKind::Cell { features: 3 },
        |_tile, _coord: TileCoordinate| Ok(TileOutput::Cell(ndarray::Array1::zeros(2))),
    );
    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([2, 2, 3]),
        processor,
        test_params(256, 16, 2),
    );

    assert!(matches!(
        pipeline.run("slide.png", &mask_path),
        Err(PipelineError::Worker {
            source: WorkerError::ShapeMismatch { .. },
            ..
        })
    ));
}

#[test]
fn test_worker_panic_is_reported() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([2, 2, 1]),
        PanickingProcessor,
        test_params(256, 16, 2),
    );

    match pipeline.run("slide.png", &mask_path) {
        Err(PipelineError::WorkerPanicked { message, .. }) => {
            assert!(message.contains("processor blew up"));
        }
        other => panic!("Expected worker panic, got {:?}", other),
    }
}

#[test]
fn test_missing_mask() {
    let dir = TempDir::new().unwrap();

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([512, 512, 3]),
        IdentityProcessor,
        test_params(256, 16, 2),
    );

    let result = pipeline.run("slide.png", dir.path().join("missing_mask.png"));
    assert!(matches!(
        result,
        Err(PipelineError::MaskLoad(MaskError::NotFound { .. }))
    ));
}

#[test]
fn test_rgb_mask_rejected() {
    let dir = TempDir::new().unwrap();
    let mask_path = dir.path().join("rgb_mask.png");
    RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]))
        .save(&mask_path)
        .unwrap();

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([512, 512, 3]),
        IdentityProcessor,
        test_params(256, 16, 2),
    );

    assert!(matches!(
        pipeline.run("slide.png", &mask_path),
        Err(PipelineError::MaskLoad(MaskError::NotSingleChannel { .. }))
    ));
}

#[test]
fn test_missing_slide() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let pipeline = TilePipeline::new(
        ImageFileSource,
        MemoryStore::new([512, 512, 3]),
        IdentityProcessor,
        test_params(256, 16, 2),
    );

    assert!(matches!(
        pipeline.run(dir.path().join("missing_slide.png"), &mask_path),
        Err(PipelineError::Slide(SlideError::NotFound(_)))
    ));
}

#[test]
fn test_tile_smaller_than_mask_pixel() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([512, 512, 3]),
        IdentityProcessor,
        test_params(8, 16, 2),
    );

    assert!(matches!(
        pipeline.run("slide.png", &mask_path),
        Err(PipelineError::Geometry(
            GeometryError::TileSmallerThanMaskPixel { .. }
        ))
    ));
}

#[test]
fn test_store_shape_mismatch() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([512, 512, 1]),
        IdentityProcessor,
        test_params(256, 16, 2),
    );

    match pipeline.run("slide.png", &mask_path) {
        Err(PipelineError::StoreShape { expected, actual }) => {
            assert_eq!(expected, [512, 512, 3]);
            assert_eq!(actual, [512, 512, 1]);
        }
        other => panic!("Expected store shape error, got {:?}", other),
    }
}

#[test]
fn test_zero_workers_rejected() {
    let dir = TempDir::new().unwrap();
    let mask_path = write_mask(dir.path(), 32, 32, 255);

    let mut params = test_params(256, 16, 1);
    params.n_workers = 0;
    let pipeline = TilePipeline::new(
        SharedSlideSource::new(512, 512),
        MemoryStore::new([512, 512, 3]),
        IdentityProcessor,
        params,
    );

    assert!(matches!(
        pipeline.run("slide.png", &mask_path),
        Err(PipelineError::InvalidParams(_))
    ));
}
