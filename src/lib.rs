//! # WSI Tiler
//!
//! Mask-filtered, parallel tile processing for Whole Slide Images.
//!
//! This library partitions a slide into a grid of fixed-size tiles, keeps the
//! tiles whose coverage mask is above a threshold, processes them on a pool
//! of worker threads and writes every result straight into a chunked output
//! array. Only the tiles in flight are ever held in memory.
//!
//! ## Features
//!
//! - **Grid planning**: padding to whole tiles, capped to the mask coverage
//! - **Mask filtering**: per-tile coverage test on a coarse mask
//! - **Worker pool**: bounded FIFO queue, one end-of-stream marker per worker
//! - **Write-back**: spatial results or per-tile cells into a chunked store
//! - **Finalization**: optional output transform and padding removal
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`mask`] - Coverage mask loading
//! - [`grid`] - Grid geometry and mask-driven tile selection
//! - [`slide`] - Slide reader abstraction and the raster-backed reader
//! - [`store`] - Chunked output stores and array export
//! - [`pipeline`] - Queue, workers, processors and the pipeline entry point
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_tiler::{
//!     mask::load_mask, plan_grid, DiskStore, ImageFileSource, MeanIntensityProcessor,
//!     TilePipeline, TileProcessor, TilingParams,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let params = TilingParams::default().with_workers(4).with_mask_ratio(0.5);
//! let mask = load_mask("slide_mask.png")?;
//!
//! // Size the store from the grid before running
//! let plan = plan_grid(&ImageFileSource, "slide.tiff", &mask, &params)?;
//! let shape = plan.output_shape(MeanIntensityProcessor.output_kind());
//! let store = DiskStore::create("features.store", shape, [512, 512])?;
//!
//! let pipeline = TilePipeline::new(ImageFileSource, store, MeanIntensityProcessor, params);
//! let output = pipeline.run_with_mask("slide.tiff", &mask)?;
//! println!("{} tiles, output {:?}", output.report.written, output.array.shape());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod grid;
pub mod mask;
pub mod pipeline;
pub mod slide;
pub mod store;

// Re-export commonly used types
pub use config::{Cli, Command, GeometryArgs, PlanConfig, ProcessConfig};
pub use error::{
    GeometryError, MaskError, PipelineError, ProcessError, SlideError, StoreError, WorkerError,
};
pub use grid::{padding, GridPlan, GridPlanner, MaskFilter, TileCoordinate};
pub use mask::{load_mask, Mask};
pub use pipeline::{
    plan_grid, CountingObserver, FnProcessor, GrayscaleProcessor, IdentityProcessor,
    MeanIntensityProcessor, NoopObserver, OutputKind, PipelineEvent, PipelineObserver,
    PipelineOutput, PipelineReport, TileOutput, TilePipeline, TileProcessor, TilingParams,
    TracingObserver,
};
pub use slide::{ImageFileSource, ImageSlide, RegionRequest, SlideReader, SlideSource, Tile};
pub use store::{save_array, DiskStore, MemoryStore, OutputStore, StoreWriter};
