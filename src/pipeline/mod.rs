//! Tile dispatch, processing and write-back.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!                 │ TilePipeline │  plan grid, stream accepted coords
//!                 └──────┬───────┘
//!                        │ WorkItem::Tile / EndOfStream
//!                        ▼
//!                 ┌──────────────┐
//!                 │  WorkQueue   │  FIFO, one marker per worker
//!                 └──────┬───────┘
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │TileWorker│  │TileWorker│  │TileWorker│  own slide + store handles
//!    └────┬─────┘  └────┬─────┘  └────┬─────┘
//!         │ read → process → write    │
//!         ▼             ▼             ▼
//!    ┌─────────────────────────────────────┐
//!    │            OutputStore              │
//!    └──────────────────┬──────────────────┘
//!                       ▼
//!               ┌─────────────────┐
//!               │ OutputAssembler │  transform, unpad
//!               └─────────────────┘
//! ```

mod assembler;
mod observer;
mod processor;
mod queue;
mod runner;
mod worker;

pub use assembler::{rescale, unpad, OutputAssembler, OutputTransform};
pub use observer::{
    CountingObserver, NoopObserver, PipelineEvent, PipelineObserver, TracingObserver,
};
pub use processor::{
    FnProcessor, GrayscaleProcessor, IdentityProcessor, MeanIntensityProcessor, OutputKind,
    TileOutput, TileProcessor,
};
pub use queue::{WorkItem, WorkQueue};
pub use runner::{
    plan_grid, PipelineOutput, PipelineReport, TilePipeline, TilingParams, DEFAULT_TILE_SIZE,
    DEFAULT_WORKERS,
};
