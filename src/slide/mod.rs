//! Slide abstraction layer.
//!
//! This module provides a unified interface for reading regions from Whole
//! Slide Images regardless of their underlying format.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Orchestrator / TileWorkers       │
//! └────────────────────┬────────────────────┘
//!                      │ open(path), one handle each
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideSource Trait             │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideReader Trait             │
//! │  (pyramid metadata, read_region)        │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//!             ┌─────────────────┐
//!             │   ImageSlide    │
//!             │ (raster files)  │
//!             └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wsi_tiler::slide::{ImageFileSource, RegionRequest, SlideReader, SlideSource};
//!
//! let slide = ImageFileSource::new().open(Path::new("slide.tiff"))?;
//! let (width, height) = slide.dimensions().unwrap();
//!
//! let read = slide.read_region(&RegionRequest::square((0, 0), 2.0, 256))?;
//! assert_eq!(read.tile.dim(), (256, 256, 3));
//! ```

mod image_slide;
mod reader;

pub use image_slide::{rgb_to_tile, ImageFileSource, ImageSlide};
pub use reader::{RegionRead, RegionRequest, SlideReader, SlideSource, Tile};
