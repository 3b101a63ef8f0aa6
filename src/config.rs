//! Configuration management for WSI Tiler.
//!
//! This module provides the command-line interface:
//! - Command-line arguments via clap
//! - Environment variables with the `WSI_TILER_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Commands
//!
//! - `process` - run the tiling pipeline and write the output store
//! - `plan` - print the grid plan and the number of accepted tiles
//!
//! # Environment Variables
//!
//! - `WSI_TILER_SLIDE` - Slide image path
//! - `WSI_TILER_MASK` - Coverage mask path
//! - `WSI_TILER_STORE` - Output store directory
//! - `WSI_TILER_OUTPUT` - Export path for the final array (.png or .json)
//! - `WSI_TILER_TILE_SIZE` - Tile edge length (default: 256)
//! - `WSI_TILER_TILE_MAGNIFICATION` - Tile magnification (default: 20)
//! - `WSI_TILER_STRIDE` - Tile stride (default: tile size)
//! - `WSI_TILER_DOWNSAMPLE` - Global downsample (default: 1)
//! - `WSI_TILER_LEVEL0_DOWNSAMPLE` - Resample from level 0 (default: false)
//! - `WSI_TILER_MASK_MAGNIFICATION` - Mask magnification (default: 1.25)
//! - `WSI_TILER_MASK_RATIO` - Minimum mask coverage (default: 0)
//! - `WSI_TILER_WORKERS` - Worker threads (default: 8)
//! - `WSI_TILER_QUEUE_CAPACITY` - Pending tiles, 0 for unbounded (default: 32)
//! - `WSI_TILER_PROCESSOR` - identity, grayscale or mean-intensity
//! - `WSI_TILER_TRANSFORM` - none or rescale
//! - `WSI_TILER_CHUNK_SIZE` - Store chunk edge length (default: 512)

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::pipeline::{TilingParams, DEFAULT_TILE_SIZE, DEFAULT_WORKERS};
use crate::store::DEFAULT_CHUNK_SIZE;

// =============================================================================
// Default Values
// =============================================================================

/// Default magnification tiles are read at.
pub const DEFAULT_TILE_MAGNIFICATION: f64 = 20.0;

/// Default magnification of the coverage mask.
pub const DEFAULT_MASK_MAGNIFICATION: f64 = 1.25;

/// Default global downsample.
pub const DEFAULT_DOWNSAMPLE: f64 = 1.0;

/// Default minimum mask coverage (exclusive).
pub const DEFAULT_MASK_RATIO: f32 = 0.0;

/// Default queue capacity (4 slots per default worker).
pub const DEFAULT_QUEUE_CAPACITY: usize = 4 * DEFAULT_WORKERS;

// =============================================================================
// CLI Structure
// =============================================================================

/// WSI Tiler - mask-filtered parallel tile processing for Whole Slide Images.
#[derive(Parser, Debug)]
#[command(name = "wsi-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the pipeline over a slide and write the result
    Process(ProcessConfig),

    /// Show the tile grid for a slide without processing it
    Plan(PlanConfig),
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

// =============================================================================
// Shared Geometry Arguments
// =============================================================================

/// Grid geometry and mask filtering options.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct GeometryArgs {
    /// Tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILER_TILE_SIZE")]
    pub tile_size: u32,

    /// Magnification tiles are read at.
    #[arg(long, default_value_t = DEFAULT_TILE_MAGNIFICATION, env = "WSI_TILER_TILE_MAGNIFICATION")]
    pub tile_magnification: f64,

    /// Spacing between tile origins (defaults to the tile size).
    #[arg(long, env = "WSI_TILER_STRIDE")]
    pub stride: Option<u32>,

    /// Global downsample applied to the slide.
    #[arg(long, default_value_t = DEFAULT_DOWNSAMPLE, env = "WSI_TILER_DOWNSAMPLE")]
    pub downsample: f64,

    /// Resample every tile from level 0 instead of the best pyramid level.
    #[arg(long, default_value_t = false, env = "WSI_TILER_LEVEL0_DOWNSAMPLE")]
    pub level0_downsample: bool,

    /// Magnification of the coverage mask.
    #[arg(long, default_value_t = DEFAULT_MASK_MAGNIFICATION, env = "WSI_TILER_MASK_MAGNIFICATION")]
    pub mask_magnification: f64,

    /// Tiles whose mean mask coverage is not above this ratio are skipped.
    #[arg(long, default_value_t = DEFAULT_MASK_RATIO, env = "WSI_TILER_MASK_RATIO")]
    pub mask_ratio: f32,
}

impl Default for GeometryArgs {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            tile_magnification: DEFAULT_TILE_MAGNIFICATION,
            stride: None,
            downsample: DEFAULT_DOWNSAMPLE,
            level0_downsample: false,
            mask_magnification: DEFAULT_MASK_MAGNIFICATION,
            mask_ratio: DEFAULT_MASK_RATIO,
        }
    }
}

impl GeometryArgs {
    /// Validate the geometry and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if self.stride == Some(0) {
            return Err("stride must be greater than 0".to_string());
        }
        if !(self.downsample.is_finite() && self.downsample > 0.0) {
            return Err("downsample must be a positive number".to_string());
        }
        if !(self.tile_magnification > 0.0 && self.mask_magnification > 0.0) {
            return Err("magnifications must be positive".to_string());
        }
        if self.tile_magnification < self.mask_magnification {
            return Err(format!(
                "tile magnification ({}) must be at least the mask magnification ({})",
                self.tile_magnification, self.mask_magnification
            ));
        }
        if !(0.0..=1.0).contains(&self.mask_ratio) {
            return Err("mask_ratio must be between 0 and 1".to_string());
        }
        Ok(())
    }

    /// Effective stride.
    pub fn stride(&self) -> u32 {
        self.stride.unwrap_or(self.tile_size)
    }

    /// Pipeline parameters for this geometry, with default dispatch settings.
    pub fn tiling_params(&self) -> TilingParams {
        TilingParams {
            tile_size: self.tile_size,
            tile_magnification: self.tile_magnification,
            stride: self.stride(),
            downsample: self.downsample,
            downsample_level_0: self.level0_downsample,
            mask_magnification: self.mask_magnification,
            mask_ratio: self.mask_ratio,
            ..TilingParams::default()
        }
    }
}

// =============================================================================
// Process Command
// =============================================================================

/// Built-in tile processors.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessorKind {
    /// Copy RGB pixels into the output
    #[default]
    Identity,

    /// Single-channel luma
    Grayscale,

    /// Per-tile mean of each channel
    MeanIntensity,
}

/// Transforms applied to the assembled output.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformKind {
    /// Leave values unchanged
    #[default]
    None,

    /// Linearly map the value range onto 0..=255
    Rescale,
}

/// Run the tiling pipeline.
#[derive(Args, Debug, Clone)]
pub struct ProcessConfig {
    /// Slide image to process.
    #[arg(env = "WSI_TILER_SLIDE")]
    pub slide: PathBuf,

    /// Coverage mask (8-bit single-channel image).
    #[arg(long, env = "WSI_TILER_MASK")]
    pub mask: PathBuf,

    /// Directory of the chunked output store (recreated on every run).
    #[arg(long, env = "WSI_TILER_STORE")]
    pub store: PathBuf,

    /// Export the final array to this file (.png or .json).
    #[arg(short, long, env = "WSI_TILER_OUTPUT")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub geometry: GeometryArgs,

    /// Number of worker threads.
    #[arg(short, long, default_value_t = DEFAULT_WORKERS, env = "WSI_TILER_WORKERS")]
    pub workers: usize,

    /// Maximum pending tiles in the queue (0 for unbounded).
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, env = "WSI_TILER_QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    /// Keep the grid-alignment padding in the result.
    #[arg(long, default_value_t = false)]
    pub no_unpad: bool,

    /// Scale tile pixels to [0, 1] before processing.
    #[arg(long, default_value_t = false, env = "WSI_TILER_NORMALIZE")]
    pub normalize: bool,

    /// Processing function applied to every tile.
    #[arg(long, value_enum, default_value_t = ProcessorKind::Identity, env = "WSI_TILER_PROCESSOR")]
    pub processor: ProcessorKind,

    /// Transform applied to the assembled output.
    #[arg(long, value_enum, default_value_t = TransformKind::None, env = "WSI_TILER_TRANSFORM")]
    pub transform: TransformKind,

    /// Chunk edge length of the output store.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, env = "WSI_TILER_CHUNK_SIZE")]
    pub chunk_size: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ProcessConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.geometry.validate()?;

        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be greater than 0".to_string());
        }
        if let Some(ref output) = self.output {
            if !has_export_extension(output) {
                return Err(format!(
                    "Unsupported output file {}: expected a .png or .json extension",
                    output.display()
                ));
            }
        }
        Ok(())
    }

    /// Pipeline parameters for this run.
    pub fn tiling_params(&self) -> TilingParams {
        TilingParams {
            n_workers: self.workers,
            unpad: !self.no_unpad,
            queue_capacity: (self.queue_capacity > 0).then_some(self.queue_capacity),
            normalize: self.normalize,
            ..self.geometry.tiling_params()
        }
    }
}

fn has_export_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png") || ext.eq_ignore_ascii_case("json"))
}

// =============================================================================
// Plan Command
// =============================================================================

/// Output format for the plan command.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanOutputFormat {
    /// Human-readable summary
    #[default]
    Text,

    /// JSON object with the plan and tile counts
    Json,
}

/// Show the tile grid for a slide.
#[derive(Args, Debug, Clone)]
pub struct PlanConfig {
    /// Slide image to plan.
    #[arg(env = "WSI_TILER_SLIDE")]
    pub slide: PathBuf,

    /// Coverage mask (8-bit single-channel image).
    #[arg(long, env = "WSI_TILER_MASK")]
    pub mask: PathBuf,

    #[command(flatten)]
    pub geometry: GeometryArgs,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = PlanOutputFormat::Text)]
    pub format: PlanOutputFormat,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl PlanConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.geometry.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
