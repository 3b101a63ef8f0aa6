//! Tile processing functions.
//!
//! A [`TileProcessor`] turns one tile into either a spatial result (written
//! back at the tile's pixel position) or a per-tile cell (a scalar or feature
//! vector written into a coarse grid with one entry per tile).
//!
//! The processor declares which of the two it produces via
//! [`TileProcessor::output_kind`]; workers check every result against that
//! declaration instead of guessing from its shape.

use std::fmt;

use ndarray::{Array1, Array3, Axis};

use crate::error::ProcessError;
use crate::grid::TileCoordinate;
use crate::slide::Tile;

// =============================================================================
// Output Kind
// =============================================================================

/// Declared shape contract of a processor's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// `(tile_size, tile_size, channels)` arrays written at the tile position
    Spatial { channels: usize },

    /// `features` values written into one cell per tile
    Cell { features: usize },
}

impl OutputKind {
    /// Number of values stored per output element.
    pub fn channels(&self) -> usize {
        match *self {
            OutputKind::Spatial { channels } => channels,
            OutputKind::Cell { features } => features,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputKind::Spatial { .. } => "spatial",
            OutputKind::Cell { .. } => "cell",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} channels)", self.name(), self.channels())
    }
}

// =============================================================================
// Tile Output
// =============================================================================

/// Result of processing one tile.
#[derive(Debug, Clone, PartialEq)]
pub enum TileOutput {
    /// Spatial result shaped `(height, width, channels)`
    Spatial(Array3<f32>),

    /// Scalar or feature vector for the whole tile
    Cell(Array1<f32>),
}

impl TileOutput {
    /// A single scalar per tile.
    pub fn scalar(value: f32) -> Self {
        TileOutput::Cell(Array1::from_elem(1, value))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TileOutput::Spatial(_) => "spatial",
            TileOutput::Cell(_) => "cell",
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            TileOutput::Spatial(array) => array.shape().to_vec(),
            TileOutput::Cell(array) => array.shape().to_vec(),
        }
    }
}

// =============================================================================
// TileProcessor Trait
// =============================================================================

/// Per-tile processing function.
///
/// Processors are shared by every worker, so they must be `Send + Sync`.
/// Extra arguments are whatever state the processor carries.
pub trait TileProcessor: Send + Sync {
    /// Shape contract of the results.
    fn output_kind(&self) -> OutputKind;

    /// Process one tile read at `coord`.
    fn process(&self, tile: Tile, coord: TileCoordinate) -> Result<TileOutput, ProcessError>;
}

/// Adapts a closure into a [`TileProcessor`] with a declared output kind.
///
/// # Example
///
/// ```
/// use wsi_tiler::pipeline::{FnProcessor, OutputKind, TileOutput};
///
/// let threshold = 200.0;
/// let processor = FnProcessor::new(OutputKind::Cell { features: 1 }, move |tile, _coord| {
///     let bright = tile.iter().filter(|&&v| v > threshold).count() as f32;
///     Ok(TileOutput::scalar(bright / tile.len() as f32))
/// });
/// ```
pub struct FnProcessor<F> {
    kind: OutputKind,
    func: F,
}

impl<F> FnProcessor<F>
where
    F: Fn(Tile, TileCoordinate) -> Result<TileOutput, ProcessError> + Send + Sync,
{
    pub fn new(kind: OutputKind, func: F) -> Self {
        Self { kind, func }
    }
}

impl<F> TileProcessor for FnProcessor<F>
where
    F: Fn(Tile, TileCoordinate) -> Result<TileOutput, ProcessError> + Send + Sync,
{
    fn output_kind(&self) -> OutputKind {
        self.kind
    }

    fn process(&self, tile: Tile, coord: TileCoordinate) -> Result<TileOutput, ProcessError> {
        (self.func)(tile, coord)
    }
}

// =============================================================================
// Built-in Processors
// =============================================================================

/// Passes RGB pixels through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProcessor;

impl TileProcessor for IdentityProcessor {
    fn output_kind(&self) -> OutputKind {
        OutputKind::Spatial { channels: 3 }
    }

    fn process(&self, tile: Tile, _coord: TileCoordinate) -> Result<TileOutput, ProcessError> {
        Ok(TileOutput::Spatial(tile))
    }
}

/// Converts RGB pixels to single-channel luma (ITU-R BT.601 weights).
#[derive(Debug, Clone, Copy, Default)]
pub struct GrayscaleProcessor;

impl TileProcessor for GrayscaleProcessor {
    fn output_kind(&self) -> OutputKind {
        OutputKind::Spatial { channels: 1 }
    }

    fn process(&self, tile: Tile, _coord: TileCoordinate) -> Result<TileOutput, ProcessError> {
        if tile.len_of(Axis(2)) < 3 {
            return Err(ProcessError::new(format!(
                "grayscale needs 3 channels, tile has {}",
                tile.len_of(Axis(2))
            )));
        }
        let (height, width, _) = tile.dim();
        let gray = Array3::from_shape_fn((height, width, 1), |(row, col, _)| {
            0.299 * tile[[row, col, 0]] + 0.587 * tile[[row, col, 1]] + 0.114 * tile[[row, col, 2]]
        });
        Ok(TileOutput::Spatial(gray))
    }
}

/// Mean value of each channel over the whole tile.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanIntensityProcessor;

impl TileProcessor for MeanIntensityProcessor {
    fn output_kind(&self) -> OutputKind {
        OutputKind::Cell { features: 3 }
    }

    fn process(&self, tile: Tile, _coord: TileCoordinate) -> Result<TileOutput, ProcessError> {
        let means = tile
            .mean_axis(Axis(0))
            .and_then(|rows| rows.mean_axis(Axis(0)))
            .ok_or_else(|| ProcessError::new("empty tile"))?;
        Ok(TileOutput::Cell(means))
    }
}

// =============================================================================
// Tests
// =============================================================================
