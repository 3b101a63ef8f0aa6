//! SlideReader and SlideSource traits for format-agnostic slide access.
//!
//! This module defines the two capabilities the tiling pipeline needs from
//! an image source:
//!
//! - [`SlideSource`] opens a slide from a path. Every worker calls it on its
//!   own, so handles are never shared between workers.
//! - [`SlideReader`] exposes pyramid metadata and reads arbitrary
//!   rectangular regions at a given downsample.
//!
//! Regions are returned as [`Tile`]s: `(height, width, 3)` arrays of `f32`.

use std::path::Path;

use ndarray::Array3;

use crate::error::SlideError;

/// Pixel buffer for one region, shaped `(height, width, channels)`.
///
/// Values are raw `0..=255` unless normalization was requested, in which
/// case they are scaled to `0..=1`.
pub type Tile = Array3<f32>;

// =============================================================================
// Region Request
// =============================================================================

/// Parameters for a region read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionRequest {
    /// Top-left corner `(x, y)` in the downsampled coordinate space
    pub origin: (u32, u32),

    /// Downsample factor relative to level 0
    pub downsample: f64,

    /// Output size `(width, height)` in pixels
    pub size: (u32, u32),

    /// Scale pixel values to `[0, 1]`
    pub normalize: bool,

    /// Resample directly from level 0 instead of the best pyramid level
    pub downsample_level_0: bool,
}

impl RegionRequest {
    /// Square, unnormalized region read from the best pyramid level.
    pub fn square(origin: (u32, u32), downsample: f64, size: u32) -> Self {
        Self {
            origin,
            downsample,
            size: (size, size),
            normalize: false,
            downsample_level_0: false,
        }
    }

    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    pub fn with_downsample_level_0(mut self, downsample_level_0: bool) -> Self {
        self.downsample_level_0 = downsample_level_0;
        self
    }
}

/// Result of a region read: the pixels and where they were sampled from.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionRead {
    pub tile: Tile,

    /// Pyramid level the pixels were sampled from
    pub level: usize,

    /// Downsample of that level relative to level 0
    pub level_downsample: f64,
}

// =============================================================================
// SlideReader Trait
// =============================================================================

/// Format-agnostic interface for reading regions from Whole Slide Images.
///
/// Level 0 is always the highest resolution. Higher levels have
/// progressively larger downsample factors.
pub trait SlideReader: Send {
    /// Get the number of pyramid levels.
    fn level_count(&self) -> usize;

    /// Get dimensions of a specific level.
    ///
    /// Returns `(width, height)` in pixels, or `None` if level is out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// Get the downsample factor for a level.
    ///
    /// Level 0 always has downsample 1.0. Returns `None` if level is out of range.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// Read a region.
    ///
    /// Pixels outside the slide bounds read as zero.
    fn read_region(&self, request: &RegionRequest) -> Result<RegionRead, SlideError>;

    /// Get dimensions of the full-resolution (level 0) image.
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.level_dimensions(0)
    }

    /// Find the best level for a given downsample factor.
    ///
    /// Returns the level with the largest downsample that does not exceed the
    /// requested factor, so no resolution is lost. Falls back to level 0.
    fn best_level_for_downsample(&self, downsample: f64) -> usize {
        (0..self.level_count())
            .filter_map(|level| self.level_downsample(level).map(|ds| (level, ds)))
            .filter(|&(_, ds)| ds <= downsample)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(level, _)| level)
            .unwrap_or(0)
    }
}

// =============================================================================
// SlideSource Trait
// =============================================================================

/// Opens slides from a path.
///
/// Each call returns an independent reader; the pipeline opens one per
/// worker plus one for the orchestrator.
pub trait SlideSource: Send + Sync {
    /// The type of reader this source creates.
    type Reader: SlideReader + 'static;

    /// Open the slide at `path`.
    fn open(&self, path: &Path) -> Result<Self::Reader, SlideError>;
}

// =============================================================================
// Tests
// =============================================================================
