//! Grid geometry planning.
//!
//! The planner turns slide dimensions, a tile size and a coverage mask into
//! the bounds of the tile grid:
//!
//! 1. Unpadded dimensions are the level-0 dimensions divided by the global
//!    downsample, rounded to the nearest integer (ties to even).
//! 2. Each axis is padded up to the next multiple of the tile size.
//! 3. Each axis is then capped to the area covered by the mask, so the grid
//!    never extends past available mask coverage.
//!
//! The recorded padding is what remains of it after the cap. A grid capped
//! below the unpadded size has no padding on that axis.

use serde::Serialize;

use crate::error::GeometryError;
use crate::mask::Mask;
use crate::pipeline::OutputKind;

use super::TileCoordinate;

// =============================================================================
// Padding
// =============================================================================

/// Padding needed to bring `width` and `height` up to multiples of `tile_size`.
///
/// Returns `(pad_w, pad_h)`, each in `0..tile_size`. A dimension that is
/// already a multiple of the tile size gets no padding.
///
/// # Panics
///
/// Panics if `tile_size` is 0.
pub fn padding(tile_size: u32, width: u32, height: u32) -> (u32, u32) {
    (
        pad_axis(tile_size, width),
        pad_axis(tile_size, height),
    )
}

fn pad_axis(tile_size: u32, dim: u32) -> u32 {
    let padded = u64::from(dim).div_ceil(u64::from(tile_size)) * u64::from(tile_size);
    (padded - u64::from(dim)) as u32
}

// =============================================================================
// Grid Plan
// =============================================================================

/// Geometry of the tile grid for one pipeline invocation.
///
/// The grid itself is not materialized; this only records its bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridPlan {
    /// Tile edge length in output pixels
    pub tile_size: u32,

    /// Spacing between consecutive tile origins
    pub stride: u32,

    /// Grid width after padding and mask cap
    pub width: u32,

    /// Grid height after padding and mask cap
    pub height: u32,

    /// Columns of padding on the right, after the mask cap
    pub pad_w: u32,

    /// Rows of padding at the bottom, after the mask cap
    pub pad_h: u32,

    /// Width before padding (slide width / downsample)
    pub unpadded_width: u32,

    /// Height before padding (slide height / downsample)
    pub unpadded_height: u32,

    /// Ratio between tile resolution and mask resolution
    pub mask_ds: u32,

    /// Tile edge length in mask pixels
    pub mask_tile_size: u32,
}

impl GridPlan {
    /// Number of tile origins along the horizontal axis.
    pub fn columns(&self) -> u32 {
        self.width.div_ceil(self.stride)
    }

    /// Number of tile origins along the vertical axis.
    pub fn rows(&self) -> u32 {
        self.height.div_ceil(self.stride)
    }

    /// Total number of tile origins on the stride grid (before filtering).
    pub fn candidate_count(&self) -> u64 {
        u64::from(self.columns()) * u64::from(self.rows())
    }

    /// Whether tiles on this grid overlap each other.
    pub fn has_overlap(&self) -> bool {
        self.stride < self.tile_size
    }

    /// Write region of a tile in the spatial output, as
    /// `(row_start, row_end, col_start, col_end)`.
    pub fn tile_region(&self, coord: TileCoordinate) -> (u64, u64, u64, u64) {
        let (x, y, size) = (
            u64::from(coord.x),
            u64::from(coord.y),
            u64::from(self.tile_size),
        );
        (y, y + size, x, x + size)
    }

    /// Shape `[rows, cols, channels]` of an output store holding this grid.
    ///
    /// Spatial outputs cover the padded pixel grid; cell outputs hold one
    /// entry per tile.
    pub fn output_shape(&self, kind: OutputKind) -> [usize; 3] {
        match kind {
            OutputKind::Spatial { channels } => {
                [self.height as usize, self.width as usize, channels]
            }
            OutputKind::Cell { features } => [
                self.height.div_ceil(self.tile_size) as usize,
                self.width.div_ceil(self.tile_size) as usize,
                features,
            ],
        }
    }
}

// =============================================================================
// Grid Planner
// =============================================================================

/// Computes [`GridPlan`]s from slide dimensions and a coverage mask.
///
/// # Example
///
/// ```
/// use wsi_tiler::grid::GridPlanner;
/// use wsi_tiler::mask::Mask;
///
/// let planner = GridPlanner::new(256, 256, 20.0, 1.25).unwrap();
/// let mask = Mask::filled(64, 64, 1.0);
///
/// let plan = planner.plan((300, 300), 1.0, &mask).unwrap();
/// assert_eq!((plan.width, plan.height), (512, 512));
/// assert_eq!((plan.pad_w, plan.pad_h), (212, 212));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPlanner {
    tile_size: u32,
    stride: u32,
    mask_ds: u32,
}

impl GridPlanner {
    /// Create a planner.
    ///
    /// `mask_ds` is `tile_magnification / mask_magnification`, truncated.
    ///
    /// # Errors
    ///
    /// Returns an error if the tile size or stride is 0, if a magnification is
    /// not a positive finite number, or if the mask downsample is below 1.
    pub fn new(
        tile_size: u32,
        stride: u32,
        tile_magnification: f64,
        mask_magnification: f64,
    ) -> Result<Self, GeometryError> {
        if tile_size == 0 {
            return Err(GeometryError::ZeroTileSize);
        }
        if stride == 0 {
            return Err(GeometryError::ZeroStride);
        }

        let invalid = || GeometryError::InvalidMagnification {
            tile_magnification,
            mask_magnification,
        };
        if !(tile_magnification.is_finite() && tile_magnification > 0.0)
            || !(mask_magnification.is_finite() && mask_magnification > 0.0)
        {
            return Err(invalid());
        }

        let ratio = (tile_magnification / mask_magnification).trunc();
        if ratio < 1.0 || ratio > f64::from(u32::MAX) {
            return Err(invalid());
        }

        Ok(Self {
            tile_size,
            stride,
            mask_ds: ratio as u32,
        })
    }

    /// Create a planner from an explicit mask downsample.
    pub fn with_mask_downsample(
        tile_size: u32,
        stride: u32,
        mask_ds: u32,
    ) -> Result<Self, GeometryError> {
        Self::new(tile_size, stride, f64::from(mask_ds), 1.0)
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn mask_downsample(&self) -> u32 {
        self.mask_ds
    }

    /// Plan the grid for a slide.
    ///
    /// # Arguments
    ///
    /// * `level0_dimensions` - `(width, height)` of the slide at level 0
    /// * `downsample` - Global downsample applied to the slide
    /// * `mask` - Coverage mask, at `mask_ds` times coarser resolution
    ///
    /// # Errors
    ///
    /// Returns an error if the downsample is invalid, the slide is empty after
    /// downsampling, the mask has zero extent, or a tile covers less than one
    /// mask pixel.
    pub fn plan(
        &self,
        level0_dimensions: (u32, u32),
        downsample: f64,
        mask: &Mask,
    ) -> Result<GridPlan, GeometryError> {
        if !(downsample.is_finite() && downsample > 0.0) {
            return Err(GeometryError::InvalidDownsample(downsample));
        }
        if mask.rows() == 0 || mask.cols() == 0 {
            return Err(GeometryError::EmptyMask {
                rows: mask.rows(),
                cols: mask.cols(),
            });
        }

        let mask_tile_size = self.tile_size / self.mask_ds;
        if mask_tile_size == 0 {
            return Err(GeometryError::TileSmallerThanMaskPixel {
                tile_size: self.tile_size,
                mask_ds: self.mask_ds,
            });
        }

        let (level0_w, level0_h) = level0_dimensions;
        let unpadded_width = (f64::from(level0_w) / downsample).round_ties_even() as u32;
        let unpadded_height = (f64::from(level0_h) / downsample).round_ties_even() as u32;
        if unpadded_width == 0 || unpadded_height == 0 {
            return Err(GeometryError::EmptySlide {
                width: unpadded_width,
                height: unpadded_height,
            });
        }

        let (full_pad_w, full_pad_h) = padding(self.tile_size, unpadded_width, unpadded_height);

        let mask_width = mask.cols() as u64 * u64::from(self.mask_ds);
        let mask_height = mask.rows() as u64 * u64::from(self.mask_ds);
        let width = (u64::from(unpadded_width) + u64::from(full_pad_w)).min(mask_width) as u32;
        let height = (u64::from(unpadded_height) + u64::from(full_pad_h)).min(mask_height) as u32;
        let pad_w = width.saturating_sub(unpadded_width);
        let pad_h = height.saturating_sub(unpadded_height);

        Ok(GridPlan {
            tile_size: self.tile_size,
            stride: self.stride,
            width,
            height,
            pad_w,
            pad_h,
            unpadded_width,
            unpadded_height,
            mask_ds: self.mask_ds,
            mask_tile_size,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
