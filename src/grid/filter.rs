//! Mask-driven tile selection.
//!
//! The filter walks the stride grid column by column (outer loop over `x`,
//! inner loop over `y`) and accepts a tile when the mean coverage of its
//! mask window is strictly greater than the configured ratio.
//!
//! Generation order is deterministic, which keeps tests reproducible, but
//! workers consume coordinates in no particular order.

use crate::mask::Mask;

use super::{GridPlan, TileCoordinate};

/// Outcome of the coverage test for one grid position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterDecision {
    pub coord: TileCoordinate,

    /// Mean coverage of the tile's mask window, `None` if the window is empty
    pub mean: Option<f32>,

    pub accepted: bool,
}

/// Decides which grid positions are worth processing.
///
/// # Example
///
/// ```
/// use wsi_tiler::grid::{GridPlanner, MaskFilter, TileCoordinate};
/// use wsi_tiler::mask::Mask;
///
/// let planner = GridPlanner::with_mask_downsample(256, 256, 16).unwrap();
/// let mask = Mask::filled(32, 32, 1.0);
/// let plan = planner.plan((512, 512), 1.0, &mask).unwrap();
///
/// let filter = MaskFilter::new(&plan, &mask, 0.0);
/// let accepted: Vec<TileCoordinate> = filter.accepted().collect();
/// assert_eq!(accepted.len(), 4);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct MaskFilter<'a> {
    plan: &'a GridPlan,
    mask: &'a Mask,
    mask_ratio: f32,
}

impl<'a> MaskFilter<'a> {
    pub fn new(plan: &'a GridPlan, mask: &'a Mask, mask_ratio: f32) -> Self {
        Self {
            plan,
            mask,
            mask_ratio,
        }
    }

    /// Evaluate a single grid position.
    pub fn decide(&self, coord: TileCoordinate) -> FilterDecision {
        let mask_ds = self.plan.mask_ds;
        let mean = self.mask.window_mean(
            (coord.y / mask_ds) as usize,
            (coord.x / mask_ds) as usize,
            self.plan.mask_tile_size as usize,
        );
        let accepted = mean.is_some_and(|m| m > self.mask_ratio);
        FilterDecision {
            coord,
            mean,
            accepted,
        }
    }

    /// All grid positions in generation order, accepted or not.
    pub fn decisions(&self) -> impl Iterator<Item = FilterDecision> + 'a {
        let filter = *self;
        let (width, height, stride) = (
            self.plan.width,
            self.plan.height,
            self.plan.stride as usize,
        );
        (0..width).step_by(stride).flat_map(move |x| {
            (0..height)
                .step_by(stride)
                .map(move |y| filter.decide(TileCoordinate::new(x, y)))
        })
    }

    /// Accepted coordinates only, in generation order.
    pub fn accepted(&self) -> impl Iterator<Item = TileCoordinate> + 'a {
        self.decisions()
            .filter(|decision| decision.accepted)
            .map(|decision| decision.coord)
    }
}

// =============================================================================
// Tests
// =============================================================================
