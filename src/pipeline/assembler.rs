//! Output finalization.
//!
//! Once every worker has joined, the assembler reads the whole store, applies
//! the caller's output transform and removes the grid-alignment padding.

use ndarray::{s, Array3};
use tracing::debug;

use crate::error::StoreError;
use crate::grid::GridPlan;
use crate::store::OutputStore;

use super::processor::OutputKind;

/// Transform applied to the full output array before unpadding.
pub type OutputTransform = Box<dyn Fn(Array3<f32>) -> Array3<f32> + Send + Sync>;

/// Reads, transforms and crops the finished output.
pub struct OutputAssembler<'a> {
    plan: &'a GridPlan,
    kind: OutputKind,
    unpad: bool,
    transform: Option<&'a OutputTransform>,
}

impl<'a> OutputAssembler<'a> {
    pub fn new(plan: &'a GridPlan, kind: OutputKind, unpad: bool) -> Self {
        Self {
            plan,
            kind,
            unpad,
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Option<&'a OutputTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Read the full store and finalize it.
    pub fn assemble<O: OutputStore>(&self, store: &O) -> Result<Array3<f32>, StoreError> {
        let array = store.read_full()?;
        Ok(self.finalize(array))
    }

    /// Apply the transform, then crop padding if requested.
    pub fn finalize(&self, array: Array3<f32>) -> Array3<f32> {
        let array = match self.transform {
            Some(transform) => transform(array),
            None => array,
        };

        match self.kind {
            OutputKind::Spatial { .. } if self.unpad => {
                unpad(array, self.plan.pad_w as usize, self.plan.pad_h as usize)
            }
            _ => array,
        }
    }
}

/// Drop the last `pad_h` rows and `pad_w` columns.
///
/// Padding larger than the array leaves an empty axis. Zero padding returns
/// the array unchanged.
pub fn unpad(array: Array3<f32>, pad_w: usize, pad_h: usize) -> Array3<f32> {
    if pad_w == 0 && pad_h == 0 {
        return array;
    }
    let (rows, cols, _) = array.dim();
    let keep_rows = rows.saturating_sub(pad_h);
    let keep_cols = cols.saturating_sub(pad_w);
    debug!(rows, cols, keep_rows, keep_cols, "Removing padding");
    array.slice(s![..keep_rows, ..keep_cols, ..]).to_owned()
}

/// Linearly map the value range of `array` onto `0..=255`.
///
/// A constant array maps to zeros.
pub fn rescale(array: Array3<f32>) -> Array3<f32> {
    let (min, max) = array
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !(range.is_finite() && range > 0.0) {
        return array.mapv_into(|_| 0.0);
    }
    array.mapv_into(|v| (v - min) / range * 255.0)
}
