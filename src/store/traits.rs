//! OutputStore and StoreWriter traits.
//!
//! An output store is a chunked `f32` array of shape `[rows, cols, channels]`.
//! The orchestrator holds the store itself; each worker opens its own
//! [`StoreWriter`] from it. Writers from different workers may run
//! concurrently as long as they write disjoint regions.

use ndarray::{Array3, ArrayView1, ArrayView3, Axis};

use crate::error::StoreError;

/// Chunked output array shared between the orchestrator and workers.
pub trait OutputStore: Send + Sync {
    /// Per-worker write handle.
    type Writer: StoreWriter + Send + 'static;

    /// Shape of the array as `[rows, cols, channels]`.
    fn shape(&self) -> [usize; 3];

    /// Open an independent write handle.
    fn open_writer(&self) -> Result<Self::Writer, StoreError>;

    /// Read the whole array.
    fn read_full(&self) -> Result<Array3<f32>, StoreError>;
}

/// Write handle onto an [`OutputStore`].
pub trait StoreWriter {
    /// Assign a rectangular region whose top-left corner is `(row, col)`.
    ///
    /// Regions extending past the store are clipped. A region starting
    /// outside the store is an error.
    fn write_region(
        &mut self,
        row: usize,
        col: usize,
        region: ArrayView3<'_, f32>,
    ) -> Result<(), StoreError>;

    /// Assign a single cell (a scalar or feature vector) at `(row, col)`.
    fn write_cell(
        &mut self,
        row: usize,
        col: usize,
        values: ArrayView1<'_, f32>,
    ) -> Result<(), StoreError> {
        let region = values.insert_axis(Axis(0)).insert_axis(Axis(0));
        self.write_region(row, col, region)
    }

    /// Flush buffered writes, if any.
    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Clip a region to the store extent.
///
/// Returns the `(rows, cols)` of the region that fall inside the store.
pub(crate) fn clip_region(
    shape: [usize; 3],
    row: usize,
    col: usize,
    region: &ArrayView3<'_, f32>,
) -> Result<(usize, usize), StoreError> {
    let (height, width, channels) = region.dim();
    if channels != shape[2] {
        return Err(StoreError::ChannelMismatch {
            expected: shape[2],
            actual: channels,
        });
    }
    if row >= shape[0] || col >= shape[1] {
        return Err(StoreError::OutOfBounds { row, col, shape });
    }
    Ok((height.min(shape[0] - row), width.min(shape[1] - col)))
}
