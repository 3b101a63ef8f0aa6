//! In-memory output store.
//!
//! Backed by a single array behind a mutex. Useful for tests and for outputs
//! small enough to keep in memory; every writer shares the same array.

use std::sync::{Arc, Mutex, PoisonError};

use ndarray::{s, Array3, ArrayView3};

use crate::error::StoreError;

use super::traits::{clip_region, OutputStore, StoreWriter};

/// Output store held entirely in memory.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    data: Arc<Mutex<Array3<f32>>>,
    shape: [usize; 3],
}

impl MemoryStore {
    /// Create a zero-filled store.
    pub fn new(shape: [usize; 3]) -> Self {
        Self::filled(shape, 0.0)
    }

    /// Create a store with every element set to `value`.
    pub fn filled(shape: [usize; 3], value: f32) -> Self {
        Self {
            data: Arc::new(Mutex::new(Array3::from_elem(
                (shape[0], shape[1], shape[2]),
                value,
            ))),
            shape,
        }
    }
}

impl OutputStore for MemoryStore {
    type Writer = MemoryStoreWriter;

    fn shape(&self) -> [usize; 3] {
        self.shape
    }

    fn open_writer(&self) -> Result<Self::Writer, StoreError> {
        Ok(MemoryStoreWriter {
            data: Arc::clone(&self.data),
            shape: self.shape,
        })
    }

    fn read_full(&self) -> Result<Array3<f32>, StoreError> {
        Ok(self
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

/// Write handle onto a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryStoreWriter {
    data: Arc<Mutex<Array3<f32>>>,
    shape: [usize; 3],
}

impl StoreWriter for MemoryStoreWriter {
    fn write_region(
        &mut self,
        row: usize,
        col: usize,
        region: ArrayView3<'_, f32>,
    ) -> Result<(), StoreError> {
        let (rows, cols) = clip_region(self.shape, row, col, &region)?;
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        data.slice_mut(s![row..row + rows, col..col + cols, ..])
            .assign(&region.slice(s![..rows, ..cols, ..]));
        Ok(())
    }
}
