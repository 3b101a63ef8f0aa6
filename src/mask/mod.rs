//! Coverage masks.
//!
//! A mask is a coarse raster of coverage ratios in `[0, 1]` (typically a
//! tissue-vs-background segmentation) used to decide which tiles are worth
//! processing. It is stored as an 8-bit single-channel image on disk and
//! loaded once, before any tile is dispatched.
//!
//! # Example
//!
//! ```ignore
//! use wsi_tiler::mask::load_mask;
//!
//! let mask = load_mask("slides/sample_mask.png")?;
//! println!("Mask is {}x{}", mask.rows(), mask.cols());
//! ```

mod loader;

pub use loader::load_mask;

use image::GrayImage;
use ndarray::{s, Array2};

/// Coverage raster with values in `[0, 1]`.
///
/// Rows index the vertical axis, columns the horizontal one, matching the
/// `(y, x)` layout of the tile grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    data: Array2<f32>,
}

impl Mask {
    /// Wrap an existing coverage array.
    ///
    /// Values are not clamped; callers are expected to pass ratios in `[0, 1]`.
    pub fn from_array(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Build a mask from an 8-bit grayscale image (value / 255).
    pub fn from_gray_image(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let data = Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
            f32::from(image.get_pixel(col as u32, row as u32)[0]) / 255.0
        });
        Self { data }
    }

    /// Mask filled with a constant coverage value.
    pub fn filled(rows: usize, cols: usize, value: f32) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), value),
        }
    }

    /// Number of mask rows (vertical extent).
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of mask columns (horizontal extent).
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Borrow the underlying array.
    pub fn as_array(&self) -> &Array2<f32> {
        &self.data
    }

    /// Mean coverage of a square window, clipped to the mask bounds.
    ///
    /// Returns `None` when the clipped window is empty.
    pub fn window_mean(&self, row: usize, col: usize, size: usize) -> Option<f32> {
        let row_end = row.saturating_add(size).min(self.rows());
        let col_end = col.saturating_add(size).min(self.cols());
        if row >= row_end || col >= col_end {
            return None;
        }
        self.data.slice(s![row..row_end, col..col_end]).mean()
    }
}

// =============================================================================
// Tests
// =============================================================================
