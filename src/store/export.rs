//! Saving assembled arrays.
//!
//! The output format is chosen from the file extension:
//!
//! - `.png` - 8-bit grayscale (1 channel) or RGB (3 channels); values are
//!   rounded and clamped to `0..=255`
//! - `.json` - `{"shape": [rows, cols, channels], "data": [...]}` in
//!   row-major order

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::Array3;
use serde::Serialize;

use crate::error::StoreError;

#[derive(Serialize)]
struct ArrayJson<'a> {
    shape: [usize; 3],
    data: &'a [f32],
}

/// Save an array to `path`, picking the format from its extension.
///
/// # Errors
///
/// Returns [`StoreError::UnsupportedExport`] for unknown extensions or a
/// PNG export of an array that does not have 1 or 3 channels.
pub fn save_array(path: impl AsRef<Path>, array: &Array3<f32>) -> Result<(), StoreError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => save_png(path, array),
        Some("json") => save_json(path, array),
        _ => Err(StoreError::UnsupportedExport {
            path: path.display().to_string(),
            reason: "expected a .png or .json extension".to_string(),
        }),
    }
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn save_png(path: &Path, array: &Array3<f32>) -> Result<(), StoreError> {
    let (rows, cols, channels) = array.dim();
    let (width, height) = (cols as u32, rows as u32);

    let result = match channels {
        1 => GrayImage::from_fn(width, height, |x, y| {
            Luma([to_u8(array[[y as usize, x as usize, 0]])])
        })
        .save(path),
        3 => RgbImage::from_fn(width, height, |x, y| {
            let (row, col) = (y as usize, x as usize);
            Rgb([
                to_u8(array[[row, col, 0]]),
                to_u8(array[[row, col, 1]]),
                to_u8(array[[row, col, 2]]),
            ])
        })
        .save(path),
        other => {
            return Err(StoreError::UnsupportedExport {
                path: path.display().to_string(),
                reason: format!("PNG export needs 1 or 3 channels, got {}", other),
            })
        }
    };

    result.map_err(|e| StoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

fn save_json(path: &Path, array: &Array3<f32>) -> Result<(), StoreError> {
    let (rows, cols, channels) = array.dim();
    let data: Vec<f32> = array.iter().copied().collect();
    let file = File::create(path).map_err(|e| StoreError::io(path, e))?;

    serde_json::to_writer(
        BufWriter::new(file),
        &ArrayJson {
            shape: [rows, cols, channels],
            data: &data,
        },
    )
    .map_err(|e| StoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
