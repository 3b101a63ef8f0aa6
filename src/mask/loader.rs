//! Mask file loading.
//!
//! Masks are 8-bit single-channel rasters (PNG, TIFF, JPEG) whose pixel values
//! `0..=255` encode coverage. A missing or undecodable mask is always an
//! error; it is never replaced by a full-coverage default.

use std::path::Path;

use image::{DynamicImage, ImageReader};
use tracing::debug;

use crate::error::MaskError;

use super::Mask;

/// Load a coverage mask from disk.
///
/// # Errors
///
/// - [`MaskError::NotFound`] if the file does not exist
/// - [`MaskError::Decode`] if the file cannot be read or decoded
/// - [`MaskError::NotSingleChannel`] if the image is not 8-bit grayscale
pub fn load_mask(path: impl AsRef<Path>) -> Result<Mask, MaskError> {
    let path = path.as_ref();
    let path_str = path.display().to_string();

    if !path.exists() {
        return Err(MaskError::NotFound { path: path_str });
    }

    let decode_err = |message: String| MaskError::Decode {
        path: path_str.clone(),
        message,
    };

    let image = ImageReader::open(path)
        .map_err(|e| decode_err(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| decode_err(e.to_string()))?
        .decode()
        .map_err(|e| decode_err(e.to_string()))?;

    match image {
        DynamicImage::ImageLuma8(gray) => {
            let mask = Mask::from_gray_image(&gray);
            debug!(
                path = %path_str,
                rows = mask.rows(),
                cols = mask.cols(),
                "Loaded coverage mask"
            );
            Ok(mask)
        }
        other => Err(MaskError::NotSingleChannel {
            path: path_str,
            color_type: format!("{:?}", other.color()),
        }),
    }
}
