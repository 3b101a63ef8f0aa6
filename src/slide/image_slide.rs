//! Raster-backed slide implementation.
//!
//! [`ImageSlide`] decodes a regular raster file (PNG, TIFF, JPEG) with the
//! `image` crate and builds a power-of-two pyramid in memory. It is meant for
//! moderately sized images and tests; it implements the same
//! [`SlideReader`] contract a pyramidal WSI backend would.
//!
//! # Region sampling
//!
//! A request at downsample `d` starting at `(x, y)` covers level-0 pixels
//! from `(x * d, y * d)`. The source level is level 0 when
//! `downsample_level_0` is set, otherwise the best level for `d`. The
//! covered area is cropped from that level (zero outside the image) and
//! resized to the requested size with a triangle filter.

use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{ImageReader, RgbImage};
use ndarray::Array3;
use tracing::debug;

use crate::error::SlideError;

use super::reader::{RegionRead, RegionRequest, SlideReader, SlideSource, Tile};

/// Stop adding pyramid levels once the shorter edge would drop below this.
const MIN_LEVEL_EDGE: u32 = 256;

/// Maximum number of pyramid levels (including level 0).
const MAX_LEVELS: usize = 8;

// =============================================================================
// ImageSlide
// =============================================================================

/// In-memory pyramidal slide built from a single raster image.
///
/// Cloning is cheap: pyramid levels are shared.
#[derive(Debug, Clone)]
pub struct ImageSlide {
    levels: Arc<Vec<RgbImage>>,
    downsamples: Arc<Vec<f64>>,
}

impl ImageSlide {
    /// Build a slide (and its pyramid) from a decoded image.
    pub fn from_image(image: RgbImage) -> Self {
        let (base_w, base_h) = image.dimensions();
        let mut levels = vec![image];
        let mut downsamples = vec![1.0];

        while levels.len() < MAX_LEVELS {
            let Some(last) = levels.last() else { break };
            let (w, h) = last.dimensions();
            if w.min(h) / 2 < MIN_LEVEL_EDGE {
                break;
            }
            let next = imageops::resize(last, w / 2, h / 2, FilterType::Triangle);
            let ds = (f64::from(base_w) / f64::from(next.width())
                + f64::from(base_h) / f64::from(next.height()))
                / 2.0;
            levels.push(next);
            downsamples.push(ds);
        }

        Self {
            levels: Arc::new(levels),
            downsamples: Arc::new(downsamples),
        }
    }

    /// Decode the raster file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SlideError::NotFound`] if the file does not exist and
    /// [`SlideError::Decode`] if it cannot be decoded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SlideError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        if !path.exists() {
            return Err(SlideError::NotFound(path_str));
        }

        let decode_err = |message: String| SlideError::Decode {
            path: path_str.clone(),
            message,
        };

        let image = ImageReader::open(path)
            .map_err(|e| decode_err(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| decode_err(e.to_string()))?
            .decode()
            .map_err(|e| decode_err(e.to_string()))?
            .to_rgb8();

        let slide = Self::from_image(image);
        debug!(
            path = %path_str,
            dimensions = ?slide.dimensions(),
            levels = slide.level_count(),
            "Opened image slide"
        );
        Ok(slide)
    }
}

impl SlideReader for ImageSlide {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|img| img.dimensions())
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.downsamples.get(level).copied()
    }

    fn read_region(&self, request: &RegionRequest) -> Result<RegionRead, SlideError> {
        let (out_w, out_h) = request.size;
        if out_w == 0 || out_h == 0 {
            return Err(SlideError::InvalidRegion(format!(
                "size must be non-zero, got {}x{}",
                out_w, out_h
            )));
        }
        if !(request.downsample.is_finite() && request.downsample > 0.0) {
            return Err(SlideError::InvalidRegion(format!(
                "downsample must be positive, got {}",
                request.downsample
            )));
        }

        let level = if request.downsample_level_0 {
            0
        } else {
            self.best_level_for_downsample(request.downsample)
        };
        let source = self.levels.get(level).ok_or(SlideError::InvalidLevel {
            level,
            level_count: self.levels.len(),
        })?;
        let level_downsample = self.downsamples[level];

        // Scale from the requested space into the source level's space
        let residual = request.downsample / level_downsample;
        let (x, y) = request.origin;
        let src_x = (f64::from(x) * residual).floor() as i64;
        let src_y = (f64::from(y) * residual).floor() as i64;
        let src_w = (f64::from(out_w) * residual).round().max(1.0) as u32;
        let src_h = (f64::from(out_h) * residual).round().max(1.0) as u32;

        let mut canvas = RgbImage::new(src_w, src_h);
        imageops::replace(&mut canvas, source, -src_x, -src_y);

        let region = if (src_w, src_h) == (out_w, out_h) {
            canvas
        } else {
            imageops::resize(&canvas, out_w, out_h, FilterType::Triangle)
        };

        Ok(RegionRead {
            tile: rgb_to_tile(&region, request.normalize),
            level,
            level_downsample,
        })
    }
}

// =============================================================================
// ImageFileSource
// =============================================================================

/// [`SlideSource`] that decodes raster files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileSource;

impl ImageFileSource {
    pub fn new() -> Self {
        Self
    }
}

impl SlideSource for ImageFileSource {
    type Reader = ImageSlide;

    fn open(&self, path: &Path) -> Result<Self::Reader, SlideError> {
        ImageSlide::open(path)
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Convert an RGB image into a `(height, width, 3)` tile.
pub fn rgb_to_tile(image: &RgbImage, normalize: bool) -> Tile {
    let scale = if normalize { 255.0 } else { 1.0 };
    let (width, height) = image.dimensions();
    Array3::from_shape_fn(
        (height as usize, width as usize, 3),
        |(row, col, channel)| {
            f32::from(image.get_pixel(col as u32, row as u32)[channel]) / scale
        },
    )
}

// =============================================================================
// Tests
// =============================================================================
