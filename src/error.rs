use thiserror::Error;

use crate::grid::TileCoordinate;

/// Errors that can occur when loading a coverage mask
#[derive(Debug, Clone, Error)]
pub enum MaskError {
    /// Mask file does not exist
    #[error("Mask not found: {path}")]
    NotFound { path: String },

    /// Mask file exists but could not be read or decoded
    #[error("Failed to decode mask {path}: {message}")]
    Decode { path: String, message: String },

    /// Mask is not an 8-bit single-channel raster
    #[error("Mask {path} must be 8-bit single-channel, got {color_type}")]
    NotSingleChannel { path: String, color_type: String },
}

/// Errors in grid geometry (tile size, magnifications, mask extent)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    /// Tile size must be positive
    #[error("Tile size must be greater than 0")]
    ZeroTileSize,

    /// Stride must be positive
    #[error("Stride must be greater than 0")]
    ZeroStride,

    /// Downsample factor is not a positive finite number
    #[error("Invalid downsample factor: {0}")]
    InvalidDownsample(f64),

    /// Tile and mask magnifications do not give a mask downsample of at least 1
    #[error(
        "Invalid magnifications: tile {tile_magnification}x / mask {mask_magnification}x must be >= 1"
    )]
    InvalidMagnification {
        tile_magnification: f64,
        mask_magnification: f64,
    },

    /// Mask has zero extent along an axis
    #[error("Mask dimensions incompatible with slide: mask is {rows}x{cols}")]
    EmptyMask { rows: usize, cols: usize },

    /// A tile covers less than one mask pixel
    #[error("Tile size {tile_size} is smaller than the mask downsample {mask_ds}")]
    TileSmallerThanMaskPixel { tile_size: u32, mask_ds: u32 },

    /// Slide reports zero width or height
    #[error("Slide has empty dimensions: {width}x{height}")]
    EmptySlide { width: u32, height: u32 },
}

/// Errors from opening or reading a slide
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// Slide file does not exist
    #[error("Slide not found: {0}")]
    NotFound(String),

    /// Slide could not be decoded
    #[error("Failed to decode slide {path}: {message}")]
    Decode { path: String, message: String },

    /// Requested pyramid level does not exist
    #[error("Invalid level {level}: slide has {level_count} levels")]
    InvalidLevel { level: usize, level_count: usize },

    /// Region request is malformed
    #[error("Invalid region request: {0}")]
    InvalidRegion(String),
}

/// Errors from the chunked output store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Filesystem error while accessing the store
    #[error("Store I/O error at {path}: {message}")]
    Io { path: String, message: String },

    /// Store metadata is missing or malformed
    #[error("Invalid store metadata at {path}: {message}")]
    Metadata { path: String, message: String },

    /// Store shape or chunk shape has a zero extent
    #[error("Invalid store shape {shape:?} with chunks {chunks:?}")]
    InvalidShape { shape: [usize; 3], chunks: [usize; 2] },

    /// Region starts outside the store extent
    #[error("Region at ({row}, {col}) is outside store of shape {shape:?}")]
    OutOfBounds {
        row: usize,
        col: usize,
        shape: [usize; 3],
    },

    /// Region channel count does not match the store
    #[error("Channel mismatch: store has {expected} channels, region has {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    /// Array cannot be exported in the requested format
    #[error("Cannot export to {path}: {reason}")]
    UnsupportedExport { path: String, reason: String },
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        StoreError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Every worker has dropped its end of the work queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Work queue disconnected: all workers have exited")]
pub struct QueueDisconnected;

/// Error returned by a tile processing function
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProcessError {
    pub message: String,
}

impl ProcessError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors that terminate a single worker
#[derive(Debug, Clone, Error)]
pub enum WorkerError {
    /// Worker could not open its own slide handle
    #[error("Failed to open slide: {0}")]
    OpenSlide(#[source] SlideError),

    /// Worker could not open its own store writer
    #[error("Failed to open output store: {0}")]
    OpenStore(#[source] StoreError),

    /// Region read failed
    #[error("Failed to read tile at {coord}: {source}")]
    ReadRegion {
        coord: TileCoordinate,
        #[source]
        source: SlideError,
    },

    /// Processing function returned an error
    #[error("Processing failed at {coord}: {source}")]
    Process {
        coord: TileCoordinate,
        #[source]
        source: ProcessError,
    },

    /// Processor returned a result of the wrong kind
    #[error("Processor declared {expected} output but returned {actual} at {coord}")]
    KindMismatch {
        coord: TileCoordinate,
        expected: &'static str,
        actual: &'static str,
    },

    /// Processor returned a result with the wrong shape
    #[error("Processor output at {coord} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        coord: TileCoordinate,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Writing the result into the store failed
    #[error("Failed to write tile at {coord}: {source}")]
    Write {
        coord: TileCoordinate,
        #[source]
        source: StoreError,
    },

    /// Flushing the store writer failed after the last tile
    #[error("Failed to flush output store: {0}")]
    Flush(#[source] StoreError),
}

/// Top-level pipeline errors, one variant per failing stage
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Orchestrator could not open the slide to read its dimensions
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    /// Mask could not be loaded
    #[error("Mask load failed: {0}")]
    MaskLoad(#[from] MaskError),

    /// Grid geometry is invalid
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Pipeline parameters are inconsistent
    #[error("Invalid pipeline parameters: {0}")]
    InvalidParams(String),

    /// Output store does not have the shape the grid needs
    #[error("Output store has shape {actual:?}, grid needs {expected:?}")]
    StoreShape {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    /// At least one worker failed; `source` is the first failure observed
    #[error("Worker {worker_id} failed ({failed_workers} worker(s) failed in total): {source}")]
    Worker {
        worker_id: usize,
        failed_workers: usize,
        #[source]
        source: WorkerError,
    },

    /// A worker thread panicked
    #[error("Worker {worker_id} panicked: {message}")]
    WorkerPanicked { worker_id: usize, message: String },

    /// A worker thread could not be spawned
    #[error("Failed to spawn worker {worker_id}: {message}")]
    Spawn { worker_id: usize, message: String },

    /// Final read of the output store failed
    #[error("Failed to assemble output: {0}")]
    Assemble(#[source] StoreError),

    /// Blocking task could not be joined (async entry point)
    #[error("Pipeline task failed: {0}")]
    Join(String),
}
