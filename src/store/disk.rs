//! Chunked on-disk output store.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── store.json      shape, chunk shape, dtype, fill value
//! └── c/
//!     ├── 0.0         chunk (row 0, col 0)
//!     ├── 0.1
//!     └── ...
//! ```
//!
//! Each chunk holds `chunk_rows x chunk_cols x channels` little-endian `f32`
//! values in row-major order. Edge chunks are stored at full size. Chunk
//! files are created on first write; a missing chunk reads as the fill value.
//!
//! # Concurrent writers
//!
//! Every [`DiskStoreWriter`] opens its own file handles. A region write is a
//! series of positioned writes covering exactly the region's bytes, with no
//! read-modify-write, so writers touching disjoint regions never interfere,
//! even when those regions share a chunk.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use ndarray::{s, Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;

use super::traits::{clip_region, OutputStore, StoreWriter};

/// Name of the metadata file at the store root.
const METADATA_FILE: &str = "store.json";

/// Directory holding chunk files.
const CHUNK_DIR: &str = "c";

/// Only supported element type.
const DTYPE: &str = "<f4";

/// Default chunk edge length in elements.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

// =============================================================================
// Metadata
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoreMetadata {
    shape: [usize; 3],
    chunks: [usize; 2],
    dtype: String,
    fill_value: f32,
}

impl StoreMetadata {
    fn chunk_len(&self) -> usize {
        self.chunks[0] * self.chunks[1] * self.shape[2]
    }

    fn chunk_bytes(&self) -> u64 {
        (self.chunk_len() * std::mem::size_of::<f32>()) as u64
    }

    fn chunk_grid(&self) -> (usize, usize) {
        (
            self.shape[0].div_ceil(self.chunks[0]),
            self.shape[1].div_ceil(self.chunks[1]),
        )
    }
}

// =============================================================================
// DiskStore
// =============================================================================

/// Chunked `f32` array persisted in a directory.
///
/// Cloning only copies the path and metadata, so a store can be handed to
/// every worker cheaply.
///
/// # Example
///
/// ```ignore
/// use wsi_tiler::store::{DiskStore, OutputStore, StoreWriter};
///
/// let store = DiskStore::create("out.store", [1024, 1024, 3], [256, 256])?;
/// let mut writer = store.open_writer()?;
/// writer.write_region(0, 0, tile.view())?;
/// let array = store.read_full()?;
/// ```
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
    meta: StoreMetadata,
}

impl DiskStore {
    /// Create a store at `root`, filled with zeros.
    ///
    /// Any chunks left in `root` by a previous store are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the shape or chunk shape has a zero extent or if
    /// the directory cannot be written.
    pub fn create(
        root: impl AsRef<Path>,
        shape: [usize; 3],
        chunks: [usize; 2],
    ) -> Result<Self, StoreError> {
        if shape.contains(&0) || chunks.contains(&0) {
            return Err(StoreError::InvalidShape { shape, chunks });
        }

        let root = root.as_ref().to_path_buf();
        let chunk_dir = root.join(CHUNK_DIR);
        if chunk_dir.exists() {
            fs::remove_dir_all(&chunk_dir).map_err(|e| StoreError::io(&chunk_dir, e))?;
        }
        fs::create_dir_all(&chunk_dir).map_err(|e| StoreError::io(&chunk_dir, e))?;

        let meta = StoreMetadata {
            shape,
            chunks,
            dtype: DTYPE.to_string(),
            fill_value: 0.0,
        };
        let meta_path = root.join(METADATA_FILE);
        let json = serde_json::to_vec_pretty(&meta).map_err(|e| StoreError::Metadata {
            path: meta_path.display().to_string(),
            message: e.to_string(),
        })?;
        fs::write(&meta_path, json).map_err(|e| StoreError::io(&meta_path, e))?;

        debug!(root = %root.display(), ?shape, ?chunks, "Created disk store");
        Ok(Self { root, meta })
    }

    /// Open an existing store.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        let meta_path = root.join(METADATA_FILE);
        let bytes = fs::read(&meta_path).map_err(|e| StoreError::io(&meta_path, e))?;

        let invalid = |message: String| StoreError::Metadata {
            path: meta_path.display().to_string(),
            message,
        };
        let meta: StoreMetadata =
            serde_json::from_slice(&bytes).map_err(|e| invalid(e.to_string()))?;
        if meta.dtype != DTYPE {
            return Err(invalid(format!("unsupported dtype {}", meta.dtype)));
        }
        if meta.shape.contains(&0) || meta.chunks.contains(&0) {
            return Err(StoreError::InvalidShape {
                shape: meta.shape,
                chunks: meta.chunks,
            });
        }

        Ok(Self { root, meta })
    }

    /// Root directory of the store.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Chunk shape as `[rows, cols]`.
    pub fn chunks(&self) -> [usize; 2] {
        self.meta.chunks
    }

    fn chunk_path(&self, chunk_row: usize, chunk_col: usize) -> PathBuf {
        chunk_path(&self.root, chunk_row, chunk_col)
    }
}

fn chunk_path(root: &Path, chunk_row: usize, chunk_col: usize) -> PathBuf {
    root.join(CHUNK_DIR)
        .join(format!("{}.{}", chunk_row, chunk_col))
}

impl OutputStore for DiskStore {
    type Writer = DiskStoreWriter;

    fn shape(&self) -> [usize; 3] {
        self.meta.shape
    }

    fn open_writer(&self) -> Result<Self::Writer, StoreError> {
        let chunk_dir = self.root.join(CHUNK_DIR);
        if !chunk_dir.is_dir() {
            return Err(StoreError::Io {
                path: chunk_dir.display().to_string(),
                message: "chunk directory is missing".to_string(),
            });
        }
        Ok(DiskStoreWriter {
            root: self.root.clone(),
            meta: self.meta.clone(),
            files: HashMap::new(),
        })
    }

    fn read_full(&self) -> Result<Array3<f32>, StoreError> {
        let [rows, cols, channels] = self.meta.shape;
        let [chunk_rows, chunk_cols] = self.meta.chunks;
        let mut out = Array3::from_elem((rows, cols, channels), self.meta.fill_value);

        let (grid_rows, grid_cols) = self.meta.chunk_grid();
        let mut buf = Vec::with_capacity(self.meta.chunk_bytes() as usize);
        for chunk_row in 0..grid_rows {
            for chunk_col in 0..grid_cols {
                let path = self.chunk_path(chunk_row, chunk_col);
                let mut file = match File::open(&path) {
                    Ok(file) => file,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(StoreError::io(&path, e)),
                };

                buf.clear();
                file.read_to_end(&mut buf)
                    .map_err(|e| StoreError::io(&path, e))?;
                buf.resize(self.meta.chunk_bytes() as usize, 0);

                let values: Vec<f32> = buf
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                let chunk = Array3::from_shape_vec((chunk_rows, chunk_cols, channels), values)
                    .map_err(|e| StoreError::Metadata {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    })?;

                let row0 = chunk_row * chunk_rows;
                let col0 = chunk_col * chunk_cols;
                let valid_rows = chunk_rows.min(rows - row0);
                let valid_cols = chunk_cols.min(cols - col0);
                out.slice_mut(s![row0..row0 + valid_rows, col0..col0 + valid_cols, ..])
                    .assign(&chunk.slice(s![..valid_rows, ..valid_cols, ..]));
            }
        }

        Ok(out)
    }
}

// =============================================================================
// DiskStoreWriter
// =============================================================================

/// Write handle onto a [`DiskStore`], owning its own chunk file handles.
#[derive(Debug)]
pub struct DiskStoreWriter {
    root: PathBuf,
    meta: StoreMetadata,
    files: HashMap<(usize, usize), File>,
}

impl DiskStoreWriter {
    fn chunk_file(&mut self, chunk_row: usize, chunk_col: usize) -> Result<&mut File, StoreError> {
        let chunk_bytes = self.meta.chunk_bytes();
        let root = &self.root;
        match self.files.entry((chunk_row, chunk_col)) {
            std::collections::hash_map::Entry::Occupied(entry) => Ok(entry.into_mut()),
            std::collections::hash_map::Entry::Vacant(entry) => {
                let path = chunk_path(root, chunk_row, chunk_col);
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&path)
                    .map_err(|e| StoreError::io(&path, e))?;
                // Only ever grows the file, so a concurrent writer's data is kept
                let len = file
                    .metadata()
                    .map_err(|e| StoreError::io(&path, e))?
                    .len();
                if len < chunk_bytes {
                    file.set_len(chunk_bytes)
                        .map_err(|e| StoreError::io(&path, e))?;
                }
                Ok(entry.insert(file))
            }
        }
    }
}

impl StoreWriter for DiskStoreWriter {
    fn write_region(
        &mut self,
        row: usize,
        col: usize,
        region: ArrayView3<'_, f32>,
    ) -> Result<(), StoreError> {
        let (rows, cols) = clip_region(self.meta.shape, row, col, &region)?;
        let [chunk_rows, chunk_cols] = self.meta.chunks;
        let channels = self.meta.shape[2];
        let col_end = col + cols;

        let mut bytes = Vec::with_capacity(chunk_cols * channels * 4);
        for r in 0..rows {
            let global_row = row + r;
            let chunk_row = global_row / chunk_rows;
            let row_in_chunk = global_row % chunk_rows;

            // Split the row into one segment per chunk column
            let mut global_col = col;
            while global_col < col_end {
                let chunk_col = global_col / chunk_cols;
                let segment_end = col_end.min((chunk_col + 1) * chunk_cols);
                let col_in_chunk = global_col % chunk_cols;

                bytes.clear();
                for value in region
                    .slice(s![r, global_col - col..segment_end - col, ..])
                    .iter()
                {
                    bytes.extend_from_slice(&value.to_le_bytes());
                }

                let offset = ((row_in_chunk * chunk_cols + col_in_chunk) * channels * 4) as u64;
                let path = chunk_path(&self.root, chunk_row, chunk_col);
                let file = self.chunk_file(chunk_row, chunk_col)?;
                file.seek(SeekFrom::Start(offset))
                    .map_err(|e| StoreError::io(&path, e))?;
                file.write_all(&bytes)
                    .map_err(|e| StoreError::io(&path, e))?;

                global_col = segment_end;
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        for (&(chunk_row, chunk_col), file) in self.files.iter_mut() {
            file.flush()
                .map_err(|e| StoreError::io(&chunk_path(&self.root, chunk_row, chunk_col), e))?;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
