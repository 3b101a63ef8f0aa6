//! Output stores.
//!
//! The pipeline writes tile results into a chunked array that outlives the
//! call. Stores are opened once by the orchestrator and once more, in write
//! mode, by every worker.
//!
//! # Components
//!
//! - [`OutputStore`] / [`StoreWriter`]: the store capability
//! - [`DiskStore`]: directory of chunk files, safe for concurrent writers on
//!   disjoint regions
//! - [`MemoryStore`]: in-memory array for tests and small outputs
//! - [`save_array`]: export of an assembled array to PNG or JSON

mod disk;
mod export;
mod memory;
mod traits;

pub use disk::{DiskStore, DiskStoreWriter, DEFAULT_CHUNK_SIZE};
pub use export::save_array;
pub use memory::{MemoryStore, MemoryStoreWriter};
pub use traits::{OutputStore, StoreWriter};
