//! Tile-grid geometry and mask-driven tile selection.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Slide dimensions + tile size + mask   │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              GridPlanner                │
//! │  (padding, mask coverage cap)           │
//! └────────────────────┬────────────────────┘
//!                      │ GridPlan
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              MaskFilter                 │
//! │  (stride walk, window mean > ratio)     │
//! └────────────────────┬────────────────────┘
//!                      │ TileCoordinate stream
//!                      ▼
//!                  WorkQueue
//! ```
//!
//! The grid is never materialized: the plan only holds the bounds, and the
//! filter walks it lazily so coordinates can be streamed to workers as they
//! are accepted.

mod coord;
mod filter;
mod planner;

pub use coord::TileCoordinate;
pub use filter::{FilterDecision, MaskFilter};
pub use planner::{padding, GridPlan, GridPlanner};
