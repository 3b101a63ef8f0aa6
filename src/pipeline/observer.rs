//! Pipeline observability hook.
//!
//! The runner reports progress through a [`PipelineObserver`] instead of
//! printing. Observers are shared by the producer and every worker, so
//! events can arrive concurrently from several threads.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};

use crate::grid::{GridPlan, TileCoordinate};

/// Progress events emitted while a pipeline runs.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Grid geometry is known
    GridPlanned(GridPlan),

    /// A tile passed the mask filter and was queued
    TileQueued(TileCoordinate),

    /// A tile was rejected by the mask filter
    TileSkipped(TileCoordinate),

    /// All coordinates and end-of-stream markers were sent
    QueueClosed { queued: usize },

    WorkerStarted { worker_id: usize },

    /// A worker wrote a tile result into the store
    TileWritten {
        worker_id: usize,
        coord: TileCoordinate,
    },

    /// A worker consumed its end-of-stream marker and exited
    WorkerFinished { worker_id: usize, tiles: usize },

    /// A worker stopped on an error
    WorkerFailed { worker_id: usize, message: String },

    /// The final array was read, transformed and cropped
    Assembled { shape: [usize; 3] },
}

/// Receives [`PipelineEvent`]s.
pub trait PipelineObserver: Send + Sync {
    fn on_event(&self, event: &PipelineEvent);
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Forwards events to `tracing`.
///
/// Per-tile events are logged at trace level to keep debug output readable
/// on slides with many thousands of tiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::GridPlanned(plan) => debug!(
                width = plan.width,
                height = plan.height,
                pad_w = plan.pad_w,
                pad_h = plan.pad_h,
                candidates = plan.candidate_count(),
                "Grid planned"
            ),
            PipelineEvent::TileQueued(coord) => tracing::trace!(%coord, "Tile queued"),
            PipelineEvent::TileSkipped(coord) => tracing::trace!(%coord, "Tile skipped"),
            PipelineEvent::QueueClosed { queued } => debug!(queued, "Queue closed"),
            PipelineEvent::WorkerStarted { worker_id } => debug!(worker_id, "Worker started"),
            PipelineEvent::TileWritten { worker_id, coord } => {
                tracing::trace!(worker_id, %coord, "Tile written")
            }
            PipelineEvent::WorkerFinished { worker_id, tiles } => {
                debug!(worker_id, tiles, "Worker finished")
            }
            PipelineEvent::WorkerFailed { worker_id, message } => {
                warn!(worker_id, error = %message, "Worker failed")
            }
            PipelineEvent::Assembled { shape } => debug!(?shape, "Output assembled"),
        }
    }
}

/// Counts events with atomic counters.
#[derive(Debug, Default)]
pub struct CountingObserver {
    queued: AtomicUsize,
    skipped: AtomicUsize,
    written: AtomicUsize,
    workers_started: AtomicUsize,
    workers_finished: AtomicUsize,
    workers_failed: AtomicUsize,
}

impl CountingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> usize {
        self.written.load(Ordering::SeqCst)
    }

    pub fn workers_started(&self) -> usize {
        self.workers_started.load(Ordering::SeqCst)
    }

    pub fn workers_finished(&self) -> usize {
        self.workers_finished.load(Ordering::SeqCst)
    }

    pub fn workers_failed(&self) -> usize {
        self.workers_failed.load(Ordering::SeqCst)
    }
}

impl PipelineObserver for CountingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        let counter = match event {
            PipelineEvent::TileQueued(_) => &self.queued,
            PipelineEvent::TileSkipped(_) => &self.skipped,
            PipelineEvent::TileWritten { .. } => &self.written,
            PipelineEvent::WorkerStarted { .. } => &self.workers_started,
            PipelineEvent::WorkerFinished { .. } => &self.workers_finished,
            PipelineEvent::WorkerFailed { .. } => &self.workers_failed,
            _ => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}
