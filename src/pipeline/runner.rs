//! Pipeline entry point.
//!
//! [`TilePipeline`] ties the stages together:
//!
//! 1. load the mask and plan the grid on the calling thread
//! 2. spawn the worker pool, each worker with its own slide and store handles
//! 3. stream accepted coordinates into the queue, then close it
//! 4. join every worker and assemble the output
//!
//! Any worker failure fails the whole call, but only after every worker has
//! been joined so no thread outlives the call.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ndarray::Array3;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{PipelineError, SlideError, WorkerError};
use crate::grid::{GridPlan, GridPlanner, MaskFilter};
use crate::mask::{load_mask, Mask};
use crate::slide::{SlideReader, SlideSource};
use crate::store::OutputStore;

use super::assembler::{OutputAssembler, OutputTransform};
use super::observer::{PipelineEvent, PipelineObserver, TracingObserver};
use super::processor::TileProcessor;
use super::queue::WorkQueue;
use super::worker::{ReadSettings, TileWorker};

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default number of workers.
pub const DEFAULT_WORKERS: usize = 8;

/// Queue slots per worker when the capacity is derived from the worker count.
const QUEUE_SLOTS_PER_WORKER: usize = 4;

// =============================================================================
// Parameters
// =============================================================================

/// Tiling and dispatch parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TilingParams {
    /// Tile edge length in output pixels
    pub tile_size: u32,

    /// Magnification the tiles are read at
    pub tile_magnification: f64,

    /// Spacing between tile origins
    pub stride: u32,

    /// Global downsample applied to the slide
    pub downsample: f64,

    /// Resample from level 0 instead of the best pyramid level
    pub downsample_level_0: bool,

    /// Magnification of the coverage mask
    pub mask_magnification: f64,

    /// A tile is processed when its mask coverage is strictly above this
    pub mask_ratio: f32,

    pub n_workers: usize,

    /// Crop grid-alignment padding from the result
    pub unpad: bool,

    /// Pending queue items; `None` for an unbounded queue
    pub queue_capacity: Option<usize>,

    /// Scale tile pixels to `[0, 1]` before processing
    pub normalize: bool,
}

impl Default for TilingParams {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            tile_magnification: 20.0,
            stride: DEFAULT_TILE_SIZE,
            downsample: 1.0,
            downsample_level_0: false,
            mask_magnification: 1.25,
            mask_ratio: 0.0,
            n_workers: DEFAULT_WORKERS,
            unpad: true,
            queue_capacity: Some(QUEUE_SLOTS_PER_WORKER * DEFAULT_WORKERS),
            normalize: false,
        }
    }
}

impl TilingParams {
    /// Set the tile size and use it as the stride as well.
    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self.stride = tile_size;
        self
    }

    /// Set the worker count; a bounded queue is resized to match.
    pub fn with_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = n_workers;
        if self.queue_capacity.is_some() {
            self.queue_capacity = Some(QUEUE_SLOTS_PER_WORKER * n_workers.max(1));
        }
        self
    }

    pub fn with_mask_ratio(mut self, mask_ratio: f32) -> Self {
        self.mask_ratio = mask_ratio;
        self
    }

    pub fn with_magnifications(
        mut self,
        tile_magnification: f64,
        mask_magnification: f64,
    ) -> Self {
        self.tile_magnification = tile_magnification;
        self.mask_magnification = mask_magnification;
        self
    }

    fn planner(&self) -> Result<GridPlanner, PipelineError> {
        Ok(GridPlanner::new(
            self.tile_size,
            self.stride,
            self.tile_magnification,
            self.mask_magnification,
        )?)
    }
}

// =============================================================================
// Results
// =============================================================================

/// Counters collected during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// Grid positions evaluated by the mask filter
    pub considered: u64,

    /// Tiles sent to workers
    pub queued: usize,

    /// Tiles rejected by the mask filter
    pub skipped: u64,

    /// Tiles written to the store
    pub written: usize,

    /// Tiles written by each worker, indexed by worker id
    pub per_worker: Vec<usize>,
}

/// Finalized output of a run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub array: Array3<f32>,
    pub plan: GridPlan,
    pub report: PipelineReport,
}

// =============================================================================
// TilePipeline
// =============================================================================

/// Mask-filtered, multi-worker tile processing over a slide.
///
/// # Example
///
/// ```no_run
/// use wsi_tiler::pipeline::{GrayscaleProcessor, TilePipeline, TilingParams};
/// use wsi_tiler::slide::ImageFileSource;
/// use wsi_tiler::store::MemoryStore;
///
/// let params = TilingParams::default().with_workers(4);
/// let store = MemoryStore::new([512, 512, 1]);
/// let pipeline = TilePipeline::new(ImageFileSource, store, GrayscaleProcessor, params);
///
/// let output = pipeline.run("slide.png", "mask.png")?;
/// println!("{} tiles written", output.report.written);
/// # Ok::<(), wsi_tiler::error::PipelineError>(())
/// ```
pub struct TilePipeline<S, O, P> {
    source: Arc<S>,
    store: Arc<O>,
    processor: Arc<P>,
    params: TilingParams,
    observer: Arc<dyn PipelineObserver>,
    transform: Option<OutputTransform>,
}

impl<S, O, P> TilePipeline<S, O, P>
where
    S: SlideSource + 'static,
    O: OutputStore + 'static,
    P: TileProcessor + 'static,
{
    pub fn new(source: S, store: O, processor: P, params: TilingParams) -> Self {
        Self {
            source: Arc::new(source),
            store: Arc::new(store),
            processor: Arc::new(processor),
            params,
            observer: Arc::new(TracingObserver),
            transform: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Transform applied to the full output before padding is removed.
    pub fn with_output_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Array3<f32>) -> Array3<f32> + Send + Sync + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    pub fn params(&self) -> &TilingParams {
        &self.params
    }

    pub fn store(&self) -> &O {
        &self.store
    }

    /// Plan the grid for a slide without dispatching any work.
    pub fn plan(
        &self,
        slide_path: impl AsRef<Path>,
        mask: &Mask,
    ) -> Result<GridPlan, PipelineError> {
        plan_grid(self.source.as_ref(), slide_path, mask, &self.params)
    }

    /// Load the mask from `mask_path` and run the pipeline.
    pub fn run(
        &self,
        slide_path: impl AsRef<Path>,
        mask_path: impl AsRef<Path>,
    ) -> Result<PipelineOutput, PipelineError> {
        let mask = load_mask(mask_path)?;
        self.run_with_mask(slide_path, &mask)
    }

    /// Run the pipeline on tokio's blocking thread pool.
    pub async fn run_async(
        self: Arc<Self>,
        slide_path: impl Into<PathBuf>,
        mask_path: impl Into<PathBuf>,
    ) -> Result<PipelineOutput, PipelineError> {
        let slide_path = slide_path.into();
        let mask_path = mask_path.into();
        tokio::task::spawn_blocking(move || self.run(&slide_path, &mask_path))
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))?
    }

    /// Run the pipeline with a preloaded mask on tokio's blocking thread pool.
    pub async fn run_async_with_mask(
        self: Arc<Self>,
        slide_path: impl Into<PathBuf>,
        mask: Mask,
    ) -> Result<PipelineOutput, PipelineError> {
        let slide_path = slide_path.into();
        tokio::task::spawn_blocking(move || self.run_with_mask(&slide_path, &mask))
            .await
            .map_err(|e| PipelineError::Join(e.to_string()))?
    }

    /// Run the pipeline with a preloaded mask.
    pub fn run_with_mask(
        &self,
        slide_path: impl AsRef<Path>,
        mask: &Mask,
    ) -> Result<PipelineOutput, PipelineError> {
        let slide_path = slide_path.as_ref();
        if self.params.n_workers == 0 {
            return Err(PipelineError::InvalidParams(
                "at least one worker is required".to_string(),
            ));
        }

        let plan = self.plan(slide_path, mask)?;
        let kind = self.processor.output_kind();
        let expected = plan.output_shape(kind);
        if self.store.shape() != expected {
            return Err(PipelineError::StoreShape {
                expected,
                actual: self.store.shape(),
            });
        }
        if plan.has_overlap() {
            warn!(
                stride = plan.stride,
                tile_size = plan.tile_size,
                "Stride is smaller than the tile size; overlapping writes are last-writer-wins"
            );
        }
        self.observer.on_event(&PipelineEvent::GridPlanned(plan));

        info!(
            slide = %slide_path.display(),
            width = plan.width,
            height = plan.height,
            workers = self.params.n_workers,
            output = %kind,
            "Starting tile pipeline"
        );

        let (queue, receiver) = WorkQueue::new(self.params.n_workers, self.params.queue_capacity);
        let failed = Arc::new(AtomicBool::new(false));
        let settings = ReadSettings {
            downsample: self.params.downsample,
            normalize: self.params.normalize,
            downsample_level_0: self.params.downsample_level_0,
        };

        let mut handles = Vec::with_capacity(self.params.n_workers);
        for id in 0..self.params.n_workers {
            let worker = TileWorker {
                id,
                source: Arc::clone(&self.source),
                slide_path: slide_path.to_path_buf(),
                store: Arc::clone(&self.store),
                processor: Arc::clone(&self.processor),
                plan,
                settings,
                receiver: receiver.clone(),
                failed: Arc::clone(&failed),
                observer: Arc::clone(&self.observer),
            };
            let spawned = thread::Builder::new()
                .name(format!("tile-worker-{}", id))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    failed.store(true, Ordering::SeqCst);
                    drop(receiver);
                    let _ = queue.close();
                    let _ = join_workers(handles);
                    return Err(PipelineError::Spawn {
                        worker_id: id,
                        message: e.to_string(),
                    });
                }
            }
        }
        drop(receiver);

        let mut report = self.produce(&plan, mask, queue, &failed);
        let (per_worker, failure) = join_workers(handles);
        if let Some(err) = failure {
            warn!(error = %err, "Tile pipeline failed");
            return Err(err);
        }
        report.written = per_worker.iter().sum();
        report.per_worker = per_worker;

        let array = OutputAssembler::new(&plan, kind, self.params.unpad)
            .with_transform(self.transform.as_ref())
            .assemble(self.store.as_ref())
            .map_err(PipelineError::Assemble)?;
        self.observer.on_event(&PipelineEvent::Assembled {
            shape: [array.dim().0, array.dim().1, array.dim().2],
        });

        info!(
            considered = report.considered,
            queued = report.queued,
            written = report.written,
            "Tile pipeline finished"
        );
        Ok(PipelineOutput {
            array,
            plan,
            report,
        })
    }

    /// Stream accepted coordinates into the queue, then close it.
    fn produce(
        &self,
        plan: &GridPlan,
        mask: &Mask,
        mut queue: WorkQueue,
        failed: &AtomicBool,
    ) -> PipelineReport {
        let mut report = PipelineReport::default();
        let filter = MaskFilter::new(plan, mask, self.params.mask_ratio);

        for decision in filter.decisions() {
            if failed.load(Ordering::SeqCst) {
                warn!("Worker failure detected, no more tiles will be queued");
                break;
            }
            report.considered += 1;

            if !decision.accepted {
                report.skipped += 1;
                self.observer.on_event(&PipelineEvent::TileSkipped(decision.coord));
                continue;
            }
            if queue.push(decision.coord).is_err() {
                warn!("All workers exited before the queue was drained");
                break;
            }
            self.observer.on_event(&PipelineEvent::TileQueued(decision.coord));
        }

        report.queued = queue.queued();
        match queue.close() {
            Ok(queued) => self.observer.on_event(&PipelineEvent::QueueClosed { queued }),
            Err(e) => warn!(error = %e, "Could not deliver end-of-stream markers"),
        }
        report
    }
}

/// Plan the grid for a slide opened from `source`.
///
/// Used by [`TilePipeline::plan`] and by callers that need the output shape
/// before the output store exists.
pub fn plan_grid<S: SlideSource>(
    source: &S,
    slide_path: impl AsRef<Path>,
    mask: &Mask,
    params: &TilingParams,
) -> Result<GridPlan, PipelineError> {
    let planner = params.planner()?;
    let slide = source.open(slide_path.as_ref())?;
    let dimensions = slide.dimensions().ok_or(SlideError::InvalidLevel {
        level: 0,
        level_count: slide.level_count(),
    })?;
    Ok(planner.plan(dimensions, params.downsample, mask)?)
}

/// Join every worker.
///
/// Returns the per-worker tile counts and the failure to report, if any.
/// Worker errors take precedence over panics; among them the lowest worker
/// id wins so the reported failure does not depend on scheduling.
fn join_workers(
    handles: Vec<JoinHandle<Result<usize, WorkerError>>>,
) -> (Vec<usize>, Option<PipelineError>) {
    let mut per_worker = Vec::with_capacity(handles.len());
    let mut first_error: Option<(usize, WorkerError)> = None;
    let mut first_panic: Option<(usize, String)> = None;
    let mut failed_workers = 0;

    for (worker_id, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(tiles)) => per_worker.push(tiles),
            Ok(Err(e)) => {
                per_worker.push(0);
                failed_workers += 1;
                first_error.get_or_insert((worker_id, e));
            }
            Err(payload) => {
                per_worker.push(0);
                failed_workers += 1;
                first_panic.get_or_insert((worker_id, panic_message(payload)));
            }
        }
    }

    let failure = match (first_error, first_panic) {
        (Some((worker_id, source)), _) => Some(PipelineError::Worker {
            worker_id,
            failed_workers,
            source,
        }),
        (None, Some((worker_id, message))) => {
            Some(PipelineError::WorkerPanicked { worker_id, message })
        }
        (None, None) => None,
    };
    (per_worker, failure)
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
