//! Worker loop.
//!
//! Each worker owns its own slide reader and store writer, pulls coordinates
//! from the shared queue and writes processed tiles straight into the output
//! store. Workers only communicate through the queue and the shared failure
//! flag.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::error::WorkerError;
use crate::grid::{GridPlan, TileCoordinate};
use crate::slide::{RegionRequest, SlideReader, SlideSource};
use crate::store::{OutputStore, StoreWriter};

use super::observer::{PipelineEvent, PipelineObserver};
use super::processor::{OutputKind, TileOutput, TileProcessor};
use super::queue::WorkItem;

/// Read settings shared by every worker of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadSettings {
    /// Global downsample applied to the slide
    pub downsample: f64,

    /// Scale pixel values to `[0, 1]`
    pub normalize: bool,

    /// Resample from level 0 instead of the best pyramid level
    pub downsample_level_0: bool,
}

/// One member of the worker pool.
pub struct TileWorker<S: SlideSource, O: OutputStore, P: TileProcessor> {
    pub(crate) id: usize,
    pub(crate) source: Arc<S>,
    pub(crate) slide_path: PathBuf,
    pub(crate) store: Arc<O>,
    pub(crate) processor: Arc<P>,
    pub(crate) plan: GridPlan,
    pub(crate) settings: ReadSettings,
    pub(crate) receiver: Receiver<WorkItem>,
    pub(crate) failed: Arc<AtomicBool>,
    pub(crate) observer: Arc<dyn PipelineObserver>,
}

/// Raises the failure flag if the worker unwinds.
struct PanicFlag<'a>(&'a AtomicBool);

impl Drop for PanicFlag<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.store(true, Ordering::SeqCst);
        }
    }
}

impl<S: SlideSource, O: OutputStore, P: TileProcessor> TileWorker<S, O, P> {
    /// Run until an end-of-stream marker arrives, the queue disconnects, or
    /// another worker has failed.
    ///
    /// Returns the number of tiles written. On error the shared failure flag
    /// is raised before returning.
    pub fn run(self) -> Result<usize, WorkerError> {
        let _guard = PanicFlag(&self.failed);
        self.observer
            .on_event(&PipelineEvent::WorkerStarted { worker_id: self.id });

        match self.work() {
            Ok(tiles) => {
                self.observer.on_event(&PipelineEvent::WorkerFinished {
                    worker_id: self.id,
                    tiles,
                });
                Ok(tiles)
            }
            Err(e) => {
                self.failed.store(true, Ordering::SeqCst);
                self.observer.on_event(&PipelineEvent::WorkerFailed {
                    worker_id: self.id,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    fn work(&self) -> Result<usize, WorkerError> {
        let slide = self
            .source
            .open(&self.slide_path)
            .map_err(WorkerError::OpenSlide)?;
        let mut writer = self.store.open_writer().map_err(WorkerError::OpenStore)?;
        let kind = self.processor.output_kind();

        let mut tiles = 0;
        while let Ok(item) = self.receiver.recv() {
            let coord = match item {
                WorkItem::Tile(coord) => coord,
                WorkItem::EndOfStream => break,
            };
            if self.failed.load(Ordering::SeqCst) {
                break;
            }

            self.process_tile(&slide, &mut writer, kind, coord)?;
            tiles += 1;
            self.observer.on_event(&PipelineEvent::TileWritten {
                worker_id: self.id,
                coord,
            });
        }

        writer.flush().map_err(WorkerError::Flush)?;
        Ok(tiles)
    }

    fn process_tile(
        &self,
        slide: &S::Reader,
        writer: &mut O::Writer,
        kind: OutputKind,
        coord: TileCoordinate,
    ) -> Result<(), WorkerError> {
        let request = RegionRequest::square(
            (coord.x, coord.y),
            self.settings.downsample,
            self.plan.tile_size,
        )
        .with_normalize(self.settings.normalize)
        .with_downsample_level_0(self.settings.downsample_level_0);
        let region = slide
            .read_region(&request)
            .map_err(|source| WorkerError::ReadRegion { coord, source })?;

        let output = self
            .processor
            .process(region.tile, coord)
            .map_err(|source| WorkerError::Process { coord, source })?;
        check_output(&output, kind, self.plan.tile_size, coord)?;

        let written = match &output {
            TileOutput::Spatial(array) => {
                writer.write_region(coord.y as usize, coord.x as usize, array.view())
            }
            TileOutput::Cell(values) => {
                let (row, col) = coord.cell(self.plan.tile_size);
                writer.write_cell(row, col, values.view())
            }
        };
        written.map_err(|source| WorkerError::Write { coord, source })
    }
}

/// Check a processor result against its declared kind and the tile size.
pub(crate) fn check_output(
    output: &TileOutput,
    kind: OutputKind,
    tile_size: u32,
    coord: TileCoordinate,
) -> Result<(), WorkerError> {
    let expected = match (kind, output) {
        (OutputKind::Spatial { channels }, TileOutput::Spatial(_)) => {
            vec![tile_size as usize, tile_size as usize, channels]
        }
        (OutputKind::Cell { features }, TileOutput::Cell(_)) => vec![features],
        (kind, output) => {
            return Err(WorkerError::KindMismatch {
                coord,
                expected: kind.name(),
                actual: output.kind_name(),
            })
        }
    };

    let actual = output.shape();
    if actual != expected {
        return Err(WorkerError::ShapeMismatch {
            coord,
            expected,
            actual,
        });
    }
    Ok(())
}
