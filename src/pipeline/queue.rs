//! Work queue between the producer and the worker pool.
//!
//! Tile coordinates are delivered in FIFO order. When the producer is done it
//! closes the queue, which enqueues exactly one [`WorkItem::EndOfStream`] per
//! worker behind the last coordinate. Each worker exits on the first marker
//! it receives, so every worker terminates once the queue drains.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};

use crate::error::QueueDisconnected;
use crate::grid::TileCoordinate;

/// Message delivered to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkItem {
    Tile(TileCoordinate),
    EndOfStream,
}

/// Producer half of the work queue.
///
/// The queue never holds a receiver itself. If every worker has exited,
/// sends fail with [`QueueDisconnected`] instead of blocking forever.
pub struct WorkQueue {
    sender: Sender<WorkItem>,
    n_workers: usize,
    queued: usize,
}

impl WorkQueue {
    /// Create a queue for `n_workers` consumers.
    ///
    /// `capacity` bounds the number of pending items; `None` is unbounded.
    /// The returned receiver is meant to be cloned into each worker and then
    /// dropped.
    pub fn new(n_workers: usize, capacity: Option<usize>) -> (Self, Receiver<WorkItem>) {
        let (sender, receiver) = match capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };
        let queue = Self {
            sender,
            n_workers,
            queued: 0,
        };
        (queue, receiver)
    }

    /// Enqueue a tile, blocking while a bounded queue is full.
    pub fn push(&mut self, coord: TileCoordinate) -> Result<(), QueueDisconnected> {
        self.sender
            .send(WorkItem::Tile(coord))
            .map_err(|_| QueueDisconnected)?;
        self.queued += 1;
        Ok(())
    }

    /// Number of tiles enqueued so far.
    pub fn queued(&self) -> usize {
        self.queued
    }

    pub fn n_workers(&self) -> usize {
        self.n_workers
    }

    /// Enqueue one end-of-stream marker per worker and drop the sender.
    ///
    /// Returns the number of tiles that were enqueued.
    pub fn close(self) -> Result<usize, QueueDisconnected> {
        for _ in 0..self.n_workers {
            self.sender
                .send(WorkItem::EndOfStream)
                .map_err(|_| QueueDisconnected)?;
        }
        Ok(self.queued)
    }
}
