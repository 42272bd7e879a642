//! Background tile compositing
//!
//! Chunk snapshots taken on the main thread are handed to a pool of worker
//! threads that turn them into tile pixels and write them to disk. Results come
//! back over a crossbeam channel that the scheduler drains once per tick.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError, bounded, unbounded};
use thiserror::Error;

use crate::core::{ChunkCoord, ChunkData, Region};
use crate::render::job::JobId;

#[derive(Debug, Error)]
pub enum CompositeError {
    #[error("tile I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("compositor panicked: {0}")]
    Panicked(String),
}

/// Turns one chunk snapshot into its tile contribution and persists it.
/// Called on worker threads.
pub trait TileCompositor: Send + Sync {
    fn composite(&self, request: &CompositeRequest) -> Result<(), CompositeError>;
}

/// Work item for one chunk
#[derive(Debug)]
pub struct CompositeRequest {
    pub job: JobId,
    pub region: Region,
    pub output: PathBuf,
    pub coord: ChunkCoord,
    pub chunk: ChunkData,
}

/// Outcome of one work item, sent back to the main thread
#[derive(Debug)]
pub struct CompositeResult {
    pub job: JobId,
    pub coord: ChunkCoord,
    pub outcome: Result<(), String>,
}

/// Returned by [`CompositorPool::submit`] with the request handed back
pub enum SubmitError {
    /// Queue at capacity, try again on a later tick
    Full(CompositeRequest),
    /// No worker is left to take the request
    Disconnected(CompositeRequest),
}

/// Manages the compositing worker threads
pub struct CompositorPool {
    request_tx: Sender<CompositeRequest>,
    result_rx: Receiver<CompositeResult>,
    worker_count: usize,
    in_flight: usize,
}

impl CompositorPool {
    pub fn new(
        compositor: Arc<dyn TileCompositor>,
        num_workers: usize,
        queue_capacity: usize,
    ) -> Self {
        let num_workers = num_workers.max(1);
        // Bounded requests cap memory held in chunk snapshots. Results are
        // unbounded so workers never block on a main thread that is busy submitting.
        let (request_tx, request_rx) = bounded::<CompositeRequest>(queue_capacity.max(1));
        let (result_tx, result_rx) = unbounded::<CompositeResult>();

        let mut spawned_workers = 0;
        for worker_id in 0..num_workers {
            let rx = request_rx.clone();
            let tx = result_tx.clone();
            let compositor = Arc::clone(&compositor);

            let spawned = thread::Builder::new()
                .name(format!("tile-worker-{}", worker_id))
                .spawn(move || {
                    while let Ok(req) = rx.recv() {
                        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| {
                            compositor.composite(&req)
                        })) {
                            Ok(Ok(())) => Ok(()),
                            Ok(Err(e)) => Err(e.to_string()),
                            Err(payload) => {
                                let message = panic_message(&*payload);
                                Err(CompositeError::Panicked(message).to_string())
                            }
                        };

                        let result = CompositeResult {
                            job: req.job,
                            coord: req.coord,
                            outcome,
                        };
                        if tx.send(result).is_err() {
                            // Pool dropped, exit
                            break;
                        }
                    }
                });

            match spawned {
                Ok(_) => spawned_workers += 1,
                Err(e) => tracing::error!("Failed to spawn tile worker {}: {}", worker_id, e),
            }
        }
        if spawned_workers == 0 {
            tracing::error!("No tile workers running, every tile will fail");
        }

        CompositorPool {
            request_tx,
            result_rx,
            worker_count: num_workers,
            in_flight: 0,
        }
    }

    /// Pool whose workers are all gone, for exercising the disconnected path
    #[cfg(test)]
    pub(crate) fn without_workers(queue_capacity: usize) -> Self {
        let (request_tx, _) = bounded::<CompositeRequest>(queue_capacity.max(1));
        let (_, result_rx) = unbounded::<CompositeResult>();
        CompositorPool {
            request_tx,
            result_rx,
            worker_count: 0,
            in_flight: 0,
        }
    }

    /// Non-blocking submit; hands the request back when it cannot be queued
    pub fn submit(&mut self, request: CompositeRequest) -> Result<(), SubmitError> {
        match self.request_tx.try_send(request) {
            Ok(()) => {
                self.in_flight += 1;
                Ok(())
            }
            Err(TrySendError::Full(req)) => Err(SubmitError::Full(req)),
            Err(TrySendError::Disconnected(req)) => Err(SubmitError::Disconnected(req)),
        }
    }

    /// Poll for completed tiles (non-blocking)
    pub fn poll_results(&mut self, max_results: usize) -> Vec<CompositeResult> {
        let mut results = Vec::new();

        for _ in 0..max_results {
            match self.result_rx.try_recv() {
                Ok(result) => {
                    self.in_flight = self.in_flight.saturating_sub(1);
                    results.push(result);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        results
    }

    /// Submitted work whose result has not been polled yet
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn is_full(&self) -> bool {
        self.request_tx.is_full()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<ChunkCoord>>,
    }

    impl TileCompositor for Recording {
        fn composite(&self, request: &CompositeRequest) -> Result<(), CompositeError> {
            if request.coord.x < 0 {
                panic!("negative chunk");
            }
            if request.coord.z < 0 {
                return Err(CompositeError::Io(std::io::Error::other("disk full")));
            }
            self.seen.lock().push(request.coord);
            Ok(())
        }
    }

    fn request(x: i32, z: i32) -> CompositeRequest {
        let coord = ChunkCoord::new(x, z);
        CompositeRequest {
            job: JobId(1),
            region: Region::containing("overworld", coord),
            output: PathBuf::from("unused"),
            coord,
            chunk: ChunkData::new(coord),
        }
    }

    fn collect(pool: &mut CompositorPool, expected: usize) -> Vec<CompositeResult> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut results = Vec::new();
        while results.len() < expected && Instant::now() < deadline {
            results.extend(pool.poll_results(64));
            thread::sleep(Duration::from_millis(1));
        }
        results
    }

    #[test]
    fn results_come_back_for_every_request() {
        let compositor = Arc::new(Recording::default());
        let mut pool = CompositorPool::new(compositor.clone(), 2, 16);
        for x in 0..5 {
            assert!(pool.submit(request(x, 0)).is_ok());
        }
        let results = collect(&mut pool, 5);
        assert_eq!(results.len(), 5);
        assert!(results.iter().all(|r| r.outcome.is_ok()));
        assert_eq!(compositor.seen.lock().len(), 5);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn dead_pool_hands_the_request_back() {
        let mut dead = CompositorPool::without_workers(4);
        match dead.submit(request(3, 4)) {
            Err(SubmitError::Disconnected(req)) => assert_eq!(req.coord, ChunkCoord::new(3, 4)),
            _ => panic!("expected a disconnected pool"),
        }
        assert_eq!(dead.in_flight(), 0);
        assert!(!dead.is_full());
    }

    #[test]
    fn errors_and_panics_become_results() {
        let mut pool = CompositorPool::new(Arc::new(Recording::default()), 1, 4);
        assert!(pool.submit(request(-1, 0)).is_ok());
        assert!(pool.submit(request(0, -1)).is_ok());
        let results = collect(&mut pool, 2);
        assert_eq!(results.len(), 2);
        for result in results {
            let err = result.outcome.unwrap_err();
            if result.coord.x < 0 {
                assert!(err.contains("negative chunk"));
            } else {
                assert!(err.contains("disk full"));
            }
        }
    }
}
