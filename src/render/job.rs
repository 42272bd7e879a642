//! Job identity, lifecycle and progress bookkeeping shared by generation and
//! region render jobs.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::core::{ChunkCoord, Region, RenderError, Result};
use crate::render::loader::ChunkFetch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Generation,
    Render,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Generation => "generation",
            JobKind::Render => "render",
        }
    }
}

/// Returned to callers that start a job; the only way to refer to it later
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub id: JobId,
    pub world: Arc<str>,
    pub kind: JobKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Coordinates left to pull
    Active,
    /// Sequence exhausted, waiting on retries or in-flight tiles
    Draining,
    Done,
    Cancelled,
    Failed(RenderError),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Cancelled | JobState::Failed(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobState::Active => "active",
            JobState::Draining => "draining",
            JobState::Done => "done",
            JobState::Cancelled => "cancelled",
            JobState::Failed(_) => "failed",
        }
    }
}

/// A coordinate waiting for another attempt
#[derive(Debug, Clone, Copy)]
pub struct PendingChunk {
    pub coord: ChunkCoord,
    pub attempts: u32,
    pub ready_at: u64,
}

/// Per-job counters and queues, mutated only by the scheduler tick.
///
/// `processed` advances once per coordinate and only when that coordinate is
/// resolved: its tile was confirmed written, it was absent from storage, or it
/// ran out of load retries.
#[derive(Debug, Default)]
pub struct JobProgress {
    processed: u64,
    composited: u64,
    skipped: u64,
    absent: u64,
    failures: Vec<RenderError>,
    in_flight: FxHashSet<ChunkCoord>,
    retries: VecDeque<PendingChunk>,
    last_progress_tick: u64,
    stalled: bool,
}

impl JobProgress {
    pub fn new(start_tick: u64) -> Self {
        Self {
            last_progress_tick: start_tick,
            ..Default::default()
        }
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn composited(&self) -> u64 {
        self.composited
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn absent(&self) -> u64 {
        self.absent
    }

    pub fn failures(&self) -> &[RenderError] {
        &self.failures
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Retries or in-flight tiles still outstanding
    pub fn has_outstanding(&self) -> bool {
        !self.in_flight.is_empty() || !self.retries.is_empty()
    }

    pub fn increment_count(&mut self, tick: u64) {
        self.processed += 1;
        self.last_progress_tick = tick;
        self.stalled = false;
    }

    /// Pop up to `n` queued coordinates whose delay has elapsed
    pub fn take_ready(&mut self, n: usize, tick: u64) -> Vec<PendingChunk> {
        let mut ready = Vec::new();
        for _ in 0..self.retries.len() {
            if ready.len() >= n {
                break;
            }
            let Some(pending) = self.retries.pop_front() else {
                break;
            };
            if pending.ready_at <= tick {
                ready.push(pending);
            } else {
                self.retries.push_back(pending);
            }
        }
        ready
    }

    pub fn requeue(&mut self, coord: ChunkCoord, attempts: u32, ready_at: u64) {
        self.retries.push_back(PendingChunk {
            coord,
            attempts,
            ready_at,
        });
    }

    pub fn mark_dispatched(&mut self, coord: ChunkCoord) {
        self.in_flight.insert(coord);
    }

    /// Returns false for coordinates that were not in flight
    pub fn record_composited(&mut self, coord: ChunkCoord, tick: u64) -> bool {
        if !self.in_flight.remove(&coord) {
            return false;
        }
        self.composited += 1;
        self.increment_count(tick);
        true
    }

    pub fn record_failure(&mut self, coord: ChunkCoord, reason: String) -> bool {
        if !self.in_flight.remove(&coord) {
            return false;
        }
        self.failures
            .push(RenderError::CompositingFailure { coord, reason });
        true
    }

    /// A coordinate that could not be handed to a worker at all
    pub fn record_dispatch_failure(&mut self, coord: ChunkCoord, reason: String) {
        self.failures
            .push(RenderError::CompositingFailure { coord, reason });
    }

    pub fn record_absent(&mut self, tick: u64) {
        self.absent += 1;
        self.increment_count(tick);
    }

    pub fn record_skipped(&mut self, coord: ChunkCoord, attempts: u32, tick: u64) {
        tracing::debug!("skipping: {}", RenderError::ChunkNotReady { coord, attempts });
        self.skipped += 1;
        self.increment_count(tick);
    }

    /// Flags the job once it has gone `stall_ticks` without progress while work
    /// is outstanding. Returns true only when the flag is newly raised.
    pub fn check_stall(&mut self, tick: u64, stall_ticks: u64, has_work: bool) -> bool {
        if !has_work || stall_ticks == 0 {
            self.last_progress_tick = tick;
            self.stalled = false;
            return false;
        }
        if !self.stalled && tick.saturating_sub(self.last_progress_tick) >= stall_ticks {
            self.stalled = true;
            return true;
        }
        false
    }

    /// Coordinates pulled but not yet resolved: waiting retries and tiles in flight
    pub fn unresolved(&self) -> Vec<ChunkCoord> {
        self.retries
            .iter()
            .map(|pending| pending.coord)
            .chain(self.in_flight.iter().copied())
            .collect()
    }

    /// Drop queued work after cancellation or failure
    pub fn clear_pending(&mut self) {
        self.retries.clear();
        self.in_flight.clear();
    }
}

/// Snapshot of one job for status output
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub id: JobId,
    pub kind: JobKind,
    pub world: Arc<str>,
    pub label: String,
    pub state: JobState,
    pub processed: u64,
    pub total: Option<u64>,
    pub composited: u64,
    pub skipped: u64,
    pub absent: u64,
    pub failed: usize,
    pub in_flight: usize,
    pub stalled: bool,
}

impl JobStatus {
    pub fn percent(&self) -> Option<f64> {
        self.total
            .filter(|total| *total > 0)
            .map(|total| self.processed as f64 * 100.0 / total as f64)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] {}: {}",
            self.id,
            self.kind.as_str(),
            self.world,
            self.label,
            self.state.label()
        )?;
        match (self.total, self.percent()) {
            (Some(total), Some(pct)) => write!(f, " {}/{} ({:.1}%)", self.processed, total, pct)?,
            _ => write!(f, " {} processed", self.processed)?,
        }
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        if self.stalled {
            write!(f, " (stalled)")?;
        }
        if let JobState::Failed(err) = &self.state {
            write!(f, " - {}", err)?;
        }
        Ok(())
    }
}

/// Where a coordinate's tile goes
#[derive(Debug, Clone)]
pub struct TileTarget {
    pub region: Region,
    pub output: PathBuf,
}

/// What the scheduler needs from any job it drives
pub trait ScheduledJob {
    fn id(&self) -> JobId;

    fn kind(&self) -> JobKind;

    fn state(&self) -> &JobState;

    fn set_state(&mut self, state: JobState);

    fn progress(&self) -> &JobProgress;

    fn progress_mut(&mut self) -> &mut JobProgress;

    /// Pull up to `n` fresh coordinates; empty at end of sequence
    fn next_batch(&mut self, n: usize) -> Vec<ChunkCoord>;

    fn is_exhausted(&self) -> bool;

    /// Main-thread fetch of one chunk
    fn load_chunk(&self, coord: ChunkCoord) -> Result<ChunkFetch>;

    fn target_for(&self, coord: ChunkCoord) -> TileTarget;

    fn status(&self) -> JobStatus;

    fn is_live(&self) -> bool {
        matches!(self.state(), JobState::Active | JobState::Draining)
    }

    /// Move Active -> Draining -> Done as the sequence and outstanding work run out
    fn advance_state(&mut self) {
        let exhausted = self.is_exhausted();
        let outstanding = self.progress().has_outstanding();
        match self.state().clone() {
            JobState::Active if exhausted && outstanding => self.set_state(JobState::Draining),
            JobState::Active | JobState::Draining if exhausted && !outstanding => {
                self.set_state(JobState::Done)
            }
            _ => {}
        }
    }

    /// Called once when the job stops early, before its pending work is dropped
    fn release_unresolved(&mut self) {}

    fn cancel(&mut self) {
        if !self.state().is_terminal() {
            self.release_unresolved();
            self.set_state(JobState::Cancelled);
            self.progress_mut().clear_pending();
        }
    }

    fn fail(&mut self, err: RenderError) {
        if !self.state().is_terminal() {
            self.release_unresolved();
            self.set_state(JobState::Failed(err));
            self.progress_mut().clear_pending();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composited_counts_once_per_coordinate() {
        let mut progress = JobProgress::new(0);
        let coord = ChunkCoord::new(1, 2);
        progress.mark_dispatched(coord);
        assert!(progress.record_composited(coord, 1));
        assert!(!progress.record_composited(coord, 2));
        assert_eq!(progress.processed(), 1);
        assert_eq!(progress.composited(), 1);
    }

    #[test]
    fn failures_are_recorded_but_not_counted() {
        let mut progress = JobProgress::new(0);
        let coord = ChunkCoord::new(0, 0);
        progress.mark_dispatched(coord);
        assert!(progress.record_failure(coord, "disk full".into()));
        assert_eq!(progress.processed(), 0);
        assert_eq!(progress.failures().len(), 1);
        assert!(!progress.has_outstanding());
    }

    #[test]
    fn take_ready_respects_delay_and_limit() {
        let mut progress = JobProgress::new(0);
        progress.requeue(ChunkCoord::new(0, 0), 1, 5);
        progress.requeue(ChunkCoord::new(1, 0), 1, 2);
        progress.requeue(ChunkCoord::new(2, 0), 1, 2);

        let ready = progress.take_ready(1, 3);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].coord, ChunkCoord::new(1, 0));
        assert_eq!(progress.pending_retries(), 2);

        let ready = progress.take_ready(8, 3);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].coord, ChunkCoord::new(2, 0));

        let ready = progress.take_ready(8, 5);
        assert_eq!(ready.len(), 1);
        assert_eq!(progress.pending_retries(), 0);
    }

    #[test]
    fn stall_flag_raised_once_and_cleared_by_progress() {
        let mut progress = JobProgress::new(0);
        assert!(!progress.check_stall(3, 5, true));
        assert!(progress.check_stall(5, 5, true));
        assert!(!progress.check_stall(6, 5, true));
        assert!(progress.is_stalled());

        progress.record_absent(7);
        assert!(!progress.is_stalled());
        assert!(!progress.check_stall(8, 5, true));
    }

    #[test]
    fn unresolved_lists_retries_and_in_flight() {
        let mut progress = JobProgress::new(0);
        progress.requeue(ChunkCoord::new(0, 0), 1, 5);
        progress.mark_dispatched(ChunkCoord::new(1, 0));
        progress.mark_dispatched(ChunkCoord::new(2, 0));
        assert!(progress.record_composited(ChunkCoord::new(2, 0), 1));

        let mut unresolved = progress.unresolved();
        unresolved.sort_by_key(|c| (c.x, c.z));
        assert_eq!(unresolved, vec![ChunkCoord::new(0, 0), ChunkCoord::new(1, 0)]);

        progress.clear_pending();
        assert!(progress.unresolved().is_empty());
    }

    #[test]
    fn idle_jobs_never_stall() {
        let mut progress = JobProgress::new(0);
        assert!(!progress.check_stall(100, 5, false));
        assert!(!progress.is_stalled());
    }
}
