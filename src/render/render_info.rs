//! Single-region render jobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::{ChunkCoord, Region, Result};
use crate::render::job::{
    JobId, JobKind, JobProgress, JobState, JobStatus, ScheduledJob, TileTarget,
};
use crate::render::loader::{ChunkFetch, ChunkLoaderInfo, LoadMode, RegionChunksLoader};
use crate::world::HostWorld;

/// What a region render targets. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderInfo {
    pub output: PathBuf,
    pub region: Region,
}

impl RenderInfo {
    pub fn new(output: impl Into<PathBuf>, region: Region) -> Self {
        Self {
            output: output.into(),
            region,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn region(&self) -> &Region {
        &self.region
    }
}

/// A queued region render and the loader walking its chunks
pub struct RegionRenderJob {
    id: JobId,
    info: RenderInfo,
    chunks: ChunkLoaderInfo,
    state: JobState,
    progress: JobProgress,
}

impl RegionRenderJob {
    pub fn new(
        id: JobId,
        info: RenderInfo,
        world: Arc<dyn HostWorld>,
        mode: LoadMode,
        tick: u64,
    ) -> Self {
        let loader = RegionChunksLoader::new(info.region.clone(), world);
        let chunks = ChunkLoaderInfo::new(info.output.clone(), loader, mode);
        Self {
            id,
            info,
            chunks,
            state: JobState::Active,
            progress: JobProgress::new(tick),
        }
    }

    pub fn info(&self) -> &RenderInfo {
        &self.info
    }

    pub fn region(&self) -> &Region {
        &self.info.region
    }
}

impl ScheduledJob for RegionRenderJob {
    fn id(&self) -> JobId {
        self.id
    }

    fn kind(&self) -> JobKind {
        JobKind::Render
    }

    fn state(&self) -> &JobState {
        &self.state
    }

    fn set_state(&mut self, state: JobState) {
        self.state = state;
    }

    fn progress(&self) -> &JobProgress {
        &self.progress
    }

    fn progress_mut(&mut self) -> &mut JobProgress {
        &mut self.progress
    }

    fn next_batch(&mut self, n: usize) -> Vec<ChunkCoord> {
        self.chunks.loader.next_batch(n)
    }

    fn is_exhausted(&self) -> bool {
        self.chunks.loader.is_exhausted()
    }

    fn load_chunk(&self, coord: ChunkCoord) -> Result<ChunkFetch> {
        self.chunks.load_chunk(coord)
    }

    fn target_for(&self, _coord: ChunkCoord) -> TileTarget {
        TileTarget {
            region: self.info.region.clone(),
            output: self.chunks.output().to_path_buf(),
        }
    }

    fn status(&self) -> JobStatus {
        JobStatus {
            id: self.id,
            kind: JobKind::Render,
            world: self.info.region.world_key(),
            label: self.info.region.dir_name(),
            state: self.state.clone(),
            processed: self.progress.processed(),
            total: Some(self.chunks.loader.total()),
            composited: self.progress.composited(),
            skipped: self.progress.skipped(),
            absent: self.progress.absent(),
            failed: self.progress.failures().len(),
            in_flight: self.progress.in_flight(),
            stalled: self.progress.is_stalled(),
        }
    }
}
