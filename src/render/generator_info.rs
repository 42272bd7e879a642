//! World-wide tile generation jobs.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::constants::REGION_SIZE;
use crate::core::{ChunkBounds, ChunkCoord, Region, Result};
use crate::render::job::{
    JobId, JobKind, JobProgress, JobState, JobStatus, ScheduledJob, TileTarget,
};
use crate::render::loader::{ChunkFetch, ChunkLoaderInfo, LoadMode, RegionChunksLoader, fetch_chunk};
use crate::world::HostWorld;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkGeneratorType {
    /// Every region overlapping the world's known chunks
    Full,
    /// Only chunks the host reports as modified
    Changed,
}

impl ChunkGeneratorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkGeneratorType::Full => "full",
            ChunkGeneratorType::Changed => "changed",
        }
    }
}

impl fmt::Display for ChunkGeneratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkGeneratorType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" | "all" => Ok(ChunkGeneratorType::Full),
            "changed" | "incremental" => Ok(ChunkGeneratorType::Changed),
            other => Err(format!("unknown generation type '{}'", other)),
        }
    }
}

/// The lazy coordinate sequence behind a generation job
enum CoordSource {
    /// Region indices walked row-major, one region loader at a time
    Regions {
        regions: ChunkBounds,
        next_region: u64,
        current: Option<ChunkLoaderInfo>,
    },
    Queue(VecDeque<ChunkCoord>),
    Empty,
}

/// One active "generate tiles for a world" job
pub struct ChunkGeneratorInfo {
    id: JobId,
    world_key: Arc<str>,
    world: Arc<dyn HostWorld>,
    kind: ChunkGeneratorType,
    mode: LoadMode,
    output_dir: PathBuf,
    source: CoordSource,
    total: u64,
    state: JobState,
    progress: JobProgress,
}

impl ChunkGeneratorInfo {
    /// Capture the coordinate sequence for `kind` from the host's current state.
    /// Main thread only.
    pub fn new(
        id: JobId,
        world: Arc<dyn HostWorld>,
        kind: ChunkGeneratorType,
        mode: LoadMode,
        output_dir: PathBuf,
        tick: u64,
    ) -> Self {
        let (source, total) = match kind {
            ChunkGeneratorType::Full => match world.known_bounds() {
                Some(bounds) => {
                    let regions = bounds.region_bounds();
                    let per_region = (REGION_SIZE as u64) * (REGION_SIZE as u64);
                    (
                        CoordSource::Regions {
                            regions,
                            next_region: 0,
                            current: None,
                        },
                        regions.len() * per_region,
                    )
                }
                None => (CoordSource::Empty, 0),
            },
            ChunkGeneratorType::Changed => {
                let mut seen = FxHashSet::default();
                let queue: VecDeque<ChunkCoord> = world
                    .take_changed_chunks()
                    .into_iter()
                    .filter(|coord| seen.insert(*coord))
                    .collect();
                let total = queue.len() as u64;
                (CoordSource::Queue(queue), total)
            }
        };

        Self {
            id,
            world_key: Arc::from(world.name()),
            world,
            kind,
            mode,
            output_dir,
            source,
            total,
            state: JobState::Active,
            progress: JobProgress::new(tick),
        }
    }

    pub fn generator_type(&self) -> ChunkGeneratorType {
        self.kind
    }

    pub fn world(&self) -> &str {
        &self.world_key
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn processed(&self) -> u64 {
        self.progress.processed()
    }

    pub fn increment_count(&mut self, tick: u64) {
        self.progress.increment_count(tick);
    }

    fn region_output(&self, region: &Region) -> PathBuf {
        self.output_dir.join(region.dir_name())
    }

    fn pull_one(&mut self) -> Option<ChunkCoord> {
        loop {
            match &mut self.source {
                CoordSource::Empty => return None,
                CoordSource::Queue(queue) => return queue.pop_front(),
                CoordSource::Regions {
                    regions,
                    next_region,
                    current,
                } => {
                    if let Some(info) = current.as_mut() {
                        if let Some(coord) = info.loader.next() {
                            return Some(coord);
                        }
                        *current = None;
                    }
                    let index = regions.nth(*next_region)?;
                    *next_region += 1;
                    let region = Region::from_index(Arc::clone(&self.world_key), index.x, index.z);
                    let output = self.output_dir.join(region.dir_name());
                    let loader = RegionChunksLoader::new(region, Arc::clone(&self.world));
                    *current = Some(ChunkLoaderInfo::new(output, loader, self.mode));
                }
            }
        }
    }
}

impl ScheduledJob for ChunkGeneratorInfo {
    fn id(&self) -> JobId {
        self.id
    }

    fn kind(&self) -> JobKind {
        JobKind::Generation
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
        let mut batch = Vec::with_capacity(n);
        while batch.len() < n {
            match self.pull_one() {
                Some(coord) => batch.push(coord),
                None => break,
            }
        }
        batch
    }

    fn is_exhausted(&self) -> bool {
        match &self.source {
            CoordSource::Empty => true,
            CoordSource::Queue(queue) => queue.is_empty(),
            CoordSource::Regions {
                regions,
                next_region,
                current,
            } => {
                *next_region >= regions.len()
                    && current.as_ref().is_none_or(|info| info.loader.is_exhausted())
            }
        }
    }

    fn load_chunk(&self, coord: ChunkCoord) -> Result<ChunkFetch> {
        fetch_chunk(self.world.as_ref(), coord, self.mode)
    }

    fn target_for(&self, coord: ChunkCoord) -> TileTarget {
        if let CoordSource::Regions {
            current: Some(info),
            ..
        } = &self.source
        {
            if info.region().contains(coord) {
                return TileTarget {
                    region: info.region().clone(),
                    output: info.output().to_path_buf(),
                };
            }
        }
        let region = Region::containing(Arc::clone(&self.world_key), coord);
        let output = self.region_output(&region);
        TileTarget { region, output }
    }

    /// A stopped incremental job gives its edits back to the host so the next
    /// changed-chunk job still renders them
    fn release_unresolved(&mut self) {
        if self.kind != ChunkGeneratorType::Changed {
            return;
        }
        let mut coords = self.progress.unresolved();
        if let CoordSource::Queue(queue) = &mut self.source {
            coords.extend(queue.drain(..));
        }
        if !coords.is_empty() {
            tracing::debug!(
                "Returning {} unrendered edit(s) of world '{}' to the host",
                coords.len(),
                self.world_key
            );
            self.world.mark_changed(&coords);
        }
    }

    fn status(&self) -> JobStatus {
        JobStatus {
            id: self.id,
            kind: JobKind::Generation,
            world: Arc::clone(&self.world_key),
            label: self.kind.as_str().to_string(),
            state: self.state.clone(),
            processed: self.progress.processed(),
            total: Some(self.total),
            composited: self.progress.composited(),
            skipped: self.progress.skipped(),
            absent: self.progress.absent(),
            failed: self.progress.failures().len(),
            in_flight: self.progress.in_flight(),
            stalled: self.progress.is_stalled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RenderError;
    use crate::world::SimulatedWorld;

    fn generator(world: Arc<SimulatedWorld>, kind: ChunkGeneratorType) -> ChunkGeneratorInfo {
        let output = PathBuf::from("tiles/overworld");
        ChunkGeneratorInfo::new(JobId(1), world, kind, LoadMode::Lazy, output, 0)
    }

    #[test]
    fn full_generation_walks_whole_regions() {
        let world = Arc::new(SimulatedWorld::new("overworld", 1));
        world.generate_area(ChunkBounds::new(ChunkCoord::new(0, 0), ChunkCoord::new(40, 3)));
        let mut job = generator(world, ChunkGeneratorType::Full);

        let per_region = (REGION_SIZE * REGION_SIZE) as u64;
        assert_eq!(job.total(), 2 * per_region);

        let mut seen = FxHashSet::default();
        loop {
            let batch = job.next_batch(100);
            if batch.is_empty() {
                break;
            }
            for coord in batch {
                assert!(seen.insert(coord), "{} pulled twice", coord);
            }
        }
        assert_eq!(seen.len() as u64, job.total());
        assert!(job.is_exhausted());
        assert_eq!(job.processed(), 0);
    }

    #[test]
    fn full_generation_of_empty_world_is_exhausted() {
        let world = Arc::new(SimulatedWorld::new("overworld", 1));
        let mut job = generator(world, ChunkGeneratorType::Full);
        assert!(job.is_exhausted());
        assert!(job.next_batch(10).is_empty());
    }

    #[test]
    fn changed_generation_uses_edited_chunks() {
        let world = Arc::new(SimulatedWorld::new("overworld", 1));
        world.load_area(ChunkBounds::new(ChunkCoord::new(0, 0), ChunkCoord::new(3, 3)));
        let column = crate::core::SurfaceColumn::default();
        world.edit_column(ChunkCoord::new(2, 1), 0, 0, column);
        world.edit_column(ChunkCoord::new(0, 3), 0, 0, column);

        let mut job = generator(world, ChunkGeneratorType::Changed);
        assert_eq!(job.total(), 2);
        assert_eq!(
            job.next_batch(10),
            vec![ChunkCoord::new(2, 1), ChunkCoord::new(0, 3)]
        );
        assert!(job.is_exhausted());
    }

    #[test]
    fn cancelled_changed_job_returns_its_edits() {
        let world = Arc::new(SimulatedWorld::new("overworld", 1));
        world.load_area(ChunkBounds::new(ChunkCoord::new(0, 0), ChunkCoord::new(3, 3)));
        let column = crate::core::SurfaceColumn::default();
        for x in 0..4 {
            world.edit_column(ChunkCoord::new(x, 0), 0, 0, column);
        }

        let mut job = generator(world.clone(), ChunkGeneratorType::Changed);
        assert_eq!(job.total(), 4);
        // One tile in flight, one waiting for a retry, two never pulled
        let pulled = job.next_batch(2);
        job.progress_mut().mark_dispatched(pulled[0]);
        job.progress_mut().requeue(pulled[1], 1, 5);
        job.cancel();
        assert_eq!(job.state(), &JobState::Cancelled);

        let again = generator(world, ChunkGeneratorType::Changed);
        assert_eq!(again.total(), 4);
    }

    #[test]
    fn resolved_edits_are_not_returned() {
        let world = Arc::new(SimulatedWorld::new("overworld", 1));
        world.load_area(ChunkBounds::new(ChunkCoord::new(0, 0), ChunkCoord::new(3, 3)));
        let column = crate::core::SurfaceColumn::default();
        world.edit_column(ChunkCoord::new(0, 0), 0, 0, column);
        world.edit_column(ChunkCoord::new(1, 0), 0, 0, column);

        let mut job = generator(world.clone(), ChunkGeneratorType::Changed);
        let pulled = job.next_batch(1);
        job.progress_mut().mark_dispatched(pulled[0]);
        assert!(job.progress_mut().record_composited(pulled[0], 1));
        job.fail(RenderError::WorldUnavailable("overworld".into()));

        let again = generator(world, ChunkGeneratorType::Changed);
        assert_eq!(again.total(), 1);
    }

    #[test]
    fn tiles_land_in_the_containing_region_dir() {
        let world = Arc::new(SimulatedWorld::new("overworld", 1));
        let job = generator(world, ChunkGeneratorType::Full);
        let target = job.target_for(ChunkCoord::new(-1, 33));
        assert_eq!(target.output, PathBuf::from("tiles/overworld/r.-1.1"));
    }

    #[test]
    fn generation_type_parses() {
        assert_eq!("FULL".parse::<ChunkGeneratorType>(), Ok(ChunkGeneratorType::Full));
        assert_eq!("changed".parse::<ChunkGeneratorType>(), Ok(ChunkGeneratorType::Changed));
        assert!("partial".parse::<ChunkGeneratorType>().is_err());
    }
}
