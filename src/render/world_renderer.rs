//! Per-world owner of render and generation jobs.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::{Region, RenderError, Result};
use crate::render::generator_info::{ChunkGeneratorInfo, ChunkGeneratorType};
use crate::render::job::{JobHandle, JobId, JobKind, JobState, JobStatus, ScheduledJob};
use crate::render::loader::LoadMode;
use crate::render::render_info::{RegionRenderJob, RenderInfo};
use crate::world::HostWorld;

/// Source of job ids, shared by every renderer of a scheduler
#[derive(Debug, Clone, Default)]
pub struct JobIds(Arc<AtomicU64>);

impl JobIds {
    pub fn next(&self) -> JobId {
        JobId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Status of every job a world has, live and recently finished
#[derive(Debug, Clone, PartialEq)]
pub struct WorldStatus {
    pub world: Arc<str>,
    pub generation: Vec<JobStatus>,
    pub renders: Vec<JobStatus>,
    pub history: Vec<JobStatus>,
}

impl WorldStatus {
    pub fn active_count(&self) -> usize {
        self.generation.len() + self.renders.len()
    }
}

impl fmt::Display for WorldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.active_count() == 0 {
            writeln!(f, "{}: idle", self.world)?;
        } else {
            writeln!(f, "{}: {} active job(s)", self.world, self.active_count())?;
        }
        for job in self.generation.iter().chain(&self.renders) {
            writeln!(f, "  {}", job)?;
        }
        for job in &self.history {
            writeln!(f, "  (finished) {}", job)?;
        }
        Ok(())
    }
}

/// Jobs for one world.
///
/// Holds at most one live generation job, and at most one live render job per
/// region. Only the scheduler's thread mutates it.
pub struct WorldRenderer {
    key: Arc<str>,
    world: Arc<dyn HostWorld>,
    output_dir: PathBuf,
    ids: JobIds,
    load_mode: LoadMode,
    history_len: usize,
    current_tick: u64,
    generation: BTreeMap<JobId, ChunkGeneratorInfo>,
    renders: BTreeMap<JobId, RegionRenderJob>,
    history: VecDeque<JobStatus>,
}

impl WorldRenderer {
    pub fn new(
        world: Arc<dyn HostWorld>,
        output_root: &Path,
        ids: JobIds,
        load_mode: LoadMode,
        history_len: usize,
    ) -> Self {
        let key: Arc<str> = Arc::from(world.name());
        Self {
            output_dir: output_root.join(&*key),
            key,
            world,
            ids,
            load_mode,
            history_len,
            current_tick: 0,
            generation: BTreeMap::new(),
            renders: BTreeMap::new(),
            history: VecDeque::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.key
    }

    pub fn key(&self) -> Arc<str> {
        Arc::clone(&self.key)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn world(&self) -> &Arc<dyn HostWorld> {
        &self.world
    }

    pub fn set_tick(&mut self, tick: u64) {
        self.current_tick = tick;
    }

    pub fn set_load_mode(&mut self, mode: LoadMode) {
        self.load_mode = mode;
    }

    pub fn set_history_len(&mut self, len: usize) {
        self.history_len = len;
        self.history.truncate(len);
    }

    fn handle(&self, id: JobId, kind: JobKind) -> JobHandle {
        JobHandle {
            id,
            world: Arc::clone(&self.key),
            kind,
        }
    }

    fn ensure_loaded(&self) -> Result<()> {
        if self.world.is_loaded() {
            Ok(())
        } else {
            Err(RenderError::WorldUnavailable(self.key.to_string()))
        }
    }

    /// Start a world-wide generation job. Rejected while another one is live.
    pub fn start_generation(&mut self, kind: ChunkGeneratorType) -> Result<JobHandle> {
        if let Some(existing) = self.generation.values().find(|job| job.is_live()) {
            return Err(RenderError::AlreadyRunning {
                world: self.key.to_string(),
                kind: JobKind::Generation.as_str(),
                job: existing.id().0,
            });
        }
        self.ensure_loaded()?;

        let id = self.ids.next();
        let job = ChunkGeneratorInfo::new(
            id,
            Arc::clone(&self.world),
            kind,
            self.load_mode,
            self.output_dir.clone(),
            self.current_tick,
        );
        tracing::info!(
            "Starting {} generation {} for world '{}' ({} chunks)",
            kind,
            id,
            self.key,
            job.total()
        );
        self.generation.insert(id, job);
        Ok(self.handle(id, JobKind::Generation))
    }

    /// Queue a render of one region, or return the live job already rendering it
    pub fn start_region_render(&mut self, region: Region) -> Result<JobHandle> {
        if region.world() != &*self.key {
            return Err(RenderError::UnknownWorld(region.world().to_string()));
        }
        if let Some(existing) = self
            .renders
            .values()
            .find(|job| job.is_live() && job.region() == &region)
        {
            tracing::debug!("Region {} already queued as {}", region, existing.id());
            return Ok(self.handle(existing.id(), JobKind::Render));
        }
        self.ensure_loaded()?;

        let id = self.ids.next();
        let output = self.output_dir.join(region.dir_name());
        tracing::info!("Queued render {} of region {}", id, region);
        let info = RenderInfo::new(output, region);
        let job = RegionRenderJob::new(
            id,
            info,
            Arc::clone(&self.world),
            self.load_mode,
            self.current_tick,
        );
        self.renders.insert(id, job);
        Ok(self.handle(id, JobKind::Render))
    }

    pub fn owns(&self, id: JobId) -> bool {
        self.generation.contains_key(&id) || self.renders.contains_key(&id)
    }

    /// Cancel a live job. Tiles already written stay on disk.
    pub fn cancel(&mut self, id: JobId) -> Result<JobStatus> {
        let job = self.job_mut(id).ok_or(RenderError::UnknownJob(id.0))?;
        job.cancel();
        let status = job.status();
        tracing::info!("Cancelled {} in world '{}'", id, self.key);
        self.reap();
        Ok(status)
    }

    pub fn job(&self, id: JobId) -> Option<&dyn ScheduledJob> {
        if let Some(job) = self.generation.get(&id) {
            return Some(job);
        }
        self.renders.get(&id).map(|job| job as &dyn ScheduledJob)
    }

    pub fn job_mut(&mut self, id: JobId) -> Option<&mut dyn ScheduledJob> {
        if let Some(job) = self.generation.get_mut(&id) {
            return Some(job);
        }
        self.renders
            .get_mut(&id)
            .map(|job| job as &mut dyn ScheduledJob)
    }

    /// Live jobs, generation first, in id order
    pub fn live_job_ids(&self) -> Vec<JobId> {
        let generation = self.generation.values().map(|j| j as &dyn ScheduledJob);
        let renders = self.renders.values().map(|j| j as &dyn ScheduledJob);
        generation
            .chain(renders)
            .filter(|job| job.is_live())
            .map(|job| job.id())
            .collect()
    }

    pub fn has_live_jobs(&self) -> bool {
        !self.live_job_ids().is_empty()
    }

    /// Move terminal jobs into history. Returns their final status.
    pub fn reap(&mut self) -> Vec<JobStatus> {
        let mut finished = Vec::new();

        let done: Vec<JobId> = self
            .generation
            .iter()
            .filter(|(_, job)| job.state().is_terminal())
            .map(|(id, _)| *id)
            .collect();
        for id in done {
            if let Some(job) = self.generation.remove(&id) {
                finished.push(job.status());
            }
        }

        let done: Vec<JobId> = self
            .renders
            .iter()
            .filter(|(_, job)| job.state().is_terminal())
            .map(|(id, _)| *id)
            .collect();
        for id in done {
            if let Some(job) = self.renders.remove(&id) {
                finished.push(job.status());
            }
        }

        for status in &finished {
            match &status.state {
                JobState::Done => tracing::info!(
                    "Finished {} {} for '{}': {} tiles, {} skipped, {} absent, {} failed",
                    status.kind.as_str(),
                    status.id,
                    self.key,
                    status.composited,
                    status.skipped,
                    status.absent,
                    status.failed
                ),
                JobState::Failed(err) => {
                    tracing::warn!("{} {} failed: {}", status.kind.as_str(), status.id, err)
                }
                _ => {}
            }
            if self.history_len > 0 {
                if self.history.len() >= self.history_len {
                    self.history.pop_back();
                }
                self.history.push_front(status.clone());
            }
        }

        finished
    }

    /// The host unloaded this world: drop every job
    pub fn unload(&mut self) -> Vec<JobId> {
        let ids: Vec<JobId> = self
            .generation
            .keys()
            .chain(self.renders.keys())
            .copied()
            .collect();
        for id in &ids {
            if let Some(job) = self.job_mut(*id) {
                job.cancel();
            }
        }
        self.generation.clear();
        self.renders.clear();
        self.history.clear();
        if !ids.is_empty() {
            tracing::info!("World '{}' unloaded, discarded {} job(s)", self.key, ids.len());
        }
        ids
    }

    pub fn status(&self) -> WorldStatus {
        WorldStatus {
            world: Arc::clone(&self.key),
            generation: self.generation.values().map(|job| job.status()).collect(),
            renders: self.renders.values().map(|job| job.status()).collect(),
            history: self.history.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChunkBounds, ChunkCoord};
    use crate::world::SimulatedWorld;

    fn renderer() -> (Arc<SimulatedWorld>, WorldRenderer) {
        let world = Arc::new(SimulatedWorld::new("overworld", 1));
        world.generate_area(ChunkBounds::new(ChunkCoord::new(0, 0), ChunkCoord::new(3, 3)));
        let renderer = WorldRenderer::new(
            world.clone(),
            Path::new("tiles"),
            JobIds::default(),
            LoadMode::Lazy,
            4,
        );
        (world, renderer)
    }

    #[test]
    fn second_generation_is_rejected() {
        let (_world, mut renderer) = renderer();
        let first = renderer.start_generation(ChunkGeneratorType::Full).unwrap();
        let before = renderer.status();

        let err = renderer.start_generation(ChunkGeneratorType::Full).unwrap_err();
        assert_eq!(
            err,
            RenderError::AlreadyRunning {
                world: "overworld".into(),
                kind: "generation",
                job: first.id.0,
            }
        );
        assert_eq!(renderer.status(), before);
    }

    #[test]
    fn same_region_render_is_coalesced() {
        let (_world, mut renderer) = renderer();
        let a = renderer.start_region_render(Region::from_index("overworld", 0, 0)).unwrap();
        let b = renderer.start_region_render(Region::from_index("overworld", 0, 0)).unwrap();
        let c = renderer.start_region_render(Region::from_index("overworld", 1, 0)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.id, c.id);
        assert_eq!(renderer.status().renders.len(), 2);
    }

    #[test]
    fn render_for_other_world_is_refused() {
        let (_world, mut renderer) = renderer();
        let err = renderer
            .start_region_render(Region::from_index("nether", 0, 0))
            .unwrap_err();
        assert_eq!(err, RenderError::UnknownWorld("nether".into()));
    }

    #[test]
    fn cancel_moves_job_to_history() {
        let (_world, mut renderer) = renderer();
        let handle = renderer.start_generation(ChunkGeneratorType::Full).unwrap();
        let status = renderer.cancel(handle.id).unwrap();
        assert_eq!(status.state, JobState::Cancelled);

        let world_status = renderer.status();
        assert_eq!(world_status.active_count(), 0);
        assert_eq!(world_status.history[0].id, handle.id);
        assert!(renderer.start_generation(ChunkGeneratorType::Full).is_ok());
        assert_eq!(renderer.cancel(JobId(999)), Err(RenderError::UnknownJob(999)));
    }

    #[test]
    fn unloaded_world_refuses_new_jobs() {
        let (world, mut renderer) = renderer();
        world.unload();
        assert_eq!(
            renderer.start_generation(ChunkGeneratorType::Full),
            Err(RenderError::WorldUnavailable("overworld".into()))
        );
    }

    #[test]
    fn unload_discards_everything() {
        let (_world, mut renderer) = renderer();
        renderer.start_generation(ChunkGeneratorType::Full).unwrap();
        renderer.start_region_render(Region::from_index("overworld", 0, 0)).unwrap();
        assert_eq!(renderer.unload().len(), 2);
        let status = renderer.status();
        assert_eq!(status.active_count(), 0);
        assert!(status.history.is_empty());
    }

    #[test]
    fn history_is_bounded() {
        let (_world, mut renderer) = renderer();
        for _ in 0..6 {
            let handle = renderer.start_generation(ChunkGeneratorType::Changed).unwrap();
            renderer.cancel(handle.id).unwrap();
        }
        assert_eq!(renderer.status().history.len(), 4);
    }
}
