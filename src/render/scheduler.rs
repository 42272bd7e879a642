//! Tick-driven render scheduler
//!
//! Called once per host tick on the host's main thread. Each tick drains the
//! compositing results that arrived since the last one, then spends a bounded
//! amount of chunk fetches (and main-thread time) across every live job,
//! round-robin, handing ready chunk snapshots to the worker pool.
//!
//! Only this thread touches world state or job state. Workers see owned chunk
//! snapshots and report back through the pool's result channel.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::core::{ChunkCoord, Region, RenderError, Result};
use crate::render::compositor::{CompositeRequest, CompositorPool, SubmitError, TileCompositor};
use crate::render::generator_info::ChunkGeneratorType;
use crate::render::job::{JobHandle, JobId, JobStatus};
use crate::render::loader::ChunkFetch;
use crate::render::world_renderer::{JobIds, WorldRenderer, WorldStatus};
use crate::utils::settings::RenderSettings;
use crate::world::HostWorld;

/// What one tick did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Chunk fetches issued against the host
    pub fetched: usize,
    /// Chunk snapshots handed to workers
    pub dispatched: usize,
    /// Worker results applied to live jobs
    pub completed: usize,
    /// Worker results dropped because their job is gone
    pub discarded: usize,
    pub finished: Vec<JobStatus>,
}

#[derive(Default)]
struct StepOutcome {
    fetched: usize,
    queue_full: bool,
    out_of_time: bool,
}

pub struct Scheduler {
    settings: RenderSettings,
    compositor: Arc<dyn TileCompositor>,
    pool: CompositorPool,
    rebuild_pool: bool,
    renderers: BTreeMap<Arc<str>, WorldRenderer>,
    job_index: FxHashMap<JobId, Arc<str>>,
    ids: JobIds,
    tick: u64,
    round_robin: usize,
}

impl Scheduler {
    pub fn new(settings: RenderSettings, compositor: Arc<dyn TileCompositor>) -> Self {
        let pool = CompositorPool::new(
            Arc::clone(&compositor),
            settings.worker_count,
            settings.queue_capacity,
        );
        tracing::info!(
            "Render scheduler ready: {} tile workers, {} chunks/tick, {}ms/tick",
            pool.worker_count(),
            settings.max_chunks_per_tick,
            settings.max_tick_time_ms
        );
        Self {
            settings,
            compositor,
            pool,
            rebuild_pool: false,
            renderers: BTreeMap::new(),
            job_index: FxHashMap::default(),
            ids: JobIds::default(),
            tick: 0,
            round_robin: 0,
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Threads in the compositing pool currently in use
    pub fn worker_count(&self) -> usize {
        self.pool.worker_count()
    }

    /// Swap in reloaded settings. A new pool size applies once the current pool
    /// has no work in flight.
    pub fn apply_settings(&mut self, settings: RenderSettings) {
        if settings.worker_count != self.settings.worker_count
            || settings.queue_capacity != self.settings.queue_capacity
        {
            self.rebuild_pool = true;
        }
        for renderer in self.renderers.values_mut() {
            renderer.set_load_mode(settings.load_mode);
            renderer.set_history_len(settings.history_len);
        }
        self.settings = settings;
        self.maybe_rebuild_pool();
        tracing::info!("Render settings reloaded");
    }

    fn maybe_rebuild_pool(&mut self) {
        if self.rebuild_pool && self.pool.in_flight() == 0 {
            self.pool = CompositorPool::new(
                Arc::clone(&self.compositor),
                self.settings.worker_count,
                self.settings.queue_capacity,
            );
            self.rebuild_pool = false;
            tracing::info!("Tile worker pool resized to {}", self.pool.worker_count());
        }
    }

    /// Register a world. A world registered under the same name is unloaded first.
    pub fn add_world(&mut self, world: Arc<dyn HostWorld>) {
        let name = world.name().to_string();
        self.remove_world(&name);
        let mut renderer = WorldRenderer::new(
            world,
            &self.settings.output_root,
            self.ids.clone(),
            self.settings.load_mode,
            self.settings.history_len,
        );
        renderer.set_tick(self.tick);
        tracing::debug!("Registered world '{}'", name);
        self.renderers.insert(renderer.key(), renderer);
    }

    /// The host unloaded a world: cancel and forget all of its jobs
    pub fn remove_world(&mut self, name: &str) -> bool {
        let Some(mut renderer) = self.renderers.remove(name) else {
            return false;
        };
        for id in renderer.unload() {
            self.job_index.remove(&id);
        }
        true
    }

    pub fn worlds(&self) -> impl Iterator<Item = &str> {
        self.renderers.keys().map(|k| &**k)
    }

    pub fn renderer(&self, name: &str) -> Option<&WorldRenderer> {
        self.renderers.get(name)
    }

    fn renderer_mut(&mut self, name: &str) -> Result<&mut WorldRenderer> {
        self.renderers
            .get_mut(name)
            .ok_or_else(|| RenderError::UnknownWorld(name.to_string()))
    }

    pub fn start_generation(&mut self, world: &str, kind: ChunkGeneratorType) -> Result<JobHandle> {
        let handle = self.renderer_mut(world)?.start_generation(kind)?;
        self.job_index.insert(handle.id, Arc::clone(&handle.world));
        Ok(handle)
    }

    pub fn start_region_render(&mut self, region: Region) -> Result<JobHandle> {
        let handle = self.renderer_mut(region.world())?.start_region_render(region)?;
        self.job_index.insert(handle.id, Arc::clone(&handle.world));
        Ok(handle)
    }

    pub fn cancel(&mut self, id: JobId) -> Result<JobStatus> {
        let world = self
            .job_index
            .get(&id)
            .cloned()
            .ok_or(RenderError::UnknownJob(id.0))?;
        let status = self.renderer_mut(&world)?.cancel(id)?;
        self.job_index.remove(&id);
        Ok(status)
    }

    pub fn job_status(&self, id: JobId) -> Option<JobStatus> {
        let world = self.job_index.get(&id)?;
        self.renderers.get(world)?.job(id).map(|job| job.status())
    }

    pub fn world_status(&self, name: &str) -> Option<WorldStatus> {
        self.renderers.get(name).map(|r| r.status())
    }

    pub fn status(&self) -> Vec<WorldStatus> {
        self.renderers.values().map(|r| r.status()).collect()
    }

    /// No live jobs and no tiles in flight
    pub fn is_idle(&self) -> bool {
        self.job_index.is_empty() && self.pool.in_flight() == 0
    }

    /// Advance every live job by one host tick
    pub fn tick(&mut self) -> TickReport {
        self.tick += 1;
        let started = Instant::now();
        let mut report = TickReport {
            tick: self.tick,
            ..Default::default()
        };

        for renderer in self.renderers.values_mut() {
            renderer.set_tick(self.tick);
        }

        self.drain_completions(&mut report);
        self.dispatch(started, &mut report);
        self.advance_jobs(&mut report);
        self.maybe_rebuild_pool();

        report
    }

    fn drain_completions(&mut self, report: &mut TickReport) {
        loop {
            let results = self.pool.poll_results(256);
            if results.is_empty() {
                break;
            }
            for result in results {
                let job = self
                    .job_index
                    .get(&result.job)
                    .and_then(|world| self.renderers.get_mut(world))
                    .and_then(|renderer| renderer.job_mut(result.job))
                    .filter(|job| job.is_live());
                let Some(job) = job else {
                    tracing::trace!("Dropping result for finished job {}", result.job);
                    report.discarded += 1;
                    continue;
                };

                let progress = job.progress_mut();
                let applied = match result.outcome {
                    Ok(()) => progress.record_composited(result.coord, self.tick),
                    Err(reason) => {
                        tracing::warn!(
                            "Tile {} of job {} failed: {}",
                            result.coord,
                            result.job,
                            reason
                        );
                        progress.record_failure(result.coord, reason)
                    }
                };
                if applied {
                    report.completed += 1;
                } else {
                    report.discarded += 1;
                }
            }
        }
    }

    fn dispatch(&mut self, started: Instant, report: &mut TickReport) {
        let mut jobs: Vec<(Arc<str>, JobId)> = self
            .renderers
            .iter()
            .flat_map(|(key, renderer)| {
                renderer
                    .live_job_ids()
                    .into_iter()
                    .map(move |id| (Arc::clone(key), id))
            })
            .collect();
        if jobs.is_empty() {
            return;
        }

        // Rotate so the same job does not always get first pick
        let offset = self.round_robin % jobs.len();
        jobs.rotate_left(offset);
        self.round_robin = self.round_robin.wrapping_add(1);

        let mut budget = self.settings.max_chunks_per_tick.max(1);
        let deadline = started + self.settings.tick_budget();

        while budget > 0 {
            let share = (budget / jobs.len()).max(1);
            let mut progressed = false;

            for (world, id) in &jobs {
                if budget == 0 {
                    break;
                }
                let step = self.step_job(world, *id, share.min(budget), deadline, report);
                budget -= step.fetched.min(budget);
                progressed |= step.fetched > 0;
                if step.queue_full || step.out_of_time {
                    return;
                }
            }

            if !progressed {
                break;
            }
        }
    }

    /// Fetch up to `n` chunks for one job and hand the ready ones to workers
    fn step_job(
        &mut self,
        world: &str,
        id: JobId,
        n: usize,
        deadline: Instant,
        report: &mut TickReport,
    ) -> StepOutcome {
        let tick = self.tick;
        let max_retries = self.settings.max_chunk_retries;
        let retry_delay = self.settings.retry_delay_ticks.max(1);
        let mut outcome = StepOutcome::default();

        let Some(job) = self
            .renderers
            .get_mut(world)
            .and_then(|renderer| renderer.job_mut(id))
        else {
            return outcome;
        };
        if !job.is_live() {
            return outcome;
        }

        let mut work: Vec<(ChunkCoord, u32)> = job
            .progress_mut()
            .take_ready(n, tick)
            .into_iter()
            .map(|pending| (pending.coord, pending.attempts))
            .collect();
        if work.len() < n {
            work.extend(job.next_batch(n - work.len()).into_iter().map(|coord| (coord, 0)));
        }

        let mut work = work.into_iter();
        while let Some((coord, attempts)) = work.next() {
            let out_of_time = report.fetched > 0 && Instant::now() >= deadline;
            if out_of_time || self.pool.is_full() {
                // Put the rest back untouched for the next tick
                job.progress_mut().requeue(coord, attempts, tick);
                for (coord, attempts) in work.by_ref() {
                    job.progress_mut().requeue(coord, attempts, tick);
                }
                outcome.out_of_time = out_of_time;
                outcome.queue_full = !out_of_time;
                break;
            }

            outcome.fetched += 1;
            report.fetched += 1;

            match job.load_chunk(coord) {
                Ok(ChunkFetch::Ready(chunk)) => {
                    let target = job.target_for(coord);
                    let request = CompositeRequest {
                        job: id,
                        region: target.region,
                        output: target.output,
                        coord,
                        chunk,
                    };
                    match self.pool.submit(request) {
                        Ok(()) => {
                            job.progress_mut().mark_dispatched(coord);
                            report.dispatched += 1;
                        }
                        Err(SubmitError::Full(request)) => {
                            job.progress_mut().requeue(request.coord, attempts, tick);
                            for (coord, attempts) in work.by_ref() {
                                job.progress_mut().requeue(coord, attempts, tick);
                            }
                            outcome.queue_full = true;
                            break;
                        }
                        Err(SubmitError::Disconnected(request)) => {
                            tracing::debug!("No tile worker for {} of job {}", request.coord, id);
                            let reason = "no tile workers running".to_string();
                            job.progress_mut().record_dispatch_failure(request.coord, reason);
                        }
                    }
                }
                Ok(ChunkFetch::NotLoaded) => {
                    let attempts = attempts + 1;
                    if attempts > max_retries {
                        job.progress_mut().record_skipped(coord, attempts, tick);
                    } else {
                        job.progress_mut().requeue(coord, attempts, tick + retry_delay);
                    }
                }
                Ok(ChunkFetch::Absent) => job.progress_mut().record_absent(tick),
                Err(err) => {
                    tracing::warn!("Job {} in world '{}' stopped: {}", id, world, err);
                    job.fail(err);
                    break;
                }
            }
        }

        outcome
    }

    fn advance_jobs(&mut self, report: &mut TickReport) {
        let stall_ticks = self.settings.stall_ticks;
        for renderer in self.renderers.values_mut() {
            for id in renderer.live_job_ids() {
                let Some(job) = renderer.job_mut(id) else {
                    continue;
                };
                job.advance_state();
                let has_work = job.is_live();
                if job.progress_mut().check_stall(self.tick, stall_ticks, has_work) {
                    let status = job.status();
                    tracing::warn!(
                        "Job {} in world '{}' has made no progress for {} ticks ({}/{} processed)",
                        id,
                        renderer.name(),
                        stall_ticks,
                        status.processed,
                        status.total.unwrap_or(0)
                    );
                }
            }

            for status in renderer.reap() {
                self.job_index.remove(&status.id);
                report.finished.push(status);
            }
        }
    }
}
