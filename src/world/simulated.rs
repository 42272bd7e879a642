//! In-memory host world.
//!
//! Stands in for a game server: chunks live in "storage" until loaded, loads
//! requested through [`HostWorld::request_chunk_load`] complete on the next
//! [`SimulatedWorld::tick`], and edits are tracked for incremental renders.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::core::{ChunkBounds, ChunkCoord, ChunkData, SurfaceColumn};
use crate::world::generator::TerrainGenerator;
use crate::world::host::HostWorld;

#[derive(Default)]
struct WorldState {
    loaded: bool,
    stored: FxHashSet<ChunkCoord>,
    bounds: Option<ChunkBounds>,
    resident: FxHashMap<ChunkCoord, ChunkData>,
    pending_loads: FxHashSet<ChunkCoord>,
    blocked: FxHashSet<ChunkCoord>,
    changed: Vec<ChunkCoord>,
    changed_set: FxHashSet<ChunkCoord>,
}

pub struct SimulatedWorld {
    name: String,
    generator: TerrainGenerator,
    state: RwLock<WorldState>,
    chunk_accesses: AtomicU64,
}

impl SimulatedWorld {
    pub fn new(name: impl Into<String>, seed: u32) -> Self {
        Self {
            name: name.into(),
            generator: TerrainGenerator::new(seed),
            state: RwLock::new(WorldState {
                loaded: true,
                ..Default::default()
            }),
            chunk_accesses: AtomicU64::new(0),
        }
    }

    /// Mark every chunk in `bounds` as generated in storage
    pub fn generate_area(&self, bounds: ChunkBounds) {
        let mut state = self.state.write();
        for index in 0..bounds.len() {
            if let Some(coord) = bounds.nth(index) {
                state.stored.insert(coord);
            }
        }
        match state.bounds.as_mut() {
            Some(known) => {
                known.include(bounds.min);
                known.include(bounds.max);
            }
            None => state.bounds = Some(bounds),
        }
    }

    /// Generate and load every chunk in `bounds`
    pub fn load_area(&self, bounds: ChunkBounds) {
        self.generate_area(bounds);
        let mut state = self.state.write();
        for index in 0..bounds.len() {
            if let Some(coord) = bounds.nth(index) {
                let chunk = self.generator.generate_chunk(coord);
                state.resident.insert(coord, chunk);
            }
        }
    }

    pub fn evict_chunk(&self, coord: ChunkCoord) {
        self.state.write().resident.remove(&coord);
    }

    /// Keep a chunk's loads from ever completing
    pub fn block_chunk(&self, coord: ChunkCoord) {
        let mut state = self.state.write();
        state.blocked.insert(coord);
        state.resident.remove(&coord);
    }

    /// Overwrite one column of a resident chunk and record the edit
    pub fn edit_column(&self, coord: ChunkCoord, x: i32, z: i32, column: SurfaceColumn) -> bool {
        let mut state = self.state.write();
        let Some(chunk) = state.resident.get_mut(&coord) else {
            return false;
        };
        chunk.set_column(x, z, column);
        if state.changed_set.insert(coord) {
            state.changed.push(coord);
        }
        true
    }

    pub fn unload(&self) {
        let mut state = self.state.write();
        state.loaded = false;
        state.resident.clear();
        state.pending_loads.clear();
    }

    /// Host tick: complete loads requested since the previous tick
    pub fn tick(&self) {
        let mut state = self.state.write();
        if !state.loaded {
            return;
        }
        let pending: Vec<ChunkCoord> = state.pending_loads.drain().collect();
        for coord in pending {
            if state.blocked.contains(&coord) {
                continue;
            }
            let chunk = self.generator.generate_chunk(coord);
            state.resident.insert(coord, chunk);
        }
    }

    pub fn resident_count(&self) -> usize {
        self.state.read().resident.len()
    }

    /// Number of residency checks, load requests and snapshots served so far
    pub fn chunk_accesses(&self) -> u64 {
        self.chunk_accesses.load(Ordering::Relaxed)
    }

    fn count_access(&self) {
        self.chunk_accesses.fetch_add(1, Ordering::Relaxed);
    }
}

impl HostWorld for SimulatedWorld {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_loaded(&self) -> bool {
        self.state.read().loaded
    }

    fn known_bounds(&self) -> Option<ChunkBounds> {
        self.state.read().bounds
    }

    fn chunk_exists(&self, coord: ChunkCoord) -> bool {
        self.state.read().stored.contains(&coord)
    }

    fn is_chunk_resident(&self, coord: ChunkCoord) -> bool {
        self.count_access();
        self.state.read().resident.contains_key(&coord)
    }

    fn request_chunk_load(&self, coord: ChunkCoord) {
        self.count_access();
        let mut state = self.state.write();
        if state.loaded && state.stored.contains(&coord) {
            state.pending_loads.insert(coord);
        }
    }

    fn load_chunk_now(&self, coord: ChunkCoord) -> bool {
        self.count_access();
        let mut state = self.state.write();
        if !state.loaded || !state.stored.contains(&coord) || state.blocked.contains(&coord) {
            return false;
        }
        if !state.resident.contains_key(&coord) {
            let chunk = self.generator.generate_chunk(coord);
            state.resident.insert(coord, chunk);
        }
        true
    }

    fn snapshot_chunk(&self, coord: ChunkCoord) -> Option<ChunkData> {
        self.count_access();
        self.state.read().resident.get(&coord).cloned()
    }

    fn take_changed_chunks(&self) -> Vec<ChunkCoord> {
        let mut state = self.state.write();
        state.changed_set.clear();
        std::mem::take(&mut state.changed)
    }

    fn mark_changed(&self, coords: &[ChunkCoord]) {
        let mut state = self.state.write();
        for &coord in coords {
            if state.changed_set.insert(coord) {
                state.changed.push(coord);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BlockType;

    fn bounds(x0: i32, z0: i32, x1: i32, z1: i32) -> ChunkBounds {
        ChunkBounds::new(ChunkCoord::new(x0, z0), ChunkCoord::new(x1, z1))
    }

    #[test]
    fn requested_loads_complete_on_next_tick() {
        let world = SimulatedWorld::new("overworld", 1);
        world.generate_area(bounds(0, 0, 1, 1));
        let coord = ChunkCoord::new(1, 1);

        assert!(!world.is_chunk_resident(coord));
        world.request_chunk_load(coord);
        assert!(!world.is_chunk_resident(coord));
        world.tick();
        assert!(world.is_chunk_resident(coord));
        assert!(world.snapshot_chunk(coord).is_some());
    }

    #[test]
    fn chunks_outside_storage_never_load() {
        let world = SimulatedWorld::new("overworld", 1);
        world.generate_area(bounds(0, 0, 0, 0));
        let outside = ChunkCoord::new(5, 5);
        world.request_chunk_load(outside);
        world.tick();
        assert!(!world.is_chunk_resident(outside));
        assert!(!world.load_chunk_now(outside));
    }

    #[test]
    fn known_bounds_grow_with_generated_areas() {
        let world = SimulatedWorld::new("overworld", 1);
        assert_eq!(world.known_bounds(), None);
        world.generate_area(bounds(0, 0, 1, 1));
        world.generate_area(bounds(-3, 4, -2, 5));
        assert_eq!(world.known_bounds(), Some(bounds(-3, 0, 1, 5)));
    }

    #[test]
    fn edits_are_reported_once() {
        let world = SimulatedWorld::new("overworld", 1);
        world.load_area(bounds(0, 0, 0, 0));
        let coord = ChunkCoord::new(0, 0);
        let column = SurfaceColumn {
            height: 80,
            block: BlockType::Stone,
            water_depth: 0,
        };
        assert!(world.edit_column(coord, 1, 1, column));
        assert!(world.edit_column(coord, 2, 2, column));
        assert_eq!(world.take_changed_chunks(), vec![coord]);
        assert!(world.take_changed_chunks().is_empty());
    }

    #[test]
    fn unload_drops_resident_chunks() {
        let world = SimulatedWorld::new("overworld", 1);
        world.load_area(bounds(0, 0, 1, 0));
        assert_eq!(world.resident_count(), 2);
        world.unload();
        assert!(!world.is_loaded());
        assert_eq!(world.resident_count(), 0);
    }
}
