//! Chunk enumeration and main-thread chunk fetching for a region.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{ChunkCoord, ChunkData, Region, RenderError, Result};
use crate::world::HostWorld;

/// How a fetch treats chunks that are not resident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoadMode {
    /// Ask the host to load the chunk synchronously
    Eager,
    /// Request a background load and report `NotLoaded`
    #[default]
    Lazy,
}

/// Outcome of fetching one chunk from the host
#[derive(Debug)]
pub enum ChunkFetch {
    Ready(ChunkData),
    /// Load requested; retry on a later tick
    NotLoaded,
    /// Never generated, nothing to draw
    Absent,
}

/// Fetch a chunk snapshot from the host. Main thread only.
pub fn fetch_chunk(world: &dyn HostWorld, coord: ChunkCoord, mode: LoadMode) -> Result<ChunkFetch> {
    if !world.is_loaded() {
        return Err(RenderError::WorldUnavailable(world.name().to_string()));
    }
    if !world.chunk_exists(coord) {
        return Ok(ChunkFetch::Absent);
    }

    if !world.is_chunk_resident(coord) {
        match mode {
            LoadMode::Lazy => {
                world.request_chunk_load(coord);
                return Ok(ChunkFetch::NotLoaded);
            }
            LoadMode::Eager => {
                if !world.load_chunk_now(coord) {
                    return Ok(ChunkFetch::NotLoaded);
                }
            }
        }
    }

    // The host may evict between the residency check and the copy
    Ok(match world.snapshot_chunk(coord) {
        Some(chunk) => ChunkFetch::Ready(chunk),
        None => ChunkFetch::NotLoaded,
    })
}

/// Walks the chunks of one region and loads them from the host.
///
/// The walk is a cursor over the region's bounds in row-major order. It only
/// moves forward; build a new loader to walk the region again.
pub struct RegionChunksLoader {
    region: Region,
    world: Arc<dyn HostWorld>,
    cursor: u64,
}

impl RegionChunksLoader {
    pub fn new(region: Region, world: Arc<dyn HostWorld>) -> Self {
        Self {
            region,
            world,
            cursor: 0,
        }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn total(&self) -> u64 {
        self.region.chunk_count()
    }

    pub fn remaining(&self) -> u64 {
        self.total().saturating_sub(self.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Pull up to `n` coordinates, fewer at the end of the region
    pub fn next_batch(&mut self, n: usize) -> Vec<ChunkCoord> {
        self.by_ref().take(n).collect()
    }

    pub fn load_chunk(&self, coord: ChunkCoord, mode: LoadMode) -> Result<ChunkFetch> {
        fetch_chunk(self.world.as_ref(), coord, mode)
    }
}

impl Iterator for RegionChunksLoader {
    type Item = ChunkCoord;

    fn next(&mut self) -> Option<ChunkCoord> {
        let coord = self.region.bounds().nth(self.cursor)?;
        self.cursor += 1;
        Some(coord)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining()).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

impl fmt::Debug for RegionChunksLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionChunksLoader")
            .field("region", &self.region)
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// One in-flight chunk-loading task: where the tiles go, what to walk, and how
/// to treat non-resident chunks.
#[derive(Debug)]
pub struct ChunkLoaderInfo {
    pub output: PathBuf,
    pub loader: RegionChunksLoader,
    pub mode: LoadMode,
}

impl ChunkLoaderInfo {
    pub fn new(output: impl Into<PathBuf>, loader: RegionChunksLoader, mode: LoadMode) -> Self {
        Self {
            output: output.into(),
            loader,
            mode,
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn region(&self) -> &Region {
        self.loader.region()
    }

    pub fn load_chunk(&self, coord: ChunkCoord) -> Result<ChunkFetch> {
        self.loader.load_chunk(coord, self.mode)
    }
}
