use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::REGION_SIZE;

/// Chunk position on a world's chunk grid
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Default, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Index of the region containing this chunk
    pub fn region(&self) -> (i32, i32) {
        (self.x.div_euclid(REGION_SIZE), self.z.div_euclid(REGION_SIZE))
    }
}

impl fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

impl From<(i32, i32)> for ChunkCoord {
    fn from((x, z): (i32, i32)) -> Self {
        Self { x, z }
    }
}

/// Inclusive box of chunk coordinates
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct ChunkBounds {
    pub min: ChunkCoord,
    pub max: ChunkCoord,
}

impl ChunkBounds {
    /// Build bounds from any two corners
    pub fn new(a: ChunkCoord, b: ChunkCoord) -> Self {
        Self {
            min: ChunkCoord::new(a.x.min(b.x), a.z.min(b.z)),
            max: ChunkCoord::new(a.x.max(b.x), a.z.max(b.z)),
        }
    }

    pub fn width(&self) -> u64 {
        (self.max.x as i64 - self.min.x as i64 + 1) as u64
    }

    pub fn depth(&self) -> u64 {
        (self.max.z as i64 - self.min.z as i64 + 1) as u64
    }

    pub fn len(&self) -> u64 {
        self.width() * self.depth()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        coord.x >= self.min.x
            && coord.x <= self.max.x
            && coord.z >= self.min.z
            && coord.z <= self.max.z
    }

    /// Row-major lookup: z is the outer axis, x the inner one
    pub fn nth(&self, index: u64) -> Option<ChunkCoord> {
        if index >= self.len() {
            return None;
        }
        let width = self.width();
        let x = self.min.x as i64 + (index % width) as i64;
        let z = self.min.z as i64 + (index / width) as i64;
        Some(ChunkCoord::new(x as i32, z as i32))
    }

    /// Grow the box so it also covers `coord`
    pub fn include(&mut self, coord: ChunkCoord) {
        self.min.x = self.min.x.min(coord.x);
        self.min.z = self.min.z.min(coord.z);
        self.max.x = self.max.x.max(coord.x);
        self.max.z = self.max.z.max(coord.z);
    }

    /// Bounds of the region indices that overlap this chunk box
    pub fn region_bounds(&self) -> ChunkBounds {
        let (min_rx, min_rz) = self.min.region();
        let (max_rx, max_rz) = self.max.region();
        ChunkBounds {
            min: ChunkCoord::new(min_rx, min_rz),
            max: ChunkCoord::new(max_rx, max_rz),
        }
    }
}

/// A world name plus a box of chunks rendered as one unit
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Region {
    world: Arc<str>,
    bounds: ChunkBounds,
}

impl Region {
    pub fn new(world: impl Into<Arc<str>>, bounds: ChunkBounds) -> Self {
        Self {
            world: world.into(),
            bounds,
        }
    }

    /// The standard REGION_SIZE x REGION_SIZE region at index (rx, rz).
    /// Indices must come from [`ChunkCoord::region`]; use
    /// [`Region::try_from_index`] for untrusted input.
    pub fn from_index(world: impl Into<Arc<str>>, rx: i32, rz: i32) -> Self {
        let min = ChunkCoord::new(rx * REGION_SIZE, rz * REGION_SIZE);
        let max = ChunkCoord::new(min.x + REGION_SIZE - 1, min.z + REGION_SIZE - 1);
        Self::new(world, ChunkBounds { min, max })
    }

    /// Like [`Region::from_index`], but `None` when the region's chunks fall
    /// outside the `i32` coordinate range
    pub fn try_from_index(world: impl Into<Arc<str>>, rx: i32, rz: i32) -> Option<Self> {
        let edge = |r: i32| -> Option<(i32, i32)> {
            let min = r.checked_mul(REGION_SIZE)?;
            Some((min, min.checked_add(REGION_SIZE - 1)?))
        };
        let (min_x, max_x) = edge(rx)?;
        let (min_z, max_z) = edge(rz)?;
        Some(Self::new(
            world,
            ChunkBounds {
                min: ChunkCoord::new(min_x, min_z),
                max: ChunkCoord::new(max_x, max_z),
            },
        ))
    }

    /// The standard region containing `coord`
    pub fn containing(world: impl Into<Arc<str>>, coord: ChunkCoord) -> Self {
        let (rx, rz) = coord.region();
        Self::from_index(world, rx, rz)
    }

    pub fn world(&self) -> &str {
        &self.world
    }

    pub fn world_key(&self) -> Arc<str> {
        Arc::clone(&self.world)
    }

    pub fn bounds(&self) -> ChunkBounds {
        self.bounds
    }

    pub fn chunk_count(&self) -> u64 {
        self.bounds.len()
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.bounds.contains(coord)
    }

    /// Directory name of the region's tile set
    pub fn dir_name(&self) -> String {
        let (rx, rz) = self.bounds.min.region();
        let aligned = Region::from_index(self.world_key(), rx, rz).bounds == self.bounds;
        if aligned {
            format!("r.{}.{}", rx, rz)
        } else {
            format!(
                "area.{}.{}.{}.{}",
                self.bounds.min.x, self.bounds.min.z, self.bounds.max.x, self.bounds.max.z
            )
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}..{}", self.world, self.bounds.min, self.bounds.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_index_uses_floor_division() {
        assert_eq!(ChunkCoord::new(0, 0).region(), (0, 0));
        assert_eq!(ChunkCoord::new(31, 31).region(), (0, 0));
        assert_eq!(ChunkCoord::new(32, -1).region(), (1, -1));
        assert_eq!(ChunkCoord::new(-32, -33).region(), (-1, -2));
    }

    #[test]
    fn bounds_nth_is_row_major() {
        let bounds = ChunkBounds::new(ChunkCoord::new(1, 1), ChunkCoord::new(-1, 0));
        assert_eq!(bounds.len(), 6);
        assert_eq!(bounds.nth(0), Some(ChunkCoord::new(-1, 0)));
        assert_eq!(bounds.nth(2), Some(ChunkCoord::new(1, 0)));
        assert_eq!(bounds.nth(3), Some(ChunkCoord::new(-1, 1)));
        assert_eq!(bounds.nth(6), None);
    }

    #[test]
    fn try_from_index_rejects_overflowing_indices() {
        let low = i32::MIN / REGION_SIZE;
        let high = (i32::MAX - (REGION_SIZE - 1)) / REGION_SIZE;
        assert_eq!(
            Region::try_from_index("overworld", low, high),
            Some(Region::from_index("overworld", low, high))
        );
        assert_eq!(Region::try_from_index("overworld", high + 1, 0), None);
        assert_eq!(Region::try_from_index("overworld", 0, low - 1), None);

        let edge = Region::try_from_index("overworld", high, 0).unwrap();
        assert_eq!(edge.bounds().max.x, i32::MAX);
    }

    #[test]
    fn region_from_index_covers_region_size() {
        let region = Region::from_index("overworld", -1, 2);
        assert_eq!(region.chunk_count(), (REGION_SIZE * REGION_SIZE) as u64);
        assert!(region.contains(ChunkCoord::new(-1, 64)));
        assert!(!region.contains(ChunkCoord::new(0, 64)));
        assert_eq!(region.dir_name(), "r.-1.2");
    }

    #[test]
    fn unaligned_region_gets_area_dir() {
        let region = Region::new(
            "overworld",
            ChunkBounds::new(ChunkCoord::new(0, 0), ChunkCoord::new(1, 1)),
        );
        assert_eq!(region.dir_name(), "area.0.0.1.1");
    }
}
