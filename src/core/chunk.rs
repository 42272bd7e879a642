use crate::constants::*;
use crate::core::block::BlockType;
use crate::core::coords::ChunkCoord;

/// Top-most non-air block of one column
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct SurfaceColumn {
    pub height: i32,
    pub block: BlockType,
    /// Water depth above `height`, zero on dry land
    pub water_depth: u8,
}

/// Snapshot of the chunk state the map needs.
///
/// Taken on the host thread and then moved to a compositing worker, so it owns
/// its data and never borrows from the live world.
#[derive(Clone, Debug)]
pub struct ChunkData {
    pub coord: ChunkCoord,
    columns: Box<[SurfaceColumn; CHUNK_AREA]>,
}

impl ChunkData {
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            columns: Box::new([SurfaceColumn::default(); CHUNK_AREA]),
        }
    }

    fn index(x: i32, z: i32) -> Option<usize> {
        if (0..CHUNK_SIZE).contains(&x) && (0..CHUNK_SIZE).contains(&z) {
            Some((z * CHUNK_SIZE + x) as usize)
        } else {
            None
        }
    }

    pub fn column(&self, x: i32, z: i32) -> SurfaceColumn {
        Self::index(x, z)
            .map(|i| self.columns[i])
            .unwrap_or_default()
    }

    pub fn set_column(&mut self, x: i32, z: i32, column: SurfaceColumn) {
        if let Some(i) = Self::index(x, z) {
            self.columns[i] = column;
        }
    }

    pub fn columns(&self) -> &[SurfaceColumn] {
        &self.columns[..]
    }

    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(|c| c.block.is_void())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_columns_read_as_air() {
        let mut chunk = ChunkData::new(ChunkCoord::new(0, 0));
        chunk.set_column(
            CHUNK_SIZE,
            0,
            SurfaceColumn {
                height: 70,
                block: BlockType::Stone,
                water_depth: 0,
            },
        );
        assert!(chunk.is_empty());
        assert_eq!(chunk.column(-1, 3).block, BlockType::Air);
    }

    #[test]
    fn set_column_is_readable() {
        let mut chunk = ChunkData::new(ChunkCoord::new(2, -3));
        let column = SurfaceColumn {
            height: SEA_LEVEL,
            block: BlockType::Sand,
            water_depth: 0,
        };
        chunk.set_column(15, 15, column);
        assert_eq!(chunk.column(15, 15), column);
        assert!(!chunk.is_empty());
    }
}
