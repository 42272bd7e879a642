//! Height-field terrain for the simulated host world
//!
//! Produces surface snapshots directly instead of full block volumes, which is
//! all the map pipeline ever reads.

use fastnoise_lite::{FastNoiseLite, FractalType, NoiseType};

use crate::constants::*;
use crate::core::{BlockType, ChunkCoord, ChunkData, SurfaceColumn};

pub struct TerrainGenerator {
    noise_continents: FastNoiseLite,
    noise_terrain: FastNoiseLite,
    noise_temperature: FastNoiseLite,
    noise_trees: FastNoiseLite,
    pub seed: u32,
}

impl TerrainGenerator {
    pub fn new(seed: u32) -> Self {
        TerrainGenerator {
            noise_continents: Self::create_noise(seed, 0.002),
            noise_terrain: Self::create_fbm_noise(seed.wrapping_add(1), 0.008),
            noise_temperature: Self::create_noise(seed.wrapping_add(3), 0.008),
            noise_trees: Self::create_noise(seed.wrapping_add(7), 0.1),
            seed,
        }
    }

    fn create_noise(seed: u32, frequency: f32) -> FastNoiseLite {
        let mut noise = FastNoiseLite::with_seed(seed as i32);
        noise.set_noise_type(Some(NoiseType::OpenSimplex2));
        noise.set_frequency(Some(frequency));
        noise
    }

    fn create_fbm_noise(seed: u32, frequency: f32) -> FastNoiseLite {
        let mut noise = FastNoiseLite::with_seed(seed as i32);
        noise.set_noise_type(Some(NoiseType::OpenSimplex2));
        noise.set_fractal_type(Some(FractalType::FBm));
        noise.set_fractal_octaves(Some(4));
        noise.set_fractal_lacunarity(Some(2.0));
        noise.set_fractal_gain(Some(0.5));
        noise.set_frequency(Some(frequency));
        noise
    }

    fn height_at(&self, wx: f32, wz: f32) -> i32 {
        let continent = self.noise_continents.get_noise_2d(wx, wz);
        let terrain = self.noise_terrain.get_noise_2d(wx, wz);
        let base = SEA_LEVEL as f32 + continent * 24.0;
        let height = base + terrain * 18.0 * (continent + 1.0).max(0.2);
        (height as i32).clamp(1, WORLD_HEIGHT - 1)
    }

    fn surface_block(&self, wx: f32, wz: f32, height: i32) -> BlockType {
        let temperature = self.noise_temperature.get_noise_2d(wx, wz);
        if height < SEA_LEVEL {
            if temperature < -0.6 {
                return BlockType::Ice;
            }
            return if height < SEA_LEVEL - 6 {
                BlockType::Gravel
            } else {
                BlockType::Sand
            };
        }
        if height <= SEA_LEVEL + 1 {
            return BlockType::Sand;
        }
        if height > SEA_LEVEL + 48 || temperature < -0.5 {
            return BlockType::Snow;
        }
        if height > SEA_LEVEL + 32 {
            return BlockType::Stone;
        }
        if temperature > 0.5 {
            return BlockType::Sand;
        }
        if self.noise_trees.get_noise_2d(wx, wz) > 0.7 {
            return BlockType::Leaves;
        }
        BlockType::Grass
    }

    /// Generate the surface snapshot for a chunk
    pub fn generate_chunk(&self, coord: ChunkCoord) -> ChunkData {
        let mut chunk = ChunkData::new(coord);
        let base_x = coord.x * CHUNK_SIZE;
        let base_z = coord.z * CHUNK_SIZE;

        for lz in 0..CHUNK_SIZE {
            for lx in 0..CHUNK_SIZE {
                let wx = (base_x + lx) as f32;
                let wz = (base_z + lz) as f32;
                let height = self.height_at(wx, wz);
                let block = self.surface_block(wx, wz, height);
                let water_depth = if height < SEA_LEVEL && block != BlockType::Ice {
                    (SEA_LEVEL - height).min(u8::MAX as i32) as u8
                } else {
                    0
                };
                chunk.set_column(
                    lx,
                    lz,
                    SurfaceColumn {
                        height,
                        block,
                        water_depth,
                    },
                );
            }
        }

        chunk
    }
}
