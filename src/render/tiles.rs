use std::fs;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};

use crate::constants::*;
use crate::core::{BlockType, ChunkCoord, ChunkData, SurfaceColumn};
use crate::render::compositor::{CompositeError, CompositeRequest, TileCompositor};

/// Writes one PNG per chunk into the target region's tile directory
pub struct PngTileCompositor;

impl PngTileCompositor {
    pub fn tile_path(output: &Path, coord: ChunkCoord) -> PathBuf {
        output.join(format!("{}.{}.{}", coord.x, coord.z, TILE_EXTENSION))
    }

    /// Top-down colour for one column, lit from the north-west
    fn shade(column: SurfaceColumn, north: Option<SurfaceColumn>) -> Rgba<u8> {
        if column.block.is_void() {
            return Rgba([0, 0, 0, 0]);
        }

        let base = column.block.map_color();
        let mut rgb = [base[0] as f32, base[1] as f32, base[2] as f32];

        if column.water_depth > 0 {
            let water = BlockType::Water.map_color();
            let t = (column.water_depth as f32 / 12.0).clamp(0.35, 0.9);
            for (c, w) in rgb.iter_mut().zip(water) {
                *c = *c * (1.0 - t) + w as f32 * t;
            }
        } else if let Some(north) = north {
            let slope = (column.height - north.height).clamp(-3, 3) as f32;
            let light = 1.0 + slope * 0.06;
            for c in rgb.iter_mut() {
                *c *= light;
            }
        }

        let relative = (column.height - SEA_LEVEL) as f32 / WORLD_HEIGHT as f32;
        let altitude = relative.clamp(-0.25, 0.25);
        let factor = 1.0 + altitude * 0.4;
        Rgba([
            (rgb[0] * factor).clamp(0.0, 255.0) as u8,
            (rgb[1] * factor).clamp(0.0, 255.0) as u8,
            (rgb[2] * factor).clamp(0.0, 255.0) as u8,
            255,
        ])
    }

    pub fn render_tile(chunk: &ChunkData) -> RgbaImage {
        let mut img = RgbaImage::new(TILE_SIZE, TILE_SIZE);
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let column = chunk.column(x, z);
                let north = (z > 0).then(|| chunk.column(x, z - 1));
                let pixel = Self::shade(column, north);
                for py in 0..TILE_PIXELS_PER_BLOCK {
                    for px in 0..TILE_PIXELS_PER_BLOCK {
                        img.put_pixel(
                            x as u32 * TILE_PIXELS_PER_BLOCK + px,
                            z as u32 * TILE_PIXELS_PER_BLOCK + py,
                            pixel,
                        );
                    }
                }
            }
        }
        img
    }
}

impl TileCompositor for PngTileCompositor {
    fn composite(&self, request: &CompositeRequest) -> Result<(), CompositeError> {
        fs::create_dir_all(&request.output)?;
        let path = Self::tile_path(&request.output, request.coord);
        let img = Self::render_tile(&request.chunk);
        img.save(&path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Region;
    use crate::render::job::JobId;
    use crate::world::TerrainGenerator;

    #[test]
    fn empty_chunk_renders_transparent() {
        let img = PngTileCompositor::render_tile(&ChunkData::new(ChunkCoord::new(0, 0)));
        assert_eq!(img.dimensions(), (TILE_SIZE, TILE_SIZE));
        assert!(img.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn generated_chunk_renders_opaque() {
        let chunk = TerrainGenerator::new(5).generate_chunk(ChunkCoord::new(1, 1));
        let img = PngTileCompositor::render_tile(&chunk);
        assert!(img.pixels().all(|p| p.0[3] == 255));
    }

    #[test]
    fn composite_writes_png_into_output_dir() {
        let dir = std::env::temp_dir().join(format!("worldmap-tiles-{}", std::process::id()));
        let coord = ChunkCoord::new(-3, 4);
        let request = CompositeRequest {
            job: JobId(1),
            region: Region::containing("overworld", coord),
            output: dir.join("r.-1.0"),
            coord,
            chunk: TerrainGenerator::new(5).generate_chunk(coord),
        };

        PngTileCompositor.composite(&request).unwrap();
        let path = PngTileCompositor::tile_path(&request.output, coord);
        assert!(path.ends_with("r.-1.0/-3.4.png"));
        let written = image::open(&path).unwrap();
        assert_eq!(written.width(), TILE_SIZE);

        let _ = fs::remove_dir_all(&dir);
    }
}
