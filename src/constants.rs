// World constants
pub const CHUNK_SIZE: i32 = 16;
pub const CHUNK_AREA: usize = (CHUNK_SIZE * CHUNK_SIZE) as usize;
pub const WORLD_HEIGHT: i32 = 256;
pub const SEA_LEVEL: i32 = 64;

// Chunks per region edge (region files cover 32x32 chunks)
pub const REGION_SIZE: i32 = 32;

// Tile constants
pub const TILE_PIXELS_PER_BLOCK: u32 = 1;
pub const TILE_SIZE: u32 = CHUNK_SIZE as u32 * TILE_PIXELS_PER_BLOCK;
pub const TILE_EXTENSION: &str = "png";

// Scheduler defaults
pub const MAX_CHUNKS_PER_TICK: usize = 64;
pub const MAX_TICK_TIME_MS: u64 = 10;
pub const MAX_CHUNK_RETRIES: u32 = 5;
pub const RETRY_DELAY_TICKS: u64 = 2;
pub const STALL_TICKS: u64 = 200;
pub const JOB_HISTORY_LEN: usize = 16;
pub const COMPOSITE_QUEUE_CAPACITY: usize = 256;
pub const ASYNC_WORKER_COUNT: usize = 4;

// Host defaults
pub const HOST_TICK_MS: u64 = 50;
