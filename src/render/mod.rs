//! Map rendering pipeline
//! Contains job bookkeeping, chunk loading, tile compositing and the tick-driven scheduler.

pub mod compositor;
pub mod generator_info;
pub mod job;
pub mod loader;
pub mod render_info;
pub mod scheduler;
pub mod tiles;
pub mod world_renderer;

// Re-export commonly used types
pub use compositor::{
    CompositeError, CompositeRequest, CompositeResult, CompositorPool, SubmitError, TileCompositor,
};
pub use generator_info::{ChunkGeneratorInfo, ChunkGeneratorType};
pub use job::{JobHandle, JobId, JobKind, JobProgress, JobState, JobStatus, ScheduledJob};
pub use loader::{ChunkFetch, ChunkLoaderInfo, LoadMode, RegionChunksLoader, fetch_chunk};
pub use render_info::{RegionRenderJob, RenderInfo};
pub use scheduler::{Scheduler, TickReport};
pub use tiles::PngTileCompositor;
pub use world_renderer::{WorldRenderer, WorldStatus};
