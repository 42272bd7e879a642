// Core module with coordinates, chunk snapshots and errors
pub mod core;

// Render module with jobs, loaders, compositing and the scheduler
pub mod render;

// World module with the host interface and the simulated host
pub mod world;

// Settings persistence
pub mod utils;

// Operator command surface
pub mod commands;

pub mod constants;

// Re-exports
pub use constants::*;
pub use core::{BlockType, ChunkBounds, ChunkCoord, ChunkData, Region, RenderError, SurfaceColumn};
pub use render::{
    ChunkGeneratorType, JobHandle, JobId, JobState, JobStatus, LoadMode, PngTileCompositor,
    Scheduler, TileCompositor, WorldStatus,
};
pub use utils::{RenderSettings, load_or_default, load_settings, save_settings};
pub use world::{HostWorld, SimulatedWorld};
