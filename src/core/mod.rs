//! Core data structures for the map renderer
//! Contains coordinates, regions, chunk snapshots and the error taxonomy.

pub mod block;
pub mod chunk;
pub mod coords;
pub mod error;

// Re-export commonly used types
pub use block::BlockType;
pub use chunk::{ChunkData, SurfaceColumn};
pub use coords::{ChunkBounds, ChunkCoord, Region};
pub use error::{RenderError, Result};
