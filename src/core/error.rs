//! Error types for the render pipeline.

use thiserror::Error;

use crate::core::coords::ChunkCoord;

/// Errors surfaced by render jobs and the operations that manage them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// Target world was unloaded or never loaded. Fatal to the job.
    #[error("world '{0}' is not available")]
    WorldUnavailable(String),

    /// Chunk is not resident yet; the scheduler retries it on a later tick.
    #[error("chunk {coord} is not ready after {attempts} attempts")]
    ChunkNotReady { coord: ChunkCoord, attempts: u32 },

    /// A job of the same kind is already active for this world.
    #[error("a {kind} job is already running for world '{world}' (job #{job})")]
    AlreadyRunning {
        world: String,
        kind: &'static str,
        job: u64,
    },

    /// The compositing worker failed for one coordinate.
    #[error("compositing chunk {coord} failed: {reason}")]
    CompositingFailure { coord: ChunkCoord, reason: String },

    #[error("no job with id #{0}")]
    UnknownJob(u64),

    #[error("no renderer for world '{0}'")]
    UnknownWorld(String),
}

pub type Result<T> = std::result::Result<T, RenderError>;
