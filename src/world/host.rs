//! Interface to the game server that owns world state.
//!
//! Every method here touches live world data and must only be called from the
//! host's main thread (the scheduler tick). Implementations must not block on
//! disk in `request_chunk_load`; the load is expected to complete on a later tick.

use crate::core::{ChunkBounds, ChunkCoord, ChunkData};

pub trait HostWorld: Send + Sync {
    /// World name, used as the renderer key and in tile paths
    fn name(&self) -> &str;

    /// False once the host has unloaded the world
    fn is_loaded(&self) -> bool;

    /// Box covering every chunk the world has ever generated
    fn known_bounds(&self) -> Option<ChunkBounds>;

    /// Whether the chunk exists in persistent storage at all
    fn chunk_exists(&self, coord: ChunkCoord) -> bool;

    fn is_chunk_resident(&self, coord: ChunkCoord) -> bool;

    /// Fire-and-forget load from storage
    fn request_chunk_load(&self, coord: ChunkCoord);

    /// Load synchronously. Returns false when the chunk could not be loaded.
    fn load_chunk_now(&self, coord: ChunkCoord) -> bool;

    /// Copy of a resident chunk's surface data
    fn snapshot_chunk(&self, coord: ChunkCoord) -> Option<ChunkData>;

    /// Chunks modified since the previous call
    fn take_changed_chunks(&self) -> Vec<ChunkCoord>;

    /// Hand taken edits back so a later `take_changed_chunks` reports them again
    fn mark_changed(&self, coords: &[ChunkCoord]);
}
