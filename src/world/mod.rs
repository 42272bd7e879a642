//! Host world access
//! Contains the host interface and the simulated world used by the demo host.

pub mod generator;
pub mod host;
pub mod simulated;

// Re-export commonly used types
pub use generator::TerrainGenerator;
pub use host::HostWorld;
pub use simulated::SimulatedWorld;
