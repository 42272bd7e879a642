use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use thiserror::Error;

use crate::constants::*;
use crate::render::LoadMode;

const MAGIC_HEADER: &[u8; 4] = b"WMRS";
const VERSION: u32 = 1;

pub const SETTINGS_FILE: &str = "render_settings.bin";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot access settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings file is not a render settings file")]
    BadMagic,

    #[error("unsupported settings version: {0}")]
    UnsupportedVersion(u32),

    #[error("cannot decode settings: {0}")]
    Decode(#[from] bincode::Error),
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderSettings {
    /// Upper bound on chunks fetched per host tick, across all jobs
    pub max_chunks_per_tick: usize,
    /// Main-thread time ceiling per tick
    pub max_tick_time_ms: u64,
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub max_chunk_retries: u32,
    pub retry_delay_ticks: u64,
    /// Ticks without progress before a job is reported stalled (0 disables)
    pub stall_ticks: u64,
    /// Finished jobs kept per world for status output
    pub history_len: usize,
    pub load_mode: LoadMode,
    pub output_root: PathBuf,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            max_chunks_per_tick: MAX_CHUNKS_PER_TICK,
            max_tick_time_ms: MAX_TICK_TIME_MS,
            worker_count: num_cpus::get().saturating_sub(1).clamp(1, ASYNC_WORKER_COUNT),
            queue_capacity: COMPOSITE_QUEUE_CAPACITY,
            max_chunk_retries: MAX_CHUNK_RETRIES,
            retry_delay_ticks: RETRY_DELAY_TICKS,
            stall_ticks: STALL_TICKS,
            history_len: JOB_HISTORY_LEN,
            load_mode: LoadMode::Lazy,
            output_root: PathBuf::from("tiles"),
        }
    }
}

impl RenderSettings {
    pub fn tick_budget(&self) -> Duration {
        Duration::from_millis(self.max_tick_time_ms)
    }
}

/// Per-user config location, if the platform has one
pub fn default_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "worldmap").map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
}

pub fn save_settings(path: &Path, settings: &RenderSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(MAGIC_HEADER)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    bincode::serialize_into(&mut writer, settings)?;
    writer.flush()?;
    Ok(())
}

pub fn load_settings(path: &Path) -> Result<RenderSettings, SettingsError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC_HEADER {
        return Err(SettingsError::BadMagic);
    }

    let mut version_bytes = [0u8; 4];
    reader.read_exact(&mut version_bytes)?;
    let version = u32::from_le_bytes(version_bytes);
    if version != VERSION {
        return Err(SettingsError::UnsupportedVersion(version));
    }

    Ok(bincode::deserialize_from(&mut reader)?)
}

/// Load settings, falling back to defaults when the file is missing or broken
pub fn load_or_default(path: &Path) -> RenderSettings {
    match load_settings(path) {
        Ok(settings) => settings,
        Err(SettingsError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No render settings at {}, using defaults", path.display());
            RenderSettings::default()
        }
        Err(e) => {
            tracing::warn!("Ignoring render settings at {}: {}", path.display(), e);
            RenderSettings::default()
        }
    }
}
