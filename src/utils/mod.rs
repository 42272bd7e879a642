pub mod settings;

pub use settings::{RenderSettings, SettingsError, load_or_default, load_settings, save_settings};
