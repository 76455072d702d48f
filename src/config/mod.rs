//! Configuration module
//!
//! Handles application settings and platform directories

mod settings;

pub use settings::{
    AppConfig, ConfigError, DevicesConfig, LoggingConfig, NotifierBackend, NotifyConfig,
    PollConfig, SinkBackend, SinkConfig,
};

use directories::ProjectDirs;
use std::path::PathBuf;

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "riglog", "RigLog")
}

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the application data directory
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Default location of the local record store
pub fn default_store_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("records.jsonl"))
}

/// Default location of the CSV export
pub fn default_export_path() -> Option<PathBuf> {
    data_dir().map(|d| d.join("logs.csv"))
}

/// Initialize application directories
pub fn init_directories() -> std::io::Result<()> {
    if let Some(dir) = config_dir() {
        std::fs::create_dir_all(&dir)?;
    }
    if let Some(dir) = data_dir() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}
