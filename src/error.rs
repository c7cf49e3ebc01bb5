use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Combat log directory '{}' could not be read: {source}", path.display())]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read combat log '{}': {source}", path.display())]
    LogRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to watch combat log directory: {0}")]
    Watch(#[from] notify::Error),

    #[error("Failed to read settings '{}': {source}", path.display())]
    SettingsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings '{}': {source}", path.display())]
    SettingsParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Monitoring is not running")]
    NotRunning,
}

#[derive(Debug, Clone, Error)]
pub enum RecorderError {
    #[error("Capture target not found: {0}")]
    TargetNotFound(String),

    #[error("Recorder setup failed: {0}")]
    Setup(String),

    #[error("Recorder failed to finalize: {0}")]
    Finalize(String),

    #[error("Recorder worker is not running")]
    WorkerGone,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode session record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode session record '{}': {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
