//! Watches a game's combat log, decides when an arena, dungeon run, raid encounter or
//! battleground starts and ends, and drives a screen recorder and a session store accordingly.

pub mod combat_log;
pub mod error;
pub mod monitor;
pub mod pipeline;
pub mod recording;
pub mod session;
pub mod settings;
pub mod status;
pub mod store;

use tracing_subscriber::EnvFilter;

pub use error::{MonitorError, RecorderError, StoreError};
pub use monitor::{start_monitoring, AppPresence, MonitorCollaborators, MonitorHandle};
pub use recording::{DryRunRecorder, Recorder, RecordingArtifact, RecordingHandle, RecordingRequest};
pub use session::{ActivityKind, DetectedEvent, SessionRecord};
pub use settings::{ClassificationMode, MonitorSettings};
pub use status::{StatusEvent, StatusReporter};
pub use store::{JsonSessionStore, Store};

const LOG_PATH_ENV: &str = "FLOORPOV_LOG_PATH";

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default `info` level.
pub fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    if let Ok(path) = std::env::var(LOG_PATH_ENV) {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(file)
                    .init();
                return;
            }
            Err(error) => eprintln!("Cannot open log file '{path}', logging to stderr: {error}"),
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
