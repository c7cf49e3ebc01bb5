use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use floorpov_autorecord::{
    init_logging, start_monitoring, DryRunRecorder, JsonSessionStore, MonitorCollaborators,
    MonitorSettings,
};

#[tokio::main]
async fn main() {
    init_logging();

    let Some(settings_path) = std::env::args().nth(1).map(PathBuf::from) else {
        tracing::error!("Usage: floorpov-autorecord <settings.json>");
        std::process::exit(1);
    };

    let settings = match MonitorSettings::load_from_file(&settings_path) {
        Ok(settings) => settings,
        Err(error) => {
            tracing::error!("{error}");
            std::process::exit(1);
        }
    };

    let recorder = Arc::new(DryRunRecorder::new(settings.store_directory.join("videos")));
    let store = Arc::new(
        JsonSessionStore::new(&settings.store_directory)
            .with_max_records(settings.max_stored_sessions),
    );
    let collaborators = MonitorCollaborators::new(recorder, store);
    let mut status_rx = collaborators.status.subscribe();

    let handle = match start_monitoring(settings, collaborators) {
        Ok(handle) => handle,
        Err(error) => {
            tracing::error!("Failed to start monitoring: {error}");
            std::process::exit(1);
        }
    };

    let status_printer = tokio::spawn(async move {
        loop {
            match status_rx.recv().await {
                Ok(event) => tracing::info!(target: "floorpov_autorecord::status", "{event}"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Status printer fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {error}");
    }

    tracing::info!("Shutting down");
    if let Err(error) = handle.stop().await {
        tracing::error!("Monitor did not stop cleanly: {error}");
    }
    if let Err(error) = status_printer.await {
        tracing::warn!("Status printer ended abnormally: {error}");
    }
}
