use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;

use super::{Recorder, RecordingArtifact, RecordingHandle, RecordingRequest};
use crate::error::RecorderError;
use crate::session::{FinishedSession, SessionRecord};
use crate::status::{StatusEvent, StatusReporter};
use crate::store::Store;

const UNKNOWN_OUTCOME: &str = "Unknown";

pub(crate) enum RecorderCommand {
    Start(RecordingRequest),
    Finish(FinishedSession),
}

pub(crate) type RecorderOutcome = Result<RecordingHandle, RecorderError>;

/// Runs recorder and store calls on one thread, in the order the controller issued them.
pub(crate) struct RecorderWorker {
    command_tx: mpsc::UnboundedSender<RecorderCommand>,
    thread: thread::JoinHandle<()>,
}

impl RecorderWorker {
    pub(crate) fn spawn(
        recorder: Arc<dyn Recorder>,
        store: Arc<dyn Store>,
        status: StatusReporter,
        outcome_tx: mpsc::UnboundedSender<RecorderOutcome>,
    ) -> Self {
        let (command_tx, mut command_rx) = mpsc::unbounded_channel::<RecorderCommand>();

        let thread = thread::spawn(move || {
            while let Some(command) = command_rx.blocking_recv() {
                match command {
                    RecorderCommand::Start(request) => {
                        let result = recorder.start(&request);
                        if outcome_tx.send(result).is_err() {
                            tracing::debug!("Recorder outcome receiver dropped");
                        }
                    }
                    RecorderCommand::Finish(finished) => {
                        finish_session(recorder.as_ref(), store.as_ref(), &status, finished);
                    }
                }
            }
            tracing::debug!("Recorder worker drained");
        });

        Self { command_tx, thread }
    }

    pub(crate) fn submit(&self, command: RecorderCommand) -> Result<(), RecorderError> {
        self.command_tx
            .send(command)
            .map_err(|_| RecorderError::WorkerGone)
    }

    /// Waits until every submitted command has run.
    pub(crate) async fn shutdown(self) {
        let Self { command_tx, thread } = self;
        drop(command_tx);

        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::error!("Recorder worker panicked"),
            Err(error) => tracing::error!("Failed to join recorder worker: {error}"),
        }
    }
}

fn finish_session(
    recorder: &dyn Recorder,
    store: &dyn Store,
    status: &StatusReporter,
    finished: FinishedSession,
) {
    let artifact = match recorder.stop(finished.recorder_handle.clone()) {
        Ok(artifact) => Some(artifact),
        Err(error) => {
            tracing::error!(
                kind = %finished.kind,
                label = %finished.label,
                "Failed to stop session recording: {error}"
            );
            status.emit(StatusEvent::SessionStopFailed {
                kind: finished.kind,
                label: finished.label.clone(),
                reason: error.to_string(),
            });
            None
        }
    };

    let record = build_session_record(finished, artifact);
    status.emit(StatusEvent::SessionEnded {
        kind: record.kind,
        label: record.label.clone(),
        duration_seconds: record.duration_seconds,
    });

    let id = record.id;
    let label = record.label.clone();
    match store.save(record) {
        Ok(()) => {
            tracing::info!(%id, label = %label, "Session record saved");
            status.emit(StatusEvent::RecordSaved { id, label });
        }
        Err(error) => {
            tracing::error!(%id, label = %label, "Failed to save session record: {error}");
            status.emit(StatusEvent::RecordSaveFailed {
                id,
                reason: error.to_string(),
            });
        }
    }
}

/// Builds the persisted record. Without an artifact the duration falls back to log time.
pub(crate) fn build_session_record(
    finished: FinishedSession,
    artifact: Option<RecordingArtifact>,
) -> SessionRecord {
    let log_duration = finished
        .ended_at
        .signed_duration_since(finished.started_at)
        .to_std()
        .unwrap_or_default();

    let (artifact_path, duration) = match artifact {
        Some(artifact) => (
            Some(artifact.path),
            artifact.duration.unwrap_or(log_duration),
        ),
        None => (None, log_duration),
    };

    SessionRecord {
        id: uuid::Uuid::new_v4(),
        kind: finished.kind,
        label: finished.label,
        started_at: finished.started_at,
        duration_seconds: duration.as_secs_f64(),
        artifact_path,
        outcome: finished
            .outcome
            .unwrap_or_else(|| UNKNOWN_OUTCOME.to_string()),
        difficulty: finished.difficulty,
        participants: finished.participants,
    }
}

#[cfg(test)]
mod tests {
    use super::build_session_record;
    use crate::recording::{RecordingArtifact, RecordingHandle};
    use crate::session::{ActivityKind, FinishedSession};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::path::PathBuf;
    use std::time::Duration;

    fn at_second(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 14)
            .and_then(|date| date.and_hms_opt(11, 30, second))
            .expect("valid test timestamp")
    }

    fn finished(outcome: Option<&str>) -> FinishedSession {
        FinishedSession {
            kind: ActivityKind::Raid,
            label: "Queen Ansurek".to_string(),
            started_at: at_second(0),
            ended_at: at_second(40),
            difficulty: 16,
            recorder_handle: RecordingHandle::new("/videos/raid.mp4"),
            outcome: outcome.map(str::to_string),
            participants: vec!["Aria".to_string(), "Borin".to_string()],
        }
    }

    #[test]
    fn prefers_recorder_duration_over_log_time() {
        let record = build_session_record(
            finished(Some("Kill")),
            Some(RecordingArtifact {
                path: PathBuf::from("/videos/raid.mp4"),
                duration: Some(Duration::from_secs(42)),
            }),
        );

        assert_eq!(record.duration_seconds, 42.0);
        assert_eq!(record.artifact_path, Some(PathBuf::from("/videos/raid.mp4")));
        assert_eq!(record.outcome, "Kill");
        assert_eq!(record.difficulty, 16);
        assert_eq!(record.participants, vec!["Aria", "Borin"]);
    }

    #[test]
    fn failed_stop_still_produces_record_without_artifact() {
        let record = build_session_record(finished(None), None);

        assert_eq!(record.artifact_path, None);
        assert_eq!(record.duration_seconds, 40.0);
        assert_eq!(record.outcome, "Unknown");
    }
}
