mod worker;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;

use crate::error::RecorderError;
use crate::session::ActivityKind;

pub(crate) use worker::{RecorderCommand, RecorderOutcome, RecorderWorker};

/// What the controller asks the capture subsystem to record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingRequest {
    pub kind: ActivityKind,
    pub label: String,
    pub started_at: NaiveDateTime,
    pub difficulty: u32,
}

/// Opaque token returned by [`Recorder::start`] and handed back to [`Recorder::stop`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingHandle {
    output_path: PathBuf,
}

impl RecordingHandle {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordingArtifact {
    pub path: PathBuf,
    pub duration: Option<Duration>,
}

/// Screen capture collaborator. Calls are made from a dedicated worker thread and may block.
pub trait Recorder: Send + Sync {
    fn start(&self, request: &RecordingRequest) -> Result<RecordingHandle, RecorderError>;

    fn stop(&self, handle: RecordingHandle) -> Result<RecordingArtifact, RecorderError>;
}

/// Recorder that captures nothing. It logs each lifecycle call and reports the file it would
/// have written, which makes it useful for tuning detection against live logs.
pub struct DryRunRecorder {
    output_folder: PathBuf,
    started: Mutex<HashMap<PathBuf, Instant>>,
}

impl DryRunRecorder {
    pub fn new(output_folder: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
            started: Mutex::new(HashMap::new()),
        }
    }

    fn planned_output_path(&self, request: &RecordingRequest) -> PathBuf {
        let timestamp = request.started_at.format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{timestamp}.mp4", request.kind.as_str());
        self.output_folder.join(filename)
    }
}

impl Recorder for DryRunRecorder {
    fn start(&self, request: &RecordingRequest) -> Result<RecordingHandle, RecorderError> {
        let output_path = self.planned_output_path(request);
        let mut started = self
            .started
            .lock()
            .map_err(|error| RecorderError::Setup(error.to_string()))?;
        started.insert(output_path.clone(), Instant::now());

        tracing::info!(
            kind = %request.kind,
            label = %request.label,
            output_path = %output_path.display(),
            "Dry-run recording started"
        );

        Ok(RecordingHandle::new(output_path))
    }

    fn stop(&self, handle: RecordingHandle) -> Result<RecordingArtifact, RecorderError> {
        let started_at = self
            .started
            .lock()
            .map_err(|error| RecorderError::Finalize(error.to_string()))?
            .remove(handle.output_path());

        let duration = started_at.map(|instant| instant.elapsed());
        tracing::info!(
            output_path = %handle.output_path().display(),
            duration_seconds = duration.map(|value| value.as_secs_f64()).unwrap_or_default(),
            "Dry-run recording stopped"
        );

        Ok(RecordingArtifact {
            path: handle.output_path,
            duration,
        })
    }
}
