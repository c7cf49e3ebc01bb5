use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::session::ActivityKind;

const STATUS_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StatusEvent {
    MonitoringStarted {
        log_path: Option<PathBuf>,
    },
    LogFileChanged {
        log_path: PathBuf,
    },
    SessionStarted {
        kind: ActivityKind,
        label: String,
    },
    SessionStartFailed {
        kind: ActivityKind,
        label: String,
        reason: String,
    },
    SessionStartIgnored {
        kind: ActivityKind,
        label: String,
        reason: String,
    },
    SessionEnded {
        kind: ActivityKind,
        label: String,
        duration_seconds: f64,
    },
    SessionStopFailed {
        kind: ActivityKind,
        label: String,
        reason: String,
    },
    RecordSaved {
        id: Uuid,
        label: String,
    },
    RecordSaveFailed {
        id: Uuid,
        reason: String,
    },
    WatcherError {
        reason: String,
    },
    MonitoringStopped,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::MonitoringStarted { log_path: Some(path) } => {
                write!(f, "Monitoring combat log '{}'", path.display())
            }
            StatusEvent::MonitoringStarted { log_path: None } => {
                f.write_str("Monitoring started, waiting for a combat log file")
            }
            StatusEvent::LogFileChanged { log_path } => {
                write!(f, "Switched to combat log '{}'", log_path.display())
            }
            StatusEvent::SessionStarted { kind, label } => {
                write!(f, "Recording {kind}: {label}")
            }
            StatusEvent::SessionStartFailed {
                kind,
                label,
                reason,
            } => write!(f, "Could not start recording {kind} '{label}': {reason}"),
            StatusEvent::SessionStartIgnored {
                kind,
                label,
                reason,
            } => write!(f, "Ignored start of {kind} '{label}': {reason}"),
            StatusEvent::SessionEnded {
                kind,
                label,
                duration_seconds,
            } => write!(f, "Finished {kind} '{label}' after {duration_seconds:.1}s"),
            StatusEvent::SessionStopFailed {
                kind,
                label,
                reason,
            } => write!(
                f,
                "Recording of {kind} '{label}' did not stop cleanly: {reason}"
            ),
            StatusEvent::RecordSaved { id, label } => {
                write!(f, "Saved session '{label}' ({id})")
            }
            StatusEvent::RecordSaveFailed { id, reason } => {
                write!(f, "Failed to save session {id}: {reason}")
            }
            StatusEvent::WatcherError { reason } => write!(f, "Combat log watcher: {reason}"),
            StatusEvent::MonitoringStopped => f.write_str("Monitoring stopped"),
        }
    }
}

/// Broadcasts [`StatusEvent`]s to whoever is listening. Having no listener is not an error.
#[derive(Clone)]
pub struct StatusReporter {
    sender: broadcast::Sender<StatusEvent>,
}

impl StatusReporter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: StatusEvent) {
        if let Err(error) = self.sender.send(event) {
            tracing::trace!("No status listeners for event: {}", error.0);
        }
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{StatusEvent, StatusReporter};
    use crate::session::ActivityKind;

    #[test]
    fn serializes_with_kebab_case_tag() {
        let event = StatusEvent::SessionStarted {
            kind: ActivityKind::Arena3v3,
            label: "Hook Point".to_string(),
        };

        let json = serde_json::to_value(&event).expect("Expected status event to serialize");
        assert_eq!(json["event"], "session-started");
        assert_eq!(json["kind"], "arena3v3");
        assert_eq!(json["label"], "Hook Point");
    }

    #[test]
    fn delivers_events_to_subscribers_and_tolerates_none() {
        let reporter = StatusReporter::new();
        reporter.emit(StatusEvent::MonitoringStopped);

        let mut receiver = reporter.subscribe();
        reporter.emit(StatusEvent::WatcherError {
            reason: "Permission denied".to_string(),
        });

        let received = receiver
            .try_recv()
            .expect("Expected subscriber to receive status event");
        assert_eq!(received.to_string(), "Combat log watcher: Permission denied");
    }
}
