//! Session lifecycle state machine.
//!
//! The controller never talks to the recorder directly. Every accepted transition is returned
//! as a [`ControllerAction`] which the monitor hands to the recorder worker, so line
//! processing never waits on capture setup. While a start is outstanding the controller
//! refuses further starts, and an end that arrives in that window is held until the start
//! resolves.

use chrono::NaiveDateTime;

use crate::error::RecorderError;
use crate::recording::{RecordingHandle, RecordingRequest};
use crate::status::{StatusEvent, StatusReporter};

use super::{ActivityKind, DetectedEvent, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Active,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerAction {
    StartRecording(RecordingRequest),
    FinishSession(FinishedSession),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinishedSession {
    pub kind: ActivityKind,
    pub label: String,
    pub started_at: NaiveDateTime,
    pub ended_at: NaiveDateTime,
    pub difficulty: u32,
    pub recorder_handle: RecordingHandle,
    pub outcome: Option<String>,
    pub participants: Vec<String>,
}

#[derive(Debug, Clone)]
struct PendingEnd {
    observed_at: NaiveDateTime,
    outcome: Option<String>,
    participants: Vec<String>,
}

#[derive(Debug)]
struct PendingStart {
    request: RecordingRequest,
    end_requested: Option<PendingEnd>,
}

pub struct SessionController {
    session: Option<Session>,
    pending_start: Option<PendingStart>,
    status: StatusReporter,
}

impl SessionController {
    pub fn new(status: StatusReporter) -> Self {
        Self {
            session: None,
            pending_start: None,
            status,
        }
    }

    pub fn state(&self) -> ControllerState {
        if self.session.is_some() {
            ControllerState::Active
        } else {
            ControllerState::Idle
        }
    }

    pub fn current_session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn has_pending_start(&self) -> bool {
        self.pending_start.is_some()
    }

    /// True while a session is active or one is being established.
    pub fn is_engaged(&self) -> bool {
        self.session.is_some() || self.pending_start.is_some()
    }

    /// Kind of the active session, or of the one being established.
    pub fn engaged_kind(&self) -> Option<ActivityKind> {
        self.session
            .as_ref()
            .map(|session| session.kind)
            .or_else(|| {
                self.pending_start
                    .as_ref()
                    .map(|pending_start| pending_start.request.kind)
            })
    }

    pub fn handle_event(&mut self, event: DetectedEvent) -> Option<ControllerAction> {
        match event {
            DetectedEvent::Start {
                kind,
                label,
                observed_at,
                difficulty,
                origin,
            } => {
                if let Some(reason) = self.start_rejection_reason() {
                    tracing::debug!(
                        kind = %kind,
                        label = %label,
                        ?origin,
                        reason,
                        "Ignoring redundant session start"
                    );
                    self.status.emit(StatusEvent::SessionStartIgnored {
                        kind,
                        label,
                        reason: reason.to_string(),
                    });
                    return None;
                }

                let request = RecordingRequest {
                    kind,
                    label,
                    started_at: observed_at,
                    difficulty,
                };
                tracing::info!(
                    kind = %request.kind,
                    label = %request.label,
                    ?origin,
                    "Requesting session recording start"
                );
                self.pending_start = Some(PendingStart {
                    request: request.clone(),
                    end_requested: None,
                });
                Some(ControllerAction::StartRecording(request))
            }
            DetectedEvent::End {
                observed_at,
                outcome,
                participants,
            } => {
                let end = PendingEnd {
                    observed_at,
                    outcome,
                    participants,
                };

                if let Some(session) = self.session.take() {
                    return Some(self.finish(session, end));
                }

                if let Some(pending_start) = self.pending_start.as_mut() {
                    tracing::info!(
                        label = %pending_start.request.label,
                        "Session ended before its recording started; stopping once it does"
                    );
                    pending_start.end_requested = Some(end);
                    return None;
                }

                tracing::debug!("Session end received while idle, nothing to stop");
                None
            }
        }
    }

    /// Resolves the outstanding start. Returns a finish action when an end was already seen.
    pub fn recording_started(
        &mut self,
        result: Result<RecordingHandle, RecorderError>,
    ) -> Option<ControllerAction> {
        let Some(pending_start) = self.pending_start.take() else {
            tracing::warn!("Recorder start resolved without an outstanding request");
            return None;
        };
        let PendingStart {
            request,
            end_requested,
        } = pending_start;

        match result {
            Ok(recorder_handle) => {
                tracing::info!(
                    kind = %request.kind,
                    label = %request.label,
                    output_path = %recorder_handle.output_path().display(),
                    "Session recording started"
                );
                self.status.emit(StatusEvent::SessionStarted {
                    kind: request.kind,
                    label: request.label.clone(),
                });

                let session = Session {
                    kind: request.kind,
                    label: request.label,
                    started_at: request.started_at,
                    difficulty: request.difficulty,
                    recorder_handle,
                };

                match end_requested {
                    Some(end) => Some(self.finish(session, end)),
                    None => {
                        self.session = Some(session);
                        None
                    }
                }
            }
            Err(error) => {
                tracing::error!(
                    kind = %request.kind,
                    label = %request.label,
                    "Failed to start session recording: {error}"
                );
                self.status.emit(StatusEvent::SessionStartFailed {
                    kind: request.kind,
                    label: request.label,
                    reason: error.to_string(),
                });
                None
            }
        }
    }

    /// Forces the active session to end. An outstanding start is ended once it resolves.
    pub fn shutdown(
        &mut self,
        observed_at: NaiveDateTime,
        outcome: &str,
        participants: Vec<String>,
    ) -> Option<ControllerAction> {
        self.handle_event(DetectedEvent::End {
            observed_at,
            outcome: Some(outcome.to_string()),
            participants,
        })
    }

    fn start_rejection_reason(&self) -> Option<&'static str> {
        if self.session.is_some() {
            return Some("a session is already active");
        }
        if self.pending_start.is_some() {
            return Some("a session start is already in progress");
        }
        None
    }

    fn finish(&mut self, session: Session, end: PendingEnd) -> ControllerAction {
        tracing::info!(
            kind = %session.kind,
            label = %session.label,
            outcome = end.outcome.as_deref().unwrap_or("unknown"),
            "Session ended"
        );

        ControllerAction::FinishSession(FinishedSession {
            kind: session.kind,
            label: session.label,
            started_at: session.started_at,
            ended_at: end.observed_at,
            difficulty: session.difficulty,
            recorder_handle: session.recorder_handle,
            outcome: end.outcome,
            participants: end.participants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ControllerAction, ControllerState, SessionController};
    use crate::error::RecorderError;
    use crate::recording::RecordingHandle;
    use crate::session::{ActivityKind, DetectedEvent, DetectionOrigin};
    use crate::status::{StatusEvent, StatusReporter};
    use chrono::{NaiveDate, NaiveDateTime};

    fn at_second(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 14)
            .and_then(|date| date.and_hms_opt(11, 30, second))
            .expect("valid test timestamp")
    }

    fn start_event(label: &str) -> DetectedEvent {
        DetectedEvent::Start {
            kind: ActivityKind::Arena2v2,
            label: label.to_string(),
            observed_at: at_second(0),
            difficulty: 0,
            origin: DetectionOrigin::Explicit,
        }
    }

    fn end_event(second: u32) -> DetectedEvent {
        DetectedEvent::End {
            observed_at: at_second(second),
            outcome: Some("Win".to_string()),
            participants: vec!["Aria".to_string()],
        }
    }

    fn handle() -> RecordingHandle {
        RecordingHandle::new("/videos/2v2.mp4")
    }

    fn activate(controller: &mut SessionController) {
        let action = controller.handle_event(start_event("Nagrand Arena"));
        assert!(matches!(action, Some(ControllerAction::StartRecording(_))));
        assert!(controller.recording_started(Ok(handle())).is_none());
        assert_eq!(controller.state(), ControllerState::Active);
    }

    #[test]
    fn repeated_starts_request_exactly_one_recording() {
        let mut controller = SessionController::new(StatusReporter::new());

        let mut start_requests = 0;
        for _ in 0..5 {
            if let Some(ControllerAction::StartRecording(_)) =
                controller.handle_event(start_event("Nagrand Arena"))
            {
                start_requests += 1;
            }
        }
        assert_eq!(start_requests, 1, "Starts during an outstanding start are dropped");

        controller.recording_started(Ok(handle()));
        for _ in 0..3 {
            assert!(controller.handle_event(start_event("Nagrand Arena")).is_none());
        }
        assert_eq!(controller.state(), ControllerState::Active);
    }

    #[test]
    fn end_while_active_finishes_the_session() {
        let mut controller = SessionController::new(StatusReporter::new());
        activate(&mut controller);

        let action = controller.handle_event(end_event(45));
        let Some(ControllerAction::FinishSession(finished)) = action else {
            panic!("Expected a finish action, got {action:?}");
        };
        assert_eq!(finished.label, "Nagrand Arena");
        assert_eq!(finished.started_at, at_second(0));
        assert_eq!(finished.ended_at, at_second(45));
        assert_eq!(finished.outcome.as_deref(), Some("Win"));
        assert_eq!(controller.state(), ControllerState::Idle);
        assert!(!controller.is_engaged());
    }

    #[test]
    fn end_while_idle_is_ignored() {
        let mut controller = SessionController::new(StatusReporter::new());
        assert!(controller.handle_event(end_event(1)).is_none());
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[test]
    fn failed_start_leaves_controller_idle_and_reports_reason() {
        let status = StatusReporter::new();
        let mut receiver = status.subscribe();
        let mut controller = SessionController::new(status);

        controller.handle_event(start_event("Hook Point"));
        let action = controller.recording_started(Err(RecorderError::TargetNotFound(
            "World of Warcraft".to_string(),
        )));

        assert!(action.is_none());
        assert_eq!(controller.state(), ControllerState::Idle);
        assert!(!controller.is_engaged());

        let reported = receiver.try_recv().expect("Expected a status event");
        assert!(matches!(reported, StatusEvent::SessionStartFailed { .. }));

        let retry = controller.handle_event(start_event("Hook Point"));
        assert!(matches!(retry, Some(ControllerAction::StartRecording(_))));
    }

    #[test]
    fn end_during_outstanding_start_finishes_once_start_resolves() {
        let mut controller = SessionController::new(StatusReporter::new());
        controller.handle_event(start_event("Mugambala"));

        assert!(controller.handle_event(end_event(30)).is_none());
        assert!(controller.is_engaged());

        let action = controller.recording_started(Ok(handle()));
        let Some(ControllerAction::FinishSession(finished)) = action else {
            panic!("Expected the held end to finish the session, got {action:?}");
        };
        assert_eq!(finished.ended_at, at_second(30));
        assert_eq!(controller.state(), ControllerState::Idle);
    }

    #[test]
    fn shutdown_forces_end_of_active_session() {
        let mut controller = SessionController::new(StatusReporter::new());
        activate(&mut controller);

        let action = controller.shutdown(at_second(50), "Monitoring stopped", Vec::new());
        let Some(ControllerAction::FinishSession(finished)) = action else {
            panic!("Expected shutdown to finish the session, got {action:?}");
        };
        assert_eq!(finished.outcome.as_deref(), Some("Monitoring stopped"));
        assert!(controller
            .shutdown(at_second(51), "Monitoring stopped", Vec::new())
            .is_none());
    }

    #[test]
    fn state_never_exceeds_one_session_under_interleavings() {
        let mut controller = SessionController::new(StatusReporter::new());
        let mut live_sessions: i32 = 0;

        for step in 0..40u32 {
            let action = if step % 3 == 0 {
                controller.handle_event(end_event(step % 60))
            } else {
                controller.handle_event(start_event("Ring of Valor"))
            };

            match action {
                Some(ControllerAction::StartRecording(_)) => {
                    if controller.recording_started(Ok(handle())).is_none() {
                        live_sessions += 1;
                    }
                }
                Some(ControllerAction::FinishSession(_)) => live_sessions -= 1,
                None => {}
            }

            assert!((0..=1).contains(&live_sessions));
            let expected = if live_sessions == 1 {
                ControllerState::Active
            } else {
                ControllerState::Idle
            };
            assert_eq!(controller.state(), expected);
        }
    }
}
