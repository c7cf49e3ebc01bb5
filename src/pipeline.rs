//! The serialized detection path: parse, classify, drive the session controller.
//!
//! Everything here is synchronous and owned by the monitor loop, so the accumulator, the
//! classifier context and the controller are never touched concurrently.

use std::path::Path;

use chrono::NaiveDateTime;

use crate::combat_log::{parse_line, EventClassifier, HeuristicAccumulator, LogLine};
use crate::error::RecorderError;
use crate::recording::RecordingHandle;
use crate::session::{
    ActivityKind, ControllerAction, DetectedEvent, DetectionOrigin, SessionController,
};
use crate::settings::{ClassificationMode, MonitorSettings};
use crate::status::StatusReporter;

const OUTCOME_CLIP_STOPPED: &str = "Clip stopped";

pub struct DetectionPipeline {
    classifier: EventClassifier,
    accumulator: HeuristicAccumulator,
    controller: SessionController,
    mode: ClassificationMode,
}

impl DetectionPipeline {
    pub fn new(
        classifier: EventClassifier,
        mode: ClassificationMode,
        status: StatusReporter,
    ) -> Self {
        Self {
            classifier,
            accumulator: HeuristicAccumulator::default(),
            controller: SessionController::new(status),
            mode,
        }
    }

    pub fn from_settings(settings: &MonitorSettings, status: StatusReporter) -> Self {
        Self::new(
            settings.build_classifier(),
            settings.classification_mode,
            status,
        )
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }

    pub fn accumulator(&self) -> &HeuristicAccumulator {
        &self.accumulator
    }

    pub fn process_lines(&mut self, raw_lines: &[String]) -> Vec<ControllerAction> {
        if raw_lines.is_empty() {
            return Vec::new();
        }

        let parsed_lines = raw_lines
            .iter()
            .map(|raw_line| parse_line(raw_line))
            .collect::<Vec<LogLine>>();

        match self.mode {
            ClassificationMode::PerLine => parsed_lines
                .iter()
                .filter_map(|line| {
                    let session_active = self.controller.is_engaged();
                    let event =
                        self.classifier
                            .classify_line(line, &mut self.accumulator, session_active)?;
                    self.dispatch(event)
                })
                .collect(),
            ClassificationMode::Batch => {
                let session_active = self.controller.is_engaged();
                self.classifier
                    .classify_batch(&parsed_lines, &mut self.accumulator, session_active)
                    .and_then(|event| self.dispatch(event))
                    .into_iter()
                    .collect()
            }
        }
    }

    /// A new log file took over. Heuristic counters restart but the live session is kept.
    pub fn handle_rotation(&mut self, new_log_path: &Path) {
        tracing::info!(
            log_path = %new_log_path.display(),
            session_active = self.controller.is_engaged(),
            "Resetting heuristics after log rotation"
        );
        self.accumulator.reset();
    }

    pub fn recording_started(
        &mut self,
        outcome: Result<RecordingHandle, RecorderError>,
    ) -> Option<ControllerAction> {
        self.controller.recording_started(outcome)
    }

    pub fn start_clip(
        &mut self,
        label: String,
        observed_at: NaiveDateTime,
    ) -> Option<ControllerAction> {
        self.controller.handle_event(DetectedEvent::Start {
            kind: ActivityKind::Clip,
            label,
            observed_at,
            difficulty: 0,
            origin: DetectionOrigin::Manual,
        })
    }

    pub fn stop_clip(&mut self, observed_at: NaiveDateTime) -> Option<ControllerAction> {
        if self.controller.engaged_kind() != Some(ActivityKind::Clip) {
            tracing::debug!("Clip stop requested while no clip is recording");
            return None;
        }

        self.controller.handle_event(DetectedEvent::End {
            observed_at,
            outcome: Some(OUTCOME_CLIP_STOPPED.to_string()),
            participants: Vec::new(),
        })
    }

    /// Ends whatever is live regardless of the log, e.g. when the game exits.
    pub fn force_end(
        &mut self,
        observed_at: NaiveDateTime,
        outcome: &str,
    ) -> Option<ControllerAction> {
        let participants = self.accumulator.participant_list();
        self.classifier.reset_session(&mut self.accumulator);
        self.controller.shutdown(observed_at, outcome, participants)
    }

    fn dispatch(&mut self, event: DetectedEvent) -> Option<ControllerAction> {
        if event.is_end() && self.controller.engaged_kind() == Some(ActivityKind::Clip) {
            tracing::debug!("Combat log end marker ignored while a manual clip is recording");
            return None;
        }

        self.controller.handle_event(event)
    }
}

#[cfg(test)]
mod tests {
    use super::DetectionPipeline;
    use crate::combat_log::{BatchThresholds, EventClassifier, HeuristicThresholds};
    use crate::recording::RecordingHandle;
    use crate::session::{ActivityKind, ControllerAction, ControllerState};
    use crate::settings::ClassificationMode;
    use crate::status::StatusReporter;
    use chrono::NaiveDate;

    fn build_line(time: &str, event_type: &str, fields: &[&str]) -> String {
        let mut line = format!("5/14/2025 {time}  {event_type}");
        if !fields.is_empty() {
            line.push(',');
            line.push_str(&fields.join(","));
        }
        line
    }

    fn combat_lines(count: usize, players: usize) -> Vec<String> {
        (0..count)
            .map(|index| {
                let player_index = index % players;
                build_line(
                    &format!("11:31:{:02}.000", index % 60),
                    "SPELL_DAMAGE",
                    &[
                        &format!("Player-1-{player_index:08}"),
                        &format!("\"Fighter{player_index}-Realm\""),
                        "0x548",
                        "0x0",
                        "Creature-0-1",
                        "\"Target\"",
                        "0xa48",
                        "0x0",
                        "133",
                        "\"Fireball\"",
                        "0x4",
                    ],
                )
            })
            .collect()
    }

    fn pipeline(mode: ClassificationMode) -> DetectionPipeline {
        DetectionPipeline::new(
            EventClassifier::new(HeuristicThresholds::default(), BatchThresholds::default(), 60),
            mode,
            StatusReporter::new(),
        )
    }

    fn activate_arena(pipeline: &mut DetectionPipeline) {
        let actions = pipeline.process_lines(&[
            "5/14/2025 11:30:00.000  ARENA_MATCH_START,559,33,2v2,0".to_string(),
        ]);
        assert!(matches!(
            actions.as_slice(),
            [ControllerAction::StartRecording(request)] if request.label == "Nagrand Arena"
        ));
        assert!(pipeline
            .recording_started(Ok(RecordingHandle::new("/videos/2v2.mp4")))
            .is_none());
        assert_eq!(pipeline.controller().state(), ControllerState::Active);
    }

    #[test]
    fn heuristic_lines_request_one_recording() {
        let mut pipeline = pipeline(ClassificationMode::PerLine);

        let actions = pipeline.process_lines(&combat_lines(20, 4));
        assert_eq!(actions.len(), 1);
        let ControllerAction::StartRecording(request) = &actions[0] else {
            panic!("Expected a start request, got {actions:?}");
        };
        assert!(request.label.ends_with("(Detected)"));
        assert_eq!(request.kind, ActivityKind::Arena2v2);

        assert!(pipeline.process_lines(&combat_lines(20, 4)).is_empty());
    }

    #[test]
    fn rotation_resets_accumulator_but_keeps_session() {
        let mut pipeline = pipeline(ClassificationMode::PerLine);
        activate_arena(&mut pipeline);
        pipeline.process_lines(&combat_lines(10, 4));
        assert!(!pipeline.accumulator().is_empty());

        pipeline.handle_rotation(std::path::Path::new("/logs/WoWCombatLog-2.txt"));
        assert!(pipeline.accumulator().is_empty());
        assert_eq!(pipeline.accumulator().combat_event_count(), 0);

        let actions = pipeline.process_lines(&combat_lines(30, 4));
        assert!(actions.is_empty(), "No spurious end after rotation: {actions:?}");
        assert_eq!(pipeline.controller().state(), ControllerState::Active);
    }

    #[test]
    fn batch_with_explicit_marker_starts_with_explicit_label() {
        let mut pipeline = pipeline(ClassificationMode::Batch);
        let mut lines = combat_lines(40, 6);
        lines.push(build_line(
            "11:31:50.000",
            "ZONE_CHANGE",
            &["1825", "\"Hook Point\"", "0"],
        ));
        lines.push(build_line(
            "11:31:51.000",
            "ARENA_MATCH_START",
            &["1825", "40", "3v3", "0"],
        ));

        let actions = pipeline.process_lines(&lines);
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            ControllerAction::StartRecording(request)
                if request.label == "Hook Point" && request.kind == ActivityKind::Arena3v3
        ));
    }

    #[test]
    fn clip_is_not_ended_by_log_markers() {
        let mut pipeline = pipeline(ClassificationMode::PerLine);
        let now = NaiveDate::from_ymd_opt(2025, 5, 14)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .expect("valid test timestamp");

        assert!(matches!(
            pipeline.start_clip("Funny moment".to_string(), now),
            Some(ControllerAction::StartRecording(_))
        ));
        pipeline.recording_started(Ok(RecordingHandle::new("/videos/clip.mp4")));

        let actions = pipeline.process_lines(&[
            "5/14/2025 12:00:01.000  ARENA_MATCH_START,559,33,2v2,0".to_string(),
            "5/14/2025 12:02:00.000  ARENA_MATCH_END,0,119,1500,1480".to_string(),
        ]);
        assert!(actions.is_empty());
        assert_eq!(pipeline.controller().engaged_kind(), Some(ActivityKind::Clip));

        let Some(ControllerAction::FinishSession(finished)) = pipeline.stop_clip(now) else {
            panic!("Expected the clip to finish");
        };
        assert_eq!(finished.kind, ActivityKind::Clip);
        assert!(pipeline.stop_clip(now).is_none());
    }

    #[test]
    fn force_end_snapshots_participants_and_clears_context() {
        let mut pipeline = pipeline(ClassificationMode::PerLine);
        activate_arena(&mut pipeline);
        pipeline.process_lines(&combat_lines(3, 3));

        let now = NaiveDate::from_ymd_opt(2025, 5, 14)
            .and_then(|date| date.and_hms_opt(11, 35, 0))
            .expect("valid test timestamp");
        let Some(ControllerAction::FinishSession(finished)) = pipeline.force_end(now, "Game closed")
        else {
            panic!("Expected a forced finish");
        };

        assert_eq!(finished.outcome.as_deref(), Some("Game closed"));
        assert_eq!(finished.participants.len(), 3);
        assert!(pipeline.accumulator().is_empty());
        assert_eq!(pipeline.controller().state(), ControllerState::Idle);
    }
}
