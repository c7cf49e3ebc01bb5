//! Turns parsed lines into session start/end signals.
//!
//! Checks run in a fixed order and the first hit wins:
//! explicit start marker, explicit end marker, arena preparation aura, heuristic idle end,
//! and finally the accumulated heuristic start. Batch classification applies the same order
//! across a whole batch, so an explicit marker late in the batch beats an earlier heuristic
//! trigger.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDateTime};

use super::heuristics::{BatchThresholds, HeuristicAccumulator, HeuristicThresholds};
use super::line::LogLine;
use super::markers::{
    arena_kind_from_match_type, arena_map_name, battleground_map_name, extract_participants,
    is_combat_event, is_raid_difficulty, match_arena_keyword, preparation_marker,
    PreparationKind, EVENT_ARENA_MATCH_END, EVENT_ARENA_MATCH_START, EVENT_BATTLEGROUND_END,
    EVENT_BATTLEGROUND_START, EVENT_CHALLENGE_MODE_END, EVENT_CHALLENGE_MODE_START,
    EVENT_ENCOUNTER_END, EVENT_ENCOUNTER_START, EVENT_PVP_MATCH_COMPLETE, EVENT_ZONE_CHANGE,
};
use crate::session::{
    ActivityFamily, ActivityKind, DetectedEvent, DetectionOrigin, DETECTED_LABEL_SUFFIX,
};

const UNKNOWN_ARENA_LABEL: &str = "Unknown Arena";
const UNKNOWN_BATTLEGROUND_LABEL: &str = "Unknown Battleground";
const OUTCOME_IDLE: &str = "Inactive";
const OUTCOME_LEFT_BATTLEGROUND: &str = "Left battleground";
const MAX_IDLE_TIMEOUT_SECS: u64 = 86_400;

const ARENA_FAMILIES: &[ActivityFamily] = &[ActivityFamily::Arena];
const PVP_FAMILIES: &[ActivityFamily] = &[ActivityFamily::Arena, ActivityFamily::Battleground];
const MYTHIC_PLUS_FAMILIES: &[ActivityFamily] = &[ActivityFamily::MythicPlus];
const RAID_FAMILIES: &[ActivityFamily] = &[ActivityFamily::Raid];
const BATTLEGROUND_FAMILIES: &[ActivityFamily] = &[ActivityFamily::Battleground];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenSession {
    kind: ActivityKind,
    origin: DetectionOrigin,
    opened_at: NaiveDateTime,
}

#[derive(Debug)]
enum Candidate {
    Start {
        kind: ActivityKind,
        label: String,
        observed_at: NaiveDateTime,
        difficulty: u32,
        origin: DetectionOrigin,
        arena_team_id: Option<u32>,
    },
    End {
        observed_at: NaiveDateTime,
        outcome: Option<String>,
    },
}

#[derive(Debug)]
pub struct EventClassifier {
    thresholds: HeuristicThresholds,
    batch_thresholds: BatchThresholds,
    heuristic_idle_timeout: Duration,
    open_session: Option<OpenSession>,
    arena_team_id: Option<u32>,
    current_zone: Option<String>,
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new(HeuristicThresholds::default(), BatchThresholds::default(), 60)
    }
}

impl EventClassifier {
    pub fn new(
        thresholds: HeuristicThresholds,
        batch_thresholds: BatchThresholds,
        heuristic_idle_timeout_secs: u64,
    ) -> Self {
        let idle_seconds = heuristic_idle_timeout_secs.min(MAX_IDLE_TIMEOUT_SECS) as i64;

        Self {
            thresholds,
            batch_thresholds,
            heuristic_idle_timeout: Duration::seconds(idle_seconds),
            open_session: None,
            arena_team_id: None,
            current_zone: None,
        }
    }

    /// Kind of the session this classifier believes the log is in, if any.
    pub fn open_kind(&self) -> Option<ActivityKind> {
        self.open_session.map(|open| open.kind)
    }

    pub fn current_zone(&self) -> Option<&str> {
        self.current_zone.as_deref()
    }

    /// Forgets the open session after it was closed outside the log (app exit, manual stop).
    pub fn reset_session(&mut self, accumulator: &mut HeuristicAccumulator) {
        self.open_session = None;
        self.arena_team_id = None;
        accumulator.reset();
    }

    pub fn classify_line(
        &mut self,
        line: &LogLine,
        accumulator: &mut HeuristicAccumulator,
        session_active: bool,
    ) -> Option<DetectedEvent> {
        if line.is_degraded() {
            return None;
        }

        let idle_expired = self.heuristic_idle_expired(line.timestamp, accumulator);
        self.track_zone(line);
        accumulator.observe(line);

        let candidate = self
            .explicit_start(line)
            .or_else(|| self.explicit_end(line))
            .or_else(|| self.preparation_start(line))
            .or_else(|| idle_expired.then(|| idle_end(line.timestamp)))
            .or_else(|| self.heuristic_start(line.timestamp, accumulator, session_active));

        candidate.map(|candidate| self.commit(candidate, accumulator))
    }

    pub fn classify_batch(
        &mut self,
        lines: &[LogLine],
        accumulator: &mut HeuristicAccumulator,
        session_active: bool,
    ) -> Option<DetectedEvent> {
        let first_timestamp = lines.iter().find(|line| !line.is_degraded())?.timestamp;
        let idle_expired = self.heuristic_idle_expired(first_timestamp, accumulator);

        let mut explicit_start = None;
        let mut explicit_end = None;
        let mut preparation = None;
        let mut batch_combat_count = 0_u32;
        let mut batch_participants = BTreeSet::new();
        let mut keyword_hits = 0_usize;
        let mut first_keyword = None;

        for line in lines.iter().filter(|line| !line.is_degraded()) {
            self.track_zone(line);
            accumulator.observe(line);

            if is_combat_event(&line.event_type) {
                batch_combat_count = batch_combat_count.saturating_add(1);
            }
            batch_participants.extend(extract_participants(&line.fields));
            if let Some(arena_name) = match_arena_keyword(&line.raw) {
                keyword_hits += 1;
                first_keyword.get_or_insert(arena_name);
            }

            if explicit_start.is_none() {
                explicit_start = self.explicit_start(line);
            }
            if explicit_end.is_none() {
                explicit_end = self.explicit_end(line);
            }
            if preparation.is_none() {
                preparation = self.preparation_start(line);
            }
        }

        let candidate = explicit_start
            .or(explicit_end)
            .or(preparation)
            .or_else(|| idle_expired.then(|| idle_end(first_timestamp)))
            .or_else(|| {
                let thresholds = self.batch_thresholds;
                let qualifies = !session_active
                    && self.open_session.is_none()
                    && batch_combat_count > thresholds.combat_threshold
                    && batch_participants.len() >= thresholds.min_participants
                    && keyword_hits >= thresholds.min_keyword_hits;

                qualifies.then(|| {
                    self.detected_start(first_timestamp, batch_participants.len(), first_keyword)
                })
            });

        candidate.map(|candidate| self.commit(candidate, accumulator))
    }

    fn track_zone(&mut self, line: &LogLine) {
        if line.event_type == EVENT_ZONE_CHANGE {
            self.current_zone = line.text_field(2);
        }
    }

    fn explicit_start(&self, line: &LogLine) -> Option<Candidate> {
        let observed_at = line.timestamp;

        match line.event_type.as_str() {
            EVENT_ARENA_MATCH_START => {
                let kind = arena_kind_from_match_type(line.field(3));
                let label = line
                    .numeric_field::<u32>(1)
                    .and_then(arena_map_name)
                    .map(str::to_string)
                    .unwrap_or_else(|| unknown_label(ActivityFamily::Arena, line.field(1)));

                Some(Candidate::Start {
                    kind,
                    label,
                    observed_at,
                    difficulty: 0,
                    origin: DetectionOrigin::Explicit,
                    arena_team_id: line.numeric_field::<u32>(4),
                })
            }
            EVENT_CHALLENGE_MODE_START => {
                let label = line
                    .text_field(1)
                    .unwrap_or_else(|| unknown_label(ActivityFamily::MythicPlus, line.field(2)));

                Some(Candidate::Start {
                    kind: ActivityKind::MythicPlus,
                    label,
                    observed_at,
                    difficulty: line.numeric_field::<u32>(4).unwrap_or(0),
                    origin: DetectionOrigin::Explicit,
                    arena_team_id: None,
                })
            }
            EVENT_ENCOUNTER_START => {
                let difficulty = line.numeric_field::<u32>(3)?;
                if !is_raid_difficulty(difficulty) || self.open_family_is(ActivityFamily::MythicPlus)
                {
                    return None;
                }

                let label = line
                    .text_field(2)
                    .unwrap_or_else(|| unknown_label(ActivityFamily::Raid, line.field(1)));

                Some(Candidate::Start {
                    kind: ActivityKind::Raid,
                    label,
                    observed_at,
                    difficulty,
                    origin: DetectionOrigin::Explicit,
                    arena_team_id: None,
                })
            }
            EVENT_BATTLEGROUND_START => Some(battleground_start(line, observed_at)),
            EVENT_ZONE_CHANGE => {
                let map_id = line.numeric_field::<u32>(1)?;
                battleground_map_name(map_id)?;
                if self.open_family_is(ActivityFamily::Battleground) {
                    return None;
                }

                Some(battleground_start(line, observed_at))
            }
            _ => None,
        }
    }

    fn explicit_end(&self, line: &LogLine) -> Option<Candidate> {
        let (families, outcome) = match line.event_type.as_str() {
            EVENT_ARENA_MATCH_END => (ARENA_FAMILIES, self.pvp_outcome(line)),
            EVENT_PVP_MATCH_COMPLETE => (PVP_FAMILIES, self.pvp_outcome(line)),
            EVENT_BATTLEGROUND_END => (BATTLEGROUND_FAMILIES, self.pvp_outcome(line)),
            EVENT_CHALLENGE_MODE_END => {
                let outcome = match line.numeric_field::<u32>(2) {
                    Some(1) => Some("Timed".to_string()),
                    Some(_) => Some("Depleted".to_string()),
                    None => None,
                };
                (MYTHIC_PLUS_FAMILIES, outcome)
            }
            EVENT_ENCOUNTER_END => {
                let difficulty = line.numeric_field::<u32>(3)?;
                if !is_raid_difficulty(difficulty) {
                    return None;
                }
                let outcome = match line.numeric_field::<u32>(5) {
                    Some(1) => Some("Kill".to_string()),
                    Some(_) => Some("Wipe".to_string()),
                    None => None,
                };
                (RAID_FAMILIES, outcome)
            }
            EVENT_ZONE_CHANGE => {
                if !self.open_family_is(ActivityFamily::Battleground) {
                    return None;
                }
                let still_in_battleground = line
                    .numeric_field::<u32>(1)
                    .and_then(battleground_map_name)
                    .is_some();
                if still_in_battleground {
                    return None;
                }
                (
                    BATTLEGROUND_FAMILIES,
                    Some(OUTCOME_LEFT_BATTLEGROUND.to_string()),
                )
            }
            _ => return None,
        };

        if !self.closes_open_session(families) {
            return None;
        }

        Some(Candidate::End {
            observed_at: line.timestamp,
            outcome,
        })
    }

    fn preparation_start(&self, line: &LogLine) -> Option<Candidate> {
        if self.open_session.is_some() {
            return None;
        }
        if preparation_marker(line)? != PreparationKind::Arena {
            return None;
        }

        let label = self
            .keyword_label(line)
            .unwrap_or(UNKNOWN_ARENA_LABEL)
            .to_string();

        Some(Candidate::Start {
            kind: ActivityKind::Arena2v2,
            label,
            observed_at: line.timestamp,
            difficulty: 0,
            origin: DetectionOrigin::Preparation,
            arena_team_id: None,
        })
    }

    fn heuristic_start(
        &self,
        observed_at: NaiveDateTime,
        accumulator: &HeuristicAccumulator,
        session_active: bool,
    ) -> Option<Candidate> {
        if session_active
            || self.open_session.is_some()
            || !accumulator.likely_active(&self.thresholds)
        {
            return None;
        }

        let zone_keyword = self.current_zone.as_deref().and_then(match_arena_keyword);
        Some(self.detected_start(
            observed_at,
            accumulator.participants().len(),
            zone_keyword,
        ))
    }

    fn detected_start(
        &self,
        observed_at: NaiveDateTime,
        participant_count: usize,
        keyword_label: Option<&str>,
    ) -> Candidate {
        let kind = kind_for_participant_count(participant_count);
        let base_label = match kind.family() {
            ActivityFamily::Battleground => UNKNOWN_BATTLEGROUND_LABEL,
            _ => keyword_label
                .or_else(|| self.current_zone.as_deref().and_then(match_arena_keyword))
                .unwrap_or(UNKNOWN_ARENA_LABEL),
        };

        Candidate::Start {
            kind,
            label: format!("{base_label}{DETECTED_LABEL_SUFFIX}"),
            observed_at,
            difficulty: 0,
            origin: DetectionOrigin::Heuristic,
            arena_team_id: None,
        }
    }

    fn heuristic_idle_expired(
        &self,
        timestamp: NaiveDateTime,
        accumulator: &HeuristicAccumulator,
    ) -> bool {
        let Some(open) = self
            .open_session
            .filter(|open| open.origin == DetectionOrigin::Heuristic)
        else {
            return false;
        };

        // After a rotation reset there is no activity yet; count from the session start.
        let last_activity = accumulator.last_activity_at().unwrap_or(open.opened_at);
        timestamp.signed_duration_since(last_activity) > self.heuristic_idle_timeout
    }

    fn keyword_label(&self, line: &LogLine) -> Option<&'static str> {
        match_arena_keyword(&line.raw)
            .or_else(|| self.current_zone.as_deref().and_then(match_arena_keyword))
    }

    fn pvp_outcome(&self, line: &LogLine) -> Option<String> {
        let winning_team = line.numeric_field::<u32>(1)?;
        let outcome = match self.arena_team_id {
            Some(team_id) if team_id == winning_team => "Win".to_string(),
            Some(_) => "Loss".to_string(),
            None => format!("Team {winning_team} won"),
        };
        Some(outcome)
    }

    fn open_family_is(&self, family: ActivityFamily) -> bool {
        self.open_session
            .is_some_and(|open| open.kind.family() == family)
    }

    /// Explicitly opened sessions only close on their own family's end marker.
    fn closes_open_session(&self, families: &[ActivityFamily]) -> bool {
        match self.open_session {
            None => false,
            Some(open) if open.origin == DetectionOrigin::Explicit => {
                families.contains(&open.kind.family())
            }
            Some(_) => true,
        }
    }

    fn commit(
        &mut self,
        candidate: Candidate,
        accumulator: &mut HeuristicAccumulator,
    ) -> DetectedEvent {
        match candidate {
            Candidate::Start {
                kind,
                label,
                observed_at,
                difficulty,
                origin,
                arena_team_id,
            } => {
                tracing::debug!(kind = %kind, label = %label, ?origin, "Detected session start");
                self.open_session = Some(OpenSession {
                    kind,
                    origin,
                    opened_at: observed_at,
                });
                if arena_team_id.is_some() {
                    self.arena_team_id = arena_team_id;
                }

                DetectedEvent::Start {
                    kind,
                    label,
                    observed_at,
                    difficulty,
                    origin,
                }
            }
            Candidate::End {
                observed_at,
                outcome,
            } => {
                tracing::debug!(
                    outcome = outcome.as_deref().unwrap_or("unknown"),
                    "Detected session end"
                );
                let participants = accumulator.participant_list();
                self.reset_session(accumulator);

                DetectedEvent::End {
                    observed_at,
                    outcome,
                    participants,
                }
            }
        }
    }
}

fn battleground_start(line: &LogLine, observed_at: NaiveDateTime) -> Candidate {
    let label = line
        .numeric_field::<u32>(1)
        .and_then(battleground_map_name)
        .map(str::to_string)
        .unwrap_or_else(|| unknown_label(ActivityFamily::Battleground, line.field(1)));

    Candidate::Start {
        kind: ActivityKind::Battleground,
        label,
        observed_at,
        difficulty: 0,
        origin: DetectionOrigin::Explicit,
        arena_team_id: None,
    }
}

fn idle_end(observed_at: NaiveDateTime) -> Candidate {
    Candidate::End {
        observed_at,
        outcome: Some(OUTCOME_IDLE.to_string()),
    }
}

fn unknown_label(family: ActivityFamily, raw_id: Option<&str>) -> String {
    let id = raw_id
        .map(|value| value.trim_matches('"'))
        .filter(|value| !value.is_empty())
        .unwrap_or("?");
    format!("Unknown {} (ID: {id})", family.display_name())
}

/// Both teams are visible in the log, so the bracket follows from the head count.
fn kind_for_participant_count(participant_count: usize) -> ActivityKind {
    match participant_count {
        0..=4 => ActivityKind::Arena2v2,
        5..=6 => ActivityKind::Arena3v3,
        7..=10 => ActivityKind::Arena5v5,
        _ => ActivityKind::Battleground,
    }
}
