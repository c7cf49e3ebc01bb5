use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::line::LogLine;
use super::markers::{extract_participants, is_combat_event, preparation_marker};

/// Thresholds for inferring a session from single-line accumulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeuristicThresholds {
    /// Combat events must exceed this count.
    pub combat_threshold: u32,
    pub min_participants: usize,
    pub require_preparation: bool,
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        Self {
            combat_threshold: 15,
            min_participants: 3,
            require_preparation: false,
        }
    }
}

/// Thresholds applied to whole batches. Kept stricter than [`HeuristicThresholds`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchThresholds {
    pub combat_threshold: u32,
    pub min_participants: usize,
    pub min_keyword_hits: usize,
}

impl Default for BatchThresholds {
    fn default() -> Self {
        Self {
            combat_threshold: 30,
            min_participants: 4,
            min_keyword_hits: 1,
        }
    }
}

/// Rolling counters for one monitored log file.
#[derive(Debug, Clone, Default)]
pub struct HeuristicAccumulator {
    combat_event_count: u32,
    participants: BTreeSet<String>,
    preparation_seen: bool,
    last_activity_at: Option<NaiveDateTime>,
}

impl HeuristicAccumulator {
    pub fn observe(&mut self, line: &LogLine) {
        if line.is_degraded() {
            return;
        }

        let is_combat = is_combat_event(&line.event_type);
        if is_combat {
            self.combat_event_count = self.combat_event_count.saturating_add(1);
        }

        let is_preparation = preparation_marker(line).is_some();
        if is_preparation {
            self.preparation_seen = true;
        }

        self.participants.extend(extract_participants(&line.fields));

        if is_combat || is_preparation {
            self.last_activity_at = Some(line.timestamp);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn likely_active(&self, thresholds: &HeuristicThresholds) -> bool {
        self.combat_event_count > thresholds.combat_threshold
            && self.participants.len() >= thresholds.min_participants
            && (self.preparation_seen || !thresholds.require_preparation)
    }

    pub fn combat_event_count(&self) -> u32 {
        self.combat_event_count
    }

    pub fn participants(&self) -> &BTreeSet<String> {
        &self.participants
    }

    pub fn preparation_seen(&self) -> bool {
        self.preparation_seen
    }

    pub fn last_activity_at(&self) -> Option<NaiveDateTime> {
        self.last_activity_at
    }

    pub fn is_empty(&self) -> bool {
        self.combat_event_count == 0
            && self.participants.is_empty()
            && !self.preparation_seen
            && self.last_activity_at.is_none()
    }

    pub(crate) fn participant_list(&self) -> Vec<String> {
        self.participants.iter().cloned().collect()
    }
}
