mod controller;

use std::fmt;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recording::RecordingHandle;

pub use controller::{ControllerAction, ControllerState, FinishedSession, SessionController};

pub(crate) const DETECTED_LABEL_SUFFIX: &str = " (Detected)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityKind {
    Arena2v2,
    Arena3v3,
    Arena5v5,
    Skirmish,
    SoloShuffle,
    MythicPlus,
    Raid,
    Battleground,
    Clip,
}

/// Groups kinds that share start/end markers in the combat log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityFamily {
    Arena,
    MythicPlus,
    Raid,
    Battleground,
    Clip,
}

impl ActivityKind {
    pub fn family(self) -> ActivityFamily {
        match self {
            ActivityKind::Arena2v2
            | ActivityKind::Arena3v3
            | ActivityKind::Arena5v5
            | ActivityKind::Skirmish
            | ActivityKind::SoloShuffle => ActivityFamily::Arena,
            ActivityKind::MythicPlus => ActivityFamily::MythicPlus,
            ActivityKind::Raid => ActivityFamily::Raid,
            ActivityKind::Battleground => ActivityFamily::Battleground,
            ActivityKind::Clip => ActivityFamily::Clip,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Arena2v2 => "2v2",
            ActivityKind::Arena3v3 => "3v3",
            ActivityKind::Arena5v5 => "5v5",
            ActivityKind::Skirmish => "skirmish",
            ActivityKind::SoloShuffle => "soloShuffle",
            ActivityKind::MythicPlus => "mythicPlus",
            ActivityKind::Raid => "raid",
            ActivityKind::Battleground => "battleground",
            ActivityKind::Clip => "clip",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ActivityFamily {
    /// Name used when synthesizing labels for unknown map IDs.
    pub fn display_name(self) -> &'static str {
        match self {
            ActivityFamily::Arena => "Arena",
            ActivityFamily::MythicPlus => "Mythic+",
            ActivityFamily::Raid => "Raid",
            ActivityFamily::Battleground => "Battleground",
            ActivityFamily::Clip => "Clip",
        }
    }
}

/// Where a start signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DetectionOrigin {
    Explicit,
    Preparation,
    Heuristic,
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetectedEvent {
    Start {
        kind: ActivityKind,
        label: String,
        observed_at: NaiveDateTime,
        difficulty: u32,
        origin: DetectionOrigin,
    },
    End {
        observed_at: NaiveDateTime,
        outcome: Option<String>,
        participants: Vec<String>,
    },
}

impl DetectedEvent {
    pub fn is_start(&self) -> bool {
        matches!(self, DetectedEvent::Start { .. })
    }

    pub fn is_end(&self) -> bool {
        matches!(self, DetectedEvent::End { .. })
    }

    pub fn observed_at(&self) -> NaiveDateTime {
        match self {
            DetectedEvent::Start { observed_at, .. } | DetectedEvent::End { observed_at, .. } => {
                *observed_at
            }
        }
    }
}

/// The single live session owned by [`SessionController`].
#[derive(Debug, Clone)]
pub struct Session {
    pub kind: ActivityKind,
    pub label: String,
    pub started_at: NaiveDateTime,
    pub difficulty: u32,
    pub recorder_handle: RecordingHandle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub label: String,
    pub started_at: NaiveDateTime,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
    pub outcome: String,
    pub difficulty: u32,
    #[serde(default)]
    pub participants: Vec<String>,
}
