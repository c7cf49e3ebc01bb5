use std::collections::HashMap;

use crate::session::ActivityKind;

use super::line::LogLine;

pub(crate) const EVENT_ARENA_MATCH_START: &str = "ARENA_MATCH_START";
pub(crate) const EVENT_ARENA_MATCH_END: &str = "ARENA_MATCH_END";
pub(crate) const EVENT_CHALLENGE_MODE_START: &str = "CHALLENGE_MODE_START";
pub(crate) const EVENT_CHALLENGE_MODE_END: &str = "CHALLENGE_MODE_END";
pub(crate) const EVENT_ENCOUNTER_START: &str = "ENCOUNTER_START";
pub(crate) const EVENT_ENCOUNTER_END: &str = "ENCOUNTER_END";
pub(crate) const EVENT_BATTLEGROUND_START: &str = "BATTLEGROUND_START";
pub(crate) const EVENT_BATTLEGROUND_END: &str = "BATTLEGROUND_END";
pub(crate) const EVENT_PVP_MATCH_COMPLETE: &str = "PVP_MATCH_COMPLETE";
pub(crate) const EVENT_ZONE_CHANGE: &str = "ZONE_CHANGE";
const EVENT_SPELL_AURA_APPLIED: &str = "SPELL_AURA_APPLIED";

const SPELL_ARENA_PREPARATION: u32 = 32727;
const SPELL_BATTLEGROUND_PREPARATION: u32 = 44521;
const SPELL_ID_FIELD_INDEX: usize = 9;
const SPELL_NAME_FIELD_INDEX: usize = 10;

const PLAYER_GUID_MARKER: &str = "Player-";

lazy_static::lazy_static! {
    static ref ARENA_MAP_NAMES: HashMap<u32, &'static str> = HashMap::from([
        (559, "Nagrand Arena"),
        (562, "Blade's Edge Arena"),
        (572, "Ruins of Lordaeron"),
        (617, "Dalaran Sewers"),
        (618, "The Ring of Valor"),
        (980, "Tol'viron Arena"),
        (1134, "The Tiger's Peak"),
        (1504, "Black Rook Hold Arena"),
        (1505, "Nagrand Arena"),
        (1552, "Ashamane's Fall"),
        (1672, "Blade's Edge Arena"),
        (1825, "Hook Point"),
        (1911, "Mugambala"),
        (2167, "The Robodrome"),
        (2373, "Empyrean Domain"),
        (2509, "Maldraxxus Coliseum"),
        (2547, "Enigma Crucible"),
        (2563, "Nokhudon Proving Grounds"),
        (2759, "Cage of Carnage"),
    ]);

    static ref BATTLEGROUND_MAP_NAMES: HashMap<u32, &'static str> = HashMap::from([
        (30, "Alterac Valley"),
        (489, "Warsong Gulch"),
        (529, "Arathi Basin"),
        (566, "Eye of the Storm"),
        (607, "Strand of the Ancients"),
        (628, "Isle of Conquest"),
        (726, "Twin Peaks"),
        (727, "Silvershard Mines"),
        (761, "The Battle for Gilneas"),
        (968, "Eye of the Storm"),
        (998, "Temple of Kotmogu"),
        (1105, "Deepwind Gorge"),
        (1191, "Ashran"),
        (1803, "Seething Shore"),
        (2106, "Warsong Gulch"),
        (2107, "Arathi Basin"),
        (2118, "Battle for Wintergrasp"),
        (2245, "Deepwind Gorge"),
        (2656, "Deephaul Ravine"),
    ]);
}

/// Lower-case keyword to arena name. Order matters: the first match wins.
const ARENA_KEYWORDS: &[(&str, &str)] = &[
    ("nagrand", "Nagrand Arena"),
    ("blade's edge", "Blade's Edge Arena"),
    ("lordaeron", "Ruins of Lordaeron"),
    ("dalaran", "Dalaran Sewers"),
    ("ring of valor", "The Ring of Valor"),
    ("tol'viron", "Tol'viron Arena"),
    ("tiger's peak", "The Tiger's Peak"),
    ("black rook", "Black Rook Hold Arena"),
    ("ashamane", "Ashamane's Fall"),
    ("hook point", "Hook Point"),
    ("mugambala", "Mugambala"),
    ("robodrome", "The Robodrome"),
    ("empyrean", "Empyrean Domain"),
    ("maldraxxus", "Maldraxxus Coliseum"),
    ("enigma crucible", "Enigma Crucible"),
    ("nokhudon", "Nokhudon Proving Grounds"),
    ("cage of carnage", "Cage of Carnage"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreparationKind {
    Arena,
    Battleground,
}

pub(crate) fn arena_map_name(map_id: u32) -> Option<&'static str> {
    ARENA_MAP_NAMES.get(&map_id).copied()
}

pub(crate) fn battleground_map_name(map_id: u32) -> Option<&'static str> {
    BATTLEGROUND_MAP_NAMES.get(&map_id).copied()
}

pub(crate) fn match_arena_keyword(text: &str) -> Option<&'static str> {
    let lower_text = text.to_ascii_lowercase();
    ARENA_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower_text.contains(keyword))
        .map(|(_, arena_name)| *arena_name)
}

/// Unknown or missing match types fall back to the smallest bracket.
pub(crate) fn arena_kind_from_match_type(match_type: Option<&str>) -> ActivityKind {
    let Some(match_type) = match_type else {
        return ActivityKind::Arena2v2;
    };
    let lower_match_type = match_type.trim_matches('"').to_ascii_lowercase();

    if lower_match_type.contains("shuffle") {
        ActivityKind::SoloShuffle
    } else if lower_match_type.contains("skirmish") {
        ActivityKind::Skirmish
    } else if lower_match_type.contains("5v5") {
        ActivityKind::Arena5v5
    } else if lower_match_type.contains("3v3") {
        ActivityKind::Arena3v3
    } else {
        ActivityKind::Arena2v2
    }
}

pub(crate) fn is_raid_difficulty(difficulty_id: u32) -> bool {
    matches!(
        difficulty_id,
        3 | 4 | 5 | 6 | 7 | 9 | 14 | 15 | 16 | 17 | 33
    )
}

pub(crate) fn is_combat_event(event_type: &str) -> bool {
    event_type.ends_with("_DAMAGE")
        || event_type.ends_with("_DAMAGE_LANDED")
        || event_type.ends_with("_HEAL")
        || event_type == "DAMAGE_SPLIT"
}

pub(crate) fn preparation_marker(line: &LogLine) -> Option<PreparationKind> {
    if line.event_type != EVENT_SPELL_AURA_APPLIED {
        return None;
    }

    match line.numeric_field::<u32>(SPELL_ID_FIELD_INDEX) {
        Some(SPELL_ARENA_PREPARATION) => return Some(PreparationKind::Arena),
        Some(SPELL_BATTLEGROUND_PREPARATION) => return Some(PreparationKind::Battleground),
        _ => {}
    }

    match line.text_field(SPELL_NAME_FIELD_INDEX).as_deref() {
        Some("Arena Preparation") => Some(PreparationKind::Arena),
        Some("Preparation") => Some(PreparationKind::Battleground),
        _ => None,
    }
}

/// A field holding a player GUID is followed by that player's name.
pub(crate) fn extract_participants(fields: &[String]) -> impl Iterator<Item = String> + '_ {
    fields
        .windows(2)
        .filter(|pair| pair[0].contains(PLAYER_GUID_MARKER))
        .filter_map(|pair| super::line::normalize_name(Some(pair[1].as_str())))
}
