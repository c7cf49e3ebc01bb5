//! Combat log ingestion: tailing the newest log file, parsing lines and classifying them into
//! session start and end signals.

mod classifier;
mod heuristics;
mod line;
mod markers;
mod watcher;

pub use classifier::EventClassifier;
pub use heuristics::{BatchThresholds, HeuristicAccumulator, HeuristicThresholds};
pub use line::{parse_line, parse_line_at, LogLine};
pub use watcher::{
    find_latest_combat_log, is_relevant_notification, watch_directory, LogPoll, LogWatcher,
};
