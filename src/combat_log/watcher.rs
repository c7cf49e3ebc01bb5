use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::MonitorError;

/// Result of one pass over the log directory.
#[derive(Debug, Default, PartialEq)]
pub struct LogPoll {
    /// Set when a newer log file took over since the previous poll.
    pub rotated_to: Option<PathBuf>,
    pub lines: Vec<String>,
}

/// Tails the newest combat log in a directory.
///
/// Every file seen keeps its own offset, so a rotation first drains the previous file's tail
/// and then continues in the new one. Offsets only move forward, except when a file shrinks
/// below its offset, which is treated as the game rewriting it. Only newline-terminated lines
/// are delivered; a partial trailing line stays in the file until a later poll completes it.
#[derive(Debug)]
pub struct LogWatcher {
    directory: PathBuf,
    current: Option<PathBuf>,
    offsets: HashMap<PathBuf, u64>,
    replay_existing: bool,
    scanned: bool,
}

impl LogWatcher {
    pub fn new(directory: impl Into<PathBuf>, replay_existing: bool) -> Self {
        Self {
            directory: directory.into(),
            current: None,
            offsets: HashMap::new(),
            replay_existing,
            scanned: false,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn current_log(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn poll(&mut self) -> Result<LogPoll, MonitorError> {
        let first_scan = !self.scanned;
        self.scanned = true;

        let Some(latest_path) = find_latest_combat_log(&self.directory)? else {
            return Ok(LogPoll::default());
        };

        let mut poll = LogPoll::default();
        if self.current.as_deref() != Some(latest_path.as_path()) {
            if let Some(previous_path) = self.current.take() {
                poll.lines = self.drain_previous(&previous_path);
            }

            if !self.offsets.contains_key(&latest_path) {
                let initial_offset = if first_scan && !self.replay_existing {
                    file_length(&latest_path)?
                } else {
                    0
                };
                self.offsets.insert(latest_path.clone(), initial_offset);
            }

            if first_scan {
                tracing::info!(log_path = %latest_path.display(), "Tailing combat log");
            } else {
                tracing::info!(log_path = %latest_path.display(), "Combat log rotated");
                poll.rotated_to = Some(latest_path.clone());
            }
            self.current = Some(latest_path.clone());
        }

        let offset = self.offsets.entry(latest_path.clone()).or_insert(0);
        match read_complete_lines(&latest_path, offset) {
            Ok(lines) => poll.lines.extend(lines),
            Err(error) if !poll.lines.is_empty() => {
                // The offset is unchanged, so the new file is retried on the next poll.
                tracing::warn!("Delivering previous combat log tail only: {error}");
            }
            Err(error) => return Err(error),
        }
        Ok(poll)
    }

    /// Reads whatever the game finished writing to the old file before it switched.
    fn drain_previous(&mut self, previous_path: &Path) -> Vec<String> {
        let Some(offset) = self.offsets.get_mut(previous_path) else {
            return Vec::new();
        };

        match read_complete_lines(previous_path, offset) {
            Ok(lines) => lines,
            Err(error) => {
                tracing::warn!(
                    log_path = %previous_path.display(),
                    "Could not drain previous combat log: {error}"
                );
                Vec::new()
            }
        }
    }
}

/// Starts an OS-level directory watch that forwards notifications into `sender`.
pub fn watch_directory(
    directory: &Path,
    sender: mpsc::UnboundedSender<Result<Event, notify::Error>>,
) -> Result<RecommendedWatcher, MonitorError> {
    let mut watcher = notify::recommended_watcher(move |result| {
        if sender.send(result).is_err() {
            tracing::debug!("Combat log watcher notification receiver dropped");
        }
    })?;
    watcher.watch(directory, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// True for creates and writes touching any combat log file in the watched directory.
pub fn is_relevant_notification(event: &Event) -> bool {
    let relevant_kind = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
    if !relevant_kind {
        return false;
    }

    event.paths.iter().any(|path| {
        path.file_name()
            .and_then(|file_name| file_name.to_str())
            .map(is_combat_log_file_name)
            .unwrap_or(false)
    })
}

fn is_combat_log_file_name(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    lower.starts_with("wowcombatlog") && lower.ends_with(".txt")
}

/// Newest `WoWCombatLog*.txt` by modification time. A missing directory has no log yet.
pub fn find_latest_combat_log(directory: &Path) -> Result<Option<PathBuf>, MonitorError> {
    let directory_error = |source: std::io::Error| MonitorError::LogDirectory {
        path: directory.to_path_buf(),
        source,
    };

    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(_) if !directory.exists() => return Ok(None),
        Err(error) => return Err(directory_error(error)),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(directory_error)?;
        let path = entry.path();
        let is_log = path.is_file()
            && path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_combat_log_file_name);
        if !is_log {
            continue;
        }

        let modified = entry
            .metadata()
            .and_then(|metadata| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        candidates.push((modified, path));
    }

    Ok(candidates
        .into_iter()
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path))
}

fn file_length(path: &Path) -> Result<u64, MonitorError> {
    std::fs::metadata(path)
        .map(|metadata| metadata.len())
        .map_err(|error| MonitorError::LogRead {
            path: path.to_path_buf(),
            source: error,
        })
}

fn read_complete_lines(path: &Path, offset: &mut u64) -> Result<Vec<String>, MonitorError> {
    let read_error = |error: std::io::Error| MonitorError::LogRead {
        path: path.to_path_buf(),
        source: error,
    };

    let mut file = File::open(path).map_err(read_error)?;
    let current_length = file.metadata().map_err(read_error)?.len();

    if current_length < *offset {
        tracing::info!(
            log_path = %path.display(),
            previous_offset = *offset,
            current_length,
            "Combat log shrank, reading from the start"
        );
        *offset = 0;
    }
    if current_length == *offset {
        return Ok(Vec::new());
    }

    file.seek(SeekFrom::Start(*offset)).map_err(read_error)?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer).map_err(read_error)?;

    let Some(last_newline) = buffer.iter().rposition(|byte| *byte == b'\n') else {
        return Ok(Vec::new());
    };
    let complete = &buffer[..=last_newline];
    *offset = offset.saturating_add(complete.len() as u64);

    Ok(String::from_utf8_lossy(complete)
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}
