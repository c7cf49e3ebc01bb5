use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::StoreError;
use crate::session::SessionRecord;

/// Persistence for finished sessions.
pub trait Store: Send + Sync {
    fn save(&self, record: SessionRecord) -> Result<(), StoreError>;

    fn list(&self) -> Result<Vec<SessionRecord>, StoreError>;

    fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Stores each record as `<id>.json` inside one directory.
pub struct JsonSessionStore {
    directory: PathBuf,
    max_records: Option<usize>,
}

impl JsonSessionStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_records: None,
        }
    }

    /// Keep at most `max_records` records; older ones are pruned after each save.
    pub fn with_max_records(mut self, max_records: Option<usize>) -> Self {
        self.max_records = max_records;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.directory.join(format!("{id}.json"))
    }

    /// Deletes the oldest records until at most `max_records` remain.
    pub fn prune(&self, max_records: usize) -> Result<Vec<Uuid>, StoreError> {
        let mut records = self.list()?;
        let mut deleted = Vec::new();

        while records.len() > max_records {
            let oldest = records.remove(0);
            self.delete(oldest.id)?;
            deleted.push(oldest.id);
        }

        if !deleted.is_empty() {
            tracing::info!(
                deleted_count = deleted.len(),
                max_records,
                "Pruned old session records"
            );
        }

        Ok(deleted)
    }
}

impl Store for JsonSessionStore {
    fn save(&self, record: SessionRecord) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.directory).map_err(|source| StoreError::Io {
            path: self.directory.clone(),
            source,
        })?;

        let record_path = self.record_path(record.id);
        let temp_path = record_path.with_extension("json.tmp");
        let serialized = serde_json::to_string_pretty(&record).map_err(StoreError::Encode)?;

        std::fs::write(&temp_path, serialized).map_err(|source| StoreError::Io {
            path: temp_path.clone(),
            source,
        })?;

        if let Err(source) = std::fs::rename(&temp_path, &record_path) {
            if let Err(cleanup_error) = std::fs::remove_file(&temp_path) {
                tracing::warn!(
                    temp_path = %temp_path.display(),
                    "Failed to remove temporary session record: {cleanup_error}"
                );
            }
            return Err(StoreError::Io {
                path: record_path,
                source,
            });
        }

        if let Some(max_records) = self.max_records {
            if let Err(error) = self.prune(max_records) {
                tracing::warn!(max_records, "Saved session record but pruning failed: {error}");
            }
        }

        Ok(())
    }

    fn list(&self) -> Result<Vec<SessionRecord>, StoreError> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.directory.clone(),
                    source,
                })
            }
        };

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Io {
                path: self.directory.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().map_or(true, |extension| extension != "json") {
                continue;
            }

            match read_record(&path) {
                Ok(record) => records.push(record),
                Err(error) => tracing::warn!("Skipping unreadable session record: {error}"),
            }
        }

        records.sort_by_key(|record| record.started_at);
        Ok(records)
    }

    fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let record_path = self.record_path(id);
        match std::fs::remove_file(&record_path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io {
                path: record_path,
                source,
            }),
        }
    }
}

fn read_record(path: &Path) -> Result<SessionRecord, StoreError> {
    let raw_json = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str::<SessionRecord>(&raw_json).map_err(|source| StoreError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::{JsonSessionStore, Store};
    use crate::session::{ActivityKind, SessionRecord};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn at_minute(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 14)
            .and_then(|date| date.and_hms_opt(20, minute, 0))
            .expect("valid test timestamp")
    }

    fn build_record(label: &str, minute: u32) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            kind: ActivityKind::Arena3v3,
            label: label.to_string(),
            started_at: at_minute(minute),
            duration_seconds: 182.5,
            artifact_path: Some(PathBuf::from(format!("/videos/{label}.mp4"))),
            outcome: "Win".to_string(),
            difficulty: 0,
            participants: vec!["Aria".to_string(), "Borin".to_string()],
        }
    }

    #[test]
    fn saves_lists_in_start_order_and_deletes() {
        let directory = tempfile::tempdir().expect("Failed to create temporary store directory");
        let store = JsonSessionStore::new(directory.path());

        let later = build_record("Mugambala", 40);
        let earlier = build_record("Hook Point", 10);
        store.save(later.clone()).expect("Expected save to succeed");
        store.save(earlier.clone()).expect("Expected save to succeed");

        let listed = store.list().expect("Expected list to succeed");
        assert_eq!(listed, vec![earlier.clone(), later.clone()]);

        store.delete(earlier.id).expect("Expected delete to succeed");
        store
            .delete(earlier.id)
            .expect("Deleting a missing record should be a no-op");
        assert_eq!(store.list().expect("Expected list to succeed"), vec![later]);
    }

    #[test]
    fn lists_nothing_when_directory_is_missing() {
        let directory = tempfile::tempdir().expect("Failed to create temporary store directory");
        let store = JsonSessionStore::new(directory.path().join("not-created-yet"));

        assert!(store.list().expect("Expected list to succeed").is_empty());
    }

    #[test]
    fn prunes_oldest_records_beyond_cap_after_save() {
        let directory = tempfile::tempdir().expect("Failed to create temporary store directory");
        let store = JsonSessionStore::new(directory.path()).with_max_records(Some(2));

        let oldest = build_record("Nagrand Arena", 1);
        store.save(oldest.clone()).expect("Expected save to succeed");
        store
            .save(build_record("Empyrean Domain", 2))
            .expect("Expected save to succeed");
        store
            .save(build_record("Cage of Carnage", 3))
            .expect("Expected save to succeed");

        let listed = store.list().expect("Expected list to succeed");
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|record| record.id != oldest.id));
    }

    #[test]
    fn undecodable_files_are_skipped_and_saves_keep_pruning() {
        let directory = tempfile::tempdir().expect("Failed to create temporary store directory");
        std::fs::write(directory.path().join("junk.json"), "{ truncated")
            .expect("Expected junk file write to succeed");
        let store = JsonSessionStore::new(directory.path()).with_max_records(Some(1));

        let older = build_record("Nagrand Arena", 1);
        let newer = build_record("Hook Point", 2);
        store.save(older).expect("Expected save to succeed");
        store.save(newer.clone()).expect("Expected save to succeed despite the junk file");

        assert_eq!(store.list().expect("Expected list to succeed"), vec![newer]);
        assert!(directory.path().join("junk.json").exists());
    }
}
