use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::combat_log::{BatchThresholds, EventClassifier, HeuristicThresholds};
use crate::error::MonitorError;

/// How appended lines are fed to the classifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassificationMode {
    /// One classification per line.
    #[default]
    PerLine,
    /// One classification per poll, with stricter aggregate thresholds.
    Batch,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    pub log_directory: PathBuf,
    pub poll_interval_ms: u64,
    pub replay_existing_log: bool,
    pub classification_mode: ClassificationMode,
    pub heuristics: HeuristicThresholds,
    pub batch_heuristics: BatchThresholds,
    pub heuristic_idle_timeout_secs: u64,
    pub store_directory: PathBuf,
    pub max_stored_sessions: Option<usize>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        let base_directory = default_base_directory();

        Self {
            log_directory: base_directory.join("Logs"),
            poll_interval_ms: 1000,
            replay_existing_log: false,
            classification_mode: ClassificationMode::PerLine,
            heuristics: HeuristicThresholds::default(),
            batch_heuristics: BatchThresholds::default(),
            heuristic_idle_timeout_secs: 60,
            store_directory: base_directory.join("Sessions"),
            max_stored_sessions: None,
        }
    }
}

impl MonitorSettings {
    pub fn load_from_file(path: &Path) -> Result<Self, MonitorError> {
        let contents =
            std::fs::read_to_string(path).map_err(|error| MonitorError::SettingsRead {
                path: path.to_path_buf(),
                source: error,
            })?;

        let settings: Self =
            serde_json::from_str(&contents).map_err(|error| MonitorError::SettingsParse {
                path: path.to_path_buf(),
                source: error,
            })?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.poll_interval_ms == 0 {
            return Err(MonitorError::InvalidSettings(
                "pollIntervalMs must be greater than zero".to_string(),
            ));
        }

        if self.batch_heuristics.combat_threshold < self.heuristics.combat_threshold
            || self.batch_heuristics.min_participants < self.heuristics.min_participants
        {
            return Err(MonitorError::InvalidSettings(
                "batchHeuristics must be at least as strict as heuristics".to_string(),
            ));
        }

        if self.max_stored_sessions == Some(0) {
            return Err(MonitorError::InvalidSettings(
                "maxStoredSessions must be greater than zero when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn build_classifier(&self) -> EventClassifier {
        EventClassifier::new(
            self.heuristics,
            self.batch_heuristics,
            self.heuristic_idle_timeout_secs,
        )
    }
}

fn default_base_directory() -> PathBuf {
    let home_dir = std::env::var("USERPROFILE")
        .or_else(|_| std::env::var("HOME"))
        .unwrap_or_else(|_| ".".to_string());

    Path::new(&home_dir).join("Floorpov")
}

#[cfg(test)]
mod tests {
    use super::{ClassificationMode, MonitorSettings};
    use crate::error::MonitorError;
    use std::path::Path;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: MonitorSettings = serde_json::from_str(
            r#"{ "logDirectory": "/games/wow/_retail_/Logs", "classificationMode": "batch", "heuristics": { "minParticipants": 2 } }"#,
        )
        .expect("Expected partial settings to parse");

        assert_eq!(settings.log_directory, Path::new("/games/wow/_retail_/Logs"));
        assert_eq!(settings.classification_mode, ClassificationMode::Batch);
        assert_eq!(settings.poll_interval_ms, 1000);
        assert_eq!(settings.heuristics.combat_threshold, 15);
        assert_eq!(settings.heuristics.min_participants, 2);
        assert!(!settings.heuristics.require_preparation);
        assert_eq!(settings.batch_heuristics.combat_threshold, 30);
        assert_eq!(settings.heuristic_idle_timeout_secs, 60);
        assert_eq!(settings.max_stored_sessions, None);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn rejects_zero_poll_interval_and_loose_batch_thresholds() {
        let zero_interval = MonitorSettings {
            poll_interval_ms: 0,
            ..MonitorSettings::default()
        };
        assert!(matches!(
            zero_interval.validate(),
            Err(MonitorError::InvalidSettings(_))
        ));

        let mut loose_batch = MonitorSettings::default();
        loose_batch.batch_heuristics.combat_threshold = 5;
        assert!(matches!(
            loose_batch.validate(),
            Err(MonitorError::InvalidSettings(_))
        ));
    }

    #[test]
    fn load_from_file_reports_parse_errors_with_path() {
        let directory = tempfile::tempdir().expect("Expected temp dir");
        let settings_path = directory.path().join("settings.json");
        std::fs::write(&settings_path, "{ not json").expect("Expected settings write");

        let error = MonitorSettings::load_from_file(&settings_path)
            .expect_err("Expected malformed settings to fail");
        assert!(matches!(error, MonitorError::SettingsParse { .. }));
        assert!(error.to_string().contains("settings.json"));

        std::fs::write(&settings_path, r#"{ "pollIntervalMs": 250 }"#)
            .expect("Expected settings write");
        let settings =
            MonitorSettings::load_from_file(&settings_path).expect("Expected settings to load");
        assert_eq!(settings.poll_interval_ms, 250);
    }
}
