//! Durable snapshots of operational state
//!
//! Snapshots are written atomically (temp file + rename) so a crash
//! mid-write never leaves a corrupt file behind. Losing the rolling windows
//! across a restart is acceptable; model identity, retrain state, and the
//! audit counters are not.

use crate::error::MonitorError;
use crate::models::PersistedState;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct StatePersistence {
    path: PathBuf,
}

impl StatePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a snapshot atomically.
    pub fn store(&self, state: &PersistedState) -> Result<(), MonitorError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                MonitorError::persistence(format!("create {}: {e}", parent.display()))
            })?;
        }

        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| MonitorError::persistence(format!("serialize snapshot: {e}")))?;

        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path).map_err(|e| {
            MonitorError::persistence(format!("create {}: {e}", temp_path.display()))
        })?;
        file.write_all(&json)
            .map_err(|e| MonitorError::persistence(format!("write snapshot: {e}")))?;
        file.sync_all()
            .map_err(|e| MonitorError::persistence(format!("sync snapshot: {e}")))?;
        fs::rename(&temp_path, &self.path).map_err(|e| {
            MonitorError::persistence(format!(
                "rename {} to {}: {e}",
                temp_path.display(),
                self.path.display()
            ))
        })?;

        debug!(path = %self.path.display(), "State snapshot written");
        Ok(())
    }

    /// Read the last snapshot; `None` when no snapshot exists yet.
    pub fn load(&self) -> Result<Option<PersistedState>, MonitorError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read(&self.path)
            .map_err(|e| MonitorError::persistence(format!("read {}: {e}", self.path.display())))?;
        let state = serde_json::from_slice(&data)
            .map_err(|e| MonitorError::persistence(format!("decode snapshot: {e}")))?;
        Ok(Some(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AuditCounters, RetrainState};
    use tempfile::TempDir;

    fn snapshot(retrain_state: RetrainState) -> PersistedState {
        PersistedState {
            model_version: "voc_predictor-v20250101_120000".to_string(),
            retrain_state,
            counters: AuditCounters {
                messages: 100,
                parse_errors: 2,
                predictions: 95,
                retrains_triggered: 1,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_store_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let persistence = StatePersistence::new(dir.path().join("monitor_state.json"));

        for state in [RetrainState::Idle, RetrainState::InProgress] {
            let written = snapshot(state);
            persistence.store(&written).unwrap();
            let restored = persistence.load().unwrap().unwrap();
            assert_eq!(restored, written);
        }
    }

    #[test]
    fn test_load_missing_snapshot_is_none() {
        let dir = TempDir::new().unwrap();
        let persistence = StatePersistence::new(dir.path().join("monitor_state.json"));
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn test_store_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let persistence = StatePersistence::new(dir.path().join("state/nested/monitor_state.json"));
        persistence.store(&snapshot(RetrainState::Idle)).unwrap();
        assert!(persistence.path().exists());
    }

    #[test]
    fn test_corrupt_snapshot_is_a_persistence_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("monitor_state.json");
        fs::write(&path, b"{ not json").unwrap();

        let persistence = StatePersistence::new(path);
        let err = persistence.load().unwrap_err();
        assert!(matches!(err, MonitorError::Persistence { .. }));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let persistence = StatePersistence::new(dir.path().join("monitor_state.json"));
        persistence.store(&snapshot(RetrainState::Idle)).unwrap();
        assert!(!dir.path().join("monitor_state.tmp").exists());
    }
}
