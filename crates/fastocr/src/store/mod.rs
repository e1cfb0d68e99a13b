//! Durable job state: one JSON file per job next to its PDFs.
//!
//! Every transition rewrites the whole record, so after a crash the state
//! file always reflects the last status the process reached. On startup
//! [`StateStore::reconcile`] rebuilds the job table from those files.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::error::StateError;
use crate::job::paths::STATE_FILE_GLOB;
use crate::job::JobRecord;

/// Reads and writes job state files inside a work directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    workdir: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(workdir: P) -> Self {
        Self {
            workdir: workdir.as_ref().to_path_buf(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Overwrites the record's state file with its current contents.
    ///
    /// The JSON is written to a sibling temp file and renamed into place, so
    /// readers never see a partially written record.
    pub fn persist(&self, record: &JobRecord) -> Result<(), StateError> {
        let path = &record.state_file_path;
        let json = serde_json::to_vec_pretty(record).map_err(|e| StateError::Serialize {
            id: record.id,
            source: e,
        })?;

        let tmp = tmp_path(path);
        let write_err = |e| StateError::Write {
            path: path.clone(),
            source: e,
        };

        {
            let mut file = std::fs::File::create(&tmp).map_err(write_err)?;
            file.write_all(&json).map_err(write_err)?;
            file.sync_all().map_err(write_err)?;
        }
        std::fs::rename(&tmp, path).map_err(write_err)?;

        debug!("Persisted job {} ({})", record.id, record.status);
        Ok(())
    }

    /// Reads a state file. Unreadable files, malformed JSON and records that
    /// break the job invariants are all reported as `CorruptState`.
    pub fn load(path: &Path) -> Result<JobRecord, StateError> {
        let corrupt = |reason: String| StateError::CorruptState {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read(path).map_err(|e| corrupt(e.to_string()))?;
        let record: JobRecord =
            serde_json::from_slice(&content).map_err(|e| corrupt(e.to_string()))?;
        record.validate().map_err(|e| corrupt(e.to_string()))?;

        if record.state_file_path != path {
            debug!(
                "State file {:?} records its location as {:?}",
                path, record.state_file_path
            );
        }

        Ok(record)
    }

    /// Scans the work directory and returns the records worth keeping.
    ///
    /// A record is kept only when it has not expired and its output PDF is
    /// still on disk. Every other record has its files deleted. Corrupt
    /// state files are logged and left alone.
    pub fn reconcile(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>, StateError> {
        let _span = tracing::info_span!("store.reconcile", workdir = %self.workdir.display())
            .entered();

        let mut kept = Vec::new();
        let mut seen = HashSet::new();
        let mut dropped = 0usize;

        for path in self.state_files()? {
            let record = match Self::load(&path) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping state file: {}", e);
                    continue;
                }
            };

            if !seen.insert(record.id) {
                warn!("Duplicate state file for job {} at {:?}", record.id, path);
                continue;
            }

            if !record.is_expired(now) && record.output_path.exists() {
                info!("Loaded existing job {}", record.id);
                kept.push(record);
            } else {
                info!("Deleting stale job {}", record.id);
                delete_files(&record);
                dropped += 1;
            }
        }

        info!(
            "Reconciled {}: {} kept, {} dropped",
            self.workdir.display(),
            kept.len(),
            dropped
        );
        Ok(kept)
    }

    /// Loads the state file of one job, if there is one.
    pub fn find(&self, id: Uuid) -> Result<Option<JobRecord>, StateError> {
        match self.glob_files(&format!("o_{}_*.json", id))?.first() {
            Some(path) => Self::load(path).map(Some),
            None => Ok(None),
        }
    }

    fn state_files(&self) -> Result<Vec<PathBuf>, StateError> {
        self.glob_files(STATE_FILE_GLOB)
    }

    fn glob_files(&self, file_pattern: &str) -> Result<Vec<PathBuf>, StateError> {
        let dir = self.workdir.to_string_lossy();
        let pattern = format!("{}/{}", glob::Pattern::escape(&dir), file_pattern);

        let entries = glob::glob(&pattern).map_err(|e| StateError::Pattern {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })?;

        let mut files = Vec::new();
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => warn!("Cannot read state file candidate: {}", e),
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Removes the four files of a job. Missing files are not an error.
/// Returns how many files were actually removed.
pub fn delete_files(record: &JobRecord) -> usize {
    let paths = record.paths();
    let mut removed = 0;

    for path in paths.all() {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {:?} for job {}: {}", path, record.id, e),
        }
    }
    // Leftover from an interrupted persist.
    let _ = std::fs::remove_file(tmp_path(&paths.state_file));

    removed
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, Lang};
    use chrono::Duration;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn langs() -> BTreeSet<Lang> {
        [Lang::Eng, Lang::Deu].into_iter().collect()
    }

    fn record_in(dir: &Path, created_at: DateTime<Utc>) -> JobRecord {
        JobRecord::create(dir, langs(), created_at, Duration::hours(1)).unwrap()
    }

    fn touch_all(record: &JobRecord) {
        std::fs::write(&record.input_path, b"%PDF-1.4 input").unwrap();
        std::fs::write(&record.output_path, b"%PDF-1.4 output").unwrap();
        std::fs::write(&record.sidecar_text_path, b"text").unwrap();
    }

    #[test]
    fn test_persist_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let mut record = record_in(dir.path(), Utc::now());

        store.persist(&record).unwrap();
        assert_eq!(StateStore::load(&record.state_file_path).unwrap(), record);

        record.start_processing(Utc::now()).unwrap();
        record
            .finish(0, "page 1 processed".to_string(), Utc::now())
            .unwrap();
        store.persist(&record).unwrap();

        let loaded = StateStore::load(&record.state_file_path).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.status, JobStatus::Done);
        assert!(!tmp_path(&record.state_file_path).exists());
    }

    #[test]
    fn test_state_file_uses_record_field_names() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let record = record_in(dir.path(), Utc::now());
        store.persist(&record).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&record.state_file_path).unwrap()).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "id",
            "languages",
            "status",
            "input_path",
            "output_path",
            "sidecar_text_path",
            "state_file_path",
            "result_text",
            "exit_code",
            "created_at",
            "processing_started_at",
            "finished_at",
            "expires_at",
        ] {
            assert!(object.contains_key(key), "missing key {}", key);
        }
        assert_eq!(object.len(), 13);
        assert_eq!(value["status"], "received");
        assert_eq!(value["languages"], serde_json::json!(["eng", "deu"]));
    }

    #[test]
    fn test_load_garbage_is_corrupt_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("o_x_1.json");
        std::fs::write(&path, b"{ not json").unwrap();

        match StateStore::load(&path) {
            Err(StateError::CorruptState { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected CorruptState, got {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file_is_corrupt_state() {
        let dir = TempDir::new().unwrap();
        let result = StateStore::load(&dir.path().join("o_missing_1.json"));
        assert!(matches!(result, Err(StateError::CorruptState { .. })));
    }

    #[test]
    fn test_load_rejects_inconsistent_record() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let mut record = record_in(dir.path(), Utc::now());
        record.status = JobStatus::Done;
        store.persist(&record).unwrap();

        assert!(matches!(
            StateStore::load(&record.state_file_path),
            Err(StateError::CorruptState { .. })
        ));
    }

    #[test]
    fn test_reconcile_keeps_live_and_drops_stale() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let now = Utc::now();

        let live = record_in(dir.path(), now);
        touch_all(&live);
        store.persist(&live).unwrap();

        let expired = record_in(dir.path(), now - Duration::hours(2));
        touch_all(&expired);
        store.persist(&expired).unwrap();

        let no_output = record_in(dir.path(), now);
        touch_all(&no_output);
        std::fs::remove_file(&no_output.output_path).unwrap();
        store.persist(&no_output).unwrap();

        std::fs::write(dir.path().join("o_broken_1.json"), b"[]").unwrap();

        let kept = store.reconcile(now).unwrap();
        assert_eq!(kept, vec![live.clone()]);

        for path in expired.paths().all() {
            assert!(!path.exists(), "{:?} should be deleted", path);
        }
        for path in no_output.paths().all() {
            assert!(!path.exists(), "{:?} should be deleted", path);
        }
        for path in live.paths().all() {
            assert!(path.exists(), "{:?} should be kept", path);
        }
        // corrupt files are skipped, not removed
        assert!(dir.path().join("o_broken_1.json").exists());
    }

    #[test]
    fn test_find_by_id() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let record = record_in(dir.path(), Utc::now());
        store.persist(&record).unwrap();

        assert_eq!(store.find(record.id).unwrap(), Some(record));
        assert_eq!(store.find(Uuid::new_v4()).unwrap(), None);
    }

    #[test]
    fn test_reconcile_empty_directory() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        assert!(store.reconcile(Utc::now()).unwrap().is_empty());
    }

    #[test]
    fn test_delete_files_tolerates_missing() {
        let dir = TempDir::new().unwrap();
        let record = record_in(dir.path(), Utc::now());
        std::fs::write(&record.input_path, b"x").unwrap();

        assert_eq!(delete_files(&record), 1);
        assert_eq!(delete_files(&record), 0);
        assert!(!record.input_path.exists());
    }
}
