//! In-memory job table.
//!
//! Locking discipline: the table-wide `RwLock` only guards the map itself
//! (insert, remove, lookup, iteration) and is never held while an entry is
//! locked for longer than a clone. Each record sits behind its own `Mutex`,
//! so updates to different jobs never contend. Callers must not hold an
//! entry lock across an `.await`, file I/O, or the OCR process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use uuid::Uuid;

use crate::error::JobError;
use crate::job::JobRecord;

/// Shared handle to one job's record.
pub type JobEntry = Arc<Mutex<JobRecord>>;

#[derive(Debug, Default)]
pub struct JobTable {
    entries: RwLock<HashMap<Uuid, JobEntry>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a new job. Ids are unique for the lifetime of an entry.
    pub fn insert(&self, record: JobRecord) -> Result<JobEntry, JobError> {
        let id = record.id;
        let mut entries = self.write();
        if entries.contains_key(&id) {
            return Err(JobError::DuplicateId(id));
        }

        let entry = Arc::new(Mutex::new(record));
        entries.insert(id, Arc::clone(&entry));
        Ok(entry)
    }

    pub fn entry(&self, id: &Uuid) -> Option<JobEntry> {
        self.read().get(id).cloned()
    }

    /// Returns a copy of the record as it is right now.
    pub fn get(&self, id: &Uuid) -> Option<JobRecord> {
        self.entry(id).map(|entry| lock_entry(&entry).clone())
    }

    /// Applies `f` to the record under its entry lock and returns the updated copy.
    pub fn update<T, F>(&self, id: &Uuid, f: F) -> Option<(T, JobRecord)>
    where
        F: FnOnce(&mut JobRecord) -> T,
    {
        let entry = self.entry(id)?;
        let mut record = lock_entry(&entry);
        let out = f(&mut record);
        Some((out, record.clone()))
    }

    pub fn remove(&self, id: &Uuid) -> Option<JobRecord> {
        let entry = self.write().remove(id)?;
        let record = lock_entry(&entry).clone();
        Some(record)
    }

    /// Copies every record. Each copy is taken under that record's lock, so a
    /// half-applied transition is never observed.
    pub fn snapshot(&self) -> Vec<JobRecord> {
        let entries: Vec<JobEntry> = self.read().values().cloned().collect();
        entries
            .iter()
            .map(|entry| lock_entry(entry).clone())
            .collect()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.read().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, JobEntry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job table lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, JobEntry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job table lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Locks a single job entry, recovering from poisoning.
pub fn lock_entry(entry: &JobEntry) -> MutexGuard<'_, JobRecord> {
    match entry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Job entry lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
