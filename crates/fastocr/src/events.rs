//! Job lifecycle event broadcasting.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::job::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Received,
    Processing,
    Done,
    Error,
    /// The job and its files were purged.
    Purged,
}

impl From<JobStatus> for JobEventKind {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Received => JobEventKind::Received,
            JobStatus::Processing => JobEventKind::Processing,
            JobStatus::Done => JobEventKind::Done,
            JobStatus::Error => JobEventKind::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub kind: JobEventKind,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn status(job_id: Uuid, status: JobStatus) -> Self {
        Self {
            job_id,
            kind: status.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn purged(job_id: Uuid) -> Self {
        Self {
            job_id,
            kind: JobEventKind::Purged,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobEvents {
    sender: broadcast::Sender<JobEvent>,
}

impl JobEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn send(&self, event: JobEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for JobEvents {
    fn default() -> Self {
        Self::new(256)
    }
}
