use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;
use crate::job::lang::Lang;
use crate::job::paths::JobPaths;

/// Exit code recorded when the OCR command could not be started at all.
/// Matches what a shell reports for a missing command.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 127;

/// Status of an OCR job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Received,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one OCR job. This is also the exact shape of the JSON state file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub languages: BTreeSet<Lang>,
    pub status: JobStatus,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub sidecar_text_path: PathBuf,
    pub state_file_path: PathBuf,
    pub result_text: Option<String>,
    pub exit_code: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl JobRecord {
    /// Creates a `received` job with a fresh id and its files laid out under `workdir`.
    pub fn create(
        workdir: &Path,
        languages: BTreeSet<Lang>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, JobError> {
        Self::new_internal(Uuid::new_v4(), workdir, languages, created_at, ttl)
    }

    fn new_internal(
        id: Uuid,
        workdir: &Path,
        languages: BTreeSet<Lang>,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, JobError> {
        if languages.is_empty() {
            return Err(JobError::NoLanguages);
        }
        if ttl <= Duration::zero() {
            return Err(JobError::Inconsistent {
                id,
                reason: format!("non-positive ttl {}", ttl),
            });
        }

        let expires_at = created_at + ttl;
        let paths = JobPaths::new(workdir, id, expires_at);

        Ok(Self {
            id,
            languages,
            status: JobStatus::Received,
            input_path: paths.input,
            output_path: paths.output,
            sidecar_text_path: paths.sidecar_text,
            state_file_path: paths.state_file,
            result_text: None,
            exit_code: None,
            created_at,
            processing_started_at: None,
            finished_at: None,
            expires_at,
        })
    }

    pub fn paths(&self) -> JobPaths {
        JobPaths {
            input: self.input_path.clone(),
            output: self.output_path.clone(),
            sidecar_text: self.sidecar_text_path.clone(),
            state_file: self.state_file_path.clone(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// `received -> processing`.
    pub fn start_processing(&mut self, at: DateTime<Utc>) -> Result<(), JobError> {
        if self.status != JobStatus::Received {
            return Err(self.invalid_transition(JobStatus::Processing));
        }

        self.status = JobStatus::Processing;
        self.processing_started_at = Some(at.max(self.created_at));
        Ok(())
    }

    /// `processing -> done` when `exit_code` is 0, `processing -> error` otherwise.
    pub fn finish(
        &mut self,
        exit_code: i32,
        result_text: String,
        at: DateTime<Utc>,
    ) -> Result<JobStatus, JobError> {
        let next = if exit_code == 0 {
            JobStatus::Done
        } else {
            JobStatus::Error
        };
        if self.status != JobStatus::Processing {
            return Err(self.invalid_transition(next));
        }

        // The wall clock may step backwards; finished_at must stay after created_at.
        let floor = self.created_at + Duration::microseconds(1);
        let started = self.processing_started_at.unwrap_or(floor);

        self.status = next;
        self.exit_code = Some(exit_code);
        self.result_text = Some(result_text);
        self.finished_at = Some(at.max(floor).max(started));
        Ok(next)
    }

    /// Checks the record invariants. Used when loading records written by
    /// another process.
    pub fn validate(&self) -> Result<(), JobError> {
        let fail = |reason: &str| {
            Err(JobError::Inconsistent {
                id: self.id,
                reason: reason.to_string(),
            })
        };

        if self.languages.is_empty() {
            return fail("no languages");
        }
        if self.expires_at <= self.created_at {
            return fail("expires_at is not after created_at");
        }

        match self.status {
            JobStatus::Received => {
                if self.processing_started_at.is_some() || self.finished_at.is_some() {
                    return fail("received job carries processing timestamps");
                }
            }
            JobStatus::Processing => {
                if self.processing_started_at.is_none() {
                    return fail("processing job without processing_started_at");
                }
                if self.finished_at.is_some() {
                    return fail("processing job with finished_at");
                }
            }
            JobStatus::Done | JobStatus::Error => {
                let Some(finished_at) = self.finished_at else {
                    return fail("finished job without finished_at");
                };
                if finished_at <= self.created_at {
                    return fail("finished_at is not after created_at");
                }
                if self.processing_started_at.is_none() {
                    return fail("finished job without processing_started_at");
                }
            }
        }

        match (self.status, self.exit_code, self.result_text.is_some()) {
            (JobStatus::Received | JobStatus::Processing, None, false) => Ok(()),
            (JobStatus::Received | JobStatus::Processing, _, _) => {
                fail("unfinished job carries a result")
            }
            (JobStatus::Done, Some(0), true) => Ok(()),
            (JobStatus::Error, Some(code), true) if code != 0 => Ok(()),
            (JobStatus::Done, _, _) => fail("done job needs exit code 0 and a result"),
            (JobStatus::Error, _, _) => fail("error job needs a non-zero exit code and a result"),
        }
    }

    fn invalid_transition(&self, to: JobStatus) -> JobError {
        JobError::InvalidTransition {
            id: self.id,
            from: self.status,
            to,
        }
    }
}
