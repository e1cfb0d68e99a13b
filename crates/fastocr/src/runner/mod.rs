//! Executes OCR jobs and drives their state transitions.

pub mod engine;

pub use engine::{OcrEngine, OcrMyPdf, OcrOutcome, OcrRequest};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{error, info, warn};

use crate::error::{JobError, RunnerError};
use crate::events::{JobEvent, JobEvents};
use crate::job::{JobRecord, Lang, LAUNCH_FAILURE_EXIT_CODE};
use crate::limiter::ExecutionLimiter;
use crate::store::StateStore;
use crate::table::{lock_entry, JobEntry};

pub struct OcrRunner {
    engine: Arc<dyn OcrEngine>,
    limiter: ExecutionLimiter,
    store: StateStore,
    base_dir: PathBuf,
    events: JobEvents,
}

impl OcrRunner {
    pub fn new(
        engine: Arc<dyn OcrEngine>,
        limiter: ExecutionLimiter,
        store: StateStore,
        base_dir: PathBuf,
        events: JobEvents,
    ) -> Self {
        Self {
            engine,
            limiter,
            store,
            base_dir,
            events,
        }
    }

    pub fn engine(&self) -> &Arc<dyn OcrEngine> {
        &self.engine
    }

    pub fn limiter(&self) -> &ExecutionLimiter {
        &self.limiter
    }

    /// Runs one job to completion: waits for a limiter slot, moves the job to
    /// `processing`, invokes the engine, then records `done` or `error`.
    ///
    /// Anything the OCR command does wrong ends up in the record. An `Err` is
    /// only returned when the record refuses a transition.
    pub async fn run(&self, entry: JobEntry) -> Result<JobRecord, JobError> {
        let _permit = self.limiter.acquire().await;

        let (record, request) = {
            let mut record = lock_entry(&entry);
            record.start_processing(Utc::now())?;
            (record.clone(), self.request_for(&record))
        };
        self.persist(&record);
        self.events.send(JobEvent::status(record.id, record.status));
        info!(
            "Processing job {} ({})",
            record.id,
            Lang::join(&record.languages)
        );

        let started = Instant::now();
        let (exit_code, text) = match request {
            Ok(request) => match self.engine.run(&request).await {
                Ok(outcome) => (outcome.exit_code, outcome.output),
                Err(e) => {
                    error!("OCR for job {} could not start: {}", record.id, e);
                    (LAUNCH_FAILURE_EXIT_CODE, e.to_string())
                }
            },
            Err(e) => {
                error!("OCR for job {} could not start: {}", record.id, e);
                (LAUNCH_FAILURE_EXIT_CODE, e.to_string())
            }
        };

        let record = {
            let mut record = lock_entry(&entry);
            record.finish(exit_code, text, Utc::now())?;
            record.clone()
        };
        self.persist(&record);
        self.events.send(JobEvent::status(record.id, record.status));

        info!(
            "Job {} finished: {} (exit code {}) in {:.1}s",
            record.id,
            record.status,
            exit_code,
            started.elapsed().as_secs_f64()
        );
        Ok(record)
    }

    fn request_for(&self, record: &JobRecord) -> Result<OcrRequest, RunnerError> {
        Ok(OcrRequest {
            languages: Lang::join(&record.languages),
            input: relative_to(&record.input_path, &self.base_dir)?,
            output: relative_to(&record.output_path, &self.base_dir)?,
            sidecar_text: relative_to(&record.sidecar_text_path, &self.base_dir)?,
        })
    }

    fn persist(&self, record: &JobRecord) {
        if let Err(e) = self.store.persist(record) {
            warn!("Failed to persist job {}: {}", record.id, e);
        }
    }
}

/// Expresses `path` relative to `base`. Relative inputs are taken to be
/// relative to `base` already.
pub fn relative_to(path: &Path, base: &Path) -> Result<PathBuf, RunnerError> {
    if path.is_relative() {
        return Ok(path.to_path_buf());
    }

    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .map_err(|_| RunnerError::OutsideBaseDir {
            path: path.to_path_buf(),
            base: base.to_path_buf(),
        })
}
