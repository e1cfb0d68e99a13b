//! The OCR job service: submission, queries and lifecycle.
//!
//! [`OcrService::start`] reconciles the work directory, fills the job table
//! and starts the expiration sweeper before any job can be submitted.
//! Submissions return as soon as the job is recorded; OCR runs on a spawned
//! task gated by the execution limiter.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::{error, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{validate_settings, Settings};
use crate::error::{FastOcrError, QueryError, RunnerError, SubmitError};
use crate::events::{JobEvent, JobEvents};
use crate::job::{JobRecord, Lang};
use crate::limiter::ExecutionLimiter;
use crate::runner::{OcrEngine, OcrMyPdf, OcrRunner};
use crate::store::StateStore;
use crate::sweeper::ExpirationSweeper;
use crate::table::JobTable;

pub struct OcrService {
    settings: Settings,
    table: Arc<JobTable>,
    store: StateStore,
    runner: Arc<OcrRunner>,
    sweeper: Arc<ExpirationSweeper>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
    workers: Mutex<JoinSet<()>>,
    events: JobEvents,
    accepting: AtomicBool,
}

impl OcrService {
    /// Starts the service with the `ocrmypdf` engine described by `settings`.
    pub async fn from_settings(settings: Settings) -> Result<Self, FastOcrError> {
        let settings = settings.resolve()?;
        let engine = OcrMyPdf::from_settings(&settings);
        Self::start(settings, Arc::new(engine)).await
    }

    /// Starts the service with a custom engine. `settings` must already be
    /// resolved (absolute, existing work directory).
    pub async fn start(
        settings: Settings,
        engine: Arc<dyn OcrEngine>,
    ) -> Result<Self, FastOcrError> {
        validate_settings(&settings)?;
        let table = Arc::new(JobTable::new());
        let store = StateStore::new(&settings.workdir);
        let events = JobEvents::default();

        let mut loaded = 0;
        for record in store.reconcile(Utc::now())? {
            let id = record.id;
            match table.insert(record) {
                Ok(_) => loaded += 1,
                Err(e) => warn!("Not restoring job {}: {}", id, e),
            }
        }
        info!("Restored {} jobs from {}", loaded, settings.workdir.display());

        let runner = Arc::new(OcrRunner::new(
            engine,
            ExecutionLimiter::new(settings.max_ocr_process),
            store.clone(),
            settings.base_dir.clone(),
            events.clone(),
        ));

        let sweeper = Arc::new(ExpirationSweeper::new(
            Arc::clone(&table),
            events.clone(),
            settings.sweep_interval(),
        ));
        let sweeper_handle = sweeper.start();

        Ok(Self {
            settings,
            table,
            store,
            runner,
            sweeper,
            sweeper_handle: Mutex::new(Some(sweeper_handle)),
            workers: Mutex::new(JoinSet::new()),
            events,
            accepting: AtomicBool::new(true),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn table(&self) -> &Arc<JobTable> {
        &self.table
    }

    pub fn sweeper(&self) -> &Arc<ExpirationSweeper> {
        &self.sweeper
    }

    pub fn limiter(&self) -> &ExecutionLimiter {
        self.runner.limiter()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Submits a document held in memory.
    pub async fn submit_bytes(
        &self,
        languages: BTreeSet<Lang>,
        content: &[u8],
    ) -> Result<JobRecord, SubmitError> {
        let record = self.prepare(languages)?;
        if let Err(e) = tokio::fs::write(&record.input_path, content).await {
            let _ = tokio::fs::remove_file(&record.input_path).await;
            return Err(SubmitError::CopyInput {
                path: record.input_path,
                source: e,
            });
        }
        self.admit(record).await
    }

    /// Submits a document by copying `source` into the work directory.
    pub async fn submit_file(
        &self,
        languages: BTreeSet<Lang>,
        source: &Path,
    ) -> Result<JobRecord, SubmitError> {
        let record = self.prepare(languages)?;
        if let Err(e) = tokio::fs::copy(source, &record.input_path).await {
            let _ = tokio::fs::remove_file(&record.input_path).await;
            return Err(SubmitError::CopyInput {
                path: source.to_path_buf(),
                source: e,
            });
        }
        self.admit(record).await
    }

    fn prepare(&self, languages: BTreeSet<Lang>) -> Result<JobRecord, SubmitError> {
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SubmitError::ShuttingDown);
        }
        if languages.is_empty() {
            return Err(SubmitError::NoLanguages);
        }

        Ok(JobRecord::create(
            &self.settings.workdir,
            languages,
            Utc::now(),
            self.settings.ttl(),
        )?)
    }

    /// Records a job whose input file is in place and schedules its OCR run.
    /// On refusal the input file is removed again.
    async fn admit(&self, record: JobRecord) -> Result<JobRecord, SubmitError> {
        match self.schedule(&record) {
            Ok(()) => Ok(record),
            Err(e) => {
                if let Err(io) = tokio::fs::remove_file(&record.input_path).await {
                    warn!("Failed to remove input of refused job {}: {}", record.id, io);
                }
                Err(e)
            }
        }
    }

    fn schedule(&self, record: &JobRecord) -> Result<(), SubmitError> {
        let id = record.id;
        // `shutdown` clears `accepting` under this lock before draining, so a
        // job either lands in the drained set or is refused here.
        let mut workers = self.workers();
        if !self.accepting.load(Ordering::Acquire) {
            return Err(SubmitError::ShuttingDown);
        }

        let entry = self.table.insert(record.clone())?;
        if let Err(e) = self.store.persist(record) {
            warn!("Failed to persist new job {}: {}", id, e);
        }
        self.events.send(JobEvent::status(id, record.status));
        info!("Received job {} ({})", id, Lang::join(&record.languages));

        let runner = Arc::clone(&self.runner);
        let span = tracing::info_span!("ocr.job", job_id = %id);
        // Reap finished tasks so the set only tracks live jobs.
        while workers.try_join_next().is_some() {}
        workers.spawn(
            async move {
                if let Err(e) = runner.run(entry).await {
                    error!("Job {} violated its state machine: {}", id, e);
                }
            }
            .instrument(span),
        );

        Ok(())
    }

    /// Current state of a job.
    pub fn get(&self, id: Uuid) -> Result<JobRecord, QueryError> {
        self.table.get(&id).ok_or(QueryError::NotFound(id))
    }

    pub fn list(&self) -> Vec<JobRecord> {
        let mut records = self.table.snapshot();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Path of the OCR'd PDF, if the job exists and the file is there.
    pub fn output_pdf(&self, id: Uuid) -> Result<PathBuf, QueryError> {
        let record = self.get(id)?;
        existing(record.output_path, id)
    }

    /// Path of the plain-text transcript, if the job exists and the file is there.
    pub fn output_text(&self, id: Uuid) -> Result<PathBuf, QueryError> {
        let record = self.get(id)?;
        existing(record.sidecar_text_path, id)
    }

    /// Waits until the job reaches `done` or `error`. Returns `NotFound` if
    /// the job is unknown or gets purged while waiting.
    pub async fn wait(&self, id: Uuid) -> Result<JobRecord, QueryError> {
        let mut rx = self.events.subscribe();
        loop {
            let record = self.get(id)?;
            if record.status.is_terminal() {
                return Ok(record);
            }

            match rx.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return self.get(id),
            }
        }
    }

    pub async fn engine_version(&self) -> Result<String, RunnerError> {
        self.runner.engine().version().await
    }

    /// Stops accepting jobs, stops the sweeper and waits for running OCR
    /// jobs to finish. Started OCR processes are not interrupted.
    pub async fn shutdown(&self) {
        let mut workers = {
            let mut guard = self.workers();
            self.accepting.store(false, Ordering::Release);
            std::mem::take(&mut *guard)
        };
        self.sweeper.stop();

        let handle = lock(&self.sweeper_handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Expiration sweeper panicked: {}", e);
            }
        }

        if !workers.is_empty() {
            info!("Waiting for {} OCR jobs to finish", workers.len());
        }
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!("OCR task panicked: {}", e);
            }
        }
        info!("OCR service stopped");
    }

    fn workers(&self) -> MutexGuard<'_, JoinSet<()>> {
        lock(&self.workers)
    }
}

fn existing(path: PathBuf, id: Uuid) -> Result<PathBuf, QueryError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(QueryError::NotFound(id))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("OCR service lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl Drop for OcrService {
    fn drop(&mut self) {
        self.sweeper.stop();
    }
}
