//! Shared test utilities for fastocr integration tests.
//!
//! - `TestHarness` owns a temporary base directory with a work directory
//! - `MockEngine` stands in for ocrmypdf and records how it was called

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::Notify;

use fastocr::{
    JobRecord, Lang, OcrEngine, OcrOutcome, OcrRequest, OcrService, RunnerError, Settings,
    StateStore,
};

/// Isolated base directory plus resolved settings pointing into it.
pub struct TestHarness {
    temp_dir: TempDir,
    pub settings: Settings,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    /// Builds a harness after letting the caller adjust the default settings.
    pub fn with_settings<F: FnOnce(&mut Settings)>(adjust: F) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut settings = Settings {
            base_dir: temp_dir.path().to_path_buf(),
            workdir: PathBuf::from("workdir"),
            ..Settings::default()
        };
        adjust(&mut settings);
        let settings = settings.resolve().expect("Failed to resolve settings");

        Self { temp_dir, settings }
    }

    pub fn base_dir(&self) -> &Path {
        &self.settings.base_dir
    }

    pub fn workdir(&self) -> &Path {
        &self.settings.workdir
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.workdir())
    }

    /// Starts a service over this harness with the given engine.
    pub async fn start(&self, engine: Arc<MockEngine>) -> OcrService {
        OcrService::start(self.settings.clone(), engine)
            .await
            .expect("Failed to start service")
    }

    /// Writes a job with all of its files directly into the work directory,
    /// as a previous run of the service would have left it.
    pub fn seed_job(&self, created_at: chrono::DateTime<Utc>, with_output: bool) -> JobRecord {
        let record = JobRecord::create(
            self.workdir(),
            langs(&[Lang::Eng]),
            created_at,
            self.settings.ttl(),
        )
        .expect("Failed to create record");

        std::fs::write(&record.input_path, b"%PDF-1.4 input").unwrap();
        std::fs::write(&record.sidecar_text_path, b"seeded text").unwrap();
        if with_output {
            std::fs::write(&record.output_path, b"%PDF-1.4 output").unwrap();
        }
        self.store().persist(&record).expect("Failed to persist record");
        record
    }

    /// Number of files currently in the work directory.
    pub fn workdir_file_count(&self) -> usize {
        std::fs::read_dir(self.workdir())
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }
}

pub fn langs(codes: &[Lang]) -> BTreeSet<Lang> {
    codes.iter().copied().collect()
}

/// Fake OCR engine. Copies the input to the output, writes the sidecar
/// transcript and answers with a fixed exit code and text.
pub struct MockEngine {
    base_dir: PathBuf,
    exit_code: i32,
    text: String,
    delay: Duration,
    gate: Option<Arc<Notify>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    calls: Mutex<Vec<OcrRequest>>,
}

impl MockEngine {
    pub fn new(base_dir: &Path, exit_code: i32, text: &str) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            exit_code,
            text: text.to_string(),
            delay: Duration::ZERO,
            gate: None,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes every run wait for a `notify_one` on `gate` before finishing.
    pub fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<OcrRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of overlapping `run` calls observed.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for MockEngine {
    async fn run(&self, request: &OcrRequest) -> Result<OcrOutcome, RunnerError> {
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now_running, Ordering::SeqCst);
        self.calls.lock().unwrap().push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if self.exit_code == 0 {
            let input = self.base_dir.join(&request.input);
            let _ = std::fs::copy(&input, self.base_dir.join(&request.output));
            let _ = std::fs::write(self.base_dir.join(&request.sidecar_text), &self.text);
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(OcrOutcome {
            exit_code: self.exit_code,
            output: self.text.clone(),
        })
    }

    async fn version(&self) -> Result<String, RunnerError> {
        Ok("mock 1.0".to_string())
    }
}
