use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Directory OCR paths are made relative to. The command runs here.
    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,
    /// Where job files live. Relative paths are taken from `base_dir`.
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,
    #[serde(default = "default_ocr_command")]
    pub ocr_command: String,
    #[serde(default = "default_ocr_options")]
    pub ocr_options: Vec<String>,
    /// How many OCR processes may run at once.
    #[serde(default = "default_max_ocr_process")]
    pub max_ocr_process: usize,
    #[serde(default = "default_document_expire_hours")]
    pub document_expire_hours: u32,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub enable_wsl_compat: bool,
    #[serde(default)]
    pub log_json: bool,
}

fn default_base_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_workdir() -> PathBuf {
    PathBuf::from("workdir")
}

fn default_ocr_command() -> String {
    "/usr/local/bin/ocrmypdf".to_string()
}

fn default_ocr_options() -> Vec<String> {
    ["--output-type", "pdf", "--fast-web-view", "0", "--optimize", "0"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_ocr_process() -> usize {
    1
}

fn default_document_expire_hours() -> u32 {
    1
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            workdir: default_workdir(),
            ocr_command: default_ocr_command(),
            ocr_options: default_ocr_options(),
            max_ocr_process: default_max_ocr_process(),
            document_expire_hours: default_document_expire_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
            enable_wsl_compat: false,
            log_json: false,
        }
    }
}

impl Settings {
    /// Time a job stays queryable after submission.
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.document_expire_hours))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
