use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Glob matched against the work directory to find state files.
pub const STATE_FILE_GLOB: &str = "o_*_*.json";

/// The four files that make up a job. They are created and purged together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub input: PathBuf,
    pub output: PathBuf,
    pub sidecar_text: PathBuf,
    pub state_file: PathBuf,
}

impl JobPaths {
    /// Lays out `i_<id>_<expiry>.pdf` and `o_<id>_<expiry>.{pdf,txt,json}` under `workdir`.
    pub fn new(workdir: &Path, id: Uuid, expires_at: DateTime<Utc>) -> Self {
        let stem = format!("{}_{}", id, expires_at.timestamp());
        Self {
            input: workdir.join(format!("i_{}.pdf", stem)),
            output: workdir.join(format!("o_{}.pdf", stem)),
            sidecar_text: workdir.join(format!("o_{}.txt", stem)),
            state_file: workdir.join(format!("o_{}.json", stem)),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [
            &self.input,
            &self.output,
            &self.sidecar_text,
            &self.state_file,
        ]
    }
}
