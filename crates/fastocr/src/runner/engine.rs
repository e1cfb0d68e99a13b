use std::path::{Path, PathBuf};
use std::process::ExitStatus;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::Settings;
use crate::error::RunnerError;

/// What the OCR command is asked to do. Paths are relative to the engine's
/// base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrRequest {
    /// `+` joined language codes, e.g. `eng+fra`.
    pub languages: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub sidecar_text: PathBuf,
}

/// How the OCR command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOutcome {
    pub exit_code: i32,
    /// stdout followed by stderr, trimmed.
    pub output: String,
}

impl OcrOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// The external OCR program.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Runs OCR for one document. A non-zero exit is an `Ok` outcome; only
    /// failing to start the program is an error.
    async fn run(&self, request: &OcrRequest) -> Result<OcrOutcome, RunnerError>;

    /// Reports the engine version string.
    async fn version(&self) -> Result<String, RunnerError>;
}

/// Runs `ocrmypdf` (or a compatible command) as a child process.
#[derive(Debug, Clone)]
pub struct OcrMyPdf {
    command: String,
    options: Vec<String>,
    base_dir: PathBuf,
    wsl_compat: bool,
}

impl OcrMyPdf {
    pub fn new<P: AsRef<Path>>(command: &str, options: Vec<String>, base_dir: P) -> Self {
        Self {
            command: command.to_string(),
            options,
            base_dir: base_dir.as_ref().to_path_buf(),
            wsl_compat: false,
        }
    }

    /// Engine described by `settings`: command, options, WSL mode, and
    /// `base_dir` as the working directory.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            &settings.ocr_command,
            settings.ocr_options.clone(),
            &settings.base_dir,
        )
        .with_wsl_compat(settings.enable_wsl_compat)
    }

    /// Launches the command through `wsl` for Windows hosts running ocrmypdf
    /// inside WSL.
    pub fn with_wsl_compat(mut self, enabled: bool) -> Self {
        self.wsl_compat = enabled;
        self
    }

    /// Arguments after the program name, in ocrmypdf order.
    pub fn args(&self, request: &OcrRequest) -> Vec<String> {
        let mut args = Vec::with_capacity(self.options.len() + 6);
        if self.wsl_compat {
            args.push(self.command.clone());
        }
        args.extend(self.options.iter().cloned());
        args.push("-l".to_string());
        args.push(request.languages.clone());
        args.push("--sidecar".to_string());
        args.push(posix(&request.sidecar_text));
        args.push(posix(&request.input));
        args.push(posix(&request.output));
        args
    }

    fn program(&self) -> &str {
        if self.wsl_compat {
            "wsl"
        } else {
            &self.command
        }
    }

    fn command_line(&self) -> String {
        if self.wsl_compat {
            format!("wsl {}", self.command)
        } else {
            self.command.clone()
        }
    }
}

#[async_trait]
impl OcrEngine for OcrMyPdf {
    async fn run(&self, request: &OcrRequest) -> Result<OcrOutcome, RunnerError> {
        let args = self.args(request);
        log::debug!("Running {} {}", self.program(), args.join(" "));

        let output = Command::new(self.program())
            .args(&args)
            .current_dir(&self.base_dir)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| RunnerError::Launch {
                command: self.command_line(),
                source: e,
            })?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);

        Ok(OcrOutcome {
            exit_code: exit_code(output.status),
            output: String::from_utf8_lossy(&combined).trim().to_string(),
        })
    }

    async fn version(&self) -> Result<String, RunnerError> {
        let mut command = Command::new(self.program());
        if self.wsl_compat {
            command.arg(&self.command);
        }

        let output = command
            .arg("--version")
            .current_dir(&self.base_dir)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| RunnerError::Launch {
                command: self.command_line(),
                source: e,
            })?;

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Renders a relative path with forward slashes.
fn posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Exit code as a shell would report it: `128 + signal` when killed.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
