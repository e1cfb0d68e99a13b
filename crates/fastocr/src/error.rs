use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::job::JobStatus;

#[derive(Error, Debug)]
pub enum FastOcrError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Submission error: {0}")]
    Submit(#[from] SubmitError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid value '{value}' for environment variable {name}")]
    InvalidEnv { name: String, value: String },

    #[error("Failed to create work directory '{path}': {source}")]
    CreateWorkdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum StateError {
    #[error("Corrupt state file '{path}': {reason}")]
    CorruptState { path: PathBuf, reason: String },

    #[error("Failed to write state file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize job {id}: {source}")]
    Serialize {
        id: Uuid,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid state file pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum JobError {
    #[error("Invalid transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {0} already exists")]
    DuplicateId(Uuid),

    #[error("At least one OCR language is required")]
    NoLanguages,

    #[error("Unknown OCR language '{0}'")]
    UnknownLanguage(String),

    #[error("Job {id} is inconsistent: {reason}")]
    Inconsistent { id: Uuid, reason: String },
}

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("At least one OCR language is required")]
    NoLanguages,

    #[error("Failed to store input file '{path}': {source}")]
    CopyInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Job(#[from] JobError),
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("Path '{path}' is not under base directory '{base}'")]
    OutsideBaseDir { path: PathBuf, base: PathBuf },

    #[error("Failed to launch '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueryError {
    #[error("Job {0} not found")]
    NotFound(Uuid),
}

pub type Result<T> = std::result::Result<T, FastOcrError>;
