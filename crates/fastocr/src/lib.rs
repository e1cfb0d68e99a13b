pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod limiter;
pub mod runner;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod table;
pub mod telemetry;

pub use config::{load_settings, Settings};
pub use error::{
    ConfigError, FastOcrError, JobError, QueryError, Result, RunnerError, StateError, SubmitError,
};
pub use events::{JobEvent, JobEventKind, JobEvents};
pub use job::{parse_languages, JobPaths, JobRecord, JobStatus, Lang};
pub use limiter::{ExecutionLimiter, ExecutionPermit};
pub use runner::{OcrEngine, OcrMyPdf, OcrOutcome, OcrRequest, OcrRunner};
pub use service::OcrService;
pub use store::StateStore;
pub use sweeper::ExpirationSweeper;
pub use table::{JobEntry, JobTable};
