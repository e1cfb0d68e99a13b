//! Job records and their on-disk layout.

pub mod lang;
pub mod paths;
pub mod record;

pub use lang::{parse_languages, Lang};
pub use paths::JobPaths;
pub use record::{JobRecord, JobStatus, LAUNCH_FAILURE_EXIT_CODE};
