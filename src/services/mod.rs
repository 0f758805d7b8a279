//! Services separating frontend concerns from the pipeline

pub mod status;

pub use status::{
    ConsoleStatusReporter, NoOpStatusReporter, RecordingStatusReporter, StatusReporter,
    StatusUpdate,
};
#[cfg(feature = "cli")]
pub use status::{create_cli_status_reporter, ProgressBarStatusReporter};
