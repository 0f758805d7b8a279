//! Status reporting service
//!
//! Separates the reporting of pipeline state changes from the orchestration
//! logic, so that each frontend (CLI, GUI, tests) can present them its own way.

use crate::{
    pipeline::{PipelineOutcome, PipelineState},
    types::{format_error_details, ErrorDetail},
};
use instant::Instant;
use std::path::PathBuf;

/// State change for one request
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    /// Input image the request belongs to
    pub input: PathBuf,
    /// New state
    pub state: PipelineState,
    /// Upload progress (0-100)
    pub progress: u8,
    /// Elapsed time since the request started (milliseconds)
    pub elapsed_ms: u64,
}

impl StatusUpdate {
    #[must_use]
    pub fn new(input: PathBuf, state: PipelineState, progress: u8, start_time: Instant) -> Self {
        Self {
            input,
            state,
            progress,
            elapsed_ms: start_time.elapsed().as_millis() as u64,
        }
    }
}

/// Receives state and progress changes from the orchestrator
pub trait StatusReporter: Send + Sync {
    /// Report a state transition
    fn report_state(&self, update: StatusUpdate);

    /// Report upload progress while the state stays `Uploading`
    fn report_progress(&self, update: StatusUpdate) {
        drop(update);
    }

    /// Report the ordered failure details of a request
    fn report_error(&self, input: &std::path::Path, details: &[ErrorDetail]);

    /// Report the terminal outcome of a request
    fn report_completion(&self, input: &std::path::Path, outcome: &PipelineOutcome);
}

/// Reporter that discards everything
pub struct NoOpStatusReporter;

impl StatusReporter for NoOpStatusReporter {
    fn report_state(&self, _update: StatusUpdate) {}

    fn report_error(&self, _input: &std::path::Path, _details: &[ErrorDetail]) {}

    fn report_completion(&self, _input: &std::path::Path, _outcome: &PipelineOutcome) {}
}

/// Reporter writing status lines through `log`
pub struct ConsoleStatusReporter {
    verbose: bool,
}

impl ConsoleStatusReporter {
    /// Create a console reporter
    ///
    /// # Arguments
    /// * `verbose` - Also log upload progress and elapsed times
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl StatusReporter for ConsoleStatusReporter {
    fn report_state(&self, update: StatusUpdate) {
        if self.verbose {
            log::info!(
                "[{}] {} ({}ms elapsed)",
                update.input.display(),
                update.state.description(),
                update.elapsed_ms
            );
        } else {
            log::info!("[{}] {}", update.input.display(), update.state.description());
        }
    }

    fn report_progress(&self, update: StatusUpdate) {
        if self.verbose {
            log::info!("[{}] Uploading {}%", update.input.display(), update.progress);
        }
    }

    fn report_error(&self, input: &std::path::Path, details: &[ErrorDetail]) {
        for line in format_error_details(details).lines() {
            log::error!("[{}] {}", input.display(), line);
        }
    }

    fn report_completion(&self, input: &std::path::Path, outcome: &PipelineOutcome) {
        match outcome {
            PipelineOutcome::Done(output) => log::info!(
                "[{}] Saved {} ({} bytes)",
                input.display(),
                output.handle.path.display(),
                output.handle.size_bytes
            ),
            PipelineOutcome::AlreadyProcessed => {
                log::info!("[{}] Background already removed", input.display());
            },
            PipelineOutcome::Failed(details) => {
                log::warn!(
                    "[{}] Failed with {} error(s)",
                    input.display(),
                    details.len()
                );
            },
        }
    }
}

/// Records every callback, for assertions in tests
#[derive(Debug, Default)]
pub struct RecordingStatusReporter {
    states: std::sync::Mutex<Vec<PipelineState>>,
    progress: std::sync::Mutex<Vec<u8>>,
    errors: std::sync::Mutex<Vec<ErrorDetail>>,
    outcomes: std::sync::Mutex<Vec<PipelineOutcome>>,
}

impl RecordingStatusReporter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn states(&self) -> Vec<PipelineState> {
        self.states.lock().map(|g| g.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn progress(&self) -> Vec<u8> {
        self.progress.lock().map(|g| g.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn errors(&self) -> Vec<ErrorDetail> {
        self.errors.lock().map(|g| g.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn outcomes(&self) -> Vec<PipelineOutcome> {
        self.outcomes.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl StatusReporter for RecordingStatusReporter {
    fn report_state(&self, update: StatusUpdate) {
        if let Ok(mut states) = self.states.lock() {
            states.push(update.state);
        }
    }

    fn report_progress(&self, update: StatusUpdate) {
        if let Ok(mut progress) = self.progress.lock() {
            progress.push(update.progress);
        }
    }

    fn report_error(&self, _input: &std::path::Path, details: &[ErrorDetail]) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.extend_from_slice(details);
        }
    }

    fn report_completion(&self, _input: &std::path::Path, outcome: &PipelineOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push(outcome.clone());
        }
    }
}

/// Reporter drawing an upload bar with indicatif
#[cfg(feature = "cli")]
pub struct ProgressBarStatusReporter {
    bar: indicatif::ProgressBar,
}

#[cfg(feature = "cli")]
impl ProgressBarStatusReporter {
    #[must_use]
    pub fn new() -> Self {
        let bar = indicatif::ProgressBar::new(100);
        if let Ok(style) = indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        Self { bar }
    }
}

#[cfg(feature = "cli")]
impl Default for ProgressBarStatusReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "cli")]
impl StatusReporter for ProgressBarStatusReporter {
    fn report_state(&self, update: StatusUpdate) {
        self.bar.set_position(u64::from(update.progress));
        self.bar.set_message(update.state.description());
    }

    fn report_progress(&self, update: StatusUpdate) {
        self.bar.set_position(u64::from(update.progress));
    }

    fn report_error(&self, _input: &std::path::Path, details: &[ErrorDetail]) {
        for line in format_error_details(details).lines() {
            self.bar.println(line);
        }
    }

    fn report_completion(&self, input: &std::path::Path, outcome: &PipelineOutcome) {
        match outcome {
            PipelineOutcome::Done(output) => self
                .bar
                .finish_with_message(format!("Saved {}", output.handle.path.display())),
            PipelineOutcome::AlreadyProcessed => self.bar.finish_with_message(format!(
                "{} already has its background removed",
                input.display()
            )),
            PipelineOutcome::Failed(_) => self.bar.abandon_with_message("Failed"),
        }
    }
}

/// Pick the reporter for the CLI: a progress bar with `--progress`, log lines otherwise
#[cfg(feature = "cli")]
#[must_use]
pub fn create_cli_status_reporter(
    enable_progress: bool,
    verbose: bool,
) -> std::sync::Arc<dyn StatusReporter> {
    if enable_progress {
        std::sync::Arc::new(ProgressBarStatusReporter::new())
    } else {
        std::sync::Arc::new(ConsoleStatusReporter::new(verbose))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_recording_reporter_collects_callbacks() {
        let reporter = RecordingStatusReporter::new();
        let start = Instant::now();
        reporter.report_state(StatusUpdate::new(
            PathBuf::from("/p/a.jpg"),
            PipelineState::Compressing,
            0,
            start,
        ));
        reporter.report_progress(StatusUpdate::new(
            PathBuf::from("/p/a.jpg"),
            PipelineState::Uploading,
            42,
            start,
        ));
        reporter.report_error(
            Path::new("/p/a.jpg"),
            &[ErrorDetail::new("Auth", "bad key", None)],
        );
        reporter.report_completion(Path::new("/p/a.jpg"), &PipelineOutcome::AlreadyProcessed);

        assert_eq!(reporter.states(), vec![PipelineState::Compressing]);
        assert_eq!(reporter.progress(), vec![42]);
        assert_eq!(reporter.errors()[0].title, "Auth");
        assert_eq!(reporter.outcomes(), vec![PipelineOutcome::AlreadyProcessed]);
    }

    #[test]
    fn test_console_and_noop_reporters_accept_all_callbacks() {
        let details = vec![ErrorDetail::generic()];
        for reporter in [
            Box::new(NoOpStatusReporter) as Box<dyn StatusReporter>,
            Box::new(ConsoleStatusReporter::new(true)),
            Box::new(ConsoleStatusReporter::new(false)),
        ] {
            let update =
                StatusUpdate::new(PathBuf::from("x.png"), PipelineState::Saving, 100, Instant::now());
            reporter.report_state(update.clone());
            reporter.report_progress(update);
            reporter.report_error(Path::new("x.png"), &details);
            reporter.report_completion(Path::new("x.png"), &PipelineOutcome::Failed(details.clone()));
        }
    }
}
