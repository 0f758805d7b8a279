//! Per-input request state machine
//!
//! ```text
//! Idle ──► Compressing ──► SelectingCandidate ──► Uploading ──► RemoteProcessing ──► Saving ──► Done
//!   │           │                                     │                │               │
//!   ▼           └──────────────► Error ◄──────────────┴────────────────┴───────────────┘
//! AlreadyProcessed
//! ```
//!
//! `Done`, `AlreadyProcessed` and `Error` are terminal; every transition out
//! of them is rejected.

use crate::{
    client::ClientEvent,
    error::{PipelineError, Result},
    types::{ErrorDetail, ImageHandle, OutputImage},
};
use serde::Serialize;

/// Lifecycle state of one pipeline request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PipelineState {
    Idle,
    Compressing,
    SelectingCandidate,
    Uploading,
    RemoteProcessing,
    Saving,
    Done,
    AlreadyProcessed,
    Error,
}

impl PipelineState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::AlreadyProcessed | Self::Error)
    }

    /// Human-readable status line for the state
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Idle => "Waiting to start",
            Self::Compressing => "Compressing",
            Self::SelectingCandidate => "Selecting upload candidate",
            Self::Uploading => "Uploading",
            Self::RemoteProcessing => "Processing",
            Self::Saving => "Saving result",
            Self::Done => "Background removed",
            Self::AlreadyProcessed => "Background already removed",
            Self::Error => "Failed",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Snapshot of a request exposed to UI collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    pub state: PipelineState,
    pub progress_percent: u8,
    pub error_details: Vec<ErrorDetail>,
    pub output: Option<OutputImage>,
}

/// Final result of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Background removed and saved
    Done(OutputImage),
    /// Input already carried the processed marker; nothing was submitted
    AlreadyProcessed,
    /// Failed with a non-empty, ordered detail list
    Failed(Vec<ErrorDetail>),
}

/// What applying a client event did to the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventEffect {
    /// Still waiting for the terminal event
    Continue,
    /// Success arrived; the bytes must now be saved
    ResultReady(Vec<u8>),
    /// Error arrived; the request is terminal
    Failed,
}

/// Whichever of `{compressed, original}` gets submitted
///
/// The compressed candidate wins only when it is strictly smaller, so the
/// derived image never exceeds the input and ties keep the original.
/// Returns `(derived, discarded_candidate)`.
#[must_use]
pub fn choose_derived(
    input: &ImageHandle,
    compressed: Option<ImageHandle>,
) -> (ImageHandle, Option<ImageHandle>) {
    match compressed {
        Some(candidate) if candidate.size_bytes < input.size_bytes => (candidate, None),
        other => (input.clone(), other),
    }
}

/// One submission unit, owned by the orchestrator for the length of a run
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    input_image: ImageHandle,
    compressed: Option<ImageHandle>,
    derived_image: Option<ImageHandle>,
    state: PipelineState,
    progress_percent: u8,
    error_details: Vec<ErrorDetail>,
    output: Option<OutputImage>,
}

impl PipelineRequest {
    #[must_use]
    pub fn new(input_image: ImageHandle) -> Self {
        Self {
            input_image,
            compressed: None,
            derived_image: None,
            state: PipelineState::Idle,
            progress_percent: 0,
            error_details: Vec::new(),
            output: None,
        }
    }

    #[must_use]
    pub fn input_image(&self) -> &ImageHandle {
        &self.input_image
    }

    #[must_use]
    pub fn derived_image(&self) -> Option<&ImageHandle> {
        self.derived_image.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    #[must_use]
    pub fn error_details(&self) -> &[ErrorDetail] {
        &self.error_details
    }

    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            state: self.state,
            progress_percent: self.progress_percent,
            error_details: self.error_details.clone(),
            output: self.output.clone(),
        }
    }

    /// Terminal outcome, if the request has reached one
    #[must_use]
    pub fn outcome(&self) -> Option<PipelineOutcome> {
        match self.state {
            PipelineState::Done => self.output.clone().map(PipelineOutcome::Done),
            PipelineState::AlreadyProcessed => Some(PipelineOutcome::AlreadyProcessed),
            PipelineState::Error => Some(PipelineOutcome::Failed(self.error_details.clone())),
            _ => None,
        }
    }

    fn expect_state(&self, expected: PipelineState, action: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PipelineError::invalid_transition(format!(
                "cannot {} while {:?}",
                action, self.state
            )))
        }
    }

    /// `Idle → Compressing`, or `Idle → AlreadyProcessed`
    pub fn start(&mut self, already_processed: bool) -> Result<()> {
        self.expect_state(PipelineState::Idle, "start")?;
        self.state = if already_processed {
            PipelineState::AlreadyProcessed
        } else {
            PipelineState::Compressing
        };
        Ok(())
    }

    /// `Compressing → SelectingCandidate`; `None` means fall back to the original
    pub fn candidate_ready(&mut self, compressed: Option<ImageHandle>) -> Result<()> {
        self.expect_state(PipelineState::Compressing, "accept a compression result")?;
        self.compressed = compressed;
        self.state = PipelineState::SelectingCandidate;
        Ok(())
    }

    /// `SelectingCandidate → Uploading`, returning `(derived, discarded)`
    pub fn select_candidate(&mut self) -> Result<(ImageHandle, Option<ImageHandle>)> {
        self.expect_state(PipelineState::SelectingCandidate, "select a candidate")?;
        let (derived, discarded) = choose_derived(&self.input_image, self.compressed.take());
        self.derived_image = Some(derived.clone());
        self.progress_percent = 0;
        self.state = PipelineState::Uploading;
        Ok((derived, discarded))
    }

    /// Apply one client event in `Uploading` or `RemoteProcessing`
    pub fn on_client_event(&mut self, event: ClientEvent) -> Result<EventEffect> {
        match (self.state, event) {
            (PipelineState::Uploading, ClientEvent::Queued) => Ok(EventEffect::Continue),
            (PipelineState::Uploading, ClientEvent::UploadProgress(percent)) => {
                self.progress_percent = self.progress_percent.max(percent.min(100));
                Ok(EventEffect::Continue)
            },
            (PipelineState::Uploading, ClientEvent::Processing) => {
                self.state = PipelineState::RemoteProcessing;
                Ok(EventEffect::Continue)
            },
            // Stragglers after the upload finished carry no information
            (
                PipelineState::RemoteProcessing,
                ClientEvent::Queued | ClientEvent::UploadProgress(_) | ClientEvent::Processing,
            ) => Ok(EventEffect::Continue),
            (
                PipelineState::Uploading | PipelineState::RemoteProcessing,
                ClientEvent::Success(bytes),
            ) => {
                self.progress_percent = 100;
                self.state = PipelineState::Saving;
                Ok(EventEffect::ResultReady(bytes))
            },
            (
                PipelineState::Uploading | PipelineState::RemoteProcessing,
                ClientEvent::Error(details),
            ) => {
                self.fail(details)?;
                Ok(EventEffect::Failed)
            },
            (state, event) => Err(PipelineError::invalid_transition(format!(
                "event {:?} not accepted while {:?}",
                event_name(&event),
                state
            ))),
        }
    }

    /// `Saving → Done`
    pub fn saved(&mut self, output: OutputImage) -> Result<()> {
        self.expect_state(PipelineState::Saving, "record a saved output")?;
        self.output = Some(output);
        self.state = PipelineState::Done;
        Ok(())
    }

    /// Move to `Error`; an empty list is replaced with one generic entry
    pub fn fail(&mut self, details: Vec<ErrorDetail>) -> Result<()> {
        match self.state {
            PipelineState::Compressing
            | PipelineState::Uploading
            | PipelineState::RemoteProcessing
            | PipelineState::Saving => {
                self.error_details = if details.is_empty() {
                    vec![ErrorDetail::generic()]
                } else {
                    details
                };
                self.state = PipelineState::Error;
                Ok(())
            },
            state => Err(PipelineError::invalid_transition(format!(
                "cannot fail while {:?}",
                state
            ))),
        }
    }
}

fn event_name(event: &ClientEvent) -> &'static str {
    match event {
        ClientEvent::Queued => "Queued",
        ClientEvent::UploadProgress(_) => "UploadProgress",
        ClientEvent::Processing => "Processing",
        ClientEvent::Success(_) => "Success",
        ClientEvent::Error(_) => "Error",
    }
}
