//! Drives one request per input through compression, submission and storage

use super::request::{EventEffect, PipelineOutcome, PipelineRequest, PipelineState, PipelineStatus};
use crate::{
    client::{HttpRemovalClient, RemovalClient},
    collaborators::{AlwaysGranted, Permission, PermissionGate},
    compressor::{Compressor, PngCompressor},
    config::PipelineConfig,
    error::{PipelineError, Result},
    services::{NoOpStatusReporter, StatusReporter, StatusUpdate},
    store::{is_already_processed, resolve_output_name, ImageStore},
    tracing_config::spans,
    types::{ErrorDetail, ImageHandle, OutputImage},
};
use instant::Instant;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

type InFlightSet = Arc<Mutex<HashSet<PathBuf>>>;

/// Holds an input's slot in the in-flight set until dropped
struct InFlightGuard {
    set: InFlightSet,
    key: PathBuf,
}

impl InFlightGuard {
    fn acquire(set: &InFlightSet, key: PathBuf) -> Result<Self> {
        let mut active = set
            .lock()
            .map_err(|_| PipelineError::internal("in-flight registry poisoned"))?;
        if !active.insert(key.clone()) {
            return Err(PipelineError::AlreadyInFlight(key));
        }
        Ok(Self {
            set: Arc::clone(set),
            key,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.set.lock() {
            active.remove(&self.key);
        }
    }
}

/// Handle to a started request
///
/// The status is observable at any time; [`PipelineRun::wait`] resolves once
/// the request reaches a terminal state.
#[derive(Debug)]
pub struct PipelineRun {
    input: ImageHandle,
    status: watch::Receiver<PipelineStatus>,
    completion: RunCompletion,
}

#[derive(Debug)]
enum RunCompletion {
    Ready(PipelineOutcome),
    Running(JoinHandle<PipelineOutcome>),
}

impl PipelineRun {
    #[must_use]
    pub fn input(&self) -> &ImageHandle {
        &self.input
    }

    /// Latest published status
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.status.borrow().clone()
    }

    /// Wait for the next status change; `None` once no more changes can occur
    pub async fn changed(&mut self) -> Option<PipelineStatus> {
        self.status.changed().await.ok()?;
        Some(self.status.borrow_and_update().clone())
    }

    /// Independent receiver for the status surface
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status.clone()
    }

    /// Wait for the terminal outcome
    pub async fn wait(self) -> PipelineOutcome {
        match self.completion {
            RunCompletion::Ready(outcome) => outcome,
            RunCompletion::Running(handle) => handle.await.unwrap_or_else(|e| {
                log::error!("Pipeline task for {} aborted: {}", self.input.path.display(), e);
                PipelineOutcome::Failed(vec![ErrorDetail::new(
                    "Internal error",
                    format!("pipeline task aborted: {}", e),
                    None,
                )])
            }),
        }
    }
}

/// Publishes request snapshots to the watch channel and the reporter
struct Publisher {
    tx: watch::Sender<PipelineStatus>,
    reporter: Arc<dyn StatusReporter>,
    input: PathBuf,
    started: Instant,
    last_state: PipelineState,
    last_progress: u8,
}

impl Publisher {
    fn new(
        request: &PipelineRequest,
        reporter: Arc<dyn StatusReporter>,
    ) -> (Self, watch::Receiver<PipelineStatus>) {
        let (tx, rx) = watch::channel(request.status());
        let publisher = Self {
            tx,
            reporter,
            input: request.input_image().path.clone(),
            started: Instant::now(),
            last_state: request.state(),
            last_progress: request.progress_percent(),
        };
        (publisher, rx)
    }

    /// Publish a non-terminal snapshot; terminal ones wait for [`Publisher::finish`]
    fn publish(&mut self, request: &PipelineRequest) {
        if request.state().is_terminal() {
            return;
        }
        self.send(request);
    }

    /// Publish the terminal snapshot once the run holds no resources
    fn finish(mut self, request: &PipelineRequest) {
        self.send(request);
    }

    fn send(&mut self, request: &PipelineRequest) {
        let state = request.state();
        let progress = request.progress_percent();
        if state == self.last_state && progress == self.last_progress {
            return;
        }

        let update = StatusUpdate::new(self.input.clone(), state, progress, self.started);
        if state == self.last_state {
            self.reporter.report_progress(update);
        } else {
            self.reporter.report_state(update);
        }
        if state == PipelineState::Error {
            self.reporter.report_error(&self.input, request.error_details());
        }
        if let Some(outcome) = request.outcome() {
            self.reporter.report_completion(&self.input, &outcome);
        }

        self.last_state = state;
        self.last_progress = progress;
        self.tx.send_replace(request.status());
    }
}

/// Everything a spawned run needs, cloned out of the orchestrator
#[derive(Clone)]
struct RunContext {
    compressor: Arc<dyn Compressor>,
    client: Arc<dyn RemovalClient>,
    store: ImageStore,
    keep_working_copies: bool,
}

/// Coordinates compression, submission and storage for each input
///
/// One orchestrator serves any number of inputs concurrently, but at most one
/// request per input path is in flight at a time.
///
/// # Examples
///
/// ```rust,no_run
/// use bg_remover::{ImageStore, PipelineConfig, PipelineOrchestrator, PipelineOutcome};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = PipelineConfig::builder().api_key("my-key").build()?;
/// let orchestrator = PipelineOrchestrator::from_config(&config)?;
///
/// let input = ImageStore::handle_for("beach.jpg").await?;
/// match orchestrator.process(input).await? {
///     PipelineOutcome::Done(output) => println!("saved {}", output.handle.path.display()),
///     PipelineOutcome::AlreadyProcessed => println!("nothing to do"),
///     PipelineOutcome::Failed(details) => eprintln!("{:?}", details),
/// }
/// # Ok(())
/// # }
/// ```
pub struct PipelineOrchestrator {
    context: RunContext,
    permission: Arc<dyn PermissionGate>,
    reporter: Arc<dyn StatusReporter>,
    in_flight: InFlightSet,
}

impl PipelineOrchestrator {
    /// Create an orchestrator from explicit collaborators
    pub fn new(
        store: ImageStore,
        compressor: Arc<dyn Compressor>,
        client: Arc<dyn RemovalClient>,
    ) -> Self {
        Self {
            context: RunContext {
                compressor,
                client,
                store,
                keep_working_copies: false,
            },
            permission: Arc::new(AlwaysGranted),
            reporter: Arc::new(NoOpStatusReporter),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Wire the PNG compressor and HTTP client from a configuration
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Failed to create HTTP client
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let store = ImageStore::new(&config.project_dir);
        let client = HttpRemovalClient::new(config)?;
        Ok(Self::new(
            store.clone(),
            Arc::new(PngCompressor::new(store)),
            Arc::new(client),
        )
        .keep_working_copies(config.keep_working_copies))
    }

    #[must_use]
    pub fn with_permission_gate(mut self, gate: Arc<dyn PermissionGate>) -> Self {
        self.permission = gate;
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn StatusReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Keep compressed working copies instead of deleting them after a run
    #[must_use]
    pub fn keep_working_copies(mut self, keep: bool) -> Self {
        self.context.keep_working_copies = keep;
        self
    }

    #[must_use]
    pub fn store(&self) -> &ImageStore {
        &self.context.store
    }

    /// Whether a request for `input` is currently running
    #[must_use]
    pub fn is_in_flight(&self, input: &ImageHandle) -> bool {
        self.in_flight
            .lock()
            .map(|active| active.contains(&input.path))
            .unwrap_or(false)
    }

    /// Start a request for `input`
    ///
    /// Inputs whose name already carries the processed marker finish
    /// immediately as `AlreadyProcessed` without contacting the service.
    ///
    /// # Errors
    /// - `NoImageSelected` for a zero-length input
    /// - `PermissionDenied` when the gate refuses storage access
    /// - `AlreadyInFlight` while a request for the same input is running
    pub async fn start(&self, input: ImageHandle) -> Result<PipelineRun> {
        if input.is_empty() {
            return Err(PipelineError::NoImageSelected);
        }

        if self.permission.request_permission().await == Permission::Denied {
            log::warn!("Storage permission denied; not starting {}", input.path.display());
            return Err(PipelineError::PermissionDenied);
        }

        let mut request = PipelineRequest::new(input.clone());
        let (publisher, status) = Publisher::new(&request, Arc::clone(&self.reporter));

        if is_already_processed(&input.file_name()) {
            log::info!("{} already has its background removed", input.path.display());
            request.start(true)?;
            publisher.finish(&request);
            return Ok(PipelineRun {
                input,
                status,
                completion: RunCompletion::Ready(PipelineOutcome::AlreadyProcessed),
            });
        }

        let guard = InFlightGuard::acquire(&self.in_flight, input.path.clone())?;
        let span = spans::pipeline_run(&input.path, input.size_bytes);
        let context = self.context.clone();
        let handle = tokio::spawn(drive(context, request, publisher, guard).instrument(span));

        Ok(PipelineRun {
            input,
            status,
            completion: RunCompletion::Running(handle),
        })
    }

    /// Start a request and wait for its outcome
    pub async fn process(&self, input: ImageHandle) -> Result<PipelineOutcome> {
        Ok(self.start(input).await?.wait().await)
    }
}

async fn drive(
    context: RunContext,
    mut request: PipelineRequest,
    mut publisher: Publisher,
    guard: InFlightGuard,
) -> PipelineOutcome {
    let mut working_copy = None;
    let result = execute(&context, &mut request, &mut publisher, &mut working_copy).await;

    if let Err(error) = result {
        if !request.state().is_terminal() {
            crate::tracing_config::events::error_with_context(&error, "pipeline run");
            if let Err(e) = request.fail(error.into_details()) {
                log::error!("Could not record failure: {}", e);
            }
        }
    }

    if let Some(copy) = working_copy {
        if !context.keep_working_copies {
            if let Err(e) = context.store.remove(&copy).await {
                log::warn!("Could not remove working copy: {}", e);
            }
        }
    }

    // Observers that see the terminal state may restart the same input
    drop(guard);

    let outcome = request.outcome().unwrap_or_else(|| {
        PipelineOutcome::Failed(vec![ErrorDetail::new(
            "Internal error",
            format!("request ended in non-terminal state {:?}", request.state()),
            None,
        )])
    });
    publisher.finish(&request);
    outcome
}

async fn execute(
    context: &RunContext,
    request: &mut PipelineRequest,
    publisher: &mut Publisher,
    working_copy: &mut Option<ImageHandle>,
) -> Result<()> {
    let input = request.input_image().clone();

    request.start(false)?;
    publisher.publish(request);

    let compressed = match context
        .compressor
        .compress(&input)
        .instrument(spans::compression(&input.path))
        .await
    {
        Ok(candidate) => {
            *working_copy = Some(candidate.clone());
            Some(candidate)
        },
        Err(PipelineError::Decode(reason)) => {
            log::warn!("Compression skipped, submitting original: {}", reason);
            None
        },
        Err(e) => return Err(e),
    };
    request.candidate_ready(compressed)?;
    publisher.publish(request);

    let (derived, _discarded) = request.select_candidate()?;
    log::debug!(
        "Submitting {} ({} bytes, input {} bytes)",
        derived.path.display(),
        derived.size_bytes,
        input.size_bytes
    );
    publisher.publish(request);

    let mut events = context.client.submit(derived);
    let mut result = None;
    while let Some(event) = events.next_event().await {
        match request.on_client_event(event)? {
            EventEffect::Continue => publisher.publish(request),
            EventEffect::ResultReady(bytes) => {
                publisher.publish(request);
                result = Some(bytes);
                break;
            },
            EventEffect::Failed => {
                publisher.publish(request);
                return Ok(());
            },
        }
    }
    let bytes = result.ok_or_else(|| PipelineError::Remote(vec![ErrorDetail::generic()]))?;

    let handle = context
        .store
        .save(&resolve_output_name(&input.file_name()), &bytes)
        .await?;
    request.saved(OutputImage {
        handle,
        derived_from_input: input,
    })?;
    publisher.publish(request);
    Ok(())
}
