#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Background Removal Pipeline
//!
//! Takes a user-supplied image through local compression, upload to a
//! remove.bg-compatible service and durable storage of the returned
//! transparent PNG.
//!
//! ## Features
//!
//! - **Lossless pre-compression**: inputs are re-encoded as PNG and the
//!   smaller of `{compressed, original}` is uploaded
//! - **Streaming upload** with per-chunk progress through an ordered event stream
//! - **Structured errors**: provider failures keep their `title : detail : code` entries
//! - **Per-input state machine** observable through a watch channel
//! - **CLI Integration**: optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bg_remover::{ImageStore, PipelineConfig, PipelineOrchestrator, PipelineOutcome};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::builder()
//!     .api_key("my-key")
//!     .project_dir("/tmp/Bg-remover")
//!     .build()?;
//! let orchestrator = PipelineOrchestrator::from_config(&config)?;
//!
//! let mut run = orchestrator.start(ImageStore::handle_for("beach.jpg").await?).await?;
//! while let Some(status) = run.changed().await {
//!     println!("{} {}%", status.state, status.progress_percent);
//! }
//! if let PipelineOutcome::Done(output) = run.wait().await {
//!     println!("saved to {}", output.handle.path.display());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing without a network
//!
//! [`MockRemovalClient`] replays a scripted event sequence through the same
//! ordering rules as the HTTP client:
//!
//! ```rust,no_run
//! use bg_remover::{ImageStore, MockRemovalClient, PipelineOrchestrator, PngCompressor};
//! use std::sync::Arc;
//!
//! let store = ImageStore::new("/tmp/Bg-remover");
//! let orchestrator = PipelineOrchestrator::new(
//!     store.clone(),
//!     Arc::new(PngCompressor::new(store)),
//!     Arc::new(MockRemovalClient::succeeding(vec![0x89, b'P', b'N', b'G'])),
//! );
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress bars and subscriber setup
//! - `tracing-json`: JSON output for the tracing subscriber
//! - `webp-support`: WebP input decoding

#[cfg(feature = "cli")]
pub mod cli;
pub mod client;
pub mod collaborators;
pub mod compressor;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod store;
pub mod tracing_config;
pub mod types;

pub use client::{ClientEvent, ClientEvents, HttpRemovalClient, MockRemovalClient, RemovalClient};
pub use collaborators::{
    AlwaysGranted, ChoicePrompt, FileImageSource, FixedChoice, ImageSource, OutputAction,
    Permission, PermissionGate, StaticPermission,
};
pub use compressor::{Compressor, PngCompressor};
pub use config::{OutputSize, PipelineConfig, PipelineConfigBuilder};
pub use error::{PipelineError, Result};
pub use pipeline::{
    PipelineOrchestrator, PipelineOutcome, PipelineRequest, PipelineRun, PipelineState,
    PipelineStatus,
};
pub use services::{
    ConsoleStatusReporter, NoOpStatusReporter, RecordingStatusReporter, StatusReporter,
    StatusUpdate,
};
pub use store::{is_already_processed, resolve_output_name, ImageStore};
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};
#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use types::{format_error_details, ErrorDetail, ImageHandle, OutputImage};
