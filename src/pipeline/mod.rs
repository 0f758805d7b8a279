//! Request lifecycle and orchestration

mod orchestrator;
mod request;

pub use orchestrator::{PipelineOrchestrator, PipelineRun};
pub use request::{
    choose_derived, EventEffect, PipelineOutcome, PipelineRequest, PipelineState, PipelineStatus,
};
