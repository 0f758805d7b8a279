//! Interfaces to the platform around the pipeline
//!
//! Permission prompts, image pickers and action dialogs belong to the host
//! application. The pipeline only sees these narrow async seams.

use crate::{error::Result, store::ImageStore, types::ImageHandle};
use async_trait::async_trait;
use std::path::PathBuf;

/// Outcome of a storage permission request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Capability gate consulted before anything is written
#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn request_permission(&self) -> Permission;
}

/// Gate for environments without a permission model (desktop, CLI)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionGate for AlwaysGranted {
    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }
}

/// Gate answering with a fixed decision
#[derive(Debug, Clone, Copy)]
pub struct StaticPermission(pub Permission);

#[async_trait]
impl PermissionGate for StaticPermission {
    async fn request_permission(&self) -> Permission {
        self.0
    }
}

/// Source of raw input images (picker, camera, file argument)
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Acquire an image; `Ok(None)` means nothing usable was selected
    async fn acquire(&self) -> Result<Option<ImageHandle>>;
}

/// Acquisition from a path on disk
#[derive(Debug, Clone)]
pub struct FileImageSource {
    path: PathBuf,
}

impl FileImageSource {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ImageSource for FileImageSource {
    async fn acquire(&self) -> Result<Option<ImageHandle>> {
        let handle = ImageStore::handle_for(&self.path).await?;
        // Zero-length files count as "no image selected"
        if handle.is_empty() {
            return Ok(None);
        }
        Ok(Some(handle))
    }
}

/// What the user wants to do with a finished image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputAction {
    View,
    Dismiss,
    Share,
}

/// Generic choice dialog
#[async_trait]
pub trait ChoicePrompt: Send + Sync {
    /// Present `choices`; `None` when the prompt was dismissed
    async fn choose(&self, title: &str, choices: &[OutputAction]) -> Option<OutputAction>;
}

/// Prompt that always picks the same action when it is offered
#[derive(Debug, Clone, Copy)]
pub struct FixedChoice(pub OutputAction);

#[async_trait]
impl ChoicePrompt for FixedChoice {
    async fn choose(&self, title: &str, choices: &[OutputAction]) -> Option<OutputAction> {
        log::debug!("{}: choosing {:?}", title, self.0);
        choices.contains(&self.0).then_some(self.0)
    }
}
