//! Configuration types for the background removal pipeline

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default remove.bg-compatible endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";

/// Directory name used under the user's pictures folder
pub const PROJECT_DIR_NAME: &str = "Bg-remover";

const MIN_CHUNK_SIZE: usize = 1024;
const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;
const MAX_TIMEOUT_SECS: u64 = 600;

/// Resolution requested from the remote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSize {
    /// Highest resolution the account allows
    Auto,
    /// Low resolution preview
    Preview,
    /// Full resolution
    Full,
}

impl Default for OutputSize {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for OutputSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Preview => write!(f, "preview"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// Immutable configuration handed to the orchestrator at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding working copies and outputs
    pub project_dir: PathBuf,

    /// API key sent as `X-Api-Key`
    pub api_key: String,

    /// Removal endpoint URL
    pub endpoint: String,

    /// Whole-request timeout in seconds
    pub timeout_secs: u64,

    /// Upload chunk size; progress is reported once per chunk
    pub upload_chunk_size: usize,

    /// Requested output resolution
    pub output_size: OutputSize,

    /// Keep compressed working copies after the run ends
    pub keep_working_copies: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project_dir: default_project_dir(),
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 120,
            upload_chunk_size: 64 * 1024,
            output_size: OutputSize::default(),
            keep_working_copies: false,
        }
    }
}

/// `<Pictures>/Bg-remover`, or `./Bg-remover` when no pictures dir exists
#[must_use]
pub fn default_project_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PROJECT_DIR_NAME)
}

impl PipelineConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bg_remover::PipelineConfig;
    ///
    /// let config = PipelineConfig::builder()
    ///     .api_key("my-key")
    ///     .project_dir("/tmp/bg-remover")
    ///     .timeout_secs(30)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.timeout_secs, 30);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load a JSON configuration file; missing fields take defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::file_io_error("read config file", path, &e))?;
        serde_json::from_str(&raw).map_err(|e| {
            PipelineError::invalid_config(format!(
                "Failed to parse config '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Empty API key
    /// - Empty endpoint
    /// - Timeout outside 1-600 seconds
    /// - Upload chunk size outside 1 KiB - 16 MiB
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(PipelineError::invalid_config("API key must not be empty"));
        }

        if self.endpoint.trim().is_empty() {
            return Err(PipelineError::invalid_config("Endpoint must not be empty"));
        }

        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(PipelineError::config_value_error(
                "timeout",
                self.timeout_secs,
                "1-600",
                Some(120),
            ));
        }

        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.upload_chunk_size) {
            return Err(PipelineError::config_value_error(
                "upload chunk size",
                self.upload_chunk_size,
                "1024-16777216",
                Some(64 * 1024),
            ));
        }

        Ok(())
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn project_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.project_dir = dir.into();
        self
    }

    #[must_use]
    pub fn api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.api_key = key.into();
        self
    }

    #[must_use]
    pub fn endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn upload_chunk_size(mut self, bytes: usize) -> Self {
        self.config.upload_chunk_size = bytes;
        self
    }

    #[must_use]
    pub fn output_size(mut self, size: OutputSize) -> Self {
        self.config.output_size = size;
        self
    }

    #[must_use]
    pub fn keep_working_copies(mut self, keep: bool) -> Self {
        self.config.keep_working_copies = keep;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> PipelineConfigBuilder {
        PipelineConfig::builder().api_key("key")
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.output_size, OutputSize::Auto);
        assert!(config.project_dir.ends_with(PROJECT_DIR_NAME));
        assert!(!config.keep_working_copies);
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let err = PipelineConfig::builder().build().unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_timeout_bounds() {
        assert!(valid().timeout_secs(1).build().is_ok());
        assert!(valid().timeout_secs(600).build().is_ok());

        let err = valid().timeout_secs(0).build().unwrap_err();
        assert!(err.to_string().contains("timeout"));
        assert!(valid().timeout_secs(601).build().is_err());
    }

    #[test]
    fn test_chunk_size_bounds() {
        assert!(valid().upload_chunk_size(1024).build().is_ok());
        assert!(valid().upload_chunk_size(1023).build().is_err());
        assert!(valid().upload_chunk_size(MAX_CHUNK_SIZE + 1).build().is_err());
    }

    #[test]
    fn test_json_round_trip_with_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_key":"abc","output_size":"preview"}"#).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.api_key, "abc");
        assert_eq!(config.output_size, OutputSize::Preview);
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn test_json_parse_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_output_size_display() {
        assert_eq!(OutputSize::Auto.to_string(), "auto");
        assert_eq!(OutputSize::Full.to_string(), "full");
    }
}
