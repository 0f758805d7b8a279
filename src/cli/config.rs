//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{Cli, CliOutputSize};
use crate::config::{OutputSize, PipelineConfig};
use anyhow::{Context, Result};

/// Convert CLI arguments to a validated [`PipelineConfig`]
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from `--config` (or defaults) and apply the flags on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let mut config = match &cli.config {
            Some(path) => PipelineConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(api_key) = &cli.api_key {
            config.api_key.clone_from(api_key);
        }
        if let Some(endpoint) = &cli.endpoint {
            config.endpoint.clone_from(endpoint);
        }
        if let Some(dir) = &cli.project_dir {
            config.project_dir.clone_from(dir);
        }
        if let Some(timeout) = cli.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(chunk_size) = cli.chunk_size {
            config.upload_chunk_size = chunk_size;
        }
        if let Some(size) = cli.size {
            config.output_size = match size {
                CliOutputSize::Auto => OutputSize::Auto,
                CliOutputSize::Preview => OutputSize::Preview,
                CliOutputSize::Full => OutputSize::Full,
            };
        }
        if cli.keep_working_copies {
            config.keep_working_copies = true;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_cli_flags_override_defaults() {
        let cli = Cli::parse_from([
            "bg-remover",
            "beach.jpg",
            "--api-key",
            "secret",
            "--project-dir",
            "/tmp/project",
            "--timeout",
            "30",
            "--size",
            "preview",
            "--keep-working-copies",
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();

        assert_eq!(config.api_key, "secret");
        assert_eq!(config.project_dir, PathBuf::from("/tmp/project"));
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.output_size, OutputSize::Preview);
        assert!(config.keep_working_copies);
        assert_eq!(config.endpoint, crate::config::DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_cli_rejects_invalid_values() {
        let cli = Cli::parse_from(["bg-remover", "a.jpg", "--api-key="]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());

        let cli = Cli::parse_from(["bg-remover", "a.jpg", "--api-key", "k", "--timeout", "0"]);
        assert!(CliConfigBuilder::from_cli(&cli).is_err());
    }

    #[test]
    fn test_cli_layers_over_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api_key":"from-file","timeout_secs":45,"output_size":"full"}"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "bg-remover".into(),
            "a.jpg".into(),
            "--config".into(),
            path.into_os_string(),
            "--timeout".into(),
            "60".into(),
        ]);
        let config = CliConfigBuilder::from_cli(&cli).unwrap();
        // The environment may also supply a key; either source is non-empty
        assert!(!config.api_key.is_empty());
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.output_size, OutputSize::Full);
    }
}
