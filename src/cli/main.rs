//! Background Removal CLI Tool
//!
//! Sends one image through the pipeline and stores the result in the
//! project directory.

use super::config::CliConfigBuilder;
use crate::{
    collaborators::{ChoicePrompt, FileImageSource, FixedChoice, ImageSource, OutputAction},
    pipeline::{PipelineOrchestrator, PipelineOutcome},
    services::create_cli_status_reporter,
    tracing_config::{init_cli_tracing, TracingFormat},
    types::{format_error_details, OutputImage},
    PipelineConfig,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use std::path::PathBuf;

/// Background removal CLI tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bg-remover")]
pub struct Cli {
    /// Input image file
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// API key for the removal service
    #[arg(long, env = "REMOVE_BG_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Removal endpoint URL
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Directory for working copies and results [default: <Pictures>/Bg-remover]
    #[arg(long, value_name = "PATH")]
    pub project_dir: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Requested output resolution
    #[arg(long, value_enum)]
    pub size: Option<CliOutputSize>,

    /// Upload chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Keep compressed working copies in the project directory
    #[arg(long)]
    pub keep_working_copies: bool,

    /// Export the result to <project>/shared/shared-no-bg.png
    #[arg(long)]
    pub share: bool,

    /// JSON configuration file; flags override its values
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format; RUST_LOG overrides the -v level
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Show an upload progress bar
    #[arg(long)]
    pub progress: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    /// Requires the `tracing-json` feature
    Json,
}

impl CliLogFormat {
    fn to_tracing_format(self) -> Result<TracingFormat> {
        match self {
            Self::Console => Ok(TracingFormat::Console),
            Self::Compact => Ok(TracingFormat::Compact),
            #[cfg(feature = "tracing-json")]
            Self::Json => Ok(TracingFormat::Json),
            #[cfg(not(feature = "tracing-json"))]
            Self::Json => anyhow::bail!("JSON logs need a build with the `tracing-json` feature"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputSize {
    Auto,
    Preview,
    Full,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;

    info!("Starting background removal CLI");
    info!("Input: {}", cli.input.display());
    info!(
        "Project directory: {}, output size: {}",
        config.project_dir.display(),
        config.output_size
    );

    let output = process_input(&cli, &config).await?;
    if let Some(output) = output {
        handle_output(&cli, &config, &output).await?;
    }
    Ok(())
}

fn init_tracing(verbose_count: u8, format: CliLogFormat) -> Result<()> {
    init_cli_tracing(verbose_count, format.to_tracing_format()?)
        .context("Failed to initialize tracing subscriber")
}

async fn process_input(cli: &Cli, config: &PipelineConfig) -> Result<Option<OutputImage>> {
    let input = FileImageSource::new(&cli.input)
        .acquire()
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?
        .with_context(|| format!("No image selected: {} is empty", cli.input.display()))?;

    let orchestrator = PipelineOrchestrator::from_config(config)
        .context("Failed to create pipeline")?
        .with_reporter(create_cli_status_reporter(cli.progress, cli.verbose > 0));

    match orchestrator.process(input).await? {
        PipelineOutcome::Done(output) => {
            println!("{}", output.handle.path.display());
            Ok(Some(output))
        },
        PipelineOutcome::AlreadyProcessed => {
            println!(
                "Background already removed from {}",
                cli.input.display()
            );
            Ok(None)
        },
        PipelineOutcome::Failed(details) => {
            eprint!("{}", format_error_details(&details));
            anyhow::bail!("Background removal failed for {}", cli.input.display())
        },
    }
}

async fn handle_output(cli: &Cli, config: &PipelineConfig, output: &OutputImage) -> Result<()> {
    let prompt = FixedChoice(if cli.share {
        OutputAction::Share
    } else {
        OutputAction::View
    });
    let choices = [OutputAction::View, OutputAction::Dismiss, OutputAction::Share];

    match prompt.choose("Choose action", &choices).await {
        Some(OutputAction::Share) => {
            let store = crate::store::ImageStore::new(&config.project_dir);
            let shared = store
                .export_shared(&output.handle)
                .await
                .context("Failed to export shared copy")?;
            println!("{}", shared.path.display());
        },
        Some(OutputAction::View) => {
            info!(
                "Result for {} written to {}",
                output.derived_from_input.path.display(),
                output.handle.path.display()
            );
        },
        Some(OutputAction::Dismiss) | None => warn!("No action chosen"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from([
            "bg-remover",
            "photo.jpg",
            "--share",
            "--progress",
            "-vv",
            "--size",
            "full",
            "--chunk-size",
            "4096",
        ]);
        assert_eq!(cli.input, PathBuf::from("photo.jpg"));
        assert!(cli.share);
        assert!(cli.progress);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.size, Some(CliOutputSize::Full));
        assert_eq!(cli.chunk_size, Some(4096));
    }

    #[test]
    fn test_log_format_flag() {
        let cli = Cli::parse_from(["bg-remover", "photo.jpg"]);
        assert_eq!(cli.log_format, CliLogFormat::Console);

        let cli = Cli::parse_from(["bg-remover", "photo.jpg", "--log-format", "compact"]);
        assert_eq!(cli.log_format, CliLogFormat::Compact);
        assert_eq!(
            cli.log_format.to_tracing_format().unwrap(),
            TracingFormat::Compact
        );

        assert!(Cli::try_parse_from(["bg-remover", "photo.jpg", "--log-format", "xml"]).is_err());
    }

    #[cfg(not(feature = "tracing-json"))]
    #[test]
    fn test_json_log_format_needs_feature() {
        assert!(CliLogFormat::Json.to_tracing_format().is_err());
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(Cli::try_parse_from(["bg-remover"]).is_err());
    }
}
