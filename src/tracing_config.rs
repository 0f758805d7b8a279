//! Structured logging setup
//!
//! The library never installs a subscriber. It emits spans through [`spans`]
//! and failure events through [`events`]; binaries pick a format and filter
//! with [`TracingConfig`] and install it once at startup.

#[cfg(feature = "cli")]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// How subscriber output is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TracingFormat {
    /// Colored, single-line output for terminals
    #[default]
    Console,
    /// Uncolored output for CI logs and redirected stderr
    Compact,
    /// One JSON object per event, with the active span list
    #[cfg(feature = "tracing-json")]
    Json,
}

/// Subscriber settings for a binary
///
/// An explicit filter directive wins over the verbosity count.
#[derive(Debug, Default)]
pub struct TracingConfig {
    pub verbosity: u8,
    pub format: TracingFormat,
    pub env_filter: Option<String>,
    /// Logged once after installation so runs can be correlated
    pub session_id: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `-v` flags; 0 is info
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.format = format;
        self
    }

    /// Use an `EnvFilter` directive such as `bg_remover=debug,reqwest=warn`
    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Level directive implied by the verbosity count
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Directive handed to the subscriber's `EnvFilter`
    #[must_use]
    pub fn filter_directive(&self) -> &str {
        self.env_filter
            .as_deref()
            .filter(|directive| !directive.trim().is_empty())
            .unwrap_or_else(|| self.verbosity_to_filter())
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - The filter directive does not parse
    /// - A global subscriber is already installed
    #[cfg(feature = "cli")]
    pub fn init(self) -> anyhow::Result<()> {
        use tracing_subscriber::fmt;

        let registry = Registry::default().with(EnvFilter::try_new(self.filter_directive())?);

        match self.format {
            TracingFormat::Console => registry
                .with(fmt::layer().with_target(false).compact())
                .try_init()?,
            TracingFormat::Compact => registry
                .with(fmt::layer().with_ansi(false).with_target(false).compact())
                .try_init()?,
            #[cfg(feature = "tracing-json")]
            TracingFormat::Json => registry
                .with(fmt::layer().json().with_current_span(true).with_span_list(true))
                .try_init()?,
        }

        if let Some(session_id) = &self.session_id {
            tracing::info!(session_id = %session_id, "bg-remover session started");
        }
        Ok(())
    }
}

/// Install the CLI subscriber
///
/// A non-empty `RUST_LOG` overrides the `-v` count.
#[cfg(feature = "cli")]
pub fn init_cli_tracing(verbosity: u8, format: TracingFormat) -> anyhow::Result<()> {
    let mut config = TracingConfig::new()
        .with_verbosity(verbosity)
        .with_format(format)
        .with_session_id(uuid::Uuid::new_v4().to_string());
    if let Ok(directive) = std::env::var(EnvFilter::DEFAULT_ENV) {
        config = config.with_env_filter(directive);
    }
    config.init()
}

/// Span constructors shared by the pipeline and the HTTP client
pub mod spans {
    use std::path::Path;
    use tracing::{Level, Span};

    pub fn pipeline_run(input: &Path, size_bytes: u64) -> Span {
        tracing::span!(Level::INFO, "pipeline_run", input = %input.display(), size_bytes)
    }

    pub fn upload(file: &Path, size_bytes: u64, endpoint: &str) -> Span {
        tracing::span!(
            Level::INFO,
            "upload",
            file = %file.display(),
            size_bytes,
            endpoint = %endpoint
        )
    }

    pub fn compression(input: &Path) -> Span {
        tracing::span!(Level::DEBUG, "compression", input = %input.display())
    }
}

pub mod events {
    /// Record a failure together with where it happened
    pub fn error_with_context(error: &dyn std::error::Error, context: &str) {
        tracing::error!(error = %error, context = %context, "Operation failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(TracingConfig::new().with_verbosity(0).verbosity_to_filter(), "info");
        assert_eq!(TracingConfig::new().with_verbosity(1).verbosity_to_filter(), "debug");
        assert_eq!(TracingConfig::new().with_verbosity(2).verbosity_to_filter(), "trace");
        assert_eq!(TracingConfig::new().with_verbosity(9).verbosity_to_filter(), "trace");
    }

    #[test]
    fn test_env_filter_overrides_verbosity() {
        let config = TracingConfig::new()
            .with_verbosity(2)
            .with_env_filter("bg_remover=debug,reqwest=warn");
        assert_eq!(config.filter_directive(), "bg_remover=debug,reqwest=warn");

        let blank = TracingConfig::new().with_verbosity(1).with_env_filter("  ");
        assert_eq!(blank.filter_directive(), "debug");
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::new()
            .with_format(TracingFormat::Compact)
            .with_session_id("test-session");

        assert_eq!(config.format, TracingFormat::Compact);
        assert_eq!(config.session_id.as_deref(), Some("test-session"));
        assert_eq!(TracingConfig::new().format, TracingFormat::Console);
    }

    #[test]
    fn test_spans_are_constructible_without_subscriber() {
        let path = std::path::Path::new("/tmp/a.jpg");
        let _run = spans::pipeline_run(path, 10);
        let _upload = spans::upload(path, 10, "http://localhost");
        let _compression = spans::compression(path);
    }
}
