//! HTTP client for remove.bg-compatible background removal endpoints
//!
//! The image is posted as `multipart/form-data` with the API key in the
//! `X-Api-Key` header. The body is streamed in chunks so that upload progress
//! can be reported while bytes are handed to the transport.

use super::{event_channel, upload_percent, ClientEvents, EventSink, RemovalClient};
use crate::{
    config::{OutputSize, PipelineConfig},
    error::{PipelineError, Result},
    tracing_config::spans,
    types::{ErrorDetail, ImageHandle},
};
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::Instrument;

/// Header carrying the account key
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// Longest slice of a non-JSON error body copied into a detail entry
const MAX_ERROR_TEXT: usize = 512;

/// Structured failure body: `{"errors":[{"title","detail","code"}]}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

/// reqwest-backed [`RemovalClient`]
#[derive(Debug, Clone)]
pub struct HttpRemovalClient {
    client: Client,
    endpoint: String,
    api_key: String,
    output_size: OutputSize,
    chunk_size: usize,
}

impl HttpRemovalClient {
    /// Create a client from a validated configuration
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Failed to create HTTP client
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            output_size: config.output_size,
            chunk_size: config.upload_chunk_size.max(1),
        })
    }

    /// Endpoint requests are posted to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn run(self, image: ImageHandle, sink: EventSink) {
        let bytes = match tokio::fs::read(&image.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = PipelineError::file_io_error("read image for upload", &image.path, &e);
                sink.error(err.into_details());
                return;
            },
        };

        let part = match self.image_part(&image, bytes, &sink) {
            Ok(part) => part,
            Err(e) => {
                sink.error(e.into_details());
                return;
            },
        };

        let form = Form::new()
            .text("size", self.output_size.to_string())
            .text("format", "png")
            .part("image_file", part);

        log::debug!("Posting {} to {}", image.path.display(), self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::ACCEPT, "image/png, application/json")
            .multipart(form)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Upload of {} failed: {}", image.path.display(), e);
                sink.error(PipelineError::transport(describe_transport_error(&e)).into_details());
                return;
            },
        };

        // Covers bodies the transport consumed without polling every chunk
        sink.processing();

        let status = response.status();
        match response.bytes().await {
            Ok(body) if status.is_success() => {
                log::debug!("Received {} bytes for {}", body.len(), image.path.display());
                sink.success(body.to_vec());
            },
            Ok(body) => {
                log::warn!("Removal service answered {} for {}", status, image.path.display());
                sink.error(parse_error_body(status, &body));
            },
            Err(e) => {
                sink.error(PipelineError::transport(describe_transport_error(&e)).into_details());
            },
        }
    }

    /// Build the streamed `image_file` part, reporting progress per chunk
    fn image_part(&self, image: &ImageHandle, bytes: Vec<u8>, sink: &EventSink) -> Result<Part> {
        let total = bytes.len() as u64;
        let chunks: Vec<std::io::Result<Vec<u8>>> = bytes
            .chunks(self.chunk_size)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();

        let progress = sink.clone();
        let mut sent = 0u64;
        progress.progress(0);
        let stream = futures_util::stream::iter(chunks).inspect(move |chunk| {
            if let Ok(chunk) = chunk {
                sent += chunk.len() as u64;
                progress.progress(upload_percent(sent, total));
                if sent >= total {
                    progress.processing();
                }
            }
        });

        Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(image.file_name())
            .mime_str(image.mime_or_default())
            .map_err(|e| PipelineError::transport(format!("Invalid upload part: {}", e)))
    }
}

impl RemovalClient for HttpRemovalClient {
    fn submit(&self, image: ImageHandle) -> ClientEvents {
        let (sink, events) = event_channel();
        sink.queued();

        let span = spans::upload(&image.path, image.size_bytes, &self.endpoint);
        let client = self.clone();
        tokio::spawn(client.run(image, sink).instrument(span));
        events
    }
}

/// Turn a failed response body into detail entries
///
/// Provider entries are returned verbatim and in order. Bodies that are not
/// the structured error format become one entry built from the HTTP status.
#[must_use]
pub fn parse_error_body(status: StatusCode, body: &[u8]) -> Vec<ErrorDetail> {
    if let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) {
        if !parsed.errors.is_empty() {
            return parsed.errors;
        }
    }

    let text: String = String::from_utf8_lossy(body)
        .trim()
        .chars()
        .take(MAX_ERROR_TEXT)
        .collect();
    let detail = if text.is_empty() {
        "The service returned an error without details".to_string()
    } else {
        text
    };
    vec![ErrorDetail::new(
        format!("HTTP {}", status.as_u16()),
        detail,
        status.canonical_reason().map(str::to_string),
    )]
}

fn describe_transport_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("Request timed out: {}", error)
    } else if error.is_connect() {
        format!("Could not connect to the removal service: {}", error)
    } else {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_structured_errors_in_order() {
        let body = br#"{"errors":[
            {"title":"File too large","detail":"Max 22 MB","code":"file_too_large"},
            {"title":"Invalid size","code":"invalid_size"}
        ]}"#;
        let details = parse_error_body(StatusCode::BAD_REQUEST, body);
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].title, "File too large");
        assert_eq!(details[0].code.as_deref(), Some("file_too_large"));
        assert_eq!(details[1].title, "Invalid size");
        assert!(details[1].detail.is_empty());
    }

    #[test]
    fn test_parse_plain_text_error() {
        let details = parse_error_body(StatusCode::BAD_GATEWAY, b"  upstream exploded  ");
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].title, "HTTP 502");
        assert_eq!(details[0].detail, "upstream exploded");
        assert_eq!(details[0].code.as_deref(), Some("Bad Gateway"));
    }

    #[test]
    fn test_parse_empty_error_list_is_synthesized() {
        let details = parse_error_body(StatusCode::FORBIDDEN, br#"{"errors":[]}"#);
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].title, "HTTP 403");

        let details = parse_error_body(StatusCode::UNAUTHORIZED, b"");
        assert!(details[0].detail.contains("without details"));
    }

    #[test]
    fn test_long_error_body_is_truncated() {
        let body = "x".repeat(MAX_ERROR_TEXT * 2);
        let details = parse_error_body(StatusCode::INTERNAL_SERVER_ERROR, body.as_bytes());
        assert_eq!(details[0].detail.len(), MAX_ERROR_TEXT);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = PipelineConfig::default();
        assert!(HttpRemovalClient::new(&config).is_err());

        let config = PipelineConfig::builder().api_key("key").build().unwrap();
        let client = HttpRemovalClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), crate::config::DEFAULT_ENDPOINT);
    }
}
