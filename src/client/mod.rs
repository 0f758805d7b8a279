//! Remote background removal client abstraction
//!
//! A submission is observed as an ordered stream of [`ClientEvent`]s:
//! zero or more `Queued` / `UploadProgress` / `Processing` events followed by
//! exactly one terminal `Success` or `Error`.
//!
//! Producers never write to the channel directly. They go through an
//! [`EventSink`], which enforces the ordering rules, and consumers read a
//! [`ClientEvents`] stream, which synthesizes a terminal error if the
//! producer disappears without finishing.

pub mod http;
pub mod mock;

pub use http::HttpRemovalClient;
pub use mock::MockRemovalClient;

use crate::types::{ErrorDetail, ImageHandle};
use futures::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Lifecycle notification for one submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Accepted locally, no network activity yet
    Queued,
    /// Upload progress in percent (0-100), non-decreasing
    UploadProgress(u8),
    /// Upload finished, waiting for the remote computation
    Processing,
    /// Background-removed image bytes (terminal)
    Success(Vec<u8>),
    /// Ordered, non-empty failure details (terminal)
    Error(Vec<ErrorDetail>),
}

impl ClientEvent {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_))
    }
}

/// Submits images to a background removal service
pub trait RemovalClient: Send + Sync {
    /// Start a submission and return its event stream
    ///
    /// Must be called from within a tokio runtime; the network exchange runs
    /// on a spawned task.
    fn submit(&self, image: ImageHandle) -> ClientEvents;
}

#[derive(Debug, Default)]
struct SinkState {
    queued: bool,
    last_progress: Option<u8>,
    processing: bool,
    terminated: bool,
}

/// Producer side of a submission's event stream
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ClientEvent>,
    state: Arc<Mutex<SinkState>>,
}

impl EventSink {
    fn send(&self, event: ClientEvent) {
        // A dropped receiver only means nobody is listening any more
        let _ = self.tx.send(event);
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SinkState) -> R) -> R {
        let mut guard = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard)
    }

    /// Emit `Queued`, only before any other event
    pub fn queued(&self) {
        let emit = self.with_state(|s| {
            let open = !s.queued && !s.terminated && !s.processing && s.last_progress.is_none();
            s.queued = true;
            open
        });
        if emit {
            self.send(ClientEvent::Queued);
        }
    }

    /// Emit `UploadProgress`, clamped to 100
    ///
    /// Values lower than the last reported one, repeats, and anything after
    /// `Processing` are dropped.
    pub fn progress(&self, percent: u8) {
        let percent = percent.min(100);
        let emit = self.with_state(|s| {
            if s.terminated || s.processing {
                return false;
            }
            match s.last_progress {
                Some(last) if percent <= last => false,
                _ => {
                    s.last_progress = Some(percent);
                    true
                },
            }
        });
        if emit {
            self.send(ClientEvent::UploadProgress(percent));
        }
    }

    /// Emit `Processing` once
    pub fn processing(&self) {
        let emit = self.with_state(|s| {
            if s.terminated || s.processing {
                return false;
            }
            s.processing = true;
            true
        });
        if emit {
            self.send(ClientEvent::Processing);
        }
    }

    /// Emit the terminal `Success`
    pub fn success(&self, bytes: Vec<u8>) {
        if self.terminate() {
            self.send(ClientEvent::Success(bytes));
        }
    }

    /// Emit the terminal `Error`; an empty list becomes one generic entry
    pub fn error(&self, details: Vec<ErrorDetail>) {
        let details = if details.is_empty() {
            vec![ErrorDetail::generic()]
        } else {
            details
        };
        if self.terminate() {
            self.send(ClientEvent::Error(details));
        }
    }

    fn terminate(&self) -> bool {
        self.with_state(|s| !std::mem::replace(&mut s.terminated, true))
    }

    /// Whether a terminal event has already been emitted
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.with_state(|s| s.terminated)
    }
}

/// Consumer side of a submission's event stream
#[derive(Debug)]
pub struct ClientEvents {
    rx: mpsc::UnboundedReceiver<ClientEvent>,
    finished: bool,
}

impl ClientEvents {
    /// Await the next event; `None` once the terminal event was delivered
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        futures::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }
}

impl Stream for ClientEvents {
    type Item = ClientEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    this.finished = true;
                    this.rx.close();
                }
                Poll::Ready(Some(event))
            },
            Poll::Ready(None) => {
                // Producer went away without a terminal event
                this.finished = true;
                log::warn!("Removal client ended without a result; synthesizing an error");
                Poll::Ready(Some(ClientEvent::Error(vec![ErrorDetail::generic()])))
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Create a connected sink/stream pair for one submission
#[must_use]
pub fn event_channel() -> (EventSink, ClientEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        EventSink {
            tx,
            state: Arc::new(Mutex::new(SinkState::default())),
        },
        ClientEvents {
            rx,
            finished: false,
        },
    )
}

/// Upload percentage for `sent` of `total` bytes
#[must_use]
pub fn upload_percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (sent.saturating_mul(100) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn drain(events: ClientEvents) -> Vec<ClientEvent> {
        events.collect().await
    }

    #[tokio::test]
    async fn test_sink_enforces_monotonic_progress() {
        let (sink, events) = event_channel();
        sink.queued();
        sink.progress(10);
        sink.progress(5);
        sink.progress(10);
        sink.progress(250);
        sink.processing();
        sink.progress(100);
        sink.success(vec![1, 2, 3]);
        drop(sink);

        assert_eq!(
            drain(events).await,
            vec![
                ClientEvent::Queued,
                ClientEvent::UploadProgress(10),
                ClientEvent::UploadProgress(100),
                ClientEvent::Processing,
                ClientEvent::Success(vec![1, 2, 3]),
            ]
        );
    }

    #[tokio::test]
    async fn test_only_first_terminal_event_is_delivered() {
        let (sink, events) = event_channel();
        sink.error(vec![ErrorDetail::new("First", "boom", None)]);
        sink.success(vec![9]);
        sink.error(vec![ErrorDetail::new("Second", "boom", None)]);
        sink.progress(50);
        assert!(sink.is_terminated());
        drop(sink);

        let collected = drain(events).await;
        assert_eq!(collected.len(), 1);
        assert!(matches!(&collected[0], ClientEvent::Error(d) if d[0].title == "First"));
    }

    #[tokio::test]
    async fn test_empty_error_gets_generic_detail() {
        let (sink, events) = event_channel();
        sink.error(Vec::new());
        drop(sink);

        let collected = drain(events).await;
        assert!(matches!(&collected[0], ClientEvent::Error(d) if d.len() == 1));
    }

    #[tokio::test]
    async fn test_dropped_producer_synthesizes_error() {
        let (sink, mut events) = event_channel();
        sink.queued();
        sink.progress(40);
        drop(sink);

        assert_eq!(events.next_event().await, Some(ClientEvent::Queued));
        assert_eq!(events.next_event().await, Some(ClientEvent::UploadProgress(40)));
        let terminal = events.next_event().await.unwrap();
        assert!(matches!(terminal, ClientEvent::Error(ref d) if !d.is_empty()));
        assert_eq!(events.next_event().await, None);
    }

    #[test]
    fn test_upload_percent() {
        assert_eq!(upload_percent(0, 200), 0);
        assert_eq!(upload_percent(100, 200), 50);
        assert_eq!(upload_percent(200, 200), 100);
        assert_eq!(upload_percent(500, 200), 100);
        assert_eq!(upload_percent(0, 0), 100);
    }
}
