//! Scripted removal client for testing and offline demos
//!
//! Replays a fixed list of [`ClientEvent`]s through an [`EventSink`], so the
//! same ordering rules apply as for the HTTP client. A gated client holds its
//! terminal event back until [`MockRemovalClient::release`] is called, which
//! lets tests keep a request in flight deterministically.

use super::{event_channel, ClientEvent, ClientEvents, RemovalClient};
use crate::types::{ErrorDetail, ImageHandle};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Mock [`RemovalClient`] replaying a script for every submission
#[derive(Debug, Clone)]
pub struct MockRemovalClient {
    script: Vec<ClientEvent>,
    /// Submitted handles, in call order, for verification in tests
    submissions: Arc<Mutex<Vec<ImageHandle>>>,
    gate: Option<Arc<Semaphore>>,
}

impl MockRemovalClient {
    /// Create a client replaying `script`
    #[must_use]
    pub fn new(script: Vec<ClientEvent>) -> Self {
        Self {
            script,
            submissions: Arc::new(Mutex::new(Vec::new())),
            gate: None,
        }
    }

    /// Queued, 0/50/100 % progress, Processing, then `Success(bytes)`
    #[must_use]
    pub fn succeeding(bytes: Vec<u8>) -> Self {
        Self::new(vec![
            ClientEvent::Queued,
            ClientEvent::UploadProgress(0),
            ClientEvent::UploadProgress(50),
            ClientEvent::UploadProgress(100),
            ClientEvent::Processing,
            ClientEvent::Success(bytes),
        ])
    }

    /// Queued, partial progress, then `Error(details)`
    #[must_use]
    pub fn failing(details: Vec<ErrorDetail>) -> Self {
        Self::new(vec![
            ClientEvent::Queued,
            ClientEvent::UploadProgress(30),
            ClientEvent::Error(details),
        ])
    }

    /// Hold every terminal event until released
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    /// Let `count` held submissions deliver their terminal event
    pub fn release(&self, count: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(count);
        }
    }

    /// Handles submitted so far
    #[must_use]
    pub fn submissions(&self) -> Vec<ImageHandle> {
        self.submissions
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Number of submissions so far
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().map(|guard| guard.len()).unwrap_or(0)
    }
}

impl RemovalClient for MockRemovalClient {
    fn submit(&self, image: ImageHandle) -> ClientEvents {
        if let Ok(mut guard) = self.submissions.lock() {
            guard.push(image);
        }

        let (sink, events) = event_channel();
        let script = self.script.clone();
        let gate = self.gate.clone();

        tokio::spawn(async move {
            for event in script {
                if event.is_terminal() {
                    if let Some(gate) = &gate {
                        match gate.acquire().await {
                            Ok(permit) => permit.forget(),
                            Err(_) => return,
                        }
                    }
                }
                match event {
                    ClientEvent::Queued => sink.queued(),
                    ClientEvent::UploadProgress(percent) => sink.progress(percent),
                    ClientEvent::Processing => sink.processing(),
                    ClientEvent::Success(bytes) => sink.success(bytes),
                    ClientEvent::Error(details) => sink.error(details),
                }
                tokio::task::yield_now().await;
            }
        });

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_succeeding_script() {
        let client = MockRemovalClient::succeeding(vec![7, 7]);
        let events: Vec<_> = client
            .submit(ImageHandle::new("/tmp/a.jpg", 3))
            .collect()
            .await;

        assert_eq!(events.first(), Some(&ClientEvent::Queued));
        assert_eq!(events.last(), Some(&ClientEvent::Success(vec![7, 7])));
        assert_eq!(client.submission_count(), 1);
        assert_eq!(client.submissions()[0].path.to_str(), Some("/tmp/a.jpg"));
    }

    #[tokio::test]
    async fn test_script_without_terminal_still_terminates() {
        let client = MockRemovalClient::new(vec![ClientEvent::UploadProgress(20)]);
        let events: Vec<_> = client
            .submit(ImageHandle::new("/tmp/a.jpg", 3))
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], ClientEvent::Error(_)));
    }

    #[tokio::test]
    async fn test_gate_holds_terminal_event() {
        let client = MockRemovalClient::succeeding(vec![1]).gated();
        let mut events = client.submit(ImageHandle::new("/tmp/a.jpg", 3));

        // Everything up to the terminal event flows freely
        for _ in 0..5 {
            assert!(!events.next_event().await.unwrap().is_terminal());
        }
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            events.next_event(),
        )
        .await;
        assert!(pending.is_err());

        client.release(1);
        assert_eq!(events.next_event().await, Some(ClientEvent::Success(vec![1])));
    }
}
