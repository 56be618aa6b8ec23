// Per-job status event channel
//
// Single producer (the pipeline task), single consumer (the streaming
// transport). Bounded: a slow consumer applies backpressure instead of
// losing events. Sends after the consumer is gone are silently dropped --
// a disconnected client does not cancel the pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::normalizer::Platform;

/// A single entry in a job's ordered status log.
#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub sequence: u64,
    pub update: StatusUpdate,
}

/// Typed status messages; exactly one terminal variant per job.
#[derive(Debug, Clone)]
pub enum StatusUpdate {
    Status(String),
    Error(String),
    Complete {
        download_id: String,
        filename: String,
        platform: Platform,
    },
}

pub struct StatusSender {
    tx: mpsc::Sender<StatusEvent>,
    sequence: AtomicU64,
}

pub fn channel(capacity: usize) -> (StatusSender, mpsc::Receiver<StatusEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        StatusSender {
            tx,
            sequence: AtomicU64::new(0),
        },
        rx,
    )
}

impl StatusSender {
    async fn send(&self, update: StatusUpdate) {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(StatusEvent { sequence, update }).await;
    }

    pub async fn status(&self, message: impl Into<String>) {
        self.send(StatusUpdate::Status(message.into())).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.send(StatusUpdate::Error(message.into())).await;
    }

    pub async fn complete(&self, download_id: String, filename: String, platform: Platform) {
        self.send(StatusUpdate::Complete {
            download_id,
            filename,
            platform,
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_emission_order() {
        let (tx, mut rx) = channel(8);
        tx.status("one").await;
        tx.status("two").await;
        tx.complete("id".into(), "video.mp4".into(), Platform::Youtube).await;
        drop(tx);

        let mut sequences = Vec::new();
        while let Some(event) = rx.recv().await {
            sequences.push(event.sequence);
        }
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_send_after_consumer_gone_is_noop() {
        let (tx, rx) = channel(1);
        drop(rx);
        // Must not block or panic
        tx.status("into the void").await;
    }
}
