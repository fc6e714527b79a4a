//! Step observers.
//!
//! Stages narrate their progress through a [`StepObserver`] handed in at
//! construction. Logging, channel forwarding and silence are the built-in
//! choices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Receives one call per workflow step
pub trait StepObserver: Send + Sync {
    fn on_step(&self, step: &str);
}

/// Ignores every step
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl StepObserver for NullObserver {
    fn on_step(&self, _step: &str) {}
}

/// Logs every step at info level
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl StepObserver for LogObserver {
    fn on_step(&self, step: &str) {
        tracing::info!(target: "nicetouch::pipeline", "{}", step);
    }
}

/// A step forwarded over a channel
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    pub sequence: u64,
    pub step: String,
    pub at: DateTime<Utc>,
}

/// Forwards steps to an unbounded tokio channel
#[derive(Debug)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StepEvent>,
    sequence: std::sync::atomic::AtomicU64,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StepEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                sequence: std::sync::atomic::AtomicU64::new(0),
            },
            rx,
        )
    }
}

impl StepObserver for ChannelObserver {
    fn on_step(&self, step: &str) {
        let sequence = self
            .sequence
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        // Receiver gone means nobody is listening anymore.
        let _ = self.tx.send(StepEvent {
            sequence,
            step: step.to_string(),
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_observer_numbers_steps() {
        let (observer, mut rx) = ChannelObserver::new();
        observer.on_step("Clearing reference directory");
        observer.on_step("Exporting timeline");

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.sequence, first.step.as_str()), (0, "Clearing reference directory"));
        assert_eq!(second.sequence, 1);
        assert!(second.at >= first.at);
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let (observer, rx) = ChannelObserver::new();
        drop(rx);
        observer.on_step("still fine");
        NullObserver.on_step("ignored");
    }
}
