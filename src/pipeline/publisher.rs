//! Publisher task: forwards match events to the message queue.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::models::MatchEvent;
use crate::services::MessageQueue;

/// Counters reported when the publisher finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    pub published: u64,
    pub failed: u64,
}

/// Drains the match channel into a single queue topic, in receive order.
///
/// A failed publish is logged and counted, and the event is dropped; there is
/// no retry.
pub struct Publisher {
    queue: Arc<dyn MessageQueue>,
    topic: String,
}

impl Publisher {
    pub fn new(queue: Arc<dyn MessageQueue>, topic: impl Into<String>) -> Self {
        Self {
            queue,
            topic: topic.into(),
        }
    }

    /// Publish until `input` is closed and empty, stop the queue, then report.
    pub async fn run(
        self,
        mut input: mpsc::Receiver<MatchEvent>,
        done: oneshot::Sender<PublishStats>,
    ) {
        let mut stats = PublishStats::default();

        while let Some(event) = input.recv().await {
            match self.queue.publish(&self.topic, event.payload()).await {
                Ok(()) => {
                    stats.published += 1;
                    log::debug!("Published '{}' to {}", event.keyword, self.topic);
                }
                Err(e) => {
                    stats.failed += 1;
                    log::warn!(
                        "Dropping '{}': publish to {} failed: {}",
                        event.keyword,
                        self.topic,
                        e
                    );
                }
            }
        }

        self.queue.stop().await;
        log::info!(
            "Publisher stopped: {} published, {} failed",
            stats.published,
            stats.failed
        );
        if done.send(stats).is_err() {
            log::warn!("Nobody is waiting for the publisher to stop");
        }
    }
}
