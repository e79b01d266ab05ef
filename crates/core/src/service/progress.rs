//! Per-job progress topics.

use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use super::types::ProgressStream;
use crate::asset::AssetId;

type Topics = HashMap<AssetId, Topic>;

#[derive(Debug)]
struct Topic {
    sender: broadcast::Sender<u8>,
    publishing: bool,
}

/// Broadcast topics keyed by job id.
///
/// A topic exists while someone is subscribed or a job is publishing. When the
/// publishing side closes the topic, every subscriber stream ends.
#[derive(Debug, Clone)]
pub struct ProgressHub {
    topics: Arc<Mutex<Topics>>,
    capacity: usize,
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new(64)
    }
}

impl ProgressHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    fn topics(&self) -> MutexGuard<'_, Topics> {
        self.topics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn topic<R>(&self, job_id: &AssetId, f: impl FnOnce(&mut Topic) -> R) -> R {
        let mut topics = self.topics();
        let topic = topics.entry(*job_id).or_insert_with(|| Topic {
            sender: broadcast::channel(self.capacity).0,
            publishing: false,
        });
        f(topic)
    }

    /// Subscribes to the topic for `job_id`, creating it if needed.
    pub fn subscribe(&self, job_id: &AssetId) -> ProgressStream {
        let subscription = Subscription {
            rx: self.topic(job_id, |t| t.sender.subscribe()),
            hub: self.clone(),
            job_id: *job_id,
        };
        stream::unfold(subscription, |mut sub| async move {
            loop {
                match sub.rx.recv().await {
                    Ok(percent) => return Some((percent, sub)),
                    // Skipped ticks are superseded by later ones
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }

    /// Opens the publishing side of a topic. Dropping it closes the topic.
    pub fn open(&self, job_id: &AssetId) -> ProgressTopic {
        let sender = self.topic(job_id, |t| {
            t.publishing = true;
            t.sender.clone()
        });
        ProgressTopic {
            hub: self.clone(),
            job_id: *job_id,
            sender,
        }
    }

    /// Number of live topics.
    pub fn topic_count(&self) -> usize {
        self.topics().len()
    }
}

/// Receiving side of a topic; forgets idle topics when the last one goes.
struct Subscription {
    rx: broadcast::Receiver<u8>,
    hub: ProgressHub,
    job_id: AssetId,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut topics = self.hub.topics();
        let idle = topics
            .get(&self.job_id)
            .map(|t| !t.publishing && t.sender.receiver_count() <= 1)
            .unwrap_or(false);
        if idle {
            topics.remove(&self.job_id);
        }
    }
}

/// Publishing handle for one job's progress.
#[derive(Debug)]
pub struct ProgressTopic {
    hub: ProgressHub,
    job_id: AssetId,
    sender: broadcast::Sender<u8>,
}

impl ProgressTopic {
    /// Publishes a percentage, clamped to 100.
    pub fn report(&self, percent: u8) {
        // No subscribers is fine
        let _ = self.sender.send(percent.min(100));
    }

    pub fn job_id(&self) -> &AssetId {
        &self.job_id
    }
}

impl Drop for ProgressTopic {
    fn drop(&mut self) {
        self.hub.topics().remove(&self.job_id);
    }
}
