//! Topic-based telemetry bus
//!
//! Sessions publish progress, completion and failure events; supervisors
//! subscribe per topic or to everything. Publishing never blocks and never
//! fails: events sent with no subscribers are dropped, and a subscriber that
//! falls behind loses the oldest events (`RecvError::Lagged`).
//!
//! Topic channels exist only while someone listens. `subscribe` creates
//! them; `publish` drops a topic once its last receiver is gone.

mod events;

pub use events::*;

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

use crate::utils::lock_mutex_recover;

/// Default per-topic channel capacity
pub const DEFAULT_CAPACITY: usize = 1000;

struct BusInner {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<TelemetryEvent>>>,
    all: broadcast::Sender<TelemetryEvent>,
}

/// Broadcasts telemetry events to every subscriber of a topic
#[derive(Clone)]
pub struct TelemetryBus {
    inner: Arc<BusInner>,
}

impl TelemetryBus {
    /// Create a bus with the default capacity of 1000 events per topic
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (all, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(BusInner {
                capacity,
                topics: Mutex::new(HashMap::new()),
                all,
            }),
        }
    }

    /// Send to `topic` if it has subscribers, pruning it if they all left
    fn send_to_topic(&self, topic: &str, event: TelemetryEvent) {
        let mut topics = lock_mutex_recover(&self.inner.topics);
        let Some(sender) = topics.get(topic) else {
            return;
        };

        // Ignore send errors (no receivers)
        if sender.send(event).is_err() && sender.receiver_count() == 0 {
            topics.remove(topic);
            log::trace!("[TelemetryBus] Dropped topic {} with no subscribers", topic);
        }
    }

    #[cfg(test)]
    fn topic_count(&self) -> usize {
        lock_mutex_recover(&self.inner.topics).len()
    }

    /// Publish an event. Fire-and-forget.
    pub fn publish(&self, topic: &str, agent_id: &str, kind: &str, payload: impl Serialize) {
        let payload = serde_json::to_value(payload).unwrap_or_else(|e| {
            log::warn!("[TelemetryBus] Failed to serialize {} payload: {}", kind, e);
            serde_json::Value::Null
        });
        let event = TelemetryEvent {
            topic: topic.to_string(),
            agent_id: agent_id.to_string(),
            kind: kind.to_string(),
            payload,
            timestamp: Utc::now(),
        };

        log::trace!("[TelemetryBus] {} {} from {}", topic, kind, agent_id);

        self.send_to_topic(topic, event.clone());
        let _ = self.inner.all.send(event);
    }

    /// Subscribe to one topic
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<TelemetryEvent> {
        let mut topics = lock_mutex_recover(&self.inner.topics);
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe()
    }

    /// Subscribe to every topic
    pub fn subscribe_all(&self) -> broadcast::Receiver<TelemetryEvent> {
        self.inner.all.subscribe()
    }

    /// Open a channel that stamps every event with `agent_id`
    pub fn channel(&self, agent_id: &str) -> AgentChannel {
        AgentChannel {
            bus: self.clone(),
            agent_id: agent_id.to_string(),
        }
    }
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A TelemetryBus handle scoped to one agent
#[derive(Clone)]
pub struct AgentChannel {
    bus: TelemetryBus,
    agent_id: String,
}

impl AgentChannel {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn publish(&self, topic: &str, kind: &str, payload: impl Serialize) {
        self.bus.publish(topic, &self.agent_id, kind, payload);
    }
}
