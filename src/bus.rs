//! Message bus contract and in-process implementation
//!
//! The broker itself is an external collaborator; the pipeline only needs
//! publish/subscribe through this narrow trait. `InMemoryBus` is the
//! channel-backed implementation used by the runtime and by tests; a real
//! broker client slots in behind the same trait.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One raw message as delivered by the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub enum BusError {
    /// Subscriber side of the topic channel is gone.
    Closed(String),
}

impl std::fmt::Display for BusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusError::Closed(topic) => write!(f, "topic channel closed: {}", topic),
        }
    }
}

impl std::error::Error for BusError {}

/// Publish side of the bus contract.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: Option<String>,
        payload: Vec<u8>,
    ) -> Result<(), BusError>;
}

/// Process-local bus backed by per-topic bounded mpsc channels.
///
/// Publishing to a topic nobody subscribed to succeeds and drops the
/// message, matching broker semantics for unclaimed topics.
pub struct InMemoryBus {
    buffer: usize,
    senders: Mutex<HashMap<String, mpsc::Sender<BusMessage>>>,
}

impl InMemoryBus {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer,
            senders: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to a topic, receiving every message published after this
    /// call. One subscriber per topic; a second call replaces the first.
    pub fn subscribe(&self, topic: &str) -> mpsc::Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.senders
            .lock()
            .expect("bus subscription table poisoned")
            .insert(topic.to_string(), tx);
        log::info!("📬 Subscribed to topic: {}", topic);
        rx
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(
        &self,
        topic: &str,
        key: Option<String>,
        payload: Vec<u8>,
    ) -> Result<(), BusError> {
        let sender = {
            let senders = self
                .senders
                .lock()
                .expect("bus subscription table poisoned");
            senders.get(topic).cloned()
        };

        let Some(sender) = sender else {
            log::debug!("No subscriber for topic {}, message dropped", topic);
            return Ok(());
        };

        let msg = BusMessage {
            topic: topic.to_string(),
            key,
            payload,
        };

        sender
            .send(msg)
            .await
            .map_err(|_| BusError::Closed(topic.to_string()))
    }
}
