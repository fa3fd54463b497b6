//! Durable publish/subscribe transport
//!
//! `MessageBus` is the contract the pipeline and workers rely on:
//! - `publish(subject, payload)` resolves once the transport acknowledged it
//! - `subscribe(filter, consumer, handler)` delivers at least once; a message
//!   is acknowledged when the handler returns `Ok` and redelivered otherwise
//!
//! Streams keep messages only until a consumer takes them (work-queue
//! retention) and for a bounded maximum age.

pub mod memory;
pub mod messages;
pub mod nats;
pub mod subject;

pub use memory::MemoryBus;
pub use messages::{AudioFrameMessage, TranscriptMessage};
pub use nats::NatsBus;
pub use subject::{subject_matches, StreamCategory, SubjectScheme};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A message handed to a subscriber
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    /// Delivery attempt, starting at 1
    pub attempt: u32,
    pub received_at: DateTime<Utc>,
}

/// Receives messages from a subscription
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message; returning an error requests redelivery
    async fn handle(&self, message: BusMessage) -> Result<()>;
}

/// Publish/subscribe transport used by the gateway and the workers
#[async_trait::async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload and wait for the transport to accept it
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()>;

    /// Start delivering messages matching `filter` to `handler`
    ///
    /// `consumer` names the durable consumer; subscribers sharing a name share
    /// its queue.
    async fn subscribe(
        &self,
        filter: &str,
        consumer: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription>;

    /// Subject naming used by this bus
    fn subjects(&self) -> &SubjectScheme;
}

/// Serialize a value as JSON and publish it
pub async fn publish_json<T: Serialize + Sync>(bus: &dyn MessageBus, subject: &str, value: &T) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    bus.publish(subject, payload).await
}

/// A running subscription; delivery stops when it is cancelled or dropped
pub struct Subscription {
    filter: String,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(filter: impl Into<String>, task: JoinHandle<()>) -> Self {
        Self {
            filter: filter.into(),
            task: Some(task),
        }
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
