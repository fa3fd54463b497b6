use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::subject::{subject_matches, SubjectScheme};
use super::{BusMessage, MessageBus, MessageHandler, Subscription};

/// Delivery attempts before a message that keeps failing is discarded
pub const MAX_DELIVER: u32 = 5;

#[derive(Debug)]
struct Envelope {
    subject: String,
    payload: Vec<u8>,
    published_at: Instant,
    attempt: u32,
}

struct Consumer {
    filter: String,
    tx: mpsc::UnboundedSender<Envelope>,
}

#[derive(Default)]
struct Queues {
    /// Messages no subscriber has taken yet
    pending: VecDeque<Envelope>,
    consumers: Vec<Consumer>,
}

impl Queues {
    /// Hand a message to the first live matching consumer, or keep it pending
    fn route(&mut self, mut envelope: Envelope) {
        self.consumers.retain(|c| !c.tx.is_closed());

        for consumer in &self.consumers {
            if !subject_matches(&consumer.filter, &envelope.subject) {
                continue;
            }
            match consumer.tx.send(envelope) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => envelope = returned,
            }
        }

        self.pending.push_back(envelope);
    }

    fn expire(&mut self, max_age: Duration) {
        let before = self.pending.len();
        self.pending.retain(|e| e.published_at.elapsed() < max_age);
        let expired = before - self.pending.len();
        if expired > 0 {
            debug!("Expired {} pending message(s)", expired);
        }
    }
}

/// In-process work-queue bus
///
/// Same delivery contract as the JetStream bus: a message waits until one
/// subscriber takes it, expires after the maximum age, and is redelivered
/// when the handler fails (up to `MAX_DELIVER` attempts).
#[derive(Clone)]
pub struct MemoryBus {
    queues: Arc<Mutex<Queues>>,
    subjects: SubjectScheme,
    max_age: Duration,
}

impl MemoryBus {
    pub fn new(subjects: SubjectScheme, max_age: Duration) -> Self {
        info!("Using in-process message bus ({})", subjects.prefix());
        Self {
            queues: Arc::new(Mutex::new(Queues::default())),
            subjects,
            max_age,
        }
    }

    /// Messages published but not yet taken by any subscriber
    pub fn pending(&self) -> usize {
        let mut queues = self.queues.lock();
        queues.expire(self.max_age);
        queues.pending.len()
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(SubjectScheme::default(), Duration::from_secs(3600))
    }
}

#[async_trait::async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        let mut queues = self.queues.lock();
        queues.expire(self.max_age);
        queues.route(Envelope {
            subject: subject.to_string(),
            payload,
            published_at: Instant::now(),
            attempt: 1,
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        filter: &str,
        consumer: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        {
            let mut queues = self.queues.lock();
            queues.expire(self.max_age);

            // Hand over everything already waiting for this filter
            let mut waiting = VecDeque::new();
            for envelope in queues.pending.drain(..) {
                if subject_matches(filter, &envelope.subject) {
                    let _ = tx.send(envelope);
                } else {
                    waiting.push_back(envelope);
                }
            }
            queues.pending = waiting;

            queues.consumers.push(Consumer {
                filter: filter.to_string(),
                tx,
            });
        }

        info!("Subscribed to {} as {}", filter, consumer);

        let queues = Arc::clone(&self.queues);
        let max_age = self.max_age;
        let filter_name = filter.to_string();

        let task = tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                if envelope.published_at.elapsed() >= max_age {
                    debug!("Discarding expired message on {}", envelope.subject);
                    continue;
                }

                let message = BusMessage {
                    subject: envelope.subject.clone(),
                    payload: envelope.payload.clone(),
                    attempt: envelope.attempt,
                    received_at: Utc::now(),
                };

                if let Err(e) = handler.handle(message).await {
                    if envelope.attempt >= MAX_DELIVER {
                        warn!(
                            "Giving up on message on {} after {} attempts: {:#}",
                            envelope.subject, envelope.attempt, e
                        );
                        continue;
                    }

                    warn!(
                        "Handler failed for message on {} (attempt {}): {:#}",
                        envelope.subject, envelope.attempt, e
                    );
                    queues.lock().route(Envelope {
                        attempt: envelope.attempt + 1,
                        ..envelope
                    });
                }
            }

            debug!("Subscription to {} ended", filter_name);
        });

        Ok(Subscription::new(filter, task))
    }

    fn subjects(&self) -> &SubjectScheme {
        &self.subjects
    }
}
