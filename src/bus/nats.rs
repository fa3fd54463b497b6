use anyhow::{Context, Result};
use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy},
    stream::{self, RetentionPolicy, StorageType},
    AckKind,
};
use chrono::Utc;
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::subject::{StreamCategory, SubjectScheme};
use super::{BusMessage, MessageBus, MessageHandler, Subscription};

/// NATS JetStream implementation of the message bus
pub struct NatsBus {
    client: async_nats::Client,
    jetstream: jetstream::Context,
    subjects: SubjectScheme,
    max_age: Duration,
}

impl NatsBus {
    /// Connect to NATS server and make sure the streams exist
    pub async fn connect(url: &str, subjects: SubjectScheme, max_age: Duration) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::ConnectOptions::new()
            .retry_on_initial_connect()
            .connect(url)
            .await
            .context("Failed to connect to NATS")?;

        let jetstream = jetstream::new(client.clone());

        let bus = Self {
            client,
            jetstream,
            subjects,
            max_age,
        };

        bus.init_streams()
            .await
            .context("Failed to initialize streams")?;

        info!("Connected to NATS JetStream");

        Ok(bus)
    }

    /// Create the audio, transcript and synthesized-audio streams if missing
    async fn init_streams(&self) -> Result<()> {
        for category in StreamCategory::ALL {
            self.jetstream
                .get_or_create_stream(stream::Config {
                    name: category.stream_name().to_string(),
                    subjects: vec![self.subjects.wildcard(category)],
                    retention: RetentionPolicy::WorkQueue,
                    max_age: self.max_age,
                    storage: StorageType::Memory,
                    num_replicas: 1,
                    description: Some(category.description().to_string()),
                    ..Default::default()
                })
                .await
                .with_context(|| format!("Failed to create {} stream", category.stream_name()))?;

            debug!(
                "Stream {} ready for {}",
                category.stream_name(),
                self.subjects.wildcard(category)
            );
        }

        Ok(())
    }

    /// Flush pending publishes and close NATS connection
    pub async fn close(&self) -> Result<()> {
        info!("Closing NATS connection");
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;
        // async-nats handles cleanup on drop
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageBus for NatsBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        let ack = self
            .jetstream
            .publish(subject.to_string(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {}", subject))?;

        ack.await
            .with_context(|| format!("Publish to {} was not acknowledged", subject))?;

        Ok(())
    }

    async fn subscribe(
        &self,
        filter: &str,
        consumer: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Subscription> {
        let (category, _) = self.subjects.parse(filter).with_context(|| {
            format!(
                "Filter {} is outside the {} namespace",
                filter,
                self.subjects.prefix()
            )
        })?;

        let stream = self
            .jetstream
            .get_stream(category.stream_name())
            .await
            .with_context(|| format!("Failed to look up {} stream", category.stream_name()))?;

        let pull_consumer: jetstream::consumer::PullConsumer = stream
            .get_or_create_consumer(
                consumer,
                pull::Config {
                    durable_name: Some(consumer.to_string()),
                    filter_subject: filter.to_string(),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .with_context(|| format!("Failed to create consumer {}", consumer))?;

        let mut messages = pull_consumer
            .messages()
            .await
            .with_context(|| format!("Failed to start consuming {}", filter))?;

        info!("Subscribed to {} as {}", filter, consumer);

        let filter_name = filter.to_string();
        let task = tokio::spawn(async move {
            while let Some(next) = messages.next().await {
                let message = match next {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Error receiving from {}: {}", filter_name, e);
                        continue;
                    }
                };

                let attempt = message
                    .info()
                    .map(|info| info.delivered.max(1) as u32)
                    .unwrap_or(1);

                let bus_message = BusMessage {
                    subject: message.subject.to_string(),
                    payload: message.payload.to_vec(),
                    attempt,
                    received_at: Utc::now(),
                };

                match handler.handle(bus_message).await {
                    Ok(()) => {
                        if let Err(e) = message.ack().await {
                            warn!("Failed to ack message on {}: {}", message.subject, e);
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Handler failed for message on {} (attempt {}): {:#}",
                            message.subject, attempt, e
                        );
                        if let Err(e) = message.ack_with(AckKind::Nak(None)).await {
                            warn!("Failed to nak message on {}: {}", message.subject, e);
                        }
                    }
                }
            }

            info!("Subscription to {} ended", filter_name);
        });

        Ok(Subscription::new(filter, task))
    }

    fn subjects(&self) -> &SubjectScheme {
        &self.subjects
    }
}
