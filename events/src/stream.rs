//! JetStream condition stream subscription.
//!
//! Messages are acknowledged explicitly by the consumer after the
//! collection cycle completes, giving at-least-once delivery. Redelivery
//! of a processed condition is safe because the collector's store write
//! is idempotent.

use async_nats::jetstream;
use async_nats::jetstream::consumer::pull;
use futures::StreamExt;

use crate::condition::{subject, Condition};
use crate::EventsError;

const STREAM_NAME: &str = "ASSAYER_CONDITIONS";

pub struct ConditionStream {
    messages: pull::Stream,
}

impl ConditionStream {
    /// Bind a durable, facility-filtered consumer to the condition
    /// stream, creating stream and consumer if they do not exist yet.
    pub async fn subscribe(
        client: async_nats::Client,
        facility: &str,
    ) -> Result<Self, EventsError> {
        let context = jetstream::new(client);

        let stream = context
            .get_or_create_stream(jetstream::stream::Config {
                name: STREAM_NAME.to_string(),
                subjects: vec![subject(">")],
                ..Default::default()
            })
            .await
            .map_err(|e| EventsError::JetStream(e.to_string()))?;

        let durable = format!("assayer-outofband-{facility}");
        let consumer = stream
            .get_or_create_consumer(
                &durable,
                pull::Config {
                    durable_name: Some(durable.clone()),
                    filter_subject: subject(facility),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| EventsError::JetStream(e.to_string()))?;

        let messages = consumer
            .messages()
            .await
            .map_err(|e| EventsError::JetStream(e.to_string()))?;

        tracing::info!(facility, durable = %durable, "subscribed to condition stream");
        Ok(Self { messages })
    }

    /// Receive the next condition message. `None` once the underlying
    /// subscription closes.
    pub async fn next(&mut self) -> Option<Result<ConditionMessage, EventsError>> {
        match self.messages.next().await? {
            Ok(message) => Some(Ok(ConditionMessage { message })),
            Err(e) => Some(Err(EventsError::JetStream(e.to_string()))),
        }
    }
}

/// An in-flight condition message; must be acknowledged once the
/// collection cycle for it has finished.
pub struct ConditionMessage {
    message: jetstream::Message,
}

impl ConditionMessage {
    pub fn condition(&self) -> Result<Condition, EventsError> {
        Ok(serde_json::from_slice(&self.message.payload)?)
    }

    pub async fn ack(self) -> Result<(), EventsError> {
        self.message
            .ack()
            .await
            .map_err(|e| EventsError::JetStream(e.to_string()))
    }
}
