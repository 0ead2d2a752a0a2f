//! NATS subscription for incoming scoring requests

use anyhow::Result;
use async_nats::{Client, Subscriber};
use tracing::info;

/// Receives scoring requests through a queue group, so several service
/// instances share one request subject.
pub struct RequestConsumer {
    client: Client,
    subject: String,
    queue_group: String,
}

impl RequestConsumer {
    pub fn new(client: Client, subject: &str, queue_group: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            queue_group: queue_group.to_string(),
        }
    }

    /// Join the queue group on the request subject
    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = self
            .client
            .queue_subscribe(self.subject.clone(), self.queue_group.clone())
            .await?;
        info!(
            subject = %self.subject,
            queue_group = %self.queue_group,
            "Subscribed to request subject"
        );
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}
