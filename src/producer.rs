//! NATS publishing: replies to scoring requests and fraud alerts

use crate::error::ScoringError;
use crate::types::alert::FraudAlert;
use crate::types::response::{ErrorResponse, ScoreResponse};
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::{debug, warn};

/// Publisher for fraud alerts
#[derive(Clone)]
pub struct AlertProducer {
    client: Client,
    subject: String,
}

impl AlertProducer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
        }
    }

    /// Publish a fraud alert
    pub async fn publish(&self, alert: &FraudAlert) -> Result<()> {
        let payload = serde_json::to_vec(alert)?;

        self.client
            .publish(self.subject.clone(), payload.into())
            .await?;

        debug!(
            alert_id = %alert.alert_id,
            transaction_id = ?alert.transaction_id,
            score = alert.score,
            "Published fraud alert"
        );

        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Sends scoring results back on a request's reply subject
#[derive(Clone)]
pub struct ReplyPublisher {
    client: Client,
}

impl ReplyPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn send_score(&self, reply: Option<Subject>, response: &ScoreResponse) -> Result<()> {
        self.send(reply, serde_json::to_vec(response)?).await
    }

    pub async fn send_error(&self, reply: Option<Subject>, err: &ScoringError) -> Result<()> {
        self.send(reply, serde_json::to_vec(&ErrorResponse::from(err))?)
            .await
    }

    pub async fn send_bad_request(&self, reply: Option<Subject>, message: String) -> Result<()> {
        self.send(reply, serde_json::to_vec(&ErrorResponse::bad_request(message))?)
            .await
    }

    async fn send(&self, reply: Option<Subject>, payload: Vec<u8>) -> Result<()> {
        match reply {
            Some(subject) => {
                self.client.publish(subject, payload.into()).await?;
                Ok(())
            }
            None => {
                // Fire-and-forget publish; nobody is waiting for the result
                warn!("Request has no reply subject; dropping response");
                Ok(())
            }
        }
    }
}
