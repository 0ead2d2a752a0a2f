//! Fraud Stacking Pipeline - Main Entry Point
//!
//! Answers scoring requests over NATS request/reply and publishes an alert
//! for every transaction the stacking decision flags as fraud.

use anyhow::{Context, Result};
use fraud_stacking_pipeline::{
    config::AppConfig,
    consumer::RequestConsumer,
    metrics::{MetricsReporter, PipelineMetrics},
    models::inference::InferenceEngine,
    producer::{AlertProducer, ReplyPublisher},
    Transaction,
};
use futures::StreamExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load_from_args()?;
    config.logging.init()?;

    info!("Starting Fraud Stacking Pipeline");
    info!(
        strategy = ?config.scoring.strategy,
        models = config.models.base.len(),
        "Configuration loaded successfully"
    );

    // Any model or artifact failure stops startup here
    let engine =
        InferenceEngine::from_config(&config).context("Failed to initialize inference engine")?;
    let engine = Arc::new(engine);
    info!(
        model_name = %engine.model_name(),
        threshold = ?engine.threshold(),
        models = ?engine.model_names(),
        features = engine.feature_extractor().feature_count(),
        "Inference engine ready"
    );

    let metrics = Arc::new(PipelineMetrics::new());

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(
        client.clone(),
        &config.nats.request_subject,
        &config.nats.queue_group,
    );
    let alerts = Arc::new(AlertProducer::new(client.clone(), &config.nats.alert_subject));
    let replies = ReplyPublisher::new(client.clone());

    let num_workers = config.pipeline.workers;
    info!(
        workers = num_workers,
        request_subject = %consumer.subject(),
        alert_subject = %alerts.subject(),
        "Starting request loop"
    );

    let semaphore = Arc::new(Semaphore::new(num_workers));
    let risk_levels = Arc::new(config.detection.risk_levels.clone());

    if config.pipeline.metrics_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
        tokio::spawn(reporter.start());
    }

    let mut subscription = consumer.subscribe().await?;
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let message = tokio::select! {
            message = subscription.next() => match message {
                Some(message) => message,
                None => break,
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        };

        let permit = semaphore.clone().acquire_owned().await?;

        let engine = engine.clone();
        let alerts = alerts.clone();
        let replies = replies.clone();
        let metrics = metrics.clone();
        let risk_levels = risk_levels.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let started = Instant::now();

            let transaction = match serde_json::from_slice::<Transaction>(&message.payload) {
                Ok(transaction) => transaction,
                Err(e) => {
                    metrics.record_rejected();
                    warn!(error = %e, "Failed to deserialize scoring request");
                    if let Err(e) = replies
                        .send_bad_request(message.reply, format!("invalid request body: {}", e))
                        .await
                    {
                        error!(error = %e, "Failed to send error reply");
                    }
                    return;
                }
            };

            let result = match engine.score(&transaction) {
                Ok(result) => result,
                Err(e) => {
                    if e.is_client_error() {
                        metrics.record_rejected();
                        warn!(
                            transaction_id = ?transaction.transaction_id,
                            error = %e,
                            "Rejected scoring request"
                        );
                    } else {
                        metrics.record_failed();
                        error!(
                            transaction_id = ?transaction.transaction_id,
                            error = %e,
                            "Inference failed"
                        );
                    }
                    if let Err(e) = replies.send_error(message.reply, &e).await {
                        error!(error = %e, "Failed to send error reply");
                    }
                    return;
                }
            };

            let processing_time = started.elapsed();
            metrics.record_scored(processing_time, result.score(), result.is_fraud());
            for (model, latency) in &result.model_latencies {
                metrics.record_model_time(model, *latency);
            }

            if let Err(e) = replies.send_score(message.reply, &result.response).await {
                error!(
                    transaction_id = ?transaction.transaction_id,
                    error = %e,
                    "Failed to send reply"
                );
            }

            match result.to_alert(&risk_levels) {
                Some(alert) => {
                    metrics.record_alert(alert.risk_level.as_str());
                    if let Err(e) = alerts.publish(&alert).await {
                        error!(
                            transaction_id = ?alert.transaction_id,
                            error = %e,
                            "Failed to publish fraud alert"
                        );
                    } else {
                        info!(
                            transaction_id = ?alert.transaction_id,
                            score = alert.score,
                            risk_level = alert.risk_level.as_str(),
                            processing_time_us = processing_time.as_micros(),
                            "Fraud alert published"
                        );
                    }
                }
                None => {
                    debug!(
                        transaction_id = ?transaction.transaction_id,
                        score = result.score(),
                        processing_time_us = processing_time.as_micros(),
                        "Transaction scored"
                    );
                }
            }
        });
    }

    info!("Pipeline shutting down...");
    // Wait for in-flight requests to finish
    let _drained = semaphore.acquire_many(num_workers as u32).await?;
    info!(
        scored = metrics.scored.load(Ordering::Relaxed),
        "All in-flight requests drained"
    );
    metrics.print_summary();

    Ok(())
}
