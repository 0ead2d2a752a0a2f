//! Test Request Producer
//!
//! Sends sample credit-card records to the scoring subject as NATS requests
//! and logs each reply. Falls back to a dry run that prints the records when
//! NATS is unreachable.
//!
//! Usage: test_producer [nats_url] [subject] [count] [fraud_rate] [delay_ms]

use rand::Rng;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{error, info, warn};

/// Components that separate the two classes most in the public dataset.
const FRAUD_SHIFTED: [(&str, f64); 5] = [
    ("V4", 4.0),
    ("V10", -5.0),
    ("V12", -6.0),
    ("V14", -7.0),
    ("V17", -6.0),
];

/// Record generator for testing
struct RecordGenerator {
    rng: rand::rngs::ThreadRng,
    counter: u64,
    elapsed_seconds: f64,
}

impl RecordGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
            counter: 0,
            elapsed_seconds: 0.0,
        }
    }

    fn base_record(&mut self) -> Map<String, Value> {
        self.counter += 1;
        self.elapsed_seconds += self.rng.gen_range(0.0..120.0);

        let mut record = Map::new();
        record.insert("ID".into(), Value::from(format!("tx_{:012}", self.counter)));
        record.insert("Time".into(), Value::from(self.elapsed_seconds.floor()));
        for i in 1..=28 {
            record.insert(format!("V{}", i), Value::from(self.rng.gen_range(-1.5..1.5)));
        }
        record
    }

    /// A record drawn around the legitimate-class centre
    fn generate_legitimate(&mut self) -> Map<String, Value> {
        let mut record = self.base_record();
        let amount: f64 = self.rng.gen_range(1.0..250.0);
        record.insert("Amount".into(), Value::from((amount * 100.0).round() / 100.0));
        record
    }

    /// A record pushed towards the fraud class on its most telling components
    fn generate_suspicious(&mut self) -> Map<String, Value> {
        let mut record = self.base_record();
        for (name, shift) in FRAUD_SHIFTED {
            let jitter: f64 = self.rng.gen_range(-1.0..1.0);
            record.insert(name.into(), Value::from(shift + jitter));
        }
        let amount: f64 = self.rng.gen_range(0.0..2000.0);
        record.insert("Amount".into(), Value::from((amount * 100.0).round() / 100.0));
        record
    }

    fn generate(&mut self, fraud_rate: f64) -> (Map<String, Value>, bool) {
        if self.rng.gen_bool(fraud_rate) {
            (self.generate_suspicious(), true)
        } else {
            (self.generate_legitimate(), false)
        }
    }
}

/// Fraction of suspicious records; falls back to 0.2 unless given a finite number.
fn parse_fraud_rate(arg: Option<&str>) -> f64 {
    arg.and_then(|s| s.parse().ok())
        .filter(|rate: &f64| rate.is_finite())
        .unwrap_or(0.2_f64)
        .clamp(0.0, 1.0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_producer=info".parse()?),
        )
        .init();

    info!("Starting Test Request Producer");

    let args: Vec<String> = std::env::args().collect();
    let nats_url = args.get(1).map(|s| s.as_str()).unwrap_or("nats://localhost:4222");
    let subject = args.get(2).map(|s| s.as_str()).unwrap_or("scoring.requests");
    let count: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(20);
    let fraud_rate = parse_fraud_rate(args.get(4).map(|s| s.as_str()));
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        nats_url = %nats_url,
        subject = %subject,
        count = count,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = match async_nats::connect(nats_url).await {
        Ok(c) => {
            info!("Connected to NATS");
            c
        }
        Err(e) => {
            warn!(error = %e, "Failed to connect to NATS. Running in dry-run mode.");
            return run_dry_mode(count, fraud_rate).await;
        }
    };

    let mut generator = RecordGenerator::new();
    let mut flagged = 0;
    let mut errors = 0;

    for i in 0..count {
        let (record, suspicious) = generator.generate(fraud_rate);
        let payload = serde_json::to_vec(&record)?;

        match client.request(subject.to_string(), payload.into()).await {
            Ok(reply) => {
                let body: Value = serde_json::from_slice(&reply.payload)?;
                if body.get("error").is_some() {
                    errors += 1;
                    warn!(request = i + 1, reply = %body, "Scoring request failed");
                } else {
                    if body.get("prediction").and_then(Value::as_u64) == Some(1) {
                        flagged += 1;
                    }
                    info!(request = i + 1, suspicious = suspicious, reply = %body, "Scored");
                }
            }
            Err(e) => {
                errors += 1;
                error!(request = i + 1, error = %e, "Request failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! Sent {} requests ({} flagged, {} errors)",
        count, flagged, errors
    );

    Ok(())
}

async fn run_dry_mode(count: u64, fraud_rate: f64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no NATS connection)");

    let mut generator = RecordGenerator::new();
    for i in 0..count {
        let (record, suspicious) = generator.generate(fraud_rate);
        let json = serde_json::to_string_pretty(&record)?;
        info!("Sample record {} (suspicious = {}):\n{}", i + 1, suspicious, json);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fraud_rate() {
        assert_eq!(parse_fraud_rate(None), 0.2);
        assert_eq!(parse_fraud_rate(Some("0.5")), 0.5);
        assert_eq!(parse_fraud_rate(Some("3")), 1.0);
        assert_eq!(parse_fraud_rate(Some("-1")), 0.0);
        assert_eq!(parse_fraud_rate(Some("abc")), 0.2);
    }

    #[test]
    fn test_non_finite_fraud_rate_falls_back() {
        for raw in ["nan", "NaN", "inf", "-inf"] {
            let rate = parse_fraud_rate(Some(raw));
            assert_eq!(rate, 0.2, "{raw}");
            RecordGenerator::new().generate(rate);
        }
    }
}
