//! Fraud alert data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Risk level classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Determine risk level from score and thresholds
    pub fn from_score(score: f64, thresholds: &RiskLevelThresholds) -> Self {
        if score >= thresholds.critical {
            RiskLevel::Critical
        } else if score >= thresholds.high {
            RiskLevel::High
        } else if score >= thresholds.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

/// Configurable risk level bands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLevelThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskLevelThresholds {
    fn default() -> Self {
        Self {
            medium: 0.5,
            high: 0.7,
            critical: 0.9,
        }
    }
}

/// Alert published when the stacking decision flags a transaction as fraud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    /// Unique alert identifier
    pub alert_id: String,

    /// Associated transaction ID, when the caller supplied one
    pub transaction_id: Option<String>,

    /// Stacking model that produced the decision
    pub model_name: String,

    /// Final meta-learner probability (0.0 - 1.0)
    pub score: f64,

    /// Decision threshold the score was compared against
    pub threshold: f64,

    /// Risk level classification
    pub risk_level: RiskLevel,

    /// Per-constituent-model probabilities (the meta-features)
    pub model_scores: BTreeMap<String, f64>,

    /// Alert generation timestamp
    pub timestamp: DateTime<Utc>,
}

impl FraudAlert {
    /// Create a new fraud alert
    pub fn new(
        transaction_id: Option<String>,
        model_name: String,
        score: f64,
        threshold: f64,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            transaction_id,
            model_name,
            score,
            threshold,
            risk_level,
            model_scores: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach the constituent model scores
    pub fn with_model_scores(mut self, model_scores: BTreeMap<String, f64>) -> Self {
        self.model_scores = model_scores;
        self
    }
}
