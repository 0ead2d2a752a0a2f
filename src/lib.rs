//! Fraud Stacking Pipeline Library
//!
//! Real-time credit-card fraud scoring with a stacking ensemble: frozen base
//! and deep-learning models produce meta-features, a meta-learner turns them
//! into one probability, and an F1-tuned threshold turns that into a decision.

pub mod config;
pub mod consumer;
pub mod data;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod schema;
pub mod stacking;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, ScoringError};
pub use feature_extractor::FeatureExtractor;
pub use models::inference::InferenceEngine;
pub use schema::{FeatureSchema, MetaSchema};
pub use stacking::StackingArtifact;
pub use types::{alert::FraudAlert, transaction::Transaction};
