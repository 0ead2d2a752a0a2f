//! Type definitions for the scoring pipeline

pub mod alert;
pub mod response;
pub mod transaction;

pub use alert::{FraudAlert, RiskLevel, RiskLevelThresholds};
pub use response::{ErrorResponse, ScoreResponse};
pub use transaction::Transaction;
