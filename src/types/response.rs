//! Scoring responses returned to callers

use crate::error::ScoringError;
use serde::{Deserialize, Serialize};

/// Successful scoring result.
///
/// Single-model strategies only fill `model_name` and `score`; stacking adds
/// the binary `prediction` and the `threshold` it was decided against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub model_name: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
}

/// Failure reply, with an HTTP-style status (400 = bad request, 500 = server).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: u16,
}

impl ErrorResponse {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            status: 400,
        }
    }
}

impl From<&ScoringError> for ErrorResponse {
    fn from(err: &ScoringError) -> Self {
        Self {
            error: err.to_string(),
            status: err.status(),
        }
    }
}
