//! Error types for the scoring pipeline

/// Errors raised while loading models or scoring records.
#[derive(thiserror::Error, Debug)]
pub enum ScoringError {
    /// The request itself is malformed (missing field, non-finite value, bad label).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A vector or column list does not match the schema it was built against.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A model file could not be loaded.
    #[error("Failed to load model '{model}' from {path}: {reason}")]
    ModelLoad {
        model: String,
        path: String,
        reason: String,
    },

    /// A model failed while scoring, or produced an out-of-range probability.
    #[error("Model '{model}' failed: {reason}")]
    Model { model: String, reason: String },

    /// The stacking artifact is invalid or inconsistent with the loaded models.
    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ScoringError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn schema_mismatch(msg: impl Into<String>) -> Self {
        Self::SchemaMismatch(msg.into())
    }

    pub fn model(model: &str, reason: impl std::fmt::Display) -> Self {
        Self::Model {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Whether the caller sent a bad request, as opposed to a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::SchemaMismatch(_) | Self::Serialization(_)
        )
    }

    /// HTTP-style status code reported back to callers.
    pub fn status(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }
}

/// Convenience alias for `std::result::Result<T, ScoringError>`.
pub type Result<T> = std::result::Result<T, ScoringError>;
