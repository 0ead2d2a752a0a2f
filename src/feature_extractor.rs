//! Feature extraction for stacking inference.
//!
//! Places each named value of a [`Transaction`] at its schema position,
//! producing the flat `f32` vector every base model was trained on. Unknown,
//! missing and non-finite values are rejected rather than silently reordered
//! or zero-filled.

use crate::error::{Result, ScoringError};
use crate::schema::{FeatureSchema, HOUR_OF_DAY, TIME};
use crate::types::transaction::Transaction;

const SECONDS_PER_DAY: f64 = 24.0 * 3600.0;
const SECONDS_PER_HOUR: f64 = 3600.0;

/// Hour of day from the dataset's elapsed-seconds `Time` column.
pub fn hour_of_day(elapsed_seconds: f64) -> f64 {
    (elapsed_seconds.rem_euclid(SECONDS_PER_DAY) / SECONDS_PER_HOUR).floor()
}

/// Feature extractor that transforms transactions into model input vectors.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    schema: FeatureSchema,
}

impl FeatureExtractor {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Extract the schema-ordered feature vector from a transaction.
    ///
    /// `Time` is accepted as a raw column: when the schema wants `hour_of_day`
    /// and the record does not carry it, the hour is derived from `Time`.
    pub fn extract(&self, tx: &Transaction) -> Result<Vec<f32>> {
        if let Some(unknown) = tx
            .features
            .keys()
            .find(|name| !self.schema.contains(name) && name.as_str() != TIME)
        {
            return Err(ScoringError::validation(format!(
                "unknown feature '{}'",
                unknown
            )));
        }

        let mut features = Vec::with_capacity(self.schema.len());
        for name in self.schema.columns() {
            let value = match tx.get(name) {
                Some(v) => v,
                None if name == HOUR_OF_DAY => match tx.get(TIME) {
                    Some(time) => hour_of_day(time),
                    None => {
                        return Err(ScoringError::validation(format!(
                            "missing feature '{}' (and no '{}' to derive it from)",
                            HOUR_OF_DAY, TIME
                        )))
                    }
                },
                None => {
                    return Err(ScoringError::validation(format!(
                        "missing feature '{}'",
                        name
                    )))
                }
            };
            if !value.is_finite() {
                return Err(ScoringError::validation(format!(
                    "feature '{}' is not a finite number",
                    name
                )));
            }
            features.push(value as f32);
        }

        Ok(features)
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        self.schema.len()
    }

    /// Get feature names in vector order.
    pub fn feature_names(&self) -> &[String] {
        self.schema.columns()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(FeatureSchema::credit_card())
    }
}
