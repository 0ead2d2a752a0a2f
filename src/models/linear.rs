//! Logistic-regression classifier stored as JSON.
//!
//! Used as the default meta-learner (it is small enough to live inline in the
//! stacking artifact) and as a base learner when a model is exported as
//! plain coefficients instead of an ONNX graph.

use crate::error::{Result, ScoringError};
use crate::models::scorer::{check_probability, ProbabilityModel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Numerically stable logistic function.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `p = sigmoid(w · x + b)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub name: String,
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogisticModel {
    pub fn new(name: impl Into<String>, weights: Vec<f64>, bias: f64) -> Self {
        Self {
            name: name.into(),
            weights,
            bias,
        }
    }

    /// Zero weights; predicts 0.5 everywhere.
    pub fn zeros(name: impl Into<String>, num_features: usize) -> Self {
        Self::new(name, vec![0.0; num_features], 0.0)
    }

    pub fn num_features(&self) -> usize {
        self.weights.len()
    }

    /// Load from a JSON file; the file's own name field is replaced by `name`.
    pub fn load<P: AsRef<Path>>(path: P, name: &str) -> Result<Self> {
        let path = path.as_ref();
        let load_err = |reason: String| ScoringError::ModelLoad {
            model: name.to_string(),
            path: path.display().to_string(),
            reason,
        };

        let raw = fs::read_to_string(path).map_err(|e| load_err(e.to_string()))?;
        let mut model: LogisticModel =
            serde_json::from_str(&raw).map_err(|e| load_err(e.to_string()))?;
        model.name = name.to_string();
        model.validate().map_err(|e| load_err(e.to_string()))?;
        Ok(model)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject empty or non-finite coefficients.
    pub fn validate(&self) -> Result<()> {
        if self.weights.is_empty() {
            return Err(ScoringError::validation(format!(
                "logistic model '{}' has no weights",
                self.name
            )));
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err(ScoringError::validation(format!(
                "logistic model '{}' has non-finite coefficients",
                self.name
            )));
        }
        Ok(())
    }

    /// Raw margin `w · x + b`.
    pub fn logit(&self, features: &[f32]) -> f64 {
        self.weights
            .iter()
            .zip(features)
            .map(|(w, &x)| w * x as f64)
            .sum::<f64>()
            + self.bias
    }
}

impl ProbabilityModel for LogisticModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_width(&self) -> Option<usize> {
        Some(self.weights.len())
    }

    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        if features.len() != self.weights.len() {
            return Err(ScoringError::schema_mismatch(format!(
                "model '{}' expects {} features, got {}",
                self.name,
                self.weights.len(),
                features.len()
            )));
        }
        check_probability(&self.name, sigmoid(self.logit(features)))
    }
}
