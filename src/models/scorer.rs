//! The probabilistic classifier seam shared by base learners, DL scorers and
//! meta-learners.

use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};

/// A frozen binary classifier exposing the class-1 probability.
///
/// Implementations are immutable after load and may be called concurrently.
pub trait ProbabilityModel: Send + Sync {
    /// Model name, as used in meta-feature schemas.
    fn name(&self) -> &str;

    /// Flat input width the model requires, when it is known up front.
    fn input_width(&self) -> Option<usize>;

    /// Class-1 probability for one flat feature vector.
    fn predict_proba(&self, features: &[f32]) -> Result<f64>;

    /// Class-1 probabilities for a batch of flat feature vectors.
    fn predict_proba_batch(&self, rows: &[Vec<f32>]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict_proba(row)).collect()
    }
}

/// Reject values that are not probabilities instead of passing them downstream.
pub fn check_probability(model: &str, probability: f64) -> Result<f64> {
    if probability.is_finite() && (0.0..=1.0).contains(&probability) {
        Ok(probability)
    } else {
        Err(ScoringError::model(
            model,
            format!("produced {} which is not a probability in [0, 1]", probability),
        ))
    }
}

/// Tensor layout a model expects for each flat input row.
///
/// Sequence and grid layouts reinterpret the flat vector row-major; only the
/// element count is checked, not whether the arrangement is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InputShape {
    /// `[batch, width]`
    #[default]
    Flat,
    /// `[batch, steps, channels]`, e.g. LSTM over 30 time steps
    Sequence { steps: usize, channels: usize },
    /// `[batch, rows, cols, channels]`, e.g. CNN over a 5x6 grid
    Grid {
        rows: usize,
        cols: usize,
        channels: usize,
    },
}

impl InputShape {
    /// Number of flat values one row must have, if the shape pins it.
    pub fn element_count(&self) -> Option<usize> {
        match *self {
            InputShape::Flat => None,
            InputShape::Sequence { steps, channels } => Some(steps * channels),
            InputShape::Grid {
                rows,
                cols,
                channels,
            } => Some(rows * cols * channels),
        }
    }

    /// Tensor dimensions for a batch of `batch` rows of `width` flat values.
    pub fn tensor_dims(&self, batch: usize, width: usize) -> Result<Vec<i64>> {
        if let Some(expected) = self.element_count() {
            if expected != width {
                return Err(ScoringError::schema_mismatch(format!(
                    "cannot reshape {} features into {:?} ({} elements)",
                    width, self, expected
                )));
            }
        }
        let dims = match *self {
            InputShape::Flat => vec![batch, width],
            InputShape::Sequence { steps, channels } => vec![batch, steps, channels],
            InputShape::Grid {
                rows,
                cols,
                channels,
            } => vec![batch, rows, cols, channels],
        };
        Ok(dims.into_iter().map(|d| d as i64).collect())
    }
}
