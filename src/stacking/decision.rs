//! Scored → decided transition.
//!
//! A [`Scored`] value holds a validated probability; [`Scored::decide`]
//! consumes it and yields a [`Decided`] with the binary label. The boundary
//! is inclusive: `probability >= threshold` is fraud.

use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};

/// Validate a decision threshold.
pub fn check_threshold(threshold: f64) -> Result<f64> {
    if threshold.is_finite() && (0.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(ScoringError::Artifact(format!(
            "threshold {} is outside [0, 1]",
            threshold
        )))
    }
}

/// A final probability that has not been thresholded yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    probability: f64,
}

impl Scored {
    pub fn new(model: &str, probability: f64) -> Result<Self> {
        let probability = crate::models::scorer::check_probability(model, probability)?;
        Ok(Self { probability })
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn decide(self, threshold: f64) -> Decided {
        Decided {
            probability: self.probability,
            threshold,
            label: u8::from(self.probability >= threshold),
        }
    }
}

/// A probability together with the label it was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decided {
    pub probability: f64,
    pub threshold: f64,
    pub label: u8,
}

impl Decided {
    pub fn is_fraud(&self) -> bool {
        self.label == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_boundary_is_inclusive() {
        let decided = Scored::new("meta", 0.42).unwrap().decide(0.42);
        assert_eq!(decided.label, 1);
        assert!(decided.is_fraud());

        let decided = Scored::new("meta", 0.4199999).unwrap().decide(0.42);
        assert_eq!(decided.label, 0);
    }

    #[test]
    fn test_rejects_invalid_probability() {
        assert!(Scored::new("meta", 1.01).is_err());
        assert!(Scored::new("meta", f64::NAN).is_err());
    }

    #[test]
    fn test_check_threshold() {
        assert!(check_threshold(0.0).is_ok());
        assert!(check_threshold(1.0).is_ok());
        assert!(check_threshold(-0.01).is_err());
        assert!(check_threshold(f64::INFINITY).is_err());
    }

    proptest! {
        #[test]
        fn prop_label_iff_score_at_least_threshold(p in 0.0f64..=1.0, t in 0.0f64..=1.0) {
            let decided = Scored::new("meta", p).unwrap().decide(t);
            prop_assert_eq!(decided.label == 1, p >= t);
            prop_assert_eq!(decided.probability, p);
        }
    }
}
