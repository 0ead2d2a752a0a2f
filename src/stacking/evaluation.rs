//! Binary classification report for a tuned threshold.

use crate::error::{Result, ScoringError};
use crate::stacking::threshold::f1_score;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-class precision / recall / F1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        Self {
            precision,
            recall,
            f1: f1_score(precision, recall),
            support: tp + fn_,
        }
    }
}

/// Confusion matrix and per-class metrics at one threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub threshold: f64,
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
    pub legitimate: ClassMetrics,
    pub fraud: ClassMetrics,
    pub accuracy: f64,
}

impl ClassificationReport {
    /// Evaluate `probability >= threshold` against `labels`.
    pub fn at_threshold(labels: &[u8], probabilities: &[f64], threshold: f64) -> Result<Self> {
        if labels.len() != probabilities.len() || labels.is_empty() {
            return Err(ScoringError::validation(format!(
                "cannot evaluate {} labels against {} probabilities",
                labels.len(),
                probabilities.len()
            )));
        }

        let (mut tp, mut fp, mut tn, mut fn_) = (0, 0, 0, 0);
        for (&label, &p) in labels.iter().zip(probabilities) {
            match (label == 1, p >= threshold) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (false, false) => tn += 1,
                (true, false) => fn_ += 1,
            }
        }

        Ok(Self {
            threshold,
            true_positives: tp,
            false_positives: fp,
            true_negatives: tn,
            false_negatives: fn_,
            legitimate: ClassMetrics::from_counts(tn, fn_, fp),
            fraud: ClassMetrics::from_counts(tp, fp, fn_),
            accuracy: (tp + tn) as f64 / labels.len() as f64,
        })
    }
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "threshold = {:.4}", self.threshold)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for (name, m) in [("0", &self.legitimate), ("1", &self.fraud)] {
            writeln!(
                f,
                "{:>12} {:>9.4} {:>9.4} {:>9.4} {:>9}",
                name, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.4} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.legitimate.support + self.fraud.support
        )?;
        write!(
            f,
            "confusion: tn={} fp={} fn={} tp={}",
            self.true_negatives, self.false_positives, self.false_negatives, self.true_positives
        )
    }
}
