//! F1-optimal threshold selection over a precision-recall curve.
//!
//! # Curve construction
//!
//! Samples are sorted by probability, descending. Every distinct probability
//! is a candidate threshold `t`; at `t` the positive predictions are all
//! samples with `p >= t`. The returned curve is ordered by increasing
//! threshold and carries one extra terminal point `(precision = 1, recall = 0)`
//! with no threshold attached, so `precision.len() == thresholds.len() + 1`.
//!
//! With no positive labels, recall is defined as 1 at every threshold.
//!
//! # Selection
//!
//! `F1 = 2PR / (P + R + eps)` is evaluated at every curve point and the first
//! maximum wins, which is the lowest threshold among ties.

use crate::error::{Result, ScoringError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Keeps F1 defined when precision and recall are both zero.
pub const F1_EPSILON: f64 = 1e-10;

/// `2PR / (P + R + eps)`
pub fn f1_score(precision: f64, recall: f64) -> f64 {
    2.0 * precision * recall / (precision + recall + F1_EPSILON)
}

/// Precision and recall at each candidate threshold, increasing threshold order.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecisionRecallCurve {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub thresholds: Vec<f64>,
}

impl PrecisionRecallCurve {
    /// F1 at every curve point, terminal point included.
    pub fn f1_scores(&self) -> Vec<f64> {
        self.precision
            .iter()
            .zip(&self.recall)
            .map(|(&p, &r)| f1_score(p, r))
            .collect()
    }
}

/// The chosen operating point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSelection {
    pub threshold: f64,
    pub f1: f64,
    pub precision: f64,
    pub recall: f64,
    /// Index into [`PrecisionRecallCurve::thresholds`]
    pub index: usize,
}

fn validate_inputs(labels: &[u8], probabilities: &[f64]) -> Result<()> {
    if labels.is_empty() {
        return Err(ScoringError::validation("threshold sweep needs at least one sample"));
    }
    if labels.len() != probabilities.len() {
        return Err(ScoringError::validation(format!(
            "{} labels but {} probabilities",
            labels.len(),
            probabilities.len()
        )));
    }
    if let Some(pos) = labels.iter().position(|&l| l > 1) {
        return Err(ScoringError::validation(format!(
            "label {} at position {} is not 0 or 1",
            labels[pos], pos
        )));
    }
    if let Some(pos) = probabilities.iter().position(|p| !p.is_finite()) {
        return Err(ScoringError::validation(format!(
            "probability at position {} is not finite",
            pos
        )));
    }
    Ok(())
}

/// Build the precision-recall curve for binary `labels` and their scores.
pub fn precision_recall_curve(
    labels: &[u8],
    probabilities: &[f64],
) -> Result<PrecisionRecallCurve> {
    validate_inputs(labels, probabilities)?;

    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by(|&a, &b| probabilities[b].total_cmp(&probabilities[a]));

    // Cumulative counts at the last sample of each distinct score, descending.
    let mut tps: Vec<f64> = Vec::new();
    let mut fps: Vec<f64> = Vec::new();
    let mut thresholds: Vec<f64> = Vec::new();
    let mut tp = 0.0;
    let mut fp = 0.0;
    for (rank, &i) in order.iter().enumerate() {
        if labels[i] == 1 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_group = order
            .get(rank + 1)
            .map_or(true, |&next| probabilities[next] != probabilities[i]);
        if last_of_group {
            tps.push(tp);
            fps.push(fp);
            thresholds.push(probabilities[i]);
        }
    }

    let total_positive = tp;
    if total_positive == 0.0 {
        warn!("No positive labels in threshold sweep; recall is 1 at every threshold");
    }

    let mut precision: Vec<f64> = tps
        .iter()
        .zip(&fps)
        .map(|(&tp, &fp)| if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 })
        .collect();
    let mut recall: Vec<f64> = tps
        .iter()
        .map(|&tp| if total_positive > 0.0 { tp / total_positive } else { 1.0 })
        .collect();

    precision.reverse();
    recall.reverse();
    thresholds.reverse();
    precision.push(1.0);
    recall.push(0.0);

    Ok(PrecisionRecallCurve {
        precision,
        recall,
        thresholds,
    })
}

/// Pick the F1-maximising threshold from an existing curve.
pub fn best_threshold(curve: &PrecisionRecallCurve) -> Result<ThresholdSelection> {
    if curve.thresholds.is_empty() {
        return Err(ScoringError::validation("precision-recall curve has no thresholds"));
    }

    let f1 = curve.f1_scores();
    let mut best = 0;
    for (i, &score) in f1.iter().enumerate().skip(1) {
        if score > f1[best] {
            best = i;
        }
    }
    // Terminal point has F1 = 0 and no threshold.
    let index = best.min(curve.thresholds.len() - 1);

    Ok(ThresholdSelection {
        threshold: curve.thresholds[index],
        f1: f1[index],
        precision: curve.precision[index],
        recall: curve.recall[index],
        index,
    })
}

/// Sweep the precision-recall curve and return the F1-optimal threshold.
pub fn select_threshold(labels: &[u8], probabilities: &[f64]) -> Result<ThresholdSelection> {
    let curve = precision_recall_curve(labels, probabilities)?;
    best_threshold(&curve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// F1 of `p >= threshold` computed directly from the samples.
    fn brute_force_f1(labels: &[u8], probabilities: &[f64], threshold: f64) -> f64 {
        let mut tp = 0.0;
        let mut fp = 0.0;
        let mut fn_ = 0.0;
        for (&l, &p) in labels.iter().zip(probabilities) {
            match (p >= threshold, l == 1) {
                (true, true) => tp += 1.0,
                (true, false) => fp += 1.0,
                (false, true) => fn_ += 1.0,
                (false, false) => {}
            }
        }
        let precision = if tp + fp > 0.0 { tp / (tp + fp) } else { 0.0 };
        let recall = if tp + fn_ > 0.0 { tp / (tp + fn_) } else { 1.0 };
        f1_score(precision, recall)
    }

    #[test]
    fn test_two_sample_curve() {
        let curve = precision_recall_curve(&[0, 1], &[0.2, 0.9]).unwrap();

        assert_eq!(curve.thresholds, vec![0.2, 0.9]);
        assert_eq!(curve.precision, vec![0.5, 1.0, 1.0]);
        assert_eq!(curve.recall, vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_two_sample_selection_matches_brute_force() {
        let labels = [0, 1];
        let probabilities = [0.2, 0.9];
        let selection = select_threshold(&labels, &probabilities).unwrap();

        assert_eq!(selection.threshold, 0.9);
        assert_eq!(selection.index, 1);
        assert!((selection.f1 - 1.0).abs() < 1e-9);

        let curve = precision_recall_curve(&labels, &probabilities).unwrap();
        let brute: Vec<f64> = curve
            .thresholds
            .iter()
            .map(|&t| brute_force_f1(&labels, &probabilities, t))
            .collect();
        let brute_best = brute
            .iter()
            .enumerate()
            .fold(0, |best, (i, &f)| if f > brute[best] { i } else { best });
        assert_eq!(curve.thresholds[brute_best], selection.threshold);
    }

    #[test]
    fn test_tied_scores_collapse_to_one_threshold() {
        let curve = precision_recall_curve(&[0, 1, 1, 0], &[0.5, 0.5, 0.8, 0.1]).unwrap();
        assert_eq!(curve.thresholds, vec![0.1, 0.5, 0.8]);
        // At 0.5: predicted {0.5, 0.5, 0.8} -> 2 TP, 1 FP
        assert!((curve.precision[1] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(curve.recall[1], 1.0);
    }

    #[test]
    fn test_ties_break_to_lowest_threshold() {
        // Thresholds 0.6 and 0.9 both give F1 = 2/3; the lower one wins.
        let labels = [1, 0, 0, 1];
        let probabilities = [0.9, 0.8, 0.7, 0.6];
        let curve = precision_recall_curve(&labels, &probabilities).unwrap();
        let f1 = curve.f1_scores();
        assert_eq!(f1[0], f1[3]);

        let selection = best_threshold(&curve).unwrap();
        assert_eq!(selection.index, 0);
        assert_eq!(selection.threshold, 0.6);
    }

    #[test]
    fn test_no_positives() {
        let selection = select_threshold(&[0, 0, 0], &[0.1, 0.2, 0.3]).unwrap();
        assert_eq!(selection.index, 0);
        assert_eq!(selection.threshold, 0.1);
        assert!(selection.f1 < 1e-9);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(select_threshold(&[], &[]).is_err());
        assert!(select_threshold(&[0, 1], &[0.5]).is_err());
        assert!(select_threshold(&[0, 2], &[0.5, 0.6]).is_err());
        assert!(select_threshold(&[0, 1], &[0.5, f64::NAN]).is_err());
    }

    proptest! {
        #[test]
        fn prop_selection_is_deterministic_and_optimal(
            samples in prop::collection::vec((0u8..=1, 0.0f64..=1.0), 1..60)
        ) {
            let labels: Vec<u8> = samples.iter().map(|s| s.0).collect();
            let probabilities: Vec<f64> = samples.iter().map(|s| s.1).collect();

            let first = select_threshold(&labels, &probabilities).unwrap();
            let second = select_threshold(&labels, &probabilities).unwrap();
            prop_assert_eq!(first, second);

            let curve = precision_recall_curve(&labels, &probabilities).unwrap();
            prop_assert_eq!(curve.precision.len(), curve.thresholds.len() + 1);
            prop_assert!(curve.thresholds.windows(2).all(|w| w[0] < w[1]));

            for &t in &curve.thresholds {
                let f1 = brute_force_f1(&labels, &probabilities, t);
                prop_assert!(f1 <= first.f1 + 1e-12);
            }
        }
    }
}
