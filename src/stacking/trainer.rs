//! Meta-learner training.
//!
//! Refits the meta-learner on meta-features produced by the frozen base
//! models, then sweeps the threshold on a held-out split. Both come out as a
//! single [`StackingArtifact`], so a threshold can never outlive the
//! meta-learner it was tuned for.

use crate::data::LabeledRows;
use crate::error::{Result, ScoringError};
use crate::models::linear::{sigmoid, LogisticModel};
use crate::models::scorer::ProbabilityModel;
use crate::stacking::artifact::{MetaLearner, StackingArtifact};
use crate::stacking::assembler::MetaFeatureAssembler;
use crate::stacking::evaluation::ClassificationReport;
use crate::stacking::threshold::{select_threshold, ThresholdSelection};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

/// Gradient-descent settings for the logistic meta-learner.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainerConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// L2 penalty on the weights (not the bias)
    #[serde(default = "default_l2")]
    pub l2: f64,
}

fn default_learning_rate() -> f64 {
    0.5
}

fn default_epochs() -> usize {
    500
}

fn default_l2() -> f64 {
    1e-4
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            epochs: default_epochs(),
            l2: default_l2(),
        }
    }
}

/// Everything a training run produces.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: StackingArtifact,
    pub selection: ThresholdSelection,
    pub report: ClassificationReport,
}

/// Fits logistic meta-learners with deterministic full-batch gradient descent.
#[derive(Debug, Clone, Default)]
pub struct MetaLearnerTrainer {
    config: TrainerConfig,
}

impl MetaLearnerTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Fit `p = sigmoid(w·x + b)` by minimising mean log-loss + `l2/2 ·|w|²`.
    pub fn fit(&self, name: &str, rows: &[Vec<f32>], labels: &[u8]) -> Result<LogisticModel> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(ScoringError::validation(format!(
                "cannot fit on {} rows with {} labels",
                rows.len(),
                labels.len()
            )));
        }
        let width = rows[0].len();
        if let Some(pos) = rows.iter().position(|r| r.len() != width) {
            return Err(ScoringError::validation(format!(
                "training row {} has {} values, expected {}",
                pos,
                rows[pos].len(),
                width
            )));
        }
        if labels.iter().any(|&l| l > 1) {
            return Err(ScoringError::validation("training labels must be 0 or 1"));
        }

        let n = rows.len() as f64;
        let mut model = LogisticModel::zeros(name, width);
        let mut grad_w = vec![0.0; width];

        for epoch in 0..self.config.epochs {
            grad_w.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_b = 0.0;
            let mut loss = 0.0;

            for (row, &label) in rows.iter().zip(labels) {
                let p = sigmoid(model.logit(row));
                let y = label as f64;
                let err = p - y;
                for (g, &x) in grad_w.iter_mut().zip(row) {
                    *g += err * x as f64;
                }
                grad_b += err;
                loss -= y * p.max(1e-15).ln() + (1.0 - y) * (1.0 - p).max(1e-15).ln();
            }

            for (w, g) in model.weights.iter_mut().zip(&grad_w) {
                *w -= self.config.learning_rate * (g / n + self.config.l2 * *w);
            }
            model.bias -= self.config.learning_rate * grad_b / n;

            if epoch % 100 == 0 {
                debug!(epoch = epoch, log_loss = loss / n, "Meta-learner training");
            }
        }

        model.validate()?;
        Ok(model)
    }

    /// Assemble meta-features, fit the meta-learner on the training split and
    /// tune the threshold on the held-out split.
    pub fn train(
        &self,
        model_name: &str,
        assembler: &MetaFeatureAssembler,
        train: &LabeledRows,
        holdout: &LabeledRows,
    ) -> Result<TrainingOutcome> {
        let (train_rows, train_labels) = (&train.rows, &train.labels);
        let (holdout_rows, holdout_labels) = (&holdout.rows, &holdout.labels);

        info!(
            train_rows = train_rows.len(),
            holdout_rows = holdout_rows.len(),
            meta_features = ?assembler.model_names(),
            "Generating meta-features"
        );
        let train_meta = assembler.assemble_batch(train_rows)?;
        let holdout_meta = assembler.assemble_batch(holdout_rows)?;

        let meta_learner = self.fit(model_name, &train_meta, train_labels)?;

        let holdout_probabilities = holdout_meta
            .iter()
            .map(|row| meta_learner.predict_proba(row))
            .collect::<Result<Vec<f64>>>()?;

        let selection = select_threshold(holdout_labels, &holdout_probabilities)?;
        let report = ClassificationReport::at_threshold(
            holdout_labels,
            &holdout_probabilities,
            selection.threshold,
        )?;

        info!(
            threshold = selection.threshold,
            f1 = selection.f1,
            precision = selection.precision,
            recall = selection.recall,
            "Optimal threshold selected"
        );

        let artifact = StackingArtifact {
            model_name: model_name.to_string(),
            meta_learner: MetaLearner::Logistic {
                model: meta_learner,
            },
            threshold: selection.threshold,
            f1: Some(selection.f1),
            meta_features: assembler.meta_schema().clone(),
            feature_schema: assembler.feature_schema().clone(),
            created_at: Utc::now(),
        };

        Ok(TrainingOutcome {
            artifact,
            selection,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSchema;
    use std::sync::Arc;

    #[test]
    fn test_fit_separates_classes() {
        let rows = vec![
            vec![0.1, 0.2],
            vec![0.2, 0.1],
            vec![0.9, 0.8],
            vec![0.8, 0.9],
        ];
        let labels = [0, 0, 1, 1];

        let trainer = MetaLearnerTrainer::new(TrainerConfig {
            learning_rate: 1.0,
            epochs: 2000,
            l2: 0.0,
        });
        let model = trainer.fit("meta", &rows, &labels).unwrap();

        assert!(model.predict_proba(&[0.15, 0.15]).unwrap() < 0.5);
        assert!(model.predict_proba(&[0.85, 0.85]).unwrap() > 0.5);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let rows = vec![vec![0.3], vec![0.7], vec![0.6], vec![0.2]];
        let labels = [0, 1, 1, 0];
        let trainer = MetaLearnerTrainer::default();

        let a = trainer.fit("meta", &rows, &labels).unwrap();
        let b = trainer.fit("meta", &rows, &labels).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        let trainer = MetaLearnerTrainer::default();
        assert!(trainer.fit("meta", &[], &[]).is_err());
        assert!(trainer.fit("meta", &[vec![0.1], vec![0.1, 0.2]], &[0, 1]).is_err());
        assert!(trainer.fit("meta", &[vec![0.1]], &[3]).is_err());
    }

    #[test]
    fn test_train_produces_consistent_artifact() {
        let schema = FeatureSchema::new(vec!["x".into(), "y".into()]).unwrap();
        let base: Vec<Arc<dyn ProbabilityModel>> = vec![
            Arc::new(LogisticModel::new("OnX", vec![4.0, 0.0], -2.0)),
            Arc::new(LogisticModel::new("OnY", vec![0.0, 4.0], -2.0)),
        ];
        let assembler = MetaFeatureAssembler::new(schema.clone(), base).unwrap();

        let rows: Vec<Vec<f32>> = (0..40)
            .map(|i| {
                let v = i as f32 / 40.0;
                vec![v, 1.0 - v * 0.5]
            })
            .collect();
        let labels: Vec<u8> = (0..40).map(|i| u8::from(i >= 25)).collect();
        let data = LabeledRows::new(rows, labels).unwrap();

        let outcome = MetaLearnerTrainer::default()
            .train("Stacking_LR_model", &assembler, &data, &data)
            .unwrap();

        outcome.artifact.validate().unwrap();
        assert_eq!(outcome.artifact.meta_features.width(), 2);
        assert_eq!(outcome.artifact.feature_schema, schema);
        assert_eq!(outcome.artifact.threshold, outcome.selection.threshold);
        assert_eq!(outcome.report.threshold, outcome.selection.threshold);
        assert!(outcome.selection.f1 > 0.5);
    }
}
