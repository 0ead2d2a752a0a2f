//! Meta-feature assembly: one probability per constituent model, in schema order.

use crate::error::{Result, ScoringError};
use crate::models::scorer::{check_probability, ProbabilityModel};
use crate::schema::{FeatureSchema, MetaSchema};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Meta-feature vector for one record, with the latency of each model call.
#[derive(Debug, Clone)]
pub struct MetaFeatures {
    pub values: Vec<f32>,
    pub latencies: Vec<Duration>,
}

/// Runs every base/DL model over a validated feature vector.
pub struct MetaFeatureAssembler {
    feature_schema: FeatureSchema,
    meta_schema: MetaSchema,
    models: Vec<Arc<dyn ProbabilityModel>>,
}

impl MetaFeatureAssembler {
    /// Build an assembler; each model's pinned input width must equal the
    /// feature schema width.
    pub fn new(
        feature_schema: FeatureSchema,
        models: Vec<Arc<dyn ProbabilityModel>>,
    ) -> Result<Self> {
        let meta_schema = MetaSchema::new(models.iter().map(|m| m.name().to_string()).collect())?;

        for model in &models {
            if let Some(width) = model.input_width() {
                if width != feature_schema.len() {
                    return Err(ScoringError::schema_mismatch(format!(
                        "model '{}' takes {} features, schema has {}",
                        model.name(),
                        width,
                        feature_schema.len()
                    )));
                }
            }
        }

        Ok(Self {
            feature_schema,
            meta_schema,
            models,
        })
    }

    pub fn feature_schema(&self) -> &FeatureSchema {
        &self.feature_schema
    }

    pub fn meta_schema(&self) -> &MetaSchema {
        &self.meta_schema
    }

    /// Meta-feature width, i.e. the number of constituent models.
    pub fn width(&self) -> usize {
        self.models.len()
    }

    pub fn model_names(&self) -> &[String] {
        self.meta_schema.models()
    }

    /// Score one feature vector with every model.
    pub fn assemble(&self, features: &[f32]) -> Result<MetaFeatures> {
        self.feature_schema.validate_vector(features)?;

        let mut values = Vec::with_capacity(self.models.len());
        let mut latencies = Vec::with_capacity(self.models.len());

        for model in &self.models {
            let started = Instant::now();
            let probability = check_probability(model.name(), model.predict_proba(features)?)?;
            latencies.push(started.elapsed());
            values.push(probability as f32);
        }

        debug!(meta_features = ?values, "Meta-features assembled");

        Ok(MetaFeatures { values, latencies })
    }

    /// Score a batch; returns one meta-feature row per input row.
    pub fn assemble_batch(&self, rows: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        for (i, row) in rows.iter().enumerate() {
            self.feature_schema
                .validate_vector(row)
                .map_err(|e| ScoringError::validation(format!("row {}: {}", i, e)))?;
        }

        let mut meta = vec![Vec::with_capacity(self.models.len()); rows.len()];
        for model in &self.models {
            let probabilities = model.predict_proba_batch(rows)?;
            if probabilities.len() != rows.len() {
                return Err(ScoringError::model(
                    model.name(),
                    format!("returned {} scores for {} rows", probabilities.len(), rows.len()),
                ));
            }
            for (row, p) in meta.iter_mut().zip(probabilities) {
                row.push(check_probability(model.name(), p)? as f32);
            }
        }

        Ok(meta)
    }

    /// Pair each meta-feature value with its model name.
    pub fn named_scores(&self, meta: &[f32]) -> Vec<(String, f64)> {
        self.model_names()
            .iter()
            .cloned()
            .zip(meta.iter().map(|&p| p as f64))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::linear::LogisticModel;

    struct Broken;

    impl ProbabilityModel for Broken {
        fn name(&self) -> &str {
            "Broken"
        }
        fn input_width(&self) -> Option<usize> {
            None
        }
        fn predict_proba(&self, _features: &[f32]) -> Result<f64> {
            Ok(1.5)
        }
    }

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec!["a".into(), "b".into()]).unwrap()
    }

    fn models() -> Vec<Arc<dyn ProbabilityModel>> {
        vec![
            Arc::new(LogisticModel::new("First", vec![1.0, 0.0], 0.0)),
            Arc::new(LogisticModel::new("Second", vec![0.0, 1.0], 0.0)),
            Arc::new(LogisticModel::new("Third", vec![0.0, 0.0], 0.0)),
        ]
    }

    #[test]
    fn test_width_equals_model_count() {
        let assembler = MetaFeatureAssembler::new(schema(), models()).unwrap();
        let meta = assembler.assemble(&[2.0, -2.0]).unwrap();

        assert_eq!(assembler.width(), 3);
        assert_eq!(meta.values.len(), 3);
        assert_eq!(meta.latencies.len(), 3);
        assert!(meta.values[0] > 0.5);
        assert!(meta.values[1] < 0.5);
        assert_eq!(meta.values[2], 0.5);
    }

    #[test]
    fn test_malformed_vector_fails_fast() {
        let assembler = MetaFeatureAssembler::new(schema(), models()).unwrap();
        let err = assembler.assemble(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, ScoringError::Validation(_)));
    }

    #[test]
    fn test_model_width_checked_against_schema() {
        let models: Vec<Arc<dyn ProbabilityModel>> =
            vec![Arc::new(LogisticModel::zeros("Wide", 5))];
        assert!(matches!(
            MetaFeatureAssembler::new(schema(), models),
            Err(ScoringError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_out_of_range_probability_is_model_error() {
        let models: Vec<Arc<dyn ProbabilityModel>> = vec![Arc::new(Broken)];
        let assembler = MetaFeatureAssembler::new(schema(), models).unwrap();
        assert!(matches!(
            assembler.assemble(&[0.0, 0.0]),
            Err(ScoringError::Model { .. })
        ));
    }

    #[test]
    fn test_batch_matches_single() {
        let assembler = MetaFeatureAssembler::new(schema(), models()).unwrap();
        let rows = vec![vec![0.5, 1.0], vec![-1.0, 3.0]];

        let batch = assembler.assemble_batch(&rows).unwrap();
        for (row, meta) in rows.iter().zip(&batch) {
            assert_eq!(&assembler.assemble(row).unwrap().values, meta);
        }
    }

    #[test]
    fn test_named_scores() {
        let assembler = MetaFeatureAssembler::new(schema(), models()).unwrap();
        let named = assembler.named_scores(&[0.1, 0.2, 0.3]);
        assert_eq!(named[1].0, "Second");
        assert!((named[2].1 - 0.3).abs() < 1e-6);
    }
}
