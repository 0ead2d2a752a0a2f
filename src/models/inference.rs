//! Inference engine: the immutable scoring context built once at startup.

use crate::config::{AppConfig, InferenceStrategy};
use crate::error::{Result, ScoringError};
use crate::feature_extractor::FeatureExtractor;
use crate::models::loader::ModelLoader;
use crate::models::scorer::{check_probability, ProbabilityModel};
use crate::stacking::artifact::StackingArtifact;
use crate::stacking::assembler::MetaFeatureAssembler;
use crate::stacking::decision::{check_threshold, Decided, Scored};
use crate::types::alert::{FraudAlert, RiskLevel, RiskLevelThresholds};
use crate::types::response::ScoreResponse;
use crate::types::transaction::Transaction;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Result of scoring one transaction
#[derive(Debug, Clone)]
pub struct PredictionResult {
    /// Caller-facing response
    pub response: ScoreResponse,
    /// Probability per constituent model (stacking only)
    pub model_scores: BTreeMap<String, f64>,
    /// Time spent in each constituent model (stacking only)
    pub model_latencies: Vec<(String, Duration)>,
    /// Thresholded decision (stacking only)
    pub decision: Option<Decided>,
}

impl PredictionResult {
    pub fn score(&self) -> f64 {
        self.response.score
    }

    pub fn is_fraud(&self) -> bool {
        self.decision.map_or(false, |d| d.is_fraud())
    }

    /// Build the alert for a flagged transaction; `None` when nothing was flagged.
    pub fn to_alert(&self, risk_thresholds: &RiskLevelThresholds) -> Option<FraudAlert> {
        let decision = self.decision.filter(Decided::is_fraud)?;
        let risk_level = RiskLevel::from_score(decision.probability, risk_thresholds);

        Some(
            FraudAlert::new(
                self.response.transaction_id.clone(),
                self.response.model_name.clone(),
                decision.probability,
                decision.threshold,
                risk_level,
            )
            .with_model_scores(self.model_scores.clone()),
        )
    }
}

enum Mode {
    Stacking {
        assembler: MetaFeatureAssembler,
        meta_learner: Arc<dyn ProbabilityModel>,
        threshold: f64,
        model_name: String,
    },
    Single {
        model: Arc<dyn ProbabilityModel>,
    },
}

/// Extracts features and scores them; shared read-only across requests.
pub struct InferenceEngine {
    extractor: FeatureExtractor,
    mode: Mode,
}

impl InferenceEngine {
    /// Load every model named by the configuration. Any failure is fatal.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        use anyhow::Context;

        let schema = config.schema.feature_schema()?;
        let mut loader = ModelLoader::with_threads(config.models.onnx_threads);
        let models_dir = config.models_dir();

        let engine = match config.scoring.strategy {
            InferenceStrategy::Stacking => {
                let artifact_path = config.artifact_path();
                let artifact = StackingArtifact::load(&artifact_path).with_context(|| {
                    format!("Failed to load stacking artifact {}", artifact_path.display())
                })?;
                let base = loader
                    .load_all(&models_dir, &config.models.base)
                    .context("Failed to load base models")?;
                let assembler = MetaFeatureAssembler::new(schema, base)?;
                let base_dir = artifact_path.parent().unwrap_or_else(|| Path::new("."));
                let meta_learner = artifact
                    .load_meta_learner(base_dir, &mut loader)
                    .context("Failed to load meta-learner")?;
                Self::stacking(assembler, meta_learner, &artifact)?
            }
            InferenceStrategy::Single => {
                let name = config
                    .scoring
                    .single_model
                    .as_deref()
                    .context("scoring.single_model is required for the single strategy")?;
                let spec = config
                    .models
                    .find(name)
                    .with_context(|| format!("Model '{}' is not listed in models.base", name))?;
                let model = loader.load_model(spec, &models_dir)?;
                Self::single(FeatureExtractor::new(schema), model)?
            }
        };

        Ok(engine)
    }

    /// Stacking engine; the artifact must have been trained on exactly this
    /// feature schema and this constituent model order.
    pub fn stacking(
        assembler: MetaFeatureAssembler,
        meta_learner: Arc<dyn ProbabilityModel>,
        artifact: &StackingArtifact,
    ) -> Result<Self> {
        artifact.ensure_compatible(assembler.feature_schema(), assembler.meta_schema())?;
        if let Some(width) = meta_learner.input_width() {
            if width != assembler.width() {
                return Err(ScoringError::schema_mismatch(format!(
                    "meta-learner takes {} inputs, ensemble produces {}",
                    width,
                    assembler.width()
                )));
            }
        }
        let threshold = check_threshold(artifact.threshold)?;

        info!(
            model_name = %artifact.model_name,
            threshold = threshold,
            meta_features = ?assembler.model_names(),
            features = assembler.feature_schema().len(),
            "Stacking inference engine initialized"
        );

        Ok(Self {
            extractor: FeatureExtractor::new(assembler.feature_schema().clone()),
            mode: Mode::Stacking {
                assembler,
                meta_learner,
                threshold,
                model_name: artifact.model_name.clone(),
            },
        })
    }

    /// Single-model engine; the model's probability is returned undecided.
    pub fn single(extractor: FeatureExtractor, model: Arc<dyn ProbabilityModel>) -> Result<Self> {
        if let Some(width) = model.input_width() {
            if width != extractor.feature_count() {
                return Err(ScoringError::schema_mismatch(format!(
                    "model '{}' takes {} features, schema has {}",
                    model.name(),
                    width,
                    extractor.feature_count()
                )));
            }
        }

        info!(model = %model.name(), "Single-model inference engine initialized");

        Ok(Self {
            extractor,
            mode: Mode::Single { model },
        })
    }

    pub fn strategy(&self) -> InferenceStrategy {
        match self.mode {
            Mode::Stacking { .. } => InferenceStrategy::Stacking,
            Mode::Single { .. } => InferenceStrategy::Single,
        }
    }

    /// Name reported on responses
    pub fn model_name(&self) -> &str {
        match &self.mode {
            Mode::Stacking { model_name, .. } => model_name.as_str(),
            Mode::Single { model } => model.name(),
        }
    }

    /// Decision threshold, when the engine makes decisions
    pub fn threshold(&self) -> Option<f64> {
        match &self.mode {
            Mode::Stacking { threshold, .. } => Some(*threshold),
            Mode::Single { .. } => None,
        }
    }

    /// Constituent model names in meta-feature order
    pub fn model_names(&self) -> Vec<String> {
        match &self.mode {
            Mode::Stacking { assembler, .. } => assembler.model_names().to_vec(),
            Mode::Single { model } => vec![model.name().to_string()],
        }
    }

    pub fn feature_extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    /// Score one transaction
    pub fn score(&self, transaction: &Transaction) -> Result<PredictionResult> {
        let features = self.extractor.extract(transaction)?;
        self.score_features(transaction.transaction_id.clone(), &features)
    }

    /// Score an already-extracted, schema-ordered feature vector
    pub fn score_features(
        &self,
        transaction_id: Option<String>,
        features: &[f32],
    ) -> Result<PredictionResult> {
        match &self.mode {
            Mode::Stacking {
                assembler,
                meta_learner,
                threshold,
                model_name,
            } => {
                let meta = assembler.assemble(features)?;
                let started = Instant::now();
                let probability = meta_learner.predict_proba(&meta.values)?;
                let decision = Scored::new(model_name, probability)?.decide(*threshold);

                let mut model_latencies: Vec<(String, Duration)> = assembler
                    .model_names()
                    .iter()
                    .cloned()
                    .zip(meta.latencies)
                    .collect();
                model_latencies.push((model_name.clone(), started.elapsed()));

                debug!(
                    model_name = %model_name,
                    score = decision.probability,
                    prediction = decision.label,
                    "Stacking inference complete"
                );

                Ok(PredictionResult {
                    response: ScoreResponse {
                        transaction_id,
                        model_name: model_name.clone(),
                        score: decision.probability,
                        prediction: Some(decision.label),
                        threshold: Some(decision.threshold),
                    },
                    model_scores: assembler.named_scores(&meta.values).into_iter().collect(),
                    model_latencies,
                    decision: Some(decision),
                })
            }
            Mode::Single { model } => {
                self.extractor.schema().validate_vector(features)?;
                let started = Instant::now();
                let score = check_probability(model.name(), model.predict_proba(features)?)?;

                debug!(
                    model_name = %model.name(),
                    score = score,
                    "Single-model inference complete"
                );

                Ok(PredictionResult {
                    response: ScoreResponse {
                        transaction_id,
                        model_name: model.name().to_string(),
                        score,
                        prediction: None,
                        threshold: None,
                    },
                    model_scores: BTreeMap::new(),
                    model_latencies: vec![(model.name().to_string(), started.elapsed())],
                    decision: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::linear::LogisticModel;
    use crate::schema::{FeatureSchema, MetaSchema};
    use crate::stacking::artifact::MetaLearner;
    use chrono::Utc;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec!["V1".into(), "Amount".into(), "hour_of_day".into()]).unwrap()
    }

    fn base_models() -> Vec<Arc<dyn ProbabilityModel>> {
        vec![
            Arc::new(LogisticModel::new("XGBoost", vec![1.0, 0.01, 0.0], -0.5)),
            Arc::new(LogisticModel::new("LSTM", vec![-0.5, 0.0, 0.1], 0.2)),
        ]
    }

    fn artifact(threshold: f64) -> StackingArtifact {
        StackingArtifact {
            model_name: "Stacking_RF_DL_model".to_string(),
            meta_learner: MetaLearner::Logistic {
                model: LogisticModel::new("meta", vec![3.0, 1.0], -2.0),
            },
            threshold,
            f1: None,
            meta_features: MetaSchema::new(vec!["XGBoost".into(), "LSTM".into()]).unwrap(),
            feature_schema: schema(),
            created_at: Utc::now(),
        }
    }

    fn engine(threshold: f64) -> InferenceEngine {
        let artifact = artifact(threshold);
        let assembler = MetaFeatureAssembler::new(schema(), base_models()).unwrap();
        let meta = artifact
            .load_meta_learner(Path::new("."), &mut ModelLoader::new())
            .unwrap();
        InferenceEngine::stacking(assembler, meta, &artifact).unwrap()
    }

    fn transaction() -> Transaction {
        Transaction::from_features([("V1", 2.0), ("Amount", 120.0), ("Time", 7300.0)])
            .with_id("tx-1")
    }

    #[test]
    fn test_stacking_response_carries_decision() {
        let engine = engine(0.5);
        let result = engine.score(&transaction()).unwrap();

        assert_eq!(result.response.model_name, "Stacking_RF_DL_model");
        assert_eq!(result.response.transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(result.response.threshold, Some(0.5));
        let prediction = result.response.prediction.unwrap();
        assert_eq!(prediction == 1, result.response.score >= 0.5);
        assert_eq!(result.model_scores.len(), 2);
        assert_eq!(result.model_latencies.len(), 3);
    }

    #[test]
    fn test_threshold_zero_flags_everything() {
        let result = engine(0.0).score(&transaction()).unwrap();
        assert!(result.is_fraud());

        let alert = result.to_alert(&RiskLevelThresholds::default()).unwrap();
        assert_eq!(alert.transaction_id.as_deref(), Some("tx-1"));
        assert_eq!(alert.model_scores.len(), 2);
        assert_eq!(alert.threshold, 0.0);
    }

    #[test]
    fn test_threshold_one_flags_nothing_below_one() {
        let result = engine(1.0).score(&transaction()).unwrap();
        assert!(result.score() < 1.0);
        assert!(!result.is_fraud());
        assert!(result.to_alert(&RiskLevelThresholds::default()).is_none());
    }

    #[test]
    fn test_repeat_scoring_is_bit_identical() {
        let engine = engine(0.5);
        let a = engine.score(&transaction()).unwrap();
        let b = engine.score(&transaction()).unwrap();
        assert_eq!(a.response.score.to_bits(), b.response.score.to_bits());
        assert_eq!(a.model_scores, b.model_scores);
    }

    #[test]
    fn test_invalid_input_is_client_error() {
        let engine = engine(0.5);
        let missing = Transaction::from_features([("V1", 2.0)]);
        let err = engine.score(&missing).err().unwrap();
        assert!(err.is_client_error());
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_rejects_reordered_ensemble() {
        let artifact = artifact(0.5);
        let mut models = base_models();
        models.reverse();
        let assembler = MetaFeatureAssembler::new(schema(), models).unwrap();
        let meta = artifact
            .load_meta_learner(Path::new("."), &mut ModelLoader::new())
            .unwrap();

        let err = InferenceEngine::stacking(assembler, meta, &artifact).err().unwrap();
        assert!(matches!(err, ScoringError::SchemaMismatch(_)));
    }

    #[test]
    fn test_single_mode_omits_decision() {
        let model: Arc<dyn ProbabilityModel> =
            Arc::new(LogisticModel::new("LSTM_model", vec![0.1, 0.0, 0.0], 0.0));
        let engine = InferenceEngine::single(FeatureExtractor::new(schema()), model).unwrap();

        let result = engine.score(&transaction()).unwrap();
        assert_eq!(engine.strategy(), InferenceStrategy::Single);
        assert_eq!(result.response.model_name, "LSTM_model");
        assert!(result.response.prediction.is_none());
        assert!(result.response.threshold.is_none());
        assert!(result.to_alert(&RiskLevelThresholds::default()).is_none());
    }
}
