//! Persisted stacking artifact: meta-learner + threshold + the schemas they
//! were trained against, stored together as one JSON document.

use crate::error::{Result, ScoringError};
use crate::models::linear::LogisticModel;
use crate::models::loader::{ModelLoader, ModelSpec};
use crate::models::scorer::{InputShape, ProbabilityModel};
use crate::schema::{FeatureSchema, MetaSchema};
use crate::stacking::decision::check_threshold;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// How the meta-learner is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum MetaLearner {
    /// Coefficients inline in the artifact
    Logistic { model: LogisticModel },
    /// ONNX file, relative to the artifact's directory unless absolute
    Onnx { path: String },
}

/// A meta-learner and the threshold tuned against it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackingArtifact {
    /// Reported as `model_name` on every response
    pub model_name: String,
    pub meta_learner: MetaLearner,
    pub threshold: f64,
    /// Held-out F1 at `threshold`, when known
    #[serde(default)]
    pub f1: Option<f64>,
    /// Constituent model order the meta-learner was trained on
    pub meta_features: MetaSchema,
    /// Input column order the constituent models were trained on
    pub feature_schema: FeatureSchema,
    pub created_at: DateTime<Utc>,
}

impl StackingArtifact {
    /// Load and validate an artifact.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            ScoringError::Artifact(format!("cannot read {}: {}", path.display(), e))
        })?;
        let artifact: StackingArtifact = serde_json::from_str(&raw).map_err(|e| {
            ScoringError::Artifact(format!("cannot parse {}: {}", path.display(), e))
        })?;
        artifact.validate()?;

        info!(
            model_name = %artifact.model_name,
            threshold = artifact.threshold,
            meta_features = ?artifact.meta_features.models(),
            "Stacking artifact loaded from {}",
            path.display()
        );

        Ok(artifact)
    }

    /// Write the artifact as pretty JSON, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), threshold = self.threshold, "Stacking artifact saved");
        Ok(())
    }

    /// Internal consistency: valid threshold, meta-learner width matches the
    /// meta-feature schema.
    pub fn validate(&self) -> Result<()> {
        check_threshold(self.threshold)?;

        if let MetaLearner::Logistic { model } = &self.meta_learner {
            model
                .validate()
                .map_err(|e| ScoringError::Artifact(e.to_string()))?;
            if model.num_features() != self.meta_features.width() {
                return Err(ScoringError::Artifact(format!(
                    "meta-learner takes {} inputs but artifact lists {} meta-features",
                    model.num_features(),
                    self.meta_features.width()
                )));
            }
        }
        Ok(())
    }

    /// Fail unless the serving ensemble matches what the artifact was trained on.
    pub fn ensure_compatible(
        &self,
        feature_schema: &FeatureSchema,
        meta_schema: &MetaSchema,
    ) -> Result<()> {
        self.feature_schema.ensure_matches(feature_schema)?;
        self.meta_features.ensure_matches(meta_schema)?;
        Ok(())
    }

    /// Materialise the meta-learner; `base_dir` resolves relative ONNX paths.
    pub fn load_meta_learner(
        &self,
        base_dir: &Path,
        loader: &mut ModelLoader,
    ) -> Result<Arc<dyn ProbabilityModel>> {
        match &self.meta_learner {
            MetaLearner::Logistic { model } => {
                let mut model = model.clone();
                model.name = self.model_name.clone();
                Ok(Arc::new(model))
            }
            MetaLearner::Onnx { path } => {
                let spec = ModelSpec::onnx(&self.model_name, path, InputShape::Flat);
                loader.load_model(&spec, base_dir)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn artifact() -> StackingArtifact {
        StackingArtifact {
            model_name: "Stacking_LR_model".to_string(),
            meta_learner: MetaLearner::Logistic {
                model: LogisticModel::new("meta", vec![2.0, 3.0], -2.5),
            },
            threshold: 0.37,
            f1: Some(0.86),
            meta_features: MetaSchema::new(vec!["XGBoost".into(), "LSTM".into()]).unwrap(),
            feature_schema: FeatureSchema::credit_card(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stacking-model").join("stacking_model_lr.json");

        let original = artifact();
        original.save(&path).unwrap();
        let loaded = StackingArtifact::load(&path).unwrap();

        assert_eq!(loaded, original);
    }

    #[test]
    fn test_reload_preserves_threshold_and_weights_bit_for_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.json");
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..2_000 {
            let mut original = artifact();
            original.threshold = rng.gen_range(0.0..1.0);
            original.f1 = Some(rng.gen_range(0.0..1.0));
            original.meta_learner = MetaLearner::Logistic {
                model: LogisticModel::new(
                    "meta",
                    vec![rng.gen_range(-20.0..20.0), rng.gen_range(-20.0..20.0)],
                    rng.gen_range(-20.0..20.0),
                ),
            };
            original.save(&path).unwrap();
            let loaded = StackingArtifact::load(&path).unwrap();

            assert_eq!(loaded.threshold.to_bits(), original.threshold.to_bits());
            let (MetaLearner::Logistic { model: got }, MetaLearner::Logistic { model: want }) =
                (&loaded.meta_learner, &original.meta_learner)
            else {
                panic!("meta-learner kind changed on reload");
            };
            assert_eq!(got.bias.to_bits(), want.bias.to_bits());
            for (g, w) in got.weights.iter().zip(&want.weights) {
                assert_eq!(g.to_bits(), w.to_bits());
            }
        }
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let mut bad = artifact();
        bad.threshold = 1.5;
        assert!(matches!(bad.validate(), Err(ScoringError::Artifact(_))));
    }

    #[test]
    fn test_rejects_width_mismatch() {
        let mut bad = artifact();
        bad.meta_learner = MetaLearner::Logistic {
            model: LogisticModel::zeros("meta", 3),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_compatibility_checks_order() {
        let artifact = artifact();
        let reordered = MetaSchema::new(vec!["LSTM".into(), "XGBoost".into()]).unwrap();

        assert!(artifact
            .ensure_compatible(&FeatureSchema::credit_card(), &artifact.meta_features)
            .is_ok());
        assert!(matches!(
            artifact.ensure_compatible(&FeatureSchema::credit_card(), &reordered),
            Err(ScoringError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_logistic_meta_learner_takes_artifact_name() {
        let artifact = artifact();
        let meta = artifact
            .load_meta_learner(Path::new("."), &mut ModelLoader::new())
            .unwrap();
        assert_eq!(meta.name(), "Stacking_LR_model");
        assert_eq!(meta.input_width(), Some(2));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            StackingArtifact::load("/nonexistent/artifact.json"),
            Err(ScoringError::Artifact(_))
        ));
    }
}
